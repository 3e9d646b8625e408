//! Wire grammar of the realtime control channel.
//!
//! The conversational service exchanges discrete JSON frames over the
//! control channel alongside the audio session. Each inbound frame carries
//! a `type` discriminator; frames the orchestrator does not consume simply
//! fail to parse into [`ServerEvent`] and are skipped by the demultiplexer.

use serde::{Deserialize, Serialize};

/// Inbound control-channel events the orchestrator consumes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Partial transcription of the user's in-progress utterance.
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    TranscriptionDelta {
        item_id: String,
        #[serde(default)]
        delta: String,
    },

    /// The user's utterance finished transcribing.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        item_id: String,
        #[serde(default)]
        transcript: String,
    },

    /// A new output item began; function-call items start a tool call.
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: ConversationItem },

    /// An output item completed; message items finalize an assistant turn.
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: ConversationItem },

    /// A fragment of a tool call's JSON arguments.
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        call_id: String,
        #[serde(default)]
        delta: String,
    },

    /// A tool call's arguments are complete and the call may execute.
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },
}

/// An item inside an output-item lifecycle event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One part of an item's content; carries either rendered text or an
/// audio transcript.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentPart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

impl ConversationItem {
    pub fn is_function_call(&self) -> bool {
        self.kind == "function_call"
    }

    pub fn is_message(&self) -> bool {
        self.kind == "message"
    }

    /// Flattens the content parts into plain text, joining text and
    /// transcript fields the way the persistence side expects.
    pub fn flat_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for p in &self.content {
            if let Some(t) = p.text.as_deref() {
                let t = t.trim();
                if !t.is_empty() {
                    parts.push(t);
                }
            }
            if let Some(t) = p.transcript.as_deref() {
                let t = t.trim();
                if !t.is_empty() {
                    parts.push(t);
                }
            }
        }
        parts.join(" ")
    }
}

/// Outbound frames the orchestrator writes to the control channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    /// Writes a tool call's result back into the conversation.
    #[serde(rename = "conversation.item.create")]
    ItemCreate { item: FunctionCallOutput },

    /// Asks the model to resume generation. Without this the remote model
    /// stalls indefinitely after a tool call.
    #[serde(rename = "response.create")]
    ResponseCreate,
}

/// The `function_call_output` item attached to an [`OutboundFrame::ItemCreate`].
#[derive(Debug, Clone, Serialize)]
pub struct FunctionCallOutput {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub call_id: String,
    /// JSON-encoded handler result.
    pub output: String,
}

impl OutboundFrame {
    pub fn function_call_output(call_id: impl Into<String>, output: &serde_json::Value) -> Self {
        Self::ItemCreate {
            item: FunctionCallOutput {
                kind: "function_call_output",
                call_id: call_id.into(),
                output: output.to_string(),
            },
        }
    }
}
