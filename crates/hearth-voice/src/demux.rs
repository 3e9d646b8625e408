//! Event stream demultiplexer.
//!
//! One control-channel delivery may contain several newline-delimited JSON
//! frames. The demultiplexer splits deliveries, parses each frame into a
//! [`ServerEvent`], accumulates per-item transcription deltas, and emits
//! routed outputs for the turn accumulator and the tool dispatcher. A bad
//! frame never fails the batch: malformed or unrecognized frames are
//! skipped (logged at debug), so one garbled delivery cannot take the
//! session down.

use crate::events::ServerEvent;
use hearth_types::TurnRole;
use std::collections::HashMap;

/// Routed output of one demultiplexed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DemuxOutput {
    /// A finalized conversation turn, in emission order.
    Turn { role: TurnRole, content: String },
    /// A tool invocation began.
    ToolCallAdded { call_id: String, name: String },
    /// A fragment of a tool call's arguments.
    ToolArgsDelta { call_id: String, delta: String },
    /// A tool call's arguments are complete.
    ToolArgsDone {
        call_id: String,
        name: Option<String>,
        arguments: String,
    },
}

/// Splits raw deliveries into typed, routed events.
#[derive(Debug, Default)]
pub struct EventDemux {
    /// Partial user transcripts keyed by item id.
    partial_transcripts: HashMap<String, String>,
}

impl EventDemux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one raw delivery and returns the routed outputs, in frame
    /// order.
    pub fn absorb(&mut self, payload: &str) -> Vec<DemuxOutput> {
        let mut out = Vec::new();
        for frame in payload.lines() {
            let frame = frame.trim();
            if frame.is_empty() {
                continue;
            }
            match serde_json::from_str::<ServerEvent>(frame) {
                Ok(event) => self.route(event, &mut out),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unrecognized control frame");
                }
            }
        }
        out
    }

    fn route(&mut self, event: ServerEvent, out: &mut Vec<DemuxOutput>) {
        match event {
            ServerEvent::TranscriptionDelta { item_id, delta } => {
                self.partial_transcripts
                    .entry(item_id)
                    .or_default()
                    .push_str(&delta);
            }
            ServerEvent::TranscriptionCompleted {
                item_id,
                transcript,
            } => {
                // Prefer the event's own completed transcript; fall back to
                // the accumulated deltas for this item.
                let accumulated = self.partial_transcripts.remove(&item_id);
                let content = if transcript.trim().is_empty() {
                    accumulated.unwrap_or_default()
                } else {
                    transcript
                };
                let content = content.trim().to_string();
                if !content.is_empty() {
                    out.push(DemuxOutput::Turn {
                        role: TurnRole::User,
                        content,
                    });
                }
            }
            ServerEvent::OutputItemAdded { item } => {
                if item.is_function_call() {
                    if let (Some(call_id), Some(name)) = (item.call_id, item.name) {
                        out.push(DemuxOutput::ToolCallAdded { call_id, name });
                    }
                }
            }
            ServerEvent::OutputItemDone { item } => {
                if item.is_message() {
                    let role = match item.role.as_deref() {
                        Some("assistant") => TurnRole::Assistant,
                        Some("user") => TurnRole::User,
                        _ => return,
                    };
                    let content = item.flat_text();
                    if !content.is_empty() {
                        out.push(DemuxOutput::Turn { role, content });
                    }
                }
            }
            ServerEvent::FunctionCallArgumentsDelta { call_id, delta } => {
                out.push(DemuxOutput::ToolArgsDelta { call_id, delta });
            }
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                out.push(DemuxOutput::ToolArgsDone {
                    call_id,
                    name,
                    arguments,
                });
            }
        }
    }
}
