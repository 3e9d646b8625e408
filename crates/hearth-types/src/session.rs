//! Request/response types for the memory-service collaborators.
//!
//! Field names mirror the service wire format: the token and session
//! endpoints speak camelCase-ish JSON (`participant_id`, `moment_id`,
//! `sessionMeta`), so serde rename attributes pin the exact shapes.

use crate::Turn;
use serde::{Deserialize, Serialize};

/// A prior conversation or story the new session should pick up from.
///
/// At most one resume context travels with a token request: either a past
/// session to recall (`Moment`) or a draft story to refine (`Story`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeContext {
    /// Recall a past voice session by its moment id.
    Moment(String),
    /// Review and refine a saved story by its story id.
    Story(String),
}

/// Body of the session-credential (token) request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_id: Option<String>,
}

impl TokenRequest {
    pub fn new(
        participant_id: Option<String>,
        participant_name: Option<String>,
        resume: Option<&ResumeContext>,
    ) -> Self {
        let mut req = Self {
            participant_id,
            participant_name,
            ..Self::default()
        };
        match resume {
            Some(ResumeContext::Moment(id)) => req.moment_id = Some(id.clone()),
            Some(ResumeContext::Story(id)) => req.story_id = Some(id.clone()),
            None => {}
        }
        req
    }
}

/// Session credential minted by the token collaborator.
///
/// `stubbed: true` means no conversational backend is configured; the
/// session must not try to connect and should explain that to the user.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub value: Option<String>,
    /// Alias some deployments send instead of `value`.
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub stubbed: bool,
}

impl TokenGrant {
    /// The usable credential, whichever field it arrived in.
    pub fn secret(&self) -> Option<&str> {
        self.value
            .as_deref()
            .or(self.client_secret.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Result of the speaker-identification collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentifyOutcome {
    pub recognized: bool,
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Result of a voice enrollment upload.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollOutcome {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
    /// Seconds of additional speech still needed, when enrollment is partial.
    #[serde(default)]
    pub remaining_speech_sec: Option<f64>,
}

/// A participant as referenced by the orchestrator: id and display label,
/// never the full record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParticipantRef {
    pub id: String,
    pub label: String,
}

/// A saved story as returned by the confirm-story collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryRef {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Signed playback location for a shared story's audio.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackLocation {
    pub url: String,
}

/// Everything the persistence collaborator needs to store a finished
/// session: the participant, the ordered turns, and the derived recall
/// metadata.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedSession {
    pub participant_id: String,
    pub turns: Vec<Turn>,
    pub summary: String,
    pub keywords: Vec<String>,
}
