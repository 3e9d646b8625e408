//! Shared types and error definitions for the Hearth voice companion.
//!
//! This crate provides the types exchanged between the voice-session
//! orchestrator (`hearth-voice`) and the memory-service collaborators
//! (`hearth-api`): conversation turns, session credentials, speaker
//! identification results, and story references.
//!
//! No crate in the workspace depends on anything *except* `hearth-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod session;

pub use session::{
    CompletedSession, EnrollOutcome, IdentifyOutcome, ParticipantRef, PlaybackLocation,
    ResumeContext, StoryRef, TokenGrant, TokenRequest,
};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The person speaking into the microphone.
    User,
    /// The conversational agent.
    Assistant,
}

impl TurnRole {
    /// The wire/display form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// One utterance in the conversation transcript.
///
/// Turns are appended in the order their finalizing event arrives and are
/// handed off to the persistence collaborator at session end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Errors surfaced by external collaborator calls.
///
/// Every network-facing seam (identify, enroll, token mint, stories,
/// persistence) reports through this type so the orchestrator can apply a
/// uniform recoverable/surfaced/fatal policy regardless of which concrete
/// client sits behind the trait.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The collaborator answered with a non-success status.
    #[error("collaborator returned {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The request never completed (connect, TLS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The collaborator answered but the body was not what we expect.
    #[error("invalid collaborator response: {0}")]
    InvalidResponse(String),

    /// The collaborator exists but is not configured (stubbed deployments).
    #[error("collaborator not configured: {0}")]
    Unavailable(String),
}
