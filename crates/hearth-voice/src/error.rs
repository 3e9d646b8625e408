use hearth_types::CollaboratorError;
use thiserror::Error;

/// Errors raised by the voice-session orchestrator.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session is already running on this controller.
    #[error("a session is already active")]
    AlreadyActive,

    /// The token collaborator reported a stubbed deployment.
    #[error("voice backend is not configured; conversation is unavailable")]
    Stubbed,

    /// Establishing the media session or control channel failed.
    #[error("media session error: {0}")]
    Media(String),

    /// The local microphone could not be acquired.
    #[error("microphone error: {0}")]
    Microphone(String),

    /// A collaborator call failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The control channel is gone; the frame could not be delivered.
    #[error("control channel closed")]
    ChannelClosed,
}
