//! Voice session orchestration for the Hearth memory companion.
//!
//! Implements the client-side lifecycle of a realtime voice conversation:
//! rolling audio capture, speaker identification, credential minting,
//! the media event loop with tool-call dispatch, turn accumulation, and
//! session-end persistence into the memory service.
//!
//! The crate is transport-agnostic: the [`SessionController`] is generic
//! over the [`MemoryBackend`], [`MediaConnector`], and
//! [`AudioEnvironment`] seams, with production implementations living in
//! `hearth-api` and fakes in tests.

pub mod capture;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod demux;
pub mod error;
pub mod events;
pub mod finish;
pub mod state;
pub mod tools;
pub mod transcript;

pub use capture::{AudioSnapshot, RollingCaptureBuffer, CAPTURE_SAMPLE_RATE};
pub use collaborators::{
    AudioEnvironment, MediaConnector, MediaSession, MemoryBackend, MicrophoneStream,
};
pub use config::SessionConfig;
pub use controller::SessionController;
pub use demux::{DemuxOutput, EventDemux};
pub use error::SessionError;
pub use events::{OutboundFrame, ServerEvent};
pub use state::{OutboundCommand, SessionState, SharedCapture, SharedSession};
pub use tools::ToolDispatcher;
pub use transcript::TurnAccumulator;
