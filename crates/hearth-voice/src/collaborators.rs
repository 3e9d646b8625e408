//! Trait seams for the orchestrator's external collaborators.
//!
//! The lifecycle controller is generic over these traits; `hearth-api`
//! provides the production implementations (HTTP memory service, realtime
//! WebSocket), and tests provide fakes. Methods return `impl Future +
//! Send` explicitly so implementations stay spawnable from background
//! tasks.

use crate::error::SessionError;
use crate::events::OutboundFrame;
use hearth_types::{
    CollaboratorError, CompletedSession, EnrollOutcome, IdentifyOutcome, ParticipantRef,
    PlaybackLocation, StoryRef, TokenGrant, TokenRequest,
};
use std::future::Future;

/// The memory service: every request/response collaborator of the session.
pub trait MemoryBackend: Send + Sync + 'static {
    /// Whether at least one enrolled voice print exists. Gates the
    /// `Identifying` phase; nothing to identify against otherwise.
    fn any_enrolled_voiceprints(
        &self,
    ) -> impl Future<Output = Result<bool, CollaboratorError>> + Send;

    /// Identifies the speaker from a short WAV clip.
    fn identify(
        &self,
        wav: Vec<u8>,
    ) -> impl Future<Output = Result<IdentifyOutcome, CollaboratorError>> + Send;

    /// Mints a session credential for the conversational service.
    fn mint_token(
        &self,
        req: TokenRequest,
    ) -> impl Future<Output = Result<TokenGrant, CollaboratorError>> + Send;

    /// Uploads an enrollment snapshot for a participant. Idempotent;
    /// called repeatedly during a session.
    fn enroll_voice(
        &self,
        participant_id: &str,
        wav: Vec<u8>,
    ) -> impl Future<Output = Result<EnrollOutcome, CollaboratorError>> + Send;

    /// Creates a voice print from a longer clip. The caller enforces the
    /// minimum-duration threshold before calling.
    fn create_voiceprint(
        &self,
        participant_id: &str,
        wav: Vec<u8>,
    ) -> impl Future<Output = Result<(), CollaboratorError>> + Send;

    /// Creates a participant with the given display name.
    fn create_participant(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<ParticipantRef, CollaboratorError>> + Send;

    /// Saves a confirmed story, optionally linked to the conversation or
    /// story it came from.
    fn confirm_story(
        &self,
        participant_id: &str,
        story_text: &str,
        source_moment_id: Option<&str>,
    ) -> impl Future<Output = Result<StoryRef, CollaboratorError>> + Send;

    /// Resolves the signed playback location of a shared story.
    fn story_playback(
        &self,
        moment_id: &str,
    ) -> impl Future<Output = Result<PlaybackLocation, CollaboratorError>> + Send;

    /// Records that a participant listened to a shared story.
    fn mark_story_listened(
        &self,
        moment_id: &str,
        participant_id: &str,
    ) -> impl Future<Output = Result<(), CollaboratorError>> + Send;

    /// Stores a finished session; returns the created moment id.
    fn complete_session(
        &self,
        session: CompletedSession,
    ) -> impl Future<Output = Result<String, CollaboratorError>> + Send;
}

/// An established media session: the JSON control channel plus teardown.
pub trait MediaSession: Send + 'static {
    fn send(&mut self, frame: OutboundFrame)
        -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Next raw control-channel delivery (may contain several frames).
    /// `None` means the channel closed. Must be cancel-safe: the io task
    /// races it against its command channel in a `select!`.
    fn recv(&mut self) -> impl Future<Output = Option<String>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Establishes a media session from a minted credential.
pub trait MediaConnector: Send + Sync + 'static {
    type Session: MediaSession;

    fn connect(
        &self,
        grant: &TokenGrant,
    ) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}

/// A live microphone stream of 16 kHz mono samples.
pub trait MicrophoneStream: Send + 'static {
    /// Next chunk of captured samples; `None` when the device stops.
    fn next_chunk(&mut self) -> impl Future<Output = Option<Vec<i16>>> + Send;
}

/// The local audio environment: microphone acquisition and story playback.
pub trait AudioEnvironment: Send + Sync + 'static {
    type Mic: MicrophoneStream;

    fn open_microphone(&self) -> impl Future<Output = Result<Self::Mic, SessionError>> + Send;

    /// Begins playback of a story from its signed location.
    fn play(&self, url: &str) -> impl Future<Output = Result<(), SessionError>> + Send;
}
