//! Session lifecycle controller.
//!
//! Drives one voice session from `Idle` through the optional
//! `Identifying` phase, `Connecting` (credential mint plus media
//! connect), the live `Connected` loop, and into `Ended`. All io runs in
//! spawned tasks that share state through [`SharedSession`]; the
//! controller itself only sequences phase transitions and owns teardown.

use crate::capture::RollingCaptureBuffer;
use crate::collaborators::{
    AudioEnvironment, MediaConnector, MediaSession, MemoryBackend, MicrophoneStream,
};
use crate::config::SessionConfig;
use crate::demux::{DemuxOutput, EventDemux};
use crate::error::SessionError;
use crate::finish;
use crate::state::{OutboundCommand, SessionState, SharedCapture, SharedSession};
use crate::tools::ToolDispatcher;
use hearth_types::{ResumeContext, TokenRequest};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Outbound command channel depth. Tool results are small and rare;
/// backpressure here would mean the io task died.
const OUTBOUND_DEPTH: usize = 64;

/// How often the identify phase re-checks the capture buffer.
const IDENTIFY_POLL: Duration = Duration::from_millis(100);

/// Extra wall-clock allowance past the clip length before identification
/// is skipped because the microphone is not delivering.
const IDENTIFY_GRACE: Duration = Duration::from_secs(4);

/// Orchestrates one voice session against a memory backend, a media
/// connector, and the local audio environment.
pub struct SessionController<B, M, A> {
    config: SessionConfig,
    backend: Arc<B>,
    connector: Arc<M>,
    audio: Arc<A>,
    shared: Arc<SharedSession>,
    capture: SharedCapture,
    /// Correlates log lines across one session's tasks.
    session_id: uuid::Uuid,
}

impl<B, M, A> SessionController<B, M, A>
where
    B: MemoryBackend,
    M: MediaConnector,
    A: AudioEnvironment,
{
    pub fn new(config: SessionConfig, backend: B, connector: M, audio: A) -> Self {
        let capture = Arc::new(Mutex::new(RollingCaptureBuffer::new(
            config.capture_capacity_secs,
        )));
        Self {
            config,
            backend: Arc::new(backend),
            connector: Arc::new(connector),
            audio: Arc::new(audio),
            shared: SharedSession::new(),
            capture,
            session_id: uuid::Uuid::new_v4(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch handle over lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.watch_state()
    }

    pub fn participant_id(&self) -> Option<String> {
        self.shared.participant_id()
    }

    pub fn participant_label(&self) -> Option<String> {
        self.shared.participant_label()
    }

    /// Turns accumulated so far, in arrival order.
    pub fn transcript(&self) -> Vec<hearth_types::Turn> {
        self.shared.transcript_snapshot()
    }

    /// Starts a session. Returns once the live conversation is up
    /// (`Connected`) or setup failed; a prior session in a terminal state
    /// is replaced by fresh state so nothing carries across.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        match self.shared.state() {
            SessionState::Idle => {}
            SessionState::Ended | SessionState::Stubbed | SessionState::Error(_) => self.reset(),
            _ => return Err(SessionError::AlreadyActive),
        }

        let mic = match self.audio.open_microphone().await {
            Ok(mic) => mic,
            Err(e) => {
                let msg = e.to_string();
                tracing::error!(error = %msg, "microphone acquisition failed");
                self.shared.set_state(SessionState::Error(msg));
                return Err(e);
            }
        };
        self.spawn_feed_task(mic);

        if let Some(id) = self.config.participant_id.clone() {
            let epoch = self.shared.epoch();
            self.shared.set_participant(epoch, id, None);
        } else {
            self.identify_phase().await;
        }

        self.shared.set_state(SessionState::Connecting);
        let req = TokenRequest::new(
            self.shared.participant_id(),
            self.shared.participant_label(),
            self.config.resume.as_ref(),
        );
        let grant = match self.backend.mint_token(req).await {
            Ok(grant) => grant,
            Err(e) => {
                let msg = e.to_string();
                tracing::error!(error = %msg, "token mint failed");
                self.shared.set_state(SessionState::Error(msg));
                self.shared.teardown(&self.capture);
                return Err(e.into());
            }
        };
        if grant.stubbed {
            tracing::info!("voice backend is stubbed; not connecting");
            self.shared.set_state(SessionState::Stubbed);
            self.shared.teardown(&self.capture);
            return Err(SessionError::Stubbed);
        }

        let session = match self.connector.connect(&grant).await {
            Ok(session) => session,
            Err(e) => {
                let msg = e.to_string();
                tracing::error!(error = %msg, "media connect failed");
                self.shared.set_state(SessionState::Error(msg));
                self.shared.teardown(&self.capture);
                return Err(e);
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_DEPTH);
        self.shared.set_outbound(outbound_tx.clone());
        let dispatcher = ToolDispatcher::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.backend),
            Arc::clone(&self.audio),
            Arc::clone(&self.capture),
            outbound_tx,
            match &self.config.resume {
                Some(ResumeContext::Moment(id)) => Some(id.clone()),
                _ => None,
            },
            self.config.tool_call_timeout(),
        );

        // Connected lands before the io task exists so a media session
        // that drops immediately still observes a non-terminal state and
        // tears down.
        self.shared.set_state(SessionState::Connected);

        // The io task is driven to exit by the Shutdown command rather
        // than abort, so the socket closes cleanly; teardown falls back
        // to cancelling it if the command cannot be delivered.
        let io = tokio::spawn(run_io(
            session,
            outbound_rx,
            dispatcher,
            Arc::clone(&self.shared),
            Arc::clone(&self.capture),
        ));
        self.shared.set_io_task(io);
        self.spawn_enroll_task();
        self.spawn_voiceprint_task();

        tracing::info!(
            session_id = %self.session_id,
            participant_id = self.shared.participant_id().as_deref().unwrap_or("unknown"),
            model = %grant.model,
            "voice session connected"
        );
        Ok(())
    }

    /// The deliberate end of a conversation: persist (unless the user
    /// asked to forget), then tear everything down.
    pub async fn end(&self) {
        if self.shared.state() == SessionState::Connected {
            if self.shared.discard_on_end() {
                tracing::info!("session discarded at the user's request");
            } else {
                finish::persist_session(self.backend.as_ref(), &self.shared).await;
            }
        }
        self.shared.teardown(&self.capture);
        tracing::info!(session_id = %self.session_id, "voice session ended");
    }

    /// Immediate teardown with no persistence; callable from any state.
    pub fn teardown(&self) {
        self.shared.teardown(&self.capture);
    }

    fn reset(&mut self) {
        self.shared.teardown(&self.capture);
        self.shared = SharedSession::new();
        self.capture = Arc::new(Mutex::new(RollingCaptureBuffer::new(
            self.config.capture_capacity_secs,
        )));
        self.session_id = uuid::Uuid::new_v4();
    }

    /// Captures a short clip and asks the backend who is speaking. Every
    /// failure path here is non-fatal: an unidentified session proceeds
    /// and the assistant asks for a name instead.
    async fn identify_phase(&self) {
        match self.backend.any_enrolled_voiceprints().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!(error = %e, "voiceprint inventory check failed; skipping identification");
                return;
            }
        }

        self.shared.set_state(SessionState::Identifying);
        let clip_secs = self.config.identify_clip_secs;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(clip_secs as u64) + IDENTIFY_GRACE;
        loop {
            let buffered = match self.capture.lock() {
                Ok(buf) => buf.buffered_secs(),
                Err(_) => return,
            };
            if buffered >= clip_secs as f64 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(buffered_secs = buffered, "not enough audio for identification; skipping");
                return;
            }
            tokio::time::sleep(IDENTIFY_POLL).await;
        }

        let wav = match self.capture.lock() {
            Ok(buf) => buf.snapshot_tail(clip_secs).to_wav(),
            Err(_) => return,
        };
        match self.backend.identify(wav).await {
            Ok(outcome) if outcome.recognized => {
                if let Some(id) = outcome.participant_id {
                    tracing::info!(participant_id = %id, label = outcome.label.as_deref().unwrap_or(""), "speaker identified");
                    let epoch = self.shared.epoch();
                    self.shared.set_participant(epoch, id, outcome.label);
                }
            }
            Ok(_) => {
                tracing::info!("speaker not recognized");
            }
            Err(e) => {
                tracing::warn!(error = %e, "identification failed; continuing unidentified");
            }
        }
    }

    /// Feeds microphone chunks into the rolling capture buffer until the
    /// device stops or teardown aborts the task.
    fn spawn_feed_task(&self, mut mic: A::Mic) {
        let capture = Arc::clone(&self.capture);
        let task = tokio::spawn(async move {
            while let Some(chunk) = mic.next_chunk().await {
                if let Ok(mut buf) = capture.lock() {
                    buf.write(&chunk);
                }
            }
            tracing::debug!("microphone stream ended");
        });
        self.shared.register_task(task);
    }

    /// Periodically uploads an enrollment snapshot once a participant is
    /// known. Failures only log; the next tick retries with fresh audio.
    fn spawn_enroll_task(&self) {
        let shared = Arc::clone(&self.shared);
        let backend = Arc::clone(&self.backend);
        let capture = Arc::clone(&self.capture);
        let period = self.config.enroll_interval();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(participant_id) = shared.participant_id() else {
                    continue;
                };
                let snapshot = match capture.lock() {
                    Ok(buf) => buf.snapshot(),
                    Err(_) => continue,
                };
                if snapshot.duration_secs() < 2.0 {
                    continue;
                }
                match backend.enroll_voice(&participant_id, snapshot.to_wav()).await {
                    Ok(outcome) => tracing::debug!(
                        participant_id = %participant_id,
                        remaining_speech_sec = outcome.remaining_speech_sec,
                        "enrollment snapshot uploaded"
                    ),
                    Err(e) => tracing::debug!(error = %e, "enrollment snapshot failed"),
                }
            }
        });
        self.shared.register_task(task);
    }

    /// Creates a voice print once: opted in, participant known, and
    /// enough audio buffered.
    fn spawn_voiceprint_task(&self) {
        if !self.config.voiceprint_opt_in {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let backend = Arc::clone(&self.backend);
        let capture = Arc::clone(&self.capture);
        let period = self.config.voiceprint_check_interval();
        let min_secs = self.config.voiceprint_min_secs;
        let epoch = self.shared.epoch();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if shared.voiceprint_created() {
                    return;
                }
                let Some(participant_id) = shared.participant_id() else {
                    continue;
                };
                let snapshot = match capture.lock() {
                    Ok(buf) => buf.snapshot(),
                    Err(_) => continue,
                };
                if snapshot.duration_secs() < min_secs {
                    continue;
                }
                match backend.create_voiceprint(&participant_id, snapshot.to_wav()).await {
                    Ok(()) => {
                        tracing::info!(participant_id = %participant_id, "voice print created");
                        shared.set_voiceprint_created(epoch);
                        return;
                    }
                    Err(e) => tracing::warn!(error = %e, "voice print creation failed"),
                }
            }
        });
        self.shared.register_task(task);
    }
}

/// Owns the media session: forwards outbound frames, demultiplexes
/// inbound payloads into transcript turns and tool-call events, and
/// closes the socket on the way out.
async fn run_io<S, B, A>(
    mut session: S,
    mut rx: mpsc::Receiver<OutboundCommand>,
    mut dispatcher: ToolDispatcher<B, A>,
    shared: Arc<SharedSession>,
    capture: SharedCapture,
) where
    S: MediaSession,
    B: MemoryBackend,
    A: AudioEnvironment,
{
    let mut demux = EventDemux::new();
    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(OutboundCommand::Frame(frame)) => {
                    if let Err(e) = session.send(frame).await {
                        tracing::warn!(error = %e, "outbound frame send failed");
                    }
                }
                Some(OutboundCommand::Shutdown) | None => break,
            },
            payload = session.recv() => match payload {
                Some(raw) => {
                    for output in demux.absorb(&raw) {
                        match output {
                            DemuxOutput::Turn { role, content } => shared.push_turn(role, content),
                            DemuxOutput::ToolCallAdded { call_id, name } => {
                                dispatcher.on_call_added(call_id, name)
                            }
                            DemuxOutput::ToolArgsDelta { call_id, delta } => {
                                dispatcher.on_args_delta(&call_id, &delta)
                            }
                            DemuxOutput::ToolArgsDone { call_id, name, arguments } => {
                                dispatcher.on_args_done(call_id, name, arguments)
                            }
                        }
                    }
                }
                None => {
                    // Media failure mid-conversation: tear down without
                    // persisting the possibly-truncated transcript. Skip
                    // only when a terminal state already landed.
                    match shared.state() {
                        SessionState::Ended
                        | SessionState::Stubbed
                        | SessionState::Error(_) => {}
                        _ => {
                            tracing::warn!("media session closed unexpectedly");
                            shared.teardown(&capture);
                        }
                    }
                    break;
                }
            }
        }
    }
    session.close().await;
    tracing::debug!("io task exited");
}
