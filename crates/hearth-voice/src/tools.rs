//! Tool-call dispatch protocol.
//!
//! The conversational model invokes local tools over the control channel:
//! an `added` event opens a call, `arguments-delta` events stream the JSON
//! argument text, and `arguments-done` closes it. Pending calls are keyed
//! by call id so two calls in flight at once cannot cross-contaminate each
//! other's fragments.
//!
//! Every completed call (success, failure, or timeout) writes exactly
//! one `function_call_output` frame for its call id followed by a
//! `response.create`; the remote model stalls indefinitely otherwise.
//! Handlers run as spawned tasks so a network-bound call never blocks
//! delivery of unrelated channel events.

use crate::capture::AudioSnapshot;
use crate::collaborators::{AudioEnvironment, MemoryBackend};
use crate::events::OutboundFrame;
use crate::state::{OutboundCommand, SharedCapture, SharedSession};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One in-flight tool invocation.
#[derive(Debug, Default)]
struct PendingToolCall {
    name: String,
    fragments: String,
}

/// Matches completed tool-call payloads to handlers and writes results
/// back to the control channel.
pub struct ToolDispatcher<B, A> {
    pending: HashMap<String, PendingToolCall>,
    shared: Arc<SharedSession>,
    backend: Arc<B>,
    audio: Arc<A>,
    capture: SharedCapture,
    outbound: mpsc::Sender<OutboundCommand>,
    /// `moment_id` the session resumed from, attached to confirmed stories.
    source_moment_id: Option<String>,
    timeout: Duration,
}

impl<B: MemoryBackend, A: AudioEnvironment> ToolDispatcher<B, A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shared: Arc<SharedSession>,
        backend: Arc<B>,
        audio: Arc<A>,
        capture: SharedCapture,
        outbound: mpsc::Sender<OutboundCommand>,
        source_moment_id: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            pending: HashMap::new(),
            shared,
            backend,
            audio,
            capture,
            outbound,
            source_moment_id,
            timeout,
        }
    }

    /// A function-call item was added: record the call and reset its
    /// fragment buffer.
    pub fn on_call_added(&mut self, call_id: String, name: String) {
        tracing::debug!(call_id = %call_id, tool = %name, "tool call opened");
        self.pending.insert(
            call_id,
            PendingToolCall {
                name,
                fragments: String::new(),
            },
        );
    }

    /// Appends an argument fragment to its call's buffer.
    pub fn on_args_delta(&mut self, call_id: &str, delta: &str) {
        self.pending
            .entry(call_id.to_string())
            .or_default()
            .fragments
            .push_str(delta);
    }

    /// Arguments are complete: resolve the handler and execute it on a
    /// spawned task.
    pub fn on_args_done(&mut self, call_id: String, name: Option<String>, arguments: String) {
        let pending = self.pending.remove(&call_id).unwrap_or_default();
        let tool_name = name
            .filter(|n| !n.is_empty())
            .unwrap_or(pending.name);
        let raw_args = if arguments.trim().is_empty() {
            pending.fragments
        } else {
            arguments
        };

        let shared = self.shared.clone();
        let backend = self.backend.clone();
        let audio = self.audio.clone();
        let capture = self.capture.clone();
        let outbound = self.outbound.clone();
        let source_moment_id = self.source_moment_id.clone();
        let timeout = self.timeout;
        let epoch = self.shared.epoch();

        let task = tokio::spawn(async move {
            let args: Value = serde_json::from_str(&raw_args).unwrap_or_else(|_| json!({}));
            let run = execute_tool(
                &shared,
                backend.as_ref(),
                audio.as_ref(),
                &capture,
                epoch,
                &tool_name,
                &args,
                source_moment_id.as_deref(),
            );
            let output = match tokio::time::timeout(timeout, run).await {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(call_id = %call_id, tool = %tool_name, "tool call timed out");
                    json!({"ok": false, "error": "The request timed out."})
                }
            };

            let frame = OutboundFrame::function_call_output(&call_id, &output);
            if outbound.send(OutboundCommand::Frame(frame)).await.is_err() {
                // Session torn down while the call was in flight; its
                // result is discarded.
                tracing::debug!(call_id = %call_id, "dropping tool output for ended session");
                return;
            }
            let _ = outbound
                .send(OutboundCommand::Frame(OutboundFrame::ResponseCreate))
                .await;
        });
        self.shared.register_task(task);
    }
}

/// Runs one named tool handler and returns its structured result.
///
/// Handler failures become error results; they never propagate.
#[allow(clippy::too_many_arguments)]
async fn execute_tool<B: MemoryBackend, A: AudioEnvironment>(
    shared: &SharedSession,
    backend: &B,
    audio: &A,
    capture: &SharedCapture,
    epoch: u64,
    name: &str,
    args: &Value,
    source_moment_id: Option<&str>,
) -> Value {
    match name {
        "forget_current_conversation" => {
            if shared.set_discard_on_end(epoch) {
                tracing::info!("conversation marked discard-on-end");
            }
            json!({"ok": true, "message": "This conversation will not be saved."})
        }

        "create_participant" => {
            let given_name = args.get("name").and_then(|v| v.as_str()).unwrap_or("").trim();
            if given_name.is_empty() {
                return json!({"ok": false, "error": "A name is required."});
            }
            match backend.create_participant(given_name).await {
                Ok(participant) => {
                    let applied =
                        shared.set_participant(
                            epoch,
                            participant.id.clone(),
                            Some(participant.label.clone()),
                        );
                    if applied {
                        enroll_from_recent_audio(backend, capture, &participant.id).await;
                    }
                    json!({
                        "ok": true,
                        "participant_id": participant.id,
                        "label": participant.label,
                    })
                }
                Err(e) => {
                    tracing::warn!(name = %given_name, error = %e, "create_participant failed");
                    json!({"ok": false, "error": e.to_string()})
                }
            }
        }

        "confirm_story" => {
            let story_text = args
                .get("story_text")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .trim();
            if story_text.is_empty() {
                return json!({"ok": false, "error": "story_text is required."});
            }
            let Some(participant_id) = shared.participant_id() else {
                return json!({
                    "ok": false,
                    "error": "No participant is known yet; ask for their name first.",
                });
            };
            match backend
                .confirm_story(&participant_id, story_text, source_moment_id)
                .await
            {
                Ok(story) => json!({
                    "ok": true,
                    "story_id": story.id,
                    "title": story.title,
                }),
                Err(e) => {
                    tracing::warn!(participant_id = %participant_id, error = %e, "confirm_story failed");
                    json!({"ok": false, "error": e.to_string()})
                }
            }
        }

        "play_story" => {
            let moment_id = args
                .get("moment_id")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .trim();
            if moment_id.is_empty() {
                return json!({"ok": false, "error": "moment_id is required."});
            }
            let location = match backend.story_playback(moment_id).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(moment_id = %moment_id, error = %e, "playback lookup failed");
                    return json!({"ok": false, "error": e.to_string()});
                }
            };
            let play_result = audio.play(&location.url).await;
            // Listened notification is independent of playback success and
            // never surfaced.
            if let Some(participant_id) = shared.participant_id() {
                if let Err(e) = backend.mark_story_listened(moment_id, &participant_id).await {
                    tracing::debug!(moment_id = %moment_id, error = %e, "listened notification failed");
                }
            }
            match play_result {
                Ok(()) => json!({"ok": true, "playing": true}),
                Err(e) => json!({"ok": false, "error": e.to_string()}),
            }
        }

        other => {
            tracing::warn!(tool = %other, "unknown tool requested");
            json!({"ok": false, "error": format!("Unknown tool: {}", other)})
        }
    }
}

/// Enrolls the participant from the most recent buffered audio; failures
/// are logged and otherwise invisible.
async fn enroll_from_recent_audio<B: MemoryBackend>(
    backend: &B,
    capture: &SharedCapture,
    participant_id: &str,
) {
    let snapshot: AudioSnapshot = match capture.lock() {
        Ok(buf) => buf.snapshot(),
        Err(_) => return,
    };
    if snapshot.is_empty() {
        return;
    }
    match backend.enroll_voice(participant_id, snapshot.to_wav()).await {
        Ok(outcome) => {
            tracing::debug!(
                participant_id = %participant_id,
                ok = outcome.ok,
                remaining = ?outcome.remaining_speech_sec,
                "enrolled from recent audio"
            );
        }
        Err(e) => {
            tracing::debug!(participant_id = %participant_id, error = %e, "initial enrollment failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RollingCaptureBuffer;
    use crate::collaborators::MicrophoneStream;
    use crate::error::SessionError;
    use hearth_types::{
        CollaboratorError, CompletedSession, EnrollOutcome, IdentifyOutcome, ParticipantRef,
        PlaybackLocation, StoryRef, TokenGrant, TokenRequest,
    };
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingBackend {
        created_names: StdMutex<Vec<String>>,
        confirmed: StdMutex<Vec<(String, String, Option<String>)>>,
        listened: StdMutex<Vec<(String, String)>>,
        enrolled: StdMutex<Vec<String>>,
        fail_create: bool,
        hang_create: bool,
    }

    impl MemoryBackend for RecordingBackend {
        async fn any_enrolled_voiceprints(&self) -> Result<bool, CollaboratorError> {
            Ok(false)
        }

        async fn identify(&self, _wav: Vec<u8>) -> Result<IdentifyOutcome, CollaboratorError> {
            Ok(IdentifyOutcome::default())
        }

        async fn mint_token(&self, _req: TokenRequest) -> Result<TokenGrant, CollaboratorError> {
            Err(CollaboratorError::Unavailable("not under test".into()))
        }

        async fn enroll_voice(
            &self,
            participant_id: &str,
            _wav: Vec<u8>,
        ) -> Result<EnrollOutcome, CollaboratorError> {
            self.enrolled.lock().unwrap().push(participant_id.to_string());
            Ok(EnrollOutcome {
                ok: true,
                message: "Enrolled".into(),
                remaining_speech_sec: None,
            })
        }

        async fn create_voiceprint(
            &self,
            _participant_id: &str,
            _wav: Vec<u8>,
        ) -> Result<(), CollaboratorError> {
            Ok(())
        }

        async fn create_participant(
            &self,
            name: &str,
        ) -> Result<ParticipantRef, CollaboratorError> {
            if self.hang_create {
                std::future::pending::<()>().await;
            }
            if self.fail_create {
                return Err(CollaboratorError::Status {
                    status: 500,
                    detail: "db down".into(),
                });
            }
            self.created_names.lock().unwrap().push(name.to_string());
            Ok(ParticipantRef {
                id: format!("p-{}", name.to_lowercase()),
                label: name.to_string(),
            })
        }

        async fn confirm_story(
            &self,
            participant_id: &str,
            story_text: &str,
            source_moment_id: Option<&str>,
        ) -> Result<StoryRef, CollaboratorError> {
            self.confirmed.lock().unwrap().push((
                participant_id.to_string(),
                story_text.to_string(),
                source_moment_id.map(str::to_string),
            ));
            Ok(StoryRef {
                id: "story-1".into(),
                title: Some("The Lake".into()),
            })
        }

        async fn story_playback(
            &self,
            moment_id: &str,
        ) -> Result<PlaybackLocation, CollaboratorError> {
            Ok(PlaybackLocation {
                url: format!("https://blobs.example/{}?sig=abc", moment_id),
            })
        }

        async fn mark_story_listened(
            &self,
            moment_id: &str,
            participant_id: &str,
        ) -> Result<(), CollaboratorError> {
            self.listened
                .lock()
                .unwrap()
                .push((moment_id.to_string(), participant_id.to_string()));
            Ok(())
        }

        async fn complete_session(
            &self,
            _session: CompletedSession,
        ) -> Result<String, CollaboratorError> {
            Ok("moment-1".into())
        }
    }

    struct NoMic;

    impl MicrophoneStream for NoMic {
        async fn next_chunk(&mut self) -> Option<Vec<i16>> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingAudio {
        played: StdMutex<Vec<String>>,
    }

    impl AudioEnvironment for RecordingAudio {
        type Mic = NoMic;

        async fn open_microphone(&self) -> Result<NoMic, SessionError> {
            Ok(NoMic)
        }

        async fn play(&self, url: &str) -> Result<(), SessionError> {
            self.played.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: ToolDispatcher<RecordingBackend, RecordingAudio>,
        backend: Arc<RecordingBackend>,
        audio: Arc<RecordingAudio>,
        shared: Arc<SharedSession>,
        rx: mpsc::Receiver<OutboundCommand>,
    }

    fn fixture_with(backend: RecordingBackend) -> Fixture {
        fixture_with_timeout(backend, Duration::from_secs(30))
    }

    fn fixture_with_timeout(backend: RecordingBackend, timeout: Duration) -> Fixture {
        let shared = SharedSession::new();
        let backend = Arc::new(backend);
        let audio = Arc::new(RecordingAudio::default());
        let capture: SharedCapture = Arc::new(StdMutex::new(RollingCaptureBuffer::new(10)));
        capture.lock().unwrap().write(&[3i16; 16_000]);
        let (tx, rx) = mpsc::channel(32);
        let dispatcher = ToolDispatcher::new(
            shared.clone(),
            backend.clone(),
            audio.clone(),
            capture,
            tx,
            None,
            timeout,
        );
        Fixture {
            dispatcher,
            backend,
            audio,
            shared,
            rx,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingBackend::default())
    }

    /// Receives the output frame + resume pair for one resolved call.
    async fn recv_output(rx: &mut mpsc::Receiver<OutboundCommand>) -> (String, Value) {
        let frame = rx.recv().await.expect("expected a function_call_output");
        let (call_id, output) = match frame {
            OutboundCommand::Frame(OutboundFrame::ItemCreate { item }) => (
                item.call_id,
                serde_json::from_str(&item.output).expect("output is JSON"),
            ),
            other => panic!("expected ItemCreate, got {:?}", other),
        };
        match rx.recv().await.expect("expected a response.create") {
            OutboundCommand::Frame(OutboundFrame::ResponseCreate) => {}
            other => panic!("expected ResponseCreate, got {:?}", other),
        }
        (call_id, output)
    }

    #[tokio::test]
    async fn fragments_reassemble_in_order() {
        let mut fx = fixture();
        fx.dispatcher
            .on_call_added("c1".into(), "create_participant".into());
        for piece in [r#"{"na"#, r#"me":"Jor"#, r#"dan"}"#] {
            fx.dispatcher.on_args_delta("c1", piece);
        }
        fx.dispatcher.on_args_done("c1".into(), None, String::new());

        let (call_id, output) = recv_output(&mut fx.rx).await;
        assert_eq!(call_id, "c1");
        assert_eq!(output["ok"], true);
        assert_eq!(output["participant_id"], "p-jordan");
        assert_eq!(
            fx.backend.created_names.lock().unwrap().as_slice(),
            &["Jordan".to_string()]
        );
    }

    #[tokio::test]
    async fn interleaved_calls_keep_their_own_fragments() {
        let mut fx = fixture();
        fx.dispatcher
            .on_call_added("a".into(), "create_participant".into());
        fx.dispatcher
            .on_call_added("b".into(), "create_participant".into());
        fx.dispatcher.on_args_delta("a", r#"{"name":"Al"#);
        fx.dispatcher.on_args_delta("b", r#"{"name":"Bea"#);
        fx.dispatcher.on_args_delta("a", r#"ice"}"#);
        fx.dispatcher.on_args_delta("b", r#"trix"}"#);
        fx.dispatcher.on_args_done("b".into(), None, String::new());
        fx.dispatcher.on_args_done("a".into(), None, String::new());

        let mut seen = std::collections::HashMap::new();
        for _ in 0..2 {
            let (call_id, output) = recv_output(&mut fx.rx).await;
            seen.insert(call_id, output["participant_id"].as_str().unwrap().to_string());
        }
        assert_eq!(seen["a"], "p-alice");
        assert_eq!(seen["b"], "p-beatrix");
    }

    #[tokio::test]
    async fn inline_arguments_win_over_fragments() {
        let mut fx = fixture();
        fx.dispatcher
            .on_call_added("c2".into(), "create_participant".into());
        fx.dispatcher.on_args_delta("c2", r#"{"name":"Old"}"#);
        fx.dispatcher
            .on_args_done("c2".into(), None, r#"{"name":"Fresh"}"#.into());

        let (_, output) = recv_output(&mut fx.rx).await;
        assert_eq!(output["label"], "Fresh");
    }

    #[tokio::test]
    async fn forget_sets_discard_flag_and_confirms() {
        let mut fx = fixture();
        fx.dispatcher
            .on_call_added("c3".into(), "forget_current_conversation".into());
        fx.dispatcher.on_args_done("c3".into(), None, "{}".into());

        let (_, output) = recv_output(&mut fx.rx).await;
        assert_eq!(output["ok"], true);
        assert!(fx.shared.discard_on_end());
    }

    #[tokio::test]
    async fn create_participant_updates_session_and_enrolls() {
        let mut fx = fixture();
        fx.dispatcher
            .on_call_added("c4".into(), "create_participant".into());
        fx.dispatcher
            .on_args_done("c4".into(), None, r#"{"name":"Jordan"}"#.into());

        let (_, output) = recv_output(&mut fx.rx).await;
        let id = output["participant_id"].as_str().unwrap();
        assert!(!id.is_empty());
        assert_eq!(fx.shared.participant_id().as_deref(), Some(id));
        // Enrollment was triggered from the recent audio snapshot.
        assert_eq!(fx.backend.enrolled.lock().unwrap().as_slice(), &[id.to_string()]);
    }

    #[tokio::test]
    async fn create_participant_failure_returns_structured_error() {
        let mut fx = fixture_with(RecordingBackend {
            fail_create: true,
            ..RecordingBackend::default()
        });
        fx.dispatcher
            .on_call_added("c5".into(), "create_participant".into());
        fx.dispatcher
            .on_args_done("c5".into(), None, r#"{"name":"Jordan"}"#.into());

        let (_, output) = recv_output(&mut fx.rx).await;
        assert_eq!(output["ok"], false);
        assert!(fx.shared.participant_id().is_none());
    }

    #[tokio::test]
    async fn stalled_handler_resolves_with_a_timeout_error() {
        let mut fx = fixture_with_timeout(
            RecordingBackend {
                hang_create: true,
                ..RecordingBackend::default()
            },
            Duration::from_millis(50),
        );
        fx.dispatcher
            .on_call_added("c9".into(), "create_participant".into());
        fx.dispatcher
            .on_args_done("c9".into(), None, r#"{"name":"Jordan"}"#.into());

        // The hung handler still produces exactly one output frame and a
        // resume, so the remote model is never left waiting.
        let (call_id, output) = recv_output(&mut fx.rx).await;
        assert_eq!(call_id, "c9");
        assert_eq!(output["ok"], false);
        assert_eq!(output["error"], "The request timed out.");
        assert!(fx.backend.created_names.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirm_story_requires_known_participant() {
        let mut fx = fixture();
        fx.dispatcher.on_call_added("c6".into(), "confirm_story".into());
        fx.dispatcher.on_args_done(
            "c6".into(),
            None,
            r#"{"story_text":"We went to the lake in 1985."}"#.into(),
        );
        let (_, output) = recv_output(&mut fx.rx).await;
        assert_eq!(output["ok"], false);
        assert!(fx.backend.confirmed.lock().unwrap().is_empty());

        // With a participant it succeeds and returns the story id.
        let epoch = fx.shared.epoch();
        fx.shared.set_participant(epoch, "p1".into(), Some("Sarah".into()));
        fx.dispatcher.on_call_added("c7".into(), "confirm_story".into());
        fx.dispatcher.on_args_done(
            "c7".into(),
            None,
            r#"{"story_text":"We went to the lake in 1985."}"#.into(),
        );
        let (_, output) = recv_output(&mut fx.rx).await;
        assert_eq!(output["ok"], true);
        assert_eq!(output["story_id"], "story-1");
        let confirmed = fx.backend.confirmed.lock().unwrap();
        assert_eq!(confirmed[0].0, "p1");
        assert_eq!(confirmed[0].1, "We went to the lake in 1985.");
    }

    #[tokio::test]
    async fn play_story_plays_and_notifies_listened() {
        let mut fx = fixture();
        let epoch = fx.shared.epoch();
        fx.shared.set_participant(epoch, "p1".into(), Some("Sarah".into()));
        fx.dispatcher.on_call_added("c8".into(), "play_story".into());
        fx.dispatcher
            .on_args_done("c8".into(), None, r#"{"moment_id":"m42"}"#.into());

        let (_, output) = recv_output(&mut fx.rx).await;
        assert_eq!(output["ok"], true);
        assert_eq!(output["playing"], true);
        assert_eq!(
            fx.audio.played.lock().unwrap().as_slice(),
            &["https://blobs.example/m42?sig=abc".to_string()]
        );
        assert_eq!(
            fx.backend.listened.lock().unwrap().as_slice(),
            &[("m42".to_string(), "p1".to_string())]
        );
    }

    #[tokio::test]
    async fn unknown_tool_still_resolves_its_call() {
        let mut fx = fixture();
        fx.dispatcher
            .on_call_added("c9".into(), "reticulate_splines".into());
        fx.dispatcher.on_args_done("c9".into(), None, "{}".into());

        let (call_id, output) = recv_output(&mut fx.rx).await;
        assert_eq!(call_id, "c9");
        assert_eq!(output["ok"], false);
    }
}
