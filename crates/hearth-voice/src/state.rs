//! Shared, epoch-guarded state of the active session.
//!
//! Every mutable session field (state, participant identity, discard flag,
//! transcript) lives behind one [`SharedSession`], and every read goes
//! through it at use time rather than through values copied when a
//! background task or handler was created. The epoch counter rejects
//! results of work that outlives the session that started it: teardown
//! bumps the epoch, and any in-flight task compares its captured epoch
//! before applying a result.

use crate::capture::RollingCaptureBuffer;
use crate::events::OutboundFrame;
use crate::transcript::TurnAccumulator;
use hearth_types::{Turn, TurnRole};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Lifecycle states of a voice session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    /// Capturing a short clip and asking the identify collaborator.
    Identifying,
    /// Minting a credential and establishing the media session.
    Connecting,
    /// Live conversation.
    Connected,
    Ended,
    /// Token collaborator reported no backing service configured.
    Stubbed,
    /// Connection setup failed; retry from `Idle`.
    Error(String),
}

/// Commands for the io task that owns the media session.
#[derive(Debug)]
pub enum OutboundCommand {
    Frame(OutboundFrame),
    Shutdown,
}

/// The capture buffer as shared between the feed task and snapshot readers.
pub type SharedCapture = Arc<Mutex<RollingCaptureBuffer>>;

#[derive(Debug, Default)]
struct SessionInner {
    participant_id: Option<String>,
    participant_label: Option<String>,
    discard_on_end: bool,
    epoch: u64,
    voiceprint_created: bool,
    transcript: TurnAccumulator,
    tasks: Vec<JoinHandle<()>>,
    outbound: Option<mpsc::Sender<OutboundCommand>>,
    io_task: Option<JoinHandle<()>>,
}

/// State owned by one lifecycle controller and shared with its tasks.
#[derive(Debug)]
pub struct SharedSession {
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<SessionState>,
}

impl SharedSession {
    pub fn new() -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Arc::new(Self {
            inner: Mutex::new(SessionInner::default()),
            state_tx,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn set_state(&self, state: SessionState) {
        // send_replace so the state is updated even with no subscribers.
        self.state_tx.send_replace(state);
    }

    /// Watch handle for observers awaiting a state (tests, UI glue).
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn participant_id(&self) -> Option<String> {
        self.lock().participant_id.clone()
    }

    pub fn participant_label(&self) -> Option<String> {
        self.lock().participant_label.clone()
    }

    /// Records the participant identity, unless the session it belongs to
    /// is already gone.
    pub fn set_participant(&self, epoch: u64, id: String, label: Option<String>) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            tracing::debug!(participant_id = %id, "discarding stale participant update");
            return false;
        }
        inner.participant_id = Some(id);
        inner.participant_label = label;
        true
    }

    pub fn discard_on_end(&self) -> bool {
        self.lock().discard_on_end
    }

    pub fn set_discard_on_end(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        inner.discard_on_end = true;
        true
    }

    pub fn voiceprint_created(&self) -> bool {
        self.lock().voiceprint_created
    }

    pub fn set_voiceprint_created(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        inner.voiceprint_created = true;
        true
    }

    pub fn push_turn(&self, role: TurnRole, content: String) {
        self.lock().transcript.push(role, content);
    }

    pub fn transcript_snapshot(&self) -> Vec<Turn> {
        self.lock().transcript.snapshot()
    }

    /// Registers a task to be aborted on teardown.
    pub fn register_task(&self, task: JoinHandle<()>) {
        self.lock().tasks.push(task);
    }

    pub fn set_outbound(&self, tx: mpsc::Sender<OutboundCommand>) {
        self.lock().outbound = Some(tx);
    }

    /// Registers the io task that owns the media session. Unlike tasks
    /// from [`register_task`] it is asked to shut down gracefully first;
    /// teardown aborts it only when the command channel cannot take the
    /// shutdown request.
    pub fn set_io_task(&self, task: JoinHandle<()>) {
        self.lock().io_task = Some(task);
    }

    pub fn outbound(&self) -> Option<mpsc::Sender<OutboundCommand>> {
        self.lock().outbound.clone()
    }

    /// Tears the session down: cancels every registered task, tells the io
    /// task to close the media session, bumps the epoch so in-flight work
    /// is discarded, and clears captured audio so nothing leaks into a
    /// later session.
    ///
    /// Idempotent and callable from any state. Terminal `Stubbed`/`Error`
    /// states are preserved; everything else becomes `Ended`.
    pub fn teardown(&self, capture: &SharedCapture) {
        let (tasks, outbound, io_task) = {
            let mut inner = self.lock();
            inner.epoch += 1;
            (
                std::mem::take(&mut inner.tasks),
                inner.outbound.take(),
                inner.io_task.take(),
            )
        };
        for task in tasks {
            task.abort();
        }
        let shutdown_sent = match outbound {
            Some(tx) => tx.try_send(OutboundCommand::Shutdown).is_ok(),
            None => false,
        };
        if let Some(io) = io_task {
            if !shutdown_sent {
                // The command channel is full or was never wired up; the
                // io task cannot be told to exit, so cancel it outright.
                io.abort();
            }
        }
        if let Ok(mut buf) = capture.lock() {
            buf.clear();
        }
        match self.state() {
            SessionState::Stubbed | SessionState::Error(_) => {}
            _ => self.set_state(SessionState::Ended),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        // Inner mutations never panic while holding the lock; recover from
        // poisoning rather than wedging teardown.
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
