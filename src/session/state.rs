//! Session state machine
//!
//! Tracks one transcoder invocation from launch to the observed exit code.
//!
//! ```text
//!   Active ──flush / stdout EOF──► Draining ──exit 0, output drained──► Ended
//!                                     │
//!                                     └──exit != 0, output drained──► Crashed
//! ```
//!
//! Each piece of shared state has exactly one writer: the input-closed flag is
//! set by the write half, the exit observation and output exhaustion are
//! published by the read half through a `watch` channel.

use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transcoder running, bytes may flow in both directions
    Active,
    /// Input closed or process exited, output still being read
    Draining,
    /// Output exhausted and the process exited with code 0
    Ended,
    /// Output exhausted and the process exited with a non-zero code or a signal
    Crashed,
}

impl SessionState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Crashed)
    }
}

/// The exit of the transcoder process, recorded once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitObservation {
    code: Option<i32>,
}

impl ExitObservation {
    /// Create an observation from a raw exit code (`None` = killed by a signal)
    pub fn new(code: Option<i32>) -> Self {
        Self { code }
    }

    /// Exit code, if the process exited normally
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Whether the process exited cleanly
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitObservation {
    fn from(status: ExitStatus) -> Self {
        Self::new(status.code())
    }
}

impl std::fmt::Display for ExitObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exited with code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// What the read half has learned about the process
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ReadProgress {
    exit: Option<ExitObservation>,
    output_exhausted: bool,
}

impl ReadProgress {
    fn is_terminal(&self) -> bool {
        self.exit.is_some() && self.output_exhausted
    }
}

/// Create the two ends of a session lifecycle
pub(crate) fn lifecycle() -> (ProgressSignal, SessionHandle) {
    let input_closed = Arc::new(AtomicBool::new(false));
    let (tx, rx) = watch::channel(ReadProgress::default());

    let signal = ProgressSignal {
        input_closed: Arc::clone(&input_closed),
        tx,
    };
    let handle = SessionHandle {
        input_closed,
        progress: rx,
    };

    (signal, handle)
}

/// Publishing end, owned by the read half only
#[derive(Debug)]
pub(crate) struct ProgressSignal {
    input_closed: Arc<AtomicBool>,
    tx: watch::Sender<ReadProgress>,
}

impl ProgressSignal {
    /// Record the exit observation. Returns false if it was already recorded.
    pub(crate) fn observe_exit(&self, exit: ExitObservation) -> bool {
        self.tx.send_if_modified(|progress| {
            if progress.exit.is_some() {
                return false;
            }
            progress.exit = Some(exit);
            true
        })
    }

    /// Record that stdout reached EOF
    pub(crate) fn mark_output_exhausted(&self) {
        self.tx.send_modify(|progress| progress.output_exhausted = true);
    }

    /// The recorded exit, if any
    pub(crate) fn exit(&self) -> Option<ExitObservation> {
        self.tx.borrow().exit
    }

    /// Current state as seen from the read half
    pub(crate) fn state(&self) -> SessionState {
        derive_state(
            &self.tx.borrow(),
            self.input_closed.load(Ordering::Acquire),
        )
    }
}

/// Read-only view of a session's lifecycle
///
/// Cheap to clone; any actor may hold one to short-circuit work once the
/// session leaves `Active`.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    input_closed: Arc<AtomicBool>,
    progress: watch::Receiver<ReadProgress>,
}

impl SessionHandle {
    /// Current session state
    pub fn state(&self) -> SessionState {
        derive_state(
            &self.progress.borrow(),
            self.input_closed.load(Ordering::Acquire),
        )
    }

    /// The process exit, once the read half has observed it
    pub fn exit(&self) -> Option<ExitObservation> {
        self.progress.borrow().exit
    }

    /// Wait until the session reaches a terminal state
    ///
    /// Returns `None` if the read half was dropped before that happened.
    pub async fn wait_terminal(&self) -> Option<SessionState> {
        let mut rx = self.progress.clone();
        let input_closed = self.input_closed.load(Ordering::Acquire);
        let progress = rx.wait_for(ReadProgress::is_terminal).await.ok()?;
        Some(derive_state(&progress, input_closed))
    }

    /// Mark the input side closed. Only the write half calls this.
    pub(crate) fn close_input(&self) {
        self.input_closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_input_closed(&self) -> bool {
        self.input_closed.load(Ordering::Acquire)
    }
}

fn derive_state(progress: &ReadProgress, input_closed: bool) -> SessionState {
    match (progress.exit, progress.output_exhausted) {
        (Some(exit), true) if exit.success() => SessionState::Ended,
        (Some(_), true) => SessionState::Crashed,
        (Some(_), false) | (None, true) => SessionState::Draining,
        (None, false) if input_closed => SessionState::Draining,
        (None, false) => SessionState::Active,
    }
}
