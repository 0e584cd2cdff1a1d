//! Capture session
//!
//! A session is the lifetime of one transcoder process: its parameters, its
//! lifecycle state machine, and the runner that drives encoder input, mux and
//! relay together.

pub mod config;
pub mod runner;
pub mod state;

pub use config::{Resolution, SessionConfig, TargetEndpoint};
pub use runner::{Session, SessionReport, StopReason};
pub use state::{ExitObservation, SessionHandle, SessionState};

pub(crate) use state::{lifecycle, ProgressSignal};
