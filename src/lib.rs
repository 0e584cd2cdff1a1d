//! # h264-relay
//!
//! Pipe a live H.264 elementary stream through an external transcoder that
//! rewraps it into a container, then relay the container bytes to a remote
//! viewer over UDP while keeping a local copy.
//!
//! ```text
//!   encoder ──► MuxWriter ──► ffmpeg (stdin → stdout) ──► MuxReader ──► Relay
//!                                                                   ├──► UDP datagram
//!                                                                   └──► sink log
//! ```
//!
//! Delivery is best effort: one chunk per datagram, no framing, no retries.
//!
//! # Example
//!
//! ```no_run
//! use h264_relay::{Session, SessionConfig, TargetEndpoint};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> h264_relay::Result<()> {
//! let config = SessionConfig::with_target(TargetEndpoint::new("192.168.0.199", 5005))
//!     .framerate(30)
//!     .log_path("capture.mkv");
//!
//! let encoder = tokio::io::stdin();
//! let report = Session::new(config)?
//!     .run(encoder, CancellationToken::new())
//!     .await?;
//! println!("relayed {} bytes", report.relay.bytes);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod mux;
pub mod relay;
pub mod session;
pub mod stats;

pub use error::{Error, Result, SinkError};
pub use mux::{Mux, MuxReader, MuxWriter, TranscoderConfig};
pub use relay::Relay;
pub use session::{
    ExitObservation, Session, SessionConfig, SessionHandle, SessionReport, SessionState,
    StopReason, TargetEndpoint,
};
pub use stats::RelayStats;
