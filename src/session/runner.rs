//! Session runner
//!
//! Wires encoder source, mux and relay together for one transcoder lifetime.
//! The recording budget is a child cancellation token fired by a timer, so
//! reaching it drains the pipeline gracefully while cancelling the parent
//! token tears everything down at once.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::SessionConfig;
use super::state::SessionState;
use crate::error::{Error, Result};
use crate::mux::{Mux, MuxWriter};
use crate::relay::Relay;
use crate::stats::RelayStats;

/// Read size used when pulling from an encoder source
const SOURCE_READ_SIZE: usize = 64 * 1024;

/// Why the input side stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The encoder source reached EOF
    SourceEnded,
    /// The recording budget elapsed
    DurationElapsed,
    /// The relay finished first, e.g. because the transcoder exited
    RelayEnded,
    /// The session was cancelled
    Cancelled,
}

/// Summary of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Final lifecycle state
    pub state: SessionState,
    /// Why input stopped
    pub stop: StopReason,
    /// Bytes accepted by the transcoder
    pub bytes_written: u64,
    /// What the relay delivered
    pub relay: RelayStats,
}

/// One end-to-end capture session
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
}

impl Session {
    /// Create a session after validating its parameters
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Launch the transcoder and the relay task
    ///
    /// For encoders that push bytes: write into the returned [`MuxWriter`],
    /// call [`MuxWriter::flush`], then await the relay handle.
    pub async fn start(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(MuxWriter, JoinHandle<Result<RelayStats>>)> {
        let (writer, relay) = self.launch(cancel).await?;
        Ok((writer, relay.spawn()))
    }

    async fn launch(&self, cancel: &CancellationToken) -> Result<(MuxWriter, Relay)> {
        let config = &self.config;

        tracing::info!(
            framerate = config.framerate,
            resolution = %config.resolution,
            endpoint = %config.target,
            duration = ?config.duration,
            log = %config.log_path.display(),
            "Session starting"
        );

        let mux = Mux::spawn(config, cancel.child_token())?;
        let (writer, reader) = mux.into_split();
        let relay = Relay::new(reader, config).await?;

        Ok((writer, relay))
    }

    /// Run a whole session, pulling encoder bytes from `source`
    ///
    /// Input stops when the source ends, the recording budget elapses, the
    /// relay finishes on its own, or `cancel` fires. The first two drain the
    /// transcoder and wait for the relay to deliver everything; a relay that
    /// stopped early reports its failure even while the source is idle;
    /// cancellation returns `Cancelled` promptly and kills the process.
    pub async fn run<R>(&self, mut source: R, cancel: CancellationToken) -> Result<SessionReport>
    where
        R: AsyncRead + Unpin,
    {
        let (mut writer, relay) = self.launch(&cancel).await?;

        let relay_done = CancellationToken::new();
        let done_guard = relay_done.clone().drop_guard();
        let relay = tokio::spawn(async move {
            let _done = done_guard;
            relay.run().await
        });

        let recording = cancel.child_token();
        if let Some(duration) = self.config.duration {
            spawn_deadline(recording.clone(), duration);
        }

        let pumped = pump(&mut source, &mut writer, &recording, &relay_done, &cancel).await;
        // Also stops the deadline timer
        recording.cancel();

        if let Err(ref e) = pumped {
            tracing::warn!(error = %e, "Encoder input stopped early");
        }

        let flushed = writer.flush().await;
        let relayed = relay
            .await
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        // Failures seen by the relay describe the session best
        let relay_stats = relayed?;
        let stop = pumped?;
        let state = flushed?;

        tracing::info!(
            state = ?state,
            stop = ?stop,
            bytes_written = writer.bytes_written(),
            bytes_relayed = relay_stats.bytes,
            "Session finished"
        );

        Ok(SessionReport {
            state,
            stop,
            bytes_written: writer.bytes_written(),
            relay: relay_stats,
        })
    }
}

/// Cancel `recording` once `duration` has elapsed
fn spawn_deadline(recording: CancellationToken, duration: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                tracing::debug!(duration = ?duration, "Recording budget elapsed");
                recording.cancel();
            }
            _ = recording.cancelled() => {}
        }
    });
}

/// Copy encoder bytes into the transcoder until input should stop
async fn pump<R>(
    source: &mut R,
    writer: &mut MuxWriter,
    recording: &CancellationToken,
    relay_done: &CancellationToken,
    cancel: &CancellationToken,
) -> Result<StopReason>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; SOURCE_READ_SIZE];

    loop {
        let n = tokio::select! {
            biased;
            _ = recording.cancelled() => {
                return Ok(if cancel.is_cancelled() {
                    StopReason::Cancelled
                } else {
                    StopReason::DurationElapsed
                });
            }
            _ = relay_done.cancelled() => return Ok(StopReason::RelayEnded),
            n = source.read(&mut buf) => n?,
        };

        if n == 0 {
            return Ok(StopReason::SourceEnded);
        }

        writer.write(&buf[..n]).await?;
    }
}
