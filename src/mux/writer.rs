//! Write half of the mux
//!
//! Owns the transcoder's stdin. Driven by the encoder's task.

use std::io;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::session::{SessionHandle, SessionState};

/// Forwards encoder bytes into the transcoder
#[derive(Debug)]
pub struct MuxWriter {
    stdin: Option<ChildStdin>,
    session: SessionHandle,
    cancel: CancellationToken,
    bytes_written: u64,
    pid: Option<u32>,
}

impl MuxWriter {
    pub(crate) fn new(
        stdin: ChildStdin,
        session: SessionHandle,
        cancel: CancellationToken,
        pid: Option<u32>,
    ) -> Self {
        Self {
            stdin: Some(stdin),
            session,
            cancel,
            bytes_written: 0,
            pid,
        }
    }

    /// Forward raw bytes to the transcoder's input
    ///
    /// Waits while the pipe is full, so a slow transcoder slows the encoder
    /// down rather than growing a buffer. Fails with `ProcessUnavailable` once
    /// the session has left `Active`.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.session.state() != SessionState::Active {
            return Err(Error::ProcessUnavailable);
        }
        let stdin = self.stdin.as_mut().ok_or(Error::ProcessUnavailable)?;

        if data.is_empty() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = stdin.write_all(data) => match result {
                Ok(()) => {
                    self.bytes_written += data.len() as u64;
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    tracing::debug!(pid = ?self.pid, "Transcoder closed its input");
                    Err(Error::ProcessUnavailable)
                }
                Err(e) => Err(Error::Io(e)),
            },
        }
    }

    /// Close the input side and wait for the session to finish
    ///
    /// Requires the read half to keep draining output. Calling it again after
    /// the session ended returns immediately.
    pub async fn flush(&mut self) -> Result<SessionState> {
        self.close_input().await;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            state = self.session.wait_terminal() => match state {
                Some(state) => Ok(state),
                None => {
                    tracing::warn!(pid = ?self.pid, "Read half dropped before the session ended");
                    Err(Error::ProcessUnavailable)
                }
            },
        }
    }

    /// Drop stdin so the transcoder sees EOF. No-op if already closed.
    pub(crate) async fn close_input(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            // The process may already be gone; its exit is reported by the read half
            let _ = stdin.shutdown().await;
            drop(stdin);
            self.session.close_input();

            tracing::debug!(
                pid = ?self.pid,
                bytes_written = self.bytes_written,
                "Transcoder input closed"
            );
        }
    }

    /// Total bytes accepted by the transcoder
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Lifecycle view shared with the read half
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Whether the input side has been closed
    pub fn is_closed(&self) -> bool {
        self.session.is_input_closed()
    }
}
