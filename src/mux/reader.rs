//! Read half of the mux
//!
//! Owns the transcoder's stdout and the child handle, and is the only place
//! the exit code is observed.

use std::collections::VecDeque;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::session::{ExitObservation, ProgressSignal, SessionState};

/// How long stdout may stay silent after the process exited
///
/// Covers transcoders that leave a descendant holding the pipe open.
const EXIT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Read-side phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    /// Output may still arrive
    Streaming,
    /// End-of-stream (or failure) already reported
    Finished,
}

/// One step of progress on the read side
#[derive(Debug)]
enum ReadEvent {
    Chunk(Bytes),
    /// stdout reached EOF
    Closed,
    /// The process exited, stdout may still hold output
    Exited(ExitStatus),
    /// The process exited and stdout stayed silent for the grace period
    Stalled,
}

/// Pulls container chunks out of the transcoder
#[derive(Debug)]
pub struct MuxReader {
    child: Child,
    stdout: ChildStdout,
    signal: ProgressSignal,
    cancel: CancellationToken,
    buf: Vec<u8>,
    /// Output drained while waiting for exit, served before stdout
    pending: VecDeque<Bytes>,
    stdout_closed: bool,
    phase: ReadPhase,
    pid: Option<u32>,
}

impl MuxReader {
    pub(crate) fn new(
        child: Child,
        stdout: ChildStdout,
        signal: ProgressSignal,
        cancel: CancellationToken,
        chunk_cap: usize,
    ) -> Self {
        let pid = child.id();
        Self {
            child,
            stdout,
            signal,
            cancel,
            buf: vec![0u8; chunk_cap],
            pending: VecDeque::new(),
            stdout_closed: false,
            phase: ReadPhase::Streaming,
            pid,
        }
    }

    /// Read the next chunk
    ///
    /// - `Ok(Some(chunk))`: up to `chunk_cap` bytes, never empty
    /// - `Ok(None)`: end of stream; every later call returns it again at once
    /// - `Err(ProcessFailure)`: the transcoder exited non-zero, after all of
    ///   its output was returned. Reported once, then `Ok(None)`.
    pub async fn read(&mut self) -> Result<Option<Bytes>> {
        if self.phase == ReadPhase::Finished {
            return Ok(None);
        }
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk));
        }

        while !self.stdout_closed {
            match self.next_event().await? {
                ReadEvent::Chunk(chunk) => {
                    // Non-blocking: buffered output is drained before the exit counts
                    self.poll_exit()?;
                    return Ok(Some(chunk));
                }
                ReadEvent::Exited(status) => self.record_exit(status.into()),
                ReadEvent::Closed => self.stdout_closed = true,
                ReadEvent::Stalled => self.close_stalled_output(),
            }
        }

        // stdout closed, nothing else can arrive
        let exit = self.wait_exit().await?;

        self.signal.mark_output_exhausted();
        self.phase = ReadPhase::Finished;

        if exit.success() {
            tracing::debug!(pid = ?self.pid, "Transcoder output ended");
            Ok(None)
        } else {
            tracing::warn!(pid = ?self.pid, exit = %exit, "Transcoder failed");
            Err(Error::ProcessFailure(exit))
        }
    }

    /// Wait for the process to terminate and record the exit
    ///
    /// Output produced meanwhile is kept for later [`MuxReader::read`] calls,
    /// so a transcoder blocked on a full stdout pipe can still finish.
    pub(crate) async fn wait_exit(&mut self) -> Result<ExitObservation> {
        loop {
            if let Some(exit) = self.signal.exit() {
                return Ok(exit);
            }

            if self.stdout_closed {
                let status = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                    status = self.child.wait() => status?,
                };
                self.record_exit(status.into());
                continue;
            }

            match self.next_event().await? {
                ReadEvent::Chunk(chunk) => self.pending.push_back(chunk),
                ReadEvent::Exited(status) => self.record_exit(status.into()),
                ReadEvent::Closed => self.stdout_closed = true,
                ReadEvent::Stalled => self.close_stalled_output(),
            }
        }
    }

    /// Wait for output, exit, or cancellation, whichever comes first
    async fn next_event(&mut self) -> Result<ReadEvent> {
        let exited = self.signal.exit().is_some();

        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            chunk = read_chunk(&mut self.stdout, &mut self.buf) => match chunk? {
                Some(chunk) => ReadEvent::Chunk(chunk),
                None => ReadEvent::Closed,
            },
            status = self.child.wait(), if !exited => ReadEvent::Exited(status?),
            _ = tokio::time::sleep(EXIT_DRAIN_GRACE), if exited => ReadEvent::Stalled,
        };

        Ok(event)
    }

    /// Record the exit if the process has already terminated
    fn poll_exit(&mut self) -> Result<()> {
        if self.signal.exit().is_some() {
            return Ok(());
        }

        if let Some(status) = self.child.try_wait()? {
            self.record_exit(status.into());
        }
        Ok(())
    }

    fn record_exit(&self, exit: ExitObservation) {
        if self.signal.observe_exit(exit) {
            tracing::info!(pid = ?self.pid, exit = %exit, "Transcoder exited");
        }
    }

    fn close_stalled_output(&mut self) {
        tracing::warn!(
            pid = ?self.pid,
            grace = ?EXIT_DRAIN_GRACE,
            "Transcoder exited but stdout is still held open, treating output as exhausted"
        );
        self.stdout_closed = true;
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.signal.state()
    }

    /// OS process id of the transcoder, until its exit has been collected
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Upper bound for a single chunk
    pub fn chunk_cap(&self) -> usize {
        self.buf.len()
    }
}

/// One read of up to `buf.len()` bytes. `None` at EOF.
async fn read_chunk(stdout: &mut ChildStdout, buf: &mut [u8]) -> io::Result<Option<Bytes>> {
    let n = stdout.read(buf).await?;
    Ok((n > 0).then(|| Bytes::copy_from_slice(&buf[..n])))
}
