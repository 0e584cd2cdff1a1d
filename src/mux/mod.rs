//! Transcoder mux
//!
//! Wraps one external transcoder process per session. Encoder bytes go in on
//! stdin, container chunks come out of stdout.
//!
//! ```text
//!   encoder task                                         relay task
//!   MuxWriter::write ──► stdin ─► [transcoder] ─► stdout ──► MuxReader::read
//!        │                                                        │
//!        └──────────── SessionHandle ◄─── ProgressSignal ─────────┘
//! ```
//!
//! The two halves share nothing but the session lifecycle. Use
//! [`Mux::into_split`] to drive them from separate tasks.

pub mod command;
pub mod reader;
pub mod writer;

pub use command::TranscoderConfig;
pub use reader::MuxReader;
pub use writer::MuxWriter;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::session::{lifecycle, SessionConfig, SessionHandle, SessionState};

/// A running transcoder with both halves attached
#[derive(Debug)]
pub struct Mux {
    writer: MuxWriter,
    reader: MuxReader,
}

impl Mux {
    /// Launch the transcoder for a session
    ///
    /// `cancel` interrupts any blocked read, write or flush.
    pub fn spawn(config: &SessionConfig, cancel: CancellationToken) -> Result<Self> {
        let transcoder = &config.transcoder;
        let mut child = transcoder
            .command(config.framerate)
            .spawn()
            .map_err(Error::Spawn)?;

        let pid = child.id();
        let missing = |name: &str| {
            Error::Spawn(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("transcoder {} not captured", name),
            ))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_logger(stderr, pid);
        }

        tracing::info!(
            pid = ?pid,
            program = %transcoder.program_name().display(),
            framerate = config.framerate,
            container = %transcoder.container,
            "Transcoder started"
        );

        let (signal, session) = lifecycle();
        let writer = MuxWriter::new(stdin, session, cancel.clone(), pid);
        let reader = MuxReader::new(child, stdout, signal, cancel, config.chunk_cap);

        Ok(Self { writer, reader })
    }

    /// Forward bytes to the transcoder. See [`MuxWriter::write`].
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write(data).await
    }

    /// Close the input and wait for the transcoder to exit
    ///
    /// Output produced while waiting is drained and queued, so the process
    /// never stalls on a full stdout pipe. Queued and remaining output is
    /// returned by later [`Mux::read`] calls; the session becomes terminal once
    /// it has been drained. A second call returns immediately.
    pub async fn flush(&mut self) -> Result<SessionState> {
        self.writer.close_input().await;
        self.reader.wait_exit().await?;
        Ok(self.state())
    }

    /// Read the next chunk. See [`MuxReader::read`].
    pub async fn read(&mut self) -> Result<Option<Bytes>> {
        self.reader.read().await
    }

    /// Split into halves that can be driven from separate tasks
    pub fn into_split(self) -> (MuxWriter, MuxReader) {
        (self.writer, self.reader)
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.reader.state()
    }

    /// Lifecycle view for supervisors
    pub fn session(&self) -> SessionHandle {
        self.writer.session().clone()
    }

    /// OS process id of the transcoder
    pub fn pid(&self) -> Option<u32> {
        self.reader.pid()
    }
}

/// Log transcoder diagnostics line by line until the pipe closes
fn spawn_stderr_logger(stderr: ChildStderr, pid: Option<u32>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tracing::debug!(pid = ?pid, "transcoder: {}", line),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(pid = ?pid, error = %e, "Transcoder stderr read failed");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn stub(script: &str) -> SessionConfig {
        SessionConfig::default().transcoder(TranscoderConfig::custom("sh", ["-c", script]))
    }

    async fn read_all(mux: &mut Mux) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = mux.read().await? {
            assert!(!chunk.is_empty());
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_identity_round_trip() {
        let mut mux = Mux::spawn(&stub("exec cat"), CancellationToken::new()).unwrap();
        assert_eq!(mux.state(), SessionState::Active);

        mux.write(b"\x00\x00\x00\x01\x67").await.unwrap();
        mux.write(b"hello").await.unwrap();
        mux.write(b"").await.unwrap();
        mux.flush().await.unwrap();

        assert_eq!(read_all(&mut mux).await.unwrap(), b"\x00\x00\x00\x01\x67hello");
        assert_eq!(mux.state(), SessionState::Ended);
    }

    #[tokio::test]
    async fn test_reversible_transform() {
        let mut mux = Mux::spawn(&stub("exec tr a-z A-Z"), CancellationToken::new()).unwrap();

        mux.write(b"abc").await.unwrap();
        mux.write(b"xyz").await.unwrap();
        mux.flush().await.unwrap();

        assert_eq!(read_all(&mut mux).await.unwrap(), b"ABCXYZ");
    }

    #[tokio::test]
    async fn test_chunks_respect_cap() {
        let config = stub("exec cat").chunk_cap(4);
        let mut mux = Mux::spawn(&config, CancellationToken::new()).unwrap();

        mux.write(&[7u8; 10]).await.unwrap();
        mux.flush().await.unwrap();

        let mut total = 0;
        while let Some(chunk) = mux.read().await.unwrap() {
            assert!(chunk.len() <= 4);
            total += chunk.len();
        }
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn test_read_after_end_is_idempotent() {
        let mut mux = Mux::spawn(&stub("exit 0"), CancellationToken::new()).unwrap();

        assert!(mux.read().await.unwrap().is_none());
        for _ in 0..3 {
            let next = tokio::time::timeout(Duration::from_millis(100), mux.read())
                .await
                .expect("read after end-of-stream must not block");
            assert!(next.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_flush_twice() {
        let mut mux = Mux::spawn(&stub("exec cat"), CancellationToken::new()).unwrap();
        mux.write(b"data").await.unwrap();

        mux.flush().await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(100), mux.flush())
            .await
            .expect("second flush must not block");
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_flush_drains_more_than_a_pipe_buffer() {
        let mut mux = Mux::spawn(&stub("exec cat"), CancellationToken::new()).unwrap();
        let payload: Vec<u8> = (0..100_000).map(|i| (i % 253) as u8).collect();

        mux.write(&payload).await.unwrap();
        let state = tokio::time::timeout(Duration::from_secs(5), mux.flush())
            .await
            .expect("flush must not wait on a full stdout pipe")
            .unwrap();
        assert_eq!(state, SessionState::Draining);

        assert_eq!(read_all(&mut mux).await.unwrap(), payload);
        assert_eq!(mux.state(), SessionState::Ended);
    }

    #[tokio::test]
    async fn test_read_ends_when_descendant_holds_stdout() {
        // The background sleep inherits stdout and outlives the shell
        let mut mux =
            Mux::spawn(&stub("printf out; sleep 10 & exit 0"), CancellationToken::new()).unwrap();

        let out = tokio::time::timeout(Duration::from_secs(5), read_all(&mut mux))
            .await
            .expect("read must end once the process exited")
            .unwrap();
        assert_eq!(out, b"out");
        assert_eq!(mux.state(), SessionState::Ended);
    }

    #[tokio::test]
    async fn test_pid_cleared_after_exit() {
        let mut mux = Mux::spawn(&stub("exit 0"), CancellationToken::new()).unwrap();
        assert!(mux.pid().is_some());

        assert!(mux.read().await.unwrap().is_none());
        assert!(mux.pid().is_none());
    }

    #[tokio::test]
    async fn test_write_after_flush_fails() {
        let mut mux = Mux::spawn(&stub("exec cat"), CancellationToken::new()).unwrap();
        mux.flush().await.unwrap();

        assert!(matches!(
            mux.write(b"late").await,
            Err(Error::ProcessUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_failure_reported_once_after_output() {
        let mut mux = Mux::spawn(&stub("printf out; exit 3"), CancellationToken::new()).unwrap();

        let mut out = Vec::new();
        let err = loop {
            match mux.read().await {
                Ok(Some(chunk)) => out.extend_from_slice(&chunk),
                Ok(None) => panic!("expected a failure, got end-of-stream"),
                Err(e) => break e,
            }
        };

        assert_eq!(out, b"out");
        match err {
            Error::ProcessFailure(exit) => assert_eq!(exit.code(), Some(3)),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(mux.state(), SessionState::Crashed);
        assert!(mux.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_read() {
        let cancel = CancellationToken::new();
        let mut mux = Mux::spawn(&stub("exec sleep 30"), cancel.clone()).unwrap();

        cancel.cancel();
        assert!(matches!(mux.read().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let config = SessionConfig::default()
            .transcoder(TranscoderConfig::ffmpeg("/nonexistent/transcoder"));

        let result = Mux::spawn(&config, CancellationToken::new());
        assert!(matches!(result, Err(Error::Spawn(_))));
    }
}
