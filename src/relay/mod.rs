//! UDP relay
//!
//! A dedicated task that pulls chunks from the mux and fans each one out to
//! two sinks, in order: one datagram to the target endpoint, then one append
//! to the sink log.
//!
//! ```text
//!   MuxReader::read ──► chunk ──┬──► DatagramSink::send ──► UDP target
//!                               └──► SinkLog::append    ──► local file
//! ```
//!
//! The loop ends on end-of-stream (clean), on `ProcessFailure`, or on the
//! first sink error. Nothing is retried.

pub mod sink;

pub use sink::{DatagramSink, SinkLog};

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::mux::MuxReader;
use crate::session::SessionConfig;
use crate::stats::RelayStats;

/// Relay actor
#[derive(Debug)]
pub struct Relay {
    reader: MuxReader,
    datagrams: DatagramSink,
    log: SinkLog,
    stats: RelayStats,
}

impl Relay {
    /// Bind the datagram socket and open the sink log for a session
    pub async fn new(reader: MuxReader, config: &SessionConfig) -> Result<Self> {
        let datagrams = DatagramSink::bind(&config.target).await?;
        let log = SinkLog::open(&config.log_path).await?;
        Ok(Self::with_sinks(reader, datagrams, log))
    }

    /// Create a relay over already prepared sinks
    pub fn with_sinks(reader: MuxReader, datagrams: DatagramSink, log: SinkLog) -> Self {
        Self {
            reader,
            datagrams,
            log,
            stats: RelayStats::new(),
        }
    }

    /// Run the relay on its own task
    pub fn spawn(self) -> JoinHandle<Result<RelayStats>> {
        tokio::spawn(self.run())
    }

    /// Relay chunks until the stream ends
    ///
    /// Returns the stats on a clean end. The sink log is flushed on every exit
    /// path where it is still usable.
    pub async fn run(mut self) -> Result<RelayStats> {
        tracing::info!(
            endpoint = %self.datagrams.target(),
            log = %self.log.path().display(),
            chunk_cap = self.reader.chunk_cap(),
            "Relay started"
        );

        let result = self.pump().await;

        let flushed = self.log.flush().await;
        let result = match (result, flushed) {
            (Ok(()), Err(e)) => Err(e.into()),
            (result, _) => result,
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    chunks = self.stats.chunks,
                    bytes = self.stats.bytes,
                    oversized = self.stats.oversized_datagrams,
                    bitrate = self.stats.bitrate(),
                    "Relay finished"
                );
                Ok(self.stats)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    chunks = self.stats.chunks,
                    bytes = self.stats.bytes,
                    "Relay stopped"
                );
                Err(e)
            }
        }
    }

    async fn pump(&mut self) -> Result<()> {
        while let Some(chunk) = self.reader.read().await? {
            self.datagrams.send(&chunk).await?;
            self.log.append(&chunk).await?;
            self.stats.record_chunk(chunk.len());

            tracing::trace!(len = chunk.len(), total = self.stats.bytes, "Chunk relayed");
        }
        Ok(())
    }

    /// Stats so far
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }
}
