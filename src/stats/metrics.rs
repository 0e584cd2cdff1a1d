//! Statistics for a relay run

use std::time::{Duration, Instant};

use crate::session::config::SAFE_DATAGRAM_PAYLOAD;

/// Relay-level statistics
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// Start time
    pub started_at: Instant,
    /// Chunks relayed (one datagram and one log append each)
    pub chunks: u64,
    /// Total bytes relayed
    pub bytes: u64,
    /// Largest chunk seen
    pub largest_chunk: usize,
    /// Datagrams larger than a single unfragmented packet
    pub oversized_datagrams: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            chunks: 0,
            bytes: 0,
            largest_chunk: 0,
            oversized_datagrams: 0,
        }
    }

    /// Account for one relayed chunk
    pub fn record_chunk(&mut self, len: usize) {
        self.chunks += 1;
        self.bytes += len as u64;
        self.largest_chunk = self.largest_chunk.max(len);
        if len > SAFE_DATAGRAM_PAYLOAD {
            self.oversized_datagrams += 1;
        }
    }

    /// Get duration since the relay started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Calculate bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes * 8) / secs
        } else {
            0
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_stats_new() {
        let stats = RelayStats::new();
        assert_eq!(stats.chunks, 0);
        assert_eq!(stats.bytes, 0);
        assert_eq!(stats.largest_chunk, 0);
        assert_eq!(stats.oversized_datagrams, 0);
    }

    #[test]
    fn test_record_chunk() {
        let mut stats = RelayStats::new();
        stats.record_chunk(4);
        stats.record_chunk(32_000);
        stats.record_chunk(SAFE_DATAGRAM_PAYLOAD);

        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.bytes, 4 + 32_000 + SAFE_DATAGRAM_PAYLOAD as u64);
        assert_eq!(stats.largest_chunk, 32_000);
        // Only the chunk above a single packet's payload counts
        assert_eq!(stats.oversized_datagrams, 1);
    }

    #[test]
    fn test_bitrate() {
        let mut stats = RelayStats::new();
        stats.bytes = 1_000_000;
        stats.started_at = Instant::now() - Duration::from_secs(10);

        // 1,000,000 bytes * 8 bits / 10 seconds = 800,000 bps
        assert_eq!(stats.bitrate(), 800_000);
    }

    #[test]
    fn test_bitrate_zero_duration() {
        let mut stats = RelayStats::new();
        stats.bytes = 1_000_000;

        assert_eq!(stats.bitrate(), 0);
    }
}
