//! Session configuration
//!
//! All parameters are fixed when the session starts.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::mux::TranscoderConfig;

/// Default upper bound for one chunk read from the transcoder
pub const DEFAULT_CHUNK_CAP: usize = 32_000;

/// Largest payload a single UDP datagram can carry over IPv4
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

/// Payload that fits a 1500-byte Ethernet MTU without IP fragmentation
pub const SAFE_DATAGRAM_PAYLOAD: usize = 1472;

/// Capture resolution requested from the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Datagram destination, immutable for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEndpoint {
    /// Host name or IP literal
    pub host: String,
    /// UDP port
    pub port: u16,
}

impl TargetEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to a socket address, preferring the first result
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address found for {}", self),
                )
            })
    }
}

impl From<SocketAddr> for TargetEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Session configuration options
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Encoder frame rate (frames/sec), passed to the transcoder
    pub framerate: u32,

    /// Capture resolution
    pub resolution: Resolution,

    /// Where each chunk is sent as one datagram
    pub target: TargetEndpoint,

    /// Recording budget (None = until the source ends or the session is cancelled)
    pub duration: Option<Duration>,

    /// Upper bound for a single chunk, and thus a single datagram
    pub chunk_cap: usize,

    /// Append-only local copy of everything sent
    pub log_path: PathBuf,

    /// Transcoder process settings
    pub transcoder: TranscoderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            framerate: 30,
            resolution: Resolution::new(640, 480),
            target: TargetEndpoint::new("127.0.0.1", 5005),
            duration: Some(Duration::from_secs(120)),
            chunk_cap: DEFAULT_CHUNK_CAP,
            log_path: PathBuf::from("relay.mkv"),
            transcoder: TranscoderConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Create a new config sending to the given endpoint
    pub fn with_target(target: TargetEndpoint) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    /// Set the frame rate
    pub fn framerate(mut self, fps: u32) -> Self {
        self.framerate = fps;
        self
    }

    /// Set the capture resolution
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Resolution::new(width, height);
        self
    }

    /// Set the target endpoint
    pub fn target(mut self, target: TargetEndpoint) -> Self {
        self.target = target;
        self
    }

    /// Set the recording budget
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Record until the source ends or the session is cancelled
    pub fn unbounded(mut self) -> Self {
        self.duration = None;
        self
    }

    /// Set the chunk cap
    pub fn chunk_cap(mut self, cap: usize) -> Self {
        self.chunk_cap = cap;
        self
    }

    /// Set the sink log path
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Set the transcoder settings
    pub fn transcoder(mut self, transcoder: TranscoderConfig) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// Check the parameters before anything is spawned or bound
    pub fn validate(&self) -> Result<()> {
        if self.framerate == 0 {
            return Err(Error::Config("framerate must be greater than zero".into()));
        }
        if self.target.host.is_empty() {
            return Err(Error::Config("target host is empty".into()));
        }
        if self.target.port == 0 {
            return Err(Error::Config("target port must be non-zero".into()));
        }
        if self.chunk_cap == 0 || self.chunk_cap > MAX_DATAGRAM_PAYLOAD {
            return Err(Error::Config(format!(
                "chunk cap {} outside 1..={}",
                self.chunk_cap, MAX_DATAGRAM_PAYLOAD
            )));
        }
        if self.transcoder.program.as_os_str().is_empty() {
            return Err(Error::Config("transcoder program is empty".into()));
        }

        if self.chunk_cap > SAFE_DATAGRAM_PAYLOAD {
            tracing::warn!(
                chunk_cap = self.chunk_cap,
                safe_payload = SAFE_DATAGRAM_PAYLOAD,
                "Chunks may exceed path MTU and rely on IP fragmentation"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();

        assert_eq!(config.framerate, 30);
        assert_eq!(config.resolution, Resolution::new(640, 480));
        assert_eq!(config.chunk_cap, DEFAULT_CHUNK_CAP);
        assert_eq!(config.duration, Some(Duration::from_secs(120)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let config = SessionConfig::with_target(TargetEndpoint::new("192.168.0.199", 5005))
            .framerate(24)
            .resolution(1280, 720)
            .duration(Duration::from_secs(10))
            .chunk_cap(1400)
            .log_path("/tmp/out.mkv");

        assert_eq!(config.target.to_string(), "192.168.0.199:5005");
        assert_eq!(config.framerate, 24);
        assert_eq!(config.resolution.to_string(), "1280x720");
        assert_eq!(config.duration, Some(Duration::from_secs(10)));
        assert_eq!(config.chunk_cap, 1400);
        assert_eq!(config.log_path, PathBuf::from("/tmp/out.mkv"));
    }

    #[test]
    fn test_unbounded() {
        let config = SessionConfig::default().unbounded();
        assert!(config.duration.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_framerate() {
        let config = SessionConfig::default().framerate(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_chunk_cap() {
        let config = SessionConfig::default().chunk_cap(MAX_DATAGRAM_PAYLOAD + 1);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = SessionConfig::default().chunk_cap(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_target() {
        let config = SessionConfig::default().target(TargetEndpoint::new("", 5005));
        assert!(config.validate().is_err());

        let config = SessionConfig::default().target(TargetEndpoint::new("localhost", 0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ipv6_endpoint_display() {
        let addr: SocketAddr = "[::1]:5005".parse().unwrap();
        let target = TargetEndpoint::from(addr);
        assert_eq!(target.to_string(), "[::1]:5005");
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let target = TargetEndpoint::new("127.0.0.1", 5005);
        let addr = target.resolve().await.unwrap();
        assert_eq!(addr, "127.0.0.1:5005".parse().unwrap());
    }
}
