//! Error types
//!
//! Every error here is terminal for the actor that sees it. Nothing is retried.

use std::io;

use crate::session::ExitObservation;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// The transcoder could not be launched
    Spawn(io::Error),

    /// Write attempted after the transcoder terminated or its input was closed
    ProcessUnavailable,

    /// The transcoder exited with a non-zero code (or was killed by a signal)
    ProcessFailure(ExitObservation),

    /// Datagram send or sink log write failed
    Sink(SinkError),

    /// Invalid session parameters
    Config(String),

    /// The session was cancelled while blocked on a read or write
    Cancelled,

    /// Other pipe I/O error
    Io(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Spawn(e) => write!(f, "Failed to spawn transcoder: {}", e),
            Error::ProcessUnavailable => write!(f, "Transcoder process is no longer accepting input"),
            Error::ProcessFailure(exit) => write!(f, "Transcoder failed: {}", exit),
            Error::Sink(e) => write!(f, "Sink error: {}", e),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::Cancelled => write!(f, "Session cancelled"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Spawn(e) | Error::Io(e) => Some(e),
            Error::Sink(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<SinkError> for Error {
    fn from(e: SinkError) -> Self {
        Error::Sink(e)
    }
}

/// Failure of one of the relay's two sinks
#[derive(Debug)]
pub enum SinkError {
    /// Target endpoint could not be resolved or the socket could not be set up
    Endpoint(io::Error),
    /// Sending a datagram failed
    Send(io::Error),
    /// Opening, appending to, or flushing the sink log failed
    Log(io::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Endpoint(e) => write!(f, "endpoint setup failed: {}", e),
            SinkError::Send(e) => write!(f, "datagram send failed: {}", e),
            SinkError::Log(e) => write!(f, "sink log write failed: {}", e),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Endpoint(e) | SinkError::Send(e) | SinkError::Log(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_io_conversion() {
        let err: Error = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_sink_error_display() {
        let err = Error::from(SinkError::Send(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert_eq!(err.to_string(), "Sink error: datagram send failed: refused");
    }

    #[test]
    fn test_process_failure_display() {
        let err = Error::ProcessFailure(ExitObservation::new(Some(1)));
        assert_eq!(err.to_string(), "Transcoder failed: exited with code 1");

        let err = Error::ProcessFailure(ExitObservation::new(None));
        assert_eq!(err.to_string(), "Transcoder failed: terminated by signal");
    }
}
