//! Relay sinks
//!
//! Each chunk goes to both: one UDP datagram to the target endpoint, and one
//! append to the local sink log.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::UdpSocket;

use crate::error::SinkError;
use crate::session::TargetEndpoint;

/// Best-effort datagram sender bound to one endpoint
///
/// No framing, no sequence numbers, no retransmission.
#[derive(Debug)]
pub struct DatagramSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl DatagramSink {
    /// Resolve the endpoint and bind an ephemeral local socket
    pub async fn bind(endpoint: &TargetEndpoint) -> Result<Self, SinkError> {
        let target = endpoint.resolve().await.map_err(SinkError::Endpoint)?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        // Left unconnected: ICMP unreachable from a viewer that is not
        // listening yet must not surface as a send error
        let socket = UdpSocket::bind(local).await.map_err(SinkError::Endpoint)?;

        tracing::debug!(endpoint = %target, local = ?socket.local_addr().ok(), "Datagram sink bound");

        Ok(Self { socket, target })
    }

    /// Send one chunk as exactly one datagram
    pub async fn send(&self, chunk: &[u8]) -> Result<(), SinkError> {
        self.socket
            .send_to(chunk, self.target)
            .await
            .map_err(SinkError::Send)?;
        Ok(())
    }

    /// Resolved destination
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

/// Append-only local copy of the relayed stream
#[derive(Debug)]
pub struct SinkLog {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl SinkLog {
    /// Open for appending, creating the file if needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(SinkError::Log)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    /// Append one chunk verbatim
    pub async fn append(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        self.writer.write_all(chunk).await.map_err(SinkError::Log)
    }

    /// Push buffered bytes to the file
    pub async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await.map_err(SinkError::Log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
