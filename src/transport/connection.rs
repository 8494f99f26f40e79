//! TCP connection to the AMI server.
//!
//! The stream is split once connected: the serve loop owns the
//! [`ConnectionReader`], while the [`ConnectionWriter`] is shared behind a
//! lock so actions can be sent from any task.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::manager::options::duration_millis;

// ============================================================================
// connect
// ============================================================================

/// Opens a TCP connection and splits it into reader and writer.
///
/// # Errors
///
/// - [`Error::ConnectionTimeout`] if the connect does not finish in time
/// - [`Error::Connection`] if the connect is refused or fails
pub async fn connect(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    chunk_size: usize,
) -> Result<(ConnectionReader, ConnectionWriter)> {
    let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| Error::connection_timeout(duration_millis(connect_timeout)))?
        .map_err(|e| Error::connection(format!("{host}:{port}: {e}")))?;

    let peer = stream.peer_addr()?;
    let _ = stream.set_nodelay(true);

    debug!(%peer, "TCP connection established");

    let (read_half, write_half) = stream.into_split();

    Ok((
        ConnectionReader {
            half: read_half,
            chunk: vec![0; chunk_size.max(1)],
            peer,
        },
        ConnectionWriter {
            half: write_half,
            peer,
        },
    ))
}

// ============================================================================
// ConnectionReader
// ============================================================================

/// Read side of a connection with a reusable chunk buffer.
#[derive(Debug)]
pub struct ConnectionReader {
    half: OwnedReadHalf,
    chunk: Vec<u8>,
    peer: SocketAddr,
}

impl ConnectionReader {
    /// Reads up to one chunk.
    ///
    /// Returns `Ok(None)` if nothing arrived within `read_timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] on an empty read (peer closed)
    /// - [`Error::Io`] if the read fails
    pub async fn read_chunk(&mut self, read_timeout: Duration) -> Result<Option<&[u8]>> {
        let read = match timeout(read_timeout, self.half.read(&mut self.chunk)).await {
            Ok(result) => result?,
            Err(_) => {
                trace!(peer = %self.peer, "Read timed out");
                return Ok(None);
            }
        };

        if read == 0 {
            debug!(peer = %self.peer, "Connection closed by peer");
            return Err(Error::ConnectionClosed);
        }

        trace!(peer = %self.peer, bytes = read, "Chunk received");
        Ok(Some(&self.chunk[..read]))
    }

    /// Remote address.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

// ============================================================================
// ConnectionWriter
// ============================================================================

/// Write side of a connection.
#[derive(Debug)]
pub struct ConnectionWriter {
    half: OwnedWriteHalf,
    peer: SocketAddr,
}

impl ConnectionWriter {
    /// Writes all bytes and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write fails.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<usize> {
        self.half.write_all(bytes).await?;
        self.half.flush().await?;
        trace!(peer = %self.peer, bytes = bytes.len(), "Bytes written");
        Ok(bytes.len())
    }

    /// Shuts the write side down, ignoring errors. Dropping closes the socket.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.half.shutdown().await {
            trace!(peer = %self.peer, error = %e, "Shutdown error ignored");
        }
        debug!(peer = %self.peer, "Connection closed");
    }

    /// Remote address.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

// ============================================================================
// Tests
// ============================================================================
