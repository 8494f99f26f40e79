//! TCP transport layer.
//!
//! # Connection Lifecycle
//!
//! 1. `connect` - Open TCP stream to `host:port` (with timeout)
//! 2. Server sends the greeting line
//! 3. `ConnectionReader::read_chunk` - Serve loop pulls raw chunks
//! 4. `ConnectionWriter::write_all` - Actions are written from any task
//! 5. `ConnectionWriter::shutdown` - Best-effort close
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | TCP connect, chunked reads, serialized writes |

// ============================================================================
// Submodules
// ============================================================================

/// TCP connection halves.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ConnectionReader, ConnectionWriter, connect};
