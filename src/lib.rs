//! AMI Manager - Asterisk Manager Interface client.
//!
//! This library keeps a persistent TCP connection to an Asterisk server,
//! logs in, and fans every inbound packet out to subscribed handlers.
//!
//! # Architecture
//!
//! ```text
//! TCP ──► GreetingDisassembler ──► PacketDisassembler ──► EventBus ──► handlers
//!              │ greeting                  │ responses
//!              ▼                           ▼
//!          Login action              pending requests
//! ```
//!
//! Key design principles:
//!
//! - One task runs the connect/read/parse/dispatch loop
//! - Packets reach handlers in wire order
//! - Reconnects start from a clean buffer
//! - Parse problems are logged and dropped, never fatal
//!
//! # Quick Start
//!
//! ```no_run
//! use ami_manager::{Manager, Packet, Pattern, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = Manager::builder()
//!         .host("127.0.0.1")
//!         .credentials("admin", "secret")
//!         .build()?;
//!
//!     manager.when([Pattern::event("Hangup")], |packet: &Packet| {
//!         println!("Hangup on {}", packet.get("Channel").unwrap_or("?"));
//!     });
//!
//!     manager.serve_forever().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Pattern subscriptions: [`EventBus`], [`Pattern`] |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`manager`] | [`Manager`], builder, config, state machine |
//! | [`protocol`] | Wire format: [`Action`], [`Packet`], disassemblers |
//! | [`transport`] | TCP connection halves (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Event subscription engine.
pub mod events;

/// Type-safe identifiers.
pub mod identifiers;

/// Connection manager and configuration.
///
/// Use [`Manager::builder()`] to create a configured manager.
pub mod manager;

/// AMI wire protocol.
pub mod protocol;

/// TCP transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{EventBus, Pattern, PatternValue, SubscriptionHandle};

// Identifier types
pub use identifiers::{ActionId, OwnerId, SubscriptionId};

// Manager types
pub use manager::{ConnectionState, Manager, ManagerBuilder, ManagerConfig};

// Protocol types
pub use protocol::{Action, Greeting, Packet, PacketKind};
