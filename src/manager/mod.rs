//! Connection manager.
//!
//! This module provides the main entry point of the crate.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Manager`] | Connection lifecycle, serve loop, send/request |
//! | [`ManagerBuilder`] | Fluent configuration builder |
//! | [`ManagerConfig`] | Serializable configuration value |
//! | [`StateHolder`] | Play/Pause/Stop state machine |
//!
//! # Example
//!
//! ```no_run
//! use ami_manager::{Manager, Result};
//!
//! # async fn example() -> Result<()> {
//! let manager = Manager::builder()
//!     .host("127.0.0.1")
//!     .credentials("admin", "secret")
//!     .build()?;
//!
//! let worker = manager.clone();
//! tokio::spawn(async move { worker.serve_forever().await });
//!
//! // ... later
//! manager.stop();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for manager configuration.
pub mod builder;

/// Core manager implementation.
pub mod core;

/// Configuration value and defaults.
pub mod options;

/// Serve loop state machine.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ManagerBuilder;
pub use self::core::Manager;
pub use options::ManagerConfig;
pub use state::{ConnectionState, LoopDirective, StateHolder};
