//! Event subscription engine.
//!
//! Callers register interest in inbound packets with one or more
//! [`Pattern`]s; every packet read off the wire is published to the
//! [`EventBus`] and delivered to each matching handler.
//!
//! # Example
//!
//! ```
//! use ami_manager::events::{EventBus, Pattern};
//! use ami_manager::Packet;
//!
//! let bus = EventBus::new();
//! let handle = bus.subscribe(
//!     [Pattern::event("Hangup")],
//!     |packet: &Packet| println!("hangup on {:?}", packet.get("Channel")),
//!     None,
//! );
//!
//! let packet: Packet = [("Event", "Hangup"), ("Channel", "SIP/1")].into_iter().collect();
//! assert_eq!(bus.publish(&packet), 1);
//! bus.unsubscribe(&handle);
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Subscription registry and dispatch.
pub mod bus;

/// Partial-packet patterns.
pub mod pattern;

// ============================================================================
// Re-exports
// ============================================================================

pub use bus::{EventBus, Handler, SubscriptionHandle};
pub use pattern::{Pattern, PatternValue};
