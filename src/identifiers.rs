//! Type-safe identifiers.
//!
//! Newtype wrappers keep action IDs, subscription IDs and owner IDs from being
//! mixed up at compile time.
//!
//! | Type | Wraps | Source |
//! |------|-------|--------|
//! | [`ActionId`] | `String` | `ActionID` field on the wire |
//! | [`SubscriptionId`] | `Uuid` | Generated on subscribe |
//! | [`OwnerId`] | `String` | Caller-chosen group key |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ActionId
// ============================================================================

/// Value of the `ActionID` field correlating an action with its response.
///
/// Asterisk echoes the value verbatim, so any string is valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// ID used for the login action sent after the greeting.
    pub const LOGIN: &'static str = "1";

    /// Creates an action ID from any string.
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The login action ID.
    #[inline]
    #[must_use]
    pub fn login() -> Self {
        Self::new(Self::LOGIN)
    }

    /// Returns the raw string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// ActionIdSequence
// ============================================================================

/// Monotonic generator for numeric action IDs.
///
/// Starts after [`ActionId::LOGIN`] so generated IDs never collide with it.
#[derive(Debug)]
pub struct ActionIdSequence {
    next: AtomicU64,
}

impl ActionIdSequence {
    /// Creates a sequence whose first ID is `2`.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(2),
        }
    }

    /// Returns the next ID.
    #[inline]
    pub fn next_id(&self) -> ActionId {
        ActionId(self.next.fetch_add(1, Ordering::Relaxed).to_string())
    }
}

impl Default for ActionIdSequence {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Unique ID of an event bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generates a new random ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// OwnerId
// ============================================================================

/// Groups subscriptions so they can be removed together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner ID.
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_skips_login_id() {
        let seq = ActionIdSequence::new();
        assert_eq!(seq.next_id().as_str(), "2");
        assert_eq!(seq.next_id().as_str(), "3");
        assert_ne!(seq.next_id(), ActionId::login());
    }

    #[test]
    fn test_subscription_ids_are_unique() {
        assert_ne!(SubscriptionId::generate(), SubscriptionId::generate());
    }

    #[test]
    fn test_owner_id_display() {
        let owner = OwnerId::from("dialer");
        assert_eq!(owner.to_string(), "dialer");
    }

    #[test]
    fn test_action_id_serde_transparent() {
        let id = ActionId::new("abc");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"abc\"");
    }
}
