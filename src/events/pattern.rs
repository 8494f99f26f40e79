//! Partial-packet patterns.
//!
//! A [`Pattern`] matches a [`Packet`] when every key in the pattern exists
//! in the packet and the packet's value is accepted by the pattern's
//! [`PatternValue`]. The empty pattern matches every packet.
//!
//! ```
//! use ami_manager::events::Pattern;
//!
//! let hangups = Pattern::event("Hangup");
//! let sip_or_iax = Pattern::new().with("ChannelType", ["SIP", "IAX2"]);
//! # let _ = (hangups, sip_or_iax);
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::protocol::Packet;
use crate::protocol::packet::EVENT_KEY;

// ============================================================================
// PatternValue
// ============================================================================

/// Accepted values for one pattern key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternValue {
    /// Exactly this value.
    One(String),

    /// Any of these values.
    AnyOf(Vec<String>),
}

impl PatternValue {
    /// Returns `true` if `value` is accepted.
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::One(expected) => expected == value,
            Self::AnyOf(accepted) => accepted.iter().any(|a| a == value),
        }
    }
}

impl From<&str> for PatternValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for PatternValue {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for PatternValue {
    fn from(values: Vec<String>) -> Self {
        Self::AnyOf(values)
    }
}

impl From<Vec<&str>> for PatternValue {
    fn from(values: Vec<&str>) -> Self {
        Self::AnyOf(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PatternValue {
    fn from(values: [&str; N]) -> Self {
        Self::AnyOf(values.into_iter().map(str::to_string).collect())
    }
}

// ============================================================================
// Pattern
// ============================================================================

/// A set of key constraints, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern {
    fields: Vec<(String, PatternValue)>,
}

impl Pattern {
    /// Creates an empty pattern (matches everything).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Pattern matching events named `name`.
    #[must_use]
    pub fn event(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self::new().with(EVENT_KEY, name)
    }

    /// Adds a key constraint.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PatternValue>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Returns `true` if `packet` satisfies every constraint.
    #[must_use]
    pub fn matches(&self, packet: &Packet) -> bool {
        self.fields.iter().all(|(key, accepted)| {
            packet
                .get(key)
                .is_some_and(|value| accepted.accepts(value))
        })
    }

    /// Number of key constraints.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the pattern has no constraints.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Pattern
where
    K: Into<String>,
    V: Into<PatternValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |pattern, (key, value)| pattern.with(key, value))
    }
}

/// Returns `true` if any pattern matches.
pub(crate) fn any_matches(patterns: &[Pattern], packet: &Packet) -> bool {
    patterns.iter().any(|p| p.matches(packet))
}

// ============================================================================
// Tests
// ============================================================================
