//! Parsed inbound messages.
//!
//! A [`Packet`] is one `Key: Value` block terminated by a blank line.
//! [`PacketKind`] classifies it once after parsing.
//!
//! # Classification
//!
//! | Key present | Kind |
//! |-------------|------|
//! | `Response` | [`PacketKind::Response`] |
//! | `Event` (no `Response`) | [`PacketKind::Event`] |
//! | neither | [`PacketKind::Unknown`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::identifiers::ActionId;

// ============================================================================
// Constants
// ============================================================================

/// Key marking a response packet.
pub const RESPONSE_KEY: &str = "Response";

/// Key marking an event packet.
pub const EVENT_KEY: &str = "Event";

/// Key correlating actions and responses.
pub const ACTION_ID_KEY: &str = "ActionID";

// ============================================================================
// Packet
// ============================================================================

/// Ordered string-to-string mapping.
///
/// Lookups are case-sensitive. Inserting an existing key replaces its value
/// and keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    fields: Vec<(String, String)>,
}

impl Packet {
    /// Creates an empty packet.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Inserts a field, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();

        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if `key` is present.
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(index).1)
    }

    /// Number of fields.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the packet has no fields.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `ActionID` field, if any.
    #[must_use]
    pub fn action_id(&self) -> Option<ActionId> {
        self.get(ACTION_ID_KEY).map(ActionId::new)
    }

    /// The `Event` field, if any.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.get(EVENT_KEY)
    }

    /// The `Response` field, if any.
    #[inline]
    #[must_use]
    pub fn response(&self) -> Option<&str> {
        self.get(RESPONSE_KEY)
    }

    /// Classifies the packet.
    #[inline]
    #[must_use]
    pub fn classify(self) -> PacketKind {
        PacketKind::from(self)
    }
}

impl<K, V> FromIterator<(K, V)> for Packet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut packet = Self::new();
        for (key, value) in iter {
            packet.insert(key, value);
        }
        packet
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}

impl Serialize for Packet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// ============================================================================
// PacketKind
// ============================================================================

/// A packet tagged by what it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketKind {
    /// Reply to an action (`Response` key present).
    Response(Packet),

    /// Asynchronous notification (`Event` key present, no `Response`).
    Event(Packet),

    /// Neither key present.
    Unknown(Packet),
}

impl PacketKind {
    /// Borrows the inner packet.
    #[inline]
    #[must_use]
    pub fn packet(&self) -> &Packet {
        match self {
            Self::Response(p) | Self::Event(p) | Self::Unknown(p) => p,
        }
    }

    /// Unwraps the inner packet.
    #[inline]
    #[must_use]
    pub fn into_packet(self) -> Packet {
        match self {
            Self::Response(p) | Self::Event(p) | Self::Unknown(p) => p,
        }
    }

    /// Short label for logging.
    #[inline]
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Response(_) => "response",
            Self::Event(_) => "event",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<Packet> for PacketKind {
    fn from(packet: Packet) -> Self {
        if packet.contains_key(RESPONSE_KEY) {
            Self::Response(packet)
        } else if packet.contains_key(EVENT_KEY) {
            Self::Event(packet)
        } else {
            Self::Unknown(packet)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
