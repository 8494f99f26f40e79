//! Outbound action serialization.
//!
//! Actions go on the wire as `Key: Value\r\n` lines followed by one blank
//! line:
//!
//! ```text
//! Action: Login\r\n
//! ActionID: 1\r\n
//! Username: admin\r\n
//! Secret: pa55\r\n
//! \r\n
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::ActionId;

use super::packet::ACTION_ID_KEY;

// ============================================================================
// Constants
// ============================================================================

/// Line separator.
pub const CRLF: &str = "\r\n";

/// Key naming the action to run.
pub const ACTION_KEY: &str = "Action";

// ============================================================================
// assemble
// ============================================================================

/// Serializes field/value pairs into one wire packet.
///
/// Pairs are emitted in iteration order. An empty input yields just the
/// terminating blank line.
pub fn assemble<I, K, V>(fields: I) -> Vec<u8>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::new();
    for (key, value) in fields {
        out.push_str(key.as_ref());
        out.push_str(": ");
        out.push_str(value.as_ref());
        out.push_str(CRLF);
    }
    out.push_str(CRLF);
    out.into_bytes()
}

// ============================================================================
// Action
// ============================================================================

/// An outbound action: `Action: <name>` followed by ordered fields.
///
/// # Example
///
/// ```
/// use ami_manager::Action;
///
/// let action = Action::new("Originate")
///     .field("Channel", "SIP/100")
///     .field("Exten", "200");
/// assert!(action.to_bytes().ends_with(b"\r\n\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    fields: Vec<(String, String)>,
}

impl Action {
    /// Creates an action with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            fields: vec![(ACTION_KEY.to_string(), name.into())],
        }
    }

    /// Builds the login action sent after the greeting.
    #[must_use]
    pub fn login(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::new("Login")
            .action_id(ActionId::login())
            .field("Username", username)
            .field("Secret", secret)
    }

    /// Appends a field, replacing any existing value for the key.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets the `ActionID` field.
    #[must_use]
    pub fn action_id(self, id: ActionId) -> Self {
        self.field(ACTION_ID_KEY, id.as_str())
    }

    /// Sets a field in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key, value)),
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

    /// Action name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.get(ACTION_KEY).unwrap_or_default()
    }

    /// The `ActionID` field, if set.
    #[must_use]
    pub fn id(&self) -> Option<ActionId> {
        self.get(ACTION_ID_KEY).map(ActionId::new)
    }

    /// Iterates fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes the action to wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        assemble(self.iter())
    }
}

/// Collects raw pairs into an action. Later duplicates replace earlier values.
///
/// No `Action` field is implied; the pairs are sent exactly as given.
impl<K, V> FromIterator<(K, V)> for Action
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut action = Self { fields: Vec::new() };
        for (key, value) in iter {
            action.set(key, value);
        }
        action
    }
}

// ============================================================================
// Tests
// ============================================================================
