//! Manager configuration.
//!
//! [`ManagerConfig`] is a plain value the host application can build in code,
//! through [`ManagerBuilder`](super::ManagerBuilder), or deserialize from its
//! own config source. Durations serialize as integer milliseconds.
//!
//! # Example
//!
//! ```
//! use ami_manager::ManagerConfig;
//!
//! let config = ManagerConfig {
//!     host: "pbx.local".into(),
//!     user: "admin".into(),
//!     secret: "pa55".into(),
//!     ..ManagerConfig::default()
//! };
//! assert_eq!(config.port, 5038);
//! assert!(config.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Standard AMI port.
pub const DEFAULT_PORT: u16 = 5038;

/// Timeout for a single TCP connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between connect attempts.
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on one blocking read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Sleep between serve loop iterations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum bytes per read (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Timeout waiting for an action's response.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ManagerConfig
// ============================================================================

/// Connection and serve loop settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Server host name or address.
    pub host: String,

    /// Server TCP port.
    pub port: u16,

    /// Login user name.
    pub user: String,

    /// Login secret.
    pub secret: String,

    /// Reconnect on I/O errors instead of returning them.
    pub reopen: bool,

    /// Timeout for one connect attempt.
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Delay between connect attempts.
    #[serde(rename = "connect_retry_delay_ms", with = "duration_ms")]
    pub connect_retry_delay: Duration,

    /// Give up after this many failed connect attempts (`None` = never).
    pub max_connect_attempts: Option<u32>,

    /// Upper bound on one read; an idle connection just loops.
    #[serde(rename = "read_timeout_ms", with = "duration_ms")]
    pub read_timeout: Duration,

    /// Sleep between serve loop iterations.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,

    /// Maximum bytes per read.
    pub chunk_size: usize,

    /// Default timeout for [`Manager::request`](super::Manager::request).
    #[serde(rename = "action_timeout_ms", with = "duration_ms")]
    pub action_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            user: String::new(),
            secret: String::new(),
            reopen: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
            max_connect_attempts: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .field("reopen", &self.reopen)
            .field("connect_timeout", &self.connect_timeout)
            .field("connect_retry_delay", &self.connect_retry_delay)
            .field("max_connect_attempts", &self.max_connect_attempts)
            .field("read_timeout", &self.read_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("chunk_size", &self.chunk_size)
            .field("action_timeout", &self.action_timeout)
            .finish()
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ManagerConfig {
    /// Checks that the configuration can be used to connect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config(
                "host is required. Use .host() to set it.\n\
                 Example: Manager::builder().host(\"127.0.0.1\")",
            ));
        }

        if self.port == 0 {
            return Err(Error::config("port must be non-zero"));
        }

        if self.user.is_empty() {
            return Err(Error::config(
                "user is required for login. Use .credentials() to set it.\n\
                 Example: Manager::builder().credentials(\"admin\", \"secret\")",
            ));
        }

        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be non-zero"));
        }

        if self.read_timeout.is_zero() {
            return Err(Error::config("read_timeout must be non-zero"));
        }

        if self.max_connect_attempts == Some(0) {
            return Err(Error::config(
                "max_connect_attempts must be at least 1 (omit it to retry forever)",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// duration_ms
// ============================================================================

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Serializes a [`Duration`] as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(super::duration_millis(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ManagerConfig {
        ManagerConfig {
            user: "admin".into(),
            secret: "pa55".into(),
            ..ManagerConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.port, 5038);
        assert!(config.reopen);
        assert_eq!(config.connect_retry_delay, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.max_connect_attempts, None);
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_user() {
        let err = ManagerConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("user"));
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let config = ManagerConfig {
            host: " ".into(),
            ..valid()
        };
        assert!(config.validate().unwrap_err().to_string().contains("host"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = ManagerConfig {
            max_connect_attempts: Some(0),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("pa55"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: ManagerConfig = serde_json::from_str(
            r#"{"host": "pbx", "user": "admin", "secret": "s", "reopen": false, "read_timeout_ms": 1500}"#,
        )
        .expect("deserialize");

        assert_eq!(config.host, "pbx");
        assert!(!config.reopen);
        assert_eq!(config.read_timeout, Duration::from_millis(1500));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(250)), 250);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_serialize_durations_as_ms() {
        let json = serde_json::to_value(valid()).expect("serialize");
        assert_eq!(json["poll_interval_ms"], 100);
        assert_eq!(json["connect_retry_delay_ms"], 5000);
    }
}
