//! Configuration types for the client

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnection policy and timing for a [`crate::Client`].
///
/// Every field can also be changed at runtime through the client's
/// `set_reconnect`, `set_reconnect_interval` and `set_max_reconnects`
/// setters; the next disconnection picks the new values up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Whether to reconnect after an abnormal disconnection
    pub reconnect: bool,

    /// Delay between reconnection attempts
    #[serde(with = "duration_serde")]
    pub reconnect_interval: Duration,

    /// Maximum number of reconnection attempts. `0` means unlimited.
    pub max_reconnects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_interval: Duration::from_secs(1),
            max_reconnects: 5,
        }
    }
}

impl ClientConfig {
    /// Whether another attempt should be scheduled after `attempts` failed
    /// connections. The attempt counter resets whenever a connection opens.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.reconnect && (self.max_reconnects == 0 || attempts < self.max_reconnects)
    }
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        let config = ClientConfig::default();
        assert!(config.should_retry(0));
        assert!(config.should_retry(4));
        assert!(!config.should_retry(5)); // Default max is 5

        let capped = ClientConfig {
            max_reconnects: 2,
            ..Default::default()
        };
        assert!(capped.should_retry(1));
        assert!(!capped.should_retry(2));

        let unlimited = ClientConfig {
            max_reconnects: 0,
            ..Default::default()
        };
        assert!(unlimited.should_retry(10_000));

        let disabled = ClientConfig {
            reconnect: false,
            ..Default::default()
        };
        assert!(!disabled.should_retry(0));
    }

    #[test]
    fn test_config_serialization() {
        let config = ClientConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"reconnect_interval\":1000"));
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.reconnect_interval, Duration::from_secs(1));
        assert_eq!(back.max_reconnects, 5);
    }
}
