//! Stream Configuration Settings
//!
//! Configuration types for the quote stream client, loaded from environment
//! variables with sensible defaults for every timing constant.

use std::time::Duration;

use crate::infrastructure::broker::{BrokerConfig, HeartbeatConfig};

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Broker WebSocket endpoint URL.
    pub url: String,
    /// Heartbeat ping interval (outbound keepalive).
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Fixed delay between transport-failure retries.
    pub reconnect_delay: Duration,
    /// Delay before the single fresh attempt after an auth failure.
    pub auth_retry_delay: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9001/stream".to_string(),
            heartbeat_interval: Duration::from_millis(10_000),
            heartbeat_timeout: Duration::from_millis(10_000),
            reconnect_delay: Duration::from_secs(1),
            auth_retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Quote delivery settings.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// Per-symbol throttle window.
    pub throttle_interval: Duration,
    /// First-quote delivery window before an SLA breach is flagged.
    pub sla_window: Duration,
    /// Capacity of the broker event channel.
    pub event_capacity: usize,
    /// Capacity of the command channel to the broker.
    pub command_capacity: usize,
    /// Capacity of the SLA breach broadcast channel.
    pub breach_capacity: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_millis(200),
            sla_window: Duration::from_millis(2000),
            event_capacity: 1024,
            command_capacity: 32,
            breach_capacity: 64,
        }
    }
}

/// Complete stream client configuration.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    /// WebSocket connection settings.
    pub transport: TransportSettings,
    /// Quote delivery settings.
    pub delivery: DeliverySettings,
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker URL is set but empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = match std::env::var("QUOTE_STREAM_URL") {
            Ok(url) if url.is_empty() => {
                return Err(ConfigError::EmptyValue("QUOTE_STREAM_URL".to_string()));
            }
            Ok(url) => url,
            Err(_) => TransportSettings::default().url,
        };

        let transport = TransportSettings {
            url,
            heartbeat_interval: parse_env_duration_millis(
                "QUOTE_STREAM_HEARTBEAT_MS",
                TransportSettings::default().heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_millis(
                "QUOTE_STREAM_HEARTBEAT_TIMEOUT_MS",
                TransportSettings::default().heartbeat_timeout,
            ),
            reconnect_delay: parse_env_duration_millis(
                "QUOTE_STREAM_RECONNECT_DELAY_MS",
                TransportSettings::default().reconnect_delay,
            ),
            auth_retry_delay: parse_env_duration_millis(
                "QUOTE_STREAM_AUTH_RETRY_DELAY_MS",
                TransportSettings::default().auth_retry_delay,
            ),
        };

        let delivery = DeliverySettings {
            throttle_interval: parse_env_duration_millis(
                "QUOTE_STREAM_THROTTLE_MS",
                DeliverySettings::default().throttle_interval,
            ),
            sla_window: parse_env_duration_millis(
                "QUOTE_STREAM_SLA_WINDOW_MS",
                DeliverySettings::default().sla_window,
            ),
            event_capacity: parse_env_usize(
                "QUOTE_STREAM_EVENT_CAPACITY",
                DeliverySettings::default().event_capacity,
            ),
            command_capacity: parse_env_usize(
                "QUOTE_STREAM_COMMAND_CAPACITY",
                DeliverySettings::default().command_capacity,
            ),
            breach_capacity: parse_env_usize(
                "QUOTE_STREAM_BREACH_CAPACITY",
                DeliverySettings::default().breach_capacity,
            ),
        };

        Ok(Self {
            transport,
            delivery,
        })
    }

    /// Broker connection configuration derived from the transport settings.
    #[must_use]
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            url: self.transport.url.clone(),
            heartbeat: HeartbeatConfig::new(
                self.transport.heartbeat_interval,
                self.transport.heartbeat_timeout,
            ),
            reconnect_delay: self.transport.reconnect_delay,
            auth_retry_delay: self.transport.auth_retry_delay,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
