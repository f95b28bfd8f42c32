// Session timing and behaviour settings
// Durations are stored in JSON as integer milliseconds

use crate::core::VswrFormula;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid session config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid session config: {0}")]
    Invalid(String),
}

/// Session engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Listener read timeout outside configuration mode
    #[serde(with = "millis")]
    pub listener_read_timeout: Duration,

    /// Time allowed to read the rest of a frame once its identifier arrived
    #[serde(with = "millis")]
    pub frame_timeout: Duration,

    /// How long each boot handshake attempt waits for the model response
    #[serde(with = "millis")]
    pub handshake_timeout: Duration,

    /// How long a command waits for the radio's ready byte
    #[serde(with = "millis")]
    pub ready_timeout: Duration,

    /// How long a query or configuration command waits for its response
    #[serde(with = "millis")]
    pub response_timeout: Duration,

    #[serde(with = "millis")]
    pub temperature_period: Duration,

    /// Window for the one or two PA temperature responses
    #[serde(with = "millis")]
    pub temperature_timeout: Duration,

    /// Power readings taken earlier than this into a transmit burst are discarded
    #[serde(with = "millis")]
    pub transmit_settle_time: Duration,

    #[serde(with = "millis")]
    pub vswr_poll_interval: Duration,

    #[serde(with = "millis")]
    pub rssi_poll_interval: Duration,

    /// Poller sleep while the radio is in configuration mode
    #[serde(with = "millis")]
    pub config_mode_idle: Duration,

    pub vswr_formula: VswrFormula,

    /// Responses buffered per query code before the oldest is dropped
    pub max_queued_responses: usize,

    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            listener_read_timeout: Duration::from_secs(10),
            frame_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(1),
            temperature_period: Duration::from_secs(10),
            temperature_timeout: Duration::from_millis(100),
            transmit_settle_time: Duration::from_millis(300),
            vswr_poll_interval: Duration::from_millis(250),
            rssi_poll_interval: Duration::from_millis(50),
            config_mode_idle: Duration::from_millis(200),
            vswr_formula: VswrFormula::default(),
            max_queued_responses: 8,
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-query response timeout
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_temperature_period(mut self, period: Duration) -> Self {
        self.temperature_period = period;
        self
    }

    pub fn with_temperature_timeout(mut self, timeout: Duration) -> Self {
        self.temperature_timeout = timeout;
        self
    }

    pub fn with_transmit_settle_time(mut self, settle: Duration) -> Self {
        self.transmit_settle_time = settle;
        self
    }

    pub fn with_rssi_poll_interval(mut self, interval: Duration) -> Self {
        self.rssi_poll_interval = interval;
        self
    }

    pub fn with_vswr_formula(mut self, formula: VswrFormula) -> Self {
        self.vswr_formula = formula;
        self
    }

    /// Check the settings make sense together
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("listener_read_timeout", self.listener_read_timeout),
            ("frame_timeout", self.frame_timeout),
            ("handshake_timeout", self.handshake_timeout),
            ("ready_timeout", self.ready_timeout),
            ("response_timeout", self.response_timeout),
            ("temperature_period", self.temperature_period),
            ("temperature_timeout", self.temperature_timeout),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must not be zero", name)));
            }
        }

        if self.max_queued_responses == 0 {
            return Err(ConfigError::Invalid(
                "max_queued_responses must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a JSON config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
