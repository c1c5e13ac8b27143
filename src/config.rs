//! Bridge Configuration
//!
//! Knobs for the process bridge. Everything has a sensible default; the
//! embedding server usually only overrides the interpreter path.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding the interpreter binary.
pub const INTERPRETER_ENV: &str = "PHOTON_BRIDGE_INTERPRETER";

/// Configuration for the session bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Interpreter binary used to run submitted programs.
    pub interpreter: String,
    /// Capacity of the outbound event broadcast channel.
    pub event_capacity: usize,
    /// How long to wait for an exit status after a read failure before
    /// giving up and reporting the sentinel status.
    #[serde(with = "duration_millis")]
    pub kill_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            event_capacity: 256,
            kill_grace: Duration::from_millis(200),
        }
    }
}

impl BridgeConfig {
    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(interpreter) = std::env::var(INTERPRETER_ENV) {
            if !interpreter.trim().is_empty() {
                config.interpreter = interpreter;
            }
        }
        config
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.kill_grace, Duration::from_millis(200));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = BridgeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.interpreter, config.interpreter);
        assert_eq!(back.kill_grace, config.kill_grace);
    }
}
