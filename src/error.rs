// Error types for the teleop core

use std::time::Duration;

use crate::config::ConfigError;
use crate::messages::LoopState;
use crate::motor::BusError;

/// Result type alias
pub type Result<T> = std::result::Result<T, TeleopError>;

#[derive(Debug, thiserror::Error)]
pub enum TeleopError {
    /// Rejected before any I/O
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Bus unreachable or actuators could not be configured at start
    #[error("Actuator bus connection failed: {0}")]
    Connection(#[source] BusError),

    /// Latched overcurrent cutoff ended the session
    #[error("Overcurrent fault on motor {motor}: {milliamps:.1} mA")]
    Overcurrent { motor: u8, milliamps: f64 },

    /// A bus call exceeded the configured timeout
    #[error("Motor {motor} bus call took {elapsed:?}, treating bus as hung")]
    BusUnresponsive { motor: u8, elapsed: Duration },

    #[error("Operation not allowed in state {state:?}")]
    InvalidState { state: LoopState },
}
