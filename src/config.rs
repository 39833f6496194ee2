// Teleop configuration: ports, actuator IDs, speeds, geometry, safety limits
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motor::codec::RAW_LIMIT;
use crate::motor::feetech::DEFAULT_BAUDRATE;
use crate::motor::kinematics::{Geometry, MAX_RAW};
use crate::safety::DEFAULT_TRIGGER_COUNT;

// Zenoh topic for status telemetry
pub const TOPIC_STATUS: &str = "alohamini/state/teleop";

// Default serial port for the Feetech bus adapter
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

// Loop periods (base runs at 20 Hz, lift at ~33 Hz)
pub const BASE_TICK_PERIOD: Duration = Duration::from_millis(50);
pub const LIFT_TICK_PERIOD: Duration = Duration::from_millis(30);

// A bus call slower than this is treated as a hung bus
pub const DEFAULT_BUS_TIMEOUT: Duration = Duration::from_millis(500);

/// Which actuators a session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Three-wheel omnidirectional base
    Base,
    /// Single lift axis
    Lift,
}

impl Platform {
    pub fn default_tick_period(self) -> Duration {
        match self {
            Platform::Base => BASE_TICK_PERIOD,
            Platform::Lift => LIFT_TICK_PERIOD,
        }
    }
}

/// Motor IDs of the base wheels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseIds {
    pub left: u8,
    pub back: u8,
    pub right: u8,
}

impl Default for BaseIds {
    fn default() -> Self {
        Self {
            left: 8,
            back: 9,
            right: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be finite and non-negative, got {value}")]
    InvalidSpeed { field: &'static str, value: f64 },

    #[error("max_raw must be within 1..=32767, got {0}")]
    MaxRawOutOfRange(i32),

    #[error("trigger_count must be at least 1")]
    ZeroTriggerCount,

    #[error("{field} must be non-zero")]
    ZeroDuration { field: &'static str },

    #[error("motor id {0} is used more than once")]
    DuplicateId(u8),

    #[error("motor id {0} is reserved (0xFE is broadcast, 0xFF is invalid)")]
    ReservedId(u8),

    #[error("serial port must not be empty")]
    EmptyPort,
}

/// All tunables of a teleop session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopConfig {
    /// Serial port of the actuator bus
    pub port: String,
    pub baudrate: u32,

    pub base_ids: BaseIds,
    pub lift_id: u8,

    /// Base translation speed in m/s
    pub lin_speed: f64,
    /// Base rotation speed in deg/s
    pub ang_speed: f64,
    /// Lift axis speed in deg/s
    pub lift_speed: f64,
    /// "up" drives the lift axis in the negative direction
    pub invert_lift: bool,

    pub geometry: Geometry,
    /// Per-wheel raw velocity cap for the base
    pub max_raw: i32,

    pub overcurrent_threshold_ma: f64,
    pub trigger_count: u32,

    /// Overrides the platform default when set
    pub tick_period_ms: Option<u64>,
    pub bus_timeout_ms: u64,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            base_ids: BaseIds::default(),
            lift_id: 11,
            lin_speed: 0.2,
            ang_speed: 80.0,
            lift_speed: 180.0,
            invert_lift: true,
            geometry: Geometry::default(),
            max_raw: MAX_RAW,
            overcurrent_threshold_ma: 500.0,
            trigger_count: DEFAULT_TRIGGER_COUNT,
            tick_period_ms: None,
            bus_timeout_ms: DEFAULT_BUS_TIMEOUT.as_millis() as u64,
        }
    }
}

impl TeleopConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn tick_period(&self, platform: Platform) -> Duration {
        self.tick_period_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| platform.default_tick_period())
    }

    pub fn bus_timeout(&self) -> Duration {
        Duration::from_millis(self.bus_timeout_ms)
    }

    /// Motor IDs driven on the given platform
    pub fn motor_ids(&self, platform: Platform) -> Vec<u8> {
        match platform {
            Platform::Base => vec![self.base_ids.left, self.base_ids.back, self.base_ids.right],
            Platform::Lift => vec![self.lift_id],
        }
    }

    /// Reject configurations that would make the loop unsafe or meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::EmptyPort);
        }

        for (field, value) in [
            ("geometry.wheel_radius", self.geometry.wheel_radius),
            ("geometry.base_radius", self.geometry.base_radius),
            ("overcurrent_threshold_ma", self.overcurrent_threshold_ma),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        for (field, value) in [
            ("lin_speed", self.lin_speed),
            ("ang_speed", self.ang_speed),
            ("lift_speed", self.lift_speed),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidSpeed { field, value });
            }
        }

        if !(1..=RAW_LIMIT).contains(&self.max_raw) {
            return Err(ConfigError::MaxRawOutOfRange(self.max_raw));
        }
        if self.trigger_count == 0 {
            return Err(ConfigError::ZeroTriggerCount);
        }
        if self.tick_period_ms == Some(0) {
            return Err(ConfigError::ZeroDuration {
                field: "tick_period_ms",
            });
        }
        if self.bus_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "bus_timeout_ms",
            });
        }

        let mut seen = HashSet::new();
        let ids = [
            self.base_ids.left,
            self.base_ids.back,
            self.base_ids.right,
            self.lift_id,
        ];
        for id in ids {
            if id >= 0xFE {
                return Err(ConfigError::ReservedId(id));
            }
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateId(id));
            }
        }

        Ok(())
    }
}
