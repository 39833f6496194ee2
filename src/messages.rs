// Message types shared between the control loop and its callers

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::safety::SafetyState;

/// Operator-intended platform motion in the body frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyVelocity {
    /// Forward velocity in m/s
    pub x: f64,
    /// Lateral velocity in m/s (positive = left)
    pub y: f64,
    /// Rotational velocity in deg/s (positive = counter-clockwise)
    pub theta: f64,
}

impl BodyVelocity {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Actuator identifiers as seen by the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Left,
    Back,
    Right,
    Lift,
}

/// Raw velocity command per joint, produced fresh every tick
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WheelCommand(BTreeMap<Joint, i32>);

impl WheelCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// All given joints commanded to zero
    pub fn zero(joints: &[Joint]) -> Self {
        joints.iter().map(|&joint| (joint, 0)).collect()
    }

    pub fn set(&mut self, joint: Joint, raw: i32) {
        self.0.insert(joint, raw);
    }

    pub fn get(&self, joint: Joint) -> Option<i32> {
        self.0.get(&joint).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, i32)> + '_ {
        self.0.iter().map(|(&joint, &raw)| (joint, raw))
    }

    /// True when every joint is commanded to zero
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|&raw| raw == 0)
    }
}

impl FromIterator<(Joint, i32)> for WheelCommand {
    fn from_iter<I: IntoIterator<Item = (Joint, i32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A single current reading from the bus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentSample {
    pub motor: u8,
    pub milliamps: f64,
}

/// Lifecycle of a control-loop session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
    Tripped,
    Stopped,
}

/// Condition that forced a running loop into the shutdown path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    Overcurrent { motor: u8, milliamps: f64 },
    BusUnresponsive { motor: u8, elapsed: Duration },
}

/// Status published for display and diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlStatus {
    pub state: LoopState,
    pub safety: SafetyState,
    pub fault: Option<Fault>,
    pub last_command: WheelCommand,
    pub ticks: u64,
}

impl Default for ControlStatus {
    fn default() -> Self {
        Self {
            state: LoopState::Idle,
            safety: SafetyState::Normal,
            fault: None,
            last_command: WheelCommand::new(),
            ticks: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_command_zero() {
        let cmd = WheelCommand::zero(&[Joint::Left, Joint::Back, Joint::Right]);
        assert!(cmd.is_zero());
        assert_eq!(cmd.get(Joint::Back), Some(0));
        assert_eq!(cmd.get(Joint::Lift), None);
    }

    #[test]
    fn test_status_serializes_with_joint_names() {
        let mut status = ControlStatus::default();
        status.last_command.set(Joint::Lift, -2048);
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"lift\":-2048"), "{}", json);
        assert!(json.contains("\"state\":\"idle\""), "{}", json);
        assert!(json.contains("\"safety\":\"normal\""), "{}", json);
    }
}
