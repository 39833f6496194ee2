// Motor control module for the AlohaMini base and lift axis
//
// Provides:
// - Velocity encoding for the Feetech velocity registers
// - Omniwheel kinematics (body velocity <-> wheel velocities)
// - Feetech STS3215 serial protocol implementation
// - The `ActuatorBus` seam used by the control loop, with serial and mock buses

mod bus;
pub mod codec;
pub mod feetech;
pub mod kinematics;
pub mod mock;

pub use bus::{ActuatorBus, BusError, ControlMode, FeetechActuatorBus};
pub use feetech::{FeetechBus, FeetechError};
pub use kinematics::{Geometry, OmniKinematics, WheelSpeeds};
pub use mock::{BusCall, MockBus};
