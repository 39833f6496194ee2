// Teleoperation control core for the AlohaMini lift axis and omniwheel base

pub mod config;
pub mod error;
pub mod input;
pub mod keyboard;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod safety;

pub use config::{Platform, TeleopConfig};
pub use error::{Result, TeleopError};
pub use runtime::{ControlLoop, TickOutcome};
