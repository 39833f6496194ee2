// Actuator bus abstraction
//
// The control loop talks to actuators only through `ActuatorBus`. Every call
// returns a `BusError` that says whether the failure is fatal for the session
// (the bus is gone) or transient (one exchange failed, try again next tick).

use tracing::{debug, info, warn};

use super::feetech::{FeetechBus, FeetechError, OperatingMode};

/// Control mode requested from an actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Position,
    Velocity,
}

impl From<ControlMode> for OperatingMode {
    fn from(mode: ControlMode) -> Self {
        match mode {
            ControlMode::Position => OperatingMode::Position,
            ControlMode::Velocity => OperatingMode::Velocity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Bus unreachable; nothing further can be sent
    #[error("bus unreachable: {0}")]
    Connection(String),

    /// A single exchange failed
    #[error("motor {id}: {reason}")]
    Transient { id: u8, reason: String },

    #[error("bus is not connected")]
    NotConnected,
}

impl BusError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::Transient { .. })
    }

    fn from_feetech(id: u8, err: FeetechError) -> Self {
        match err {
            FeetechError::Serial(e) => BusError::Connection(e.to_string()),
            other => BusError::Transient {
                id,
                reason: other.to_string(),
            },
        }
    }
}

/// Operations the control loop needs from an actuator bus
pub trait ActuatorBus: Send {
    fn connect(&mut self) -> Result<(), BusError>;

    /// Close the bus, optionally leaving torque enabled on the known actuators
    fn disconnect(&mut self, keep_torque: bool) -> Result<(), BusError>;

    fn set_mode(&mut self, id: u8, mode: ControlMode) -> Result<(), BusError>;

    fn enable_torque(&mut self, id: u8) -> Result<(), BusError>;

    fn disable_torque(&mut self, id: u8) -> Result<(), BusError>;

    /// Goal velocity in raw steps/s
    fn write_velocity(&mut self, id: u8, raw: i32) -> Result<(), BusError>;

    /// Present current in milliamps
    fn read_current(&mut self, id: u8) -> Result<f64, BusError>;

    /// Goal velocities for several actuators; buses with a batched write override this
    fn write_velocities(&mut self, data: &[(u8, i32)]) -> Result<(), BusError> {
        for &(id, raw) in data {
            self.write_velocity(id, raw)?;
        }
        Ok(())
    }
}

/// `ActuatorBus` over a Feetech STS3215 serial bus
pub struct FeetechActuatorBus {
    port_name: String,
    baudrate: u32,
    motor_ids: Vec<u8>,
    bus: Option<FeetechBus>,
}

impl FeetechActuatorBus {
    pub fn new(port_name: &str, baudrate: u32, motor_ids: &[u8]) -> Self {
        Self {
            port_name: port_name.to_string(),
            baudrate,
            motor_ids: motor_ids.to_vec(),
            bus: None,
        }
    }

    fn bus(&mut self) -> Result<&mut FeetechBus, BusError> {
        self.bus.as_mut().ok_or(BusError::NotConnected)
    }
}

impl ActuatorBus for FeetechActuatorBus {
    fn connect(&mut self) -> Result<(), BusError> {
        info!("Opening motor bus on {} @ {} baud", self.port_name, self.baudrate);
        let mut bus = FeetechBus::open_with_baudrate(&self.port_name, self.baudrate)
            .map_err(|e| BusError::Connection(e.to_string()))?;

        // Check that all motors are reachable before anything is energized
        for &id in &self.motor_ids {
            match bus.ping(id) {
                Ok(true) => debug!("Motor {} responding", id),
                Ok(false) => {
                    return Err(BusError::Connection(format!(
                        "motor {} not responding to ping",
                        id
                    )));
                }
                Err(e) => return Err(BusError::Connection(e.to_string())),
            }
        }

        self.bus = Some(bus);
        Ok(())
    }

    fn disconnect(&mut self, keep_torque: bool) -> Result<(), BusError> {
        let Some(mut bus) = self.bus.take() else {
            return Ok(());
        };

        let mut result = Ok(());
        if !keep_torque {
            for &id in &self.motor_ids {
                if let Err(e) = bus.disable_torque(id) {
                    warn!("Failed to disable torque on motor {} while disconnecting: {}", id, e);
                    result = Err(BusError::from_feetech(id, e));
                }
            }
        }

        info!("Motor bus on {} closed", self.port_name);
        result
    }

    fn set_mode(&mut self, id: u8, mode: ControlMode) -> Result<(), BusError> {
        self.bus()?
            .set_operating_mode(id, mode.into())
            .map_err(|e| BusError::from_feetech(id, e))
    }

    fn enable_torque(&mut self, id: u8) -> Result<(), BusError> {
        self.bus()?
            .enable_torque(id)
            .map_err(|e| BusError::from_feetech(id, e))
    }

    fn disable_torque(&mut self, id: u8) -> Result<(), BusError> {
        self.bus()?
            .disable_torque(id)
            .map_err(|e| BusError::from_feetech(id, e))
    }

    fn write_velocity(&mut self, id: u8, raw: i32) -> Result<(), BusError> {
        self.bus()?
            .set_velocity(id, raw)
            .map_err(|e| BusError::from_feetech(id, e))
    }

    fn read_current(&mut self, id: u8) -> Result<f64, BusError> {
        self.bus()?
            .get_current(id)
            .map_err(|e| BusError::from_feetech(id, e))
    }

    fn write_velocities(&mut self, data: &[(u8, i32)]) -> Result<(), BusError> {
        let first = data.first().map(|&(id, _)| id).unwrap_or(0xFE);
        self.bus()?
            .sync_set_velocity(data)
            .map_err(|e| BusError::from_feetech(first, e))
    }
}

impl Drop for FeetechActuatorBus {
    fn drop(&mut self) {
        // Try to stop motors if the bus is dropped while still connected
        if let Some(bus) = self.bus.as_mut() {
            let zeros: Vec<(u8, i32)> = self.motor_ids.iter().map(|&id| (id, 0)).collect();
            if let Err(e) = bus.sync_set_velocity(&zeros) {
                warn!("Failed to stop motors on drop: {}", e);
            }
        }
    }
}
