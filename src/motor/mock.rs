// In-memory actuator bus for tests and dry runs

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use super::bus::{ActuatorBus, BusError, ControlMode};

/// A call received by the mock bus, in order
#[derive(Debug, Clone, PartialEq)]
pub enum BusCall {
    Connect,
    Disconnect { keep_torque: bool },
    SetMode { id: u8, mode: ControlMode },
    EnableTorque(u8),
    DisableTorque(u8),
    WriteVelocity { id: u8, raw: i32 },
    ReadCurrent(u8),
}

#[derive(Default)]
struct MockBusInner {
    connected: bool,
    calls: Vec<BusCall>,
    currents: HashMap<u8, VecDeque<f64>>,
    default_current: f64,
    velocities: HashMap<u8, i32>,
    torque: HashMap<u8, bool>,
    modes: HashMap<u8, ControlMode>,
    connect_error: Option<String>,
    failing_mode_id: Option<u8>,
    failing_writes: u32,
    failing_reads: u32,
    fail_everything: bool,
    read_delay: Duration,
}

/// Mock bus; clones share state so a test can inspect what the loop did
#[derive(Clone, Default)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusInner>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockBusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue current readings for a motor, consumed one per read
    pub fn push_currents(&self, id: u8, milliamps: &[f64]) {
        self.lock()
            .currents
            .entry(id)
            .or_default()
            .extend(milliamps.iter().copied());
    }

    /// Reading returned once a motor's queue is empty
    pub fn set_default_current(&self, milliamps: f64) {
        self.lock().default_current = milliamps;
    }

    pub fn fail_connect(&self, reason: &str) {
        self.lock().connect_error = Some(reason.to_string());
    }

    /// Make `set_mode` fail for one motor
    pub fn fail_set_mode(&self, id: u8) {
        self.lock().failing_mode_id = Some(id);
    }

    /// Fail the next `count` velocity writes
    pub fn fail_next_writes(&self, count: u32) {
        self.lock().failing_writes = count;
    }

    /// Fail the next `count` current reads
    pub fn fail_next_reads(&self, count: u32) {
        self.lock().failing_reads = count;
    }

    /// Fail every call except `connect`
    pub fn fail_everything(&self, enabled: bool) {
        self.lock().fail_everything = enabled;
    }

    /// Block each current read for `delay`
    pub fn set_read_delay(&self, delay: Duration) {
        self.lock().read_delay = delay;
    }

    pub fn calls(&self) -> Vec<BusCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Last goal velocity written to a motor
    pub fn velocity(&self, id: u8) -> Option<i32> {
        self.lock().velocities.get(&id).copied()
    }

    pub fn torque_enabled(&self, id: u8) -> bool {
        self.lock().torque.get(&id).copied().unwrap_or(false)
    }

    pub fn mode(&self, id: u8) -> Option<ControlMode> {
        self.lock().modes.get(&id).copied()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

impl MockBusInner {
    fn check(&self, id: u8) -> Result<(), BusError> {
        if !self.connected {
            return Err(BusError::NotConnected);
        }
        if self.fail_everything {
            return Err(BusError::Transient {
                id,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl ActuatorBus for MockBus {
    fn connect(&mut self) -> Result<(), BusError> {
        let mut inner = self.lock();
        inner.calls.push(BusCall::Connect);
        if let Some(reason) = inner.connect_error.clone() {
            return Err(BusError::Connection(reason));
        }
        inner.connected = true;
        Ok(())
    }

    fn disconnect(&mut self, keep_torque: bool) -> Result<(), BusError> {
        let mut inner = self.lock();
        inner.calls.push(BusCall::Disconnect { keep_torque });
        let failed = inner.fail_everything;
        inner.connected = false;
        if !keep_torque {
            inner.torque.values_mut().for_each(|enabled| *enabled = false);
        }
        if failed {
            return Err(BusError::Connection("injected failure".to_string()));
        }
        Ok(())
    }

    fn set_mode(&mut self, id: u8, mode: ControlMode) -> Result<(), BusError> {
        let mut inner = self.lock();
        inner.calls.push(BusCall::SetMode { id, mode });
        inner.check(id)?;
        if inner.failing_mode_id == Some(id) {
            return Err(BusError::Transient {
                id,
                reason: "mode write rejected".to_string(),
            });
        }
        inner.modes.insert(id, mode);
        Ok(())
    }

    fn enable_torque(&mut self, id: u8) -> Result<(), BusError> {
        let mut inner = self.lock();
        inner.calls.push(BusCall::EnableTorque(id));
        inner.check(id)?;
        inner.torque.insert(id, true);
        Ok(())
    }

    fn disable_torque(&mut self, id: u8) -> Result<(), BusError> {
        let mut inner = self.lock();
        inner.calls.push(BusCall::DisableTorque(id));
        inner.check(id)?;
        inner.torque.insert(id, false);
        Ok(())
    }

    fn write_velocity(&mut self, id: u8, raw: i32) -> Result<(), BusError> {
        let mut inner = self.lock();
        inner.calls.push(BusCall::WriteVelocity { id, raw });
        inner.check(id)?;
        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            return Err(BusError::Transient {
                id,
                reason: "write not acknowledged".to_string(),
            });
        }
        debug!("Mock motor {} goal velocity {}", id, raw);
        inner.velocities.insert(id, raw);
        Ok(())
    }

    fn read_current(&mut self, id: u8) -> Result<f64, BusError> {
        let delay = {
            let mut inner = self.lock();
            inner.calls.push(BusCall::ReadCurrent(id));
            inner.check(id)?;
            if inner.failing_reads > 0 {
                inner.failing_reads -= 1;
                return Err(BusError::Transient {
                    id,
                    reason: "no status reply".to_string(),
                });
            }
            inner.read_delay
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut inner = self.lock();
        let default = inner.default_current;
        Ok(inner
            .currents
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_connect() {
        let mut bus = MockBus::new();
        assert_eq!(bus.write_velocity(8, 10), Err(BusError::NotConnected));
        bus.connect().unwrap();
        bus.write_velocity(8, 10).unwrap();
        assert_eq!(bus.velocity(8), Some(10));
    }

    #[test]
    fn test_current_queue_then_default() {
        let mut bus = MockBus::new();
        bus.connect().unwrap();
        bus.push_currents(11, &[600.0, 400.0]);
        bus.set_default_current(50.0);

        assert_eq!(bus.read_current(11), Ok(600.0));
        assert_eq!(bus.read_current(11), Ok(400.0));
        assert_eq!(bus.read_current(11), Ok(50.0));
    }

    #[test]
    fn test_clones_share_state() {
        let probe = MockBus::new();
        let mut bus = probe.clone();
        bus.connect().unwrap();
        bus.enable_torque(9).unwrap();
        assert!(probe.torque_enabled(9));
        assert_eq!(probe.calls(), vec![BusCall::Connect, BusCall::EnableTorque(9)]);
    }
}
