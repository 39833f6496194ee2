// Fixed-rate teleop control loop with overcurrent cutoff
//
// Each tick: read motor current -> safety check -> read operator input ->
// kinematics -> encode -> write goal velocities.
// A tripped safety monitor (or a hung bus) drives the fault shutdown path:
// zero velocity, torque off, disconnect. That path runs at most once per session.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::{Platform, TeleopConfig};
use crate::error::{Result, TeleopError};
use crate::input::{InputState, SharedInput};
use crate::messages::{BodyVelocity, ControlStatus, CurrentSample, Fault, Joint, LoopState, WheelCommand};
use crate::motor::codec;
use crate::motor::{ActuatorBus, BusError, ControlMode, OmniKinematics};
use crate::safety::{SafetyMonitor, SafetyState};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// New command written to the actuators
    Commanded,
    /// Bus I/O failed; the previous command stays in effect
    Skipped,
    /// A fault ended the session during this tick
    Faulted,
    /// Loop is not running
    Inactive,
}

/// Failure of one timed bus call
enum CallError {
    Bus(BusError),
    Hung { motor: u8, elapsed: Duration },
}

pub struct ControlLoop<B: ActuatorBus> {
    config: TeleopConfig,
    platform: Platform,
    bus: B,
    input: SharedInput,
    kinematics: OmniKinematics,
    safety: SafetyMonitor,
    state: LoopState,
    fault: Option<Fault>,
    last_command: WheelCommand,
    ticks: u64,
    status_tx: watch::Sender<ControlStatus>,
}

impl<B: ActuatorBus> ControlLoop<B> {
    /// Validate the configuration and build an idle loop; no bus I/O happens here
    pub fn new(config: TeleopConfig, platform: Platform, bus: B) -> Result<Self> {
        config.validate()?;

        let kinematics = OmniKinematics::new(config.geometry, config.max_raw);
        let safety = SafetyMonitor::new(config.trigger_count);
        let (status_tx, _) = watch::channel(ControlStatus::default());

        Ok(Self {
            config,
            platform,
            bus,
            input: SharedInput::new(),
            kinematics,
            safety,
            state: LoopState::Idle,
            fault: None,
            last_command: WheelCommand::new(),
            ticks: 0,
            status_tx,
        })
    }

    /// Writer handle for the input source
    pub fn input_handle(&self) -> SharedInput {
        self.input.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn status(&self) -> ControlStatus {
        ControlStatus {
            state: self.state,
            safety: self.safety.state(),
            fault: self.fault,
            last_command: self.last_command.clone(),
            ticks: self.ticks,
        }
    }

    /// Receiver that sees every status change
    pub fn subscribe(&self) -> watch::Receiver<ControlStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            info!("Control loop {:?} -> {:?}", self.state, state);
            self.state = state;
        }
        self.publish();
    }

    fn joints(&self) -> Vec<(Joint, u8)> {
        let ids = &self.config.base_ids;
        match self.platform {
            Platform::Base => vec![
                (Joint::Left, ids.left),
                (Joint::Back, ids.back),
                (Joint::Right, ids.right),
            ],
            Platform::Lift => vec![(Joint::Lift, self.config.lift_id)],
        }
    }

    fn motor_ids(&self) -> Vec<u8> {
        self.config.motor_ids(self.platform)
    }

    /// Connect and put every actuator into velocity mode with torque on
    ///
    /// Fails with [`TeleopError::Connection`] if the bus is unreachable or an
    /// actuator rejects its setup; in that case nothing is left energized.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LoopState::Idle {
            return Err(TeleopError::InvalidState { state: self.state });
        }

        info!(
            "Starting {:?} teleop on motors {:?}",
            self.platform,
            self.motor_ids()
        );
        self.bus.connect().map_err(TeleopError::Connection)?;

        if let Err(e) = self.configure_actuators() {
            error!("Actuator setup failed: {}", e);
            if let Err(e) = self.bus.disconnect(false) {
                warn!("Disconnect after failed setup also failed: {}", e);
            }
            self.set_state(LoopState::Stopped);
            return Err(TeleopError::Connection(e));
        }

        self.last_command = WheelCommand::zero(&self.joint_names());
        self.set_state(LoopState::Running);
        Ok(())
    }

    fn joint_names(&self) -> Vec<Joint> {
        self.joints().into_iter().map(|(joint, _)| joint).collect()
    }

    fn configure_actuators(&mut self) -> std::result::Result<(), BusError> {
        let ids = self.motor_ids();

        for &id in &ids {
            // Operating mode can only change with torque off
            if let Err(e) = self.bus.disable_torque(id) {
                debug!("Motor {} torque disable before mode change failed: {}", id, e);
            }
            self.bus.set_mode(id, ControlMode::Velocity)?;
            self.bus.write_velocity(id, 0)?;
        }

        for &id in &ids {
            self.bus.enable_torque(id)?;
        }

        info!("Motors {:?} set to velocity mode", ids);
        Ok(())
    }

    /// Run one bus call and flag it as hung if it exceeded the bus timeout
    fn timed<T>(
        &mut self,
        motor: u8,
        call: impl FnOnce(&mut B) -> std::result::Result<T, BusError>,
    ) -> std::result::Result<T, CallError> {
        let started = Instant::now();
        let result = call(&mut self.bus);
        let elapsed = started.elapsed();

        if elapsed > self.config.bus_timeout() {
            return Err(CallError::Hung { motor, elapsed });
        }
        result.map_err(CallError::Bus)
    }

    /// Highest current reading across the platform's motors
    fn sample_current(&mut self) -> std::result::Result<Option<CurrentSample>, CallError> {
        let mut peak: Option<CurrentSample> = None;
        for id in self.motor_ids() {
            let milliamps = self.timed(id, |bus| bus.read_current(id))?;
            debug!("Motor {} current {:.1} mA", id, milliamps);
            if peak.is_none_or(|p| milliamps > p.milliamps) {
                peak = Some(CurrentSample {
                    motor: id,
                    milliamps,
                });
            }
        }
        Ok(peak)
    }

    /// Body velocity requested by the current input
    pub fn body_velocity(&self, input: &InputState) -> BodyVelocity {
        BodyVelocity {
            x: f64::from(input.forward()) * self.config.lin_speed,
            y: f64::from(input.strafe()) * self.config.lin_speed,
            theta: f64::from(input.rotate()) * self.config.ang_speed,
        }
    }

    /// Raw command for the platform given an input snapshot
    pub fn compute_command(&self, input: &InputState) -> WheelCommand {
        match self.platform {
            Platform::Base => self.kinematics.body_to_command(self.body_velocity(input)),
            Platform::Lift => {
                let mut direction = f64::from(input.lift());
                if self.config.invert_lift {
                    direction = -direction;
                }
                [(Joint::Lift, codec::encode(direction * self.config.lift_speed))]
                    .into_iter()
                    .collect()
            }
        }
    }

    fn write_command(&mut self, command: &WheelCommand) -> std::result::Result<(), CallError> {
        let data: Vec<(u8, i32)> = self
            .joints()
            .into_iter()
            .map(|(joint, id)| (id, command.get(joint).unwrap_or(0)))
            .collect();
        let first = data.first().map(|&(id, _)| id).unwrap_or_default();

        self.timed(first, |bus| bus.write_velocities(&data))
    }

    /// One control period
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != LoopState::Running {
            return TickOutcome::Inactive;
        }
        self.ticks += 1;

        // 1. Safety check on fresh current readings
        match self.sample_current() {
            Ok(Some(sample)) => {
                let threshold = self.config.overcurrent_threshold_ma;
                if self.safety.observe(sample, threshold) == SafetyState::Tripped {
                    self.trip(Fault::Overcurrent {
                        motor: sample.motor,
                        milliamps: sample.milliamps,
                    });
                    return TickOutcome::Faulted;
                }
            }
            Ok(None) => {}
            Err(CallError::Hung { motor, elapsed }) => {
                self.trip(Fault::BusUnresponsive { motor, elapsed });
                return TickOutcome::Faulted;
            }
            Err(CallError::Bus(e)) => return self.skip("Current read", e),
        }

        // 2-3. Input snapshot -> command
        let input = self.input.snapshot();
        let command = self.compute_command(&input);

        // 4. Write
        match self.write_command(&command) {
            Ok(()) => {
                debug!("Command: {:?}", command);
                self.last_command = command;
                self.publish();
                TickOutcome::Commanded
            }
            Err(CallError::Hung { motor, elapsed }) => {
                self.trip(Fault::BusUnresponsive { motor, elapsed });
                TickOutcome::Faulted
            }
            Err(CallError::Bus(e)) => self.skip("Velocity write", e),
        }
    }

    /// Leave the previous command in effect and try again next tick
    fn skip(&mut self, what: &str, e: BusError) -> TickOutcome {
        if e.is_transient() {
            warn!("{} failed, skipping tick: {}", what, e);
        } else {
            error!("{} failed, bus lost; retrying next tick: {}", what, e);
        }
        self.publish();
        TickOutcome::Skipped
    }

    fn trip(&mut self, fault: Fault) {
        error!("Fault {:?}, shutting down actuators", fault);
        self.fault = Some(fault);
        self.set_state(LoopState::Tripped);
        self.shutdown_sequence();
        self.set_state(LoopState::Stopped);
    }

    /// Operator-requested stop: zero velocity, torque off, disconnect
    ///
    /// Safe to call in any state; a stopped loop stays stopped.
    pub fn stop(&mut self) {
        match self.state {
            LoopState::Running => {
                self.set_state(LoopState::Stopping);
                self.shutdown_sequence();
                self.set_state(LoopState::Stopped);
            }
            LoopState::Idle => self.set_state(LoopState::Stopped),
            LoopState::Stopping | LoopState::Tripped | LoopState::Stopped => {}
        }
    }

    /// Every step is attempted regardless of earlier failures
    fn shutdown_sequence(&mut self) {
        let joints = self.joints();

        let mut zeroed = true;
        for &(_, id) in &joints {
            if let Err(e) = self.bus.write_velocity(id, 0) {
                warn!("Zero velocity write to motor {} failed: {}", id, e);
                zeroed = false;
            }
        }
        if zeroed {
            self.last_command = WheelCommand::zero(&self.joint_names());
        }

        for &(_, id) in &joints {
            if let Err(e) = self.bus.disable_torque(id) {
                warn!("Torque disable on motor {} failed: {}", id, e);
            }
        }

        if let Err(e) = self.bus.disconnect(false) {
            warn!("Bus disconnect failed: {}", e);
        }
        info!("Actuators shut down");
    }

    /// Serial I/O blocks; on a multi-threaded runtime let other tasks move off this worker
    fn blocking<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        match Handle::current().runtime_flavor() {
            RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| f(self)),
            _ => f(self),
        }
    }

    /// Drive the loop at the configured period until `shutdown` resolves or a fault occurs
    ///
    /// Starts the loop first if it is still idle. Returns the fault, if any,
    /// that ended the session.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if self.state == LoopState::Idle {
            self.start()?;
        }
        if self.state != LoopState::Running {
            return Err(TeleopError::InvalidState { state: self.state });
        }

        let period = self.config.tick_period(self.platform);
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            "Control loop running: {}ms period, overcurrent cutoff {} mA after {} samples",
            period.as_millis(),
            self.config.overcurrent_threshold_ma,
            self.config.trigger_count
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Stop requested");
                    self.blocking(Self::stop);
                    break;
                }
                _ = tick.tick() => {
                    if self.blocking(Self::tick) == TickOutcome::Faulted {
                        break;
                    }
                }
            }
        }

        match self.fault {
            Some(Fault::Overcurrent { motor, milliamps }) => {
                Err(TeleopError::Overcurrent { motor, milliamps })
            }
            Some(Fault::BusUnresponsive { motor, elapsed }) => {
                Err(TeleopError::BusUnresponsive { motor, elapsed })
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Binding;
    use crate::motor::{BusCall, MockBus};

    fn lift_loop(bus: &MockBus) -> ControlLoop<MockBus> {
        ControlLoop::new(TeleopConfig::default(), Platform::Lift, bus.clone()).unwrap()
    }

    fn base_loop(bus: &MockBus) -> ControlLoop<MockBus> {
        ControlLoop::new(TeleopConfig::default(), Platform::Base, bus.clone()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected_before_io() {
        let bus = MockBus::new();
        let config = TeleopConfig {
            overcurrent_threshold_ma: 0.0,
            ..Default::default()
        };
        let result = ControlLoop::new(config, Platform::Lift, bus.clone());
        assert!(matches!(result, Err(TeleopError::Config(_))));
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_start_configures_velocity_mode() {
        let bus = MockBus::new();
        let mut control = lift_loop(&bus);
        control.start().unwrap();

        assert_eq!(control.state(), LoopState::Running);
        assert_eq!(
            bus.calls(),
            vec![
                BusCall::Connect,
                BusCall::DisableTorque(11),
                BusCall::SetMode {
                    id: 11,
                    mode: ControlMode::Velocity
                },
                BusCall::WriteVelocity { id: 11, raw: 0 },
                BusCall::EnableTorque(11),
            ]
        );
        assert!(bus.torque_enabled(11));
        assert_eq!(bus.mode(11), Some(ControlMode::Velocity));
        assert!(matches!(
            control.start(),
            Err(TeleopError::InvalidState {
                state: LoopState::Running
            })
        ));
    }

    #[test]
    fn test_connect_failure_aborts_start() {
        let bus = MockBus::new();
        bus.fail_connect("no such port");
        let mut control = base_loop(&bus);

        assert!(matches!(control.start(), Err(TeleopError::Connection(_))));
        assert_eq!(control.state(), LoopState::Idle);
        assert_eq!(bus.calls(), vec![BusCall::Connect]);
        assert_eq!(control.tick(), TickOutcome::Inactive);
    }

    #[test]
    fn test_setup_failure_leaves_nothing_energized() {
        let bus = MockBus::new();
        bus.fail_set_mode(10);
        let mut control = base_loop(&bus);

        assert!(matches!(control.start(), Err(TeleopError::Connection(_))));
        assert_eq!(control.state(), LoopState::Stopped);
        let calls = bus.calls();
        assert!(!calls.iter().any(|c| matches!(c, BusCall::EnableTorque(_))));
        assert_eq!(calls.last(), Some(&BusCall::Disconnect { keep_torque: false }));
    }

    #[test]
    fn test_forward_drives_base_wheels() {
        let bus = MockBus::new();
        let mut control = base_loop(&bus);
        control.start().unwrap();
        control.input_handle().apply("forward", true);

        assert_eq!(control.tick(), TickOutcome::Commanded);

        let expected = OmniKinematics::default().body_to_command(BodyVelocity::new(0.2, 0.0, 0.0));
        assert_eq!(control.status().last_command, expected);
        assert_eq!(bus.velocity(8), Some(2258));
        assert_eq!(bus.velocity(9), Some(0));
        assert_eq!(bus.velocity(10), Some(-2258));
    }

    #[test]
    fn test_body_velocity_from_input() {
        let bus = MockBus::new();
        let control = base_loop(&bus);
        let mut input = InputState::new();
        input.on_press(Binding::Backward);
        input.on_press(Binding::Right);
        input.on_press(Binding::RotateLeft);
        input.on_press(Binding::RotateRight);

        assert_eq!(
            control.body_velocity(&input),
            BodyVelocity::new(-0.2, -0.2, 0.0)
        );
    }

    #[test]
    fn test_lift_direction_and_cancel() {
        let bus = MockBus::new();
        let mut control = lift_loop(&bus);
        control.start().unwrap();
        let input = control.input_handle();

        input.press(Binding::Up);
        control.tick();
        // 180 deg/s = 2048 steps/s, "up" runs the axis backwards
        assert_eq!(bus.velocity(11), Some(-2048));

        input.press(Binding::Down);
        control.tick();
        assert_eq!(bus.velocity(11), Some(0));

        input.release(Binding::Up);
        control.tick();
        assert_eq!(bus.velocity(11), Some(2048));
    }

    #[test]
    fn test_overcurrent_trips_and_shuts_down() {
        let bus = MockBus::new();
        bus.push_currents(11, &[600.0, 600.0]);
        let mut control = lift_loop(&bus);
        control.start().unwrap();
        control.input_handle().press(Binding::Up);

        assert_eq!(control.tick(), TickOutcome::Commanded);
        bus.clear_calls();
        assert_eq!(control.tick(), TickOutcome::Faulted);

        assert_eq!(
            bus.calls(),
            vec![
                BusCall::ReadCurrent(11),
                BusCall::WriteVelocity { id: 11, raw: 0 },
                BusCall::DisableTorque(11),
                BusCall::Disconnect { keep_torque: false },
            ]
        );

        let status = control.status();
        assert_eq!(status.state, LoopState::Stopped);
        assert_eq!(status.safety, SafetyState::Tripped);
        assert_eq!(
            status.fault,
            Some(Fault::Overcurrent {
                motor: 11,
                milliamps: 600.0
            })
        );
        assert!(status.last_command.is_zero());

        // Latched: nothing more reaches the bus
        bus.clear_calls();
        assert_eq!(control.tick(), TickOutcome::Inactive);
        control.stop();
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_overcurrent_shutdown_survives_bus_failures() {
        let bus = MockBus::new();
        bus.push_currents(11, &[600.0, 600.0]);
        let mut control = lift_loop(&bus);
        control.start().unwrap();
        control.input_handle().press(Binding::Up);

        assert_eq!(control.tick(), TickOutcome::Commanded);
        bus.fail_next_writes(1);
        bus.clear_calls();
        assert_eq!(control.tick(), TickOutcome::Faulted);

        // The zero write fails, the remaining steps still run
        assert_eq!(
            bus.calls(),
            vec![
                BusCall::ReadCurrent(11),
                BusCall::WriteVelocity { id: 11, raw: 0 },
                BusCall::DisableTorque(11),
                BusCall::Disconnect { keep_torque: false },
            ]
        );
        let status = control.status();
        assert_eq!(status.state, LoopState::Stopped);
        assert_eq!(status.safety, SafetyState::Tripped);
        assert!(!bus.torque_enabled(11));
        assert!(!bus.is_connected());
    }

    #[test]
    fn test_current_dip_does_not_trip() {
        let bus = MockBus::new();
        bus.push_currents(11, &[600.0, 400.0, 600.0]);
        let mut control = lift_loop(&bus);
        control.start().unwrap();

        for _ in 0..3 {
            assert_eq!(control.tick(), TickOutcome::Commanded);
        }
        assert_eq!(control.status().safety, SafetyState::Normal);
        assert_eq!(control.state(), LoopState::Running);
    }

    #[test]
    fn test_base_trips_on_peak_wheel_current() {
        let bus = MockBus::new();
        bus.push_currents(9, &[700.0, 700.0]);
        let mut control = base_loop(&bus);
        control.start().unwrap();

        assert_eq!(control.tick(), TickOutcome::Commanded);
        assert_eq!(control.tick(), TickOutcome::Faulted);
        assert_eq!(
            control.status().fault,
            Some(Fault::Overcurrent {
                motor: 9,
                milliamps: 700.0
            })
        );
        for id in [8, 9, 10] {
            assert!(!bus.torque_enabled(id));
        }
    }

    #[test]
    fn test_write_failure_keeps_previous_command() {
        let bus = MockBus::new();
        let mut control = lift_loop(&bus);
        control.start().unwrap();
        let input = control.input_handle();

        input.press(Binding::Down);
        assert_eq!(control.tick(), TickOutcome::Commanded);
        let before = control.status().last_command;

        input.release(Binding::Down);
        bus.fail_next_writes(1);
        assert_eq!(control.tick(), TickOutcome::Skipped);
        assert_eq!(control.status().last_command, before);
        assert_eq!(control.state(), LoopState::Running);

        assert_eq!(control.tick(), TickOutcome::Commanded);
        assert_eq!(bus.velocity(11), Some(0));
    }

    #[test]
    fn test_read_failure_skips_tick() {
        let bus = MockBus::new();
        let mut control = lift_loop(&bus);
        control.start().unwrap();
        bus.fail_next_reads(1);
        bus.clear_calls();

        assert_eq!(control.tick(), TickOutcome::Skipped);
        assert_eq!(bus.calls(), vec![BusCall::ReadCurrent(11)]);
        assert_eq!(control.tick(), TickOutcome::Commanded);
    }

    #[test]
    fn test_lost_bus_skips_tick() {
        let bus = MockBus::new();
        let mut control = lift_loop(&bus);
        control.start().unwrap();
        bus.clone().disconnect(true).unwrap();
        bus.clear_calls();

        assert_eq!(control.tick(), TickOutcome::Skipped);
        assert_eq!(bus.calls(), vec![BusCall::ReadCurrent(11)]);
        assert_eq!(control.state(), LoopState::Running);
    }

    #[test]
    fn test_stop_is_best_effort() {
        let bus = MockBus::new();
        let mut control = base_loop(&bus);
        control.start().unwrap();
        bus.fail_everything(true);
        bus.clear_calls();

        control.stop();

        assert_eq!(
            bus.calls(),
            vec![
                BusCall::WriteVelocity { id: 8, raw: 0 },
                BusCall::WriteVelocity { id: 9, raw: 0 },
                BusCall::WriteVelocity { id: 10, raw: 0 },
                BusCall::DisableTorque(8),
                BusCall::DisableTorque(9),
                BusCall::DisableTorque(10),
                BusCall::Disconnect { keep_torque: false },
            ]
        );
        assert_eq!(control.state(), LoopState::Stopped);
        assert!(control.status().fault.is_none());

        bus.clear_calls();
        control.stop();
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_hung_bus_routes_to_shutdown() {
        let bus = MockBus::new();
        let config = TeleopConfig {
            bus_timeout_ms: 5,
            ..Default::default()
        };
        let mut control = ControlLoop::new(config, Platform::Lift, bus.clone()).unwrap();
        control.start().unwrap();
        bus.set_read_delay(Duration::from_millis(30));

        assert_eq!(control.tick(), TickOutcome::Faulted);
        let status = control.status();
        assert_eq!(status.state, LoopState::Stopped);
        assert_eq!(status.safety, SafetyState::Normal);
        assert!(matches!(
            status.fault,
            Some(Fault::BusUnresponsive { motor: 11, .. })
        ));
        assert!(!bus.is_connected());
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let bus = MockBus::new();
        let config = TeleopConfig {
            tick_period_ms: Some(5),
            ..Default::default()
        };
        let mut control = ControlLoop::new(config, Platform::Base, bus.clone()).unwrap();
        let status = control.subscribe();
        control.input_handle().press(Binding::RotateLeft);

        control
            .run(tokio::time::sleep(Duration::from_millis(60)))
            .await
            .unwrap();

        let last = status.borrow().clone();
        assert_eq!(last.state, LoopState::Stopped);
        assert!(last.ticks > 0);
        assert!(last.last_command.is_zero());
        assert_eq!(bus.calls().last(), Some(&BusCall::Disconnect { keep_torque: false }));
    }

    #[tokio::test]
    async fn test_run_cancelled_before_first_tick() {
        let bus = MockBus::new();
        let mut control = lift_loop(&bus);

        control.run(std::future::ready(())).await.unwrap();

        assert_eq!(control.status().ticks, 0);
        assert_eq!(control.state(), LoopState::Stopped);
        assert!(!bus.is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_reports_overcurrent() {
        let bus = MockBus::new();
        bus.set_default_current(900.0);
        let config = TeleopConfig {
            tick_period_ms: Some(1),
            ..Default::default()
        };
        let mut control = ControlLoop::new(config, Platform::Lift, bus.clone()).unwrap();

        let result = control.run(std::future::pending()).await;

        assert!(matches!(
            result,
            Err(TeleopError::Overcurrent { motor: 11, .. })
        ));
        assert_eq!(control.status().ticks, 2);
    }
}
