// Overcurrent protection
//
// A single high reading (inrush, sensor noise) must not cut the motors; only a
// run of consecutive readings above the threshold trips. Once tripped the
// monitor stays tripped for the rest of the session.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::messages::CurrentSample;

/// Default number of consecutive over-threshold samples before tripping
pub const DEFAULT_TRIGGER_COUNT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyState {
    Normal,
    Tripped,
}

#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    state: SafetyState,
    trigger_count: u32,
    consecutive: u32,
    tripped_by: Option<CurrentSample>,
}

impl SafetyMonitor {
    pub fn new(trigger_count: u32) -> Self {
        Self {
            state: SafetyState::Normal,
            // A zero trigger count would trip without any reading
            trigger_count: trigger_count.max(1),
            consecutive: 0,
            tripped_by: None,
        }
    }

    /// Feed one current reading and return the resulting state
    pub fn observe(&mut self, sample: CurrentSample, threshold_ma: f64) -> SafetyState {
        if self.state == SafetyState::Tripped {
            return SafetyState::Tripped;
        }

        if sample.milliamps > threshold_ma {
            self.consecutive += 1;
            warn!(
                "Motor {} over current: {:.1} mA > {:.1} mA ({}/{})",
                sample.motor, sample.milliamps, threshold_ma, self.consecutive, self.trigger_count
            );
        } else {
            self.consecutive = 0;
        }

        if self.consecutive >= self.trigger_count {
            error!(
                "Overcurrent cutoff on motor {}: {:.1} mA",
                sample.motor, sample.milliamps
            );
            self.state = SafetyState::Tripped;
            self.tripped_by = Some(sample);
        }

        self.state
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    pub fn is_tripped(&self) -> bool {
        self.state == SafetyState::Tripped
    }

    /// The sample that completed the trip, if any
    pub fn tripped_by(&self) -> Option<CurrentSample> {
        self.tripped_by
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(milliamps: f64) -> CurrentSample {
        CurrentSample {
            motor: 11,
            milliamps,
        }
    }

    #[test]
    fn test_sustained_overcurrent_trips() {
        let mut monitor = SafetyMonitor::new(2);
        assert_eq!(monitor.observe(sample(600.0), 500.0), SafetyState::Normal);
        assert_eq!(monitor.observe(sample(600.0), 500.0), SafetyState::Tripped);
        assert_eq!(monitor.tripped_by(), Some(sample(600.0)));
    }

    #[test]
    fn test_dip_resets_counter() {
        let mut monitor = SafetyMonitor::new(2);
        for ma in [600.0, 400.0, 600.0] {
            assert_eq!(monitor.observe(sample(ma), 500.0), SafetyState::Normal);
        }
        assert_eq!(monitor.consecutive(), 1);
        assert!(monitor.tripped_by().is_none());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut monitor = SafetyMonitor::new(1);
        assert_eq!(monitor.observe(sample(500.0), 500.0), SafetyState::Normal);
        assert_eq!(monitor.observe(sample(500.1), 500.0), SafetyState::Tripped);
    }

    #[test]
    fn test_trip_is_latched() {
        let mut monitor = SafetyMonitor::new(2);
        monitor.observe(sample(900.0), 500.0);
        monitor.observe(sample(900.0), 500.0);
        for ma in [0.0, 100.0, 499.0, 10_000.0] {
            assert_eq!(monitor.observe(sample(ma), 500.0), SafetyState::Tripped);
        }
        assert!(monitor.is_tripped());
        assert_eq!(monitor.tripped_by(), Some(sample(900.0)));
    }

    #[test]
    fn test_zero_trigger_count_behaves_as_one() {
        let mut monitor = SafetyMonitor::new(0);
        assert_eq!(monitor.observe(sample(0.0), 500.0), SafetyState::Normal);
        assert_eq!(monitor.observe(sample(501.0), 500.0), SafetyState::Tripped);
    }
}
