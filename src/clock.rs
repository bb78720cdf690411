//! Clock source configuration and half-period math.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{FrequencyUnit, LogicState, SimTime};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Invalid clock configuration.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ClockError {
    #[error("clock frequency must be positive, got {0}")]
    NonPositiveFrequency(f64),

    #[error("duty cycle must be within (0, 1), got {0}")]
    DutyCycleOutOfRange(f64),
}

/// Settings for a clock component: frequency, unit and duty cycle.
///
/// The duty cycle is the fraction of each period the output spends high,
/// so the delay until the next toggle depends on the current phase.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClockSettings {
    pub frequency: f64,
    pub unit: FrequencyUnit,
    pub duty_cycle: f64,
    pub enabled: bool,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            unit: FrequencyUnit::Hz,
            duty_cycle: 0.5,
            enabled: false,
        }
    }
}

impl ClockSettings {
    pub fn new(frequency: f64, unit: FrequencyUnit, duty_cycle: f64) -> Result<Self, ClockError> {
        let settings = Self {
            frequency,
            unit,
            duty_cycle,
            enabled: true,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ClockError> {
        if !(self.frequency > 0.0) {
            return Err(ClockError::NonPositiveFrequency(self.frequency));
        }
        if !(self.duty_cycle > 0.0 && self.duty_cycle < 1.0) {
            return Err(ClockError::DutyCycleOutOfRange(self.duty_cycle));
        }
        Ok(())
    }

    /// Frequency in plain hertz.
    pub fn frequency_hz(&self) -> f64 {
        let multiplier = match self.unit {
            FrequencyUnit::Hz => 1.0,
            FrequencyUnit::KHz => 1_000.0,
            FrequencyUnit::MHz => 1_000_000.0,
        };
        self.frequency * multiplier
    }

    /// Full clock period in virtual nanoseconds.
    pub fn period(&self) -> SimTime {
        (NANOS_PER_SEC / self.frequency_hz()).round().max(1.0) as SimTime
    }

    /// Delay until the next toggle, given the output's current level.
    ///
    /// A high output stays high for `period * duty_cycle`; any other level
    /// (low, or not yet driven) waits out the low portion.
    pub fn next_toggle_delay(&self, current: LogicState) -> SimTime {
        let period = self.period() as f64;
        let fraction = if current == LogicState::High {
            self.duty_cycle
        } else {
            1.0 - self.duty_cycle
        };
        ((period * fraction).round() as SimTime).max(1)
    }
}
