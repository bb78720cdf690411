//! Core type definitions for the simulation engine.
//!
//! This module defines the vocabulary shared by every other module:
//! simulation time, component identity, logic levels and pin state.

use serde::{Deserialize, Serialize};

/// Simulation time in virtual nanoseconds.
///
/// All events, propagation delays and pin change timestamps use the same
/// `SimTime` representation, giving the whole engine a unified timeline.
pub type SimTime = u64;

/// Opaque 128-bit identifier for a live component instance.
pub type ComponentId = uuid::Uuid;

/// A single endpoint of a connection: a component and a pin index on it.
pub type PinAddr = (ComponentId, usize);

/// Per-pin connection lists. For input pins the inner list holds at most
/// one driver; for output pins it holds the full fan-out.
pub type Connections = Vec<Vec<PinAddr>>;

/// Snapshot of every edge touching one component, per pin.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionBundle {
    /// For each input pin, its driver (singleton in the steady state).
    pub inputs: Connections,
    /// For each output pin, all input pins it drives.
    pub outputs: Connections,
}

/// Which side of a component a pin lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinType {
    Input,
    Output,
}

/// Frequency unit accepted by the clock driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyUnit {
    Hz,
    KHz,
    MHz,
}

/// Whether the background simulation thread is consuming due events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationState {
    Running,
    Paused,
}

/// Logic level carried by a pin.
///
/// `Unknown` and `HighZ` model unconnected or undriven pins; they are not
/// interchangeable — `HighZ` is "nobody drives this wire" while `Unknown`
/// is "somebody might, but the level cannot be determined".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicState {
    Low,
    High,
    #[default]
    Unknown,
    HighZ,
}

impl LogicState {
    /// True only for a definite `High` level.
    pub fn is_high(self) -> bool {
        self == LogicState::High
    }

    /// Logical negation over four-valued logic: `Unknown`/`HighZ` stay
    /// `Unknown`.
    pub fn invert(self) -> LogicState {
        match self {
            LogicState::Low => LogicState::High,
            LogicState::High => LogicState::Low,
            LogicState::Unknown | LogicState::HighZ => LogicState::Unknown,
        }
    }
}

impl From<bool> for LogicState {
    fn from(value: bool) -> Self {
        if value {
            LogicState::High
        } else {
            LogicState::Low
        }
    }
}

/// State of one pin: its logic level and when it last changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    pub state: LogicState,
    pub last_change: SimTime,
}

impl PinState {
    pub fn new(state: LogicState, last_change: SimTime) -> Self {
        Self { state, last_change }
    }
}

/// Full pin + connectivity snapshot of one component, as consumed by
/// renderers and by the undo layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    pub input_pins: Vec<PinState>,
    pub output_pins: Vec<PinState>,
    pub input_connected: Vec<bool>,
    pub output_connected: Vec<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logic_state_invert() {
        assert_eq!(LogicState::Low.invert(), LogicState::High);
        assert_eq!(LogicState::High.invert(), LogicState::Low);
        assert_eq!(LogicState::Unknown.invert(), LogicState::Unknown);
        assert_eq!(LogicState::HighZ.invert(), LogicState::Unknown);
    }

    #[test]
    fn logic_state_from_bool() {
        assert_eq!(LogicState::from(true), LogicState::High);
        assert_eq!(LogicState::from(false), LogicState::Low);
        assert!(LogicState::High.is_high());
        assert!(!LogicState::Unknown.is_high());
    }

    #[test]
    fn pin_state_defaults_unknown() {
        let pin = PinState::default();
        assert_eq!(pin.state, LogicState::Unknown);
        assert_eq!(pin.last_change, 0);
    }
}
