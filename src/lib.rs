//! # krets
//!
//! A discrete-event digital logic simulation engine.
//!
//! A circuit is a netlist of components — gates, flip-flops,
//! expression-backed combinational parts, inputs, outputs and clocks —
//! wired output pin to input pin. Changes propagate through scheduled
//! events with per-component delays, so feedback loops (latches) settle
//! naturally: an evaluation that does not change an output schedules
//! nothing.
//!
//! [`SimulationEngine`] is the public entry point: it owns the netlist
//! and the event queue behind a single lock, runs a background thread
//! that paces virtual time against the wall clock, and records every
//! structural mutation in an undo/redo history.
//!
//! ```no_run
//! use krets::{ComponentKind, LogicState, PinType, SimulationEngine};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), krets::NetlistError> {
//! let engine = SimulationEngine::new();
//! let a = engine.add_component(ComponentKind::Input, None, None)?;
//! let b = engine.add_component(ComponentKind::Input, None, None)?;
//! let gate = engine.add_component(ComponentKind::AndGate, None, None)?;
//! engine.connect((a, 0), PinType::Output, (gate, 0), PinType::Input)?;
//! engine.connect((b, 0), PinType::Output, (gate, 1), PinType::Input)?;
//!
//! engine.set_input(a, LogicState::High)?;
//! engine.set_input(b, LogicState::High)?;
//! engine.wait_until_settled(Duration::from_secs(1));
//! assert_eq!(engine.read_output(gate, 0)?, LogicState::High);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod expr;
pub mod netlist;
pub mod protocol;
pub mod scheduler;
pub mod types;

pub use catalog::{AuxState, Behavior, Catalog, ComponentDefinition, ComponentKind, FlipFlopKind};
pub use clock::{ClockError, ClockSettings};
pub use command::{Command, CommandManager, CommandResult};
pub use config::{CircuitConfig, ConfigError};
pub use engine::{EngineCore, EngineStats, SimulationEngine};
pub use expr::ExprError;
pub use netlist::{ComponentInstance, ComponentSnapshot, Netlist, NetlistError};
pub use protocol::{dispatch, ProtocolError};
pub use scheduler::{EventQueue, SimEvent};
pub use types::{
    ComponentId, ComponentState, ConnectionBundle, FrequencyUnit, LogicState, PinAddr, PinState,
    PinType, SimTime, SimulationState,
};

/// Initializes `tracing` output for binaries and examples.
///
/// The level acts as a default; `RUST_LOG` still overrides it.
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
