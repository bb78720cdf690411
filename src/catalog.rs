//! Component catalog: the closed set of component kinds, their pin
//! layouts, propagation delays and evaluation behavior.
//!
//! Every live component in a netlist refers back to one
//! [`ComponentDefinition`] here. Definitions are data plus a behavior
//! tag; the engine interprets the tag when events fire.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{LogicState, SimTime};

/// Every component kind the engine knows how to simulate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    Input,
    Output,
    Clock,
    AndGate,
    OrGate,
    NotGate,
    NandGate,
    NorGate,
    XorGate,
    XnorGate,
    FullAdder,
    HalfAdder,
    FullSubtractor,
    HalfSubtractor,
    Mux2To1,
    Mux4To1,
    Decoder2To4,
    Encoder4To2,
    Comparator1Bit,
    FlipFlopJk,
    FlipFlopD,
    FlipFlopSr,
    FlipFlopT,
}

/// Flip-flop flavor; decides how the data inputs combine on a clock edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipFlopKind {
    Jk,
    D,
    Sr,
    T,
}

/// Gate evaluation function: all inputs in, one output level out.
pub type GateFn = fn(&[LogicState]) -> LogicState;

/// How a component computes its outputs.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Output pins are driven externally (user input, clock toggles).
    Source,
    /// Pure sink: input changes are recorded, nothing is emitted.
    Sink,
    /// Single-output gate evaluated by a native function.
    Gate(GateFn),
    /// One boolean expression per output pin, evaluated over the inputs
    /// coerced to booleans. `negate` inverts every output.
    Expressions {
        exprs: Vec<String>,
        negate: bool,
    },
    /// Edge-triggered flip-flop; private memory lives in [`AuxState`].
    FlipFlop(FlipFlopKind),
}

/// Per-instance private memory for behaviors that need it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuxState {
    #[default]
    None,
    FlipFlop {
        prev_clock: LogicState,
    },
}

/// Static description of a component kind.
#[derive(Clone, Debug)]
pub struct ComponentDefinition {
    pub kind: ComponentKind,
    pub name: &'static str,
    pub category: &'static str,
    /// Default (and minimum) pin counts.
    pub input_count: usize,
    pub output_count: usize,
    /// Whether callers may request more inputs than `input_count`.
    pub variable_inputs: bool,
    pub delay: SimTime,
    pub behavior: Behavior,
}

// Gate functions over four-valued logic. AND short-circuits on a low
// input and OR on a high one, so a partially-unknown circuit can still
// produce definite levels (cross-coupled latches rely on this).

fn eval_and(inputs: &[LogicState]) -> LogicState {
    let mut result = LogicState::High;
    for &input in inputs {
        match input {
            LogicState::Low => return LogicState::Low,
            LogicState::High => {}
            LogicState::Unknown | LogicState::HighZ => result = LogicState::Unknown,
        }
    }
    result
}

fn eval_or(inputs: &[LogicState]) -> LogicState {
    let mut result = LogicState::Low;
    for &input in inputs {
        match input {
            LogicState::High => return LogicState::High,
            LogicState::Low => {}
            LogicState::Unknown | LogicState::HighZ => result = LogicState::Unknown,
        }
    }
    result
}

fn eval_xor(inputs: &[LogicState]) -> LogicState {
    let mut parity = false;
    for &input in inputs {
        match input {
            LogicState::High => parity = !parity,
            LogicState::Low => {}
            LogicState::Unknown | LogicState::HighZ => return LogicState::Unknown,
        }
    }
    LogicState::from(parity)
}

fn eval_not(inputs: &[LogicState]) -> LogicState {
    inputs.first().copied().unwrap_or_default().invert()
}

fn eval_nand(inputs: &[LogicState]) -> LogicState {
    eval_and(inputs).invert()
}

fn eval_nor(inputs: &[LogicState]) -> LogicState {
    eval_or(inputs).invert()
}

fn eval_xnor(inputs: &[LogicState]) -> LogicState {
    eval_xor(inputs).invert()
}

/// Evaluates one flip-flop on an input change.
///
/// Pin layout per kind (CLR is always the last input, active high,
/// asynchronous):
///
/// - JK: `[J, CLK, K, CLR]`
/// - D:  `[D, CLK, CLR]`
/// - SR: `[S, CLK, R, CLR]`
/// - T:  `[T, CLK, CLR]`
///
/// Outputs are `[Q, Q']`. State changes only on a rising clock edge,
/// except CLR which forces Q low immediately.
pub fn eval_flip_flop(
    kind: FlipFlopKind,
    inputs: &[LogicState],
    prev_q: LogicState,
    prev_clock: LogicState,
) -> (LogicState, LogicState) {
    let clk = inputs.get(1).copied().unwrap_or_default();
    let clr = inputs.last().copied().unwrap_or_default();

    let q = if clr == LogicState::High {
        LogicState::Low
    } else if prev_clock != LogicState::High && clk == LogicState::High {
        let data = inputs.first().copied().unwrap_or_default();
        match kind {
            FlipFlopKind::D => data,
            FlipFlopKind::T => {
                if data.is_high() {
                    prev_q.invert()
                } else {
                    prev_q
                }
            }
            FlipFlopKind::Jk => {
                let j = data;
                let k = inputs.get(2).copied().unwrap_or_default();
                match (j.is_high(), k.is_high()) {
                    (true, true) => prev_q.invert(),
                    (true, false) => LogicState::High,
                    (false, true) => LogicState::Low,
                    (false, false) => prev_q,
                }
            }
            FlipFlopKind::Sr => {
                let s = data;
                let r = inputs.get(2).copied().unwrap_or_default();
                match (s.is_high(), r.is_high()) {
                    (true, true) => LogicState::Unknown,
                    (true, false) => LogicState::High,
                    (false, true) => LogicState::Low,
                    (false, false) => prev_q,
                }
            }
        }
    } else {
        prev_q
    };

    (q, q.invert())
}

/// Lookup table from kind to definition, seeded with every builtin.
#[derive(Clone, Debug)]
pub struct Catalog {
    definitions: HashMap<ComponentKind, ComponentDefinition>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Builds the catalog of all builtin component kinds.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::empty();
        for definition in builtin_definitions() {
            catalog.register(definition);
        }
        catalog
    }

    pub fn register(&mut self, definition: ComponentDefinition) {
        self.definitions.insert(definition.kind, definition);
    }

    pub fn definition(&self, kind: ComponentKind) -> Option<&ComponentDefinition> {
        self.definitions.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.definitions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn gate(kind: ComponentKind, name: &'static str, f: GateFn, inputs: usize) -> ComponentDefinition {
    ComponentDefinition {
        kind,
        name,
        category: "gates",
        input_count: inputs,
        output_count: 1,
        variable_inputs: inputs > 1,
        delay: 1,
        behavior: Behavior::Gate(f),
    }
}

fn expressions(
    kind: ComponentKind,
    name: &'static str,
    inputs: usize,
    exprs: &[&str],
    delay: SimTime,
) -> ComponentDefinition {
    ComponentDefinition {
        kind,
        name,
        category: "combinational",
        input_count: inputs,
        output_count: exprs.len(),
        variable_inputs: false,
        delay,
        behavior: Behavior::Expressions {
            exprs: exprs.iter().map(|e| e.to_string()).collect(),
            negate: false,
        },
    }
}

fn flip_flop(
    kind: ComponentKind,
    name: &'static str,
    ff: FlipFlopKind,
    inputs: usize,
) -> ComponentDefinition {
    ComponentDefinition {
        kind,
        name,
        category: "flip-flops",
        input_count: inputs,
        output_count: 2,
        variable_inputs: false,
        delay: 2,
        behavior: Behavior::FlipFlop(ff),
    }
}

fn builtin_definitions() -> Vec<ComponentDefinition> {
    vec![
        ComponentDefinition {
            kind: ComponentKind::Input,
            name: "Input",
            category: "io",
            input_count: 0,
            output_count: 1,
            variable_inputs: false,
            delay: 0,
            behavior: Behavior::Source,
        },
        ComponentDefinition {
            kind: ComponentKind::Output,
            name: "Output",
            category: "io",
            input_count: 1,
            output_count: 0,
            variable_inputs: false,
            delay: 0,
            behavior: Behavior::Sink,
        },
        ComponentDefinition {
            kind: ComponentKind::Clock,
            name: "Clock",
            category: "io",
            input_count: 0,
            output_count: 1,
            variable_inputs: false,
            delay: 0,
            behavior: Behavior::Source,
        },
        gate(ComponentKind::AndGate, "AND Gate", eval_and, 2),
        gate(ComponentKind::OrGate, "OR Gate", eval_or, 2),
        gate(ComponentKind::NotGate, "NOT Gate", eval_not, 1),
        gate(ComponentKind::NandGate, "NAND Gate", eval_nand, 2),
        gate(ComponentKind::NorGate, "NOR Gate", eval_nor, 2),
        gate(ComponentKind::XorGate, "XOR Gate", eval_xor, 2),
        gate(ComponentKind::XnorGate, "XNOR Gate", eval_xnor, 2),
        expressions(
            ComponentKind::FullAdder,
            "Full Adder",
            3,
            &["0^1^2", "(0*1) + 2*(0^1)"],
            3,
        ),
        expressions(ComponentKind::HalfAdder, "Half Adder", 2, &["0^1", "0*1"], 2),
        expressions(
            ComponentKind::FullSubtractor,
            "Full Subtractor",
            3,
            &["0^1^2", "(!0*1) + (!(0^1)*2)"],
            3,
        ),
        expressions(
            ComponentKind::HalfSubtractor,
            "Half Subtractor",
            2,
            &["0^1", "!0*1"],
            2,
        ),
        expressions(
            ComponentKind::Mux2To1,
            "2-to-1 Multiplexer",
            3,
            &["(0*!2) + (1*2)"],
            2,
        ),
        expressions(
            ComponentKind::Mux4To1,
            "4-to-1 Multiplexer",
            6,
            &["(0*!5*!4) + (1*!5*4) + (2*5*!4) + (3*5*4)"],
            3,
        ),
        expressions(
            ComponentKind::Decoder2To4,
            "2-to-4 Decoder",
            2,
            &["!1*!0", "!1*0", "1*!0", "1*0"],
            2,
        ),
        expressions(
            ComponentKind::Encoder4To2,
            "4-to-2 Encoder",
            4,
            &["1+3", "2+3"],
            2,
        ),
        expressions(
            ComponentKind::Comparator1Bit,
            "1-Bit Comparator",
            2,
            &["0*!1", "!(0^1)", "!0*1"],
            2,
        ),
        flip_flop(ComponentKind::FlipFlopJk, "JK Flip-Flop", FlipFlopKind::Jk, 4),
        flip_flop(ComponentKind::FlipFlopD, "D Flip-Flop", FlipFlopKind::D, 3),
        flip_flop(ComponentKind::FlipFlopSr, "SR Flip-Flop", FlipFlopKind::Sr, 4),
        flip_flop(ComponentKind::FlipFlopT, "T Flip-Flop", FlipFlopKind::T, 3),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use LogicState::{High, Low, Unknown};

    #[test]
    fn catalog_has_all_builtins() {
        let catalog = Catalog::with_builtins();
        assert_eq!(catalog.len(), 23);
        assert!(catalog.definition(ComponentKind::AndGate).is_some());
        assert!(catalog.definition(ComponentKind::FlipFlopJk).is_some());
    }

    #[test]
    fn and_gate_truth_table() {
        assert_eq!(eval_and(&[Low, Low]), Low);
        assert_eq!(eval_and(&[Low, High]), Low);
        assert_eq!(eval_and(&[High, Low]), Low);
        assert_eq!(eval_and(&[High, High]), High);
    }

    #[test]
    fn and_short_circuits_on_low() {
        // One definite low input decides the output even when the other
        // input is unknown.
        assert_eq!(eval_and(&[Low, Unknown]), Low);
        assert_eq!(eval_and(&[Unknown, High]), Unknown);
    }

    #[test]
    fn or_short_circuits_on_high() {
        assert_eq!(eval_or(&[High, Unknown]), High);
        assert_eq!(eval_or(&[Unknown, Low]), Unknown);
        assert_eq!(eval_or(&[Low, Low]), Low);
    }

    #[test]
    fn nand_with_one_low_input_is_high() {
        assert_eq!(eval_nand(&[Low, Unknown]), High);
        assert_eq!(eval_nand(&[High, High]), Low);
        assert_eq!(eval_nand(&[Unknown, High]), Unknown);
    }

    #[test]
    fn xor_poisoned_by_unknown() {
        assert_eq!(eval_xor(&[High, Low]), High);
        assert_eq!(eval_xor(&[High, High]), Low);
        assert_eq!(eval_xor(&[High, Unknown]), Unknown);
        assert_eq!(eval_xnor(&[High, High]), High);
    }

    #[test]
    fn three_input_gates() {
        assert_eq!(eval_and(&[High, High, High]), High);
        assert_eq!(eval_and(&[High, High, Low]), Low);
        assert_eq!(eval_or(&[Low, Low, High]), High);
        assert_eq!(eval_xor(&[High, High, High]), High);
    }

    #[test]
    fn d_flip_flop_latches_on_rising_edge() {
        // CLK goes low -> high with D high.
        let (q, qn) = eval_flip_flop(FlipFlopKind::D, &[High, High, Low], Low, Low);
        assert_eq!((q, qn), (High, Low));
        // CLK stays high: no further change even if D drops.
        let (q, _) = eval_flip_flop(FlipFlopKind::D, &[Low, High, Low], High, High);
        assert_eq!(q, High);
        // Falling edge holds.
        let (q, _) = eval_flip_flop(FlipFlopKind::D, &[Low, Low, Low], High, High);
        assert_eq!(q, High);
    }

    #[test]
    fn jk_flip_flop_modes() {
        // J=K=1 toggles.
        let (q, _) = eval_flip_flop(FlipFlopKind::Jk, &[High, High, High, Low], Low, Low);
        assert_eq!(q, High);
        let (q, _) = eval_flip_flop(FlipFlopKind::Jk, &[High, High, High, Low], High, Low);
        assert_eq!(q, Low);
        // J=1, K=0 sets; J=0, K=1 resets; both low holds.
        let (q, _) = eval_flip_flop(FlipFlopKind::Jk, &[High, High, Low, Low], Low, Low);
        assert_eq!(q, High);
        let (q, _) = eval_flip_flop(FlipFlopKind::Jk, &[Low, High, High, Low], High, Low);
        assert_eq!(q, Low);
        let (q, _) = eval_flip_flop(FlipFlopKind::Jk, &[Low, High, Low, Low], High, Low);
        assert_eq!(q, High);
    }

    #[test]
    fn sr_flip_flop_invalid_drive() {
        let (q, qn) = eval_flip_flop(FlipFlopKind::Sr, &[High, High, High, Low], Low, Low);
        assert_eq!(q, Unknown);
        assert_eq!(qn, Unknown);
    }

    #[test]
    fn t_flip_flop_toggles() {
        let (q, _) = eval_flip_flop(FlipFlopKind::T, &[High, High, Low], Low, Low);
        assert_eq!(q, High);
        let (q, _) = eval_flip_flop(FlipFlopKind::T, &[Low, High, Low], High, Low);
        assert_eq!(q, High);
    }

    #[test]
    fn clear_is_asynchronous() {
        // CLR high forces Q low with no clock edge at all.
        let (q, qn) = eval_flip_flop(FlipFlopKind::D, &[High, Low, High], High, Low);
        assert_eq!((q, qn), (Low, High));
    }
}
