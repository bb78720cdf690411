//! Textual command protocol: whitespace-tokenized lines dispatched
//! against a running engine.
//!
//! Verbs: `add`, `del-comp`, `set-input`, `conn`, `del-conn`. Parsing
//! failures are typed and never reach the engine.

use thiserror::Error;

use crate::catalog::ComponentKind;
use crate::command::CommandResult;
use crate::engine::SimulationEngine;
use crate::netlist::NetlistError;
use crate::types::{ComponentId, LogicState, PinType};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("empty command")]
    Empty,

    #[error("unknown verb {0:?}")]
    UnknownVerb(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid {what}: {value:?}")]
    InvalidArgument { what: &'static str, value: String },

    #[error(transparent)]
    Engine(#[from] NetlistError),
}

fn parse_kind(token: &str) -> Result<ComponentKind, ProtocolError> {
    let kind = match token {
        "input" => ComponentKind::Input,
        "output" => ComponentKind::Output,
        "clock" => ComponentKind::Clock,
        "and" => ComponentKind::AndGate,
        "or" => ComponentKind::OrGate,
        "not" => ComponentKind::NotGate,
        "nand" => ComponentKind::NandGate,
        "nor" => ComponentKind::NorGate,
        "xor" => ComponentKind::XorGate,
        "xnor" => ComponentKind::XnorGate,
        "full-adder" => ComponentKind::FullAdder,
        "half-adder" => ComponentKind::HalfAdder,
        "full-subtractor" => ComponentKind::FullSubtractor,
        "half-subtractor" => ComponentKind::HalfSubtractor,
        "mux-2-1" => ComponentKind::Mux2To1,
        "mux-4-1" => ComponentKind::Mux4To1,
        "decoder-2-4" => ComponentKind::Decoder2To4,
        "encoder-4-2" => ComponentKind::Encoder4To2,
        "comparator" => ComponentKind::Comparator1Bit,
        "jk-flip-flop" => ComponentKind::FlipFlopJk,
        "d-flip-flop" => ComponentKind::FlipFlopD,
        "sr-flip-flop" => ComponentKind::FlipFlopSr,
        "t-flip-flop" => ComponentKind::FlipFlopT,
        other => {
            return Err(ProtocolError::InvalidArgument {
                what: "component kind",
                value: other.to_string(),
            })
        }
    };
    Ok(kind)
}

fn parse_uuid(token: &str) -> Result<ComponentId, ProtocolError> {
    uuid::Uuid::parse_str(token).map_err(|_| ProtocolError::InvalidArgument {
        what: "component id",
        value: token.to_string(),
    })
}

fn parse_level(token: &str) -> Result<LogicState, ProtocolError> {
    match token {
        "0" | "low" => Ok(LogicState::Low),
        "1" | "high" => Ok(LogicState::High),
        "x" | "unknown" => Ok(LogicState::Unknown),
        "z" | "high-z" => Ok(LogicState::HighZ),
        other => Err(ProtocolError::InvalidArgument {
            what: "logic level",
            value: other.to_string(),
        }),
    }
}

fn parse_pin_type(token: &str) -> Result<PinType, ProtocolError> {
    match token {
        "in" | "input" => Ok(PinType::Input),
        "out" | "output" => Ok(PinType::Output),
        other => Err(ProtocolError::InvalidArgument {
            what: "pin type",
            value: other.to_string(),
        }),
    }
}

fn parse_pin_index(token: &str) -> Result<usize, ProtocolError> {
    token.parse().map_err(|_| ProtocolError::InvalidArgument {
        what: "pin index",
        value: token.to_string(),
    })
}

struct Args<'a> {
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next(&mut self, name: &'static str) -> Result<&'a str, ProtocolError> {
        self.tokens
            .next()
            .ok_or(ProtocolError::MissingArgument(name))
    }

    fn next_opt(&mut self) -> Option<&'a str> {
        self.tokens.next()
    }
}

/// Parses one command line and runs it against `engine`.
pub fn dispatch(engine: &SimulationEngine, line: &str) -> Result<CommandResult, ProtocolError> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or(ProtocolError::Empty)?;
    let mut args = Args { tokens };

    match verb.to_ascii_lowercase().as_str() {
        "add" => {
            let kind = parse_kind(args.next("component kind")?)?;
            let inputs = match args.next_opt() {
                Some(token) => Some(parse_pin_index(token)?),
                None => None,
            };
            let id = engine.add_component(kind, inputs, None)?;
            Ok(CommandResult::Uuid(id))
        }
        "del-comp" => {
            let id = parse_uuid(args.next("component id")?)?;
            engine.delete_component(id)?;
            Ok(CommandResult::Bool(true))
        }
        "set-input" => {
            let id = parse_uuid(args.next("component id")?)?;
            let level = parse_level(args.next("logic level")?)?;
            engine.set_input(id, level)?;
            Ok(CommandResult::Bool(true))
        }
        "conn" => {
            let a = parse_uuid(args.next("source component id")?)?;
            let a_pin = parse_pin_index(args.next("source pin")?)?;
            let a_type = parse_pin_type(args.next("source pin type")?)?;
            let b = parse_uuid(args.next("target component id")?)?;
            let b_pin = parse_pin_index(args.next("target pin")?)?;
            let b_type = parse_pin_type(args.next("target pin type")?)?;
            engine.connect((a, a_pin), a_type, (b, b_pin), b_type)?;
            Ok(CommandResult::Bool(true))
        }
        "del-conn" => {
            let a = parse_uuid(args.next("source component id")?)?;
            let a_pin = parse_pin_index(args.next("source pin")?)?;
            let a_type = parse_pin_type(args.next("source pin type")?)?;
            let b = parse_uuid(args.next("target component id")?)?;
            let b_pin = parse_pin_index(args.next("target pin")?)?;
            let b_type = parse_pin_type(args.next("target pin type")?)?;
            engine.disconnect((a, a_pin), a_type, (b, b_pin), b_type)?;
            Ok(CommandResult::Bool(true))
        }
        other => Err(ProtocolError::UnknownVerb(other.to_string())),
    }
}
