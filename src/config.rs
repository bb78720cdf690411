//! Declarative circuit descriptions loaded from YAML or JSON.
//!
//! A [`CircuitConfig`] names a set of components and the connections
//! between them; [`CircuitConfig::instantiate`] builds the circuit in a
//! running engine and returns the name → id mapping.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ComponentKind;
use crate::clock::{ClockError, ClockSettings};
use crate::engine::SimulationEngine;
use crate::netlist::NetlistError;
use crate::types::{ComponentId, LogicState, PinType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config extension {0:?} (expected yaml, yml or json)")]
    UnsupportedExtension(String),

    #[error("duplicate component name {0:?}")]
    DuplicateName(String),

    #[error("connection references unknown component {0:?}")]
    UnknownComponent(String),

    #[error("initial level on {0:?}, which is not an input")]
    InitialOnNonInput(String),

    #[error("clock settings on {0:?}, which is not a clock")]
    ClockOnNonClock(String),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Engine(#[from] NetlistError),
}

/// One named component in a circuit description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    pub kind: ComponentKind,
    /// Widened input pin count for variable-arity gates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<usize>,
    /// Initial level driven onto an input component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<LogicState>,
    /// Clock settings, for clock components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockSettings>,
}

/// One edge: an output pin wired to an input pin, by component name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub from: String,
    #[serde(default)]
    pub from_pin: usize,
    pub to: String,
    #[serde(default)]
    pub to_pin: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CircuitConfig {
    #[serde(default)]
    pub name: String,
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
}

impl CircuitConfig {
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config, picking the format from the file extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&source),
            Some("json") => Self::from_json(&source),
            other => Err(ConfigError::UnsupportedExtension(
                other.unwrap_or("").to_string(),
            )),
        }
    }

    pub fn builder() -> CircuitConfigBuilder {
        CircuitConfigBuilder::default()
    }

    /// Checks names are unique, every connection endpoint resolves, and
    /// per-kind options sit on the right kinds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names: HashMap<&str, ComponentKind> = HashMap::new();
        for spec in &self.components {
            if names.insert(&spec.name, spec.kind).is_some() {
                return Err(ConfigError::DuplicateName(spec.name.clone()));
            }
            if spec.initial.is_some() && spec.kind != ComponentKind::Input {
                return Err(ConfigError::InitialOnNonInput(spec.name.clone()));
            }
            if let Some(clock) = &spec.clock {
                if spec.kind != ComponentKind::Clock {
                    return Err(ConfigError::ClockOnNonClock(spec.name.clone()));
                }
                clock.validate()?;
            }
        }
        for connection in &self.connections {
            for endpoint in [&connection.from, &connection.to] {
                if !names.contains_key(endpoint.as_str()) {
                    return Err(ConfigError::UnknownComponent(endpoint.clone()));
                }
            }
        }
        Ok(())
    }

    /// Builds this circuit inside `engine`: components first, then
    /// connections, then clocks and initial input levels.
    pub fn instantiate(
        &self,
        engine: &SimulationEngine,
    ) -> Result<HashMap<String, ComponentId>, ConfigError> {
        self.validate()?;
        let mut ids: HashMap<String, ComponentId> = HashMap::new();
        for spec in &self.components {
            let id = engine.add_component(spec.kind, spec.inputs, None)?;
            ids.insert(spec.name.clone(), id);
        }
        for connection in &self.connections {
            let from = ids[&connection.from];
            let to = ids[&connection.to];
            engine.connect(
                (from, connection.from_pin),
                PinType::Output,
                (to, connection.to_pin),
                PinType::Input,
            )?;
        }
        for spec in &self.components {
            let id = ids[&spec.name];
            if let Some(settings) = spec.clock {
                engine.update_clock(id, settings.enabled, Some(settings))?;
            }
            if let Some(level) = spec.initial {
                engine.set_input(id, level)?;
            }
        }
        Ok(ids)
    }
}

/// Programmatic construction of a [`CircuitConfig`].
#[derive(Debug, Default)]
pub struct CircuitConfigBuilder {
    config: CircuitConfig,
}

impl CircuitConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn component(mut self, name: impl Into<String>, kind: ComponentKind) -> Self {
        self.config.components.push(ComponentSpec {
            name: name.into(),
            kind,
            inputs: None,
            initial: None,
            clock: None,
        });
        self
    }

    pub fn input(mut self, name: impl Into<String>, initial: LogicState) -> Self {
        self.config.components.push(ComponentSpec {
            name: name.into(),
            kind: ComponentKind::Input,
            inputs: None,
            initial: Some(initial),
            clock: None,
        });
        self
    }

    pub fn clock(mut self, name: impl Into<String>, settings: ClockSettings) -> Self {
        self.config.components.push(ComponentSpec {
            name: name.into(),
            kind: ComponentKind::Clock,
            inputs: None,
            initial: None,
            clock: Some(settings),
        });
        self
    }

    pub fn wire(
        mut self,
        from: impl Into<String>,
        from_pin: usize,
        to: impl Into<String>,
        to_pin: usize,
    ) -> Self {
        self.config.connections.push(ConnectionSpec {
            from: from.into(),
            from_pin,
            to: to.into(),
            to_pin,
        });
        self
    }

    pub fn build(self) -> Result<CircuitConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
