//! The netlist: live component instances and the connection graph
//! between their pins.
//!
//! All mutation goes through [`Netlist`] methods so the structural
//! invariants hold everywhere: connections always link one output pin to
//! one input pin, an input pin has at most one driver, and every edge is
//! mirrored on both endpoints. Deleting or disconnecting bumps the
//! affected components' epochs, which lazily cancels their in-flight
//! events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::catalog::{AuxState, Behavior, Catalog, ComponentDefinition, ComponentKind};
use crate::clock::ClockSettings;
use crate::types::{
    ComponentId, ComponentState, ConnectionBundle, Connections, LogicState, PinAddr, PinState,
    PinType, SimTime,
};

/// Structural mutation failure.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum NetlistError {
    #[error("component {0} not found")]
    ComponentNotFound(ComponentId),

    #[error("unknown component kind {0:?}")]
    UnknownKind(ComponentKind),

    #[error("{pin_type:?} pin {pin} out of range for component {id}")]
    PinOutOfRange {
        id: ComponentId,
        pin: usize,
        pin_type: PinType,
    },

    #[error("connection endpoints must be one output and one input")]
    InvalidEndpoints,

    #[error("input pin {pin} of component {id} already has a driver")]
    InputAlreadyDriven { id: ComponentId, pin: usize },

    #[error("no such connection")]
    ConnectionNotFound,

    #[error("component {id:?} requires at least {min} input pins, got {requested}")]
    BadPinCount {
        id: ComponentKind,
        min: usize,
        requested: usize,
    },

    #[error("component {0} is not an input source")]
    NotAnInput(ComponentId),

    #[error("component {0} is not a clock")]
    NotAClock(ComponentId),

    #[error(transparent)]
    Clock(#[from] crate::clock::ClockError),
}

/// A live component: identity, pins, edges and private state.
#[derive(Clone, Debug)]
pub struct ComponentInstance {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub name: String,
    /// Bumped on delete/disconnect/clock-disable; events carry the epoch
    /// they were scheduled under and are dropped when it no longer
    /// matches.
    pub epoch: u64,
    pub input_pins: Vec<PinState>,
    pub output_pins: Vec<PinState>,
    /// Per input pin: the single output pin driving it, if any.
    pub input_connections: Connections,
    /// Per output pin: every input pin it drives.
    pub output_connections: Connections,
    pub aux: AuxState,
    pub clock: Option<ClockSettings>,
}

impl ComponentInstance {
    fn new(definition: &ComponentDefinition, id: ComponentId, inputs: usize, outputs: usize) -> Self {
        let aux = match definition.behavior {
            Behavior::FlipFlop(_) => AuxState::FlipFlop {
                prev_clock: LogicState::Unknown,
            },
            _ => AuxState::None,
        };
        Self {
            id,
            kind: definition.kind,
            name: definition.name.to_string(),
            epoch: 0,
            input_pins: vec![PinState::default(); inputs],
            output_pins: vec![PinState::default(); outputs],
            input_connections: vec![Vec::new(); inputs],
            output_connections: vec![Vec::new(); outputs],
            aux,
            clock: None,
        }
    }

    pub fn bump_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Pin + connectivity view, as exposed to renderers and snapshots.
    pub fn state(&self) -> ComponentState {
        ComponentState {
            input_pins: self.input_pins.clone(),
            output_pins: self.output_pins.clone(),
            input_connected: self.input_connections.iter().map(|c| !c.is_empty()).collect(),
            output_connected: self
                .output_connections
                .iter()
                .map(|c| !c.is_empty())
                .collect(),
        }
    }
}

/// Everything needed to restore a deleted component exactly: identity,
/// pin states, private state and both sides of every edge it touched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub input_pins: Vec<PinState>,
    pub output_pins: Vec<PinState>,
    pub connections: ConnectionBundle,
    pub aux: AuxState,
    pub clock: Option<ClockSettings>,
}

/// Mutable component store plus the shared catalog of definitions.
#[derive(Clone, Debug, Default)]
pub struct Netlist {
    catalog: Catalog,
    components: HashMap<ComponentId, ComponentInstance>,
}

impl Netlist {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            components: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.components.contains_key(&id)
    }

    pub fn get(&self, id: ComponentId) -> Result<&ComponentInstance, NetlistError> {
        self.components
            .get(&id)
            .ok_or(NetlistError::ComponentNotFound(id))
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Result<&mut ComponentInstance, NetlistError> {
        self.components
            .get_mut(&id)
            .ok_or(NetlistError::ComponentNotFound(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentInstance> {
        self.components.values()
    }

    /// Adds a fresh component of `kind`, optionally widening the input or
    /// output pin count beyond the definition's default.
    pub fn add_component(
        &mut self,
        kind: ComponentKind,
        input_count: Option<usize>,
        output_count: Option<usize>,
    ) -> Result<ComponentId, NetlistError> {
        self.add_component_with_id(kind, uuid::Uuid::new_v4(), input_count, output_count)
    }

    /// Adds a component under a caller-chosen id. Used by undo to restore
    /// a deleted component with its original identity.
    pub fn add_component_with_id(
        &mut self,
        kind: ComponentKind,
        id: ComponentId,
        input_count: Option<usize>,
        output_count: Option<usize>,
    ) -> Result<ComponentId, NetlistError> {
        let definition = self
            .catalog
            .definition(kind)
            .ok_or(NetlistError::UnknownKind(kind))?;

        let inputs = input_count.unwrap_or(definition.input_count);
        if inputs < definition.input_count || (inputs != definition.input_count && !definition.variable_inputs)
        {
            return Err(NetlistError::BadPinCount {
                id: kind,
                min: definition.input_count,
                requested: inputs,
            });
        }
        let outputs = output_count.unwrap_or(definition.output_count);
        if outputs != definition.output_count {
            return Err(NetlistError::BadPinCount {
                id: kind,
                min: definition.output_count,
                requested: outputs,
            });
        }

        let mut instance = ComponentInstance::new(definition, id, inputs, outputs);
        if kind == ComponentKind::Clock {
            instance.clock = Some(ClockSettings::default());
        }
        self.components.insert(id, instance);
        Ok(id)
    }

    fn check_pin(&self, addr: PinAddr, pin_type: PinType) -> Result<(), NetlistError> {
        let (id, pin) = addr;
        let instance = self.get(id)?;
        let count = match pin_type {
            PinType::Input => instance.input_pins.len(),
            PinType::Output => instance.output_pins.len(),
        };
        if pin >= count {
            return Err(NetlistError::PinOutOfRange { id, pin, pin_type });
        }
        Ok(())
    }

    /// Connects two pins. Exactly one endpoint must be an output pin and
    /// the other an input pin; the input pin must be undriven unless
    /// `is_redo` replays a previously recorded edge.
    ///
    /// Returns the `(driver, sink)` pair in output→input orientation so
    /// callers can schedule the sink for re-evaluation.
    pub fn connect(
        &mut self,
        a: PinAddr,
        a_type: PinType,
        b: PinAddr,
        b_type: PinType,
        is_redo: bool,
    ) -> Result<(PinAddr, PinAddr), NetlistError> {
        let (source, sink) = match (a_type, b_type) {
            (PinType::Output, PinType::Input) => (a, b),
            (PinType::Input, PinType::Output) => (b, a),
            _ => {
                warn!(?a_type, ?b_type, "rejecting connection between same-type pins");
                return Err(NetlistError::InvalidEndpoints);
            }
        };
        self.check_pin(source, PinType::Output)?;
        self.check_pin(sink, PinType::Input)?;

        if !is_redo && !self.components[&sink.0].input_connections[sink.1].is_empty() {
            warn!(component = %sink.0, pin = sink.1, "input pin already driven");
            return Err(NetlistError::InputAlreadyDriven {
                id: sink.0,
                pin: sink.1,
            });
        }

        let source_comp = self.components.get_mut(&source.0).ok_or(
            NetlistError::ComponentNotFound(source.0),
        )?;
        source_comp.output_connections[source.1].push(sink);
        let sink_comp = self
            .components
            .get_mut(&sink.0)
            .ok_or(NetlistError::ComponentNotFound(sink.0))?;
        sink_comp.input_connections[sink.1].push(source);

        Ok((source, sink))
    }

    /// Removes the edge between two pins and bumps the sink's epoch, so
    /// any evaluation scheduled while the driver was still attached goes
    /// stale. The driver keeps its epoch: its own pending events (a
    /// clock's next toggle, say) remain valid.
    ///
    /// Returns the `(driver, sink)` pair that was removed.
    pub fn disconnect(
        &mut self,
        a: PinAddr,
        a_type: PinType,
        b: PinAddr,
        b_type: PinType,
    ) -> Result<(PinAddr, PinAddr), NetlistError> {
        let (source, sink) = match (a_type, b_type) {
            (PinType::Output, PinType::Input) => (a, b),
            (PinType::Input, PinType::Output) => (b, a),
            _ => return Err(NetlistError::InvalidEndpoints),
        };
        self.check_pin(source, PinType::Output)?;
        self.check_pin(sink, PinType::Input)?;

        let exists = self.components[&source.0].output_connections[source.1]
            .iter()
            .any(|&addr| addr == sink);
        if !exists {
            return Err(NetlistError::ConnectionNotFound);
        }

        if let Some(comp) = self.components.get_mut(&source.0) {
            comp.output_connections[source.1].retain(|&addr| addr != sink);
        }
        if let Some(comp) = self.components.get_mut(&sink.0) {
            comp.input_connections[sink.1].retain(|&addr| addr != source);
            comp.bump_epoch();
        }

        Ok((source, sink))
    }

    /// Deletes a component, scrubbing every edge that touches it. Only
    /// downstream neighbors (the pins it drove) get an epoch bump: their
    /// pending evaluations reference a driver that no longer exists.
    /// Upstream drivers keep their epochs and their in-flight events.
    ///
    /// Returns a snapshot sufficient to restore the component exactly.
    pub fn delete_component(&mut self, id: ComponentId) -> Result<ComponentSnapshot, NetlistError> {
        let instance = self
            .components
            .remove(&id)
            .ok_or(NetlistError::ComponentNotFound(id))?;

        let snapshot = ComponentSnapshot {
            id,
            kind: instance.kind,
            input_pins: instance.input_pins.clone(),
            output_pins: instance.output_pins.clone(),
            connections: ConnectionBundle {
                inputs: instance.input_connections.clone(),
                outputs: instance.output_connections.clone(),
            },
            aux: instance.aux,
            clock: instance.clock,
        };

        // Scrub the mirror half of every edge on the neighbors.
        for (pin, drivers) in instance.input_connections.iter().enumerate() {
            for &(driver_id, driver_pin) in drivers {
                if let Some(neighbor) = self.components.get_mut(&driver_id) {
                    neighbor.output_connections[driver_pin].retain(|&(cid, cpin)| {
                        (cid, cpin) != (id, pin)
                    });
                }
            }
        }
        for (pin, sinks) in instance.output_connections.iter().enumerate() {
            for &(sink_id, sink_pin) in sinks {
                if let Some(neighbor) = self.components.get_mut(&sink_id) {
                    neighbor.input_connections[sink_pin].retain(|&(cid, cpin)| {
                        (cid, cpin) != (id, pin)
                    });
                    neighbor.bump_epoch();
                }
            }
        }

        Ok(snapshot)
    }

    /// Restores a component from a delete snapshot, re-adding every edge
    /// it had. Neighbors that disappeared in the meantime are skipped.
    pub fn restore_component(&mut self, snapshot: &ComponentSnapshot) -> Result<(), NetlistError> {
        self.add_component_with_id(
            snapshot.kind,
            snapshot.id,
            Some(snapshot.input_pins.len()),
            Some(snapshot.output_pins.len()),
        )?;
        {
            let instance = self.get_mut(snapshot.id)?;
            instance.input_pins = snapshot.input_pins.clone();
            instance.output_pins = snapshot.output_pins.clone();
            instance.aux = snapshot.aux;
            instance.clock = snapshot.clock;
        }

        for (pin, drivers) in snapshot.connections.inputs.iter().enumerate() {
            for &driver in drivers {
                if self.contains(driver.0) {
                    self.connect(driver, PinType::Output, (snapshot.id, pin), PinType::Input, true)?;
                }
            }
        }
        for (pin, sinks) in snapshot.connections.outputs.iter().enumerate() {
            for &sink in sinks {
                // Self-loops were already restored by the inputs pass.
                if sink.0 != snapshot.id && self.contains(sink.0) {
                    self.connect((snapshot.id, pin), PinType::Output, sink, PinType::Input, true)?;
                }
            }
        }
        Ok(())
    }

    /// Both sides of every edge touching `id`, per pin.
    pub fn connections(&self, id: ComponentId) -> Result<ConnectionBundle, NetlistError> {
        let instance = self.get(id)?;
        Ok(ConnectionBundle {
            inputs: instance.input_connections.clone(),
            outputs: instance.output_connections.clone(),
        })
    }

    /// The output pin driving `(id, pin)`, if connected.
    pub fn driver_of(&self, id: ComponentId, pin: usize) -> Option<PinAddr> {
        self.components
            .get(&id)?
            .input_connections
            .get(pin)?
            .first()
            .copied()
    }

    /// Reads the effective level on one input pin: its driver's output
    /// level, with undriven and high-impedance wires reading unknown.
    pub fn read_input(&self, id: ComponentId, pin: usize) -> LogicState {
        match self.driver_of(id, pin) {
            Some((driver_id, driver_pin)) => {
                let level = self.components[&driver_id].output_pins[driver_pin].state;
                if level == LogicState::HighZ {
                    LogicState::Unknown
                } else {
                    level
                }
            }
            None => LogicState::Unknown,
        }
    }

    /// Gathers every input level of a component and records them on its
    /// input pins, timestamping the ones that changed.
    pub fn gather_inputs(&mut self, id: ComponentId, now: SimTime) -> Result<Vec<LogicState>, NetlistError> {
        let count = self.get(id)?.input_pins.len();
        let levels: Vec<LogicState> = (0..count).map(|pin| self.read_input(id, pin)).collect();
        let instance = self.get_mut(id)?;
        for (pin, &level) in levels.iter().enumerate() {
            if instance.input_pins[pin].state != level {
                instance.input_pins[pin] = PinState::new(level, now);
            }
        }
        Ok(levels)
    }
}
