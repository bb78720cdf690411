//! Undoable commands over the engine core.
//!
//! Every structural mutation of the circuit goes through a [`Command`]
//! executed by the [`CommandManager`], which keeps the two-stack
//! undo/redo history. A command that fails to execute is never pushed;
//! an undo or redo that fails is dropped from the history.

use tracing::warn;

use crate::catalog::ComponentKind;
use crate::engine::EngineCore;
use crate::netlist::{ComponentSnapshot, NetlistError};
use crate::types::{ComponentId, LogicState, PinAddr, PinType};

/// What a successfully executed command produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandResult {
    Uuid(ComponentId),
    UuidList(Vec<ComponentId>),
    Message(String),
    Bool(bool),
}

/// An undoable mutation of the circuit.
pub trait Command: Send {
    fn execute(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError>;
    fn undo(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError>;
}

/// Adds a component. Redo restores the identical id so later commands
/// that captured it stay valid.
pub struct AddComponentCommand {
    kind: ComponentKind,
    input_count: Option<usize>,
    output_count: Option<usize>,
    created: Option<ComponentId>,
}

impl AddComponentCommand {
    pub fn new(kind: ComponentKind, input_count: Option<usize>, output_count: Option<usize>) -> Self {
        Self {
            kind,
            input_count,
            output_count,
            created: None,
        }
    }
}

impl Command for AddComponentCommand {
    fn execute(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        let id = match self.created {
            Some(id) => core.add_component_with_id(self.kind, id, self.input_count, self.output_count)?,
            None => {
                let id = core.add_component(self.kind, self.input_count, self.output_count)?;
                self.created = Some(id);
                id
            }
        };
        Ok(CommandResult::Uuid(id))
    }

    fn undo(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        let id = self
            .created
            .ok_or(NetlistError::UnknownKind(self.kind))?;
        core.delete_component(id)?;
        Ok(CommandResult::Bool(true))
    }
}

/// Connects two pins. Redo replays the recorded edge verbatim, skipping
/// the single-driver check so restored circuits reconnect exactly.
pub struct ConnectCommand {
    a: PinAddr,
    a_type: PinType,
    b: PinAddr,
    b_type: PinType,
    executed: bool,
}

impl ConnectCommand {
    pub fn new(a: PinAddr, a_type: PinType, b: PinAddr, b_type: PinType) -> Self {
        Self {
            a,
            a_type,
            b,
            b_type,
            executed: false,
        }
    }
}

impl Command for ConnectCommand {
    fn execute(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        core.connect(self.a, self.a_type, self.b, self.b_type, self.executed)?;
        self.executed = true;
        Ok(CommandResult::Bool(true))
    }

    fn undo(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        core.disconnect(self.a, self.a_type, self.b, self.b_type)?;
        Ok(CommandResult::Bool(true))
    }
}

/// Removes one connection; undo reconnects it through the replay path.
pub struct DisconnectCommand {
    a: PinAddr,
    a_type: PinType,
    b: PinAddr,
    b_type: PinType,
}

impl DisconnectCommand {
    pub fn new(a: PinAddr, a_type: PinType, b: PinAddr, b_type: PinType) -> Self {
        Self { a, a_type, b, b_type }
    }
}

impl Command for DisconnectCommand {
    fn execute(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        core.disconnect(self.a, self.a_type, self.b, self.b_type)?;
        Ok(CommandResult::Bool(true))
    }

    fn undo(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        core.connect(self.a, self.a_type, self.b, self.b_type, true)?;
        Ok(CommandResult::Bool(true))
    }
}

/// Deletes a component; the snapshot captured on execute lets undo
/// restore it with its original identity, pin states and edges.
pub struct DeleteComponentCommand {
    id: ComponentId,
    snapshot: Option<ComponentSnapshot>,
}

impl DeleteComponentCommand {
    pub fn new(id: ComponentId) -> Self {
        Self { id, snapshot: None }
    }
}

impl Command for DeleteComponentCommand {
    fn execute(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        let snapshot = core.delete_component(self.id)?;
        self.snapshot = Some(snapshot);
        Ok(CommandResult::Bool(true))
    }

    fn undo(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(NetlistError::ComponentNotFound(self.id))?;
        core.restore_component(snapshot)?;
        Ok(CommandResult::Uuid(self.id))
    }
}

/// Drives an input source; undo restores the level it replaced.
pub struct SetInputCommand {
    id: ComponentId,
    level: LogicState,
    previous: Option<LogicState>,
}

impl SetInputCommand {
    pub fn new(id: ComponentId, level: LogicState) -> Self {
        Self {
            id,
            level,
            previous: None,
        }
    }
}

impl Command for SetInputCommand {
    fn execute(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        let old = core.set_input(self.id, self.level)?;
        if self.previous.is_none() {
            self.previous = Some(old);
        }
        Ok(CommandResult::Bool(true))
    }

    fn undo(&mut self, core: &mut EngineCore) -> Result<CommandResult, NetlistError> {
        let previous = self
            .previous
            .ok_or(NetlistError::ComponentNotFound(self.id))?;
        core.set_input(self.id, previous)?;
        Ok(CommandResult::Bool(true))
    }
}

/// Two-stack command history.
#[derive(Default)]
pub struct CommandManager {
    undo_stack: Vec<Box<dyn Command>>,
    redo_stack: Vec<Box<dyn Command>>,
}

impl CommandManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Executes a command. On success it joins the undo history and the
    /// redo history is cleared; on failure the history is untouched.
    pub fn execute(
        &mut self,
        mut command: Box<dyn Command>,
        core: &mut EngineCore,
    ) -> Result<CommandResult, NetlistError> {
        let result = command.execute(core)?;
        self.undo_stack.push(command);
        self.redo_stack.clear();
        Ok(result)
    }

    /// Undoes the most recent command. A command whose undo fails is
    /// dropped from the history entirely.
    pub fn undo(&mut self, core: &mut EngineCore) -> bool {
        let Some(mut command) = self.undo_stack.pop() else {
            return false;
        };
        match command.undo(core) {
            Ok(_) => {
                self.redo_stack.push(command);
                true
            }
            Err(err) => {
                warn!(%err, "undo failed; dropping command");
                false
            }
        }
    }

    /// Re-executes the most recently undone command. A redo that fails is
    /// dropped silently.
    pub fn redo(&mut self, core: &mut EngineCore) -> bool {
        let Some(mut command) = self.redo_stack.pop() else {
            return false;
        };
        match command.execute(core) {
            Ok(_) => {
                self.undo_stack.push(command);
                true
            }
            Err(err) => {
                warn!(%err, "redo failed; dropping command");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogicState;

    fn core() -> EngineCore {
        EngineCore::default()
    }

    #[test]
    fn add_undo_redo_keeps_identity() {
        let mut core = core();
        let mut manager = CommandManager::new();

        let result = manager
            .execute(
                Box::new(AddComponentCommand::new(ComponentKind::AndGate, None, None)),
                &mut core,
            )
            .unwrap();
        let CommandResult::Uuid(id) = result else {
            panic!("expected uuid result");
        };
        assert!(core.netlist().contains(id));

        assert!(manager.undo(&mut core));
        assert!(!core.netlist().contains(id));

        // Redo recreates the component under the same id.
        assert!(manager.redo(&mut core));
        assert!(core.netlist().contains(id));
    }

    #[test]
    fn failed_execute_not_pushed() {
        let mut core = core();
        let mut manager = CommandManager::new();
        let ghost = uuid::Uuid::new_v4();

        let result = manager.execute(Box::new(DeleteComponentCommand::new(ghost)), &mut core);
        assert!(result.is_err());
        assert_eq!(manager.undo_depth(), 0);
        assert!(!manager.undo(&mut core));
    }

    #[test]
    fn execute_clears_redo_stack() {
        let mut core = core();
        let mut manager = CommandManager::new();
        manager
            .execute(
                Box::new(AddComponentCommand::new(ComponentKind::NotGate, None, None)),
                &mut core,
            )
            .unwrap();
        assert!(manager.undo(&mut core));
        assert_eq!(manager.redo_depth(), 1);

        manager
            .execute(
                Box::new(AddComponentCommand::new(ComponentKind::OrGate, None, None)),
                &mut core,
            )
            .unwrap();
        assert_eq!(manager.redo_depth(), 0);
        assert!(!manager.redo(&mut core));
    }

    #[test]
    fn set_input_undo_restores_previous_level() {
        let mut core = core();
        let mut manager = CommandManager::new();
        let CommandResult::Uuid(input) = manager
            .execute(
                Box::new(AddComponentCommand::new(ComponentKind::Input, None, None)),
                &mut core,
            )
            .unwrap()
        else {
            panic!("expected uuid result");
        };

        manager
            .execute(Box::new(SetInputCommand::new(input, LogicState::High)), &mut core)
            .unwrap();
        assert_eq!(core.netlist().get(input).unwrap().output_pins[0].state, LogicState::High);

        assert!(manager.undo(&mut core));
        // The pin returns to its pre-command (undriven) level.
        assert_eq!(
            core.netlist().get(input).unwrap().output_pins[0].state,
            LogicState::Unknown
        );
        assert!(manager.redo(&mut core));
        assert_eq!(core.netlist().get(input).unwrap().output_pins[0].state, LogicState::High);
    }

    #[test]
    fn delete_undo_restores_connections() {
        let mut core = core();
        let mut manager = CommandManager::new();
        let input = core.add_component(ComponentKind::Input, None, None).unwrap();
        let gate = core.add_component(ComponentKind::NotGate, None, None).unwrap();
        core.connect((input, 0), PinType::Output, (gate, 0), PinType::Input, false)
            .unwrap();

        manager
            .execute(Box::new(DeleteComponentCommand::new(gate)), &mut core)
            .unwrap();
        assert!(!core.netlist().contains(gate));
        assert!(core.netlist().get(input).unwrap().output_connections[0].is_empty());

        assert!(manager.undo(&mut core));
        assert!(core.netlist().contains(gate));
        assert_eq!(
            core.netlist().get(input).unwrap().output_connections[0],
            vec![(gate, 0)]
        );
    }

    #[test]
    fn disconnect_undo_reconnects() {
        let mut core = core();
        let mut manager = CommandManager::new();
        let input = core.add_component(ComponentKind::Input, None, None).unwrap();
        let gate = core.add_component(ComponentKind::NotGate, None, None).unwrap();
        core.connect((input, 0), PinType::Output, (gate, 0), PinType::Input, false)
            .unwrap();

        manager
            .execute(
                Box::new(DisconnectCommand::new(
                    (input, 0),
                    PinType::Output,
                    (gate, 0),
                    PinType::Input,
                )),
                &mut core,
            )
            .unwrap();
        assert!(core.netlist().get(gate).unwrap().input_connections[0].is_empty());

        assert!(manager.undo(&mut core));
        assert_eq!(
            core.netlist().get(gate).unwrap().input_connections[0],
            vec![(input, 0)]
        );
    }
}
