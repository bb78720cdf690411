//! The simulation engine: event-driven propagation over the netlist,
//! and the threaded facade wrapping it.
//!
//! [`EngineCore`] owns the netlist, the event queue and the virtual
//! clock; every mutation and every event batch runs against it while a
//! single lock is held. [`SimulationEngine`] wraps the core in a
//! `Mutex`/`Condvar` pair, spawns the background simulation thread and
//! exposes the public API.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, trace, warn};

use crate::catalog::{eval_flip_flop, AuxState, Behavior, Catalog, ComponentKind};
use crate::clock::ClockSettings;
use crate::command::{Command, CommandManager, CommandResult};
use crate::command::{
    AddComponentCommand, ConnectCommand, DeleteComponentCommand, DisconnectCommand,
    SetInputCommand,
};
use crate::expr;
use crate::netlist::{ComponentSnapshot, Netlist, NetlistError};
use crate::scheduler::EventQueue;
use crate::types::{
    ComponentId, ComponentState, ConnectionBundle, LogicState, PinAddr, PinState, PinType, SimTime,
    SimulationState,
};

/// Counters accumulated while the simulation runs.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct EngineStats {
    pub processed_events: u64,
    pub stale_events: u64,
    pub batches: u64,
}

/// Netlist + scheduler + virtual clock, mutated under one lock.
#[derive(Debug)]
pub struct EngineCore {
    netlist: Netlist,
    queue: EventQueue,
    current_time: SimTime,
    state: SimulationState,
    stats: EngineStats,
    stop: bool,
}

impl EngineCore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            netlist: Netlist::new(catalog),
            queue: EventQueue::new(),
            current_time: 0,
            state: SimulationState::Running,
            stats: EngineStats::default(),
            stop: false,
        }
    }

    pub fn netlist(&self) -> &Netlist {
        &self.netlist
    }

    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    fn delay_of(&self, id: ComponentId) -> SimTime {
        self.netlist
            .get(id)
            .ok()
            .and_then(|instance| self.netlist.catalog().definition(instance.kind))
            .map(|definition| definition.delay)
            .unwrap_or(0)
    }

    /// Schedules `id` at `due`, tagged with its current epoch.
    fn schedule(&mut self, id: ComponentId, due: SimTime) {
        if let Ok(instance) = self.netlist.get(id) {
            let epoch = instance.epoch;
            trace!(component = %id, due, epoch, "scheduling event");
            self.queue.schedule(due, id, epoch);
        }
    }

    /// Schedules `id` for re-evaluation after its own propagation delay.
    fn schedule_eval(&mut self, id: ComponentId) {
        let due = self.current_time + self.delay_of(id);
        self.schedule(id, due);
    }

    /// Writes new output levels, timestamps the changed pins and
    /// schedules every component fed by a changed pin.
    ///
    /// Unchanged outputs schedule nothing, which is what lets feedback
    /// loops converge.
    fn write_outputs(&mut self, id: ComponentId, levels: &[LogicState]) -> Result<(), NetlistError> {
        let now = self.current_time;
        let mut affected: Vec<ComponentId> = Vec::new();
        {
            let instance = self.netlist.get_mut(id)?;
            for (pin, &level) in levels.iter().enumerate() {
                if pin >= instance.output_pins.len() {
                    break;
                }
                if instance.output_pins[pin].state == level {
                    continue;
                }
                instance.output_pins[pin] = PinState::new(level, now);
                trace!(component = %id, pin, ?level, time = now, "output changed");
                for &(sink, _) in &instance.output_connections[pin] {
                    if !affected.contains(&sink) {
                        affected.push(sink);
                    }
                }
            }
        }
        for sink in affected {
            self.schedule_eval(sink);
        }
        Ok(())
    }

    /// Evaluates one component at the current time.
    fn evaluate(&mut self, id: ComponentId) -> Result<(), NetlistError> {
        let now = self.current_time;
        let instance = self.netlist.get(id)?;
        let kind = instance.kind;
        let clock = instance.clock;
        let behavior = self
            .netlist
            .catalog()
            .definition(kind)
            .ok_or(NetlistError::UnknownKind(kind))?
            .behavior
            .clone();

        match behavior {
            Behavior::Sink => {
                self.netlist.gather_inputs(id, now)?;
            }
            Behavior::Source => {
                // An event on a source is a clock toggle; plain inputs are
                // driven directly by set_input and never self-schedule.
                if let Some(settings) = clock.filter(|settings| settings.enabled) {
                    let current = self.netlist.get(id)?.output_pins[0].state;
                    let next = if current.is_high() {
                        LogicState::Low
                    } else {
                        LogicState::High
                    };
                    self.write_outputs(id, &[next])?;
                    let due = now + settings.next_toggle_delay(next);
                    self.schedule(id, due);
                }
            }
            Behavior::Gate(f) => {
                let inputs = self.netlist.gather_inputs(id, now)?;
                self.write_outputs(id, &[f(&inputs)])?;
            }
            Behavior::Expressions { exprs, negate } => {
                let inputs = self.netlist.gather_inputs(id, now)?;
                let operands: Vec<bool> = inputs.iter().map(|level| level.is_high()).collect();
                let mut levels = Vec::with_capacity(exprs.len());
                for formula in &exprs {
                    match expr::evaluate(formula, &operands) {
                        Ok(value) => levels.push(LogicState::from(value != negate)),
                        Err(err) => {
                            // Hold previous outputs on a bad expression.
                            warn!(component = %id, %formula, %err, "expression evaluation failed");
                            return Ok(());
                        }
                    }
                }
                self.write_outputs(id, &levels)?;
            }
            Behavior::FlipFlop(ff) => {
                let inputs = self.netlist.gather_inputs(id, now)?;
                let instance = self.netlist.get(id)?;
                let prev_q = instance.output_pins[0].state;
                let prev_clock = match instance.aux {
                    AuxState::FlipFlop { prev_clock } => prev_clock,
                    AuxState::None => LogicState::Unknown,
                };
                let (q, q_not) = eval_flip_flop(ff, &inputs, prev_q, prev_clock);
                let clk = inputs.get(1).copied().unwrap_or_default();
                self.netlist.get_mut(id)?.aux = AuxState::FlipFlop { prev_clock: clk };
                self.write_outputs(id, &[q, q_not])?;
            }
        }
        Ok(())
    }

    /// Processes every event sharing the earliest due time. Advances the
    /// virtual clock to that time first. Returns false when the queue is
    /// empty.
    pub fn process_next_batch(&mut self) -> bool {
        let batch = self.queue.pop_batch();
        let Some(first) = batch.first() else {
            return false;
        };
        if first.due > self.current_time {
            self.current_time = first.due;
        }
        self.stats.batches += 1;

        let mut seen: Vec<ComponentId> = Vec::new();
        for event in batch {
            let live_epoch = match self.netlist.get(event.component) {
                Ok(instance) => instance.epoch,
                Err(_) => {
                    self.stats.stale_events += 1;
                    continue;
                }
            };
            if live_epoch != event.epoch {
                trace!(component = %event.component, "dropping stale event");
                self.stats.stale_events += 1;
                continue;
            }
            if seen.contains(&event.component) {
                continue;
            }
            seen.push(event.component);
            self.stats.processed_events += 1;
            if let Err(err) = self.evaluate(event.component) {
                warn!(component = %event.component, %err, "evaluation failed");
            }
        }
        true
    }

    /// Drains the queue batch by batch, up to `max_batches`. Returns true
    /// if the circuit settled within the budget.
    pub fn settle(&mut self, max_batches: usize) -> bool {
        for _ in 0..max_batches {
            if !self.process_next_batch() {
                return true;
            }
        }
        self.queue.is_empty()
    }

    pub fn is_settled(&self) -> bool {
        self.queue.is_empty()
    }

    // Structural mutations. Each one performs the netlist change and the
    // rescheduling it implies, so commands and the facade stay thin.

    pub fn add_component(
        &mut self,
        kind: ComponentKind,
        input_count: Option<usize>,
        output_count: Option<usize>,
    ) -> Result<ComponentId, NetlistError> {
        let id = self.netlist.add_component(kind, input_count, output_count)?;
        info!(component = %id, ?kind, "component added");
        Ok(id)
    }

    pub fn add_component_with_id(
        &mut self,
        kind: ComponentKind,
        id: ComponentId,
        input_count: Option<usize>,
        output_count: Option<usize>,
    ) -> Result<ComponentId, NetlistError> {
        self.netlist
            .add_component_with_id(kind, id, input_count, output_count)?;
        info!(component = %id, ?kind, "component restored");
        Ok(id)
    }

    /// Connects two pins and schedules the sink so its outputs pick up
    /// the newly driven input.
    pub fn connect(
        &mut self,
        a: PinAddr,
        a_type: PinType,
        b: PinAddr,
        b_type: PinType,
        is_redo: bool,
    ) -> Result<(), NetlistError> {
        let (source, sink) = self.netlist.connect(a, a_type, b, b_type, is_redo)?;
        debug!(source = %source.0, sink = %sink.0, "pins connected");
        self.schedule_eval(sink.0);
        Ok(())
    }

    /// Removes a connection; the sink re-evaluates with the pin undriven.
    pub fn disconnect(
        &mut self,
        a: PinAddr,
        a_type: PinType,
        b: PinAddr,
        b_type: PinType,
    ) -> Result<(), NetlistError> {
        let (source, sink) = self.netlist.disconnect(a, a_type, b, b_type)?;
        debug!(source = %source.0, sink = %sink.0, "pins disconnected");
        self.schedule_eval(sink.0);
        Ok(())
    }

    /// Deletes a component; every component it drove re-evaluates with
    /// the lost driver reading unknown.
    pub fn delete_component(&mut self, id: ComponentId) -> Result<ComponentSnapshot, NetlistError> {
        let snapshot = self.netlist.delete_component(id)?;
        info!(component = %id, "component deleted");
        let sinks: Vec<ComponentId> = snapshot
            .connections
            .outputs
            .iter()
            .flatten()
            .map(|&(sink, _)| sink)
            .collect();
        for sink in sinks {
            if self.netlist.contains(sink) {
                self.schedule_eval(sink);
            }
        }
        Ok(snapshot)
    }

    /// Restores a deleted component and re-evaluates it plus everything
    /// it drives.
    pub fn restore_component(&mut self, snapshot: &ComponentSnapshot) -> Result<(), NetlistError> {
        self.netlist.restore_component(snapshot)?;
        info!(component = %snapshot.id, "component restored from snapshot");
        self.schedule_eval(snapshot.id);
        let sinks: Vec<ComponentId> = snapshot
            .connections
            .outputs
            .iter()
            .flatten()
            .map(|&(sink, _)| sink)
            .collect();
        for sink in sinks {
            if self.netlist.contains(sink) {
                self.schedule_eval(sink);
            }
        }
        // A restored clock resumes toggling.
        if let Some(settings) = snapshot.clock.filter(|settings| settings.enabled) {
            let level = snapshot
                .output_pins
                .first()
                .map(|pin| pin.state)
                .unwrap_or_default();
            let due = self.current_time + settings.next_toggle_delay(level);
            self.schedule(snapshot.id, due);
        }
        Ok(())
    }

    /// Drives the output of an `Input` component. Returns the previous
    /// level so the change can be undone.
    pub fn set_input(
        &mut self,
        id: ComponentId,
        level: LogicState,
    ) -> Result<LogicState, NetlistError> {
        let instance = self.netlist.get(id)?;
        if instance.kind != ComponentKind::Input {
            return Err(NetlistError::NotAnInput(id));
        }
        let old = instance.output_pins[0].state;
        debug!(component = %id, ?old, new = ?level, "input driven");
        self.write_outputs(id, &[level])?;
        Ok(old)
    }

    /// Enables, disables or reconfigures a clock component.
    ///
    /// Any pending toggle is cancelled by the epoch bump; enabling
    /// schedules the next toggle from the output's current phase.
    pub fn update_clock(
        &mut self,
        id: ComponentId,
        enabled: bool,
        settings: Option<ClockSettings>,
    ) -> Result<(), NetlistError> {
        let now = self.current_time;
        let applied = {
            let instance = self.netlist.get_mut(id)?;
            if instance.kind != ComponentKind::Clock {
                return Err(NetlistError::NotAClock(id));
            }
            let mut applied = settings.or(instance.clock).unwrap_or_default();
            applied.enabled = enabled;
            applied.validate()?;
            instance.clock = Some(applied);
            instance.bump_epoch();
            applied
        };
        info!(component = %id, enabled, frequency = applied.frequency, "clock updated");
        if enabled {
            let level = self.netlist.get(id)?.output_pins[0].state;
            let due = now + applied.next_toggle_delay(level);
            self.schedule(id, due);
        }
        Ok(())
    }
}

impl Default for EngineCore {
    fn default() -> Self {
        Self::new(Catalog::with_builtins())
    }
}

pub(crate) struct EngineShared {
    pub(crate) core: Mutex<EngineCore>,
    pub(crate) signal: Condvar,
}

/// Public engine handle: the locked core, the command history and the
/// background simulation thread.
///
/// The thread paces the virtual clock against wall time (one virtual
/// nanosecond per real nanosecond), so gate delays settle effectively
/// instantly while a 1 Hz clock toggles about twice a second.
pub struct SimulationEngine {
    shared: Arc<EngineShared>,
    commands: Mutex<CommandManager>,
    thread: Option<JoinHandle<()>>,
}

impl SimulationEngine {
    pub fn new() -> Self {
        Self::with_catalog(Catalog::with_builtins())
    }

    pub fn with_catalog(catalog: Catalog) -> Self {
        let shared = Arc::new(EngineShared {
            core: Mutex::new(EngineCore::new(catalog)),
            signal: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("simulation".into())
            .spawn(move || run_loop(thread_shared))
            .ok();
        if thread.is_none() {
            warn!("failed to spawn simulation thread; stepping only");
        }
        Self {
            shared,
            commands: Mutex::new(CommandManager::new()),
            thread,
        }
    }

    fn execute(&self, command: Box<dyn Command>) -> Result<CommandResult, NetlistError> {
        let mut manager = self.commands.lock();
        let mut core = self.shared.core.lock();
        let result = manager.execute(command, &mut core);
        drop(core);
        self.shared.signal.notify_all();
        result
    }

    /// Adds a component, optionally widening its pin counts.
    pub fn add_component(
        &self,
        kind: ComponentKind,
        input_count: Option<usize>,
        output_count: Option<usize>,
    ) -> Result<ComponentId, NetlistError> {
        match self.execute(Box::new(AddComponentCommand::new(
            kind,
            input_count,
            output_count,
        )))? {
            CommandResult::Uuid(id) => Ok(id),
            other => {
                warn!(?other, "unexpected add result");
                Err(NetlistError::UnknownKind(kind))
            }
        }
    }

    pub fn connect(
        &self,
        a: PinAddr,
        a_type: PinType,
        b: PinAddr,
        b_type: PinType,
    ) -> Result<(), NetlistError> {
        self.execute(Box::new(ConnectCommand::new(a, a_type, b, b_type)))?;
        Ok(())
    }

    pub fn disconnect(
        &self,
        a: PinAddr,
        a_type: PinType,
        b: PinAddr,
        b_type: PinType,
    ) -> Result<(), NetlistError> {
        self.execute(Box::new(DisconnectCommand::new(a, a_type, b, b_type)))?;
        Ok(())
    }

    pub fn delete_component(&self, id: ComponentId) -> Result<(), NetlistError> {
        self.execute(Box::new(DeleteComponentCommand::new(id)))?;
        Ok(())
    }

    pub fn set_input(&self, id: ComponentId, level: LogicState) -> Result<(), NetlistError> {
        self.execute(Box::new(SetInputCommand::new(id, level)))?;
        Ok(())
    }

    /// Undoes the most recent command. Returns false if the history is
    /// empty or the undo failed.
    pub fn undo(&self) -> bool {
        let mut manager = self.commands.lock();
        let mut core = self.shared.core.lock();
        let undone = manager.undo(&mut core);
        drop(core);
        self.shared.signal.notify_all();
        undone
    }

    /// Re-applies the most recently undone command. A redo that fails is
    /// dropped from the history.
    pub fn redo(&self) -> bool {
        let mut manager = self.commands.lock();
        let mut core = self.shared.core.lock();
        let redone = manager.redo(&mut core);
        drop(core);
        self.shared.signal.notify_all();
        redone
    }

    pub fn update_clock(
        &self,
        id: ComponentId,
        enabled: bool,
        settings: Option<ClockSettings>,
    ) -> Result<(), NetlistError> {
        let mut core = self.shared.core.lock();
        let result = core.update_clock(id, enabled, settings);
        drop(core);
        self.shared.signal.notify_all();
        result
    }

    pub fn pause(&self) {
        let mut core = self.shared.core.lock();
        core.state = SimulationState::Paused;
        drop(core);
        self.shared.signal.notify_all();
        info!("simulation paused");
    }

    pub fn resume(&self) {
        let mut core = self.shared.core.lock();
        core.state = SimulationState::Running;
        drop(core);
        self.shared.signal.notify_all();
        info!("simulation resumed");
    }

    /// Flips between running and paused; returns the new state.
    pub fn toggle_sim_state(&self) -> SimulationState {
        let mut core = self.shared.core.lock();
        core.state = match core.state {
            SimulationState::Running => SimulationState::Paused,
            SimulationState::Paused => SimulationState::Running,
        };
        let state = core.state;
        drop(core);
        self.shared.signal.notify_all();
        info!(?state, "simulation state toggled");
        state
    }

    pub fn simulation_state(&self) -> SimulationState {
        self.shared.core.lock().state
    }

    /// While paused, processes exactly one same-due-time batch on the
    /// calling thread. Returns false when running or when no events are
    /// pending.
    pub fn step_simulation(&self) -> bool {
        let mut core = self.shared.core.lock();
        if core.state != SimulationState::Paused {
            return false;
        }
        let processed = core.process_next_batch();
        drop(core);
        self.shared.signal.notify_all();
        processed
    }

    pub fn current_time(&self) -> SimTime {
        self.shared.core.lock().current_time()
    }

    pub fn component_state(&self, id: ComponentId) -> Result<ComponentState, NetlistError> {
        let core = self.shared.core.lock();
        Ok(core.netlist().get(id)?.state())
    }

    pub fn component_kind(&self, id: ComponentId) -> Result<ComponentKind, NetlistError> {
        let core = self.shared.core.lock();
        Ok(core.netlist().get(id)?.kind)
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        let core = self.shared.core.lock();
        core.netlist().iter().map(|instance| instance.id).collect()
    }

    /// Every edge touching `id`, per pin and per side.
    pub fn get_connections(&self, id: ComponentId) -> Result<ConnectionBundle, NetlistError> {
        let core = self.shared.core.lock();
        core.netlist().connections(id)
    }

    /// Current level of one pin on either side of a component.
    pub fn read_pin(
        &self,
        id: ComponentId,
        pin_type: PinType,
        pin: usize,
    ) -> Result<LogicState, NetlistError> {
        let core = self.shared.core.lock();
        let instance = core.netlist().get(id)?;
        let pins = match pin_type {
            PinType::Input => &instance.input_pins,
            PinType::Output => &instance.output_pins,
        };
        pins.get(pin)
            .map(|state| state.state)
            .ok_or(NetlistError::PinOutOfRange { id, pin, pin_type })
    }

    /// Current level of one output pin.
    pub fn read_output(&self, id: ComponentId, pin: usize) -> Result<LogicState, NetlistError> {
        let core = self.shared.core.lock();
        let instance = core.netlist().get(id)?;
        instance
            .output_pins
            .get(pin)
            .map(|state| state.state)
            .ok_or(NetlistError::PinOutOfRange {
                id,
                pin,
                pin_type: PinType::Output,
            })
    }

    pub fn is_settled(&self) -> bool {
        self.shared.core.lock().is_settled()
    }

    /// Blocks until no events are pending or `timeout` elapses. Returns
    /// whether the circuit settled.
    pub fn wait_until_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut core = self.shared.core.lock();
        while !core.is_settled() {
            if self
                .shared
                .signal
                .wait_until(&mut core, deadline)
                .timed_out()
            {
                return core.is_settled();
            }
        }
        true
    }

    /// Engine statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let core = self.shared.core.lock();
        json!({
            "current_time": core.current_time(),
            "state": core.state(),
            "components": core.netlist().len(),
            "pending_events": !core.is_settled(),
            "counters": core.stats(),
        })
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        {
            let mut core = self.shared.core.lock();
            core.stop = true;
        }
        self.shared.signal.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Background loop: waits while paused or idle, paces the virtual clock
/// against wall time, processes due batches.
fn run_loop(shared: Arc<EngineShared>) {
    let mut core = shared.core.lock();
    loop {
        if core.stop {
            break;
        }
        if core.state == SimulationState::Paused || core.queue_is_empty() {
            shared.signal.wait(&mut core);
            continue;
        }
        let due = match core.next_due() {
            Some(due) => due,
            None => continue,
        };
        if due > core.current_time() {
            let wait = Duration::from_nanos(due - core.current_time());
            let timed_out = shared.signal.wait_for(&mut core, wait).timed_out();
            if !timed_out {
                // Woken early: something changed, re-examine everything.
                continue;
            }
        }
        core.process_next_batch();
        shared.signal.notify_all();
    }
}

impl EngineCore {
    fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn next_due(&self) -> Option<SimTime> {
        self.queue.next_due()
    }
}
