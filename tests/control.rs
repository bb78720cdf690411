//! Run control: pause, single-stepping, settling and stats.

use std::time::Duration;

use krets::{
    ClockSettings, ComponentKind, FrequencyUnit, LogicState, PinType, SimulationEngine,
    SimulationState,
};

use LogicState::{High, Low, Unknown};

const SETTLE: Duration = Duration::from_secs(2);

/// Input driving a chain of three inverters.
fn inverter_chain(engine: &SimulationEngine) -> (krets::ComponentId, Vec<krets::ComponentId>) {
    let input = engine.add_component(ComponentKind::Input, None, None).unwrap();
    let gates: Vec<_> = (0..3)
        .map(|_| engine.add_component(ComponentKind::NotGate, None, None).unwrap())
        .collect();
    engine.connect((input, 0), PinType::Output, (gates[0], 0), PinType::Input).unwrap();
    engine.connect((gates[0], 0), PinType::Output, (gates[1], 0), PinType::Input).unwrap();
    engine.connect((gates[1], 0), PinType::Output, (gates[2], 0), PinType::Input).unwrap();
    (input, gates)
}

#[test]
fn starts_running_and_pauses() {
    let engine = SimulationEngine::new();
    assert_eq!(engine.simulation_state(), SimulationState::Running);
    engine.pause();
    assert_eq!(engine.simulation_state(), SimulationState::Paused);
    engine.resume();
    assert_eq!(engine.simulation_state(), SimulationState::Running);
}

#[test]
fn toggle_sim_state_flips_back_and_forth() {
    let engine = SimulationEngine::new();
    assert_eq!(engine.toggle_sim_state(), SimulationState::Paused);
    assert_eq!(engine.simulation_state(), SimulationState::Paused);
    assert_eq!(engine.toggle_sim_state(), SimulationState::Running);
    assert_eq!(engine.simulation_state(), SimulationState::Running);
}

#[test]
fn connection_bundle_and_pin_reads() {
    let engine = SimulationEngine::new();
    engine.pause();
    let input = engine.add_component(ComponentKind::Input, None, None).unwrap();
    let gate = engine.add_component(ComponentKind::NotGate, None, None).unwrap();
    engine.connect((input, 0), PinType::Output, (gate, 0), PinType::Input).unwrap();
    while engine.step_simulation() {}

    let bundle = engine.get_connections(gate).unwrap();
    assert_eq!(bundle.inputs, vec![vec![(input, 0)]]);
    assert_eq!(bundle.outputs, vec![Vec::new()]);

    engine.set_input(input, High).unwrap();
    while engine.step_simulation() {}
    assert_eq!(engine.read_pin(gate, PinType::Input, 0), Ok(High));
    assert_eq!(engine.read_pin(gate, PinType::Output, 0), Ok(Low));
    assert!(matches!(
        engine.read_pin(gate, PinType::Input, 5),
        Err(krets::NetlistError::PinOutOfRange { .. })
    ));
}

#[test]
fn step_only_works_while_paused() {
    let engine = SimulationEngine::new();
    assert!(!engine.step_simulation());
    engine.pause();
    // Paused but nothing scheduled.
    assert!(!engine.step_simulation());
}

#[test]
fn stepping_advances_one_batch_at_a_time() {
    let engine = SimulationEngine::new();
    engine.pause();
    let (input, gates) = inverter_chain(&engine);
    // Wiring while paused leaves the initial evaluations pending; drain
    // them so the interesting steps start from a settled circuit.
    while engine.step_simulation() {}

    engine.set_input(input, High).unwrap();
    assert!(!engine.is_settled());

    // One step per time point: the change crosses one gate per step.
    assert!(engine.step_simulation());
    assert_eq!(engine.read_output(gates[0], 0), Ok(Low));
    assert_eq!(engine.read_output(gates[1], 0), Ok(Unknown));

    assert!(engine.step_simulation());
    assert_eq!(engine.read_output(gates[1], 0), Ok(High));
    assert_eq!(engine.read_output(gates[2], 0), Ok(Unknown));

    assert!(engine.step_simulation());
    assert_eq!(engine.read_output(gates[2], 0), Ok(Low));

    assert!(!engine.step_simulation());
    assert!(engine.is_settled());
}

#[test]
fn stepping_is_deterministic() {
    // Two identical circuits stepped in lockstep end in identical states.
    let run = || {
        let engine = SimulationEngine::new();
        engine.pause();
        let (input, gates) = inverter_chain(&engine);
        while engine.step_simulation() {}
        engine.set_input(input, High).unwrap();
        let mut trace = Vec::new();
        while engine.step_simulation() {
            trace.push((
                engine.current_time(),
                gates
                    .iter()
                    .map(|&gate| engine.read_output(gate, 0).unwrap())
                    .collect::<Vec<_>>(),
            ));
        }
        trace
    };
    assert_eq!(run(), run());
}

#[test]
fn paused_engine_holds_events_until_resumed() {
    let engine = SimulationEngine::new();
    engine.pause();
    let (input, gates) = inverter_chain(&engine);
    while engine.step_simulation() {}

    engine.set_input(input, High).unwrap();
    // Nothing moves while paused.
    assert!(!engine.wait_until_settled(Duration::from_millis(50)));
    assert_eq!(engine.read_output(gates[0], 0), Ok(Unknown));

    engine.resume();
    assert!(engine.wait_until_settled(SETTLE));
    assert_eq!(engine.read_output(gates[2], 0), Ok(Low));
}

#[test]
fn disconnect_while_paused_cancels_pending_evaluation() {
    let engine = SimulationEngine::new();
    engine.pause();
    let input = engine.add_component(ComponentKind::Input, None, None).unwrap();
    let gate = engine.add_component(ComponentKind::NotGate, None, None).unwrap();
    engine.connect((input, 0), PinType::Output, (gate, 0), PinType::Input).unwrap();
    while engine.step_simulation() {}

    engine.set_input(input, High).unwrap();
    // The pending gate evaluation predates the disconnect; its epoch is
    // stale and the gate must not compute with the removed driver.
    engine.disconnect((input, 0), PinType::Output, (gate, 0), PinType::Input).unwrap();
    while engine.step_simulation() {}
    assert_eq!(engine.read_output(gate, 0), Ok(Unknown));
}

#[test]
fn settled_queries() {
    let engine = SimulationEngine::new();
    assert!(engine.is_settled());
    assert!(engine.wait_until_settled(Duration::from_millis(10)));

    let (input, _gates) = inverter_chain(&engine);
    engine.set_input(input, High).unwrap();
    assert!(engine.wait_until_settled(SETTLE));
    assert!(engine.is_settled());
}

#[test]
fn stats_reflect_activity() {
    let engine = SimulationEngine::new();
    let (input, _gates) = inverter_chain(&engine);
    engine.set_input(input, High).unwrap();
    assert!(engine.wait_until_settled(SETTLE));

    let stats = engine.export_stats();
    assert_eq!(stats["components"], 4);
    assert_eq!(stats["state"], "running");
    assert!(stats["counters"]["processed_events"].as_u64().unwrap() >= 3);
    assert!(stats["current_time"].as_u64().unwrap() > 0);
}

#[test]
fn background_thread_paces_clock_against_wall_time() {
    let engine = SimulationEngine::new();
    let clock = engine.add_component(ComponentKind::Clock, None, None).unwrap();
    let settings = ClockSettings::new(1.0, FrequencyUnit::KHz, 0.5).unwrap();
    engine.update_clock(clock, true, Some(settings)).unwrap();

    // Half-period is 500 us of wall time; after 200 ms the first toggle
    // has long fired and the virtual clock sits near 200 ms worth of
    // nanoseconds. The generous upper bound still catches a free-running
    // (unpaced) loop, which would rack up seconds of virtual time.
    std::thread::sleep(Duration::from_millis(200));
    let level = engine.read_output(clock, 0).unwrap();
    assert!(level == High || level == Low, "clock never toggled: {level:?}");
    let elapsed = engine.current_time();
    assert!(elapsed >= 500_000, "virtual clock barely moved: {elapsed}");
    assert!(elapsed <= 2_000_000_000, "virtual clock ran unpaced: {elapsed}");
}

#[test]
fn virtual_time_tracks_gate_delays() {
    let engine = SimulationEngine::new();
    engine.pause();
    let (input, _gates) = inverter_chain(&engine);
    while engine.step_simulation() {}
    let start = engine.current_time();

    engine.set_input(input, High).unwrap();
    while engine.step_simulation() {}
    // Three inverters, one nanosecond each.
    assert_eq!(engine.current_time(), start + 3);
}
