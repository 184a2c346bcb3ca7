//! Shared test fixtures for lzsim_core and downstream crates.
//!
//! `linear_station()` is a plain `A - B - C` line with signals on both
//! approaches to `B`. `switched_station()` hangs `C` and `D` off `B` behind
//! switch `SW1`. Raw-code constants name the codes used throughout the tests.

use crate::{
    DetectorsConfig, ExceptionSet, Link, ModeMap, Neighbors, PhaseTimings, RawState, RcId,
    RcNode, RcStates, ScenarioStep, SignalId, SignalKind, SignalNode, SignalRoutes,
    SignalStates, SimulationConfig, StationModel, SwitchId, SwitchPosition, TickView,
};

pub const NO_CONTROL: RawState = 0;
pub const FREE: RawState = 3;
pub const FREE_LOCKED: RawState = 4;
pub const OCCUPIED: RawState = 6;
pub const OCCUPIED_LOCKED: RawState = 7;

pub const SWITCH_PLUS: RawState = 3;
pub const SWITCH_MINUS: RawState = 9;
pub const SWITCH_LOST: RawState = 0;

pub const SIGNAL_OPEN: RawState = 3;
pub const SIGNAL_CLOSED: RawState = 15;

pub fn rc(id: &str) -> RcId {
    RcId::new(id)
}

pub fn sw(id: &str) -> SwitchId {
    SwitchId::new(id)
}

pub fn sig(id: &str) -> SignalId {
    SignalId::new(id)
}

fn node(id: &str, prev: Vec<Link>, next: Vec<Link>) -> RcNode {
    let mut node = RcNode::new(rc(id));
    node.prev_links = prev.into_iter().collect();
    node.next_links = next.into_iter().collect();
    node
}

fn signal(id: &str, prev_sec: &str, next_sec: &str) -> SignalNode {
    SignalNode {
        id: sig(id),
        name: id.to_string(),
        kind: SignalKind::Train,
        prev_sec: Some(rc(prev_sec)),
        next_sec: Some(rc(next_sec)),
    }
}

/// `A - B - C`, unconditional links, signals `S_AB` and `S_CB` facing `B`.
pub fn linear_station() -> StationModel {
    let circuits = vec![
        node("A", vec![], vec![Link::unconditional(rc("B"))]),
        node(
            "B",
            vec![Link::unconditional(rc("A"))],
            vec![Link::unconditional(rc("C"))],
        ),
        node("C", vec![Link::unconditional(rc("B"))], vec![]),
    ];
    let signals = vec![signal("S_AB", "A", "B"), signal("S_CB", "C", "B")];
    StationModel::new(circuits, signals).expect("linear station is valid")
}

/// `A - B`, then `B -> C` with `SW1` plus and `B -> D` with `SW1` minus.
pub fn switched_station() -> StationModel {
    let circuits = vec![
        node("A", vec![], vec![Link::unconditional(rc("B"))]),
        node(
            "B",
            vec![Link::unconditional(rc("A"))],
            vec![
                Link::gated(rc("C"), sw("SW1"), SwitchPosition::Plus),
                Link::gated(rc("D"), sw("SW1"), SwitchPosition::Minus),
            ],
        ),
        node(
            "C",
            vec![Link::gated(rc("B"), sw("SW1"), SwitchPosition::Plus)],
            vec![],
        ),
        node(
            "D",
            vec![Link::gated(rc("B"), sw("SW1"), SwitchPosition::Minus)],
            vec![],
        ),
    ];
    StationModel::new(circuits, Vec::new()).expect("switched station is valid")
}

// ---------------------------------------------------------------------------
// Scenario steps
// ---------------------------------------------------------------------------

pub fn rc_states(states: &[(&str, RawState)]) -> RcStates {
    states.iter().map(|(id, code)| (rc(id), *code)).collect()
}

pub fn step(duration: f64, states: &[(&str, RawState)]) -> ScenarioStep {
    ScenarioStep {
        duration,
        rc_states: rc_states(states),
        ..ScenarioStep::default()
    }
}

pub fn with_switches(mut step: ScenarioStep, switches: &[(&str, RawState)]) -> ScenarioStep {
    step.switch_states = switches.iter().map(|(id, code)| (sw(id), *code)).collect();
    step
}

pub fn with_signals(mut step: ScenarioStep, signals: &[(&str, RawState)]) -> ScenarioStep {
    step.signal_states = signals.iter().map(|(id, code)| (sig(id), *code)).collect();
    step
}

/// `prev-ctrl-next` occupancy pattern over `A - B - C`, e.g. `"010"`.
pub fn pattern(duration: f64, bits: &str) -> ScenarioStep {
    let code = |c: char| if c == '1' { OCCUPIED } else { FREE };
    let mut chars = bits.chars();
    let mut next = || chars.next().map_or(FREE, code);
    let (a, b, c) = (next(), next(), next());
    step(duration, &[("A", a), ("B", b), ("C", c)])
}

// ---------------------------------------------------------------------------
// Configs
// ---------------------------------------------------------------------------

/// Detectors for `B` on the linear station with nothing enabled.
pub fn ctrl_b() -> DetectorsConfig {
    let mut cfg = DetectorsConfig::new(rc("B"));
    cfg.prev_rc_id = Some(rc("A"));
    cfg.next_rc_id = Some(rc("C"));
    cfg
}

/// Classical false occupancy: `ts01 = 2`, `tlz = 2`, `tkon = 3`.
pub fn lz1_config() -> DetectorsConfig {
    let mut cfg = ctrl_b();
    cfg.lz1 = Some(PhaseTimings::new(2.0, 2.0, 3.0));
    cfg
}

pub fn sim_config(detectors: Vec<DetectorsConfig>) -> SimulationConfig {
    SimulationConfig::new(detectors)
}

// ---------------------------------------------------------------------------
// Direct detector driving
// ---------------------------------------------------------------------------

/// Owns everything a [`TickView`] borrows, for driving detectors without
/// the simulation driver.
#[derive(Debug, Clone)]
pub struct Tick {
    pub station: StationModel,
    pub rc_states: RcStates,
    pub signal_states: SignalStates,
    pub modes: ModeMap,
    pub neighbors: Neighbors,
    pub routes: SignalRoutes,
    pub exceptions: ExceptionSet,
}

impl Tick {
    /// `B` controlled on the linear station with both neighbors resolved.
    pub fn linear(states: &[(&str, RawState)]) -> Self {
        let station = linear_station();
        let neighbors = Neighbors {
            prev: Some(rc("A")),
            next: Some(rc("C")),
            prev_ok: true,
            next_ok: true,
            prev_nc: false,
            next_nc: false,
        };
        let routes = SignalRoutes::resolve(&station, &rc("B"), &neighbors);
        Self {
            station,
            rc_states: rc_states(states),
            signal_states: SignalStates::new(),
            modes: ModeMap::new(),
            neighbors,
            routes,
            exceptions: ExceptionSet::EMPTY,
        }
    }

    /// Same station, `prev-ctrl-next` pattern as in [`pattern`].
    pub fn pattern(bits: &str) -> Self {
        let step = pattern(0.0, bits);
        let mut tick = Self::linear(&[]);
        tick.rc_states = step.rc_states;
        tick
    }

    pub fn view(&self) -> TickView<'_> {
        TickView {
            station: &self.station,
            rc_states: &self.rc_states,
            signal_states: &self.signal_states,
            modes: &self.modes,
            neighbors: &self.neighbors,
            signals: &self.routes,
            exceptions: self.exceptions,
        }
    }
}
