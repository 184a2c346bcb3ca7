//! Sub-stepping simulation driver.
//!
//! Each coarse scenario interval is cut into chunks at the instants where a
//! circuit's topology may change (latch expiry), so results do not depend on
//! how finely the caller slices time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::engine::{init_detectors, update_detectors, DetectorsState};
use crate::exceptions::{ExceptionMonitor, ExceptionSet, ExceptionsConfig};
use crate::predicate::{Neighbors, SignalRoutes, TickView};
use crate::station::{RcIndex, StationModel};
use crate::topology::TopologyResolver;
use crate::variants::DetectorsConfig;
use crate::{
    ConfigError, DetectionEvent, MissingTopologyError, ModeMap, RcId, ScenarioStep, SimError,
    TimelineStep, TIME_EPS,
};

pub const DEFAULT_T_PK: f64 = 30.0;

fn default_t_pk() -> f64 {
    DEFAULT_T_PK
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Latch window for lost switch control, seconds.
    #[serde(default = "default_t_pk")]
    pub t_pk: f64,
    pub detectors: Vec<DetectorsConfig>,
}

impl SimulationConfig {
    pub fn new(detectors: Vec<DetectorsConfig>) -> Self {
        Self {
            t_pk: DEFAULT_T_PK,
            detectors,
        }
    }
}

#[derive(Debug)]
struct CircuitRun {
    index: RcIndex,
    detectors: DetectorsState,
    monitor: ExceptionMonitor,
    exceptions: ExceptionsConfig,
}

/// Owns the resolver, every controlled circuit's detectors and the clock.
#[derive(Debug)]
pub struct SimulationContext {
    topology: TopologyResolver,
    circuits: Vec<CircuitRun>,
    time: f64,
}

impl SimulationContext {
    pub fn new(station: StationModel, config: &SimulationConfig) -> Result<Self, SimError> {
        if config.detectors.is_empty() {
            return Err(ConfigError::NoControlledCircuits.into());
        }
        let mut seen = BTreeSet::new();
        let mut circuits = Vec::with_capacity(config.detectors.len());
        for cfg in &config.detectors {
            let ctrl = &cfg.ctrl_rc_id;
            if !seen.insert(ctrl.clone()) {
                return Err(ConfigError::DuplicateControlledCircuit(ctrl.clone()).into());
            }
            let index = station
                .index_of(ctrl)
                .ok_or_else(|| MissingTopologyError(ctrl.clone()))?;
            circuits.push(CircuitRun {
                index,
                detectors: init_detectors(cfg)?,
                monitor: ExceptionMonitor::new(ctrl.clone()),
                exceptions: cfg.exceptions.clone(),
            });
        }
        let topology = TopologyResolver::new(station, config.t_pk)?;
        Ok(Self {
            topology,
            circuits,
            time: 0.0,
        })
    }

    /// Start of the next interval.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn topology(&self) -> &TopologyResolver {
        &self.topology
    }

    pub fn detectors(&self, ctrl: &RcId) -> Option<&DetectorsState> {
        self.circuits
            .iter()
            .map(|c| &c.detectors)
            .find(|d| d.ctrl() == ctrl)
    }

    /// Process one interval for every controlled circuit, in config order.
    pub fn step(&mut self, step: &ScenarioStep) -> Vec<TimelineStep> {
        let start = self.time;
        let dt = if step.duration.is_finite() {
            step.duration.max(0.0)
        } else {
            0.0
        };
        let mut entries = Vec::with_capacity(self.circuits.len());
        for run in &mut self.circuits {
            let entry = step_circuit(&mut self.topology, run, step, start, dt);
            run.monitor.record(&entry);
            entries.push(entry);
        }
        self.time = start + dt;
        entries
    }

    pub fn run<'a>(
        &mut self,
        steps: impl IntoIterator<Item = &'a ScenarioStep>,
    ) -> Vec<TimelineStep> {
        let mut timeline = Vec::new();
        for step in steps {
            timeline.extend(self.step(step));
        }
        timeline
    }
}

/// Neighbors, signal routes and the visible mode map for one chunk.
fn resolve_chunk(
    topology: &mut TopologyResolver,
    index: RcIndex,
    ctrl: &RcId,
    step: &ScenarioStep,
    exceptions: ExceptionSet,
    chunk: f64,
) -> (Neighbors, SignalRoutes, ModeMap) {
    let neighbors = topology.neighbors_with_control(index, &step.switch_states, chunk);
    let routes = SignalRoutes::resolve(topology.station(), ctrl, &neighbors);
    let mut modes = step.modes.clone();
    neighbors.publish(&mut modes);
    routes.publish(&mut modes);
    exceptions.publish(&mut modes);
    (neighbors, routes, modes)
}

fn step_circuit(
    topology: &mut TopologyResolver,
    run: &mut CircuitRun,
    step: &ScenarioStep,
    start: f64,
    dt: f64,
) -> TimelineStep {
    let ctrl = run.detectors.ctrl().clone();
    let exceptions = run.monitor.evaluate(step, &run.exceptions);

    let mut remaining = dt;
    let mut elapsed = 0.0;
    let mut flags: Vec<String> = Vec::new();
    let mut events: Vec<DetectionEvent> = Vec::new();
    let mut last = None;

    while remaining > TIME_EPS {
        let chunk = topology
            .next_change_dt(run.index, &step.switch_states, remaining)
            .map_or(remaining, |limit| limit.min(remaining));
        if chunk <= 0.0 {
            break;
        }
        let (neighbors, routes, modes) =
            resolve_chunk(topology, run.index, &ctrl, step, exceptions, chunk);
        tracing::trace!(%ctrl, at = start + elapsed, chunk, "sub-step");

        let view = TickView {
            station: topology.station(),
            rc_states: &step.rc_states,
            signal_states: &step.signal_states,
            modes: &modes,
            neighbors: &neighbors,
            signals: &routes,
            exceptions,
        };
        let result = update_detectors(&mut run.detectors, &view, chunk);

        let at = start + elapsed;
        for outcome in &result.variants {
            events.extend(outcome.transitions.iter().map(|tr| DetectionEvent {
                t: at + tr.offset,
                variant: outcome.variant,
                kind: tr.kind,
            }));
        }
        for flag in result.flags {
            if !flags.contains(&flag) {
                flags.push(flag);
            }
        }

        elapsed += chunk;
        remaining -= chunk;
        last = Some((neighbors, modes));
    }

    // A zero-length interval still reports where the circuit stands.
    let (neighbors, modes) = match last {
        Some(parts) => parts,
        None => {
            let (neighbors, _, modes) =
                resolve_chunk(topology, run.index, &ctrl, step, exceptions, 0.0);
            (neighbors, modes)
        }
    };

    events.sort_by(|a, b| a.t.total_cmp(&b.t));
    for event in &events {
        tracing::debug!(%ctrl, variant = %event.variant, t = event.t, kind = ?event.kind, "event");
    }

    TimelineStep {
        t: events.first().map_or(start, |e| e.t),
        step_duration: dt,
        effective_prev_rc: neighbors.prev,
        effective_next_rc: neighbors.next,
        rc_states: step.rc_states.clone(),
        switch_states: step.switch_states.clone(),
        signal_states: step.signal_states.clone(),
        modes,
        lz_state: run.detectors.any_active(),
        lz_variant: run.detectors.active_variant(),
        flags,
        events,
        mu_state: step.mu.get(&ctrl).copied(),
        nas_state: step.auto_actions.get("nas").copied(),
        chas_state: step.auto_actions.get("chas").copied(),
        dsp_state: step.dispatcher_state(),
        ctrl_rc_id: ctrl,
    }
}
