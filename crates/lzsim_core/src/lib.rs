//! `lzsim_core`: deterministic false-occupancy / false-clear detection.
//!
//! No IO. All time is simulation time supplied by the caller.

mod coincidence;
mod detector;
mod engine;
mod error;
mod exceptions;
mod predicate;
mod sim;
mod states;
mod station;
mod topology;
mod types;
mod variants;
mod window;
mod wrapper;

pub use coincidence::{CoincidenceConfig, CoincidenceDetector};
pub use detector::{
    CompletionCheck, CompletionMode, CompletionRule, Detector, DetectorConfig, NextPhase,
    PhaseConfig, PhaseId, StepOutcome, TimerMode, Transition, MAX_FORMATION_SEGMENTS, TIME_EPS,
};
pub use engine::{init_detectors, update_detectors, DetectorsResult, DetectorsState, VariantOutcome};
pub use error::{ConfigError, MissingTopologyError, SimError};
pub use exceptions::{
    apply_phase_exception_policy, ExceptionKind, ExceptionMonitor, ExceptionSet, ExceptionsConfig,
};
pub use predicate::{
    Aspect, FnPredicate, GuardStage, Mask, NeighborRequirement, Neighbors, Predicate, Side,
    SignalRoutes, TickView,
};
pub use sim::{SimulationConfig, SimulationContext, DEFAULT_T_PK};
pub use states::{
    rc_is_free, rc_is_locked, rc_is_occupied, rc_occupancy, shunting_signal_is_closed,
    shunting_signal_is_open, signal_is_closed, signal_is_open, switch_position, Occupancy,
    SwitchPosition,
};
pub use station::{Link, RcIndex, RcNode, SignalKind, SignalNode, StationModel};
pub use topology::{TopologyResolver, TopologyState};
pub use types::*;
pub use variants::{
    build_variant, DetectorsConfig, PhaseTimings, RouteSignalTimings, SignalGuardTimings,
    SignalPairTimings, VariantFamily, VariantId, WindowTimings,
};
pub use window::{TimedWindowConfig, TimedWindowDetector};
pub use wrapper::{DetectorNode, VariantWrapper};

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

#[cfg(test)]
mod tests;
