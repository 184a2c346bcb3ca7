use crate::{PhaseId, RcId, SignalId};

/// Misconfiguration detected while building detectors or the station model.
/// Never produced once the simulation is ticking.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("detector '{detector}' has no phases")]
    EmptyPhases { detector: String },

    #[error("detector '{detector}' declares phase {phase} more than once")]
    DuplicatePhase { detector: String, phase: PhaseId },

    #[error("detector '{detector}' references unknown phase {phase}")]
    UnknownPhase { detector: String, phase: PhaseId },

    #[error("phase {phase} of detector '{detector}' has neither a mask nor a custom predicate")]
    MissingPredicate { detector: String, phase: PhaseId },

    #[error("detector '{detector}' has neither a completion mode nor a custom completion check")]
    MissingCompletion { detector: String },

    #[error("detector '{detector}': timing '{field}' must be finite and >= 0, got {value}")]
    InvalidTiming {
        detector: String,
        field: &'static str,
        value: f64,
    },

    #[error("detector '{detector}' requires timing '{field}'")]
    MissingTiming {
        detector: String,
        field: &'static str,
    },

    #[error("detector '{detector}' requires signal '{field}'")]
    MissingSignal {
        detector: String,
        field: &'static str,
    },

    #[error("variant {variant} is not built by the {wiring} wiring")]
    UnsupportedVariant {
        variant: String,
        wiring: &'static str,
    },

    #[error("variant wrapper '{0}' has no branches")]
    EmptyWrapper(String),

    #[error("circuit '{0}' is declared more than once")]
    DuplicateCircuit(RcId),

    #[error("circuit '{from}' links to unknown circuit '{target}'")]
    UnknownLinkTarget { from: RcId, target: RcId },

    #[error("signal '{signal}' references unknown circuit '{circuit}'")]
    UnknownSignalSection { signal: SignalId, circuit: RcId },

    #[error("unknown circuit '{0}'")]
    UnknownCircuit(RcId),

    #[error("no controlled circuits configured")]
    NoControlledCircuits,

    #[error("circuit '{0}' is configured for detection more than once")]
    DuplicateControlledCircuit(RcId),

    #[error("latch window T_PK must be finite and >= 0, got {0}")]
    InvalidLatchWindow(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("controlled circuit '{0}' is not present in the station model")]
pub struct MissingTopologyError(pub RcId);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Topology(#[from] MissingTopologyError),
}
