use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::variants::VariantId;

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(RcId);
string_id!(SwitchId);
string_id!(SignalId);

/// Raw state code as reported by the interlocking.
pub type RawState = i32;

pub type RcStates = BTreeMap<RcId, RawState>;
pub type SwitchStates = BTreeMap<SwitchId, RawState>;
pub type SignalStates = BTreeMap<SignalId, RawState>;

// ---------------------------------------------------------------------------
// Mode flags
// ---------------------------------------------------------------------------

/// A free-form mode flag value. Scenario steps carry arbitrary JSON scalars;
/// the driver adds booleans and signal ids of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ModeValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            ModeValue::Null => false,
            ModeValue::Bool(b) => *b,
            ModeValue::Int(i) => *i != 0,
            ModeValue::Float(f) => *f != 0.0 && !f.is_nan(),
            ModeValue::Text(s) => !s.is_empty(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ModeValue::Int(i) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            ModeValue::Float(f) if f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }
}

impl From<bool> for ModeValue {
    fn from(value: bool) -> Self {
        ModeValue::Bool(value)
    }
}

impl From<Option<&SignalId>> for ModeValue {
    fn from(value: Option<&SignalId>) -> Self {
        value.map_or(ModeValue::Null, |id| ModeValue::Text(id.0.clone()))
    }
}

pub type ModeMap = BTreeMap<String, ModeValue>;

// ---------------------------------------------------------------------------
// Scenario input
// ---------------------------------------------------------------------------

/// One coarse scenario interval `[t, t + duration)` with a fixed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    #[serde(alias = "t")]
    pub duration: f64,
    #[serde(default)]
    pub rc_states: RcStates,
    #[serde(default)]
    pub switch_states: SwitchStates,
    #[serde(default)]
    pub signal_states: SignalStates,
    #[serde(default)]
    pub modes: ModeMap,
    /// Local-control (MU) indicator per circuit.
    #[serde(default)]
    pub mu: BTreeMap<RcId, RawState>,
    #[serde(default)]
    pub dispatcher_control_state: Option<RawState>,
    /// Automatic-action indicators, e.g. `nas` / `chas`.
    #[serde(default)]
    pub auto_actions: BTreeMap<String, RawState>,
}

impl ScenarioStep {
    /// Dispatcher state from the dedicated field, falling back to the mode map.
    pub fn dispatcher_state(&self) -> Option<RawState> {
        self.dispatcher_control_state.or_else(|| {
            self.modes
                .get("dispatcher_control_state")
                .and_then(ModeValue::as_int)
                .and_then(|v| RawState::try_from(v).ok())
        })
    }
}

// ---------------------------------------------------------------------------
// Timeline output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Opened,
    Closed,
}

/// A single open/close transition at an absolute simulation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub t: f64,
    pub variant: VariantId,
    pub kind: EventKind,
}

impl DetectionEvent {
    /// The event flag this transition raises, e.g. `lls_1_closed`.
    pub fn flag(&self) -> String {
        let suffix = match self.kind {
            EventKind::Opened => "open",
            EventKind::Closed => "closed",
        };
        format!("{}_{suffix}", self.variant.flag_prefix())
    }
}

/// Result for one controlled circuit over one scenario interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineStep {
    /// Time of the first event in the interval, else the interval start.
    pub t: f64,
    pub step_duration: f64,
    pub ctrl_rc_id: RcId,
    pub effective_prev_rc: Option<RcId>,
    pub effective_next_rc: Option<RcId>,
    pub rc_states: RcStates,
    pub switch_states: SwitchStates,
    pub signal_states: SignalStates,
    pub modes: ModeMap,
    pub lz_state: bool,
    pub lz_variant: u16,
    pub flags: Vec<String>,
    #[serde(default)]
    pub events: Vec<DetectionEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mu_state: Option<RawState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nas_state: Option<RawState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chas_state: Option<RawState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsp_state: Option<RawState>,
}
