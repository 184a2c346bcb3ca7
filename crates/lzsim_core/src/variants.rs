//! Variant catalog: declarative wiring of every supported fault variant.
//!
//! A variant is enabled by giving it timings in [`DetectorsConfig`]. Phase
//! shapes are fixed; only durations and signal overrides are configurable.

use serde::{Deserialize, Serialize};

use crate::detector::CompletionMode::{self, FreeTime, OccupiedTime};
use crate::detector::{Detector, DetectorConfig, NextPhase, PhaseConfig, PhaseId};
use crate::exceptions::ExceptionsConfig;
use crate::predicate::NeighborRequirement::{self, Both, OneAdj, OneNc, OnlyCtrl, Unconstrained};
use crate::coincidence::{CoincidenceConfig, CoincidenceDetector};
use crate::predicate::{Aspect, GuardStage, Mask, Side};
use crate::window::{TimedWindowConfig, TimedWindowDetector};
use crate::wrapper::{DetectorNode, VariantWrapper};
use crate::{ConfigError, RcId, SignalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantFamily {
    /// False occupancy.
    Lz,
    /// False clear.
    Ls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantId {
    Lz1,
    Lz2,
    Lz3,
    Lz5,
    Lz6,
    Lz7,
    Lz8,
    Lz9,
    Lz10,
    Lz11,
    Lz12,
    Lz13,
    Ls1,
    Ls2,
    Ls4,
    Ls5,
    Ls6,
    Ls9,
}

impl VariantId {
    pub const ALL: [VariantId; 18] = [
        VariantId::Lz1,
        VariantId::Lz2,
        VariantId::Lz3,
        VariantId::Lz5,
        VariantId::Lz6,
        VariantId::Lz7,
        VariantId::Lz8,
        VariantId::Lz9,
        VariantId::Lz10,
        VariantId::Lz11,
        VariantId::Lz12,
        VariantId::Lz13,
        VariantId::Ls1,
        VariantId::Ls2,
        VariantId::Ls4,
        VariantId::Ls5,
        VariantId::Ls6,
        VariantId::Ls9,
    ];

    /// Numeric id; false-clear variants are offset by 100 so they outrank
    /// every false-occupancy variant.
    pub fn code(self) -> u16 {
        match self {
            VariantId::Lz1 => 1,
            VariantId::Lz2 => 2,
            VariantId::Lz3 => 3,
            VariantId::Lz5 => 5,
            VariantId::Lz6 => 6,
            VariantId::Lz7 => 7,
            VariantId::Lz8 => 8,
            VariantId::Lz9 => 9,
            VariantId::Lz10 => 10,
            VariantId::Lz11 => 11,
            VariantId::Lz12 => 12,
            VariantId::Lz13 => 13,
            VariantId::Ls1 => 101,
            VariantId::Ls2 => 102,
            VariantId::Ls4 => 104,
            VariantId::Ls5 => 105,
            VariantId::Ls6 => 106,
            VariantId::Ls9 => 109,
        }
    }

    pub fn family(self) -> VariantFamily {
        if self.code() > 100 {
            VariantFamily::Ls
        } else {
            VariantFamily::Lz
        }
    }

    /// Config key, e.g. `lz1`.
    pub fn key(self) -> String {
        match self.family() {
            VariantFamily::Lz => format!("lz{}", self.code()),
            VariantFamily::Ls => format!("ls{}", self.code() - 100),
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.key() == key)
    }

    /// Prefix of the event flags, e.g. `llz_v1` or `lls_4`.
    pub fn flag_prefix(self) -> String {
        match self.family() {
            VariantFamily::Lz => format!("llz_v{}", self.code()),
            VariantFamily::Ls => format!("lls_{}", self.code() - 100),
        }
    }

    pub fn label(self) -> String {
        self.key().to_uppercase()
    }
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

// ---------------------------------------------------------------------------
// Timings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub ts01: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts02: Option<f64>,
    pub tlz: f64,
    pub tkon: f64,
}

impl PhaseTimings {
    pub fn new(ts01: f64, tlz: f64, tkon: f64) -> Self {
        Self {
            ts01,
            ts02: None,
            tlz,
            tkon,
        }
    }

    #[must_use]
    pub fn with_ts02(mut self, ts02: f64) -> Self {
        self.ts02 = Some(ts02);
        self
    }

    fn ts02(&self, variant: VariantId) -> Result<f64, ConfigError> {
        self.ts02.ok_or(ConfigError::MissingTiming {
            detector: variant.label(),
            field: "ts02",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalGuardTimings {
    #[serde(flatten)]
    pub timings: PhaseTimings,
    /// Signal guarding the prev side; resolved from the routes when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_prev: Option<SignalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_next: Option<SignalId>,
}

/// Route-signal timings: an extra `ts03` stage and the signal of each
/// direction. A direction without a signal gets no branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSignalTimings {
    #[serde(flatten)]
    pub timings: PhaseTimings,
    pub ts03: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_to_next: Option<SignalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_to_prev: Option<SignalId>,
}

/// Timings plus the two signals that must stay closed; an unset signal
/// counts as closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPairTimings {
    #[serde(flatten)]
    pub timings: PhaseTimings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_a: Option<SignalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_b: Option<SignalId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowTimings {
    pub ts01: f64,
    pub tlz01: f64,
    pub tlz02: f64,
    /// Length of the trailing `111`; defaults to `tlz02`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts02: Option<f64>,
    pub tkon: f64,
}

/// Per-controlled-circuit detector configuration. Consumed once when the
/// detectors are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorsConfig {
    pub ctrl_rc_id: RcId,
    /// Statically configured neighbors, used where a variant needs to know
    /// which sides exist at all.
    #[serde(default)]
    pub prev_rc_id: Option<RcId>,
    #[serde(default)]
    pub next_rc_id: Option<RcId>,
    #[serde(default)]
    pub lz1: Option<PhaseTimings>,
    #[serde(default)]
    pub lz2: Option<PhaseTimings>,
    #[serde(default)]
    pub lz3: Option<PhaseTimings>,
    #[serde(default)]
    pub lz5: Option<PhaseTimings>,
    #[serde(default)]
    pub lz6: Option<PhaseTimings>,
    #[serde(default)]
    pub lz7: Option<PhaseTimings>,
    #[serde(default)]
    pub lz8: Option<PhaseTimings>,
    #[serde(default)]
    pub lz9: Option<PhaseTimings>,
    #[serde(default)]
    pub lz10: Option<RouteSignalTimings>,
    #[serde(default)]
    pub lz11: Option<SignalPairTimings>,
    #[serde(default)]
    pub lz12: Option<PhaseTimings>,
    #[serde(default)]
    pub lz13: Option<SignalGuardTimings>,
    #[serde(default)]
    pub ls1: Option<PhaseTimings>,
    #[serde(default)]
    pub ls2: Option<PhaseTimings>,
    #[serde(default)]
    pub ls4: Option<WindowTimings>,
    #[serde(default)]
    pub ls5: Option<PhaseTimings>,
    /// Only `sig_prev` is read: the signal that clears onto the controlled
    /// circuit from its unlinked end.
    #[serde(default)]
    pub ls6: Option<SignalGuardTimings>,
    #[serde(default)]
    pub ls9: Option<PhaseTimings>,
    #[serde(default)]
    pub exceptions: ExceptionsConfig,
}

impl DetectorsConfig {
    pub fn new(ctrl_rc_id: RcId) -> Self {
        Self {
            ctrl_rc_id,
            prev_rc_id: None,
            next_rc_id: None,
            lz1: None,
            lz2: None,
            lz3: None,
            lz5: None,
            lz6: None,
            lz7: None,
            lz8: None,
            lz9: None,
            lz10: None,
            lz11: None,
            lz12: None,
            lz13: None,
            ls1: None,
            ls2: None,
            ls4: None,
            ls5: None,
            ls6: None,
            ls9: None,
            exceptions: ExceptionsConfig::default(),
        }
    }

    pub fn is_enabled(&self, variant: VariantId) -> bool {
        match variant {
            VariantId::Ls4 => self.ls4.is_some(),
            other => self.phase_timings(other).is_some(),
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = VariantId> + '_ {
        VariantId::ALL.into_iter().filter(|v| self.is_enabled(*v))
    }

    /// Timings of a phase-chain variant. `None` for the window variant.
    pub fn phase_timings(&self, variant: VariantId) -> Option<&PhaseTimings> {
        match variant {
            VariantId::Lz1 => self.lz1.as_ref(),
            VariantId::Lz2 => self.lz2.as_ref(),
            VariantId::Lz3 => self.lz3.as_ref(),
            VariantId::Lz5 => self.lz5.as_ref(),
            VariantId::Lz6 => self.lz6.as_ref(),
            VariantId::Lz7 => self.lz7.as_ref(),
            VariantId::Lz8 => self.lz8.as_ref(),
            VariantId::Lz9 => self.lz9.as_ref(),
            VariantId::Lz10 => self.lz10.as_ref().map(|r| &r.timings),
            VariantId::Lz11 => self.lz11.as_ref().map(|p| &p.timings),
            VariantId::Lz12 => self.lz12.as_ref(),
            VariantId::Lz13 => self.lz13.as_ref().map(|g| &g.timings),
            VariantId::Ls1 => self.ls1.as_ref(),
            VariantId::Ls2 => self.ls2.as_ref(),
            VariantId::Ls5 => self.ls5.as_ref(),
            VariantId::Ls6 => self.ls6.as_ref().map(|g| &g.timings),
            VariantId::Ls9 => self.ls9.as_ref(),
            VariantId::Ls4 => None,
        }
    }

    pub fn phase_timings_mut(&mut self, variant: VariantId) -> Option<&mut PhaseTimings> {
        match variant {
            VariantId::Lz1 => self.lz1.as_mut(),
            VariantId::Lz2 => self.lz2.as_mut(),
            VariantId::Lz3 => self.lz3.as_mut(),
            VariantId::Lz5 => self.lz5.as_mut(),
            VariantId::Lz6 => self.lz6.as_mut(),
            VariantId::Lz7 => self.lz7.as_mut(),
            VariantId::Lz8 => self.lz8.as_mut(),
            VariantId::Lz9 => self.lz9.as_mut(),
            VariantId::Lz10 => self.lz10.as_mut().map(|r| &mut r.timings),
            VariantId::Lz11 => self.lz11.as_mut().map(|p| &mut p.timings),
            VariantId::Lz12 => self.lz12.as_mut(),
            VariantId::Lz13 => self.lz13.as_mut().map(|g| &mut g.timings),
            VariantId::Ls1 => self.ls1.as_mut(),
            VariantId::Ls2 => self.ls2.as_mut(),
            VariantId::Ls5 => self.ls5.as_mut(),
            VariantId::Ls6 => self.ls6.as_mut().map(|g| &mut g.timings),
            VariantId::Ls9 => self.ls9.as_mut(),
            VariantId::Ls4 => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

struct Chain {
    requirement: NeighborRequirement,
    reset_on_exit: bool,
}

impl Chain {
    const fn new(requirement: NeighborRequirement, reset_on_exit: bool) -> Self {
        Self {
            requirement,
            reset_on_exit,
        }
    }

    /// Phases `0..n`, each leading to the next; the last one opens.
    fn phases(&self, stages: Vec<(Mask, f64)>) -> Vec<PhaseConfig> {
        let last = stages.len().saturating_sub(1);
        stages
            .into_iter()
            .enumerate()
            .map(|(i, (mask, duration))| {
                let next = if i == last {
                    NextPhase::Open
                } else {
                    NextPhase::Phase(phase_id(i + 1))
                };
                PhaseConfig::new(phase_id(i), duration, next)
                    .mask(mask)
                    .requires(self.requirement)
                    .reset_on_exit(self.reset_on_exit)
            })
            .collect()
    }

    fn detector(
        &self,
        name: impl Into<String>,
        ctrl: &RcId,
        t_kon: f64,
        completion: CompletionMode,
        stages: Vec<(Mask, f64)>,
    ) -> Result<Detector, ConfigError> {
        let config = self
            .phases(stages)
            .into_iter()
            .fold(DetectorConfig::new(name, t_kon, completion), DetectorConfig::phase);
        Detector::new(config, ctrl.clone())
    }
}

fn phase_id(index: usize) -> PhaseId {
    PhaseId::try_from(index).unwrap_or(PhaseId::MAX)
}

fn branched(
    variant: VariantId,
    chain: &Chain,
    ctrl: &RcId,
    t_kon: f64,
    completion: CompletionMode,
    branches: Vec<(&str, Vec<(Mask, f64)>)>,
) -> Result<DetectorNode, ConfigError> {
    let label = variant.label();
    let detectors = branches
        .into_iter()
        .map(|(branch, stages)| {
            chain
                .detector(format!("{label}/{branch}"), ctrl, t_kon, completion, stages)
                .map(DetectorNode::Simple)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DetectorNode::MultiBranch(VariantWrapper::new(label, detectors)?))
}

/// Build one variant for `cfg.ctrl_rc_id`. `Ok(None)` when the variant is
/// not configured.
pub fn build_variant(
    variant: VariantId,
    cfg: &DetectorsConfig,
) -> Result<Option<DetectorNode>, ConfigError> {
    if variant == VariantId::Ls4 {
        return cfg.ls4.as_ref().map(|w| build_window(w, cfg)).transpose();
    }
    let Some(timings) = cfg.phase_timings(variant) else {
        return Ok(None);
    };
    let node = match variant {
        VariantId::Lz1 | VariantId::Lz3 | VariantId::Lz5 | VariantId::Lz6 | VariantId::Lz11 => {
            wire_simple_lz(variant, timings, cfg)?
        }
        VariantId::Lz2 | VariantId::Lz7 | VariantId::Lz8 | VariantId::Lz12 => {
            wire_branched_lz(variant, timings, cfg)?
        }
        VariantId::Lz9 => build_coincidence(timings, cfg)?,
        VariantId::Lz10 => wire_route_signal(timings, cfg)?,
        VariantId::Lz13 => wire_guarded(timings, cfg)?,
        VariantId::Ls1 | VariantId::Ls2 | VariantId::Ls9 => wire_ls(variant, timings, cfg)?,
        VariantId::Ls5 | VariantId::Ls6 => wire_locked_ls(variant, timings, cfg)?,
        VariantId::Ls4 => return Err(unsupported(variant, "phase-chain")),
    };
    Ok(Some(node))
}

fn unsupported(variant: VariantId, wiring: &'static str) -> ConfigError {
    ConfigError::UnsupportedVariant {
        variant: variant.label(),
        wiring,
    }
}

fn build_window(w: &WindowTimings, cfg: &DetectorsConfig) -> Result<DetectorNode, ConfigError> {
    let config = TimedWindowConfig {
        name: VariantId::Ls4.label(),
        ts01: w.ts01,
        tlz01: w.tlz01,
        tlz02: w.tlz02,
        ts02: w.ts02.unwrap_or(w.tlz02),
        tkon: w.tkon,
    };
    let detector = TimedWindowDetector::new(config, cfg.ctrl_rc_id.clone())?;
    Ok(DetectorNode::TimedWindow(detector))
}

fn build_coincidence(t: &PhaseTimings, cfg: &DetectorsConfig) -> Result<DetectorNode, ConfigError> {
    let config = CoincidenceConfig {
        name: VariantId::Lz9.label(),
        ts01: t.ts01,
        tlz: t.tlz,
        tkon: t.tkon,
    };
    let detector = CoincidenceDetector::new(config, cfg.ctrl_rc_id.clone())?;
    Ok(DetectorNode::Coincidence(detector))
}

/// Wrap `base` so it also needs `signal` to show `aspect`.
fn with_signal(base: Mask, signal: &SignalId, aspect: Aspect) -> Mask {
    Mask::WithSignal {
        base: Box::new(base),
        signal: signal.clone(),
        aspect,
    }
}

pub(crate) fn wire_simple_lz(
    variant: VariantId,
    t: &PhaseTimings,
    cfg: &DetectorsConfig,
) -> Result<DetectorNode, ConfigError> {
    let (chain, stages) = match variant {
        VariantId::Lz1 => (
            Chain::new(Both, true),
            vec![(Mask::Rc000, t.ts01), (Mask::Rc010, t.tlz)],
        ),
        VariantId::Lz3 => (
            Chain::new(Both, true),
            vec![
                (Mask::Rc101, t.ts01),
                (Mask::Rc111, t.tlz),
                (Mask::Rc101, t.ts02(variant)?),
            ],
        ),
        VariantId::Lz5 => (
            Chain::new(OnlyCtrl, false),
            vec![
                (Mask::CtrlFreeUnlocked, t.ts01),
                (Mask::CtrlOccupiedUnlocked, t.tlz),
            ],
        ),
        VariantId::Lz6 => (
            Chain::new(OnlyCtrl, true),
            vec![(Mask::CtrlFree, t.ts01), (Mask::CtrlOccupied, t.tlz)],
        ),
        VariantId::Lz11 => {
            // Both signals stay closed while the circuit drops; unset ones read closed.
            let signals: Vec<SignalId> = cfg
                .lz11
                .iter()
                .flat_map(|p| [p.sig_a.clone(), p.sig_b.clone()])
                .flatten()
                .collect();
            let closed = |base: Mask| {
                signals
                    .iter()
                    .fold(base, |mask, signal| with_signal(mask, signal, Aspect::Closed))
            };
            (
                Chain::new(Both, true),
                vec![(closed(Mask::CtrlFree), t.ts01), (closed(Mask::CtrlOccupied), t.tlz)],
            )
        }
        other => return Err(unsupported(other, "simple false-occupancy")),
    };
    let detector = chain.detector(variant.label(), &cfg.ctrl_rc_id, t.tkon, FreeTime, stages)?;
    Ok(DetectorNode::Simple(detector))
}

pub(crate) fn wire_branched_lz(
    variant: VariantId,
    t: &PhaseTimings,
    cfg: &DetectorsConfig,
) -> Result<DetectorNode, ConfigError> {
    let (ts01, tlz) = (t.ts01, t.tlz);
    let (chain, branches) = match variant {
        VariantId::Lz7 => (
            Chain::new(Unconstrained, true),
            vec![
                ("isolated", vec![(Mask::RcX0X, ts01), (Mask::RcX1X, tlz)]),
                ("no_prev", vec![(Mask::Rc00X, ts01), (Mask::Rc01X, tlz)]),
                ("no_next", vec![(Mask::RcX00, ts01), (Mask::RcX10, tlz)]),
            ],
        ),
        VariantId::Lz2 => {
            let ts02 = t.ts02(variant)?;
            (
                Chain::new(Both, true),
                vec![
                    (
                        "prev",
                        vec![(Mask::Rc100, ts01), (Mask::Rc110, tlz), (Mask::Rc100Or000, ts02)],
                    ),
                    (
                        "next",
                        vec![(Mask::Rc001, ts01), (Mask::Rc011, tlz), (Mask::Rc001Or000, ts02)],
                    ),
                ],
            )
        }
        VariantId::Lz8 => {
            let ts02 = t.ts02(variant)?;
            (
                Chain::new(Both, true),
                vec![
                    (
                        "from_prev",
                        vec![
                            (Mask::Rc110Or111, ts01),
                            (Mask::Rc011Or111, ts02),
                            (Mask::Rc010, tlz),
                        ],
                    ),
                    (
                        "from_next",
                        vec![
                            (Mask::Rc011Or111, ts01),
                            (Mask::Rc01XOrX10, ts02),
                            (Mask::Rc010, tlz),
                        ],
                    ),
                    (
                        "bounce",
                        vec![(Mask::Rc010, ts01), (Mask::Rc011, ts02), (Mask::Rc010, tlz)],
                    ),
                ],
            )
        }
        VariantId::Lz12 => {
            let ts02 = t.ts02(variant)?;
            (
                Chain::new(OneNc, false),
                vec![
                    (
                        "prev_nc",
                        vec![
                            (Mask::PrevNcNextFreeLocked, ts01),
                            (Mask::PrevNcNextOccupiedLocked, ts02),
                            (Mask::PrevNcNextFreeLocked, tlz),
                        ],
                    ),
                    (
                        "next_nc",
                        vec![
                            (Mask::NextNcPrevFreeLocked, ts01),
                            (Mask::NextNcPrevOccupiedLocked, ts02),
                            (Mask::NextNcPrevFreeLocked, tlz),
                        ],
                    ),
                ],
            )
        }
        other => return Err(unsupported(other, "branched false-occupancy")),
    };
    branched(variant, &chain, &cfg.ctrl_rc_id, t.tkon, FreeTime, branches)
}

/// One branch per direction that has a route signal: the signal clears, the
/// train reaches the far neighbor, the signal drops behind it and the
/// controlled circuit stays occupied between two free neighbors.
fn wire_route_signal(t: &PhaseTimings, cfg: &DetectorsConfig) -> Result<DetectorNode, ConfigError> {
    let variant = VariantId::Lz10;
    let ts02 = t.ts02(variant)?;
    let (ts03, to_next, to_prev) = cfg
        .lz10
        .as_ref()
        .map(|r| (r.ts03, r.sig_to_next.clone(), r.sig_to_prev.clone()))
        .unwrap_or_default();
    let mut branches = Vec::new();
    if cfg.prev_rc_id.is_some() && cfg.next_rc_id.is_some() {
        for (branch, signal, through) in
            [("to_next", to_next, Mask::Rc011), ("to_prev", to_prev, Mask::Rc110)]
        {
            let Some(signal) = signal else { continue };
            branches.push((
                branch,
                vec![
                    (with_signal(Mask::Rc010Linked, &signal, Aspect::Open), t.ts01),
                    (with_signal(through.clone(), &signal, Aspect::Open), ts02),
                    (with_signal(through, &signal, Aspect::Closed), ts03),
                    (with_signal(Mask::Rc010Linked, &signal, Aspect::Closed), t.tlz),
                ],
            ));
        }
    }
    branched(variant, &Chain::new(OnlyCtrl, true), &cfg.ctrl_rc_id, t.tkon, FreeTime, branches)
}

/// One branch per side, each watching an approach behind a closed signal.
fn wire_guarded(t: &PhaseTimings, cfg: &DetectorsConfig) -> Result<DetectorNode, ConfigError> {
    let variant = VariantId::Lz13;
    let ts02 = t.ts02(variant)?;
    let (sig_prev, sig_next) = cfg
        .lz13
        .as_ref()
        .map(|g| (g.sig_prev.clone(), g.sig_next.clone()))
        .unwrap_or_default();
    let stages = |side: Side, signal: Option<SignalId>| {
        let guard = |stage: GuardStage| Mask::Guarded {
            side,
            stage,
            signal: signal.clone(),
        };
        vec![
            (guard(GuardStage::AdjacentFreeLocked), t.ts01),
            (guard(GuardStage::AdjacentOccupied), ts02),
            (guard(GuardStage::BothOccupied), t.tlz),
        ]
    };
    branched(
        variant,
        &Chain::new(OneAdj, true),
        &cfg.ctrl_rc_id,
        t.tkon,
        FreeTime,
        vec![
            ("prev", stages(Side::Prev, sig_prev)),
            ("next", stages(Side::Next, sig_next)),
        ],
    )
}

pub(crate) fn wire_ls(
    variant: VariantId,
    t: &PhaseTimings,
    cfg: &DetectorsConfig,
) -> Result<DetectorNode, ConfigError> {
    let ctrl = &cfg.ctrl_rc_id;
    match variant {
        VariantId::Ls1 => {
            let detector = Chain::new(Both, true).detector(
                variant.label(),
                ctrl,
                t.tkon,
                OccupiedTime,
                vec![(Mask::Rc010, t.ts01), (Mask::Rc000, t.tlz)],
            )?;
            Ok(DetectorNode::Simple(detector))
        }
        VariantId::Ls2 => {
            // Only sides that are statically configured get a branch.
            let ts02 = t.ts02(variant)?;
            let mut branches = Vec::new();
            if cfg.prev_rc_id.is_some() {
                branches.push((
                    "prev",
                    vec![(Mask::Rc110, t.ts01), (Mask::Rc100, t.tlz), (Mask::Rc110, ts02)],
                ));
            }
            if cfg.next_rc_id.is_some() {
                branches.push((
                    "next",
                    vec![(Mask::Rc011, t.ts01), (Mask::Rc001, t.tlz), (Mask::Rc011, ts02)],
                ));
            }
            branched(variant, &Chain::new(Both, false), ctrl, t.tkon, FreeTime, branches)
        }
        VariantId::Ls9 => {
            let detector = Chain::new(OnlyCtrl, true).detector(
                variant.label(),
                ctrl,
                t.tkon,
                OccupiedTime,
                vec![
                    (Mask::CtrlOccupied, t.ts01),
                    (Mask::CtrlFree, t.tlz),
                    (Mask::CtrlOccupied, t.tlz),
                ],
            )?;
            Ok(DetectorNode::Simple(detector))
        }
        other => Err(unsupported(other, "false-clear")),
    }
}

/// False-clear chains over locked circuits: the controlled circuit reads
/// free and locked while the route around it is held.
pub(crate) fn wire_locked_ls(
    variant: VariantId,
    t: &PhaseTimings,
    cfg: &DetectorsConfig,
) -> Result<DetectorNode, ConfigError> {
    let ctrl = &cfg.ctrl_rc_id;
    match variant {
        VariantId::Ls5 => {
            let mut branches = Vec::new();
            if cfg.prev_rc_id.is_some() && cfg.next_rc_id.is_some() {
                branches.push((
                    "prev",
                    vec![(Mask::LockedPrevOccupied, t.ts01), (Mask::LockedBothOccupied, t.tlz)],
                ));
                branches.push((
                    "next",
                    vec![(Mask::LockedNextOccupied, t.ts01), (Mask::LockedBothOccupied, t.tlz)],
                ));
            }
            branched(variant, &Chain::new(Both, false), ctrl, t.tkon, OccupiedTime, branches)
        }
        VariantId::Ls6 => {
            let Some(signal) = cfg.ls6.as_ref().and_then(|g| g.sig_prev.clone()) else {
                return Err(ConfigError::MissingSignal {
                    detector: variant.label(),
                    field: "sig_prev",
                });
            };
            let approach = |nc: Side| {
                let waiting = Mask::NcLockedApproach {
                    nc,
                    adjacent_occupied: false,
                };
                let entered = Mask::NcLockedApproach {
                    nc,
                    adjacent_occupied: true,
                };
                vec![(with_signal(waiting, &signal, Aspect::Open), t.ts01), (entered, t.tlz)]
            };
            branched(
                variant,
                &Chain::new(OneNc, true),
                ctrl,
                t.tkon,
                OccupiedTime,
                vec![("prev_nc", approach(Side::Prev)), ("next_nc", approach(Side::Next))],
            )
        }
        other => Err(unsupported(other, "locked false-clear")),
    }
}
