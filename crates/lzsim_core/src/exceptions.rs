//! Abort exceptions: a fixed set of kinds, the context that decides which
//! kinds are active for an interval, and the policy that attaches kinds to
//! detector phases at construction.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::states::rc_is_occupied;
use crate::variants::{VariantFamily, VariantId};
use crate::wrapper::DetectorNode;
use crate::{ModeMap, RawState, RcId, ScenarioStep, TimelineStep, TIME_EPS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    LzMuActive,
    LzRecentLs,
    LzDspTimeout,
    LsMuActive,
    LsAfterLz,
    LsDspTimeout,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 6] = [
        ExceptionKind::LzMuActive,
        ExceptionKind::LzRecentLs,
        ExceptionKind::LzDspTimeout,
        ExceptionKind::LsMuActive,
        ExceptionKind::LsAfterLz,
        ExceptionKind::LsDspTimeout,
    ];

    /// Mode-map key under which this kind is published.
    pub fn key(self) -> &'static str {
        match self {
            ExceptionKind::LzMuActive => "exc_lz_mu_active",
            ExceptionKind::LzRecentLs => "exc_lz_recent_ls",
            ExceptionKind::LzDspTimeout => "exc_lz_dsp_timeout",
            ExceptionKind::LsMuActive => "exc_ls_mu_active",
            ExceptionKind::LsAfterLz => "exc_ls_after_lz",
            ExceptionKind::LsDspTimeout => "exc_ls_dsp_timeout",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Small bit set of exception kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExceptionSet(u8);

impl ExceptionSet {
    pub const EMPTY: ExceptionSet = ExceptionSet(0);

    pub fn insert(&mut self, kind: ExceptionKind) {
        self.0 |= kind.bit();
    }

    #[must_use]
    pub fn with(mut self, kind: ExceptionKind) -> Self {
        self.insert(kind);
        self
    }

    #[must_use]
    pub fn union(self, other: ExceptionSet) -> Self {
        ExceptionSet(self.0 | other.0)
    }

    pub fn contains(self, kind: ExceptionKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn intersects(self, other: ExceptionSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = ExceptionKind> {
        ExceptionKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }

    /// Kinds whose key is set truthy in a free-form mode map.
    pub fn from_modes(modes: &ModeMap) -> Self {
        modes
            .iter()
            .filter(|(_, value)| value.is_truthy())
            .filter_map(|(key, _)| ExceptionKind::from_key(key))
            .collect()
    }

    pub fn publish(self, modes: &mut ModeMap) {
        for kind in ExceptionKind::ALL {
            modes.insert(kind.key().to_string(), self.contains(kind).into());
        }
    }
}

impl FromIterator<ExceptionKind> for ExceptionSet {
    fn from_iter<I: IntoIterator<Item = ExceptionKind>>(iter: I) -> Self {
        let mut set = ExceptionSet::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExceptionsConfig {
    pub enable_lz_exc_mu: bool,
    pub enable_lz_exc_recent_ls: bool,
    pub enable_lz_exc_dsp: bool,
    pub enable_ls_exc_mu: bool,
    pub enable_ls_exc_after_lz: bool,
    pub enable_ls_exc_dsp: bool,
    /// LZ variant codes the dispatcher exception applies to. Empty means all.
    pub lz_exc_dsp_variants: Vec<u16>,
    pub t_mu: f64,
    pub t_recent_ls: f64,
    pub t_min_maneuver_v8: f64,
    pub t_ls_mu: f64,
    pub t_ls_after_lz: f64,
    pub t_ls_dsp: f64,
}

impl Default for ExceptionsConfig {
    fn default() -> Self {
        Self {
            enable_lz_exc_mu: false,
            enable_lz_exc_recent_ls: false,
            enable_lz_exc_dsp: false,
            enable_ls_exc_mu: false,
            enable_ls_exc_after_lz: false,
            enable_ls_exc_dsp: false,
            lz_exc_dsp_variants: Vec::new(),
            t_mu: 15.0,
            t_recent_ls: 30.0,
            t_min_maneuver_v8: 600.0,
            t_ls_mu: 15.0,
            t_ls_after_lz: 30.0,
            t_ls_dsp: 600.0,
        }
    }
}

impl ExceptionsConfig {
    fn horizon(&self) -> f64 {
        [
            self.t_mu,
            self.t_recent_ls,
            self.t_min_maneuver_v8,
            self.t_ls_mu,
            self.t_ls_after_lz,
            self.t_ls_dsp,
        ]
        .into_iter()
        .filter(|t| t.is_finite())
        .fold(0.0, f64::max)
    }
}

// ---------------------------------------------------------------------------
// Phase policy
// ---------------------------------------------------------------------------

/// Attach the enabled abort kinds to a freshly built variant.
///
/// Mu/recent/after-LZ kinds guard only the final (opening) phase. The LZ
/// dispatcher kind guards every formation phase, optionally limited to the
/// variants listed in `lz_exc_dsp_variants`.
pub fn apply_phase_exception_policy(
    node: &mut DetectorNode,
    variant: VariantId,
    cfg: &ExceptionsConfig,
) {
    let mut final_phase = ExceptionSet::EMPTY;
    let mut every_phase = ExceptionSet::EMPTY;
    match variant.family() {
        VariantFamily::Lz => {
            if cfg.enable_lz_exc_mu {
                final_phase.insert(ExceptionKind::LzMuActive);
            }
            if cfg.enable_lz_exc_recent_ls {
                final_phase.insert(ExceptionKind::LzRecentLs);
            }
            let dsp_selected = cfg.lz_exc_dsp_variants.is_empty()
                || cfg.lz_exc_dsp_variants.contains(&variant.code());
            if cfg.enable_lz_exc_dsp && dsp_selected {
                every_phase.insert(ExceptionKind::LzDspTimeout);
            }
        }
        VariantFamily::Ls => {
            if cfg.enable_ls_exc_mu {
                final_phase.insert(ExceptionKind::LsMuActive);
            }
            if cfg.enable_ls_exc_after_lz {
                final_phase.insert(ExceptionKind::LsAfterLz);
            }
            if cfg.enable_ls_exc_dsp {
                final_phase.insert(ExceptionKind::LsDspTimeout);
            }
        }
    }
    if !(final_phase.is_empty() && every_phase.is_empty()) {
        node.attach_exceptions(every_phase, final_phase);
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StepSample {
    end: f64,
    mu: BTreeMap<RcId, RawState>,
    ctrl_occupied: bool,
}

#[derive(Debug, Clone)]
struct FlagSample {
    end: f64,
    has_ls: bool,
    has_lz: bool,
}

/// Derives active exception kinds for one controlled circuit from bounded
/// scenario and timeline history windows.
#[derive(Debug, Clone)]
pub struct ExceptionMonitor {
    ctrl: RcId,
    scenario: VecDeque<StepSample>,
    timeline: VecDeque<FlagSample>,
    scenario_clock: f64,
    timeline_clock: f64,
    last_prev: Option<RcId>,
    last_next: Option<RcId>,
}

impl ExceptionMonitor {
    pub fn new(ctrl: RcId) -> Self {
        Self {
            ctrl,
            scenario: VecDeque::new(),
            timeline: VecDeque::new(),
            scenario_clock: 0.0,
            timeline_clock: 0.0,
            last_prev: None,
            last_next: None,
        }
    }

    /// Record `step` and return the kinds active for it. Kinds set truthy in
    /// the step's own mode map are always included.
    pub fn evaluate(&mut self, step: &ScenarioStep, cfg: &ExceptionsConfig) -> ExceptionSet {
        let dt = step.duration.max(0.0);
        self.scenario_clock += dt;
        self.scenario.push_back(StepSample {
            end: self.scenario_clock,
            mu: step.mu.clone(),
            ctrl_occupied: rc_is_occupied(step.rc_states.get(&self.ctrl).copied().unwrap_or(0)),
        });
        self.trim(cfg.horizon());

        let dsp_manoeuvre = step.dispatcher_state() == Some(4)
            && step.auto_actions.values().any(|v| matches!(v, 0 | 3));

        let mut set = ExceptionSet::from_modes(&step.modes);
        let checks = [
            (
                ExceptionKind::LzMuActive,
                cfg.enable_lz_exc_mu && self.mu_active_within(cfg.t_mu),
            ),
            (
                ExceptionKind::LzRecentLs,
                cfg.enable_lz_exc_recent_ls && self.flag_within(cfg.t_recent_ls, |s| s.has_ls),
            ),
            (
                ExceptionKind::LzDspTimeout,
                cfg.enable_lz_exc_dsp
                    && dsp_manoeuvre
                    && self.occupied_throughout(cfg.t_min_maneuver_v8),
            ),
            (
                ExceptionKind::LsMuActive,
                cfg.enable_ls_exc_mu && self.mu_active_within(cfg.t_ls_mu),
            ),
            (
                ExceptionKind::LsAfterLz,
                cfg.enable_ls_exc_after_lz && self.flag_within(cfg.t_ls_after_lz, |s| s.has_lz),
            ),
            (
                ExceptionKind::LsDspTimeout,
                cfg.enable_ls_exc_dsp && dsp_manoeuvre && self.occupied_throughout(cfg.t_ls_dsp),
            ),
        ];
        for (kind, active) in checks {
            if active {
                set.insert(kind);
            }
        }
        set
    }

    /// Record the timeline entry produced for the step last evaluated.
    pub fn record(&mut self, entry: &TimelineStep) {
        self.timeline_clock += entry.step_duration.max(0.0);
        self.timeline.push_back(FlagSample {
            end: self.timeline_clock,
            has_ls: entry.flags.iter().any(|f| f.starts_with("lls_")),
            has_lz: entry.flags.iter().any(|f| f.starts_with("llz_v")),
        });
        self.last_prev.clone_from(&entry.effective_prev_rc);
        self.last_next.clone_from(&entry.effective_next_rc);
    }

    fn trim(&mut self, horizon: f64) {
        let scenario_floor = self.scenario_clock - horizon;
        while self.scenario.front().is_some_and(|s| s.end < scenario_floor) {
            self.scenario.pop_front();
        }
        let timeline_floor = self.timeline_clock - horizon;
        while self.timeline.front().is_some_and(|s| s.end < timeline_floor) {
            self.timeline.pop_front();
        }
    }

    fn mu_active_within(&self, window: f64) -> bool {
        if window <= 0.0 {
            return false;
        }
        let from = (self.scenario_clock - window).max(0.0);
        let watched: Vec<&RcId> = std::iter::once(&self.ctrl)
            .chain(self.last_prev.iter())
            .chain(self.last_next.iter())
            .collect();
        self.scenario
            .iter()
            .filter(|s| s.end > from)
            .any(|s| {
                watched
                    .iter()
                    .any(|id| matches!(s.mu.get(*id).copied(), Some(1 | 4)))
            })
    }

    fn flag_within(&self, window: f64, has: impl Fn(&FlagSample) -> bool) -> bool {
        if window <= 0.0 {
            return false;
        }
        let from = (self.timeline_clock - window).max(0.0);
        self.timeline.iter().filter(|s| s.end > from).any(has)
    }

    fn occupied_throughout(&self, window: f64) -> bool {
        if window <= 0.0 || self.scenario_clock + TIME_EPS < window {
            return false;
        }
        let from = self.scenario_clock - window;
        let mut overlapping = self.scenario.iter().filter(|s| s.end > from).peekable();
        overlapping.peek().is_some() && overlapping.all(|s| s.ctrl_occupied)
    }
}
