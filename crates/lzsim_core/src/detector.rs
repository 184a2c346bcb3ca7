//! Declarative phase state machine shared by every fault variant.
//!
//! A detector is either forming (walking its phases while their conditions
//! hold for the configured durations) or active (a fault is open and the
//! completion rule decides when it closes). Time inside one `update` call is
//! consumed exactly, so the same physical history gives the same transitions
//! however finely the caller slices it.

use smallvec::SmallVec;
use std::fmt;

use crate::exceptions::{ExceptionKind, ExceptionSet};
use crate::predicate::{Mask, NeighborRequirement, Predicate, TickView};
use crate::states::{rc_is_free, rc_is_occupied};
use crate::{ConfigError, EventKind, RcId};

pub type PhaseId = u16;

/// Tolerance for simulation-time comparisons.
pub const TIME_EPS: f64 = 1e-9;

/// Upper bound on phase transitions processed in one `update` call.
pub const MAX_FORMATION_SEGMENTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NextPhase {
    Phase(PhaseId),
    /// Final phase: completing it opens the fault.
    Open,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimerMode {
    /// Any failing tick resets the phase timer to zero.
    #[default]
    Continuous,
    /// Failing ticks leave the timer untouched.
    Cumulative,
}

#[derive(Debug)]
pub struct PhaseConfig {
    pub id: PhaseId,
    pub duration: f64,
    pub next: NextPhase,
    pub timer_mode: TimerMode,
    pub reset_on_exit: bool,
    /// Return to the initial phase when an abort exception fires.
    pub reset_on_exception: bool,
    pub requirement: NeighborRequirement,
    pub predicate: Option<Box<dyn Predicate>>,
    pub abort: ExceptionSet,
}

impl PhaseConfig {
    pub fn new(id: PhaseId, duration: f64, next: NextPhase) -> Self {
        Self {
            id,
            duration,
            next,
            timer_mode: TimerMode::Continuous,
            reset_on_exit: false,
            reset_on_exception: true,
            requirement: NeighborRequirement::Unconstrained,
            predicate: None,
            abort: ExceptionSet::EMPTY,
        }
    }

    #[must_use]
    pub fn mask(self, mask: Mask) -> Self {
        self.predicate(mask)
    }

    #[must_use]
    pub fn predicate(mut self, predicate: impl Predicate + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    #[must_use]
    pub fn requires(mut self, requirement: NeighborRequirement) -> Self {
        self.requirement = requirement;
        self
    }

    #[must_use]
    pub fn timer_mode(mut self, mode: TimerMode) -> Self {
        self.timer_mode = mode;
        self
    }

    #[must_use]
    pub fn reset_on_exit(mut self, reset: bool) -> Self {
        self.reset_on_exit = reset;
        self
    }

    #[must_use]
    pub fn reset_on_exception(mut self, reset: bool) -> Self {
        self.reset_on_exception = reset;
        self
    }

    #[must_use]
    pub fn abort_on(mut self, kind: ExceptionKind) -> Self {
        self.abort.insert(kind);
        self
    }

    pub fn is_final(&self) -> bool {
        self.next == NextPhase::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionMode {
    /// Close after the controlled circuit has been free for `t_kon`.
    FreeTime,
    /// Close after the controlled circuit has been occupied for `t_kon`.
    OccupiedTime,
}

pub trait CompletionCheck: fmt::Debug + Send + Sync {
    fn holds(&self, view: &TickView<'_>, ctrl: &RcId) -> bool;
}

#[derive(Debug)]
pub enum CompletionRule {
    Mode(CompletionMode),
    Custom(Box<dyn CompletionCheck>),
}

impl CompletionRule {
    /// An empty or unreported controlled id counts as free, never occupied.
    fn holds(&self, view: &TickView<'_>, ctrl: &RcId) -> bool {
        let mode = match self {
            CompletionRule::Custom(check) => return check.holds(view, ctrl),
            CompletionRule::Mode(mode) => *mode,
        };
        let code = view.rc_states.get(ctrl).copied();
        let (free, occupied) = match code {
            Some(code) if !ctrl.0.is_empty() => (rc_is_free(code), rc_is_occupied(code)),
            _ => (true, false),
        };
        match mode {
            CompletionMode::FreeTime => free,
            CompletionMode::OccupiedTime => occupied,
        }
    }
}

#[derive(Debug)]
pub struct DetectorConfig {
    pub name: String,
    pub initial_phase: PhaseId,
    pub phases: Vec<PhaseConfig>,
    pub t_kon: f64,
    pub completion: Option<CompletionRule>,
}

impl DetectorConfig {
    pub fn new(name: impl Into<String>, t_kon: f64, completion: CompletionMode) -> Self {
        Self {
            name: name.into(),
            initial_phase: 0,
            phases: Vec::new(),
            t_kon,
            completion: Some(CompletionRule::Mode(completion)),
        }
    }

    #[must_use]
    pub fn phase(mut self, phase: PhaseConfig) -> Self {
        self.phases.push(phase);
        self
    }

    #[must_use]
    pub fn initial(mut self, phase: PhaseId) -> Self {
        self.initial_phase = phase;
        self
    }

    #[must_use]
    pub fn custom_completion(mut self, check: impl CompletionCheck + 'static) -> Self {
        self.completion = Some(CompletionRule::Custom(Box::new(check)));
        self
    }
}

/// One open or close inside an `update` call, offset from the call start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub kind: EventKind,
    pub offset: f64,
}

/// Transitions produced by one `update` call. Offsets are measured from the
/// start of the call; `open_offset`/`close_offset` hold the earliest ones and
/// `transitions` holds every one, branch by branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub opened: bool,
    pub closed: bool,
    pub open_offset: Option<f64>,
    pub close_offset: Option<f64>,
    pub transitions: SmallVec<[Transition; 2]>,
}

impl StepOutcome {
    pub(crate) fn record_open(&mut self, offset: f64) {
        self.opened = true;
        self.open_offset = min_offset(self.open_offset, Some(offset));
        self.transitions.push(Transition {
            kind: EventKind::Opened,
            offset,
        });
    }

    pub(crate) fn record_close(&mut self, offset: f64) {
        self.closed = true;
        self.close_offset = min_offset(self.close_offset, Some(offset));
        self.transitions.push(Transition {
            kind: EventKind::Closed,
            offset,
        });
    }

    /// Fold another branch's outcome in, keeping the earliest offsets and
    /// every transition.
    pub fn merge(&mut self, other: &StepOutcome) {
        self.opened |= other.opened;
        self.closed |= other.closed;
        self.open_offset = min_offset(self.open_offset, other.open_offset);
        self.close_offset = min_offset(self.close_offset, other.close_offset);
        self.transitions.extend_from_slice(&other.transitions);
    }
}

fn min_offset(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn check_timing(detector: &str, field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTiming {
            detector: detector.to_string(),
            field,
            value,
        })
    }
}

#[derive(Debug)]
pub struct Detector {
    config: DetectorConfig,
    ctrl: RcId,
    initial: usize,
    /// Index of each phase's successor, `None` for final phases.
    successors: Vec<Option<usize>>,
    phase: usize,
    timer: f64,
    completion_timer: f64,
    active: bool,
}

impl Detector {
    pub fn new(config: DetectorConfig, ctrl: RcId) -> Result<Self, ConfigError> {
        let name = config.name.clone();
        if config.phases.is_empty() {
            return Err(ConfigError::EmptyPhases { detector: name });
        }
        check_timing(&name, "t_kon", config.t_kon)?;
        if config.completion.is_none() {
            return Err(ConfigError::MissingCompletion { detector: name });
        }

        let position = |id: PhaseId| config.phases.iter().position(|p| p.id == id);
        let mut successors = Vec::with_capacity(config.phases.len());
        for (i, phase) in config.phases.iter().enumerate() {
            if config.phases[..i].iter().any(|p| p.id == phase.id) {
                return Err(ConfigError::DuplicatePhase {
                    detector: name,
                    phase: phase.id,
                });
            }
            if phase.predicate.is_none() {
                return Err(ConfigError::MissingPredicate {
                    detector: name,
                    phase: phase.id,
                });
            }
            check_timing(&name, "duration", phase.duration)?;
            let successor = match phase.next {
                NextPhase::Open => None,
                NextPhase::Phase(id) => Some(position(id).ok_or(ConfigError::UnknownPhase {
                    detector: name.clone(),
                    phase: id,
                })?),
            };
            successors.push(successor);
        }
        let initial = position(config.initial_phase).ok_or(ConfigError::UnknownPhase {
            detector: name,
            phase: config.initial_phase,
        })?;

        Ok(Self {
            config,
            ctrl,
            initial,
            successors,
            phase: initial,
            timer: 0.0,
            completion_timer: 0.0,
            active: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn ctrl(&self) -> &RcId {
        &self.ctrl
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn current_phase_id(&self) -> PhaseId {
        self.config.phases[self.phase].id
    }

    pub fn timer(&self) -> f64 {
        self.timer
    }

    pub fn completion_timer(&self) -> f64 {
        self.completion_timer
    }

    /// Back to the initial formation phase with both timers cleared.
    pub fn reset(&mut self) {
        self.phase = self.initial;
        self.timer = 0.0;
        self.completion_timer = 0.0;
        self.active = false;
    }

    /// Reset only if still forming; an open fault runs until it closes.
    pub fn reset_formation(&mut self) {
        if !self.active {
            self.reset();
        }
    }

    pub fn attach_exceptions(&mut self, every_phase: ExceptionSet, final_phase: ExceptionSet) {
        for phase in &mut self.config.phases {
            phase.abort = phase.abort.union(every_phase);
            if phase.is_final() {
                phase.abort = phase.abort.union(final_phase);
            }
        }
    }

    /// Advance by `dt` seconds against one fixed snapshot.
    ///
    /// Formation time left over after an open feeds the completion rule, and
    /// completion time left over after a close feeds formation again.
    pub fn update(&mut self, view: &TickView<'_>, dt: f64) -> StepOutcome {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let mut outcome = StepOutcome::default();
        let mut remaining = dt;

        for _ in 0..MAX_FORMATION_SEGMENTS {
            if self.active {
                let Some(used) = self.advance_completion(view, remaining) else {
                    break;
                };
                outcome.record_close(dt - remaining + used);
                remaining -= used;
                tracing::debug!(detector = %self.config.name, ctrl = %self.ctrl, "closed");
            } else {
                let (opened, left) = self.advance_formation(view, remaining);
                if !opened {
                    break;
                }
                outcome.record_open(dt - left);
                remaining = left;
                tracing::debug!(detector = %self.config.name, ctrl = %self.ctrl, "opened");
            }
            if remaining <= TIME_EPS && !self.active {
                break;
            }
        }
        outcome
    }

    /// Walk formation phases for up to `dt` seconds. Returns whether the
    /// fault opened and the unconsumed time.
    fn advance_formation(&mut self, view: &TickView<'_>, dt: f64) -> (bool, f64) {
        let mut remaining = dt;
        let prev = view.neighbors.prev.as_ref();
        let next = view.neighbors.next.as_ref();

        for _ in 0..MAX_FORMATION_SEGMENTS {
            if remaining <= TIME_EPS {
                break;
            }
            let index = self.phase;
            let phase = &self.config.phases[index];

            if phase.abort.intersects(view.exceptions) {
                if phase.reset_on_exception {
                    self.phase = self.initial;
                    self.timer = 0.0;
                } else if phase.timer_mode == TimerMode::Continuous {
                    self.timer = 0.0;
                }
                break;
            }

            let gate_open = phase.requirement.admits(view, &self.ctrl);
            let holds = gate_open
                && phase
                    .predicate
                    .as_ref()
                    .is_some_and(|p| p.evaluate(view, prev, &self.ctrl, next));
            if !holds {
                if !gate_open && phase.requirement == NeighborRequirement::Both {
                    // A lost neighbor invalidates the whole formation.
                    self.phase = self.initial;
                    self.timer = 0.0;
                } else if phase.timer_mode == TimerMode::Continuous {
                    self.timer = 0.0;
                }
                break;
            }

            let need = (phase.duration - self.timer).max(0.0);
            let consumed = remaining.min(need);
            self.timer += consumed;
            remaining -= consumed;
            if self.timer + TIME_EPS < phase.duration {
                break;
            }

            match self.successors[index] {
                None => {
                    self.active = true;
                    self.timer = 0.0;
                    self.completion_timer = 0.0;
                    return (true, remaining);
                }
                Some(successor) => {
                    if phase.reset_on_exit {
                        self.timer = 0.0;
                    }
                    self.phase = successor;
                }
            }
        }
        (false, remaining)
    }

    /// Accumulate completion time. Returns the time used up to the close,
    /// or `None` while the fault stays open.
    fn advance_completion(&mut self, view: &TickView<'_>, dt: f64) -> Option<f64> {
        let holds = self
            .config
            .completion
            .as_ref()
            .is_some_and(|rule| rule.holds(view, &self.ctrl));
        if !holds {
            self.completion_timer = 0.0;
            return None;
        }
        let before = self.completion_timer;
        self.completion_timer += dt;
        if self.completion_timer + TIME_EPS < self.config.t_kon {
            return None;
        }
        let used = (self.config.t_kon - before).max(0.0).min(dt);
        self.reset();
        Some(used)
    }
}
