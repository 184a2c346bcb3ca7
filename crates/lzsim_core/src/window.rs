//! Windowed false-clear detector: a sustained `111`, then a `101` gap whose
//! length must land inside `[tlz01, tlz02]`, then `111` again for `ts02`.
//!
//! Unlike [`crate::Detector`] this machine judges the gap by whole intervals,
//! so its result depends on how the caller slices time.

use crate::detector::{StepOutcome, TIME_EPS};
use crate::exceptions::ExceptionSet;
use crate::predicate::{Mask, Predicate, TickView};
use crate::states::rc_is_occupied;
use crate::{ConfigError, RcId};

#[derive(Debug, Clone, PartialEq)]
pub struct TimedWindowConfig {
    pub name: String,
    pub ts01: f64,
    pub tlz01: f64,
    pub tlz02: f64,
    pub ts02: f64,
    pub tkon: f64,
}

impl TimedWindowConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("ts01", self.ts01),
            ("tlz01", self.tlz01),
            ("tlz02", self.tlz02),
            ("ts02", self.ts02),
            ("tkon", self.tkon),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidTiming {
                    detector: self.name.clone(),
                    field,
                    value,
                });
            }
        }
        if self.tlz01 > self.tlz02 {
            return Err(ConfigError::InvalidTiming {
                detector: self.name.clone(),
                field: "tlz01",
                value: self.tlz01,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowPhase {
    /// Accumulating `111`.
    Lead,
    /// Inside the `101` gap.
    Gap,
    /// Trailing `111` towards the open.
    Tail,
}

#[derive(Debug)]
pub struct TimedWindowDetector {
    config: TimedWindowConfig,
    ctrl: RcId,
    every_phase: ExceptionSet,
    final_phase: ExceptionSet,
    phase: WindowPhase,
    timer: f64,
    completion_timer: f64,
    active: bool,
}

impl TimedWindowDetector {
    pub fn new(config: TimedWindowConfig, ctrl: RcId) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ctrl,
            every_phase: ExceptionSet::EMPTY,
            final_phase: ExceptionSet::EMPTY,
            phase: WindowPhase::Lead,
            timer: 0.0,
            completion_timer: 0.0,
            active: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 0 lead, 1 gap, 2 tail.
    pub fn current_phase_id(&self) -> u16 {
        match self.phase {
            WindowPhase::Lead => 0,
            WindowPhase::Gap => 1,
            WindowPhase::Tail => 2,
        }
    }

    pub fn timer(&self) -> f64 {
        self.timer
    }

    pub fn reset(&mut self) {
        self.restart();
        self.completion_timer = 0.0;
        self.active = false;
    }

    pub fn attach_exceptions(&mut self, every_phase: ExceptionSet, final_phase: ExceptionSet) {
        self.every_phase = self.every_phase.union(every_phase);
        self.final_phase = self.final_phase.union(final_phase);
    }

    fn restart(&mut self) {
        self.phase = WindowPhase::Lead;
        self.timer = 0.0;
    }

    fn matches(&self, view: &TickView<'_>, mask: &Mask) -> bool {
        let n = view.neighbors;
        n.prev_ok
            && n.next_ok
            && mask.evaluate(view, n.prev.as_ref(), &self.ctrl, n.next.as_ref())
    }

    fn ctrl_occupied(&self, view: &TickView<'_>) -> bool {
        rc_is_occupied(view.rc(&self.ctrl))
    }

    pub fn update(&mut self, view: &TickView<'_>, dt: f64) -> StepOutcome {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        if self.active {
            let mut outcome = StepOutcome::default();
            if let Some(offset) = self.advance_completion(view, dt) {
                outcome.record_close(offset);
            }
            return outcome;
        }

        let mut abort = self.every_phase;
        if self.phase == WindowPhase::Tail {
            abort = abort.union(self.final_phase);
        }
        if abort.intersects(view.exceptions) {
            self.restart();
            return StepOutcome::default();
        }

        let full = self.matches(view, &Mask::Rc111);
        let gap = self.matches(view, &Mask::Rc101);
        let cfg = &self.config;

        match self.phase {
            WindowPhase::Lead => {
                if full {
                    self.timer += dt;
                } else if gap && self.timer + TIME_EPS >= cfg.ts01 {
                    self.phase = WindowPhase::Gap;
                    self.timer = dt;
                    if self.timer > cfg.tlz02 + TIME_EPS {
                        self.restart();
                    }
                } else {
                    self.restart();
                }
                StepOutcome::default()
            }
            WindowPhase::Gap => {
                if gap {
                    self.timer += dt;
                    if self.timer > cfg.tlz02 + TIME_EPS {
                        self.restart();
                    }
                    return StepOutcome::default();
                }
                let in_window =
                    self.timer + TIME_EPS >= cfg.tlz01 && self.timer <= cfg.tlz02 + TIME_EPS;
                if !(full && in_window) {
                    self.restart();
                    return StepOutcome::default();
                }
                self.phase = WindowPhase::Tail;
                self.timer = dt;
                if self.timer + TIME_EPS < cfg.ts02 {
                    return StepOutcome::default();
                }
                let offset = dt.min(cfg.ts02);
                self.open(view, dt, offset)
            }
            WindowPhase::Tail => {
                if !full {
                    self.restart();
                    return StepOutcome::default();
                }
                let before = self.timer;
                self.timer += dt;
                if self.timer + TIME_EPS < cfg.ts02 {
                    return StepOutcome::default();
                }
                let offset = dt.min((cfg.ts02 - before).max(0.0));
                self.open(view, dt, offset)
            }
        }
    }

    /// The whole opening interval counts towards completion.
    fn open(&mut self, view: &TickView<'_>, dt: f64, open_offset: f64) -> StepOutcome {
        self.active = true;
        self.timer = 0.0;
        self.completion_timer = 0.0;
        tracing::debug!(detector = %self.config.name, ctrl = %self.ctrl, "opened");
        let mut outcome = StepOutcome::default();
        outcome.record_open(open_offset);
        if let Some(offset) = self.advance_completion(view, dt) {
            outcome.record_close(offset);
        }
        outcome
    }

    fn advance_completion(&mut self, view: &TickView<'_>, dt: f64) -> Option<f64> {
        if !self.ctrl_occupied(view) {
            self.completion_timer = 0.0;
            return None;
        }
        let before = self.completion_timer;
        self.completion_timer += dt;
        if self.completion_timer + TIME_EPS < self.config.tkon {
            return None;
        }
        let offset = dt.min((self.config.tkon - before).max(0.0));
        self.reset();
        tracing::debug!(detector = %self.config.name, ctrl = %self.ctrl, "closed");
        Some(offset)
    }
}
