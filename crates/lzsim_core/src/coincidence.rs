//! Coincidence detector: after a quiet spell the controlled circuit and a
//! linked neighbor report occupancy within `tlz` of each other, as a broken
//! insulated joint does.
//!
//! Both occupancies are taken at interval boundaries, where the snapshot
//! changes, so re-slicing an interval never moves them.

use crate::detector::{StepOutcome, MAX_FORMATION_SEGMENTS, TIME_EPS};
use crate::exceptions::ExceptionSet;
use crate::predicate::TickView;
use crate::states::{rc_is_free, rc_is_occupied};
use crate::{ConfigError, RcId};

#[derive(Debug, Clone, PartialEq)]
pub struct CoincidenceConfig {
    pub name: String,
    /// Quiet spell before the watch starts.
    pub ts01: f64,
    /// Largest gap between the two occupancies.
    pub tlz: f64,
    pub tkon: f64,
}

impl CoincidenceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("ts01", self.ts01), ("tlz", self.tlz), ("tkon", self.tkon)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidTiming {
                    detector: self.name.clone(),
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occupant {
    Ctrl,
    Adjacent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Controlled free, linked neighbors free or absent, for `ts01`.
    Quiet,
    /// Waiting for the first occupancy.
    Watching,
    /// One side occupied; the other has `tlz` to follow.
    Armed(Occupant),
}

#[derive(Debug)]
pub struct CoincidenceDetector {
    config: CoincidenceConfig,
    ctrl: RcId,
    every_phase: ExceptionSet,
    final_phase: ExceptionSet,
    stage: Stage,
    timer: f64,
    completion_timer: f64,
    active: bool,
}

impl CoincidenceDetector {
    pub fn new(config: CoincidenceConfig, ctrl: RcId) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ctrl,
            every_phase: ExceptionSet::EMPTY,
            final_phase: ExceptionSet::EMPTY,
            stage: Stage::Quiet,
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

    /// 0 quiet, 1 watching, 2 armed.
    pub fn current_phase_id(&self) -> u16 {
        match self.stage {
            Stage::Quiet => 0,
            Stage::Watching => 1,
            Stage::Armed(_) => 2,
        }
    }

    pub fn timer(&self) -> f64 {
        self.timer
    }

    pub fn completion_timer(&self) -> f64 {
        self.completion_timer
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
        self.stage = Stage::Quiet;
        self.timer = 0.0;
    }

    fn quiet(&self, view: &TickView<'_>) -> bool {
        let n = view.neighbors;
        rc_is_free(view.rc(&self.ctrl))
            && [(n.prev.as_ref(), n.prev_nc), (n.next.as_ref(), n.next_nc)]
                .into_iter()
                .all(|(id, nc)| nc || id.map_or(true, |id| rc_is_free(view.rc(id))))
    }

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

    fn advance_formation(&mut self, view: &TickView<'_>, dt: f64) -> (bool, f64) {
        let mut remaining = dt;
        let ctrl_occupied = rc_is_occupied(view.rc(&self.ctrl));
        let adjacent_occupied = adjacent_occupied(view);

        for _ in 0..MAX_FORMATION_SEGMENTS {
            if remaining <= TIME_EPS {
                break;
            }
            let mut abort = self.every_phase;
            if self.stage != Stage::Quiet {
                abort = abort.union(self.final_phase);
            }
            if abort.intersects(view.exceptions) {
                self.restart();
                break;
            }

            match self.stage {
                Stage::Quiet => {
                    if !self.quiet(view) {
                        self.timer = 0.0;
                        break;
                    }
                    let consumed = remaining.min((self.config.ts01 - self.timer).max(0.0));
                    self.timer += consumed;
                    remaining -= consumed;
                    if self.timer + TIME_EPS < self.config.ts01 {
                        break;
                    }
                    self.stage = Stage::Watching;
                    self.timer = 0.0;
                }
                Stage::Watching => {
                    self.stage = match (ctrl_occupied, adjacent_occupied) {
                        (true, true) => return self.open(remaining),
                        (true, false) => Stage::Armed(Occupant::Ctrl),
                        (false, true) => Stage::Armed(Occupant::Adjacent),
                        (false, false) => break,
                    };
                    self.timer = 0.0;
                }
                Stage::Armed(first) => {
                    let followed = match first {
                        Occupant::Ctrl => adjacent_occupied,
                        Occupant::Adjacent => ctrl_occupied,
                    };
                    if followed {
                        return self.open(remaining);
                    }
                    let consumed = remaining.min((self.config.tlz - self.timer).max(0.0));
                    self.timer += consumed;
                    remaining -= consumed;
                    if remaining <= TIME_EPS {
                        // The window is still open at the interval boundary.
                        break;
                    }
                    self.restart();
                }
            }
        }
        (false, remaining)
    }

    fn open(&mut self, remaining: f64) -> (bool, f64) {
        self.active = true;
        self.restart();
        self.completion_timer = 0.0;
        (true, remaining)
    }

    /// Controlled free for `tkon` closes the fault.
    fn advance_completion(&mut self, view: &TickView<'_>, dt: f64) -> Option<f64> {
        if !rc_is_free(view.rc(&self.ctrl)) {
            self.completion_timer = 0.0;
            return None;
        }
        let before = self.completion_timer;
        self.completion_timer += dt;
        if self.completion_timer + TIME_EPS < self.config.tkon {
            return None;
        }
        let used = (self.config.tkon - before).max(0.0).min(dt);
        self.reset();
        Some(used)
    }
}

/// A linked neighbor on either side is occupied. Sides without links never
/// count.
fn adjacent_occupied(view: &TickView<'_>) -> bool {
    let n = view.neighbors;
    [(n.prev.as_ref(), n.prev_nc), (n.next.as_ref(), n.next_nc)]
        .into_iter()
        .any(|(id, nc)| !nc && id.is_some_and(|id| rc_is_occupied(view.rc(id))))
}
