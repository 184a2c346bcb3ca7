//! Composition of detectors into one logical variant.

use crate::coincidence::CoincidenceDetector;
use crate::detector::{Detector, StepOutcome};
use crate::exceptions::ExceptionSet;
use crate::predicate::TickView;
use crate::window::TimedWindowDetector;
use crate::ConfigError;

/// Several independent branches reported as one variant. The variant is
/// active while any branch is active. A branch may itself be a wrapper.
#[derive(Debug)]
pub struct VariantWrapper {
    name: String,
    branches: Vec<DetectorNode>,
}

impl VariantWrapper {
    pub fn new(name: impl Into<String>, branches: Vec<DetectorNode>) -> Result<Self, ConfigError> {
        let name = name.into();
        if branches.is_empty() {
            return Err(ConfigError::EmptyWrapper(name));
        }
        Ok(Self { name, branches })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn branches(&self) -> &[DetectorNode] {
        &self.branches
    }

    pub fn is_active(&self) -> bool {
        self.branches.iter().any(DetectorNode::is_active)
    }

    /// Every branch sees the full `dt`. Each branch's transitions are kept;
    /// the merged offsets are the earliest among the branches that fired.
    pub fn update(&mut self, view: &TickView<'_>, dt: f64) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        for branch in &mut self.branches {
            outcome.merge(&branch.update(view, dt));
        }
        outcome
    }

    pub fn reset(&mut self) {
        for branch in &mut self.branches {
            branch.reset();
        }
    }

    pub fn attach_exceptions(&mut self, every_phase: ExceptionSet, final_phase: ExceptionSet) {
        for branch in &mut self.branches {
            branch.attach_exceptions(every_phase, final_phase);
        }
    }
}

/// Anything that can stand in for a variant in the engine.
#[derive(Debug)]
pub enum DetectorNode {
    Simple(Detector),
    MultiBranch(VariantWrapper),
    TimedWindow(TimedWindowDetector),
    Coincidence(CoincidenceDetector),
}

impl DetectorNode {
    pub fn name(&self) -> &str {
        match self {
            DetectorNode::Simple(d) => d.name(),
            DetectorNode::MultiBranch(w) => w.name(),
            DetectorNode::TimedWindow(w) => w.name(),
            DetectorNode::Coincidence(c) => c.name(),
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            DetectorNode::Simple(d) => d.is_active(),
            DetectorNode::MultiBranch(w) => w.is_active(),
            DetectorNode::TimedWindow(w) => w.is_active(),
            DetectorNode::Coincidence(c) => c.is_active(),
        }
    }

    pub fn update(&mut self, view: &TickView<'_>, dt: f64) -> StepOutcome {
        match self {
            DetectorNode::Simple(d) => d.update(view, dt),
            DetectorNode::MultiBranch(w) => w.update(view, dt),
            DetectorNode::TimedWindow(w) => w.update(view, dt),
            DetectorNode::Coincidence(c) => c.update(view, dt),
        }
    }

    pub fn reset(&mut self) {
        match self {
            DetectorNode::Simple(d) => d.reset(),
            DetectorNode::MultiBranch(w) => w.reset(),
            DetectorNode::TimedWindow(w) => w.reset(),
            DetectorNode::Coincidence(c) => c.reset(),
        }
    }

    /// Drop formation progress unless a fault is currently open.
    pub fn reset_formation(&mut self) {
        if !self.is_active() {
            self.reset();
        }
    }

    pub fn attach_exceptions(&mut self, every_phase: ExceptionSet, final_phase: ExceptionSet) {
        match self {
            DetectorNode::Simple(d) => d.attach_exceptions(every_phase, final_phase),
            DetectorNode::MultiBranch(w) => w.attach_exceptions(every_phase, final_phase),
            DetectorNode::TimedWindow(w) => w.attach_exceptions(every_phase, final_phase),
            DetectorNode::Coincidence(c) => c.attach_exceptions(every_phase, final_phase),
        }
    }
}
