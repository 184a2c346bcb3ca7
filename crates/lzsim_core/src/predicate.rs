//! Per-tick view handed to predicates, neighbor gates and the fixed mask set.

use std::fmt;

use crate::exceptions::ExceptionSet;
use crate::states::{
    rc_is_free, rc_is_locked, rc_is_occupied, shunting_signal_is_closed, shunting_signal_is_open,
    signal_is_closed, signal_is_open,
};
use crate::station::{SignalKind, StationModel};
use crate::{ModeMap, ModeValue, RawState, RcId, RcStates, SignalId, SignalStates};

/// Effective neighbors of a controlled circuit for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub prev: Option<RcId>,
    pub next: Option<RcId>,
    pub prev_ok: bool,
    pub next_ok: bool,
    pub prev_nc: bool,
    pub next_nc: bool,
}

impl Neighbors {
    pub fn publish(&self, modes: &mut ModeMap) {
        modes.insert("prev_control_ok".to_string(), self.prev_ok.into());
        modes.insert("next_control_ok".to_string(), self.next_ok.into());
        modes.insert("prev_nc".to_string(), self.prev_nc.into());
        modes.insert("next_nc".to_string(), self.next_nc.into());
    }
}

/// Signals between the controlled circuit and its effective neighbors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalRoutes {
    pub prev_to_ctrl: Option<SignalId>,
    pub ctrl_to_prev: Option<SignalId>,
    pub ctrl_to_next: Option<SignalId>,
    pub next_to_ctrl: Option<SignalId>,
}

impl SignalRoutes {
    pub fn resolve(station: &StationModel, ctrl: &RcId, neighbors: &Neighbors) -> Self {
        let pick = |from: &RcId, to: &RcId| station.pick_signal(from, to).cloned();
        let prev = neighbors.prev.as_ref();
        let next = neighbors.next.as_ref();
        Self {
            prev_to_ctrl: prev.and_then(|p| pick(p, ctrl)),
            ctrl_to_prev: prev.and_then(|p| pick(ctrl, p)),
            ctrl_to_next: next.and_then(|n| pick(ctrl, n)),
            next_to_ctrl: next.and_then(|n| pick(n, ctrl)),
        }
    }

    pub fn publish(&self, modes: &mut ModeMap) {
        let entries = [
            ("sig_prev_to_ctrl", &self.prev_to_ctrl),
            ("sig_ctrl_to_prev", &self.ctrl_to_prev),
            ("sig_ctrl_to_next", &self.ctrl_to_next),
            ("sig_next_to_ctrl", &self.next_to_ctrl),
        ];
        for (key, value) in entries {
            modes.insert(key.to_string(), ModeValue::from(value.as_ref()));
        }
    }
}

/// Everything a predicate may read during one chunk. Read-only.
#[derive(Debug, Clone, Copy)]
pub struct TickView<'a> {
    pub station: &'a StationModel,
    pub rc_states: &'a RcStates,
    pub signal_states: &'a SignalStates,
    pub modes: &'a ModeMap,
    pub neighbors: &'a Neighbors,
    pub signals: &'a SignalRoutes,
    pub exceptions: ExceptionSet,
}

impl TickView<'_> {
    /// Raw code of a circuit; absent ids read as 0 (no-control).
    pub fn rc(&self, id: &RcId) -> RawState {
        self.rc_states.get(id).copied().unwrap_or(0)
    }

    fn rc_free_or_missing(&self, id: Option<&RcId>) -> bool {
        id.map_or(true, |id| rc_is_free(self.rc(id)))
    }

    fn rc_free(&self, id: Option<&RcId>) -> bool {
        id.is_some_and(|id| rc_is_free(self.rc(id)))
    }

    fn rc_occupied(&self, id: Option<&RcId>) -> bool {
        id.is_some_and(|id| rc_is_occupied(self.rc(id)))
    }

    fn rc_locked(&self, id: Option<&RcId>) -> bool {
        id.is_some_and(|id| rc_is_locked(self.rc(id)))
    }

    pub fn signal_closed(&self, id: &SignalId) -> bool {
        let code = self.signal_states.get(id).copied().unwrap_or(0);
        match self.station.signal(id).map(|s| s.kind) {
            Some(SignalKind::Shunting) => shunting_signal_is_closed(code),
            Some(SignalKind::Train) | None => signal_is_closed(code),
        }
    }

    pub fn signal_shows(&self, id: &SignalId, aspect: Aspect) -> bool {
        match aspect {
            Aspect::Open => self.signal_open(id),
            Aspect::Closed => self.signal_closed(id),
        }
    }

    pub fn signal_open(&self, id: &SignalId) -> bool {
        let code = self.signal_states.get(id).copied().unwrap_or(0);
        match self.station.signal(id).map(|s| s.kind) {
            Some(SignalKind::Shunting) => shunting_signal_is_open(code),
            Some(SignalKind::Train) => signal_is_open(code),
            None => signal_is_open(code) || shunting_signal_is_open(code),
        }
    }
}

// ---------------------------------------------------------------------------
// Neighbor gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighborRequirement {
    /// Both neighbors resolved.
    Both,
    /// No gate.
    Unconstrained,
    /// The controlled circuit is reported in the state map.
    OnlyCtrl,
    /// At least one direction has no links at all.
    OneNc,
    /// At least one neighbor resolved.
    OneAdj,
}

impl NeighborRequirement {
    pub fn admits(self, view: &TickView<'_>, ctrl: &RcId) -> bool {
        let n = view.neighbors;
        match self {
            NeighborRequirement::Both => n.prev_ok && n.next_ok,
            NeighborRequirement::Unconstrained => true,
            NeighborRequirement::OnlyCtrl => {
                !ctrl.0.is_empty() && view.rc_states.contains_key(ctrl)
            }
            NeighborRequirement::OneNc => n.prev_nc || n.next_nc,
            NeighborRequirement::OneAdj => n.prev.is_some() || n.next.is_some(),
        }
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Condition evaluated for one phase. All ids are passed explicitly.
pub trait Predicate: fmt::Debug + Send + Sync {
    fn evaluate(
        &self,
        view: &TickView<'_>,
        prev: Option<&RcId>,
        ctrl: &RcId,
        next: Option<&RcId>,
    ) -> bool;
}

/// Adapter for ad-hoc closures, mostly useful in tests and custom variants.
pub struct FnPredicate<F> {
    label: &'static str,
    f: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(&TickView<'_>, Option<&RcId>, &RcId, Option<&RcId>) -> bool + Send + Sync,
{
    pub fn new(label: &'static str, f: F) -> Self {
        Self { label, f }
    }
}

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnPredicate").field(&self.label).finish()
    }
}

impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&TickView<'_>, Option<&RcId>, &RcId, Option<&RcId>) -> bool + Send + Sync,
{
    fn evaluate(
        &self,
        view: &TickView<'_>,
        prev: Option<&RcId>,
        ctrl: &RcId,
        next: Option<&RcId>,
    ) -> bool {
        (self.f)(view, prev, ctrl, next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Prev,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardStage {
    /// Adjacent free and locked, controlled free.
    AdjacentFreeLocked,
    /// Adjacent occupied, controlled free.
    AdjacentOccupied,
    /// Adjacent and controlled both occupied.
    BothOccupied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aspect {
    Open,
    Closed,
}

/// Occupancy patterns written prev-ctrl-next: `0` free, `1` occupied,
/// `X` neighbor absent. Unless noted, a missing neighbor reads as
/// no-control and fails any free/occupied test.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mask {
    /// Missing neighbors count as free.
    Rc000,
    /// Missing neighbors count as free.
    Rc010,
    Rc101,
    Rc111,
    Rc100,
    Rc110,
    Rc001,
    Rc011,
    Rc100Or000,
    Rc001Or000,
    RcX0X,
    RcX1X,
    Rc00X,
    Rc01X,
    RcX00,
    RcX10,
    Rc110Or111,
    Rc011Or111,
    /// Controlled occupied with at least one free side; missing counts as free.
    Rc01XOrX10,
    CtrlFree,
    CtrlOccupied,
    /// Controlled free and unlocked on a circuit that can be locked.
    CtrlFreeUnlocked,
    CtrlOccupiedUnlocked,
    /// Prev has no links; controlled occupied+locked, next free+locked.
    PrevNcNextFreeLocked,
    /// Prev has no links; controlled and next occupied+locked.
    PrevNcNextOccupiedLocked,
    NextNcPrevFreeLocked,
    NextNcPrevOccupiedLocked,
    /// Both neighbors present and free, controlled occupied.
    Rc010Linked,
    /// Controlled free and locked; prev occupied and locked.
    LockedPrevOccupied,
    /// Controlled free and locked; next occupied and locked.
    LockedNextOccupied,
    /// Controlled free and locked between two occupied, locked neighbors.
    LockedBothOccupied,
    /// The `nc` side has no links; controlled free and locked; the opposite
    /// neighbor locked and either occupied or free.
    NcLockedApproach { nc: Side, adjacent_occupied: bool },
    /// `base` while `signal` shows `aspect`.
    WithSignal {
        base: Box<Mask>,
        signal: SignalId,
        aspect: Aspect,
    },
    /// One adjacent side approaching behind a closed signal.
    Guarded {
        side: Side,
        stage: GuardStage,
        signal: Option<SignalId>,
    },
}

impl Predicate for Mask {
    fn evaluate(
        &self,
        view: &TickView<'_>,
        prev: Option<&RcId>,
        ctrl: &RcId,
        next: Option<&RcId>,
    ) -> bool {
        if ctrl.0.is_empty() {
            return false;
        }
        let c = Some(ctrl);
        match self {
            Mask::Rc000 => {
                view.rc_free_or_missing(prev) && view.rc_free(c) && view.rc_free_or_missing(next)
            }
            Mask::Rc010 => {
                view.rc_free_or_missing(prev)
                    && view.rc_occupied(c)
                    && view.rc_free_or_missing(next)
            }
            Mask::Rc101 => view.rc_occupied(prev) && view.rc_free(c) && view.rc_occupied(next),
            Mask::Rc111 => view.rc_occupied(prev) && view.rc_occupied(c) && view.rc_occupied(next),
            Mask::Rc100 => view.rc_occupied(prev) && view.rc_free(c) && view.rc_free(next),
            Mask::Rc110 => view.rc_occupied(prev) && view.rc_occupied(c) && view.rc_free(next),
            Mask::Rc001 => view.rc_free(prev) && view.rc_free(c) && view.rc_occupied(next),
            Mask::Rc011 => view.rc_free(prev) && view.rc_occupied(c) && view.rc_occupied(next),
            Mask::Rc100Or000 => {
                Mask::Rc100.evaluate(view, prev, ctrl, next)
                    || Mask::Rc000.evaluate(view, prev, ctrl, next)
            }
            Mask::Rc001Or000 => {
                Mask::Rc001.evaluate(view, prev, ctrl, next)
                    || Mask::Rc000.evaluate(view, prev, ctrl, next)
            }
            Mask::RcX0X => prev.is_none() && next.is_none() && view.rc_free(c),
            Mask::RcX1X => prev.is_none() && next.is_none() && view.rc_occupied(c),
            Mask::Rc00X => prev.is_none() && view.rc_free(next) && view.rc_free(c),
            Mask::Rc01X => prev.is_none() && view.rc_free(next) && view.rc_occupied(c),
            Mask::RcX00 => next.is_none() && view.rc_free(prev) && view.rc_free(c),
            Mask::RcX10 => next.is_none() && view.rc_free(prev) && view.rc_occupied(c),
            Mask::Rc110Or111 => view.rc_occupied(prev) && view.rc_occupied(c),
            Mask::Rc011Or111 => view.rc_occupied(c) && view.rc_occupied(next),
            Mask::Rc01XOrX10 => {
                view.rc_occupied(c)
                    && (view.rc_free_or_missing(prev) || view.rc_free_or_missing(next))
            }
            Mask::CtrlFree => view.rc_free(c),
            Mask::CtrlOccupied => view.rc_occupied(c),
            Mask::CtrlFreeUnlocked => {
                view.rc_free(c) && !view.rc_locked(c) && view.station.can_lock(ctrl)
            }
            Mask::CtrlOccupiedUnlocked => {
                view.rc_occupied(c) && !view.rc_locked(c) && view.station.can_lock(ctrl)
            }
            Mask::PrevNcNextFreeLocked => {
                view.neighbors.prev_nc
                    && locked_occupied(view, c)
                    && view.rc_free(next)
                    && view.rc_locked(next)
            }
            Mask::PrevNcNextOccupiedLocked => {
                view.neighbors.prev_nc && locked_occupied(view, c) && locked_occupied(view, next)
            }
            Mask::NextNcPrevFreeLocked => {
                view.neighbors.next_nc
                    && locked_occupied(view, c)
                    && view.rc_free(prev)
                    && view.rc_locked(prev)
            }
            Mask::NextNcPrevOccupiedLocked => {
                view.neighbors.next_nc && locked_occupied(view, c) && locked_occupied(view, prev)
            }
            Mask::Rc010Linked => view.rc_free(prev) && view.rc_occupied(c) && view.rc_free(next),
            Mask::LockedPrevOccupied => locked_occupied(view, prev) && locked_free(view, c),
            Mask::LockedNextOccupied => locked_occupied(view, next) && locked_free(view, c),
            Mask::LockedBothOccupied => {
                locked_occupied(view, prev) && locked_occupied(view, next) && locked_free(view, c)
            }
            Mask::NcLockedApproach {
                nc,
                adjacent_occupied,
            } => nc_locked_approach(view, *nc, *adjacent_occupied, prev, ctrl, next),
            Mask::WithSignal {
                base,
                signal,
                aspect,
            } => base.evaluate(view, prev, ctrl, next) && view.signal_shows(signal, *aspect),
            Mask::Guarded {
                side,
                stage,
                signal,
            } => guarded(view, *side, *stage, signal.as_ref(), prev, ctrl, next),
        }
    }
}

fn locked_occupied(view: &TickView<'_>, id: Option<&RcId>) -> bool {
    view.rc_occupied(id) && view.rc_locked(id)
}

fn locked_free(view: &TickView<'_>, id: Option<&RcId>) -> bool {
    view.rc_free(id) && view.rc_locked(id)
}

fn nc_locked_approach(
    view: &TickView<'_>,
    nc: Side,
    adjacent_occupied: bool,
    prev: Option<&RcId>,
    ctrl: &RcId,
    next: Option<&RcId>,
) -> bool {
    let (unlinked, adjacent) = match nc {
        Side::Prev => (view.neighbors.prev_nc, next),
        Side::Next => (view.neighbors.next_nc, prev),
    };
    let adjacent_holds = if adjacent_occupied {
        locked_occupied(view, adjacent)
    } else {
        locked_free(view, adjacent)
    };
    unlinked && locked_free(view, Some(ctrl)) && adjacent_holds
}

fn guarded(
    view: &TickView<'_>,
    side: Side,
    stage: GuardStage,
    signal: Option<&SignalId>,
    prev: Option<&RcId>,
    ctrl: &RcId,
    next: Option<&RcId>,
) -> bool {
    let adjacent = match side {
        Side::Prev => prev,
        Side::Next => next,
    };
    if adjacent.is_none() {
        return false;
    }
    let c = Some(ctrl);
    let states_hold = match stage {
        GuardStage::AdjacentFreeLocked => {
            view.rc_free(adjacent) && view.rc_locked(adjacent) && view.rc_free(c)
        }
        GuardStage::AdjacentOccupied => view.rc_occupied(adjacent) && view.rc_free(c),
        GuardStage::BothOccupied => view.rc_occupied(adjacent) && view.rc_occupied(c),
    };
    if !states_hold {
        return false;
    }

    // Configured signal first, then the one facing the controlled circuit
    // from this side, then the one from the opposite side.
    let routes = view.signals;
    let (own, other) = match side {
        Side::Prev => (&routes.prev_to_ctrl, &routes.next_to_ctrl),
        Side::Next => (&routes.next_to_ctrl, &routes.prev_to_ctrl),
    };
    signal
        .or(own.as_ref())
        .or(other.as_ref())
        .is_some_and(|id| view.signal_closed(id))
}
