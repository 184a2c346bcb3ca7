//! Effective neighbor resolution with a time-bounded continuity latch.
//!
//! A direction resolves to a physical neighbor when an unconditional link
//! exists or when every switch condition of some target holds. When switch
//! control is lost, the last physical neighbor stays latched for up to `T_PK`
//! seconds of simulation time.

use smallvec::SmallVec;

use crate::predicate::Neighbors;
use crate::states::{switch_position, SwitchPosition};
use crate::station::{Link, RcIndex, StationModel};
use crate::{ConfigError, RcId, SwitchStates, TIME_EPS};

/// Per-circuit latch state. Owned and mutated only by the resolver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyState {
    pub latched_prev: Option<RcId>,
    pub latched_next: Option<RcId>,
    pub prev_lost_for: f64,
    pub next_lost_for: f64,
}

#[derive(Debug, Clone)]
pub struct TopologyResolver {
    station: StationModel,
    t_pk: f64,
    states: Vec<TopologyState>,
}

impl TopologyResolver {
    pub fn new(station: StationModel, t_pk: f64) -> Result<Self, ConfigError> {
        if !t_pk.is_finite() || t_pk < 0.0 {
            return Err(ConfigError::InvalidLatchWindow(t_pk));
        }
        let states = vec![TopologyState::default(); station.circuits().len()];
        Ok(Self {
            station,
            t_pk,
            states,
        })
    }

    pub fn station(&self) -> &StationModel {
        &self.station
    }

    pub fn t_pk(&self) -> f64 {
        self.t_pk
    }

    pub fn state(&self, index: RcIndex) -> &TopologyState {
        &self.states[index.get()]
    }

    /// Resolve prev/next for one chunk of `dt` seconds, advancing loss timers.
    ///
    /// `prev_ok`/`next_ok` report whether a neighbor was resolved at all;
    /// `prev_nc`/`next_nc` are static and true when the direction has no links.
    pub fn neighbors_with_control(
        &mut self,
        index: RcIndex,
        switches: &SwitchStates,
        dt: f64,
    ) -> Neighbors {
        let node = self.station.node(index);
        let prev_phys = physical_neighbor(&node.prev_links, switches).cloned();
        let next_phys = physical_neighbor(&node.next_links, switches).cloned();
        let prev_lost = control_lost(&node.prev_links, switches);
        let next_lost = control_lost(&node.next_links, switches);
        let prev_nc = node.prev_links.is_empty();
        let next_nc = node.next_links.is_empty();
        let ctrl = node.id.clone();

        let t_pk = self.t_pk;
        let state = &mut self.states[index.get()];
        let prev = resolve_with_latch(
            &mut state.latched_prev,
            &mut state.prev_lost_for,
            prev_phys,
            prev_lost,
            dt,
            t_pk,
        );
        let next = resolve_with_latch(
            &mut state.latched_next,
            &mut state.next_lost_for,
            next_phys,
            next_lost,
            dt,
            t_pk,
        );
        tracing::trace!(%ctrl, ?prev, ?next, dt, "neighbors resolved");

        Neighbors {
            prev_ok: prev.is_some(),
            next_ok: next.is_some(),
            prev,
            next,
            prev_nc,
            next_nc,
        }
    }

    /// Longest chunk, at most `max_dt`, before the resolution of `index`
    /// could change under the current switch states. `None` defers to the
    /// caller's ceiling.
    pub fn next_change_dt(
        &self,
        index: RcIndex,
        switches: &SwitchStates,
        max_dt: f64,
    ) -> Option<f64> {
        if max_dt <= 0.0 {
            return None;
        }
        let node = self.station.node(index);
        let state = &self.states[index.get()];
        let sides = [
            (&node.prev_links, state.latched_prev.is_some(), state.prev_lost_for),
            (&node.next_links, state.latched_next.is_some(), state.next_lost_for),
        ];

        sides
            .into_iter()
            .filter(|(links, latched, _)| {
                *latched
                    && physical_neighbor(links, switches).is_none()
                    && control_lost(links, switches)
            })
            .map(|(_, _, lost_for)| self.t_pk - lost_for)
            .filter(|remaining| *remaining > TIME_EPS && *remaining < max_dt)
            .min_by(f64::total_cmp)
    }

    /// Drop every latch, as at simulation start.
    pub fn reset(&mut self) {
        for state in &mut self.states {
            *state = TopologyState::default();
        }
    }
}

/// Physical neighbor in one direction. Any unconditional link wins outright;
/// otherwise links are grouped by target and a target resolves only when all
/// of its switch conditions hold.
fn physical_neighbor<'a>(links: &'a [Link], switches: &SwitchStates) -> Option<&'a RcId> {
    if let Some(link) = links.iter().find(|l| l.is_unconditional()) {
        return Some(&link.target);
    }
    let mut seen: SmallVec<[&RcId; 4]> = SmallVec::new();
    for link in links {
        if seen.contains(&&link.target) {
            continue;
        }
        seen.push(&link.target);
        let all_hold = links
            .iter()
            .filter(|l| l.target == link.target)
            .all(|l| l.holds(switches));
        if all_hold {
            return Some(&link.target);
        }
    }
    None
}

/// Control is lost when no unconditional link exists and at least one
/// governing switch reports no-control. A switch absent from the state map
/// does not count as lost.
fn control_lost(links: &[Link], switches: &SwitchStates) -> bool {
    if links.iter().any(Link::is_unconditional) {
        return false;
    }
    links
        .iter()
        .filter_map(|l| l.switch.as_ref())
        .filter_map(|sw| switches.get(sw))
        .any(|&code| switch_position(code) == SwitchPosition::NoControl)
}

fn resolve_with_latch(
    latch: &mut Option<RcId>,
    lost_for: &mut f64,
    physical: Option<RcId>,
    lost: bool,
    dt: f64,
    t_pk: f64,
) -> Option<RcId> {
    if let Some(found) = physical {
        *latch = Some(found.clone());
        *lost_for = 0.0;
        return Some(found);
    }

    if lost && latch.is_some() {
        *lost_for += dt.max(0.0);
        if *lost_for <= t_pk + TIME_EPS {
            return latch.clone();
        }
        tracing::debug!(latched = ?latch, lost_for = *lost_for, "latch expired");
    }

    *latch = None;
    *lost_for = 0.0;
    None
}
