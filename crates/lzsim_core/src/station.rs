//! Read-only station graph: track circuits with directed, optionally
//! switch-gated links, plus the signals between sections.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::states::{switch_position, SwitchPosition};
use crate::{ConfigError, RcId, SignalId, SwitchId, SwitchStates};

pub type LinkList = SmallVec<[Link; 2]>;

/// Directed edge to an adjacent circuit. Unconditional iff `switch` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub target: RcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch: Option<SwitchId>,
    /// Required switch position. `None` accepts any controlled position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<SwitchPosition>,
}

impl Link {
    pub fn unconditional(target: RcId) -> Self {
        Self {
            target,
            switch: None,
            position: None,
        }
    }

    pub fn gated(target: RcId, switch: SwitchId, position: SwitchPosition) -> Self {
        Self {
            target,
            switch: Some(switch),
            position: Some(position),
        }
    }

    pub fn is_unconditional(&self) -> bool {
        self.switch.is_none()
    }

    /// Whether the switch condition of this link holds. A switch missing from
    /// the state map, or one without control, never satisfies a condition.
    pub fn holds(&self, switches: &SwitchStates) -> bool {
        let Some(switch) = &self.switch else {
            return true;
        };
        let Some(&code) = switches.get(switch) else {
            return false;
        };
        match switch_position(code) {
            SwitchPosition::NoControl => false,
            actual => self.position.map_or(true, |required| required == actual),
        }
    }
}

fn default_can_lock() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcNode {
    pub id: RcId,
    #[serde(default)]
    pub prev_links: LinkList,
    #[serde(default)]
    pub next_links: LinkList,
    #[serde(default = "default_can_lock")]
    pub can_lock: bool,
    #[serde(default)]
    pub is_endpoint: bool,
}

impl RcNode {
    pub fn new(id: RcId) -> Self {
        Self {
            id,
            prev_links: LinkList::new(),
            next_links: LinkList::new(),
            can_lock: true,
            is_endpoint: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    #[default]
    Train,
    Shunting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalNode {
    pub id: SignalId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: SignalKind,
    #[serde(default)]
    pub prev_sec: Option<RcId>,
    #[serde(default)]
    pub next_sec: Option<RcId>,
}

/// Dense index of a circuit, assigned once when the station is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RcIndex(u32);

impl RcIndex {
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct StationModel {
    circuits: Vec<RcNode>,
    signals: Vec<SignalNode>,
    index: AHashMap<RcId, RcIndex>,
}

impl StationModel {
    pub fn new(circuits: Vec<RcNode>, signals: Vec<SignalNode>) -> Result<Self, ConfigError> {
        let mut index = AHashMap::with_capacity(circuits.len());
        for (i, node) in circuits.iter().enumerate() {
            let slot = RcIndex(u32::try_from(i).unwrap_or(u32::MAX));
            if index.insert(node.id.clone(), slot).is_some() {
                return Err(ConfigError::DuplicateCircuit(node.id.clone()));
            }
        }

        for node in &circuits {
            for link in node.prev_links.iter().chain(node.next_links.iter()) {
                if !index.contains_key(&link.target) {
                    return Err(ConfigError::UnknownLinkTarget {
                        from: node.id.clone(),
                        target: link.target.clone(),
                    });
                }
            }
        }

        for signal in &signals {
            for section in signal.prev_sec.iter().chain(signal.next_sec.iter()) {
                if !index.contains_key(section) {
                    return Err(ConfigError::UnknownSignalSection {
                        signal: signal.id.clone(),
                        circuit: section.clone(),
                    });
                }
            }
        }

        Ok(Self {
            circuits,
            signals,
            index,
        })
    }

    pub fn index_of(&self, id: &RcId) -> Option<RcIndex> {
        self.index.get(id).copied()
    }

    pub fn node(&self, index: RcIndex) -> &RcNode {
        &self.circuits[index.get()]
    }

    pub fn get(&self, id: &RcId) -> Option<&RcNode> {
        self.index_of(id).map(|i| self.node(i))
    }

    pub fn circuits(&self) -> &[RcNode] {
        &self.circuits
    }

    pub fn signals(&self) -> &[SignalNode] {
        &self.signals
    }

    pub fn signal(&self, id: &SignalId) -> Option<&SignalNode> {
        self.signals.iter().find(|s| &s.id == id)
    }

    /// Unknown circuits cannot be locked.
    pub fn can_lock(&self, id: &RcId) -> bool {
        self.get(id).is_some_and(|n| n.can_lock)
    }

    /// Signal guarding the passage from `prev_sec` into `next_sec`.
    ///
    /// An exact section-pair match wins; otherwise the first signal whose
    /// `next_sec` matches, then the first whose `prev_sec` matches.
    pub fn pick_signal(&self, prev_sec: &RcId, next_sec: &RcId) -> Option<&SignalId> {
        let mut by_next = None;
        let mut by_prev = None;
        for signal in &self.signals {
            let prev_hit = signal.prev_sec.as_ref() == Some(prev_sec);
            let next_hit = signal.next_sec.as_ref() == Some(next_sec);
            if prev_hit && next_hit {
                return Some(&signal.id);
            }
            if by_next.is_none() && next_hit {
                by_next = Some(&signal.id);
            }
            if by_prev.is_none() && prev_hit {
                by_prev = Some(&signal.id);
            }
        }
        by_next.or(by_prev)
    }
}
