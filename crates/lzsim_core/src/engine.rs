use crate::detector::{StepOutcome, Transition};
use smallvec::SmallVec;
use crate::exceptions::apply_phase_exception_policy;
use crate::predicate::TickView;
use crate::variants::{build_variant, DetectorsConfig, VariantId};
use crate::wrapper::DetectorNode;
use crate::{ConfigError, RcId};

/// All detectors of one controlled circuit, in catalog order.
#[derive(Debug)]
pub struct DetectorsState {
    ctrl: RcId,
    variants: Vec<(VariantId, DetectorNode)>,
    last_prev: Option<RcId>,
    last_next: Option<RcId>,
}

impl DetectorsState {
    pub fn ctrl(&self) -> &RcId {
        &self.ctrl
    }

    pub fn variants(&self) -> impl Iterator<Item = (VariantId, &DetectorNode)> {
        self.variants.iter().map(|(id, node)| (*id, node))
    }

    pub fn node(&self, variant: VariantId) -> Option<&DetectorNode> {
        self.variants
            .iter()
            .find(|(id, _)| *id == variant)
            .map(|(_, node)| node)
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn any_active(&self) -> bool {
        self.variants.iter().any(|(_, node)| node.is_active())
    }

    /// Highest code among active variants, 0 when none is active.
    pub fn active_variant(&self) -> u16 {
        self.variants
            .iter()
            .filter(|(_, node)| node.is_active())
            .map(|(id, _)| id.code())
            .max()
            .unwrap_or(0)
    }

    pub fn reset(&mut self) {
        for (_, node) in &mut self.variants {
            node.reset();
        }
        self.last_prev = None;
        self.last_next = None;
    }
}

/// Per-variant result of one `update_detectors` call.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantOutcome {
    pub variant: VariantId,
    pub opened: bool,
    pub closed: bool,
    pub active: bool,
    pub open_offset: Option<f64>,
    pub close_offset: Option<f64>,
    /// Every open and close of the call; one per branch for wrapped variants.
    pub transitions: SmallVec<[Transition; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorsResult {
    pub opened: bool,
    pub closed: bool,
    pub open_offset: Option<f64>,
    pub close_offset: Option<f64>,
    pub variants: Vec<VariantOutcome>,
    /// Highest code among active variants, 0 when none is active.
    pub active_variant: u16,
    pub lz_state: bool,
    /// Event flags in catalog order, e.g. `llz_v1_open`.
    pub flags: Vec<String>,
}

impl DetectorsResult {
    pub fn outcome(&self, variant: VariantId) -> Option<&VariantOutcome> {
        self.variants.iter().find(|o| o.variant == variant)
    }

    pub fn opened_variant(&self, variant: VariantId) -> bool {
        self.outcome(variant).is_some_and(|o| o.opened)
    }

    pub fn closed_variant(&self, variant: VariantId) -> bool {
        self.outcome(variant).is_some_and(|o| o.closed)
    }
}

/// Build every configured variant for `cfg.ctrl_rc_id` and attach the
/// enabled exception kinds.
pub fn init_detectors(cfg: &DetectorsConfig) -> Result<DetectorsState, ConfigError> {
    let mut variants = Vec::new();
    for variant in cfg.enabled() {
        let Some(mut node) = build_variant(variant, cfg)? else {
            continue;
        };
        apply_phase_exception_policy(&mut node, variant, &cfg.exceptions);
        variants.push((variant, node));
    }
    tracing::debug!(
        ctrl = %cfg.ctrl_rc_id,
        variants = variants.len(),
        "detectors initialised"
    );
    Ok(DetectorsState {
        ctrl: cfg.ctrl_rc_id.clone(),
        variants,
        last_prev: None,
        last_next: None,
    })
}

/// Advance every detector of one circuit by `dt` against one snapshot.
///
/// When the effective neighbors differ from the previous call, detectors
/// that are still forming start over; open faults run on.
pub fn update_detectors(
    state: &mut DetectorsState,
    view: &TickView<'_>,
    dt: f64,
) -> DetectorsResult {
    let neighbors = view.neighbors;
    if neighbors.prev != state.last_prev || neighbors.next != state.last_next {
        for (_, node) in &mut state.variants {
            node.reset_formation();
        }
        state.last_prev.clone_from(&neighbors.prev);
        state.last_next.clone_from(&neighbors.next);
    }

    let mut result = DetectorsResult::default();
    let mut total = StepOutcome::default();
    for (variant, node) in &mut state.variants {
        let outcome = node.update(view, dt);
        total.merge(&outcome);

        let active = node.is_active();
        if active {
            result.lz_state = true;
            result.active_variant = result.active_variant.max(variant.code());
        }
        let prefix = variant.flag_prefix();
        if outcome.opened {
            result.flags.push(format!("{prefix}_open"));
        }
        if outcome.closed {
            result.flags.push(format!("{prefix}_closed"));
        }
        result.variants.push(VariantOutcome {
            variant: *variant,
            opened: outcome.opened,
            closed: outcome.closed,
            active,
            open_offset: outcome.open_offset,
            close_offset: outcome.close_offset,
            transitions: outcome.transitions,
        });
    }

    result.opened = total.opened;
    result.closed = total.closed;
    result.open_offset = total.open_offset;
    result.close_offset = total.close_offset;
    result
}
