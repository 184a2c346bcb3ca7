use super::*;

/// `000` for `t1`, then `010` for `t2`, free-time completion.
fn two_phase(t1: f64, t2: f64, t_kon: f64) -> Detector {
    let config = DetectorConfig::new("test", t_kon, CompletionMode::FreeTime)
        .phase(
            PhaseConfig::new(0, t1, NextPhase::Phase(1))
                .mask(Mask::Rc000)
                .requires(NeighborRequirement::Both)
                .reset_on_exit(true),
        )
        .phase(
            PhaseConfig::new(1, t2, NextPhase::Open)
                .mask(Mask::Rc010)
                .requires(NeighborRequirement::Both)
                .reset_on_exit(true),
        );
    Detector::new(config, rc("B")).unwrap()
}

/// One phase watching the controlled circuit occupied.
fn occupied_for(duration: f64, mode: TimerMode) -> Detector {
    let config = DetectorConfig::new("occ", 1.0, CompletionMode::FreeTime).phase(
        PhaseConfig::new(0, duration, NextPhase::Open)
            .mask(Mask::CtrlOccupied)
            .timer_mode(mode),
    );
    Detector::new(config, rc("B")).unwrap()
}

#[test]
fn test_opens_and_closes_with_exact_offsets() {
    let mut d = two_phase(2.0, 2.0, 3.0);

    let out = d.update(&Tick::pattern("000").view(), 3.0);
    assert!(!out.opened);
    assert_eq!(d.current_phase_id(), 1);

    let out = d.update(&Tick::pattern("010").view(), 3.0);
    assert!(out.opened && !out.closed);
    assert_offset(out.open_offset, 2.0);
    assert!(d.is_active());

    let out = d.update(&Tick::pattern("000").view(), 5.0);
    assert!(out.closed && !out.opened);
    assert_offset(out.close_offset, 3.0);
    assert!(!d.is_active());
    // The 2 s left after the close went back into formation.
    assert_eq!(d.current_phase_id(), 1);
}

#[test]
fn test_fine_slices_open_at_the_same_instant() {
    let mut d = two_phase(2.0, 2.0, 3.0);
    d.update(&Tick::pattern("000").view(), 2.0);
    let tick = Tick::pattern("010");
    let mut opened_at = None;
    let mut t = 0.0;
    for _ in 0..8 {
        let out = d.update(&tick.view(), 0.25);
        if out.opened {
            opened_at = Some(t + out.open_offset.unwrap_or(0.0));
        }
        t += 0.25;
    }
    assert_offset(opened_at, 2.0);
}

#[test]
fn test_continuous_timer_resets_on_failing_tick() {
    let mut d = occupied_for(4.0, TimerMode::Continuous);
    d.update(&Tick::pattern("010").view(), 3.0);
    assert_close(d.timer(), 3.0);
    d.update(&Tick::pattern("000").view(), 1.0);
    assert_close(d.timer(), 0.0);
    let out = d.update(&Tick::pattern("010").view(), 3.0);
    assert!(!out.opened);
}

#[test]
fn test_cumulative_timer_survives_failing_tick() {
    let mut d = occupied_for(4.0, TimerMode::Cumulative);
    d.update(&Tick::pattern("010").view(), 3.0);
    d.update(&Tick::pattern("000").view(), 1.0);
    assert_close(d.timer(), 3.0);
    let out = d.update(&Tick::pattern("010").view(), 3.0);
    assert!(out.opened);
    assert_offset(out.open_offset, 1.0);
}

#[test]
fn test_reset_is_idempotent() {
    let mut d = two_phase(2.0, 2.0, 3.0);
    d.update(&Tick::pattern("000").view(), 2.5);
    d.update(&Tick::pattern("010").view(), 1.0);
    for _ in 0..2 {
        d.reset();
        assert_eq!(d.current_phase_id(), 0);
        assert_close(d.timer(), 0.0);
        assert_close(d.completion_timer(), 0.0);
        assert!(!d.is_active());
    }
}

#[test]
fn test_abort_exception_returns_to_initial_phase() {
    let mut d = two_phase(2.0, 2.0, 3.0);
    d.attach_exceptions(
        ExceptionSet::EMPTY,
        ExceptionSet::EMPTY.with(ExceptionKind::LzMuActive),
    );
    d.update(&Tick::pattern("000").view(), 2.0);
    assert_eq!(d.current_phase_id(), 1);

    let mut tick = Tick::pattern("010");
    tick.exceptions = ExceptionSet::EMPTY.with(ExceptionKind::LzMuActive);
    let out = d.update(&tick.view(), 3.0);
    assert!(!out.opened);
    assert_eq!(d.current_phase_id(), 0);
    assert_close(d.timer(), 0.0);
}

#[test]
fn test_abort_without_reset_keeps_phase() {
    let config = DetectorConfig::new("keep", 1.0, CompletionMode::FreeTime).phase(
        PhaseConfig::new(0, 4.0, NextPhase::Open)
            .mask(Mask::CtrlOccupied)
            .timer_mode(TimerMode::Cumulative)
            .reset_on_exception(false)
            .abort_on(ExceptionKind::LsAfterLz),
    );
    let mut d = Detector::new(config, rc("B")).unwrap();
    d.update(&Tick::pattern("010").view(), 2.0);

    let mut tick = Tick::pattern("010");
    tick.exceptions = ExceptionSet::EMPTY.with(ExceptionKind::LsAfterLz);
    d.update(&tick.view(), 5.0);
    assert_close(d.timer(), 2.0);

    let out = d.update(&Tick::pattern("010").view(), 2.0);
    assert!(out.opened);
}

#[test]
fn test_unrelated_exception_does_not_abort() {
    let mut d = two_phase(1.0, 1.0, 3.0);
    d.attach_exceptions(
        ExceptionSet::EMPTY,
        ExceptionSet::EMPTY.with(ExceptionKind::LzMuActive),
    );
    d.update(&Tick::pattern("000").view(), 1.0);
    let mut tick = Tick::pattern("010");
    tick.exceptions = ExceptionSet::EMPTY.with(ExceptionKind::LsMuActive);
    assert!(d.update(&tick.view(), 1.0).opened);
}

#[test]
fn test_lost_neighbor_restarts_formation() {
    let mut d = two_phase(2.0, 2.0, 3.0);
    d.update(&Tick::pattern("000").view(), 2.0);
    assert_eq!(d.current_phase_id(), 1);

    let mut tick = Tick::pattern("010");
    tick.neighbors.next = None;
    tick.neighbors.next_ok = false;
    d.update(&tick.view(), 1.0);
    assert_eq!(d.current_phase_id(), 0);
}

#[test]
fn test_zero_duration_phases_open_without_consuming_time() {
    let config = DetectorConfig::new("instant", 1.0, CompletionMode::OccupiedTime)
        .phase(PhaseConfig::new(0, 0.0, NextPhase::Phase(1)).mask(Mask::CtrlOccupied))
        .phase(PhaseConfig::new(1, 0.0, NextPhase::Open).mask(Mask::CtrlOccupied));
    let mut d = Detector::new(config, rc("B")).unwrap();
    let out = d.update(&Tick::pattern("010").view(), 0.5);
    assert!(out.opened && !out.closed);
    assert_offset(out.open_offset, 0.0);
    assert_close(d.completion_timer(), 0.5);
}

#[test]
fn test_unreported_controlled_circuit_completes_as_free() {
    let always = FnPredicate::new("always", |_, _, _, _| true);
    let config = DetectorConfig::new("ghost", 2.0, CompletionMode::FreeTime)
        .phase(PhaseConfig::new(0, 1.0, NextPhase::Open).predicate(always));
    let mut d = Detector::new(config, rc("Z")).unwrap();
    let out = d.update(&Tick::linear(&[]).view(), 4.0);
    assert!(out.opened && out.closed);
    assert_offset(out.open_offset, 1.0);
    assert_offset(out.close_offset, 3.0);
}

#[derive(Debug)]
struct SignalClosed;

impl CompletionCheck for SignalClosed {
    fn holds(&self, view: &TickView<'_>, _ctrl: &RcId) -> bool {
        view.signal_closed(&sig("S_AB"))
    }
}

#[test]
fn test_custom_completion_check_drives_the_close() {
    let config = DetectorConfig::new("custom", 1.0, CompletionMode::FreeTime)
        .phase(PhaseConfig::new(0, 1.0, NextPhase::Open).mask(Mask::CtrlOccupied))
        .custom_completion(SignalClosed);
    let mut d = Detector::new(config, rc("B")).unwrap();

    let mut tick = Tick::pattern("010");
    tick.signal_states.insert(sig("S_AB"), SIGNAL_OPEN);
    let out = d.update(&tick.view(), 3.0);
    assert!(out.opened && !out.closed);

    tick.signal_states.insert(sig("S_AB"), SIGNAL_CLOSED);
    let out = d.update(&tick.view(), 3.0);
    assert!(out.closed);
    assert_offset(out.close_offset, 1.0);
}

#[test]
fn test_construction_rejects_bad_configs() {
    let empty = DetectorConfig::new("empty", 1.0, CompletionMode::FreeTime);
    assert!(matches!(
        Detector::new(empty, rc("B")),
        Err(ConfigError::EmptyPhases { .. })
    ));

    let no_predicate = DetectorConfig::new("bare", 1.0, CompletionMode::FreeTime)
        .phase(PhaseConfig::new(0, 1.0, NextPhase::Open));
    assert!(matches!(
        Detector::new(no_predicate, rc("B")),
        Err(ConfigError::MissingPredicate { phase: 0, .. })
    ));

    let dangling = DetectorConfig::new("dangling", 1.0, CompletionMode::FreeTime)
        .phase(PhaseConfig::new(0, 1.0, NextPhase::Phase(7)).mask(Mask::CtrlFree));
    assert!(matches!(
        Detector::new(dangling, rc("B")),
        Err(ConfigError::UnknownPhase { phase: 7, .. })
    ));

    let duplicate = DetectorConfig::new("dup", 1.0, CompletionMode::FreeTime)
        .phase(PhaseConfig::new(0, 1.0, NextPhase::Open).mask(Mask::CtrlFree))
        .phase(PhaseConfig::new(0, 1.0, NextPhase::Open).mask(Mask::CtrlFree));
    assert!(matches!(
        Detector::new(duplicate, rc("B")),
        Err(ConfigError::DuplicatePhase { phase: 0, .. })
    ));

    let negative = DetectorConfig::new("neg", 1.0, CompletionMode::FreeTime)
        .phase(PhaseConfig::new(0, -1.0, NextPhase::Open).mask(Mask::CtrlFree));
    assert!(matches!(
        Detector::new(negative, rc("B")),
        Err(ConfigError::InvalidTiming {
            field: "duration",
            ..
        })
    ));

    let mut no_completion = DetectorConfig::new("open-ended", 1.0, CompletionMode::FreeTime)
        .phase(PhaseConfig::new(0, 1.0, NextPhase::Open).mask(Mask::CtrlFree));
    no_completion.completion = None;
    assert!(matches!(
        Detector::new(no_completion, rc("B")),
        Err(ConfigError::MissingCompletion { .. })
    ));
}

#[test]
fn test_attach_exceptions_targets_final_phase() {
    let mut d = two_phase(1.0, 1.0, 1.0);
    d.attach_exceptions(
        ExceptionSet::EMPTY.with(ExceptionKind::LzDspTimeout),
        ExceptionSet::EMPTY.with(ExceptionKind::LzRecentLs),
    );
    let phases = &d.config().phases;
    assert!(phases[0].abort.contains(ExceptionKind::LzDspTimeout));
    assert!(!phases[0].abort.contains(ExceptionKind::LzRecentLs));
    assert!(phases[1].abort.contains(ExceptionKind::LzDspTimeout));
    assert!(phases[1].abort.contains(ExceptionKind::LzRecentLs));
}

#[test]
fn test_non_finite_dt_is_ignored() {
    let mut d = occupied_for(1.0, TimerMode::Continuous);
    let out = d.update(&Tick::pattern("010").view(), f64::NAN);
    assert_eq!(out, StepOutcome::default());
    assert_close(d.timer(), 0.0);
}
