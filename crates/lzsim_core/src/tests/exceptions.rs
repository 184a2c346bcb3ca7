use super::*;

fn entry(duration: f64, flags: &[&str]) -> TimelineStep {
    TimelineStep {
        t: 0.0,
        step_duration: duration,
        ctrl_rc_id: rc("B"),
        effective_prev_rc: Some(rc("A")),
        effective_next_rc: Some(rc("C")),
        rc_states: RcStates::new(),
        switch_states: SwitchStates::new(),
        signal_states: SignalStates::new(),
        modes: ModeMap::new(),
        lz_state: false,
        lz_variant: 0,
        flags: flags.iter().map(ToString::to_string).collect(),
        events: Vec::new(),
        mu_state: None,
        nas_state: None,
        chas_state: None,
        dsp_state: None,
    }
}

#[test]
fn test_set_operations() {
    let set = ExceptionSet::EMPTY
        .with(ExceptionKind::LzMuActive)
        .with(ExceptionKind::LsDspTimeout);
    assert!(set.contains(ExceptionKind::LzMuActive));
    assert!(!set.contains(ExceptionKind::LzRecentLs));
    assert!(set.intersects(ExceptionSet::EMPTY.with(ExceptionKind::LsDspTimeout)));
    assert!(!set.intersects(ExceptionSet::EMPTY));
    assert_eq!(
        set.iter().collect::<Vec<_>>(),
        vec![ExceptionKind::LzMuActive, ExceptionKind::LsDspTimeout]
    );
    for kind in ExceptionKind::ALL {
        assert_eq!(ExceptionKind::from_key(kind.key()), Some(kind));
    }
}

#[test]
fn test_set_from_truthy_mode_keys() {
    let mut modes = ModeMap::new();
    modes.insert("exc_lz_mu_active".to_string(), ModeValue::Bool(true));
    modes.insert("exc_ls_after_lz".to_string(), ModeValue::Int(0));
    modes.insert("exc_lz_dsp_timeout".to_string(), ModeValue::Int(1));
    modes.insert("unrelated".to_string(), ModeValue::Bool(true));
    let set = ExceptionSet::from_modes(&modes);
    assert_eq!(
        set,
        ExceptionSet::EMPTY
            .with(ExceptionKind::LzMuActive)
            .with(ExceptionKind::LzDspTimeout)
    );

    let mut published = ModeMap::new();
    set.publish(&mut published);
    assert_eq!(published.len(), ExceptionKind::ALL.len());
    assert_eq!(
        published.get("exc_ls_mu_active"),
        Some(&ModeValue::Bool(false))
    );
}

#[test]
fn test_local_control_window() {
    let cfg = ExceptionsConfig {
        enable_lz_exc_mu: true,
        ..ExceptionsConfig::default()
    };
    let mut monitor = ExceptionMonitor::new(rc("B"));

    let mut local = step(5.0, &[("B", FREE)]);
    local.mu.insert(rc("B"), 1);
    assert!(monitor
        .evaluate(&local, &cfg)
        .contains(ExceptionKind::LzMuActive));

    let quiet = step(10.0, &[("B", FREE)]);
    assert!(monitor
        .evaluate(&quiet, &cfg)
        .contains(ExceptionKind::LzMuActive));
    assert!(!monitor
        .evaluate(&quiet, &cfg)
        .contains(ExceptionKind::LzMuActive));
}

#[test]
fn test_local_control_on_a_neighbor_counts_after_record() {
    let cfg = ExceptionsConfig {
        enable_ls_exc_mu: true,
        ..ExceptionsConfig::default()
    };
    let mut monitor = ExceptionMonitor::new(rc("B"));
    let mut neighbor_local = step(1.0, &[]);
    neighbor_local.mu.insert(rc("A"), 4);

    assert!(!monitor
        .evaluate(&neighbor_local, &cfg)
        .contains(ExceptionKind::LsMuActive));
    monitor.record(&entry(1.0, &[]));
    assert!(monitor
        .evaluate(&neighbor_local, &cfg)
        .contains(ExceptionKind::LsMuActive));
}

#[test]
fn test_recent_flags_from_timeline() {
    let cfg = ExceptionsConfig {
        enable_lz_exc_recent_ls: true,
        enable_ls_exc_after_lz: true,
        ..ExceptionsConfig::default()
    };
    let mut monitor = ExceptionMonitor::new(rc("B"));
    let quiet = step(10.0, &[]);

    assert!(monitor.evaluate(&quiet, &cfg).is_empty());
    monitor.record(&entry(10.0, &["lls_1_open"]));

    let set = monitor.evaluate(&quiet, &cfg);
    assert!(set.contains(ExceptionKind::LzRecentLs));
    assert!(!set.contains(ExceptionKind::LsAfterLz));
    monitor.record(&entry(10.0, &[]));

    monitor.evaluate(&quiet, &cfg);
    monitor.record(&entry(10.0, &[]));
    monitor.evaluate(&quiet, &cfg);
    monitor.record(&entry(10.0, &[]));
    // The LS flag ended at t = 10; at t = 40 it is outside the window.
    assert!(!monitor
        .evaluate(&quiet, &cfg)
        .contains(ExceptionKind::LzRecentLs));
}

#[test]
fn test_dispatcher_timeout_needs_long_occupancy() {
    let cfg = ExceptionsConfig {
        enable_lz_exc_dsp: true,
        ..ExceptionsConfig::default()
    };
    let manoeuvre = |duration: f64| {
        let mut s = step(duration, &[("B", OCCUPIED)]);
        s.dispatcher_control_state = Some(4);
        s.auto_actions.insert("nas".to_string(), 0);
        s
    };

    let mut monitor = ExceptionMonitor::new(rc("B"));
    assert!(!monitor
        .evaluate(&manoeuvre(300.0), &cfg)
        .contains(ExceptionKind::LzDspTimeout));
    assert!(monitor
        .evaluate(&manoeuvre(300.0), &cfg)
        .contains(ExceptionKind::LzDspTimeout));

    let mut interrupted = ExceptionMonitor::new(rc("B"));
    interrupted.evaluate(&step(100.0, &[("B", FREE)]), &cfg);
    assert!(!interrupted
        .evaluate(&manoeuvre(550.0), &cfg)
        .contains(ExceptionKind::LzDspTimeout));
}

#[test]
fn test_policy_guards_final_phase_only() {
    let mut cfg = lz1_config();
    cfg.exceptions.enable_lz_exc_mu = true;
    cfg.exceptions.enable_ls_exc_mu = true;
    let mut node = build_variant(VariantId::Lz1, &cfg).unwrap().unwrap();
    apply_phase_exception_policy(&mut node, VariantId::Lz1, &cfg.exceptions);

    let phases = &simple(&node).config().phases;
    assert!(phases[0].abort.is_empty());
    assert!(phases[1].abort.contains(ExceptionKind::LzMuActive));
    assert!(!phases[1].abort.contains(ExceptionKind::LsMuActive));
}

#[test]
fn test_policy_limits_dispatcher_kind_to_listed_variants() {
    let mut cfg = lz1_config();
    cfg.exceptions.enable_lz_exc_dsp = true;
    cfg.exceptions.lz_exc_dsp_variants = vec![8];
    let mut node = build_variant(VariantId::Lz1, &cfg).unwrap().unwrap();
    apply_phase_exception_policy(&mut node, VariantId::Lz1, &cfg.exceptions);
    assert!(simple(&node)
        .config()
        .phases
        .iter()
        .all(|p| p.abort.is_empty()));

    cfg.exceptions.lz_exc_dsp_variants.clear();
    let mut node = build_variant(VariantId::Lz1, &cfg).unwrap().unwrap();
    apply_phase_exception_policy(&mut node, VariantId::Lz1, &cfg.exceptions);
    assert!(simple(&node)
        .config()
        .phases
        .iter()
        .all(|p| p.abort.contains(ExceptionKind::LzDspTimeout)));
}

#[test]
fn test_local_control_suppresses_the_opening() {
    let mut cfg = lz1_config();
    cfg.exceptions.enable_lz_exc_mu = true;
    let mut ctx = linear_context(cfg);

    let mut local = pattern(3.0, "010");
    local.mu.insert(rc("B"), 1);
    let timeline = ctx.run(&[pattern(3.0, "000"), local]);
    assert!(timeline.iter().all(|e| e.flags.is_empty()));
    assert_eq!(
        timeline[1].modes.get("exc_lz_mu_active"),
        Some(&ModeValue::Bool(true))
    );
    let lz1 = simple(ctx.detectors(&rc("B")).unwrap().node(VariantId::Lz1).unwrap());
    assert_eq!(lz1.current_phase_id(), 0);
}

#[test]
fn test_mode_flag_suppresses_the_opening() {
    let mut cfg = lz1_config();
    cfg.exceptions.enable_lz_exc_mu = true;
    let mut ctx = linear_context(cfg);

    let mut flagged = pattern(3.0, "010");
    flagged
        .modes
        .insert("exc_lz_mu_active".to_string(), ModeValue::Bool(true));
    let timeline = ctx.run(&[pattern(3.0, "000"), flagged, pattern(1.0, "010")]);
    assert!(timeline[1].flags.is_empty());
    // Without the flag the chain has to re-form from the first phase.
    assert!(timeline[2].flags.is_empty());
}
