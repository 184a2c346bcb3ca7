//! Integration test: whole-station scenarios through the simulation driver.

use lzsim_core::test_fixtures::*;
use lzsim_core::*;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

fn all_events(timeline: &[TimelineStep]) -> Vec<(VariantId, EventKind, f64)> {
    timeline
        .iter()
        .flat_map(|e| e.events.iter().map(|ev| (ev.variant, ev.kind, ev.t)))
        .collect()
}

fn switched(b: DetectorsConfig) -> SimulationContext {
    SimulationContext::new(switched_station(), &sim_config(vec![b])).unwrap()
}

fn sw1(duration: f64, b: RawState, code: RawState) -> ScenarioStep {
    with_switches(
        step(duration, &[("A", FREE), ("B", b), ("C", FREE), ("D", FREE)]),
        &[("SW1", code)],
    )
}

#[test]
fn latch_survives_t_pk_then_drops() {
    let mut ctx = switched(ctrl_b());
    ctx.step(&sw1(1.0, FREE, SWITCH_PLUS));

    let lost: Vec<ScenarioStep> = (0..35).map(|_| sw1(1.0, FREE, SWITCH_LOST)).collect();
    let timeline = ctx.run(&lost);
    for (second, entry) in (1..=35).zip(&timeline) {
        let expected = (second <= 30).then(|| rc("C"));
        assert_eq!(entry.effective_next_rc, expected, "after {second} s lost");
        assert_eq!(entry.effective_prev_rc, Some(rc("A")));
    }
    let state = ctx.topology().state(ctx.topology().station().index_of(&rc("B")).unwrap());
    assert_eq!(state.latched_next, None);
}

#[test]
fn switch_change_restarts_formation() {
    let mut cfg = ctrl_b();
    cfg.lz6 = Some(PhaseTimings::new(2.0, 1.0, 1.0));

    let mut steady = switched(cfg.clone());
    let timeline = steady.run(&[
        sw1(1.0, FREE, SWITCH_PLUS),
        sw1(1.0, FREE, SWITCH_PLUS),
        sw1(1.0, OCCUPIED, SWITCH_PLUS),
    ]);
    assert_eq!(
        all_events(&timeline),
        vec![(VariantId::Lz6, EventKind::Opened, 3.0)]
    );

    let mut thrown = switched(cfg);
    let timeline = thrown.run(&[
        sw1(1.0, FREE, SWITCH_PLUS),
        sw1(1.0, FREE, SWITCH_MINUS),
        sw1(1.0, OCCUPIED, SWITCH_MINUS),
    ]);
    assert_eq!(timeline[1].effective_next_rc, Some(rc("D")));
    assert!(all_events(&timeline).is_empty());
}

#[test]
fn guarded_approach_behind_closed_signal() {
    let mut cfg = ctrl_b();
    cfg.lz13 = Some(SignalGuardTimings {
        timings: PhaseTimings::new(1.0, 1.0, 2.0).with_ts02(1.0),
        sig_prev: None,
        sig_next: None,
    });
    let mut ctx = linear_context(cfg);
    let approach = |a: RawState, b: RawState| {
        with_signals(
            step(1.0, &[("A", a), ("B", b), ("C", FREE)]),
            &[("S_AB", SIGNAL_CLOSED), ("S_CB", SIGNAL_OPEN)],
        )
    };
    let timeline = ctx.run(&[
        approach(FREE_LOCKED, FREE),
        approach(OCCUPIED, FREE),
        approach(OCCUPIED, OCCUPIED),
        approach(FREE, FREE),
        approach(FREE, FREE),
    ]);

    let events = all_events(&timeline);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, VariantId::Lz13);
    assert_eq!(events[0].1, EventKind::Opened);
    assert_close(events[0].2, 3.0);
    assert_eq!(events[1].1, EventKind::Closed);
    assert_close(events[1].2, 5.0);
    assert_eq!(timeline[2].lz_variant, 13);
    assert_eq!(timeline[2].flags, vec!["llz_v13_open".to_string()]);
}

#[test]
fn timed_window_false_clear() {
    let mut cfg = ctrl_b();
    cfg.ls4 = Some(WindowTimings {
        ts01: 2.0,
        tlz01: 1.0,
        tlz02: 3.0,
        ts02: Some(2.0),
        tkon: 3.0,
    });
    let mut ctx = linear_context(cfg);
    let timeline = ctx.run(&[
        pattern(3.0, "111"),
        pattern(2.0, "101"),
        pattern(2.0, "111"),
        pattern(1.0, "111"),
    ]);

    let events = all_events(&timeline);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].1, EventKind::Opened);
    assert_close(events[0].2, 7.0);
    assert_eq!(events[1].1, EventKind::Closed);
    assert_close(events[1].2, 8.0);
    assert_eq!(timeline[2].lz_variant, 104);
    assert_eq!(timeline[2].flags, vec!["lls_4_open".to_string()]);
}

#[test]
fn false_clear_outranks_false_occupancy() {
    let mut cfg = lz1_config();
    cfg.ls1 = Some(PhaseTimings::new(2.0, 2.0, 5.0));
    let mut ctx = linear_context(cfg);
    let timeline = ctx.run(&[
        pattern(2.0, "000"),
        pattern(2.0, "010"),
        pattern(2.0, "000"),
    ]);
    assert_eq!(timeline[1].lz_variant, 1);
    assert_eq!(timeline[2].lz_variant, 101);
    assert!(timeline[2].lz_state);
}

#[test]
fn timeline_serialises_to_json() {
    let mut ctx = linear_context(lz1_config());
    let timeline = ctx.run(&[pattern(3.0, "000"), pattern(3.0, "010")]);
    let json = serde_json::to_value(&timeline).unwrap();
    assert_eq!(json[1]["flags"][0], "llz_v1_open");
    assert_eq!(json[1]["events"][0]["variant"], "lz1");
    assert_eq!(json[1]["events"][0]["kind"], "opened");
    assert_eq!(json[1]["ctrl_rc_id"], "B");
    assert!(json[1].get("mu_state").is_none());

    let back: Vec<TimelineStep> = serde_json::from_value(json).unwrap();
    assert_eq!(back, timeline);
}

fn linear_context(cfg: DetectorsConfig) -> SimulationContext {
    SimulationContext::new(linear_station(), &sim_config(vec![cfg])).unwrap()
}
