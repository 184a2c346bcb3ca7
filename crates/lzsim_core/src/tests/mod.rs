use super::*;
use crate::test_fixtures::*;

mod detector;
mod exceptions;

// --- Shared test helpers ------------------------------------------------

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

fn assert_offset(actual: Option<f64>, expected: f64) {
    match actual {
        Some(value) => assert_close(value, expected),
        None => panic!("expected offset {expected}, got none"),
    }
}

/// Single-circuit context on the linear station.
fn linear_context(cfg: DetectorsConfig) -> SimulationContext {
    SimulationContext::new(linear_station(), &sim_config(vec![cfg])).unwrap()
}

fn simple(node: &DetectorNode) -> &Detector {
    match node {
        DetectorNode::Simple(d) => d,
        other => panic!("expected a simple detector, got {}", other.name()),
    }
}

fn wrapper(node: &DetectorNode) -> &VariantWrapper {
    match node {
        DetectorNode::MultiBranch(w) => w,
        other => panic!("expected a wrapper, got {}", other.name()),
    }
}
