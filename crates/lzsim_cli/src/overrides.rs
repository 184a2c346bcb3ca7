use anyhow::{anyhow, bail, Result};
use lzsim_core::{DetectorsConfig, SimulationConfig, VariantId, WindowTimings};
use std::collections::BTreeMap;

const PHASE_FIELDS: &[&str] = &["ts01", "ts02", "tlz", "tkon"];
const ROUTE_FIELDS: &[&str] = &["ts01", "ts02", "ts03", "tlz", "tkon"];
const WINDOW_FIELDS: &[&str] = &["ts01", "tlz01", "tlz02", "ts02", "tkon"];

fn fields_of(variant: VariantId) -> &'static [&'static str] {
    match variant {
        VariantId::Ls4 => WINDOW_FIELDS,
        VariantId::Lz10 => ROUTE_FIELDS,
        _ => PHASE_FIELDS,
    }
}

/// Every accepted override key: `t_pk` and `<variant>.<timing>`.
pub fn valid_keys() -> Vec<String> {
    let mut keys = vec!["t_pk".to_string()];
    for variant in VariantId::ALL {
        keys.extend(fields_of(variant).iter().map(|f| format!("{}.{f}", variant.key())));
    }
    keys
}

/// Apply scenario overrides. A timing override touches every controlled
/// circuit that configures the variant; at least one must.
pub fn apply_overrides(
    config: &mut SimulationConfig,
    overrides: &BTreeMap<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in overrides {
        let seconds = as_seconds(key, value)?;
        if key == "t_pk" {
            config.t_pk = seconds;
            continue;
        }
        let Some((variant, field)) = parse_key(key) else {
            bail!(
                "unknown override key '{key}'. Valid keys: {}",
                valid_keys().join(", ")
            );
        };
        let mut touched = 0usize;
        for det in &mut config.detectors {
            if set_timing(det, variant, field, seconds) {
                touched += 1;
            }
        }
        if touched == 0 {
            bail!("override '{key}': no controlled circuit configures {variant}");
        }
        tracing::debug!(key = %key, seconds, circuits = touched, "override applied");
    }
    Ok(())
}

fn parse_key(key: &str) -> Option<(VariantId, &str)> {
    let (variant, field) = key.split_once('.')?;
    let variant = VariantId::from_key(variant)?;
    fields_of(variant).contains(&field).then_some((variant, field))
}

fn set_timing(det: &mut DetectorsConfig, variant: VariantId, field: &str, seconds: f64) -> bool {
    if variant == VariantId::Ls4 {
        return det
            .ls4
            .as_mut()
            .is_some_and(|w| set_window_timing(w, field, seconds));
    }
    if field == "ts03" {
        let Some(route) = det.lz10.as_mut() else {
            return false;
        };
        route.ts03 = seconds;
        return true;
    }
    let Some(t) = det.phase_timings_mut(variant) else {
        return false;
    };
    match field {
        "ts01" => t.ts01 = seconds,
        "ts02" => t.ts02 = Some(seconds),
        "tlz" => t.tlz = seconds,
        "tkon" => t.tkon = seconds,
        _ => return false,
    }
    true
}

fn set_window_timing(w: &mut WindowTimings, field: &str, seconds: f64) -> bool {
    match field {
        "ts01" => w.ts01 = seconds,
        "tlz01" => w.tlz01 = seconds,
        "tlz02" => w.tlz02 = seconds,
        "ts02" => w.ts02 = Some(seconds),
        "tkon" => w.tkon = seconds,
        _ => return false,
    }
    true
}

fn as_seconds(key: &str, value: &serde_json::Value) -> Result<f64> {
    let seconds = value
        .as_f64()
        .ok_or_else(|| anyhow!("override '{key}': expected a number, got {value}"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("override '{key}': expected a non-negative number, got {seconds}");
    }
    Ok(seconds)
}
