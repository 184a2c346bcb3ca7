//! Loading of station models, simulation configs and scenarios from JSON.

use anyhow::{bail, Context, Result};
use lzsim_core::{
    RcId, RcNode, ScenarioStep, SignalNode, SimulationConfig, StationModel, VariantId,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// On-disk layout of a station file.
#[derive(Debug, Deserialize)]
pub struct StationFile {
    pub circuits: Vec<RcNode>,
    #[serde(default)]
    pub signals: Vec<SignalNode>,
}

/// On-disk layout of a scenario file. Station and config paths are relative
/// to the scenario file.
#[derive(Debug, Deserialize)]
pub struct ScenarioFile {
    pub name: String,
    pub station: PathBuf,
    pub config: PathBuf,
    pub steps: Vec<ScenarioStep>,
    #[serde(default)]
    pub overrides: BTreeMap<String, serde_json::Value>,
}

/// A scenario with its station and config loaded and cross-checked.
#[derive(Debug)]
pub struct Scenario {
    pub name: String,
    pub station: StationModel,
    pub config: SimulationConfig,
    pub steps: Vec<ScenarioStep>,
    pub overrides: BTreeMap<String, serde_json::Value>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn load_station(path: &Path) -> Result<StationModel> {
    let file: StationFile = read_json(path)?;
    let circuits = file.circuits.len();
    let station = StationModel::new(file.circuits, file.signals)
        .with_context(|| format!("building station from {}", path.display()))?;
    tracing::debug!(path = %path.display(), circuits, "station loaded");
    Ok(station)
}

pub fn load_sim_config(path: &Path) -> Result<SimulationConfig> {
    let config: SimulationConfig = read_json(path)?;
    validate_config(&config).with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}

fn check_timing(owner: &str, field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        bail!("{owner}: timing '{field}' must be finite and >= 0, got {value}");
    }
    Ok(())
}

/// Range checks that need no station: the latch window and every timing.
pub fn validate_config(config: &SimulationConfig) -> Result<()> {
    check_timing("simulation", "t_pk", config.t_pk)?;
    if config.detectors.is_empty() {
        bail!("no controlled circuits configured");
    }
    for det in &config.detectors {
        for variant in VariantId::ALL {
            let owner = format!("{} {variant}", det.ctrl_rc_id);
            if let Some(t) = det.phase_timings(variant) {
                check_timing(&owner, "ts01", t.ts01)?;
                check_timing(&owner, "tlz", t.tlz)?;
                check_timing(&owner, "tkon", t.tkon)?;
                if let Some(ts02) = t.ts02 {
                    check_timing(&owner, "ts02", ts02)?;
                }
            }
        }
        if let Some(route) = &det.lz10 {
            check_timing(&format!("{} {}", det.ctrl_rc_id, VariantId::Lz10), "ts03", route.ts03)?;
        }
        if let Some(w) = &det.ls4 {
            let owner = format!("{} {}", det.ctrl_rc_id, VariantId::Ls4);
            for (field, value) in [
                ("ts01", w.ts01),
                ("tlz01", w.tlz01),
                ("tlz02", w.tlz02),
                ("tkon", w.tkon),
            ] {
                check_timing(&owner, field, value)?;
            }
            if let Some(ts02) = w.ts02 {
                check_timing(&owner, "ts02", ts02)?;
            }
        }
    }
    Ok(())
}

fn require_circuit(station: &StationModel, id: &RcId, what: &str) -> Result<()> {
    if station.index_of(id).is_none() {
        bail!("{what} '{id}' is not in the station");
    }
    Ok(())
}

/// Cross-reference checks between a config, its station and the steps that
/// will drive it.
pub fn validate_scenario(
    station: &StationModel,
    config: &SimulationConfig,
    steps: &[ScenarioStep],
) -> Result<()> {
    for det in &config.detectors {
        require_circuit(station, &det.ctrl_rc_id, "controlled circuit")?;
        if let Some(prev) = &det.prev_rc_id {
            require_circuit(station, prev, "prev circuit")?;
        }
        if let Some(next) = &det.next_rc_id {
            require_circuit(station, next, "next circuit")?;
        }
        let guards = det.lz13.iter().chain(det.ls6.iter());
        let routes = det.lz10.iter();
        let pairs = det.lz11.iter();
        let signals = guards
            .flat_map(|g| [g.sig_prev.as_ref(), g.sig_next.as_ref()])
            .chain(routes.flat_map(|r| [r.sig_to_next.as_ref(), r.sig_to_prev.as_ref()]))
            .chain(pairs.flat_map(|p| [p.sig_a.as_ref(), p.sig_b.as_ref()]))
            .flatten();
        for signal in signals {
            if station.signal(signal).is_none() {
                bail!("{}: signal '{signal}' is not in the station", det.ctrl_rc_id);
            }
        }
    }

    for (i, step) in steps.iter().enumerate() {
        if !step.duration.is_finite() || step.duration < 0.0 {
            bail!("step {i}: duration must be finite and >= 0, got {}", step.duration);
        }
        for id in step.rc_states.keys() {
            require_circuit(station, id, &format!("step {i}: circuit"))?;
        }
    }
    Ok(())
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let file: ScenarioFile = read_json(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let station = load_station(&base.join(&file.station))?;
    let config = load_sim_config(&base.join(&file.config))?;
    validate_scenario(&station, &config, &file.steps)
        .with_context(|| format!("validating scenario {}", path.display()))?;
    tracing::info!(
        scenario = %file.name,
        steps = file.steps.len(),
        circuits = config.detectors.len(),
        "scenario loaded"
    );
    Ok(Scenario {
        name: file.name,
        station,
        config,
        steps: file.steps,
        overrides: file.overrides,
    })
}

/// Write `run_info.json` describing one run into `dir`.
pub fn write_run_info(
    dir: &Path,
    run_id: &str,
    scenario: &str,
    t_pk: f64,
    extra: serde_json::Value,
) -> Result<()> {
    let info = serde_json::json!({
        "run_id": run_id,
        "scenario": scenario,
        "start_time": chrono::Utc::now().to_rfc3339(),
        "t_pk": t_pk,
        "runner": extra,
    });
    let path = dir.join("run_info.json");
    let file =
        std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &info)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lzsim_core::test_fixtures::*;
    use lzsim_core::{
        DetectorsConfig, PhaseTimings, RouteSignalTimings, SignalGuardTimings, SignalPairTimings,
        WindowTimings,
    };

    fn write(dir: &Path, name: &str, json: &serde_json::Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string_pretty(json).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_station_with_gated_links() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "station.json",
            &serde_json::json!({
                "circuits": [
                    { "id": "A", "next_links": [ { "target": "B" } ] },
                    {
                        "id": "B",
                        "prev_links": [ { "target": "A" } ],
                        "next_links": [
                            { "target": "C", "switch": "SW1", "position": "plus" },
                            { "target": "D", "switch": "SW1", "position": "minus" }
                        ],
                        "can_lock": false
                    },
                    { "id": "C", "is_endpoint": true },
                    { "id": "D" }
                ],
                "signals": [ { "id": "S1", "prev_sec": "A", "next_sec": "B" } ]
            }),
        );
        let station = load_station(&path).unwrap();
        assert_eq!(station.circuits().len(), 4);
        let b = station.get(&rc("B")).unwrap();
        assert!(!b.can_lock);
        assert_eq!(b.next_links[1].switch, Some(sw("SW1")));
        assert!(station.get(&rc("C")).unwrap().is_endpoint);
        assert_eq!(station.pick_signal(&rc("A"), &rc("B")), Some(&sig("S1")));
    }

    #[test]
    fn test_station_unknown_link_target_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "station.json",
            &serde_json::json!({
                "circuits": [ { "id": "A", "next_links": [ { "target": "Q" } ] } ]
            }),
        );
        let err = format!("{:#}", load_station(&path).unwrap_err());
        assert!(err.contains("building station"), "{err}");
        assert!(err.contains("'Q'"), "{err}");
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_sim_config(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_config_timing_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.json",
            &serde_json::json!({
                "detectors": [ {
                    "ctrl_rc_id": "B",
                    "lz1": { "ts01": 3.0, "tlz": 2.0, "tkon": 4.0 }
                } ]
            }),
        );
        let config = load_sim_config(&path).unwrap();
        assert!((config.t_pk - 30.0).abs() < 1e-9);
        assert_eq!(config.detectors[0].lz1, Some(PhaseTimings::new(3.0, 2.0, 4.0)));
    }

    #[test]
    fn test_negative_timing_rejected() {
        let mut cfg = lz1_config();
        cfg.lz6 = Some(PhaseTimings::new(1.0, -2.0, 1.0));
        let err = validate_config(&sim_config(vec![cfg])).unwrap_err().to_string();
        assert!(err.contains("tlz"), "{err}");
        assert!(err.contains("LZ6"), "{err}");
    }

    #[test]
    fn test_window_timing_checked() {
        let mut cfg = DetectorsConfig::new(rc("B"));
        cfg.ls4 = Some(WindowTimings {
            ts01: 1.0,
            tlz01: f64::NAN,
            tlz02: 1.0,
            ts02: None,
            tkon: 1.0,
        });
        let err = validate_config(&sim_config(vec![cfg])).unwrap_err().to_string();
        assert!(err.contains("tlz01"), "{err}");
    }

    #[test]
    fn test_route_signal_ts03_checked() {
        let mut cfg = ctrl_b();
        cfg.lz10 = Some(RouteSignalTimings {
            timings: PhaseTimings::new(1.0, 1.0, 1.0).with_ts02(1.0),
            ts03: -1.0,
            sig_to_next: None,
            sig_to_prev: None,
        });
        let err = validate_config(&sim_config(vec![cfg])).unwrap_err().to_string();
        assert!(err.contains("ts03"), "{err}");
        assert!(err.contains("LZ10"), "{err}");
    }

    #[test]
    fn test_negative_t_pk_rejected() {
        let mut config = sim_config(vec![lz1_config()]);
        config.t_pk = -5.0;
        assert!(validate_config(&config).is_err());
        assert!(validate_config(&sim_config(Vec::new())).is_err());
    }

    #[test]
    fn test_cross_references() {
        let station = linear_station();
        let ok = sim_config(vec![ctrl_b()]);
        assert!(validate_scenario(&station, &ok, &[pattern(1.0, "000")]).is_ok());

        let mut stray = ctrl_b();
        stray.next_rc_id = Some(rc("Z"));
        let err = validate_scenario(&station, &sim_config(vec![stray]), &[])
            .unwrap_err()
            .to_string();
        assert!(err.contains("next circuit 'Z'"), "{err}");

        let mut guarded = ctrl_b();
        guarded.lz13 = Some(SignalGuardTimings {
            timings: PhaseTimings::new(1.0, 1.0, 1.0).with_ts02(1.0),
            sig_prev: Some(sig("S_XX")),
            sig_next: None,
        });
        assert!(validate_scenario(&station, &sim_config(vec![guarded]), &[]).is_err());

        let mut paired = ctrl_b();
        paired.lz11 = Some(SignalPairTimings {
            timings: PhaseTimings::new(1.0, 1.0, 1.0),
            sig_a: None,
            sig_b: Some(sig("S_YY")),
        });
        let err = validate_scenario(&station, &sim_config(vec![paired]), &[])
            .unwrap_err()
            .to_string();
        assert!(err.contains("S_YY"), "{err}");

        let unknown_rc = step(1.0, &[("Q", FREE)]);
        assert!(validate_scenario(&station, &ok, &[unknown_rc]).is_err());

        let backwards = pattern(-1.0, "000");
        assert!(validate_scenario(&station, &ok, &[backwards]).is_err());
    }

    #[test]
    fn test_run_info_written() {
        let dir = tempfile::tempdir().unwrap();
        write_run_info(
            dir.path(),
            "run-1",
            "demo",
            30.0,
            serde_json::json!({ "name": "test" }),
        )
        .unwrap();
        let text = std::fs::read_to_string(dir.path().join("run_info.json")).unwrap();
        let info: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(info["run_id"], "run-1");
        assert_eq!(info["scenario"], "demo");
        assert_eq!(info["runner"]["name"], "test");
        assert!(info["start_time"].as_str().is_some());
    }
}
