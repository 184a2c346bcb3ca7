use anyhow::{Context, Result};
use lzsim_core::{EventKind, RcId, SimulationContext, TimelineStep, VariantId};
use lzsim_world::Scenario;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::overrides;

pub struct RunOutcome {
    pub run_id: String,
    pub name: String,
    pub t_pk: f64,
    pub timeline: Vec<TimelineStep>,
    pub sim_seconds: f64,
    pub wall_time_ms: u64,
}

impl RunOutcome {
    /// Every detection event of the run, in timeline order.
    pub fn events(&self) -> Vec<EventRow> {
        self.timeline
            .iter()
            .flat_map(|entry| {
                entry.events.iter().map(move |e| EventRow {
                    t: e.t,
                    ctrl_rc_id: entry.ctrl_rc_id.clone(),
                    variant: e.variant,
                    kind: e.kind,
                    flag: e.flag(),
                })
            })
            .collect()
    }
}

/// One line of `events.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub t: f64,
    pub ctrl_rc_id: RcId,
    pub variant: VariantId,
    pub kind: EventKind,
    pub flag: String,
}

/// Apply the scenario's overrides and run every step through a fresh context.
pub fn run_scenario(scenario: Scenario) -> Result<RunOutcome> {
    let Scenario {
        name,
        station,
        mut config,
        steps,
        overrides,
    } = scenario;
    overrides::apply_overrides(&mut config, &overrides)
        .with_context(|| format!("applying overrides of scenario '{name}'"))?;

    let start = Instant::now();
    let mut ctx = SimulationContext::new(station, &config)
        .with_context(|| format!("building simulation for scenario '{name}'"))?;
    let timeline = ctx.run(&steps);

    #[allow(clippy::cast_possible_truncation)]
    let wall_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        scenario = %name,
        entries = timeline.len(),
        sim_seconds = ctx.time(),
        wall_time_ms,
        "scenario finished"
    );
    Ok(RunOutcome {
        run_id: Uuid::new_v4().to_string(),
        name,
        t_pk: config.t_pk,
        timeline,
        sim_seconds: ctx.time(),
        wall_time_ms,
    })
}

/// Create `<output_dir>/<name>_<timestamp>_<run_id>` for one run. The id
/// keeps same-second runs of one scenario apart.
pub fn create_run_dir(output_dir: &Path, name: &str, run_id: &str) -> Result<PathBuf> {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let dir = output_dir.join(format!("{name}_{timestamp}_{run_id}"));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating run directory: {}", dir.display()))?;
    Ok(dir)
}

/// Write `timeline.json`, `events.csv` and `run_info.json` into `dir`.
pub fn write_artifacts(dir: &Path, outcome: &RunOutcome, scenario_path: &Path) -> Result<()> {
    let timeline_path = dir.join("timeline.json");
    let file = std::fs::File::create(&timeline_path)
        .with_context(|| format!("creating {}", timeline_path.display()))?;
    serde_json::to_writer_pretty(file, &outcome.timeline)
        .with_context(|| format!("writing {}", timeline_path.display()))?;

    let events_path = dir.join("events.csv");
    let mut writer = csv::Writer::from_path(&events_path)
        .with_context(|| format!("creating {}", events_path.display()))?;
    for row in outcome.events() {
        writer
            .serialize(&row)
            .with_context(|| format!("writing {}", events_path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", events_path.display()))?;

    lzsim_world::write_run_info(
        dir,
        &outcome.run_id,
        &outcome.name,
        outcome.t_pk,
        serde_json::json!({
            "name": "lzsim",
            "scenario_path": scenario_path.display().to_string(),
            "entries": outcome.timeline.len(),
            "sim_seconds": outcome.sim_seconds,
            "wall_time_ms": outcome.wall_time_ms,
        }),
    )
}
