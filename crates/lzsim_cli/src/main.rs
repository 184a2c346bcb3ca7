use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod overrides;
mod runner;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "lzsim", about = "Track-circuit false occupancy / false clear simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scenario and write its timeline.
    Run {
        /// Path to the scenario JSON file.
        #[arg(long)]
        scenario: PathBuf,
        /// Output directory (default: runs/).
        #[arg(long, default_value = "runs")]
        output_dir: PathBuf,
        /// Print events only; write no run directory.
        #[arg(long)]
        no_output: bool,
    },
    /// Run several scenarios in parallel, one simulation each.
    Batch {
        /// Scenario JSON files; repeat the flag for each.
        #[arg(long = "scenario", required = true)]
        scenarios: Vec<PathBuf>,
        #[arg(long, default_value = "runs")]
        output_dir: PathBuf,
        #[arg(long)]
        no_output: bool,
    },
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_one(path: &Path, output_dir: Option<&Path>) -> Result<runner::RunOutcome> {
    let scenario = lzsim_world::load_scenario(path)?;
    let outcome = runner::run_scenario(scenario)?;
    if let Some(output_dir) = output_dir {
        let dir = runner::create_run_dir(output_dir, &outcome.name, &outcome.run_id)?;
        runner::write_artifacts(&dir, &outcome, path)?;
        tracing::info!(dir = %dir.display(), "run artifacts written");
    }
    Ok(outcome)
}

fn print_events(outcome: &runner::RunOutcome) {
    println!(
        "Scenario '{}': {} entries, {:.3} s simulated, run_id={}",
        outcome.name,
        outcome.timeline.len(),
        outcome.sim_seconds,
        outcome.run_id
    );
    println!("{}", "-".repeat(60));
    for row in outcome.events() {
        println!("t={:>10.3}  {:<8} {:<20}", row.t, row.ctrl_rc_id.as_str(), row.flag);
    }
}

fn batch(paths: &[PathBuf], output_dir: Option<&Path>) -> Result<()> {
    println!("Running {} scenarios in parallel...", paths.len());
    let results: Vec<(&PathBuf, Result<runner::RunOutcome>)> = paths
        .par_iter()
        .map(|path| (path, run_one(path, output_dir)))
        .collect();

    let mut failed = 0usize;
    println!("{:<32} {:>8} {:>8} {:>10}", "scenario", "opened", "closed", "sim_s");
    for (path, result) in results {
        match result {
            Ok(outcome) => {
                let events = outcome.events();
                let opened = events
                    .iter()
                    .filter(|e| e.kind == lzsim_core::EventKind::Opened)
                    .count();
                println!(
                    "{:<32} {:>8} {:>8} {:>10.3}",
                    outcome.name,
                    opened,
                    events.len() - opened,
                    outcome.sim_seconds
                );
            }
            Err(err) => {
                failed += 1;
                eprintln!("{}: {err:#}", path.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} scenarios failed", paths.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            scenario,
            output_dir,
            no_output,
        } => {
            let outcome = run_one(&scenario, (!no_output).then_some(output_dir.as_path()))?;
            print_events(&outcome);
        }
        Commands::Batch {
            scenarios,
            output_dir,
            no_output,
        } => batch(&scenarios, (!no_output).then_some(output_dir.as_path()))?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../content/scenarios")
            .join(name)
    }

    #[test]
    fn test_cli_parses_batch() {
        let cli = Cli::try_parse_from([
            "lzsim",
            "batch",
            "--scenario",
            "a.json",
            "--scenario",
            "b.json",
            "--no-output",
        ])
        .unwrap();
        match cli.command {
            Commands::Batch {
                scenarios,
                no_output,
                output_dir,
            } => {
                assert_eq!(scenarios.len(), 2);
                assert!(no_output);
                assert_eq!(output_dir, PathBuf::from("runs"));
            }
            Commands::Run { .. } => panic!("expected batch"),
        }
        assert!(Cli::try_parse_from(["lzsim", "batch"]).is_err());
    }

    #[test]
    fn test_run_one_writes_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_one(&content("classic_lz1.json"), Some(dir.path())).unwrap();
        assert_eq!(outcome.events().len(), 4);

        let run_dirs: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(run_dirs.len(), 1);
        for artifact in ["timeline.json", "events.csv", "run_info.json"] {
            assert!(run_dirs[0].join(artifact).exists(), "{artifact}");
        }
    }

    #[test]
    fn test_lost_switch_override_applies() {
        let outcome = run_one(&content("lost_switch.json"), None).unwrap();
        assert!((outcome.t_pk - 20.0).abs() < 1e-9);
        let events = outcome.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].flag, "llz_v6_open");
    }

    #[test]
    fn test_batch_reports_failures() {
        let paths = vec![content("classic_lz1.json"), content("missing.json")];
        let err = batch(&paths, None).unwrap_err().to_string();
        assert!(err.contains("1 of 2"), "{err}");
        assert!(batch(&paths[..1], None).is_ok());
    }
}
