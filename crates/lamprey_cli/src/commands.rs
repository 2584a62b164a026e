//! Implementations of the `lamprey` subcommands.

use crate::config_file::{load_config, load_or_reference, to_pretty_json};
use crate::plot::draw_trajectory;
use crate::report::{write_csv, write_summary};
use anyhow::{bail, Context, Result};
use lamprey_core::batch::{run_batch, sweep};
use lamprey_core::{simulate, Compartment, ModelConfig, SimulationError, Trajectory};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Output targets of a single run.
#[derive(Debug, Clone, Default)]
pub struct RunOutputs {
    pub csv: Option<PathBuf>,
    pub plot: Option<PathBuf>,
    pub plot_points: usize,
}

pub fn cmd_run(out: &mut impl Write, config: Option<&Path>, outputs: &RunOutputs) -> Result<()> {
    let config = load_or_reference(config)?;
    info!(
        duration = config.duration,
        samples = config.sample_count()?,
        "running simulation"
    );
    match simulate(&config) {
        Ok(trajectory) => {
            write_summary(out, &trajectory)?;
            export(&trajectory, outputs)
        }
        Err(SimulationError::Integration(failure)) => {
            error!(
                t_reached = failure.t_reached,
                reason = %failure.reason,
                samples = failure.partial.len(),
                "simulation stopped early"
            );
            if let Some(path) = &outputs.csv {
                if !failure.partial.is_empty() {
                    write_csv(path, &failure.partial)?;
                    warn!(path = %path.display(), "CSV holds only the samples before the failure");
                }
            }
            bail!(
                "integration failed at t = {}: {}",
                failure.t_reached,
                failure.reason
            )
        }
        Err(err) => Err(err.into()),
    }
}

fn export(trajectory: &Trajectory, outputs: &RunOutputs) -> Result<()> {
    if let Some(path) = &outputs.csv {
        write_csv(path, trajectory)?;
    }
    if let Some(path) = &outputs.plot {
        draw_trajectory(path, trajectory, outputs.plot_points)?;
    }
    Ok(())
}

/// Prints the reference configuration as JSON.
pub fn cmd_config(out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", to_pretty_json(&ModelConfig::reference())?)?;
    Ok(())
}

pub fn cmd_validate(out: &mut impl Write, path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let samples = config.sample_count()?;
    writeln!(
        out,
        "{}: ok ({} output samples over t in [0, {}])",
        path.display(),
        samples,
        config.duration
    )?;
    for (compartment, value) in config.negative_initial_values() {
        writeln!(out, "note: initial {compartment} is negative ({value})")?;
    }
    Ok(())
}

/// Runs one simulation per value of `param` and prints a table of final states.
pub fn cmd_sweep(
    out: &mut impl Write,
    config: Option<&Path>,
    param: &str,
    values: &[f64],
) -> Result<()> {
    if values.is_empty() {
        bail!("--values needs at least one number");
    }
    let base = load_or_reference(config)?;
    let configs = sweep(&base, param, values).context("invalid sweep")?;
    for (config, value) in configs.iter().zip(values) {
        config
            .validate()
            .with_context(|| format!("{param} = {value} gives an invalid configuration"))?;
    }
    info!(param, runs = configs.len(), "running sweep");
    let results = run_batch(&configs);

    write!(out, "{param:>14}")?;
    for compartment in Compartment::ALL {
        write!(out, " {:>14}", compartment.label())?;
    }
    writeln!(out)?;

    let mut failures = 0;
    for (value, result) in values.iter().zip(&results) {
        write!(out, "{value:>14}")?;
        match result {
            Ok(trajectory) => match trajectory.last() {
                Some((_, state)) => {
                    for (_, v) in state.iter() {
                        write!(out, " {v:>14.6e}")?;
                    }
                    writeln!(out)?;
                }
                None => writeln!(out, " (no samples)")?,
            },
            Err(err) => {
                failures += 1;
                warn!(param, value, %err, "sweep run failed");
                writeln!(out, " failed: {err}")?;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} sweep runs failed", results.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamprey_core::Sampling;

    fn write_short_config(dir: &Path) -> PathBuf {
        let mut config = ModelConfig::reference().with_sampling(Sampling::Points(11));
        config.duration = 100.0;
        let path = dir.join("short.json");
        std::fs::write(&path, to_pretty_json(&config).unwrap()).unwrap();
        path
    }

    #[test]
    fn run_prints_summary_and_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_short_config(dir.path());
        let outputs = RunOutputs {
            csv: Some(dir.path().join("out.csv")),
            plot: None,
            plot_points: 100,
        };
        let mut out = Vec::new();
        cmd_run(&mut out, Some(&config), &outputs).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Value of variables at the last t:"));
        assert_eq!(text.lines().count(), 8);

        let csv = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
        assert_eq!(csv.lines().count(), 12);
    }

    #[test]
    fn run_reports_integration_failure_and_keeps_partial_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ModelConfig::reference().with_sampling(Sampling::Points(101));
        config.duration = 1000.0;
        config.solver.first_step = Some(0.5);
        config.solver.max_step = Some(0.5);
        config.solver.max_steps = Some(100);
        let path = dir.path().join("capped.json");
        std::fs::write(&path, to_pretty_json(&config).unwrap()).unwrap();
        let outputs = RunOutputs {
            csv: Some(dir.path().join("partial.csv")),
            ..RunOutputs::default()
        };

        let err = cmd_run(&mut Vec::new(), Some(&path), &outputs).expect_err("step cap must fail");
        assert!(format!("{err:#}").contains("max_steps = 100"), "got {err:#}");

        let csv = std::fs::read_to_string(dir.path().join("partial.csv")).unwrap();
        // 100 steps of at most 0.5 cannot pass t = 50
        let rows = csv.lines().count() - 1;
        assert!((1..=6).contains(&rows), "got {rows} rows");
    }

    #[test]
    fn config_output_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        cmd_config(&mut out).unwrap();
        let path = dir.path().join("reference.json");
        std::fs::write(&path, &out).unwrap();

        let mut report = Vec::new();
        cmd_validate(&mut report, &path).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("ok (4000000 output samples"), "got {report}");
        assert_eq!(report.lines().count(), 1);
    }

    #[test]
    fn validate_notes_negative_initial_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ModelConfig::reference().with_sampling(Sampling::Points(3));
        config.initial_state[Compartment::Slow] = -2.5;
        let path = dir.path().join("negative.json");
        std::fs::write(&path, to_pretty_json(&config).unwrap()).unwrap();

        let mut report = Vec::new();
        cmd_validate(&mut report, &path).unwrap();
        let report = String::from_utf8(report).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert!(lines[0].ends_with("ok (3 output samples over t in [0, 40000])"), "got {report}");
        assert_eq!(lines[1], "note: initial Slow is negative (-2.5)");
    }

    #[test]
    fn sweep_prints_one_row_per_value() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_short_config(dir.path());
        let mut out = Vec::new();
        cmd_sweep(&mut out, Some(&config), "gamma", &[0.0, 0.002]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("gamma"));
        assert!(lines[0].trim_end().ends_with('E'));
    }

    #[test]
    fn sweep_rejects_unknown_parameter_and_empty_values() {
        assert!(cmd_sweep(&mut Vec::new(), None, "kappa", &[1.0]).is_err());
        assert!(cmd_sweep(&mut Vec::new(), None, "gamma", &[]).is_err());
    }
}
