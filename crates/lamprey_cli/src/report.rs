//! Console summary and CSV export of finished runs.

use anyhow::{Context, Result};
use lamprey_core::{Compartment, State, Trajectory};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// One CSV row: time followed by the seven compartments.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryRecord {
    pub t: f64,
    #[serde(rename = "C")]
    pub c: f64,
    #[serde(rename = "Fast")]
    pub fast: f64,
    #[serde(rename = "Slow")]
    pub slow: f64,
    #[serde(rename = "F")]
    pub f: f64,
    #[serde(rename = "M")]
    pub m: f64,
    #[serde(rename = "O")]
    pub o: f64,
    #[serde(rename = "E")]
    pub e: f64,
}

impl TrajectoryRecord {
    pub fn new(t: f64, state: &State) -> Self {
        Self {
            t,
            c: state[Compartment::C],
            fast: state[Compartment::Fast],
            slow: state[Compartment::Slow],
            f: state[Compartment::F],
            m: state[Compartment::M],
            o: state[Compartment::O],
            e: state[Compartment::E],
        }
    }
}

/// Prints the final value of every compartment, one `label: value` per line.
pub fn write_summary(out: &mut impl Write, trajectory: &Trajectory) -> Result<()> {
    let (_, last) = trajectory
        .last()
        .context("trajectory has no samples to summarize")?;
    writeln!(out, "Value of variables at the last t:")?;
    for (compartment, value) in last.iter() {
        writeln!(out, "{}: {}", compartment.label(), value)?;
    }
    Ok(())
}

pub fn write_csv(path: &Path, trajectory: &Trajectory) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for (t, state) in trajectory.iter() {
        writer.serialize(TrajectoryRecord::new(t, state))?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = trajectory.len(), "CSV export completed");
    Ok(())
}
