//! Line plot of all seven compartments against time.

use anyhow::{anyhow, Result};
use lamprey_core::{Compartment, Trajectory};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::error::Error;
use std::path::Path;
use tracing::info;

const PLOT_SIZE: (u32, u32) = (1400, 800);

pub fn compartment_color(compartment: Compartment) -> RGBColor {
    match compartment {
        Compartment::C => BLUE,
        Compartment::Fast => RED,
        Compartment::Slow => GREEN,
        Compartment::F => YELLOW,
        Compartment::M => CYAN,
        Compartment::O => MAGENTA,
        Compartment::E => BLACK,
    }
}

/// Trajectory thinned to at most `max_points` samples per series. The final
/// sample is always kept.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub times: Vec<f64>,
    pub values: Vec<Vec<f64>>,
}

impl PlotSeries {
    pub fn from_trajectory(trajectory: &Trajectory, max_points: usize) -> Self {
        let len = trajectory.len();
        let stride = len.div_ceil(max_points.max(1)).max(1);
        let mut indices: Vec<usize> = (0..len).step_by(stride).collect();
        if len > 0 && indices.last() != Some(&(len - 1)) {
            indices.push(len - 1);
        }
        let pick = |full: &[f64]| indices.iter().map(|&i| full[i]).collect::<Vec<f64>>();
        let times = pick(&trajectory.times);
        let values = Compartment::ALL
            .iter()
            .map(|&c| pick(&trajectory.series(c)))
            .collect();
        Self { times, values }
    }

    fn time_range(&self) -> (f64, f64) {
        let start = self.times.first().copied().unwrap_or(0.0);
        let end = self.times.last().copied().unwrap_or(1.0);
        if end > start {
            (start, end)
        } else {
            (start, start + 1.0)
        }
    }

    fn value_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .values
            .iter()
            .flatten()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if !lo.is_finite() {
            return (0.0, 1.0);
        }
        let pad = ((hi - lo) * 0.05).max(1.0);
        (lo - pad, hi + pad)
    }
}

/// Renders the plot; the backend is chosen by extension (`.svg` or bitmap).
pub fn draw_trajectory(path: &Path, trajectory: &Trajectory, max_points: usize) -> Result<()> {
    let series = PlotSeries::from_trajectory(trajectory, max_points);
    let is_svg = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
    let drawn = if is_svg {
        draw_on(SVGBackend::new(path, PLOT_SIZE).into_drawing_area(), &series)
    } else {
        draw_on(BitMapBackend::new(path, PLOT_SIZE).into_drawing_area(), &series)
    };
    drawn.map_err(|err| anyhow!("failed to draw {}: {err}", path.display()))?;
    info!(path = %path.display(), points = series.times.len(), "plot written");
    Ok(())
}

fn draw_on<DB>(root: DrawingArea<DB, Shift>, series: &PlotSeries) -> Result<(), Box<dyn Error>>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (t_min, t_max) = series.time_range();
    let (y_min, y_max) = series.value_range();

    let mut chart = ChartBuilder::on(&root)
        .caption("Sea lamprey population dynamics", ("sans-serif", 28))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(t_min..t_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("t")
        .y_desc("population density")
        .draw()?;

    for (compartment, values) in Compartment::ALL.iter().zip(&series.values) {
        let color = compartment_color(*compartment);
        let points = series.times.iter().copied().zip(values.iter().copied());
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(compartment.label())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamprey_core::State;

    fn ramp(len: usize) -> Trajectory {
        let mut trajectory = Trajectory::default();
        for i in 0..len {
            let v = i as f64;
            trajectory.push(v, State::new([v; 7]));
        }
        trajectory
    }

    #[test]
    fn decimation_keeps_first_and_last_samples() {
        let series = PlotSeries::from_trajectory(&ramp(1001), 100);
        assert!(series.times.len() <= 101);
        assert_eq!(series.times[0], 0.0);
        assert_eq!(*series.times.last().unwrap(), 1000.0);
        assert_eq!(series.values.len(), 7);
        assert!(series.values.iter().all(|v| v.len() == series.times.len()));
        assert_eq!(series.values[6], series.times);
    }

    #[test]
    fn short_trajectories_are_not_thinned() {
        let series = PlotSeries::from_trajectory(&ramp(10), 5000);
        assert_eq!(series.times.len(), 10);
        let empty = PlotSeries::from_trajectory(&Trajectory::default(), 5000);
        assert!(empty.times.is_empty());
        assert_eq!(empty.time_range(), (0.0, 1.0));
        assert_eq!(empty.value_range(), (0.0, 1.0));
    }

    #[test]
    fn value_range_pads_and_ignores_non_finite() {
        let mut trajectory = ramp(3);
        trajectory.states[1][Compartment::E] = f64::NAN;
        trajectory.states[2][Compartment::O] = -100.0;
        let series = PlotSeries::from_trajectory(&trajectory, 10);
        let (lo, hi) = series.value_range();
        assert!(lo < -100.0);
        assert!(hi > 2.0);
    }

    #[test]
    fn every_compartment_has_a_distinct_color() {
        let colors: Vec<RGBColor> = Compartment::ALL
            .iter()
            .map(|&c| compartment_color(c))
            .collect();
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
