//! Drives the adaptive stepper across a horizon and samples the solution at
//! caller-chosen output times.
//!
//! Internal steps are chosen by the stepper alone; output values come from
//! its continuous extension, so only the requested samples are retained no
//! matter how many internal steps the run takes.

use crate::config::ModelConfig;
use crate::error::{ConfigError, FailureReason, IntegrationFailure, SimulationError};
use crate::model::LampreyModel;
use crate::solvers::Dopri5;
use crate::state::{Compartment, State};
use crate::traits::DynamicalSystem;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use tracing::{debug, info, warn};

/// Tolerances and step bounds for the adaptive solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverOptions {
    pub rtol: f64,
    pub atol: f64,
    /// Initial step size; chosen automatically when absent.
    pub first_step: Option<f64>,
    /// Largest allowed step; unbounded when absent.
    ///
    /// The breeding phase switches discontinuously, and with the default
    /// tolerances a step spanning a switch can leave output samples well
    /// below zero. A bound of about one time unit together with tighter
    /// tolerances keeps the lamprey model's trajectories non-negative.
    pub max_step: Option<f64>,
    /// Upper bound on accepted steps; unbounded when absent.
    pub max_steps: Option<usize>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            first_step: None,
            max_step: None,
            max_steps: None,
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(ConfigError::InvalidSolverOptions(format!(
                "rtol must be finite and > 0, got {}",
                self.rtol
            )));
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(ConfigError::InvalidSolverOptions(format!(
                "atol must be finite and > 0, got {}",
                self.atol
            )));
        }
        for (name, value) in [("first_step", self.first_step), ("max_step", self.max_step)] {
            if let Some(h) = value.filter(|h| !h.is_finite() || *h <= 0.0) {
                return Err(ConfigError::InvalidSolverOptions(format!(
                    "{name} must be finite and > 0, got {h}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegrationStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub rhs_evaluations: usize,
}

/// Solution samples at the requested output times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<State>,
    pub stats: IntegrationStats,
}

impl Trajectory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
            stats: IntegrationStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn push(&mut self, t: f64, state: State) {
        self.times.push(t);
        self.states.push(state);
    }

    pub fn last(&self) -> Option<(f64, &State)> {
        Some((*self.times.last()?, self.states.last()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &State)> + '_ {
        self.times.iter().copied().zip(self.states.iter())
    }

    /// Values of one compartment over time.
    pub fn series(&self, compartment: Compartment) -> Vec<f64> {
        self.states.iter().map(|s| s[compartment]).collect()
    }
}

/// Integrates `system` from `(t0, y0)` and reports the solution at every
/// entry of `output_times` through `observer`.
///
/// `output_times` must start at `t0` and be strictly increasing; the first
/// sample passed to the observer is `y0` itself. Returning
/// `ControlFlow::Break` from the observer stops the run, which is reported
/// as [`FailureReason::Cancelled`].
///
/// On failure the returned [`IntegrationFailure`] carries an empty
/// `partial` trajectory; [`integrate`] fills it with the samples it kept.
pub fn integrate_with<S, F>(
    system: &S,
    t0: f64,
    y0: &[f64],
    output_times: &[f64],
    opts: &SolverOptions,
    mut observer: F,
) -> Result<IntegrationStats, SimulationError>
where
    S: DynamicalSystem,
    F: FnMut(f64, &[f64]) -> ControlFlow<()>,
{
    validate_inputs(system, t0, y0, output_times, opts)?;

    let t_end = output_times[output_times.len() - 1];
    debug!(
        t0,
        t_end,
        outputs = output_times.len(),
        rtol = opts.rtol,
        atol = opts.atol,
        "starting integration"
    );

    let fail = |t_reached: f64, reason: FailureReason| {
        warn!(t_reached, %reason, "integration failed");
        SimulationError::Integration(Box::new(IntegrationFailure {
            t_reached,
            reason,
            partial: Trajectory::default(),
        }))
    };

    if observer(t0, y0).is_break() {
        return Err(fail(t0, FailureReason::Cancelled));
    }
    if output_times.len() == 1 {
        return Ok(IntegrationStats::default());
    }

    let mut stepper = Dopri5::new(system, t0, y0, t_end, opts).map_err(|r| fail(t0, r))?;
    let mut sample = vec![0.0; y0.len()];

    for &t_out in &output_times[1..] {
        while stepper.t() < t_out {
            stepper
                .step(system)
                .map_err(|reason| fail(stepper.t(), reason))?;
        }
        stepper.dense_output(t_out, &mut sample);
        if observer(t_out, &sample).is_break() {
            return Err(fail(stepper.t(), FailureReason::Cancelled));
        }
    }

    let stats = stepper.stats();
    info!(
        t_end,
        accepted = stats.accepted_steps,
        rejected = stats.rejected_steps,
        rhs_evaluations = stats.rhs_evaluations,
        "integration finished"
    );
    Ok(stats)
}

/// Integrates a seven-compartment system and collects every output sample.
///
/// On failure the error carries the samples produced up to that point.
pub fn integrate<S: DynamicalSystem>(
    system: &S,
    t0: f64,
    y0: &State,
    output_times: &[f64],
    opts: &SolverOptions,
) -> Result<Trajectory, SimulationError> {
    let mut trajectory = Trajectory::with_capacity(output_times.len());
    let result = integrate_with(system, t0, y0.as_slice(), output_times, opts, |t, y| {
        let mut state = State::zeros();
        state.as_mut_slice().copy_from_slice(y);
        trajectory.push(t, state);
        ControlFlow::Continue(())
    });
    match result {
        Ok(stats) => {
            trajectory.stats = stats;
            Ok(trajectory)
        }
        Err(SimulationError::Integration(mut failure)) => {
            failure.partial = trajectory;
            Err(SimulationError::Integration(failure))
        }
        Err(err) => Err(err),
    }
}

/// Runs one configured simulation of the lamprey model.
pub fn simulate(config: &ModelConfig) -> Result<Trajectory, SimulationError> {
    let output_times = config.output_times()?;
    for (compartment, value) in config.negative_initial_values() {
        warn!(%compartment, value, "negative initial population");
    }
    let model = LampreyModel::new(&config.params);
    integrate(
        &model,
        0.0,
        &config.initial_state,
        &output_times,
        &config.solver,
    )
}

fn validate_inputs<S: DynamicalSystem>(
    system: &S,
    t0: f64,
    y0: &[f64],
    output_times: &[f64],
    opts: &SolverOptions,
) -> Result<(), ConfigError> {
    opts.validate()?;
    if y0.len() != system.dimension() {
        return Err(ConfigError::StateLength {
            expected: system.dimension(),
            found: y0.len(),
        });
    }
    let first = output_times
        .first()
        .ok_or_else(|| ConfigError::InvalidSampling("no output times requested".to_string()))?;
    if !t0.is_finite() || *first != t0 {
        return Err(ConfigError::InvalidSampling(format!(
            "first output time {first} must equal the start time {t0}"
        )));
    }
    for (idx, pair) in output_times.windows(2).enumerate() {
        if !(pair[1] > pair[0]) || !pair[1].is_finite() {
            return Err(ConfigError::InvalidSampling(format!(
                "output times must be finite and strictly increasing (index {})",
                idx + 1
            )));
        }
    }
    Ok(())
}
