use crate::integrator::Trajectory;
use crate::state::Compartment;
use thiserror::Error;

/// Problems with a configuration, detected before a simulation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown parameter `{name}`")]
    UnknownParameter { name: String },

    #[error("parameter `{name}` = {value} is invalid: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("initial state has wrong length: expected {expected}, found {found}")]
    StateLength { expected: usize, found: usize },

    #[error("simulation duration must be finite and positive, got {0}")]
    InvalidDuration(f64),

    #[error("invalid sampling: {0}")]
    InvalidSampling(String),

    #[error("invalid solver options: {0}")]
    InvalidSolverOptions(String),
}

/// The vector field produced a value that is not a finite number.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EvaluationError {
    #[error("unstable evaluation: d{compartment}/dt is not finite at t = {t}")]
    NonFinite { compartment: Compartment, t: f64 },
}

/// Why an integration stopped before reaching its final output time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureReason {
    /// The controller needed a step smaller than the floating-point floor at `t`.
    StepSizeUnderflow { h: f64 },
    /// The derivative at an accepted point is not finite; `index` is the
    /// first offending state component.
    NonFiniteDerivative { index: usize },
    TooManySteps { max_steps: usize },
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::StepSizeUnderflow { h } => {
                write!(f, "step size underflow (h = {h:e})")
            }
            FailureReason::NonFiniteDerivative { index } => match Compartment::from_index(*index) {
                Some(compartment) => write!(f, "derivative of {compartment} is not finite"),
                None => write!(f, "derivative component {index} is not finite"),
            },
            FailureReason::TooManySteps { max_steps } => {
                write!(f, "exceeded max_steps = {max_steps}")
            }
            FailureReason::Cancelled => f.write_str("cancelled by observer"),
        }
    }
}

/// An integration that stopped early, with everything computed up to that point.
#[derive(Debug, Clone)]
pub struct IntegrationFailure {
    /// Furthest time the solver reached with an accepted step.
    pub t_reached: f64,
    pub reason: FailureReason,
    /// Output samples produced before the failure.
    pub partial: Trajectory,
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("integration failed at t = {}: {}", .0.t_reached, .0.reason)]
    Integration(Box<IntegrationFailure>),
}

impl SimulationError {
    pub fn failure(&self) -> Option<&IntegrationFailure> {
        match self {
            SimulationError::Integration(failure) => Some(failure),
            SimulationError::Config(_) => None,
        }
    }
}
