//! The `lamprey_core` crate simulates a deterministic population model of sea
//! lamprey life stages across coupled upstream and downstream habitats.
//!
//! Key components:
//! - **Config**: `Parameters` (the named model constants) and `ModelConfig`
//!   (initial state, horizon, output grid, solver tolerances).
//! - **Model**: the seven-compartment vector field with its periodic breeding
//!   phase and guarded density-dependent death rate.
//! - **Solvers**: adaptive Dormand-Prince 5(4) with dense output, and a
//!   fixed-step RK4 used as a reference.
//! - **Integrator**: samples a run at requested output times and reports
//!   failures together with the partial trajectory.
//! - **Batch**: parallel runs of independent configurations.
pub mod batch;
pub mod config;
pub mod error;
pub mod integrator;
pub mod model;
pub mod solvers;
pub mod state;
pub mod traits;

pub use config::{ModelConfig, Parameters, Sampling};
pub use error::{ConfigError, EvaluationError, FailureReason, IntegrationFailure, SimulationError};
pub use integrator::{
    integrate, integrate_with, simulate, IntegrationStats, SolverOptions, Trajectory,
};
pub use model::{derivative, phase, try_derivative, LampreyModel};
pub use state::{Compartment, State, STATE_DIM};
