//! Immutable simulation configuration: model parameters, initial state,
//! horizon, output grid and solver tolerances.
//!
//! Everything here is validated once, before integration starts, so the
//! vector field never has to look anything up by name.

use crate::error::ConfigError;
use crate::integrator::SolverOptions;
use crate::state::{Compartment, State};
use serde::{Deserialize, Serialize};

pub const PARAMETER_COUNT: usize = 20;

/// Named scalar constants of the lamprey model.
///
/// Field names follow Rust conventions; the serialized names (and the names
/// accepted by [`Parameters::get`] / [`Parameters::set`]) are the model's
/// own, e.g. `T_HP` or `p_Fast_to_F`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    /// Duration of the high sub-period (no breeding).
    #[serde(rename = "T_HP")]
    pub t_hp: f64,
    /// Duration of the low sub-period (breeding active).
    #[serde(rename = "T_MP")]
    pub t_mp: f64,

    #[serde(rename = "K_upstream")]
    pub k_upstream: f64,
    #[serde(rename = "K_downstream")]
    pub k_downstream: f64,

    #[serde(rename = "p_E_to_E")]
    pub p_e_to_e: f64,
    #[serde(rename = "p_E_to_C")]
    pub p_e_to_c: f64,
    #[serde(rename = "p_C_to_C")]
    pub p_c_to_c: f64,
    #[serde(rename = "p_C_to_Fast")]
    pub p_c_to_fast: f64,
    #[serde(rename = "p_C_to_Slow")]
    pub p_c_to_slow: f64,
    #[serde(rename = "p_Fast_to_Fast")]
    pub p_fast_to_fast: f64,
    #[serde(rename = "p_Slow_to_Slow")]
    pub p_slow_to_slow: f64,
    #[serde(rename = "p_Fast_to_F")]
    pub p_fast_to_f: f64,
    #[serde(rename = "p_Slow_to_M")]
    pub p_slow_to_m: f64,
    #[serde(rename = "p_F_to_D")]
    pub p_f_to_d: f64,
    #[serde(rename = "p_M_to_D")]
    pub p_m_to_d: f64,

    /// Growth rate of the other species.
    #[serde(rename = "r_O")]
    pub r_o: f64,
    /// Interaction coefficient between adults and the other species.
    pub alpha: f64,
    /// Eggs produced per breeding event.
    pub mu: f64,
    /// Weight of the other species in the adult death-rate denominator.
    pub beta: f64,
    /// Breeding-death coupling coefficient.
    pub gamma: f64,
}

impl Parameters {
    pub const NAMES: [&'static str; PARAMETER_COUNT] = [
        "T_HP",
        "T_MP",
        "K_upstream",
        "K_downstream",
        "p_E_to_E",
        "p_E_to_C",
        "p_C_to_C",
        "p_C_to_Fast",
        "p_C_to_Slow",
        "p_Fast_to_Fast",
        "p_Slow_to_Slow",
        "p_Fast_to_F",
        "p_Slow_to_M",
        "p_F_to_D",
        "p_M_to_D",
        "r_O",
        "alpha",
        "mu",
        "beta",
        "gamma",
    ];

    /// The reference parameter set used for the published runs.
    pub fn reference() -> Self {
        Self {
            t_hp: 275.0,
            t_mp: 90.0,
            k_upstream: 5000.0,
            k_downstream: 5000.0,
            p_e_to_e: 1.0 - 1.0 / 30.0,
            p_e_to_c: 1.0 / 30.0 - 0.01,
            p_c_to_c: 0.999,
            p_c_to_fast: 0.0004,
            p_c_to_slow: 0.0005,
            p_fast_to_fast: 0.99,
            p_slow_to_slow: 0.99,
            p_fast_to_f: 0.009,
            p_slow_to_m: 0.009,
            p_f_to_d: 0.1,
            p_m_to_d: 0.1,
            r_o: 0.001,
            alpha: 0.00001,
            mu: 1000.0,
            beta: 1.0,
            gamma: 0.002,
        }
    }

    /// Length of one full breeding cycle, `T_HP + T_MP`.
    pub fn cycle_length(&self) -> f64 {
        self.t_hp + self.t_mp
    }

    /// All parameters as `(name, value)` pairs in [`Parameters::NAMES`] order.
    pub fn entries(&self) -> [(&'static str, f64); PARAMETER_COUNT] {
        let values = [
            self.t_hp,
            self.t_mp,
            self.k_upstream,
            self.k_downstream,
            self.p_e_to_e,
            self.p_e_to_c,
            self.p_c_to_c,
            self.p_c_to_fast,
            self.p_c_to_slow,
            self.p_fast_to_fast,
            self.p_slow_to_slow,
            self.p_fast_to_f,
            self.p_slow_to_m,
            self.p_f_to_d,
            self.p_m_to_d,
            self.r_o,
            self.alpha,
            self.mu,
            self.beta,
            self.gamma,
        ];
        let mut out = [("", 0.0); PARAMETER_COUNT];
        for (slot, (name, value)) in out.iter_mut().zip(Self::NAMES.into_iter().zip(values)) {
            *slot = (name, value);
        }
        out
    }

    pub fn get(&self, name: &str) -> Result<f64, ConfigError> {
        self.entries()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value)
            .ok_or_else(|| ConfigError::UnknownParameter {
                name: name.to_string(),
            })
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<(), ConfigError> {
        let slot = match name {
            "T_HP" => &mut self.t_hp,
            "T_MP" => &mut self.t_mp,
            "K_upstream" => &mut self.k_upstream,
            "K_downstream" => &mut self.k_downstream,
            "p_E_to_E" => &mut self.p_e_to_e,
            "p_E_to_C" => &mut self.p_e_to_c,
            "p_C_to_C" => &mut self.p_c_to_c,
            "p_C_to_Fast" => &mut self.p_c_to_fast,
            "p_C_to_Slow" => &mut self.p_c_to_slow,
            "p_Fast_to_Fast" => &mut self.p_fast_to_fast,
            "p_Slow_to_Slow" => &mut self.p_slow_to_slow,
            "p_Fast_to_F" => &mut self.p_fast_to_f,
            "p_Slow_to_M" => &mut self.p_slow_to_m,
            "p_F_to_D" => &mut self.p_f_to_d,
            "p_M_to_D" => &mut self.p_m_to_d,
            "r_O" => &mut self.r_o,
            "alpha" => &mut self.alpha,
            "mu" => &mut self.mu,
            "beta" => &mut self.beta,
            "gamma" => &mut self.gamma,
            _ => {
                return Err(ConfigError::UnknownParameter {
                    name: name.to_string(),
                })
            }
        };
        *slot = value;
        Ok(())
    }

    /// Checks the constraints the vector field relies on. Transition
    /// probabilities are deliberately left unrestricted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in self.entries() {
            if !value.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    name,
                    value,
                    reason: "must be finite",
                });
            }
        }
        let positive = [
            ("T_HP", self.t_hp),
            ("T_MP", self.t_mp),
            ("K_upstream", self.k_upstream),
            ("K_downstream", self.k_downstream),
        ];
        for (name, value) in positive {
            if value <= 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    value,
                    reason: "must be positive",
                });
            }
        }
        Ok(())
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self::reference()
    }
}

/// How output times are chosen over `[0, duration]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    /// `floor(duration / dt)` evenly spaced points including both ends.
    #[serde(rename = "dt")]
    Step(f64),
    /// This many evenly spaced points including both ends.
    Points(usize),
    /// Explicit, strictly increasing times starting at 0.
    Times(Vec<f64>),
}

impl Sampling {
    /// Number of output points over `[0, duration]`, checking the grid
    /// without building it.
    pub fn count(&self, duration: f64) -> Result<usize, ConfigError> {
        match self {
            Sampling::Step(dt) => {
                if !dt.is_finite() || *dt <= 0.0 {
                    return Err(ConfigError::InvalidSampling(format!(
                        "dt must be finite and positive, got {dt}"
                    )));
                }
                let count = (duration / dt).floor();
                if count < 1.0 || count > usize::MAX as f64 {
                    return Err(ConfigError::InvalidSampling(format!(
                        "dt = {dt} yields no output points over duration {duration}"
                    )));
                }
                Ok(count as usize)
            }
            Sampling::Points(0) => Err(ConfigError::InvalidSampling(
                "at least one output point is required".to_string(),
            )),
            Sampling::Points(count) => Ok(*count),
            Sampling::Times(times) => {
                let first = times.first().ok_or_else(|| {
                    ConfigError::InvalidSampling("explicit output times are empty".to_string())
                })?;
                if *first != 0.0 {
                    return Err(ConfigError::InvalidSampling(format!(
                        "first output time must be 0, got {first}"
                    )));
                }
                for (idx, pair) in times.windows(2).enumerate() {
                    if !(pair[1] > pair[0]) {
                        return Err(ConfigError::InvalidSampling(format!(
                            "output times must be strictly increasing (index {})",
                            idx + 1
                        )));
                    }
                }
                if let Some(last) = times.last().filter(|t| !(**t <= duration)) {
                    return Err(ConfigError::InvalidSampling(format!(
                        "output time {last} lies beyond duration {duration}"
                    )));
                }
                Ok(times.len())
            }
        }
    }

    pub fn output_times(&self, duration: f64) -> Result<Vec<f64>, ConfigError> {
        let count = self.count(duration)?;
        match self {
            Sampling::Times(times) => Ok(times.clone()),
            Sampling::Step(_) | Sampling::Points(_) => Ok(linspace(0.0, duration, count)),
        }
    }
}

/// `count` evenly spaced values over `[start, stop]`, both ends included
/// and the last one exactly `stop`.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            let mut out: Vec<f64> = (0..count).map(|i| start + i as f64 * step).collect();
            out[count - 1] = stop;
            out
        }
    }
}

/// A complete, immutable description of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub initial_state: State,
    pub params: Parameters,
    pub duration: f64,
    pub sampling: Sampling,
    #[serde(default)]
    pub solver: SolverOptions,
}

impl ModelConfig {
    /// The reference run: 40000 time units sampled every 0.01.
    pub fn reference() -> Self {
        Self {
            initial_state: State::new([10.0, 10.0, 10.0, 10.0, 10.0, 4000.0, 1000.0]),
            params: Parameters::reference(),
            duration: 40000.0,
            sampling: Sampling::Step(0.01),
            solver: SolverOptions::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Checks parameters, horizon, output grid and solver options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate()?;
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ConfigError::InvalidDuration(self.duration));
        }
        self.sampling.count(self.duration)?;
        self.solver.validate()?;
        if let Some(compartment) = self.initial_state.first_non_finite() {
            return Err(ConfigError::InvalidParameter {
                name: compartment.label(),
                value: self.initial_state[compartment],
                reason: "initial value must be finite",
            });
        }
        Ok(())
    }

    /// Compartments starting below zero. These are allowed but unusual.
    pub fn negative_initial_values(&self) -> impl Iterator<Item = (Compartment, f64)> + '_ {
        self.initial_state.iter().filter(|(_, value)| *value < 0.0)
    }

    /// Number of output samples, without building the grid.
    pub fn sample_count(&self) -> Result<usize, ConfigError> {
        self.validate()?;
        self.sampling.count(self.duration)
    }

    /// Validates the configuration and resolves its output grid.
    pub fn output_times(&self) -> Result<Vec<f64>, ConfigError> {
        self.validate()?;
        self.sampling.output_times(self.duration)
    }
}
