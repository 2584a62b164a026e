use crate::config::ModelConfig;
use crate::error::{ConfigError, SimulationError};
use crate::integrator::{simulate, Trajectory};
use rayon::prelude::*;
use tracing::debug;

/// Runs independent configurations in parallel, one sequential integration
/// each. Results are returned in input order.
pub fn run_batch(configs: &[ModelConfig]) -> Vec<Result<Trajectory, SimulationError>> {
    debug!(runs = configs.len(), "starting batch");
    configs.par_iter().map(simulate).collect()
}

/// Clones `base` once per value, overriding the parameter called `name`.
pub fn sweep(
    base: &ModelConfig,
    name: &str,
    values: &[f64],
) -> Result<Vec<ModelConfig>, ConfigError> {
    base.params.get(name)?;
    values
        .iter()
        .map(|&value| {
            let mut config = base.clone();
            config.params.set(name, value)?;
            Ok(config)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Sampling;
    use crate::state::Compartment;

    fn base() -> ModelConfig {
        let mut config = ModelConfig::reference().with_sampling(Sampling::Points(51));
        config.duration = 500.0;
        config
    }

    #[test]
    fn sweep_overrides_one_parameter() {
        let configs = sweep(&base(), "gamma", &[0.0, 0.001, 0.004]).unwrap();
        assert_eq!(configs.len(), 3);
        assert_eq!(configs[2].params.gamma, 0.004);
        assert_eq!(configs[2].params.mu, base().params.mu);
    }

    #[test]
    fn sweep_rejects_unknown_name_even_without_values() {
        assert!(sweep(&base(), "kappa", &[]).is_err());
    }

    #[test]
    fn batch_matches_sequential_runs() {
        let configs = sweep(&base(), "mu", &[0.0, 500.0, 1000.0]).unwrap();
        let results = run_batch(&configs);
        assert_eq!(results.len(), 3);
        for (config, result) in configs.iter().zip(results) {
            let parallel = result.expect("batch run succeeds");
            let sequential = simulate(config).unwrap();
            assert_eq!(parallel, sequential);
        }
    }

    #[test]
    fn batch_keeps_failures_in_place() {
        let mut configs = vec![base(), base()];
        configs[1].duration = -1.0;
        let results = run_batch(&configs);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SimulationError::Config(_))));
    }

    #[test]
    fn more_breeding_means_more_eggs_after_first_season() {
        let configs = sweep(&base(), "mu", &[0.0, 1000.0]).unwrap();
        let results = run_batch(&configs);
        let eggs: Vec<f64> = results
            .into_iter()
            .map(|r| r.unwrap().last().map(|(_, s)| s[Compartment::E]).unwrap())
            .collect();
        assert!(eggs[1] > eggs[0]);
    }
}
