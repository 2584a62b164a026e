use anyhow::Result;
use clap::{Parser, Subcommand};
use lamprey_cli::commands::{cmd_config, cmd_run, cmd_sweep, cmd_validate, RunOutputs};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lamprey", version, about = "Sea lamprey population model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Simulate one configuration and print the final state.
    Run {
        /// JSON configuration; the reference run is used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write every output sample to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Draw the trajectory to a PNG or SVG file.
        #[arg(long)]
        plot: Option<PathBuf>,
        /// Maximum samples per plotted series.
        #[arg(long, default_value_t = 5000)]
        plot_points: usize,
    },
    /// Print the reference configuration as JSON.
    Config,
    /// Check a configuration file without running it.
    Validate { file: PathBuf },
    /// Run one simulation per value of a parameter, in parallel.
    Sweep {
        /// Parameter name, e.g. `gamma` or `T_HP`.
        #[arg(long)]
        param: String,
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        values: Vec<f64>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut stdout = io::stdout().lock();
    match cli.command {
        Command::Run {
            config,
            csv,
            plot,
            plot_points,
        } => {
            let outputs = RunOutputs {
                csv,
                plot,
                plot_points,
            };
            cmd_run(&mut stdout, config.as_deref(), &outputs)
        }
        Command::Config => cmd_config(&mut stdout),
        Command::Validate { file } => cmd_validate(&mut stdout, &file),
        Command::Sweep {
            param,
            values,
            config,
        } => cmd_sweep(&mut stdout, config.as_deref(), &param, &values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sweep_values_split_on_commas() {
        let args = ["lamprey", "sweep", "--param", "gamma", "--values", "0,0.001,0.004"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Sweep { param, values, config } => {
                assert_eq!(param, "gamma");
                assert_eq!(values, [0.0, 0.001, 0.004]);
                assert!(config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_defaults_plot_points() {
        let cli = Cli::try_parse_from(["lamprey", "run"]).unwrap();
        match cli.command {
            Command::Run { plot_points, config, .. } => {
                assert_eq!(plot_points, 5000);
                assert!(config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
