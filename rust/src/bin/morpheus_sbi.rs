//! Operator CLI for offline dataset assembly and one-off simulations.
//!
//! ```bash
//! morpheus-sbi --config experiment.json read-offline --workdir ./work
//! morpheus-sbi --config experiment.json simulate --params 0.25,0.5
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use morpheus_sbi::prior::DEFAULT_MOMENT_DRAWS;
use morpheus_sbi::{DatasetAssembler, ExperimentConfig, Rejection, SimulationRunner, UniformPrior};

#[derive(Parser, Debug)]
#[command(name = "morpheus-sbi")]
#[command(about = "Run Morpheus simulations and assemble inference datasets")]
struct Cli {
    /// Experiment configuration (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default configuration as JSON
    DefaultConfig,

    /// Assemble a dataset from existing run directories
    ReadOffline {
        /// Directory receiving the assembly log and rejection report
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,

        /// Run directory glob, defaults to `<data_path>/<folder>/*`
        #[arg(short, long)]
        pattern: Option<String>,

        /// Full lattices instead of per-timestep aggregates (also `spatial` in the config)
        #[arg(long)]
        spatial: bool,
    },

    /// Run the simulator once and print the observation
    Simulate {
        /// Comma-separated values in prior order
        #[arg(long, value_delimiter = ',', required = true)]
        params: Vec<f64>,

        /// Directory receiving the simulator log
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,

        #[arg(long)]
        spatial: bool,
    },

    /// Monte-Carlo prior means and standard deviations
    PriorMoments {
        #[arg(short, long, default_value_t = DEFAULT_MOMENT_DRAWS)]
        draws: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Serialize)]
struct OfflineSummary<'a> {
    observations_shape: &'a [usize],
    runs: &'a [String],
    rejected: &'a [Rejection],
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&PathBuf>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => ExperimentConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(ExperimentConfig::default()),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::DefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&ExperimentConfig::default())?);
        }
        Command::ReadOffline {
            workdir,
            pattern,
            spatial,
        } => {
            let pattern = pattern.unwrap_or_else(|| config.offline_pattern());
            let assembler = DatasetAssembler::new(&config);
            let (shape, runs, rejected) = if config.use_lattice(spatial) {
                let dataset = assembler.assemble_spatial(&pattern, &workdir)?;
                (dataset.observations.shape().to_vec(), dataset.run_names, dataset.rejections)
            } else {
                let dataset = assembler.assemble_scalar(&pattern, &workdir)?;
                (dataset.observations.shape().to_vec(), dataset.run_names, dataset.rejections)
            };
            info!(?shape, rejected = rejected.len(), "dataset assembled");
            let summary = OfflineSummary {
                observations_shape: &shape,
                runs: &runs,
                rejected: &rejected,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Simulate {
            params,
            workdir,
            spatial,
        } => {
            if params.len() != config.param_nr() {
                bail!(
                    "expected {} parameter values ({}), got {}",
                    config.param_nr(),
                    config.prior_names().join(", "),
                    params.len()
                );
            }
            let runner = SimulationRunner::new(&config, workdir);
            if config.use_lattice(spatial) {
                let observation = runner.run_2d(&params)?;
                println!("observation shape {:?}", observation.shape());
            } else {
                let observation = runner.run(&params)?;
                println!("target\tinfected\tV\tinfected_volume");
                for row in observation.outer_iter() {
                    let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                    println!("{}", cells.join("\t"));
                }
            }
        }
        Command::PriorMoments { draws, seed } => {
            let prior = UniformPrior::from_config(&config)?;
            let (means, stds) = prior.estimate_means_and_stds(draws, seed)?;
            for ((name, mean), std) in prior.names().iter().zip(&means).zip(&stds) {
                println!("{name}\tmean={mean:.6}\tstd={std:.6}");
            }
        }
    }
    Ok(())
}
