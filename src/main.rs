//! CLI front-end for the drift filter library.
//!
//! Three subcommands drive the library over real files: `run` filters a
//! trajectory and emits the `ProcessingResult` as JSON, `simulate` corrupts
//! a clean baseline with the anomaly generator, and `batch` runs `run` over
//! many files concurrently — one independent [`DriftDetector`] per file,
//! directly modeling the "no cross-talk between trajectories" concurrency
//! note in the library docs.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;

use gps_drift_filter::{
    adapters, AnomalySimulator, DetectorConfig, DriftDetector, ProcessingResult, SimulatorConfig,
};

#[derive(Parser, Debug)]
#[command(name = "gps_drift_filter", version, about = "Streaming GPS drift filter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Optional TOML file overriding detector/simulator defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter a trajectory file, printing the `ProcessingResult` as JSON.
    Run {
        /// Input file: `.json`, `.csv`, or the plain-text line format.
        input: PathBuf,
    },
    /// Generate an anomaly-injected corpus from a clean baseline file.
    Simulate {
        /// Baseline trajectory file.
        input: PathBuf,
        /// PRNG seed, for a reproducible corpus.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Run `run` over every file in a directory, one detector per file.
    Batch {
        /// Directory of trajectory files.
        dir: PathBuf,
    },
}

#[derive(serde::Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    detector: Option<DetectorConfig>,
    simulator: Option<SimulatorConfig>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => FileConfig::default(),
    };

    match cli.command {
        Command::Run { input } => {
            let detector_config = file_config.detector.unwrap_or_default();
            let result = run_file(&input, detector_config)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Simulate { input, seed } => {
            let mut simulator_config = file_config.simulator.unwrap_or_default();
            simulator_config.seed = seed;
            let fixes = load_fixes(&input)?;
            let mut simulator = AnomalySimulator::new(simulator_config);
            let result = simulator.generate(&fixes);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Batch { dir } => {
            let detector_config = file_config.detector.unwrap_or_default();
            let entries: Vec<PathBuf> = fs::read_dir(&dir)
                .with_context(|| format!("reading directory {}", dir.display()))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();

            // One independent `DriftDetector` per file, run across a rayon
            // thread pool: no shared mutable state between trajectories.
            let results: Vec<(PathBuf, Result<ProcessingResult>)> = entries
                .into_par_iter()
                .map(|path| {
                    let result = run_file(&path, detector_config);
                    (path, result)
                })
                .collect();

            let mut report = serde_json::Map::new();
            for (path, result) in results {
                match result {
                    Ok(r) => {
                        report.insert(path.display().to_string(), serde_json::to_value(r)?);
                    }
                    Err(e) => {
                        log::warn!("{}: {:#}", path.display(), e);
                    }
                }
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn run_file(path: &PathBuf, config: DetectorConfig) -> Result<ProcessingResult> {
    let fixes = load_fixes(path)?;
    let mut detector = DriftDetector::new(config);
    Ok(detector.process_trajectory(&fixes))
}

fn load_fixes(path: &PathBuf) -> Result<Vec<gps_drift_filter::Fix>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let value: serde_json::Value =
                serde_json::from_str(&text).with_context(|| format!("parsing JSON {}", path.display()))?;
            Ok(adapters::load_from_json(&value))
        }
        Some("csv") => {
            adapters::parse_from_csv(text.as_bytes()).with_context(|| format!("parsing CSV {}", path.display()))
        }
        _ => Ok(adapters::parse_from_str(&text)),
    }
}
