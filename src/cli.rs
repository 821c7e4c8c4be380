//! CLI argument parsing for deflake

use crate::config::{AppConfig, OutputFormat};
use crate::ingest::InputFormat;
use clap::Parser;
use std::path::PathBuf;

/// Config file looked up when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "deflake.toml";

#[derive(Parser, Debug)]
#[command(name = "deflake")]
#[command(version)]
#[command(about = "Detect flaky tests from CI execution history", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML); built-in defaults apply when the default file is absent
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Execution history: CSV file, JSON file, or directory of JSON reports
    #[arg(short = 'i', long = "input", value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Input layout (default: detect from the path)
    #[arg(long = "input-format", value_enum, value_name = "FORMAT")]
    pub input_format: Option<InputFormat>,

    /// Absolute z-score above which an execution is flagged
    #[arg(short = 't', long = "threshold", value_name = "Z")]
    pub threshold: Option<f64>,

    /// Directory for file reports
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Disable the isolation forest (z-score threshold only)
    #[arg(long = "no-ml")]
    pub no_ml: bool,

    /// Expected fraction of anomalous executions, in (0, 0.5]
    #[arg(long = "contamination", value_name = "FRACTION")]
    pub contamination: Option<f64>,

    /// Number of isolation trees
    #[arg(long = "trees", value_name = "N")]
    pub trees: Option<usize>,

    /// Random seed for the isolation forest
    #[arg(long = "seed", value_name = "N")]
    pub seed: Option<u64>,

    /// Number of tests in the ranked listing
    #[arg(short = 'n', long = "top-n", value_name = "N")]
    pub top_n: Option<usize>,

    /// Report formats, comma-separated (e.g. --format console,json,html)
    #[arg(long = "format", value_enum, value_delimiter = ',', value_name = "FORMATS")]
    pub format: Vec<OutputFormat>,

    /// Log filter (e.g. info, WARNING, deflake=trace)
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Overlay command-line values on a loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.data.input_path = input.clone();
        }
        if let Some(format) = self.input_format {
            config.data.format = format;
        }
        if let Some(threshold) = self.threshold {
            config.detection.z_threshold = threshold;
        }
        if self.no_ml {
            config.detection.use_ml_detector = false;
        }
        if let Some(contamination) = self.contamination {
            config.detection.ml_contamination = contamination;
        }
        if let Some(trees) = self.trees {
            config.detection.ensemble_size = trees;
        }
        if let Some(seed) = self.seed {
            config.detection.random_seed = seed;
        }
        if let Some(top_n) = self.top_n {
            config.reporting.top_n_tests = top_n;
        }
        if !self.format.is_empty() {
            config.reporting.output_formats = self.format.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.reporting.output_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}
