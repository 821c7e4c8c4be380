//! Application configuration loaded from TOML
//!
//! Every section is optional; missing keys take their defaults.
//!
//! ```toml
//! [data]
//! input_path = "test_history.csv"
//! format = "auto"
//!
//! [detection]
//! z_threshold = 2.0
//! use_ml_detector = true
//!
//! [reporting]
//! top_n_tests = 5
//! output_formats = ["console", "json"]
//!
//! [logging]
//! level = "info"
//! ```

use crate::detector::DetectorConfig;
use crate::ingest::InputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

/// Report destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summary on stdout
    Console,
    /// `results.json` with summary and every annotated record
    Json,
    /// `results.csv`, one row per annotated record
    Csv,
    /// `report.html`, self-contained report with trend tables
    Html,
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub detection: DetectorConfig,
    pub reporting: ReportingConfig,
    pub logging: LoggingConfig,
}

/// Where execution history comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,

    pub format: InputFormat,
}

fn default_input_path() -> PathBuf {
    PathBuf::from("test_history.csv")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            format: InputFormat::Auto,
        }
    }
}

/// What gets reported and where
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Number of tests in the ranked listing
    #[serde(default = "default_top_n")]
    pub top_n_tests: usize,

    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<OutputFormat>,

    /// Directory for file reports
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_top_n() -> usize {
    5
}

fn default_output_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Console, OutputFormat::Json]
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            top_n_tests: default_top_n(),
            output_formats: default_output_formats(),
            output_dir: default_output_dir(),
        }
    }
}

impl ReportingConfig {
    pub fn wants(&self, format: OutputFormat) -> bool {
        self.output_formats.contains(&format)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info`, `WARNING` or `deflake=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also log to this file; stderr keeps receiving every line
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// `level` as an `EnvFilter` directive
    ///
    /// Accepts a bare level or comma-separated `target=level` pairs, in any
    /// case, with `warning` read as `warn`. Anything else is an error.
    pub fn filter_directive(&self) -> Result<String> {
        let directives = self
            .level
            .split(',')
            .map(str::trim)
            .filter(|directive| !directive.is_empty())
            .map(|directive| match directive.rsplit_once('=') {
                Some((target, level)) if !target.trim().is_empty() => {
                    Ok(format!("{}={}", target.trim(), normalize_level(level)?))
                }
                Some(_) => anyhow::bail!("missing target in log directive '{}'", directive),
                None => normalize_level(directive),
            })
            .collect::<Result<Vec<_>>>()?;

        if directives.is_empty() {
            anyhow::bail!("log level must not be empty");
        }
        Ok(directives.join(","))
    }
}

fn normalize_level(level: &str) -> Result<String> {
    let level = level.trim();
    let level = if level.eq_ignore_ascii_case("warning") {
        "warn"
    } else {
        level
    };
    if level.is_empty() {
        anyhow::bail!("missing level in log directive");
    }

    let filter: LevelFilter = level.parse().map_err(|_| {
        anyhow::anyhow!(
            "unknown log level '{}' (expected off, error, warn, info, debug or trace)",
            level
        )
    })?;
    Ok(filter.to_string().to_lowercase())
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// Check every section; detection parameters use the detector's own rules
    pub fn validate(&self) -> Result<()> {
        self.detection
            .validate()
            .context("Invalid [detection] section")?;

        if self.reporting.top_n_tests == 0 {
            anyhow::bail!("[reporting] top_n_tests must be at least 1");
        }

        self.logging
            .filter_directive()
            .context("Invalid [logging] section")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.data.input_path, PathBuf::from("test_history.csv"));
        assert_eq!(config.reporting.top_n_tests, 5);
        assert_eq!(
            config.reporting.output_formats,
            vec![OutputFormat::Console, OutputFormat::Json]
        );
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_file() {
        let toml = r#"
[data]
input_path = "history/"
format = "directory"

[detection]
ewma_alpha = 0.5
z_threshold = 1.5
use_ml_detector = false
random_seed = 7

[reporting]
top_n_tests = 10
output_formats = ["csv", "html"]
output_dir = "reports"

[logging]
level = "debug"
file = "deflake.log"
"#;
        let config = AppConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.data.format, InputFormat::Directory);
        assert_eq!(config.detection.ewma_alpha, 0.5);
        assert_eq!(config.detection.z_threshold, 1.5);
        assert!(!config.detection.use_ml_detector);
        assert_eq!(config.detection.random_seed, 7);
        // Unset detection keys keep their defaults
        assert_eq!(config.detection.ensemble_size, 100);
        assert!(config.reporting.wants(OutputFormat::Html));
        assert!(!config.reporting.wants(OutputFormat::Console));
        assert_eq!(config.logging.file, Some(PathBuf::from("deflake.log")));
    }

    #[test]
    fn test_unknown_output_format_rejected() {
        let toml = r#"
[reporting]
output_formats = ["pdf"]
"#;
        assert!(AppConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_invalid_detection_rejected() {
        let config = AppConfig::from_toml_str("[detection]\nml_contamination = 0.9\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("ml_contamination"));
    }

    #[test]
    fn test_zero_top_n_rejected() {
        let config = AppConfig::from_toml_str("[reporting]\ntop_n_tests = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_normalized() {
        let directive = |level: &str| {
            LoggingConfig {
                level: level.to_string(),
                file: None,
            }
            .filter_directive()
            .unwrap()
        };

        assert_eq!(directive("WARNING"), "warn");
        assert_eq!(directive("warning"), "warn");
        assert_eq!(directive("DEBUG"), "debug");
        assert_eq!(directive("Info"), "info");
        assert_eq!(directive("off"), "off");
        assert_eq!(
            directive("deflake=WARNING, deflake::ingest=trace"),
            "deflake=warn,deflake::ingest=trace"
        );
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        for level in ["loud", "", "deflake=", "=info", "deflake=verbose"] {
            let config = AppConfig {
                logging: LoggingConfig {
                    level: level.to_string(),
                    file: None,
                },
                ..AppConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(
                format!("{:#}", err).contains("[logging]"),
                "level {:?} accepted",
                level
            );
        }
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/deflake.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deflake.toml");
        fs::write(&path, "[reporting]\ntop_n_tests = 3\n").unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.reporting.top_n_tests, 3);
    }
}
