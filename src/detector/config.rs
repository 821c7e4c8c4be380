// Detector parameters and their eager validation
//
// Every parameter is checked before any computation starts. Out-of-range
// values are rejected, never clamped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected detector parameter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("ewma_alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),

    #[error("z_threshold must be a non-negative number, got {0}")]
    InvalidThreshold(f64),

    #[error("ml_contamination must be in (0, 0.5], got {0}")]
    InvalidContamination(f64),

    #[error("ensemble_size must be at least 1, got {0}")]
    InvalidEnsembleSize(usize),

    #[error("max_samples must be at least 2, got {0}")]
    InvalidMaxSamples(usize),
}

/// Configuration for the flakiness detection pipeline
///
/// # Example
/// ```
/// use deflake::detector::DetectorConfig;
///
/// let config = DetectorConfig::default();
/// assert_eq!(config.ewma_alpha, 0.3);
/// assert_eq!(config.z_threshold, 2.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// EWMA smoothing factor in (0, 1]
    ///
    /// Higher values weight recent executions more heavily.
    /// Default: 0.3
    pub ewma_alpha: f64,

    /// Absolute z-score above which an execution is flagged
    ///
    /// Default: 2.0
    pub z_threshold: f64,

    /// Run the isolation forest in addition to the z-score rule
    ///
    /// Default: true
    pub use_ml_detector: bool,

    /// Expected fraction of anomalous executions, in (0, 0.5]
    ///
    /// Sets the isolation forest decision threshold at the
    /// `(1 - contamination)` quantile of anomaly scores.
    /// Default: 0.1
    pub ml_contamination: f64,

    /// Number of isolation trees
    ///
    /// Default: 100
    pub ensemble_size: usize,

    /// Upper bound on the per-tree subsample size
    ///
    /// Default: 256
    pub max_samples: usize,

    /// Seed for every random choice made by the isolation forest
    ///
    /// Default: 42
    pub random_seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            ewma_alpha: 0.3,
            z_threshold: 2.0,
            use_ml_detector: true,
            ml_contamination: 0.1,
            ensemble_size: 100,
            max_samples: 256,
            random_seed: 42,
        }
    }
}

impl DetectorConfig {
    /// Threshold-only configuration (isolation forest disabled)
    pub fn threshold_only() -> Self {
        Self {
            use_ml_detector: false,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Negated range checks also reject NaN
        if !(self.ewma_alpha > 0.0 && self.ewma_alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(self.ewma_alpha));
        }

        if !self.z_threshold.is_finite() || self.z_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.z_threshold));
        }

        if !(self.ml_contamination > 0.0 && self.ml_contamination <= 0.5) {
            return Err(ConfigError::InvalidContamination(self.ml_contamination));
        }

        if self.ensemble_size == 0 {
            return Err(ConfigError::InvalidEnsembleSize(self.ensemble_size));
        }

        if self.max_samples < 2 {
            return Err(ConfigError::InvalidMaxSamples(self.max_samples));
        }

        Ok(())
    }
}
