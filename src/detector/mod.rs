// Flaky Test Detection Pipeline
//
// Labels each test execution record as flaky or stable by combining two
// signals:
// - a per-test z-score of the failure rate against a fixed threshold
// - an isolation forest over (EWMA failure rate, z-score, failure rate)
//
// A record is flaky when either signal flags it. Tests are then ranked by
// their mean EWMA failure rate.
//
// Scientific Foundation:
// [1] Liu, F. T., Ting, K. M., & Zhou, Z. H. (2008). Isolation forest. ICDM.
// [2] Roberts, S. W. (1959). Control chart tests based on geometric moving
//     averages. Technometrics. EWMA smoothing of a failure-rate series.
//
// Stages run strictly in order, each filling its own fields:
//   metrics -> threshold -> isolation forest -> combiner -> ranking

mod combiner;
mod config;
mod metrics;
mod ranking;
mod threshold;

pub use combiner::{clear_ml_labels, combine_labels};
pub use config::{ConfigError, DetectorConfig};
pub use metrics::{apply_metrics, ewma, mean_and_sample_stddev, z_scores};
pub use ranking::{summarize_tests, top_flaky_tests};
pub use threshold::{exceeds_threshold, label_threshold};

use crate::isolation_forest::label_anomalies;
use crate::record::{AnnotatedRecord, ExecutionRecord, TestSummary};
use serde::{Deserialize, Serialize};

/// Output of one detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Annotated records, in input order
    pub records: Vec<AnnotatedRecord>,
    /// Executions flagged by the z-score rule
    pub threshold_flagged: usize,
    /// Executions flagged by the isolation forest
    pub ml_flagged: usize,
    /// Executions flagged by either method
    pub flaky_count: usize,
}

impl DetectionReport {
    /// Top `n` flakiest tests, `n >= 1`
    pub fn top_flaky_tests(&self, n: usize) -> Vec<TestSummary> {
        top_flaky_tests(&self.records, n)
    }

    /// Every test, ranked flakiest first
    pub fn summaries(&self) -> Vec<TestSummary> {
        summarize_tests(&self.records)
    }

    /// Number of distinct test ids
    pub fn total_tests(&self) -> usize {
        let mut ids: Vec<&str> = self.records.iter().map(|r| r.test_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    pub fn total_executions(&self) -> usize {
        self.records.len()
    }

    /// Percentage of executions labelled flaky (0.0 for empty input)
    pub fn flaky_percentage(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.flaky_count as f64 / self.records.len() as f64 * 100.0
    }
}

/// Batch flakiness detector
///
/// # Example
/// ```
/// use deflake::detector::{DetectorConfig, FlakinessDetector};
///
/// let detector = FlakinessDetector::new(DetectorConfig::default()).unwrap();
/// let report = detector.analyze(&[]);
/// assert_eq!(report.total_executions(), 0);
/// assert_eq!(report.flaky_count, 0);
/// ```
#[derive(Debug, Clone)]
pub struct FlakinessDetector {
    config: DetectorConfig,
}

impl FlakinessDetector {
    /// Create a detector, rejecting invalid parameters up front
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run every stage over a batch of execution records
    pub fn analyze(&self, records: &[ExecutionRecord]) -> DetectionReport {
        let mut annotated: Vec<AnnotatedRecord> =
            records.iter().cloned().map(AnnotatedRecord::from).collect();

        if annotated.is_empty() {
            tracing::info!("No execution records to analyze");
            return DetectionReport {
                records: annotated,
                threshold_flagged: 0,
                ml_flagged: 0,
                flaky_count: 0,
            };
        }

        apply_metrics(&mut annotated, self.config.ewma_alpha);

        let threshold_flagged = label_threshold(&mut annotated, self.config.z_threshold);
        tracing::info!(
            "Threshold method flagged {} of {} executions",
            threshold_flagged,
            annotated.len()
        );

        let ml_flagged = if self.config.use_ml_detector {
            let flagged = label_anomalies(&mut annotated, &self.config);
            tracing::info!("Isolation forest flagged {} executions", flagged);
            flagged
        } else {
            clear_ml_labels(&mut annotated);
            tracing::debug!("Isolation forest disabled");
            0
        };

        let flaky_count = combine_labels(&mut annotated);
        tracing::info!(
            "Detected {} flaky executions out of {}",
            flaky_count,
            annotated.len()
        );

        DetectionReport {
            records: annotated,
            threshold_flagged,
            ml_flagged,
            flaky_count,
        }
    }
}
