//! JSON output format for detection results
//!
//! Machine-readable report written to `results.json`.

use crate::detector::DetectionReport;
use crate::record::{AnnotatedRecord, TestSummary};
use serde::{Deserialize, Serialize};

/// Number of ranked tests carried in the JSON report
pub const JSON_TOP_TESTS: usize = 10;

/// Batch-level totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSummary {
    pub total_tests: usize,
    pub total_executions: usize,
    pub flaky_executions: usize,
    /// Percentage of executions labelled flaky (0-100)
    pub flaky_percentage: f64,
    /// Executions flagged by the z-score rule
    pub threshold_flagged: usize,
    /// Executions flagged by the isolation forest
    pub ml_flagged: usize,
}

/// Complete JSON report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    /// Format version identifier
    pub version: String,
    /// Output format name
    pub format: String,
    pub summary: JsonSummary,
    /// Flakiest tests, highest mean EWMA failure rate first
    pub top_flaky_tests: Vec<TestSummary>,
    /// Every annotated execution, in input order
    pub all_results: Vec<AnnotatedRecord>,
}

impl JsonReport {
    pub fn from_report(report: &DetectionReport) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "deflake-json-v1".to_string(),
            summary: JsonSummary {
                total_tests: report.total_tests(),
                total_executions: report.total_executions(),
                flaky_executions: report.flaky_count,
                flaky_percentage: report.flaky_percentage(),
                threshold_flagged: report.threshold_flagged,
                ml_flagged: report.ml_flagged,
            },
            top_flaky_tests: report.top_flaky_tests(JSON_TOP_TESTS),
            all_results: report.records.clone(),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
