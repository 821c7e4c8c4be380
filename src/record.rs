//! Execution records and their annotated form
//!
//! An [`ExecutionRecord`] is one batch of runs of one test in one build, as
//! produced by ingestion. The detector pipeline turns each record into an
//! [`AnnotatedRecord`] and fills in the derived fields stage by stage:
//!
//! | Stage              | Fields                                  |
//! |--------------------|-----------------------------------------|
//! | construction       | `pass_rate`, `failure_rate`             |
//! | metrics engine     | `ewma_failure_rate`, `z_score`          |
//! | threshold labeler  | `is_flaky_threshold`                    |
//! | isolation forest   | `anomaly_score`, `is_flaky_ml`          |
//! | label combiner     | `is_flaky`                              |

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Violations of the execution record invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("total_runs must be positive")]
    ZeroTotalRuns,

    #[error("pass_count ({pass}) + fail_count ({fail}) must equal total_runs ({total})")]
    CountMismatch { pass: u64, fail: u64, total: u64 },

    #[error("test_id must not be empty")]
    EmptyTestId,
}

/// A single test execution batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Stable identifier of the test case
    pub test_id: String,
    /// Identifier of the CI run this record belongs to
    pub execution_id: String,
    /// When the execution happened; only used for ordering within a test
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Monotonic CI build counter
    pub build_number: i64,
    pub pass_count: u64,
    pub fail_count: u64,
    pub total_runs: u64,
}

impl ExecutionRecord {
    /// Check the count invariants enforced at ingestion time
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.test_id.is_empty() {
            return Err(RecordError::EmptyTestId);
        }
        if self.total_runs == 0 {
            return Err(RecordError::ZeroTotalRuns);
        }
        if self.pass_count.checked_add(self.fail_count) != Some(self.total_runs) {
            return Err(RecordError::CountMismatch {
                pass: self.pass_count,
                fail: self.fail_count,
                total: self.total_runs,
            });
        }
        Ok(())
    }

    /// Fraction of runs that passed (0.0 to 1.0)
    pub fn pass_rate(&self) -> f64 {
        if self.total_runs == 0 {
            return 0.0;
        }
        self.pass_count as f64 / self.total_runs as f64
    }

    /// Fraction of runs that failed (0.0 to 1.0)
    pub fn failure_rate(&self) -> f64 {
        1.0 - self.pass_rate()
    }
}

/// Execution record enriched by the detection pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRecord {
    #[serde(flatten)]
    pub record: ExecutionRecord,
    pub pass_rate: f64,
    pub failure_rate: f64,
    /// Exponentially weighted failure rate, in chronological order per test
    pub ewma_failure_rate: f64,
    /// Failure rate standardized against the test's own history
    pub z_score: f64,
    /// Isolation forest score in (0, 1]; `None` when the record was not scored
    pub anomaly_score: Option<f64>,
    pub is_flaky_threshold: bool,
    pub is_flaky_ml: bool,
    pub is_flaky: bool,
}

impl From<ExecutionRecord> for AnnotatedRecord {
    fn from(record: ExecutionRecord) -> Self {
        let pass_rate = record.pass_rate();
        Self {
            record,
            pass_rate,
            failure_rate: 1.0 - pass_rate,
            ewma_failure_rate: 0.0,
            z_score: 0.0,
            anomaly_score: None,
            is_flaky_threshold: false,
            is_flaky_ml: false,
            is_flaky: false,
        }
    }
}

impl AnnotatedRecord {
    pub fn test_id(&self) -> &str {
        &self.record.test_id
    }

    /// Feature vector consumed by the isolation forest
    pub fn features(&self) -> [f64; 3] {
        [self.ewma_failure_rate, self.z_score, self.failure_rate]
    }
}

/// Per-test aggregate produced by the ranker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub test_id: String,
    pub avg_ewma_failure_rate: f64,
    pub flaky_execution_count: usize,
    pub avg_failure_rate: f64,
    pub execution_count: usize,
}

/// Parse a timestamp in any of the layouts CI exports use
///
/// Accepts RFC 3339 (`2025-01-15T10:00:00Z`, with offset), naive date-times
/// (`2025-01-15T10:00:00`, `2025-01-15 10:00:00.250`) which are read as UTC,
/// and bare dates (`2025-01-15`, midnight UTC).
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}
