//! Deflake - Statistical flaky test detection
//!
//! This library labels CI test executions as flaky or stable. Failure rates
//! are smoothed per test with an EWMA and standardized into z-scores; an
//! execution is flaky when its z-score crosses a threshold or when an
//! isolation forest over `(ewma, z, failure_rate)` marks it as an outlier.
//! Tests are then ranked by mean EWMA failure rate.
//!
//! ```
//! use chrono::Utc;
//! use deflake::detector::{DetectorConfig, FlakinessDetector};
//! use deflake::record::ExecutionRecord;
//!
//! let records = vec![ExecutionRecord {
//!     test_id: "tests/test_api.py::test_get_users".to_string(),
//!     execution_id: "run_001".to_string(),
//!     timestamp: Utc::now(),
//!     build_number: 1,
//!     pass_count: 9,
//!     fail_count: 1,
//!     total_runs: 10,
//! }];
//!
//! let detector = FlakinessDetector::new(DetectorConfig::default()).unwrap();
//! let report = detector.analyze(&records);
//! assert_eq!(report.top_flaky_tests(5).len(), 1);
//! ```

pub mod cli;
pub mod config;
pub mod csv_output;
pub mod detector;
pub mod html_output;
pub mod ingest;
pub mod isolation_forest;
pub mod json_output;
pub mod record;
pub mod report;
