// Per-test aggregation and top-N ranking
//
// Tests are ordered by mean EWMA failure rate, highest first. Ties break on
// test_id ascending so the ranking is deterministic.

use crate::record::{AnnotatedRecord, TestSummary};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct TestAggregate {
    ewma_sum: f64,
    failure_sum: f64,
    flaky: usize,
    count: usize,
}

/// Aggregate every test and return the full ranking
pub fn summarize_tests(records: &[AnnotatedRecord]) -> Vec<TestSummary> {
    let mut aggregates: HashMap<&str, TestAggregate> = HashMap::new();

    for record in records {
        let agg = aggregates.entry(record.test_id()).or_default();
        agg.ewma_sum += record.ewma_failure_rate;
        agg.failure_sum += record.failure_rate;
        agg.count += 1;
        if record.is_flaky {
            agg.flaky += 1;
        }
    }

    let mut summaries: Vec<TestSummary> = aggregates
        .into_iter()
        .map(|(test_id, agg)| TestSummary {
            test_id: test_id.to_string(),
            avg_ewma_failure_rate: agg.ewma_sum / agg.count as f64,
            flaky_execution_count: agg.flaky,
            avg_failure_rate: agg.failure_sum / agg.count as f64,
            execution_count: agg.count,
        })
        .collect();

    summaries.sort_by(compare_summaries);
    summaries
}

fn compare_summaries(a: &TestSummary, b: &TestSummary) -> Ordering {
    b.avg_ewma_failure_rate
        .total_cmp(&a.avg_ewma_failure_rate)
        .then_with(|| a.test_id.cmp(&b.test_id))
}

/// Top `n` flakiest tests by mean EWMA failure rate
///
/// `n` must be at least 1. Returns fewer than `n` entries when fewer
/// distinct tests exist, and an empty list for empty input.
pub fn top_flaky_tests(records: &[AnnotatedRecord], n: usize) -> Vec<TestSummary> {
    debug_assert!(n >= 1, "top_flaky_tests requires n >= 1");
    let mut summaries = summarize_tests(records);
    summaries.truncate(n);
    summaries
}
