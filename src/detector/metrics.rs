// Per-test failure-rate metrics: EWMA smoothing and z-scores
//
// Records are grouped by test_id into an arena of per-test series. Each
// series is walked in chronological order carrying a running EWMA
// accumulator. Results are written back by original index, so the caller's
// record order is never disturbed.

use crate::record::AnnotatedRecord;
use std::collections::HashMap;

/// Indices of one test's records, in chronological order once sorted
#[derive(Debug, Default)]
struct TestSeries {
    members: Vec<usize>,
}

impl TestSeries {
    /// Sort members by timestamp; ties keep input order (stable sort)
    fn sort_chronologically(&mut self, records: &[AnnotatedRecord]) {
        self.members.sort_by_key(|&idx| records[idx].record.timestamp);
    }
}

/// Group record indices by test_id, preserving first-seen order of tests
fn group_by_test(records: &[AnnotatedRecord]) -> Vec<TestSeries> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut series: Vec<TestSeries> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let slot = *index.entry(record.test_id()).or_insert_with(|| {
            series.push(TestSeries::default());
            series.len() - 1
        });
        series[slot].members.push(idx);
    }

    series
}

/// Recursive EWMA over a chronologically ordered sequence
///
/// `ewma_0 = x_0`, `ewma_t = alpha * x_t + (1 - alpha) * ewma_{t-1}`.
pub fn ewma(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut smoothed = Vec::with_capacity(values.len());
    let mut acc: Option<f64> = None;

    for &value in values {
        let next = match acc {
            None => value,
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
        };
        smoothed.push(next);
        acc = Some(next);
    }

    smoothed
}

/// Mean and sample standard deviation (ddof = 1)
///
/// Returns `None` for fewer than two values.
pub fn mean_and_sample_stddev(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((mean, (sum_sq / (n - 1.0)).sqrt()))
}

/// Standardize each value against the group
///
/// A group of one, or a group whose standard deviation is zero, yields
/// exactly 0.0 for every member.
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    match mean_and_sample_stddev(values) {
        Some((mean, sd)) if sd > 0.0 && sd.is_finite() => {
            values.iter().map(|v| (v - mean) / sd).collect()
        }
        _ => vec![0.0; values.len()],
    }
}

/// Fill `ewma_failure_rate` and `z_score` on every record
///
/// `alpha` must already be validated to lie in (0, 1].
pub fn apply_metrics(records: &mut [AnnotatedRecord], alpha: f64) {
    if records.is_empty() {
        return;
    }

    let mut series = group_by_test(records);
    tracing::debug!(
        "Computing EWMA (alpha={}) and z-scores for {} tests",
        alpha,
        series.len()
    );

    for test in &mut series {
        test.sort_chronologically(records);

        let rates: Vec<f64> = test
            .members
            .iter()
            .map(|&idx| records[idx].failure_rate)
            .collect();
        let smoothed = ewma(&rates, alpha);
        let z = z_scores(&rates);

        for (pos, &idx) in test.members.iter().enumerate() {
            records[idx].ewma_failure_rate = smoothed[pos];
            records[idx].z_score = z[pos];
        }
    }
}
