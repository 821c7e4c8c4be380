// Z-score threshold labeling
//
// Pure per-record rule: the z-score already carries the per-test context.

use crate::record::AnnotatedRecord;

/// Whether a z-score exceeds the threshold in magnitude
pub fn exceeds_threshold(z_score: f64, threshold: f64) -> bool {
    z_score.abs() > threshold
}

/// Set `is_flaky_threshold = |z_score| > threshold` and return the flagged count
pub fn label_threshold(records: &mut [AnnotatedRecord], threshold: f64) -> usize {
    let mut flagged = 0;
    for record in records.iter_mut() {
        record.is_flaky_threshold = exceeds_threshold(record.z_score, threshold);
        if record.is_flaky_threshold {
            flagged += 1;
        }
    }
    tracing::debug!(
        "Threshold method (|z| > {}) flagged {} executions",
        threshold,
        flagged
    );
    flagged
}
