// Label combination: an execution is flaky if either method flags it

use crate::record::AnnotatedRecord;

/// Set `is_flaky = is_flaky_threshold || is_flaky_ml` and return the flaky count
pub fn combine_labels(records: &mut [AnnotatedRecord]) -> usize {
    let mut flaky = 0;
    for record in records.iter_mut() {
        record.is_flaky = record.is_flaky_threshold || record.is_flaky_ml;
        if record.is_flaky {
            flaky += 1;
        }
    }
    flaky
}

/// Reset the ML stage output when the isolation forest is disabled
///
/// Every record gets `is_flaky_ml = false` and no anomaly score, so the
/// combined label collapses to the threshold label.
pub fn clear_ml_labels(records: &mut [AnnotatedRecord]) {
    for record in records.iter_mut() {
        record.is_flaky_ml = false;
        record.anomaly_score = None;
    }
}
