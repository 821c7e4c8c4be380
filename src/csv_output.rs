//! CSV output format for detection results
//!
//! One row per annotated execution, for spreadsheet analysis and machine parsing.

use crate::record::AnnotatedRecord;

const HEADER: [&str; 15] = [
    "test_id",
    "execution_id",
    "timestamp",
    "build_number",
    "pass_count",
    "fail_count",
    "total_runs",
    "pass_rate",
    "failure_rate",
    "ewma_failure_rate",
    "z_score",
    "anomaly_score",
    "is_flaky_threshold",
    "is_flaky_ml",
    "is_flaky",
];

/// CSV output formatter
#[derive(Debug)]
pub struct CsvReport<'a> {
    records: &'a [AnnotatedRecord],
}

impl<'a> CsvReport<'a> {
    pub fn new(records: &'a [AnnotatedRecord]) -> Self {
        Self { records }
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
        {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn format_record(record: &AnnotatedRecord) -> String {
        let r = &record.record;
        let fields = [
            Self::escape_field(&r.test_id),
            Self::escape_field(&r.execution_id),
            r.timestamp.to_rfc3339(),
            r.build_number.to_string(),
            r.pass_count.to_string(),
            r.fail_count.to_string(),
            r.total_runs.to_string(),
            record.pass_rate.to_string(),
            record.failure_rate.to_string(),
            record.ewma_failure_rate.to_string(),
            record.z_score.to_string(),
            record
                .anomaly_score
                .map(|s| s.to_string())
                .unwrap_or_default(),
            record.is_flaky_threshold.to_string(),
            record.is_flaky_ml.to_string(),
            record.is_flaky.to_string(),
        ];
        fields.join(",")
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = String::new();

        output.push_str(&HEADER.join(","));
        output.push('\n');

        for record in self.records {
            output.push_str(&Self::format_record(record));
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ExecutionRecord;
    use chrono::{TimeZone, Utc};

    fn annotated(test_id: &str) -> AnnotatedRecord {
        AnnotatedRecord::from(ExecutionRecord {
            test_id: test_id.to_string(),
            execution_id: "run_001".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
            build_number: 1,
            pass_count: 3,
            fail_count: 1,
            total_runs: 4,
        })
    }

    #[test]
    fn test_csv_escape_field() {
        assert_eq!(CsvReport::escape_field("simple"), "simple");
        assert_eq!(CsvReport::escape_field("a,b"), "\"a,b\"");
        assert_eq!(CsvReport::escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(CsvReport::escape_field("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_csv_header_and_rows() {
        let records = vec![annotated("t1"), annotated("t2")];
        let csv = CsvReport::new(&records).to_csv();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("test_id,execution_id,timestamp"));
        assert!(lines[0].ends_with("is_flaky_threshold,is_flaky_ml,is_flaky"));
        assert_eq!(
            lines[1],
            "t1,run_001,2025-01-15T10:00:00+00:00,1,3,1,4,0.75,0.25,0,0,,false,false,false"
        );
    }

    #[test]
    fn test_csv_quotes_parametrized_test_ids() {
        let mut record = annotated("tests/test_math.py::test_add[1,2]");
        record.anomaly_score = Some(0.5);
        record.is_flaky_ml = true;
        record.is_flaky = true;
        let records = [record];
        let csv = CsvReport::new(&records).to_csv();

        assert!(csv.contains("\"tests/test_math.py::test_add[1,2]\""));
        assert!(csv.contains(",0.5,false,true,true"));
    }

    #[test]
    fn test_csv_empty() {
        let csv = CsvReport::new(&[]).to_csv();
        assert_eq!(csv.lines().count(), 1);
    }
}
