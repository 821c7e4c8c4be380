#![no_main]

use deflake::ingest::parse_csv_records;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Malformed rows are skipped or rejected, never a panic
        if let Ok(report) = parse_csv_records(input) {
            for record in &report.records {
                assert!(record.validate().is_ok());
            }
        }
    }
});
