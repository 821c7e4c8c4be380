#![no_main]

use deflake::ingest::parse_json_records;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = parse_json_records(input);
    }
});
