// End-to-end CLI tests for deflake
//
// Each test writes an execution history into a temp dir, runs the binary
// against it, and checks the console report and the written files.

#![allow(deprecated)] // Command::cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str = "test_id,execution_id,timestamp,build_number,pass_count,fail_count,total_runs";

/// Two steadily flaky tests among four stable ones, 10 builds of 20 runs
fn write_history(dir: &Path) -> std::path::PathBuf {
    let suites: [(&str, [u64; 10]); 6] = [
        (
            "tests/test_checkout.py::test_payment_timeout",
            [7, 8, 6, 9, 7, 8, 7, 6, 8, 9],
        ),
        (
            "tests/test_search.py::test_index_race",
            [8, 7, 9, 6, 8, 7, 8, 9, 7, 6],
        ),
        ("tests/test_api.py::test_get_users", [1; 10]),
        ("tests/test_api.py::test_create_user", [1; 10]),
        ("tests/test_auth.py::test_login", [1, 0, 1, 0, 1, 0, 1, 0, 1, 0]),
        ("tests/test_auth.py::test_logout", [0, 1, 0, 1, 0, 1, 0, 1, 0, 1]),
    ];

    let mut csv = String::from(HEADER);
    csv.push('\n');
    for (test_id, failures) in suites {
        for (build, fail) in failures.iter().enumerate() {
            csv.push_str(&format!(
                "{},run_{:03},2025-01-15 {:02}:00:00,{},{},{},20\n",
                test_id,
                build + 1,
                build + 8,
                build + 1,
                20 - fail,
                fail
            ));
        }
    }

    let path = dir.join("test_history.csv");
    fs::write(&path, csv).unwrap();
    path
}

// ============================================================================
// Test 1: Console report ranks the injected flaky tests first
// ============================================================================

#[test]
fn test_console_report_ranks_flaky_tests() {
    let temp = TempDir::new().unwrap();
    let input = write_history(temp.path());

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path())
        .arg("-i")
        .arg(&input)
        .arg("--format")
        .arg("console")
        .arg("-n")
        .arg("2");

    let output = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8(output).unwrap();

    assert!(stdout.contains("Flaky Test Detection Report"));
    assert!(stdout.contains("Total Tests Analyzed: 6"));
    assert!(stdout.contains("Total Test Executions: 60"));
    assert!(stdout.contains("Top 2 Flakiest Tests:"));
    assert!(stdout.contains("test_payment_timeout"));
    assert!(stdout.contains("test_index_race"));
    assert!(!stdout.contains("test_get_users"));
}

// ============================================================================
// Test 2: JSON, CSV and HTML files are written to the output dir
// ============================================================================

#[test]
fn test_file_reports_written() {
    let temp = TempDir::new().unwrap();
    let input = write_history(temp.path());
    let out = temp.path().join("reports");

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path())
        .arg("--input")
        .arg(&input)
        .arg("--output-dir")
        .arg(&out)
        .arg("--format")
        .arg("json,csv,html");

    cmd.assert().success().stdout(predicate::str::is_empty());

    let json = fs::read_to_string(out.join("results.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["format"], "deflake-json-v1");
    assert_eq!(value["summary"]["total_tests"], 6);
    assert_eq!(value["summary"]["total_executions"], 60);
    assert_eq!(value["all_results"].as_array().unwrap().len(), 60);
    assert_eq!(value["top_flaky_tests"].as_array().unwrap().len(), 6);

    let csv = fs::read_to_string(out.join("results.csv")).unwrap();
    assert_eq!(csv.lines().count(), 61);

    let html = fs::read_to_string(out.join("report.html")).unwrap();
    assert!(html.contains("Failure Rate Trends"));
}

// ============================================================================
// Test 3: Config file drives detection; CLI flags override it
// ============================================================================

#[test]
fn test_config_file_and_overrides() {
    let temp = TempDir::new().unwrap();
    let input = write_history(temp.path());
    let config = temp.path().join("custom.toml");
    fs::write(
        &config,
        format!(
            "[data]\ninput_path = \"{}\"\n\n[detection]\nuse_ml_detector = false\n\n[reporting]\noutput_formats = [\"json\"]\noutput_dir = \"from_config\"\n",
            input.display()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path())
        .arg("--config")
        .arg(&config)
        .arg("-o")
        .arg("from_cli");

    cmd.assert().success();

    assert!(!temp.path().join("from_config").exists());
    let json = fs::read_to_string(temp.path().join("from_cli/results.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    // ML disabled and nothing crosses |z| > 2
    assert_eq!(value["summary"]["ml_flagged"], 0);
    assert_eq!(value["summary"]["flaky_executions"], 0);
}

// ============================================================================
// Test 4: Default deflake.toml is optional
// ============================================================================

#[test]
fn test_missing_default_config_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let input = write_history(temp.path());

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path())
        .arg("-i")
        .arg(&input)
        .arg("--format")
        .arg("console");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Top 5 Flakiest Tests:"));
}

// ============================================================================
// Test 5: Error paths exit non-zero with a message
// ============================================================================

#[test]
fn test_missing_explicit_config_fails() {
    let temp = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path()).arg("--config").arg("nope.toml");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_missing_input_fails() {
    let temp = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path()).arg("-i").arg("missing.csv");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Input not found"));
}

#[test]
fn test_invalid_contamination_rejected() {
    let temp = TempDir::new().unwrap();
    let input = write_history(temp.path());

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path())
        .arg("-i")
        .arg(&input)
        .arg("--contamination")
        .arg("0.9");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("ml_contamination"));
}

#[test]
fn test_unknown_format_rejected() {
    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.arg("--format").arg("pdf");

    cmd.assert().failure();
}

// ============================================================================
// Test 6: Directory of JSON run reports
// ============================================================================

#[test]
fn test_directory_input() {
    let temp = TempDir::new().unwrap();
    let runs = temp.path().join("runs");
    fs::create_dir(&runs).unwrap();
    for build in 1..=3 {
        fs::write(
            runs.join(format!("run_{build}.json")),
            format!(
                r#"{{"test_runs": [
                    {{"test_id": "tests/test_a.py::test_one", "execution_id": "run_{build}",
                      "timestamp": "2025-01-1{build}T10:00:00Z", "build_number": {build},
                      "pass_count": 9, "fail_count": 1, "total_runs": 10}},
                    {{"test_id": "tests/test_a.py::test_two", "execution_id": "run_{build}",
                      "timestamp": "2025-01-1{build}T10:00:00Z", "build_number": {build},
                      "pass_count": 10, "fail_count": 0, "total_runs": 10}}
                ]}}"#
            ),
        )
        .unwrap();
    }

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path())
        .arg("-i")
        .arg(&runs)
        .arg("--format")
        .arg("console");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Total Tests Analyzed: 2"))
        .stdout(predicate::str::contains("Total Test Executions: 6"));
}

// ============================================================================
// Test 7: Log levels and the log file
// ============================================================================

/// One valid row and one whose counts do not add up
fn write_bad_row_history(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("bad.csv");
    fs::write(
        &path,
        format!(
            "{HEADER}\ntests/test_a.py::test_one,run_1,2025-01-15 10:00:00,1,1,1,3\ntests/test_a.py::test_one,run_2,2025-01-15 11:00:00,2,3,0,3\n"
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_uppercase_warning_level_keeps_warnings() {
    let temp = TempDir::new().unwrap();
    let input = write_bad_row_history(temp.path());

    for level in ["WARNING", "warn", "Info"] {
        let mut cmd = Command::cargo_bin("deflake").unwrap();
        cmd.current_dir(temp.path())
            .env_remove("RUST_LOG")
            .arg("-i")
            .arg(&input)
            .arg("--format")
            .arg("console")
            .arg("--log-level")
            .arg(level);

        cmd.assert()
            .success()
            .stderr(predicate::str::contains("Skipping CSV row 2"));
    }
}

#[test]
fn test_unknown_log_level_rejected() {
    let temp = TempDir::new().unwrap();
    let input = write_bad_row_history(temp.path());

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path())
        .arg("-i")
        .arg(&input)
        .arg("--log-level")
        .arg("loud");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown log level 'loud'"));
}

#[test]
fn test_log_file_and_stderr_both_receive_warnings() {
    let temp = TempDir::new().unwrap();
    let input = write_bad_row_history(temp.path());
    let config = temp.path().join("deflake.toml");
    fs::write(
        &config,
        format!(
            "[data]\ninput_path = \"{}\"\n\n[reporting]\noutput_formats = [\"console\"]\n\n[logging]\nlevel = \"warning\"\nfile = \"deflake.log\"\n",
            input.display()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("deflake").unwrap();
    cmd.current_dir(temp.path()).env_remove("RUST_LOG");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Skipping CSV row 2"));

    let log = fs::read_to_string(temp.path().join("deflake.log")).unwrap();
    assert!(log.contains("Skipping CSV row 2"));
    assert!(log.contains("WARN"));
    // Plain text in the file, no colour codes
    assert!(!log.contains('\u{1b}'));
}
