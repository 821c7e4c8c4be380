//! Report rendering and file output
//!
//! [`ConsoleReport`] renders the text summary; [`write_reports`] writes the
//! file formats selected in `[reporting]` into the output directory.

use crate::config::{OutputFormat, ReportingConfig};
use crate::csv_output::CsvReport;
use crate::detector::DetectionReport;
use crate::html_output::HtmlReport;
use crate::json_output::JsonReport;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const RULE_WIDTH: usize = 70;

/// Human-readable detection summary
#[derive(Debug)]
pub struct ConsoleReport<'a> {
    report: &'a DetectionReport,
    top_n: usize,
}

impl<'a> ConsoleReport<'a> {
    pub fn new(report: &'a DetectionReport, top_n: usize) -> Self {
        Self { report, top_n }
    }

    pub fn to_report_string(&self) -> String {
        let report = self.report;
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        let mut out = String::new();

        out.push_str(&format!("{}\nFlaky Test Detection Report\n{}\n\n", heavy, heavy));
        out.push_str(&format!("Total Tests Analyzed: {}\n", report.total_tests()));
        out.push_str(&format!(
            "Total Test Executions: {}\n",
            report.total_executions()
        ));
        out.push_str(&format!(
            "Flaky Executions Detected: {} ({:.1}%)\n",
            report.flaky_count,
            report.flaky_percentage()
        ));
        out.push_str(&format!(
            "  z-score threshold: {}  isolation forest: {}\n\n",
            report.threshold_flagged, report.ml_flagged
        ));

        let top = report.top_flaky_tests(self.top_n);
        out.push_str(&format!("Top {} Flakiest Tests:\n{}\n", self.top_n, light));

        if top.is_empty() {
            out.push_str("(no executions analyzed)\n");
        } else {
            let id_width = top
                .iter()
                .map(|s| s.test_id.chars().count())
                .max()
                .unwrap_or(0)
                .max("test_id".len());
            out.push_str(&format!(
                "{:<id_width$}  {:>10}  {:>12}  {:>5}\n",
                "test_id", "avg_ewma", "avg_failure", "flaky"
            ));
            for summary in &top {
                out.push_str(&format!(
                    "{:<id_width$}  {:>10.4}  {:>12.4}  {:>5}\n",
                    summary.test_id,
                    summary.avg_ewma_failure_rate,
                    summary.avg_failure_rate,
                    summary.flaky_execution_count
                ));
            }
        }

        out.push_str(&heavy);
        out.push('\n');
        out
    }
}

/// Write every selected file format under `config.output_dir`
///
/// Returns the paths written. Console output is not a file and is left to
/// the caller.
pub fn write_reports(report: &DetectionReport, config: &ReportingConfig) -> Result<Vec<PathBuf>> {
    let wants_files = config
        .output_formats
        .iter()
        .any(|f| *f != OutputFormat::Console);
    if !wants_files {
        return Ok(Vec::new());
    }

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let mut written = Vec::new();

    if config.wants(OutputFormat::Json) {
        let json = JsonReport::from_report(report).to_json()?;
        written.push(write_file(&config.output_dir, "results.json", &json)?);
    }

    if config.wants(OutputFormat::Csv) {
        let csv = CsvReport::new(&report.records).to_csv();
        written.push(write_file(&config.output_dir, "results.csv", &csv)?);
    }

    if config.wants(OutputFormat::Html) {
        let html = HtmlReport::new(report, config.top_n_tests).to_html();
        written.push(write_file(&config.output_dir, "report.html", &html)?);
    }

    Ok(written)
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Wrote {}", path.display());
    Ok(path)
}
