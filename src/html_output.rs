//! HTML output format for detection reports
//!
//! Self-contained page with embedded CSS: batch summary, ranked flaky tests,
//! and a failure-rate-by-build trend table for each top test.

use crate::detector::DetectionReport;
use crate::record::{AnnotatedRecord, TestSummary};

/// HTML output formatter
#[derive(Debug)]
pub struct HtmlReport<'a> {
    report: &'a DetectionReport,
    top_n: usize,
}

impl<'a> HtmlReport<'a> {
    pub fn new(report: &'a DetectionReport, top_n: usize) -> Self {
        Self { report, top_n }
    }

    /// Escape HTML special characters to prevent XSS
    fn escape_html(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;")
    }

    /// Generate embedded CSS styles
    fn generate_styles() -> &'static str {
        r#"
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 20px;
            background-color: #f5f5f5;
        }
        h1, h2, h3 {
            color: #333;
        }
        table {
            border-collapse: collapse;
            width: 100%;
            background-color: white;
            box-shadow: 0 1px 3px rgba(0,0,0,0.1);
            margin-bottom: 20px;
        }
        th, td {
            border: 1px solid #ddd;
            padding: 8px;
            text-align: left;
        }
        th {
            background-color: #4a90d9;
            color: white;
            font-weight: bold;
        }
        tr:nth-child(even) {
            background-color: #f9f9f9;
        }
        .test-id {
            font-family: monospace;
            color: #0066cc;
        }
        .rate {
            font-family: monospace;
        }
        .flaky {
            color: #cc0000;
            font-weight: bold;
        }
        .summary td:first-child {
            font-weight: bold;
            width: 30%;
        }
        .trend th {
            background-color: #5cb85c;
        }
        .footer {
            margin-top: 20px;
            font-size: 0.8em;
            color: #888;
            text-align: center;
        }
        "#
    }

    fn render_summary(&self) -> String {
        let report = self.report;
        let rows = [
            ("Tests analyzed", report.total_tests().to_string()),
            ("Executions", report.total_executions().to_string()),
            (
                "Flaky executions",
                format!(
                    "{} ({:.2}%)",
                    report.flaky_count,
                    report.flaky_percentage()
                ),
            ),
            ("Flagged by z-score", report.threshold_flagged.to_string()),
            ("Flagged by isolation forest", report.ml_flagged.to_string()),
        ];

        let mut html = String::new();
        html.push_str("    <h2>Summary</h2>\n");
        html.push_str("    <table class=\"summary\">\n");
        for (label, value) in rows {
            html.push_str(&format!(
                "        <tr><td>{}</td><td>{}</td></tr>\n",
                label,
                Self::escape_html(&value)
            ));
        }
        html.push_str("    </table>\n");
        html
    }

    fn render_ranking(top: &[TestSummary]) -> String {
        let mut html = String::new();
        html.push_str("    <h2>Top Flaky Tests</h2>\n");
        html.push_str("    <table>\n");
        html.push_str("        <tr><th>#</th><th>Test</th><th>Mean EWMA failure rate</th><th>Mean failure rate</th><th>Flaky executions</th><th>Executions</th></tr>\n");

        for (rank, summary) in top.iter().enumerate() {
            html.push_str(&format!(
                "        <tr><td>{}</td><td class=\"test-id\">{}</td><td class=\"rate\">{:.4}</td><td class=\"rate\">{:.4}</td><td>{}</td><td>{}</td></tr>\n",
                rank + 1,
                Self::escape_html(&summary.test_id),
                summary.avg_ewma_failure_rate,
                summary.avg_failure_rate,
                summary.flaky_execution_count,
                summary.execution_count
            ));
        }

        html.push_str("    </table>\n");
        html
    }

    /// Failure rate and EWMA per build for one test, oldest build first
    fn render_trend(&self, test_id: &str) -> String {
        let mut executions: Vec<&AnnotatedRecord> = self
            .report
            .records
            .iter()
            .filter(|r| r.test_id() == test_id)
            .collect();
        executions.sort_by_key(|r| (r.record.build_number, r.record.timestamp));

        let mut html = String::new();
        html.push_str(&format!(
            "    <h3 class=\"test-id\">{}</h3>\n",
            Self::escape_html(test_id)
        ));
        html.push_str("    <table class=\"trend\">\n");
        html.push_str("        <tr><th>Build</th><th>Failures</th><th>Failure rate</th><th>EWMA</th><th>z-score</th><th>Flaky</th></tr>\n");

        for record in executions {
            let flaky = if record.is_flaky {
                "<span class=\"flaky\">yes</span>"
            } else {
                "no"
            };
            html.push_str(&format!(
                "        <tr><td>{}</td><td>{}/{}</td><td class=\"rate\">{:.4}</td><td class=\"rate\">{:.4}</td><td class=\"rate\">{:.2}</td><td>{}</td></tr>\n",
                record.record.build_number,
                record.record.fail_count,
                record.record.total_runs,
                record.failure_rate,
                record.ewma_failure_rate,
                record.z_score,
                flaky
            ));
        }

        html.push_str("    </table>\n");
        html
    }

    /// Generate complete HTML document
    pub fn to_html(&self) -> String {
        let top = self.report.top_flaky_tests(self.top_n);
        let mut html = String::new();

        html.push_str("<!DOCTYPE html>\n");
        html.push_str("<html lang=\"en\">\n");

        html.push_str("<head>\n");
        html.push_str("    <meta charset=\"UTF-8\">\n");
        html.push_str(
            "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
        );
        html.push_str("    <title>Deflake Flaky Test Report</title>\n");
        html.push_str("    <style>");
        html.push_str(Self::generate_styles());
        html.push_str("</style>\n");
        html.push_str("</head>\n");

        html.push_str("<body>\n");
        html.push_str("    <h1>Flaky Test Report</h1>\n");
        html.push_str(&self.render_summary());
        html.push_str(&Self::render_ranking(&top));

        if !top.is_empty() {
            html.push_str("    <h2>Failure Rate Trends</h2>\n");
            for summary in &top {
                html.push_str(&self.render_trend(&summary.test_id));
            }
        }

        html.push_str("    <div class=\"footer\">\n");
        html.push_str(&format!(
            "        Generated by deflake {}\n",
            env!("CARGO_PKG_VERSION")
        ));
        html.push_str("    </div>\n");

        html.push_str("</body>\n");
        html.push_str("</html>\n");

        html
    }
}
