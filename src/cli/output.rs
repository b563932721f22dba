//! Output formatting for status reports
//!
//! Renders a [`DiagReport`] either as pretty JSON (machine-readable) or as
//! human-readable text with per-check timing and resource usage.
//!
//! # Example
//!
//! ```ignore
//! use dockhand::cli::output::{OutputFormat, OutputFormatter};
//!
//! let formatter = OutputFormatter::new(OutputFormat::Human);
//! let output = formatter.format(&report)?;
//! println!("{}", output);
//! ```

use anyhow::{Context, Result};

use crate::diag::{DiagReport, ServiceReport};

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

/// Output formatter for diagnostic reports
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Creates a new output formatter with the specified format
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a diagnostic report according to the configured format
    pub fn format(&self, report: &DiagReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.format_json(report),
            OutputFormat::Human => self.format_human(report),
        }
    }

    fn format_json(&self, report: &DiagReport) -> Result<String> {
        serde_json::to_string_pretty(report).context("Failed to serialize status report to JSON")
    }

    fn format_human(&self, report: &DiagReport) -> Result<String> {
        let mut output = String::new();

        output.push_str("Service Status\n");
        output.push_str("\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\n\n");

        for service in &report.services {
            self.push_service(&mut output, service);
            output.push('\n');
        }

        Ok(output)
    }

    fn push_service(&self, output: &mut String, service: &ServiceReport) {
        let status_symbol = if service.healthy() {
            "\u{2713}"
        } else {
            "\u{2717}"
        };

        output.push_str(&format!("{} {}\n", status_symbol, service.name));
        output.push_str(&format!(
            "  State: {}\n",
            if service.running {
                "running"
            } else {
                "not running"
            }
        ));

        for check in &service.checks {
            let verdict = if check.passed { "ok" } else { "failed" };
            output.push_str(&format!(
                "  {}: {} ({} ms)\n",
                check.name, verdict, check.elapsed_ms
            ));
            if let Some(ref detail) = check.detail {
                output.push_str(&format!("    {}\n", detail));
            }
        }

        if let Some(ref stats) = service.stats {
            output.push_str(&format!(
                "  CPU: {} Memory: {} ({}) PIDs: {}\n",
                stats.cpu_percent, stats.memory_usage, stats.memory_percent, stats.pids
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::CheckReport;
    use crate::runtime::StatsRecord;
    use chrono::Utc;

    fn sample_report() -> DiagReport {
        DiagReport {
            generated_at: Utc::now(),
            services: vec![
                ServiceReport {
                    name: "pgvector".to_string(),
                    running: true,
                    checks: vec![
                        CheckReport {
                            name: "liveness",
                            passed: true,
                            elapsed_ms: 14,
                            detail: Some("Up 2 hours".to_string()),
                        },
                        CheckReport {
                            name: "readiness",
                            passed: true,
                            elapsed_ms: 103,
                            detail: None,
                        },
                    ],
                    stats: Some(StatsRecord {
                        name: "pgvector".to_string(),
                        cpu_percent: "0.03%".to_string(),
                        memory_usage: "23.4MiB / 2GiB".to_string(),
                        memory_percent: "1.12%".to_string(),
                        pids: "6".to_string(),
                    }),
                },
                ServiceReport {
                    name: "ollama".to_string(),
                    running: false,
                    checks: vec![CheckReport {
                        name: "liveness",
                        passed: false,
                        elapsed_ms: 9,
                        detail: Some("not found".to_string()),
                    }],
                    stats: None,
                },
            ],
        }
    }

    #[test]
    fn test_human_format_marks_services() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format(&sample_report()).unwrap();

        assert!(output.starts_with("Service Status\n"));
        assert!(output.contains("\u{2713} pgvector"));
        assert!(output.contains("\u{2717} ollama"));
        assert!(output.contains("  State: running"));
        assert!(output.contains("  State: not running"));
        assert!(output.contains("  readiness: ok (103 ms)"));
        assert!(output.contains("    not found"));
        assert!(output.contains("  CPU: 0.03% Memory: 23.4MiB / 2GiB (1.12%) PIDs: 6"));
    }

    #[test]
    fn test_json_format_round_trips() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format(&sample_report()).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["services"][0]["name"], "pgvector");
        assert_eq!(parsed["services"][1]["running"], false);
        assert!(parsed["services"][1].get("stats").is_none());
    }
}
