//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying run results
//! to the user in text or JSON form.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::deployment::RunReport;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Deployment row for table display.
#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Deployment")]
    name: String,
    #[tabled(rename = "Regions")]
    regions: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Run")]
    run: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a run report for display.
    #[must_use]
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a run report as text.
    fn format_report_text(report: &RunReport) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "\n{} run for environment '{}'",
            capitalize(&report.action),
            report.environment
        );

        if report.deployments.is_empty() {
            let _ = writeln!(output, "\n{} Nothing was in scope for this run.", "!".yellow());
            return output;
        }

        let rows: Vec<DeploymentRow> = report
            .deployments
            .iter()
            .map(|deployment| DeploymentRow {
                name: deployment.name.clone(),
                regions: deployment.regions.join(", "),
                mode: if deployment.parallel {
                    String::from("parallel")
                } else {
                    String::from("sequential")
                },
                run: deployment.stats.run,
                skipped: deployment.stats.skipped,
            })
            .collect();

        let table = Table::new(rows).to_string();
        output.push_str(&table);
        output.push('\n');

        let totals = report.totals();
        let _ = writeln!(
            output,
            "\n{} {} complete: {} module(s) run, {} skipped",
            "✓".green(),
            capitalize(&report.action),
            totals.run.to_string().green(),
            totals.skipped.to_string().yellow()
        );

        output
    }
}

/// Uppercases the first character of an action name.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::DeploymentSummary;
    use crate::module::ModuleStats;

    fn sample_report() -> RunReport {
        RunReport {
            action: String::from("deploy"),
            environment: String::from("dev"),
            deployments: vec![DeploymentSummary {
                name: String::from("app"),
                regions: vec![String::from("us-east-1"), String::from("us-west-2")],
                parallel: true,
                stats: ModuleStats { run: 3, skipped: 1 },
            }],
        }
    }

    #[test]
    fn test_text_report_mentions_totals() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let output = formatter.format_report(&sample_report());
        assert!(output.contains("app"));
        assert!(output.contains("us-east-1, us-west-2"));
        assert!(output.contains("skipped"));
    }

    #[test]
    fn test_json_report_round_trips() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_report(&sample_report());

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["action"], "deploy");
        assert_eq!(parsed["deployments"][0]["stats"]["run"], 3);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("deploy"), "Deploy");
        assert_eq!(capitalize(""), "");
    }
}
