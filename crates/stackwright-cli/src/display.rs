//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Generation summaries
//! - Pipeline failures, one framed block per directory

use console::style;
use stackwright_core::GenerateReport;
use stackwright_manifests::{DirectoryOutcome, PipelineReport};

/// Print what a generation run produced
pub fn print_generate_report(report: &GenerateReport) {
    println!(
        "{} Composed {} component(s) for {}",
        style("✓").green(),
        report.components.len(),
        style(report.environment).cyan()
    );
    for component in &report.components {
        println!("    {} {}", style("·").dim(), component.dir_name);
    }
    if !report.aggregate.skipped.is_empty() {
        println!(
            "  {} No skaffold fragments in: {}",
            style("⚠").yellow(),
            report.aggregate.skipped.join(", ")
        );
    }
    println!(
        "  {} {} file(s) updated, {} unchanged, {} removed",
        style("→").blue(),
        report.sync.copied,
        report.sync.unchanged,
        report.sync.removed
    );
}

fn print_failure(outcome: &DirectoryOutcome) {
    let rule = "─".repeat(60);
    println!();
    println!(
        "{} {} [{}]",
        style("┌─").red(),
        style(&outcome.directory).red().bold(),
        outcome.state.label()
    );
    if let Some(error) = &outcome.error {
        for line in error.to_string().lines() {
            println!("{} {}", style("│").red(), line);
        }
    }
    println!("{}", style(format!("└{}", rule)).red());
}

/// Print one framed block per failed directory
pub fn print_pipeline_failures(report: &PipelineReport) {
    for outcome in report.failures() {
        print_failure(outcome);
    }
}
