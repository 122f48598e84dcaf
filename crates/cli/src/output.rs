//! Terminal rendering for results and reports

use clap::ValueEnum;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use orchestrator::{HealthReport, HealthState, HookOutcome};
use serde::Serialize;
use sniff_core::{
    AggregatedResult, AnalysisResult, AnalysisStatus, AuditEntry, DomainSniffReport, FixReport,
    Issue, Severity,
};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
        .template("{spinner:.cyan} {msg}")
    {
        spinner.set_style(template);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_label(status: AnalysisStatus) -> String {
    let text = status.as_str().to_uppercase();
    match status {
        AnalysisStatus::Success => style(text).green().bold().to_string(),
        AnalysisStatus::Failure => style(text).yellow().bold().to_string(),
        AnalysisStatus::Error => style(text).red().bold().to_string(),
        AnalysisStatus::Pending | AnalysisStatus::Running => style(text).dim().to_string(),
    }
}

fn severity_label(severity: Severity) -> String {
    let text = format!("{:<6}", severity.to_string());
    match severity {
        Severity::High => style(text).red().to_string(),
        Severity::Medium => style(text).yellow().to_string(),
        Severity::Low => style(text).dim().to_string(),
    }
}

fn print_issue(issue: &Issue) {
    let location = match (issue.file(), issue.line()) {
        (Some(file), Some(line)) => format!("{}:{}", file.display(), line),
        _ => "-".to_string(),
    };
    let marker = if issue.fixed { " (fixed)" } else { "" };
    println!(
        "    {} {} {} {}{}",
        severity_label(issue.severity),
        style(&issue.issue_type).bold(),
        style(location).dim(),
        issue.description,
        marker
    );
}

fn print_domain(result: &AnalysisResult) {
    println!(
        "  {} {} {}",
        style(format!("[{}]", result.domain)).cyan(),
        status_label(result.status),
        style(format!("{} issues, {} ms", result.issues.len(), result.duration_ms)).dim()
    );
    if let Some(error) = &result.error {
        println!("    {} {}", style("error:").red(), error);
    }
    for issue in &result.issues {
        print_issue(issue);
    }
    for recommendation in &result.recommendations {
        println!("    {} {}", style("hint:").blue(), recommendation);
    }
}

pub fn print_aggregated(result: &AggregatedResult) {
    println!(
        "{} {} {}",
        status_label(result.status),
        style(result.file.display()).bold(),
        style(format!("({} issues)", result.issue_count)).dim()
    );
    if let Some(error) = &result.error {
        println!("  {} {}", style("error:").red(), error);
    }
    for domain_result in result.results.values() {
        print_domain(domain_result);
    }
}

pub fn print_domain_report(report: &DomainSniffReport) {
    println!(
        "{} domain {} across {} files",
        status_label(report.status),
        style(&report.domain).cyan().bold(),
        report.results.len()
    );
    if let Some(error) = &report.error {
        println!("  {} {}", style("error:").red(), error);
    }
    for result in &report.results {
        println!(
            "  {} {}",
            status_label(result.status),
            style(result.file.display()).bold()
        );
        if let Some(error) = &result.error {
            println!("    {} {}", style("error:").red(), error);
        }
        for issue in &result.issues {
            print_issue(issue);
        }
    }
}

pub fn print_fix_report(report: &FixReport) {
    println!(
        "{} fixed, {} not fixed",
        style(report.fixed.len()).green().bold(),
        style(report.failed.len()).yellow().bold()
    );
    for issue in &report.fixed {
        print_issue(issue);
    }
    if !report.suggestions.is_empty() {
        println!("{}", style("Suggestions:").bold());
        for suggestion in &report.suggestions {
            println!(
                "  {} {} {}",
                style(format!("{:.2}", suggestion.confidence)).cyan(),
                suggestion.issue_id,
                suggestion.suggested_change
            );
        }
    }
    for verification in &report.verifications {
        let verdict = if verification.improved {
            style("improved").green()
        } else {
            style("not improved").yellow()
        };
        println!(
            "  {} {} -> {} {}",
            style(verification.file.display()).bold(),
            verification.issues_before,
            verification.issues_after,
            verdict
        );
    }
}

pub fn print_hook_outcome(outcome: &HookOutcome) {
    for result in &outcome.results {
        print_aggregated(result);
    }
    if outcome.passed {
        println!("{} all {} files passed", style("✓").green().bold(), outcome.results.len());
    } else {
        println!(
            "{} {} of {} files failed",
            style("✗").red().bold(),
            outcome.failing.len(),
            outcome.results.len()
        );
    }
}

pub fn print_health(report: &HealthReport) {
    let status = match report.status {
        HealthState::Healthy => style("HEALTHY").green().bold(),
        HealthState::Degraded => style("DEGRADED").yellow().bold(),
        HealthState::Unhealthy => style("UNHEALTHY").red().bold(),
    };
    println!("{} {} alerts raised", status, report.alerts_raised);
    for check in &report.checks {
        println!("  {:<16} {:?} {}", check.name, check.status, check.message);
    }
    for entry in &report.degraded {
        println!("  {} {}", style("degraded:").yellow(), entry);
    }
}

pub fn print_audit(entries: &[AuditEntry]) {
    for entry in entries {
        println!(
            "{} {} {} [{}] {} issues",
            style(entry.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            status_label(entry.status),
            entry.file.display(),
            entry.domain,
            entry.issue_count
        );
    }
}
