//! Rendering of batch reports and drift, human or JSON.

use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use gitbackup_core::{DriftReport, RepoName};
use gitbackup_sync::{BatchReport, Outcome, RepoReport};

/// Print `report` and turn it into the process exit code.
///
/// Exit code is 1 when any repository failed.
pub fn finish(report: &BatchReport, json: bool) -> Result<ExitCode> {
    if json {
        print_json(report)?;
    } else {
        print_human(report);
    }
    Ok(ExitCode::from(exit_status(report)))
}

fn exit_status(report: &BatchReport) -> u8 {
    if report.is_success() {
        0
    } else {
        1
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}

fn print_human(report: &BatchReport) {
    if let Some(drift) = &report.drift {
        print_drift(drift);
    }

    for repo in &report.repos {
        print_repo(repo);
    }

    if let Some(Outcome::Failure { output, .. }) = &report.store_commit {
        eprintln!(
            "{} could not commit the tracking directory: {}",
            "warning:".yellow().bold(),
            output.trim()
        );
    }

    let (ok, failed, skipped) = report.counts();
    let summary = format!("{}: {ok} ok, {failed} failed, {skipped} skipped", report.command);
    if failed > 0 {
        println!("{}", summary.red().bold());
    } else {
        println!("{}", summary.bold());
    }
    if report.cancelled {
        println!("{}", "cancelled: remaining repositories were not started".yellow());
    }
}

/// Drift warnings; nothing when the sets agree.
pub fn print_drift(drift: &DriftReport) {
    if !drift.missing_locally.is_empty() {
        println!(
            "{} tracked but not present locally: {}",
            "warning:".yellow().bold(),
            join(&drift.missing_locally)
        );
    }
    if !drift.untracked.is_empty() {
        println!(
            "{} present locally but not tracked: {}",
            "warning:".yellow().bold(),
            join(&drift.untracked)
        );
        println!("  Run 'git-backup create <repo>' to start backing one up.");
    }
}

fn print_repo(repo: &RepoReport) {
    let marker = match repo.outcome {
        Outcome::Success { .. } => "✓".green().bold(),
        Outcome::Failure { .. } => "✗".red().bold(),
        Outcome::Skipped { .. } => "-".bright_black().bold(),
    };
    let header = match &repo.outcome {
        Outcome::Skipped { reason } => format!("{} ({reason})", repo.repo),
        Outcome::Failure {
            status: Some(code), ..
        } => format!("{} (exit {code})", repo.repo),
        _ => repo.repo.to_string(),
    };
    println!("{marker} {}", header.bold());

    if repo.units.len() > 1 {
        for unit in &repo.units {
            println!("    {} {}", unit_marker(&unit.outcome), unit.unit);
            print_indented(unit.outcome.text(), 8);
        }
    } else if !repo.outcome.is_skipped() {
        print_indented(repo.outcome.text(), 4);
    }
}

fn unit_marker(outcome: &Outcome) -> colored::ColoredString {
    match outcome {
        Outcome::Success { .. } => "ok".green(),
        Outcome::Failure { .. } => "failed".red(),
        Outcome::Skipped { .. } => "skipped".bright_black(),
    }
}

fn print_indented(text: &str, width: usize) {
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        println!("{:width$}{line}", "");
    }
}

fn join(names: &[RepoName]) -> String {
    names
        .iter()
        .map(RepoName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
