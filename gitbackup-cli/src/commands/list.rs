//! `git-backup list`: tracked repositories, their remotes, and drift.

use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gitbackup_core::{RemoteTarget, TrackedRepository};
use gitbackup_sync::{CancelToken, Listing};

use super::{report, GlobalArgs};

#[derive(Tabled)]
struct ListRow {
    #[tabled(rename = "repository")]
    repo: String,
    #[tabled(rename = "remotes")]
    remotes: String,
    #[tabled(rename = "local")]
    local: String,
    #[tabled(rename = "tracked since")]
    tracked_since: String,
}

pub fn run(global: &GlobalArgs) -> Result<ExitCode> {
    let engine = global.engine(&CancelToken::new())?;
    let listing = engine.list().context("failed to list tracked repositories")?;

    if global.json {
        report::print_json(&listing)?;
        return Ok(ExitCode::SUCCESS);
    }

    print_table(&listing);
    Ok(ExitCode::SUCCESS)
}

fn print_table(listing: &Listing) {
    println!(
        "git-backup v{} | {} tracked | {} missing locally | {} untracked",
        env!("CARGO_PKG_VERSION"),
        listing.repos.len(),
        listing.drift.missing_locally.len(),
        listing.drift.untracked.len(),
    );

    if listing.repos.is_empty() {
        println!("No repositories tracked.");
    } else {
        let rows: Vec<ListRow> = listing.repos.iter().map(|r| row(r, listing)).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    report::print_drift(&listing.drift);
}

fn row(repo: &TrackedRepository, listing: &Listing) -> ListRow {
    let missing = listing.drift.missing_locally.contains(&repo.name);
    ListRow {
        repo: repo.name.to_string(),
        remotes: describe_remotes(&repo.remotes),
        local: if missing {
            "missing".red().to_string()
        } else {
            "present".green().to_string()
        },
        tracked_since: repo.tracked_at.format("%Y-%m-%d").to_string(),
    }
}

fn describe_remotes(remotes: &[RemoteTarget]) -> String {
    if remotes.is_empty() {
        return "none".to_owned();
    }
    remotes
        .iter()
        .map(|r| format!("{} {r}", r.alias()))
        .collect::<Vec<_>>()
        .join("\n")
}
