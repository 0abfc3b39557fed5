//! Per-repository and per-unit outcomes of a batch command.
//!
//! A *unit* is one addressable piece of work inside a repository: a fetch, a
//! (branch, remote) push, a remote addition, a creation on one host, etc.
//! A repository's outcome is derived from its units; a batch is the ordered
//! list of repository reports.

use std::fmt;

use serde::Serialize;

use gitbackup_core::{DriftReport, RepoName};

use crate::tools::{ToolError, ToolOutput};

/// Reason recorded for work not started because the batch was cancelled.
pub const CANCELLED: &str = "cancelled";

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    Success { output: String },
    Failure { status: Option<i32>, output: String },
    Skipped { reason: String },
}

impl Outcome {
    pub fn success(output: impl Into<String>) -> Self {
        Outcome::Success {
            output: output.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::skipped(CANCELLED)
    }

    pub fn failure(err: &ToolError) -> Self {
        Outcome::Failure {
            status: err.status,
            output: err.to_string(),
        }
    }

    pub fn from_tool(result: &Result<ToolOutput, ToolError>) -> Self {
        match result {
            Ok(out) => Self::success(out.text()),
            Err(e) => Self::failure(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Skipped { reason } if reason == CANCELLED)
    }

    /// Captured output or skip reason.
    pub fn text(&self) -> &str {
        match self {
            Outcome::Success { output } | Outcome::Failure { output, .. } => output,
            Outcome::Skipped { reason } => reason,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "ok",
            Outcome::Failure { .. } => "failed",
            Outcome::Skipped { .. } => "skipped",
        }
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// One addressable piece of work inside a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum Unit {
    Fetch,
    Status,
    Foreach { command: String },
    ListBranches,
    ListRemotes,
    Push { branch: String, remote: String },
    RemoveRemote { alias: String },
    AddRemote { alias: String, url: String },
    CreateHosted { owner: String },
    CreateSsh { host: String },
    InitialPush { remote: String },
    Clone { source: String },
    Pull,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Fetch => write!(f, "fetch"),
            Unit::Status => write!(f, "status"),
            Unit::Foreach { command } => write!(f, "run `{command}`"),
            Unit::ListBranches => write!(f, "list branches"),
            Unit::ListRemotes => write!(f, "list remotes"),
            Unit::Push { branch, remote } => write!(f, "push {branch} -> {remote}"),
            Unit::RemoveRemote { alias } => write!(f, "remove remote {alias}"),
            Unit::AddRemote { alias, url } => write!(f, "add remote {alias} ({url})"),
            Unit::CreateHosted { owner } => write!(f, "create on hosted service as {owner}"),
            Unit::CreateSsh { host } => write!(f, "create bare repository on {host}"),
            Unit::InitialPush { remote } => write!(f, "initial push to {remote}"),
            Unit::Clone { source } => write!(f, "clone {source}"),
            Unit::Pull => write!(f, "pull"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    #[serde(flatten)]
    pub unit: Unit,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl UnitReport {
    pub fn new(unit: Unit, outcome: Outcome) -> Self {
        Self { unit, outcome }
    }
}

// ---------------------------------------------------------------------------
// Repository report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoReport {
    pub repo: RepoName,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<UnitReport>,
}

impl RepoReport {
    pub fn skipped(repo: RepoName, reason: impl Into<String>) -> Self {
        Self {
            repo,
            outcome: Outcome::skipped(reason),
            units: Vec::new(),
        }
    }

    /// Derive the repository outcome from its units.
    ///
    /// A single unit passes its outcome through. Otherwise any failed unit
    /// makes the repository a failure listing every failed unit; a
    /// cancelled unit (with no failure) makes it skipped; else success.
    pub fn from_units(repo: RepoName, units: Vec<UnitReport>) -> Self {
        let outcome = match units.as_slice() {
            [] => Outcome::success(""),
            [only] => only.outcome.clone(),
            _ => summarise(&units),
        };
        Self {
            repo,
            outcome,
            units,
        }
    }

    pub fn failed_units(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| u.outcome.is_failure())
    }

    /// `(branch, remote)` pairs whose push failed.
    pub fn failed_pushes(&self) -> Vec<(&str, &str)> {
        self.failed_units()
            .filter_map(|u| match &u.unit {
                Unit::Push { branch, remote } => Some((branch.as_str(), remote.as_str())),
                _ => None,
            })
            .collect()
    }
}

fn summarise(units: &[UnitReport]) -> Outcome {
    let failed: Vec<&UnitReport> = units.iter().filter(|u| u.outcome.is_failure()).collect();
    if let Some(first) = failed.first() {
        let status = match &first.outcome {
            Outcome::Failure { status, .. } => *status,
            _ => None,
        };
        let output = failed
            .iter()
            .map(|u| format!("{}: {}", u.unit, u.outcome.text()))
            .collect::<Vec<_>>()
            .join("\n");
        return Outcome::Failure { status, output };
    }
    if units.iter().any(|u| u.outcome.is_cancelled()) {
        return Outcome::cancelled();
    }
    let done = units.iter().filter(|u| u.outcome.is_success()).count();
    Outcome::success(format!("{done} of {} steps done", units.len()))
}

// ---------------------------------------------------------------------------
// Batch report
// ---------------------------------------------------------------------------

/// Everything a command produced, in repository order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftReport>,
    pub repos: Vec<RepoReport>,
    pub cancelled: bool,
    /// Result of committing the tracking directory; failure is only a warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_commit: Option<Outcome>,
}

impl BatchReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// True iff no repository failed.
    pub fn is_success(&self) -> bool {
        !self.repos.iter().any(|r| r.outcome.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RepoReport> {
        self.repos.iter().filter(|r| r.outcome.is_failure())
    }

    /// `(succeeded, failed, skipped)` counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        self.repos
            .iter()
            .fold((0, 0, 0), |(ok, failed, skipped), r| match r.outcome {
                Outcome::Success { .. } => (ok + 1, failed, skipped),
                Outcome::Failure { .. } => (ok, failed + 1, skipped),
                Outcome::Skipped { .. } => (ok, failed, skipped + 1),
            })
    }
}
