//! Subcommand implementations and the plumbing they share.

pub mod batch;
pub mod clone;
pub mod init;
pub mod list;
pub mod repo;
pub mod report;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use gitbackup_core::Layout;
use gitbackup_sync::{CancelToken, Engine, HostedChoice, Toolkit};

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Repositories root. Defaults to ~/repos.
    #[arg(long, env = "GIT_BACKUP_REPOS_DIR", value_name = "DIR", global = true)]
    pub repos_dir: Option<PathBuf>,

    /// Repositories processed in parallel. Overrides `workers` in config.yaml.
    #[arg(long, value_name = "N", global = true)]
    pub workers: Option<usize>,

    /// Emit machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

impl GlobalArgs {
    pub fn layout(&self) -> Result<Layout> {
        match &self.repos_dir {
            Some(dir) => Ok(Layout::at(dir)),
            None => Layout::from_home().context("could not determine home directory"),
        }
    }

    /// Load config for the chosen root and wire the system tools.
    pub fn engine(&self, cancel: &CancelToken) -> Result<Engine> {
        let layout = self.layout()?;
        let root = layout.repos_root().display().to_string();
        let engine = Engine::load(layout, Toolkit::system())
            .with_context(|| format!("failed to load git-backup config under {root}"))?;
        Ok(engine.with_workers(self.workers).with_cancel(cancel.clone()))
    }
}

/// `--gh`, `--no-gh` and `--owner` for commands that resolve remotes.
#[derive(Args, Debug, Clone, Default)]
pub struct HostedArgs {
    /// Include the GitHub remote even if config.yaml disables it.
    #[arg(long, conflicts_with = "no_gh")]
    pub gh: bool,

    /// Leave out the GitHub remote even if config.yaml enables it.
    #[arg(long)]
    pub no_gh: bool,

    /// GitHub owner (user or organisation). Overrides `gh_owner`.
    #[arg(long, value_name = "OWNER")]
    pub owner: Option<String>,
}

impl HostedArgs {
    pub fn choice(&self) -> HostedChoice {
        let enabled = match (self.gh, self.no_gh) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        HostedChoice {
            enabled,
            owner: self.owner.clone(),
        }
    }
}

/// Exit status after a second Ctrl-C (128 + SIGINT).
const INTERRUPTED: i32 = 130;

/// Drive `fut` to completion on a multi-thread runtime.
///
/// The first Ctrl-C cancels `cancel`: queued repositories are skipped and
/// in-flight ones stop before their next external call. A second Ctrl-C
/// exits the process straight away.
pub fn block_on<F: Future>(cancel: &CancelToken, fut: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    let cancel = cancel.clone();
    Ok(runtime.block_on(async move {
        let signal = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if on_interrupt(&cancel) {
                    std::process::exit(INTERRUPTED);
                }
            }
        });
        let output = fut.await;
        signal.abort();
        output
    }))
}

/// Handle one Ctrl-C. Returns true when the process should exit now.
fn on_interrupt(cancel: &CancelToken) -> bool {
    if cancel.is_cancelled() {
        tracing::warn!("received second ctrl-c, exiting");
        return true;
    }
    tracing::warn!("received ctrl-c, finishing in-flight work (press again to exit)");
    cancel.cancel();
    false
}
