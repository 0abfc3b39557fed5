//! `git-backup init [--resume] [--no-edit]`
//!
//! Two stages. The first writes the tracking directory and a default
//! `config.yaml` and opens it in `$EDITOR`. Once the user sets
//! `config_is_ready: true`, the second stage (run straight away, or later
//! with `--resume`) turns the tracking directory into a tracked git
//! repository and creates it on every backup remote.

use std::path::Path;
use std::process::{Command, ExitCode};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use gitbackup_core::store;
use gitbackup_sync::{CancelToken, SyncError};

use super::{block_on, report, GlobalArgs, HostedArgs};

const DEFAULT_EDITOR: &str = "vim";

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Continue after editing config.yaml; the config must be ready.
    #[arg(long)]
    pub resume: bool,

    /// Do not open config.yaml in $EDITOR.
    #[arg(long)]
    pub no_edit: bool,

    #[command(flatten)]
    pub hosted: HostedArgs,
}

impl InitArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let layout = global.layout()?;
        store::init_at(&layout, self.resume).with_context(|| {
            format!(
                "failed to initialise tracking directory under {}",
                layout.repos_root().display()
            )
        })?;
        let config_path = layout.config_path();

        if !self.resume {
            println!("✓ Wrote default config to {}", config_path.display());
            if !self.no_edit {
                edit(&config_path)?;
            }
        }

        let cancel = CancelToken::new();
        let engine = global.engine(&cancel)?;
        match block_on(&cancel, engine.finish_init(&self.hosted.choice()))? {
            Ok(report) => {
                if !global.json {
                    println!(
                        "✓ Tracking repository ready at {}",
                        layout.tracking_dir().display()
                    );
                }
                report::finish(&report, global.json)
            }
            Err(SyncError::ConfigNotReady { path }) if !self.resume => {
                println!(
                    "{} {} is not marked ready.",
                    "note:".cyan().bold(),
                    path.display()
                );
                println!("  Set `config_is_ready: true`, then run 'git-backup init --resume'.");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => Err(e).context("init failed"),
        }
    }
}

/// Open `path` in `$EDITOR` (default vim) and wait for it to exit.
fn edit(path: &Path) -> Result<()> {
    let editor = std::env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_owned());
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("EDITOR is empty");
    };

    tracing::debug!(editor = %editor, path = %path.display(), "opening config");
    let status = Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .with_context(|| format!("failed to launch editor '{editor}'"))?;
    if !status.success() {
        bail!("editor '{editor}' exited with {status}");
    }
    Ok(())
}
