//! `git-backup fetch | status | push | update | foreach <command>`

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use gitbackup_sync::CancelToken;

use super::{block_on, report, GlobalArgs};

/// Batch commands over every tracked repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchCommand {
    Fetch,
    Status,
    Push,
    Update,
}

impl BatchCommand {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let cancel = CancelToken::new();
        let engine = global.engine(&cancel)?;
        let result = block_on(&cancel, async {
            match self {
                BatchCommand::Fetch => engine.fetch().await,
                BatchCommand::Status => engine.status().await,
                BatchCommand::Push => engine.push().await,
                BatchCommand::Update => engine.update().await,
            }
        })?;
        let report = result.with_context(|| format!("{} failed", self.name()))?;
        report::finish(&report, global.json)
    }

    fn name(self) -> &'static str {
        match self {
            BatchCommand::Fetch => "fetch",
            BatchCommand::Status => "status",
            BatchCommand::Push => "push",
            BatchCommand::Update => "update",
        }
    }
}

#[derive(Args, Debug)]
pub struct ForeachArgs {
    /// Shell command run with `bash -c` inside each repository.
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl ForeachArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let command = self.command.join(" ");
        let cancel = CancelToken::new();
        let engine = global.engine(&cancel)?;
        let report = block_on(&cancel, engine.foreach(&command))?
            .with_context(|| format!("foreach `{command}` failed"))?;
        report::finish(&report, global.json)
    }
}
