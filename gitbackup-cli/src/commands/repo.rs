//! Single-repository commands: `create`, `create-on-remote`, `reset-remotes`,
//! `add-remotes` and `clone-gh`.

use std::fmt;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use gitbackup_sync::CancelToken;

use super::{block_on, report, GlobalArgs, HostedArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoCommand {
    Create,
    CreateOnRemote,
    ResetRemotes,
    AddRemotes,
    CloneGh,
}

impl fmt::Display for RepoCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepoCommand::Create => "create",
            RepoCommand::CreateOnRemote => "create-on-remote",
            RepoCommand::ResetRemotes => "reset-remotes",
            RepoCommand::AddRemotes => "add-remotes",
            RepoCommand::CloneGh => "clone-gh",
        })
    }
}

#[derive(Args, Debug)]
pub struct RepoArgs {
    /// Repository directory name under the repositories root.
    pub name: String,

    #[command(flatten)]
    pub hosted: HostedArgs,
}

impl RepoArgs {
    pub fn run(self, command: RepoCommand, global: &GlobalArgs) -> Result<ExitCode> {
        let cancel = CancelToken::new();
        let engine = global.engine(&cancel)?;
        let choice = self.hosted.choice();
        let name = self.name.as_str();

        let result = block_on(&cancel, async {
            match command {
                RepoCommand::Create => engine.create(name, &choice).await,
                RepoCommand::CreateOnRemote => engine.create_on_remote(name, &choice).await,
                RepoCommand::ResetRemotes => engine.reset_remotes(name, &choice).await,
                RepoCommand::AddRemotes => engine.add_remotes(name, &choice).await,
                RepoCommand::CloneGh => engine.clone_hosted(name, &choice).await,
            }
        })?;
        let report = result.with_context(|| format!("{command} '{name}' failed"))?;
        report::finish(&report, global.json)
    }
}
