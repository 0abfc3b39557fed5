//! `git-backup clone-url <repo> <url>`

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use gitbackup_sync::CancelToken;

use super::{block_on, report, GlobalArgs, HostedArgs};

#[derive(Args, Debug)]
pub struct CloneUrlArgs {
    /// Directory name to clone into under the repositories root.
    pub name: String,

    /// Any URL `git clone` accepts.
    pub url: String,

    #[command(flatten)]
    pub hosted: HostedArgs,
}

impl CloneUrlArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let cancel = CancelToken::new();
        let engine = global.engine(&cancel)?;
        let choice = self.hosted.choice();
        let report = block_on(&cancel, engine.clone_url(&self.name, &self.url, &choice))?
            .with_context(|| format!("clone-url '{}' from {} failed", self.name, self.url))?;
        report::finish(&report, global.json)
    }
}
