//! git-backup: keep a directory of git repositories mirrored to backup remotes.
//!
//! # Usage
//!
//! ```text
//! git-backup init [--resume] [--no-edit]
//! git-backup fetch | status | push | update | list
//! git-backup create | create-on-remote | reset-remotes | add-remotes <repo>
//! git-backup clone-url <repo> <url>
//! git-backup clone-gh <repo>
//! git-backup foreach <command>
//! ```
//!
//! Global flags: `--repos-dir <dir>` (or `GIT_BACKUP_REPOS_DIR`),
//! `--workers <n>`, `--json`, `-v` / `-vv`.

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    batch::{BatchCommand, ForeachArgs},
    clone::CloneUrlArgs,
    init::InitArgs,
    repo::{RepoArgs, RepoCommand},
    GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "git-backup",
    version,
    about = "Back up a directory of git repositories to SSH hosts and GitHub",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the tracking directory and default config, then set it up as a
    /// tracked repository once the config is ready.
    Init(InitArgs),

    /// Run `git fetch --all` in every tracked repository.
    Fetch,

    /// Run `git status` in every tracked repository.
    Status,

    /// Push every local branch of every tracked repository to its remotes.
    Push,

    /// Pull the tracking repository and report drift.
    Update,

    /// Track a local repository and create it on every backup remote.
    Create(RepoArgs),

    /// Create an already tracked repository on every backup remote.
    CreateOnRemote(RepoArgs),

    /// Replace a repository's remotes with the configured ones.
    ResetRemotes(RepoArgs),

    /// Add the configured remotes a repository is missing.
    AddRemotes(RepoArgs),

    /// Clone a repository from a URL and track it.
    CloneUrl(CloneUrlArgs),

    /// Clone a repository from GitHub and track it.
    CloneGh(RepoArgs),

    /// Run a shell command in every tracked repository.
    Foreach(ForeachArgs),

    /// List tracked repositories, their remotes, and drift.
    List,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let global = cli.global;
    match cli.command {
        Commands::Init(args) => args.run(&global),
        Commands::Fetch => BatchCommand::Fetch.run(&global),
        Commands::Status => BatchCommand::Status.run(&global),
        Commands::Push => BatchCommand::Push.run(&global),
        Commands::Update => BatchCommand::Update.run(&global),
        Commands::Foreach(args) => args.run(&global),
        Commands::Create(args) => args.run(RepoCommand::Create, &global),
        Commands::CreateOnRemote(args) => args.run(RepoCommand::CreateOnRemote, &global),
        Commands::ResetRemotes(args) => args.run(RepoCommand::ResetRemotes, &global),
        Commands::AddRemotes(args) => args.run(RepoCommand::AddRemotes, &global),
        Commands::CloneGh(args) => args.run(RepoCommand::CloneGh, &global),
        Commands::CloneUrl(args) => args.run(&global),
        Commands::List => commands::list::run(&global),
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
