//! Process-backed collaborators: `git`, `gh`, `ssh`, `bash`.
//!
//! Every call runs with stdin closed and terminal prompts disabled so a
//! worker never blocks waiting for input.

use std::path::Path;
use std::process::{Command, Stdio};

use gitbackup_core::{RepoName, Visibility};

use super::{
    join_streams, ConfiguredRemote, Hosting, Shell, SshTransport, ToolError, ToolOutput,
    ToolResult, Vcs,
};

/// Run `program args…` in `cwd`, capturing both streams.
pub(crate) fn run(program: &str, args: &[&str], cwd: &Path) -> ToolResult {
    let command = render_command(program, args);
    tracing::debug!(cwd = %cwd.display(), "running {command}");

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GH_PROMPT_DISABLED", "1")
        .output();

    match output {
        Err(e) => Err(ToolError {
            command,
            status: None,
            output: e.to_string(),
        }),
        Ok(out) => {
            let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
            if out.status.success() {
                Ok(ToolOutput { stdout, stderr })
            } else {
                Err(ToolError {
                    command,
                    status: out.status.code(),
                    output: join_streams(&stdout, &stderr),
                })
            }
        }
    }
}

fn render_command(program: &str, args: &[&str]) -> String {
    let mut rendered = program.to_owned();
    for arg in args {
        rendered.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            rendered.push_str(&format!("{arg:?}"));
        } else {
            rendered.push_str(arg);
        }
    }
    rendered
}

/// Quote `s` for a POSIX shell on the remote side of `ssh`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// ---------------------------------------------------------------------------
// git
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl Vcs for GitCli {
    fn is_work_tree(&self, dir: &Path) -> bool {
        matches!(
            run("git", &["rev-parse", "--is-inside-work-tree"], dir),
            Ok(out) if out.stdout.trim() == "true"
        )
    }

    fn fetch_all(&self, dir: &Path) -> ToolResult {
        run("git", &["fetch", "--all"], dir)
    }

    fn status(&self, dir: &Path) -> ToolResult {
        run("git", &["status"], dir)
    }

    fn list_branches(&self, dir: &Path) -> Result<Vec<String>, ToolError> {
        let out = run(
            "git",
            &["for-each-ref", "--format=%(refname:short)", "refs/heads"],
            dir,
        )?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn push(&self, dir: &Path, remote: &str, branch: &str) -> ToolResult {
        run("git", &["push", remote, branch], dir)
    }

    fn push_all(&self, dir: &Path, remote: &str) -> ToolResult {
        run("git", &["push", "--all", remote], dir)
    }

    fn list_remotes(&self, dir: &Path) -> Result<Vec<ConfiguredRemote>, ToolError> {
        let out = run("git", &["remote", "-v"], dir)?;
        Ok(parse_remote_verbose(&out.stdout))
    }

    fn add_remote(&self, dir: &Path, alias: &str, url: &str) -> ToolResult {
        run("git", &["remote", "add", alias, url], dir)
    }

    fn remove_remote(&self, dir: &Path, alias: &str) -> ToolResult {
        run("git", &["remote", "remove", alias], dir)
    }

    fn clone_repo(&self, parent: &Path, url: &str, dest: &str) -> ToolResult {
        run("git", &["clone", url, dest], parent)
    }

    fn probe(&self, dir: &Path, url: &str) -> ToolResult {
        run("git", &["ls-remote", "--heads", url], dir)
    }

    fn init(&self, dir: &Path) -> ToolResult {
        run("git", &["init", "."], dir)
    }

    fn commit_all(&self, dir: &Path, message: &str) -> ToolResult {
        run("git", &["add", "--all", "."], dir)?;
        run("git", &["commit", "-m", message], dir)
    }

    fn pull_ff_only(&self, dir: &Path) -> ToolResult {
        run("git", &["pull", "--ff-only"], dir)
    }
}

/// Parse `git remote -v` output, keeping the fetch URL of each alias.
pub(crate) fn parse_remote_verbose(stdout: &str) -> Vec<ConfiguredRemote> {
    let mut remotes: Vec<ConfiguredRemote> = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        let (Some(alias), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        if remotes.iter().any(|r| r.alias == alias) {
            continue;
        }
        remotes.push(ConfiguredRemote::new(alias, url));
    }
    remotes
}

// ---------------------------------------------------------------------------
// gh
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct GhCli;

impl Hosting for GhCli {
    fn current_owner(&self) -> Result<String, ToolError> {
        let cwd = std::env::temp_dir();
        let out = run("gh", &["api", "user", "--jq", ".login"], &cwd)?;
        let login = out.stdout.trim().to_owned();
        if login.is_empty() {
            return Err(ToolError {
                command: "gh api user --jq .login".into(),
                status: Some(0),
                output: "empty login".into(),
            });
        }
        Ok(login)
    }

    fn exists(&self, owner: &str, repo: &RepoName) -> Result<bool, ToolError> {
        let slug = format!("{owner}/{repo}");
        let cwd = std::env::temp_dir();
        match run("gh", &["repo", "view", &slug, "--json", "name"], &cwd) {
            Ok(_) => Ok(true),
            Err(e) if e.status.is_some() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create(
        &self,
        owner: &str,
        repo: &RepoName,
        visibility: Visibility,
        source: &Path,
    ) -> ToolResult {
        let slug = format!("{owner}/{repo}");
        let flag = format!("--{visibility}");
        run("gh", &["repo", "create", &slug, &flag], source)
    }

    fn clone_repo(&self, parent: &Path, slug: &str, dest: &str) -> ToolResult {
        run("gh", &["repo", "clone", slug, dest], parent)
    }
}

// ---------------------------------------------------------------------------
// ssh
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct SshCli;

impl SshTransport for SshCli {
    fn create_bare(&self, host: &str, remote_path: &str) -> ToolResult {
        let parent = Path::new(remote_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_owned());
        let script = format!(
            "mkdir -p {parent} && mkdir {path} && git init --bare --quiet {path}",
            parent = shell_quote(&parent),
            path = shell_quote(remote_path),
        );
        let cwd = std::env::temp_dir();
        run("ssh", &["-o", "BatchMode=yes", host, &script], &cwd)
    }
}

// ---------------------------------------------------------------------------
// bash
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct BashShell;

impl Shell for BashShell {
    fn run(&self, dir: &Path, command: &str) -> ToolResult {
        run("bash", &["-c", command], dir)
    }
}
