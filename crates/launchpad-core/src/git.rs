use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::config::GitConfig;
use crate::error::{LaunchpadError, Result};

// ---------------------------------------------------------------------------
// git binary resolution
// ---------------------------------------------------------------------------

fn git_bin() -> Result<PathBuf> {
    which::which("git").map_err(|_| LaunchpadError::GitPush("git is not installed".to_string()))
}

// ---------------------------------------------------------------------------
// Initial push
// ---------------------------------------------------------------------------

/// Commits everything under `workdir` as a single initial commit and pushes it
/// to `remote_url` on the configured default branch.
///
/// The token is handed to git through `GIT_CONFIG_*` environment variables as
/// an `http.extraHeader`, so it never appears in argv, in the remote URL, or in
/// `.git/config`.
pub async fn push_initial(
    cfg: &GitConfig,
    workdir: &Path,
    remote_url: &str,
    token: &str,
) -> Result<()> {
    let git = git_bin()?;

    run(
        &git,
        workdir,
        &["init", "--initial-branch", &cfg.default_branch],
        None,
    )
    .await?;
    run(&git, workdir, &["add", "--all"], None).await?;
    run(
        &git,
        workdir,
        &[
            "-c",
            &format!("user.name={}", cfg.author_name),
            "-c",
            &format!("user.email={}", cfg.author_email),
            "commit",
            "--quiet",
            "--allow-empty",
            "-m",
            "Initial commit from launchpad",
        ],
        None,
    )
    .await?;

    let refspec = format!("HEAD:refs/heads/{}", cfg.default_branch);
    run(
        &git,
        workdir,
        &["push", "--quiet", remote_url, &refspec],
        Some(token),
    )
    .await?;

    debug!(remote = remote_url, branch = %cfg.default_branch, "initial content pushed");
    Ok(())
}

fn auth_header(token: &str) -> String {
    let basic = STANDARD.encode(format!("x-access-token:{token}"));
    format!("Authorization: Basic {basic}")
}

async fn run(git: &Path, workdir: &Path, args: &[&str], token: Option<&str>) -> Result<()> {
    let mut cmd = Command::new(git);
    cmd.args(args)
        .current_dir(workdir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(token) = token {
        cmd.env("GIT_CONFIG_COUNT", "1")
            .env("GIT_CONFIG_KEY_0", "http.extraHeader")
            .env("GIT_CONFIG_VALUE_0", auth_header(token));
    }

    let output = cmd.output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = match token {
            Some(token) => stderr.replace(token, "***"),
            None => stderr.into_owned(),
        };
        let verb = args
            .iter()
            .find(|a| !a.starts_with('-') && !a.contains('='))
            .copied()
            .unwrap_or("git");
        return Err(LaunchpadError::GitPush(format!(
            "git {verb}: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
