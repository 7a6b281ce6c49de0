//! GitHub clone / archive-fallback fetcher (§4.3).
//!
//! Shells out to the `git` binary the same way the teacher's
//! `connector_git.rs` does (`Command::new("git")`, no `git2` dependency).
//! Two things the teacher's connector doesn't do: a hard wall-clock
//! timeout on the clone (it only ever ran against trusted local config, no
//! timeout was needed) and a zipball-download fallback when the clone
//! times out or fails.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Git,
    Archive,
}

pub struct FetchOutcome {
    pub source: FetchSource,
    pub head_sha: Option<String>,
}

/// Fetch `owner/repo` (optionally at `reference`) into `dest`, which must
/// not yet exist. Tries a shallow clone first; on timeout or failure,
/// falls back to downloading and extracting the GitHub archive.
pub fn fetch(owner_repo: &str, reference: Option<&str>, dest: &Path, clone_timeout: Duration) -> Result<FetchOutcome> {
    std::fs::create_dir_all(dest)?;

    match shallow_clone(owner_repo, reference, dest, clone_timeout) {
        Ok(()) => {
            let head_sha = head_sha(dest).ok();
            Ok(FetchOutcome { source: FetchSource::Git, head_sha })
        }
        Err(clone_err) => {
            clear_dir(dest)?;
            download_archive(owner_repo, reference, dest)
                .with_context(|| format!("git clone failed ({clone_err}), archive fallback also failed"))
        }
    }
}

fn shallow_clone(owner_repo: &str, reference: Option<&str>, dest: &Path, timeout: Duration) -> Result<()> {
    let url = format!("https://github.com/{owner_repo}.git");
    let mut cmd = Command::new("git");
    cmd.args(["clone", "--depth", "1"]);
    if let Some(r) = reference {
        cmd.args(["--branch", r, "--single-branch"]);
    }
    cmd.arg(&url).arg(dest);
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());

    let child = cmd.spawn().context("failed to spawn git clone; is git installed?")?;
    run_with_timeout(child, timeout, "git clone")
}

/// Poll a spawned child until it exits or `timeout` elapses, killing it on
/// timeout. `std::process::Command` has no built-in wait-with-timeout.
fn run_with_timeout(mut child: Child, timeout: Duration, label: &str) -> Result<()> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                return Ok(());
            }
            let mut stderr = String::new();
            if let Some(mut s) = child.stderr.take() {
                use std::io::Read;
                let _ = s.read_to_string(&mut stderr);
            }
            bail!("{label} exited with {status}: {}", stderr.trim());
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            bail!("{label} timed out after {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn head_sha(repo_dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .context("failed to run git rev-parse HEAD")?;
    if !output.status.success() {
        bail!("git rev-parse HEAD failed");
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn download_archive(owner_repo: &str, reference: Option<&str>, dest: &Path) -> Result<FetchOutcome> {
    let refspec = reference.unwrap_or("HEAD");
    let url = format!("https://codeload.github.com/{owner_repo}/zip/{refspec}");

    let bytes = reqwest::blocking::get(&url)
        .with_context(|| format!("failed to download archive {url}"))?
        .error_for_status()
        .with_context(|| format!("archive download returned an error status for {url}"))?
        .bytes()
        .context("failed to read archive body")?;

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut archive = zip::ZipArchive::new(cursor).context("archive is not a valid zip")?;

    // GitHub zipballs wrap everything in a single top-level `<repo>-<sha>/` dir; strip it.
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(raw_path) = entry.enclosed_name() else {
            continue;
        };
        let mut components = raw_path.components();
        components.next();
        let rel: std::path::PathBuf = components.collect();
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = std::fs::File::create(&target)?;
            std::io::copy(&mut entry, &mut out)?;
        }
    }

    Ok(FetchOutcome { source: FetchSource::Archive, head_sha: None })
}

/// `git ls-remote` the repo's HEAD without cloning, for `checkOnly` update
/// queries (§4.9 "Update"). Returns `None` if the remote is unreachable
/// rather than erroring, since a check-only poll should degrade to "unknown"
/// rather than fail the whole bundle status call.
pub fn remote_head(owner_repo: &str, reference: Option<&str>) -> Option<String> {
    let url = format!("https://github.com/{owner_repo}.git");
    let target = reference.unwrap_or("HEAD");
    let output = Command::new("git")
        .args(["ls-remote", &url, target])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .map(|s| s.to_string())
}

fn clear_dir(dest: &Path) -> Result<()> {
    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::create_dir_all(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_with_timeout_kills_slow_process() {
        let child = Command::new("sleep").arg("5").spawn().unwrap();
        let result = run_with_timeout(child, Duration::from_millis(100), "sleep");
        assert!(result.is_err());
    }
}
