//! Ingestion & Normalization Pipeline (IP) — §4.3.
//!
//! Fetches every requested repo into `<wip>/repos/<id>/raw/`, normalizes
//! each file into `<wip>/repos/<id>/norm/`, and classifies it doc/code/asset.
//! CPU-bound normalization is parallelized over a worker pool sized to
//! available cores (§5 "Scheduling model"); fetch failures are per-repo and
//! recorded as notes rather than aborting the whole ingest (§4.9 "Failure
//! semantics").

pub mod classify;
pub mod github;
pub mod local;
pub mod normalize;

use crate::config::{LimitsConfig, ParserConfig, TimeoutsConfig};
use crate::fingerprint::RepoInput;
use crate::models::{IngestedFile, RepoEntry, RepoKind, RepoSource};
use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::sync::mpsc;
use tracing::warn;

pub struct IngestReport {
    pub repos: Vec<RepoEntry>,
    pub files: Vec<IngestedFile>,
    pub notes: Vec<String>,
}

/// Run the full ingest for one bundle transaction. `wip_root` is the
/// `bundles-wip/<id>` directory; repos land under `wip_root/repos/<id>/`.
pub fn run_ingest(
    wip_root: &Path,
    repos: &[RepoInput],
    limits: &LimitsConfig,
    timeouts: &TimeoutsConfig,
    parser_cfg: &ParserConfig,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        repos: Vec::new(),
        files: Vec::new(),
        notes: Vec::new(),
    };
    let mut total_bytes: u64 = 0;

    for repo in repos {
        let repo_id = match repo.kind.as_str() {
            "github" => crate::fingerprint::normalize_github_id(&repo.repo),
            _ => repo.repo.clone(),
        };
        // `sanitize_repo_id` flattens slashes so a github "owner/repo" id or
        // an absolute local path can't walk `wip_root` via `Path::join`'s
        // absolute-path semantics; `bundle_norm_relative_path` below uses
        // the same sanitized form so recorded paths match what's on disk.
        let repo_dir = wip_root.join("repos").join(sanitize_repo_id(&repo_id));
        let raw_dir = repo_dir.join("raw");
        let norm_dir = repo_dir.join("norm");
        std::fs::create_dir_all(&raw_dir)?;

        let fetch_result = match repo.kind.as_str() {
            "github" => fetch_github_entry(&repo_id, repo.reference.as_deref(), &raw_dir, timeouts),
            "local" => fetch_local_entry(&repo.repo, &raw_dir),
            "docs" => fetch_docs_entry(&repo.repo, &raw_dir),
            other => Err(anyhow::anyhow!("unknown repo kind: {other}")),
        };

        let (kind, source, head_sha) = match fetch_result {
            Ok(outcome) => outcome,
            Err(e) => {
                let note = format!("repo '{repo_id}' failed to fetch: {e}");
                warn!(repo = %repo_id, error = %e, "ingest fetch failed");
                report.notes.push(note.clone());
                report.repos.push(RepoEntry {
                    kind: repo_kind_for(&repo.kind),
                    id: repo_id,
                    source: RepoSource::Local,
                    head_sha: None,
                    fetched_at: Utc::now(),
                    notes: vec![note],
                });
                continue;
            }
        };

        let normalized = normalize_tree(&raw_dir, &norm_dir, &repo_id, limits, timeouts, parser_cfg, &mut total_bytes, &mut report.notes)?;
        report.files.extend(normalized);

        report.repos.push(RepoEntry {
            kind,
            id: repo_id,
            source,
            head_sha,
            fetched_at: Utc::now(),
            notes: Vec::new(),
        });
    }

    Ok(report)
}

fn repo_kind_for(kind: &str) -> RepoKind {
    match kind {
        "github" => RepoKind::Github,
        "docs" => RepoKind::Docs,
        _ => RepoKind::Local,
    }
}

fn fetch_github_entry(
    repo_id: &str,
    reference: Option<&str>,
    raw_dir: &Path,
    timeouts: &TimeoutsConfig,
) -> Result<(RepoKind, RepoSource, Option<String>)> {
    let outcome = github::fetch(repo_id, reference, raw_dir, timeouts.git_clone())?;
    let source = match outcome.source {
        github::FetchSource::Git => RepoSource::Git,
        github::FetchSource::Archive => RepoSource::Archive,
    };
    Ok((RepoKind::Github, source, outcome.head_sha))
}

fn fetch_local_entry(path: &str, raw_dir: &Path) -> Result<(RepoKind, RepoSource, Option<String>)> {
    local::copy_local(Path::new(path), raw_dir)?;
    Ok((RepoKind::Local, RepoSource::Local, None))
}

fn fetch_docs_entry(path: &str, raw_dir: &Path) -> Result<(RepoKind, RepoSource, Option<String>)> {
    local::upsert_doc(Path::new(path), raw_dir)?;
    Ok((RepoKind::Docs, RepoSource::Local, None))
}

/// Walk `raw_dir`, normalizing every file into `norm_dir`. Normalization is
/// parallelized across a worker pool sized to available cores; a channel
/// collects `IngestedFile` records (or skip notes) as workers finish.
#[allow(clippy::too_many_arguments)]
fn normalize_tree(
    raw_dir: &Path,
    norm_dir: &Path,
    repo_id: &str,
    limits: &LimitsConfig,
    timeouts: &TimeoutsConfig,
    parser_cfg: &ParserConfig,
    total_bytes: &mut u64,
    notes: &mut Vec<String>,
) -> Result<Vec<IngestedFile>> {
    let entries: Vec<std::path::PathBuf> = walkdir::WalkDir::new(raw_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();

    let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let (tx, rx) = mpsc::channel();
    let chunks: Vec<Vec<std::path::PathBuf>> = chunk_evenly(entries, workers);

    std::thread::scope(|scope| {
        for chunk in chunks {
            let tx = tx.clone();
            let raw_dir = raw_dir.to_path_buf();
            let norm_dir = norm_dir.to_path_buf();
            let repo_id = repo_id.to_string();
            let max_file_bytes = limits.max_file_bytes;
            scope.spawn(move || {
                for raw_path in chunk {
                    let rel = raw_path.strip_prefix(&raw_dir).unwrap_or(&raw_path).to_path_buf();
                    let norm_path = norm_dir.join(&rel);
                    let outcome = normalize::normalize_file(&raw_path, &norm_path, max_file_bytes, parser_cfg, timeouts);
                    let _ = tx.send((repo_id.clone(), rel, outcome));
                }
            });
        }
    });
    drop(tx);

    let mut files = Vec::new();
    for (repo_id, rel, outcome) in rx {
        match outcome {
            Ok(Some(o)) => {
                *total_bytes += o.bytes;
                if *total_bytes > limits.max_total_bytes {
                    notes.push(format!("repo '{repo_id}' exceeded maxTotalBytes; remaining files skipped"));
                    continue;
                }
                let repo_relative_path = rel.to_string_lossy().to_string();
                for warning in &o.warnings {
                    notes.push(format!("repo '{repo_id}' file '{repo_relative_path}': {warning}"));
                }
                files.push(IngestedFile {
                    repo_id: repo_id.clone(),
                    kind: classify::classify(&rel),
                    repo_relative_path: repo_relative_path.clone(),
                    bundle_norm_relative_path: format!("repos/{}/norm/{repo_relative_path}", sanitize_repo_id(&repo_id)),
                    sha256: o.sha256,
                    bytes: o.bytes,
                });
            }
            Ok(None) => {
                notes.push(format!("repo '{repo_id}' file '{}' exceeds maxFileBytes; skipped", rel.display()));
            }
            Err(e) => {
                notes.push(format!("repo '{repo_id}' file '{}' failed to normalize: {e}", rel.display()));
            }
        }
    }
    files.sort_by(|a, b| a.repo_relative_path.cmp(&b.repo_relative_path));
    Ok(files)
}

fn chunk_evenly<T>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    if items.is_empty() || n == 0 {
        return vec![items];
    }
    let size = items.len().div_ceil(n).max(1);
    items
        .into_iter()
        .fold(Vec::new(), |mut acc: Vec<Vec<T>>, item| {
            if acc.last().map(|c| c.len() >= size).unwrap_or(true) {
                acc.push(Vec::new());
            }
            acc.last_mut().unwrap().push(item);
            acc
        })
}

/// Flattens slashes in a repo id so it can be used as a single path segment
/// under `repos/`, matching the layout every path-building site (chunking,
/// FTS/evidence pointers, the dependency graph, repair reconstruction, and
/// the call-graph/interface-summary tools) expects.
pub fn sanitize_repo_id(id: &str) -> String {
    id.replace('/', "__")
}

