//! Manifest & Fingerprint (MF) — §4.2.
//!
//! Fingerprint is SHA-256 over the canonicalized input set. No teacher
//! module computes a content fingerprint this way, but `sha2` is already a
//! teacher dependency (used for chunk hashing in `chunk.rs` and cache-key
//! hashing in `connector_git.rs`), so the hashing idiom carries over
//! directly.

use crate::models::{NormalizedInputs, NormalizedRepoInput};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

/// Raw create-bundle input, before canonicalization.
#[derive(Debug, Clone)]
pub struct RepoInput {
    pub kind: String,
    /// A GitHub URL, `owner/repo` shorthand, or local path.
    pub repo: String,
    pub reference: Option<String>,
}

/// Reduce a GitHub URL/shorthand to lowercased `owner/repo`. Equivalent
/// spellings (`https://github.com/Owner/Repo`, `git@github.com:owner/repo.git`,
/// `owner/repo`) must all reduce to the same string (tested, per §4.2).
pub fn normalize_github_id(raw: &str) -> String {
    let mut s = raw.trim();
    for prefix in ["https://github.com/", "http://github.com/", "git@github.com:"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
            break;
        }
    }
    let s = s.trim_end_matches(".git").trim_end_matches('/');
    s.to_lowercase()
}

/// Canonicalize a raw input set: repos sorted by normalized id, GitHub URLs
/// reduced to `owner/repo`, library/topic lists sorted and lower-cased.
pub fn canonicalize(repos: &[RepoInput], libraries: &[String], topics: &[String]) -> NormalizedInputs {
    let mut norm_repos: Vec<NormalizedRepoInput> = repos
        .iter()
        .map(|r| {
            let id = if r.kind == "github" {
                normalize_github_id(&r.repo)
            } else {
                r.repo.to_lowercase()
            };
            NormalizedRepoInput {
                kind: r.kind.to_lowercase(),
                id,
                reference: r.reference.clone(),
            }
        })
        .collect();
    norm_repos.sort();
    norm_repos.dedup();

    let mut libs: Vec<String> = libraries.iter().map(|s| s.to_lowercase()).collect();
    libs.sort();
    libs.dedup();

    let mut tops: Vec<String> = topics.iter().map(|s| s.to_lowercase()).collect();
    tops.sort();
    tops.dedup();

    NormalizedInputs {
        repos: norm_repos,
        libraries: libs,
        topics: tops,
    }
}

/// SHA-256 over the canonical-JSON form of `inputs`. Deterministic by
/// construction since `to_canonical_json` sorts object keys and `inputs`
/// is already sorted element-wise.
pub fn fingerprint(inputs: &NormalizedInputs) -> String {
    let canonical = crate::models::to_canonical_json(inputs).expect("NormalizedInputs always serializes");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

const DEDUP_INDEX_FILE: &str = ".preflight-dedup-index.json";

/// Process-local de-duplication index: `fingerprint -> bundleId`. Best
/// effort; its source of truth is the set of on-disk manifests, so a
/// missing or unparsable index is silently rebuilt by scanning.
pub struct DedupIndex {
    path: std::path::PathBuf,
    map: HashMap<String, String>,
}

impl DedupIndex {
    pub fn load_or_rebuild(root: &Path, storage: &crate::storage::Storage) -> Self {
        let path = root.join(DEDUP_INDEX_FILE);
        let map = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<HashMap<String, String>>(&s).ok())
            .unwrap_or_else(|| rebuild_from_manifests(storage));
        Self { path, map }
    }

    pub fn get(&self, fingerprint: &str) -> Option<&String> {
        self.map.get(fingerprint)
    }

    pub fn insert(&mut self, fingerprint: String, bundle_id: String) -> Result<()> {
        self.map.insert(fingerprint, bundle_id);
        self.flush()
    }

    pub fn remove_by_bundle_id(&mut self, bundle_id: &str) -> Result<()> {
        self.map.retain(|_, v| v != bundle_id);
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json).with_context(|| format!("failed to write {}", self.path.display()))
    }
}

fn rebuild_from_manifests(storage: &crate::storage::Storage) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for bundle_id in storage.list_bundle_ids() {
        if let Some(root) = storage.resolve_bundle_root(&bundle_id) {
            if let Ok(contents) = std::fs::read_to_string(root.join("manifest.json")) {
                if let Ok(manifest) = serde_json::from_str::<crate::models::Manifest>(&contents) {
                    map.insert(manifest.fingerprint, manifest.bundle_id);
                }
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_github_spellings_normalize_equal() {
        assert_eq!(normalize_github_id("octocat/Hello-World"), "octocat/hello-world");
        assert_eq!(
            normalize_github_id("https://github.com/octocat/Hello-World"),
            "octocat/hello-world"
        );
        assert_eq!(
            normalize_github_id("https://github.com/octocat/Hello-World.git"),
            "octocat/hello-world"
        );
        assert_eq!(
            normalize_github_id("git@github.com:octocat/Hello-World.git"),
            "octocat/hello-world"
        );
    }

    #[test]
    fn fingerprint_is_deterministic_across_equivalent_inputs() {
        let a = vec![RepoInput {
            kind: "github".into(),
            repo: "octocat/Hello-World".into(),
            reference: None,
        }];
        let b = vec![RepoInput {
            kind: "github".into(),
            repo: "https://github.com/octocat/Hello-World".into(),
            reference: None,
        }];
        let fa = fingerprint(&canonicalize(&a, &[], &[]));
        let fb = fingerprint(&canonicalize(&b, &[], &[]));
        assert_eq!(fa, fb);
    }

    #[test]
    fn fingerprint_changes_with_reference() {
        let a = canonicalize(
            &[RepoInput { kind: "github".into(), repo: "a/b".into(), reference: None }],
            &[],
            &[],
        );
        let b = canonicalize(
            &[RepoInput { kind: "github".into(), repo: "a/b".into(), reference: Some("v2".into()) }],
            &[],
            &[],
        );
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
