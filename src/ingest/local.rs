//! Local-directory and docs-repo fetchers (§4.3).
//!
//! Grounded on the teacher's `connector_fs.rs` walk-and-copy pattern
//! (`WalkDir` + relative-path stripping), generalized from "produce
//! `SourceItem`s" to "copy bytes into `raw/<id>/`".

use crate::ingest::classify::is_ignored;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Copy `src` into `raw/<id>/`, skipping default-ignored directories.
/// Returns the list of copied files as (repo-relative path, bytes).
pub fn copy_local(src: &Path, raw_dest: &Path) -> Result<Vec<(PathBuf, u64)>> {
    let mut copied = Vec::new();
    for entry in WalkDir::new(src) {
        let entry = entry.context("failed to walk local source directory")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        if is_ignored(rel) {
            continue;
        }
        let target = raw_dest.join(rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &target)
            .with_context(|| format!("failed to copy {}", entry.path().display()))?;
        let bytes = std::fs::metadata(&target)?.len();
        copied.push((rel.to_path_buf(), bytes));
    }
    copied.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(copied)
}

/// Stable signature for a docs-repo file: a hash of path + mtime + size,
/// so re-supplying the identical document upserts idempotently (§4.3).
pub fn docs_signature(path: &Path) -> Result<String> {
    let meta = std::fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(mtime.to_le_bytes());
    hasher.update(meta.len().to_le_bytes());
    Ok(format!("{:x}", hasher.finalize())[..16].to_string())
}

/// Place a user-supplied document under `raw/<signature>/<original-name>`
/// (synthetic repo id `assistant/docs`).
pub fn upsert_doc(path: &Path, raw_dest: &Path) -> Result<PathBuf> {
    let signature = docs_signature(path)?;
    let file_name = path
        .file_name()
        .context("document path has no file name")?;
    let rel = PathBuf::from(&signature).join(file_name);
    let target = raw_dest.join(&rel);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(path, &target)
        .with_context(|| format!("failed to copy document {}", path.display()))?;
    Ok(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copies_files_and_skips_ignored_dirs() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("keep.md"), "hi").unwrap();
        std::fs::create_dir_all(src.path().join("node_modules")).unwrap();
        std::fs::write(src.path().join("node_modules/skip.js"), "x").unwrap();

        let dest = tempdir().unwrap();
        let copied = copy_local(src.path(), dest.path()).unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].0, PathBuf::from("keep.md"));
        assert!(dest.path().join("keep.md").is_file());
        assert!(!dest.path().join("node_modules").exists());
    }

    #[test]
    fn docs_signature_is_stable_for_same_file() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("notes.txt");
        std::fs::write(&doc, "content").unwrap();
        let a = docs_signature(&doc).unwrap();
        let b = docs_signature(&doc).unwrap();
        assert_eq!(a, b);
    }
}
