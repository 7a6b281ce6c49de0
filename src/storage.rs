//! Storage Layer (SL) — §4.1.
//!
//! Multi-root mirrored bundle storage. Reads use the first root where a
//! bundle exists; writes mirror to every reachable root. No teacher module
//! covers this (the retained crate is single-database, single-root), so it
//! is built fresh, in the style `connector_fs.rs`/`ingest.rs` already use:
//! `anyhow` propagation, `walkdir` for recursive copy, explicit path joins.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

pub const WIP_DIR: &str = "bundles-wip";
pub const DELETING_PREFIX: &str = ".deleting.";

#[derive(Clone)]
pub struct Storage {
    pub roots: Vec<PathBuf>,
}

impl Storage {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// `resolveBundleRoot(bundleId) -> (root, paths) | not_found` — linear
    /// scan across mirror roots; the bundle is usable at a root iff that
    /// root contains a `manifest.json` (I1).
    pub fn resolve_bundle_root(&self, bundle_id: &str) -> Option<PathBuf> {
        for root in &self.roots {
            let candidate = root.join(bundle_id);
            if candidate.join("manifest.json").is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// List bundle ids visible across all roots (de-duplicated, first-root
    /// wins for ordering).
    pub fn list_bundle_ids(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        for root in &self.roots {
            let Ok(entries) = std::fs::read_dir(root) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name == WIP_DIR || name.starts_with(DELETING_PREFIX) {
                    continue;
                }
                if entry.path().join("manifest.json").is_file() {
                    seen.insert(name);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// `safeJoin(root, rel) -> abs` — rejects `..` traversal, absolute
    /// paths, and UNC prefixes. Every returned path is a syntactic
    /// descendant of `root` by construction (no filesystem access here,
    /// so it works for paths that don't exist yet).
    pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf> {
        let rel_path = Path::new(rel);
        if rel_path.is_absolute() {
            bail!("invalid_path: absolute path not allowed: {rel}");
        }
        let mut out = root.to_path_buf();
        for component in rel_path.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                Component::ParentDir => bail!("invalid_path: '..' traversal not allowed: {rel}"),
                Component::RootDir | Component::Prefix(_) => {
                    bail!("invalid_path: absolute or UNC path not allowed: {rel}")
                }
            }
        }
        Ok(out)
    }

    /// Allocate a fresh working directory under `<tmp_dir>/bundles-wip/<uuid>`.
    pub fn allocate_wip(&self, tmp_dir: &Path) -> Result<(PathBuf, String)> {
        let id = Uuid::new_v4().to_string();
        let dir = tmp_dir.join(WIP_DIR).join(&id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create wip directory: {}", dir.display()))?;
        Ok((dir, id))
    }

    /// `atomicCommit(wipDir, finalDir)` — rename, falling back to
    /// recursive copy-then-delete across devices (I2). On any error the
    /// wip directory is removed so no partial state survives.
    pub fn atomic_commit(&self, wip_dir: &Path, final_dir: &Path) -> Result<()> {
        let result = (|| -> Result<()> {
            if let Some(parent) = final_dir.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match std::fs::rename(wip_dir, final_dir) {
                Ok(()) => Ok(()),
                Err(e) if is_cross_device(&e) => copy_then_delete(wip_dir, final_dir),
                Err(e) => Err(e.into()),
            }
        })();
        if result.is_err() {
            let _ = std::fs::remove_dir_all(wip_dir);
        }
        result
    }

    /// Mirror-commit a freshly built bundle into every reachable root.
    /// Per-root failures are swallowed (I3: an unreachable root is
    /// skipped, never fatal); at least one success is required.
    pub fn commit_to_all_roots(&self, wip_dir: &Path, bundle_id: &str) -> Result<usize> {
        let mut successes = 0usize;
        for (i, root) in self.roots.iter().enumerate() {
            let source = if i == 0 {
                wip_dir.to_path_buf()
            } else {
                // Subsequent roots get a fresh copy of the already-committed wip content.
                match copy_dir(wip_dir, &root.join(format!(".mirror-src.{bundle_id}"))) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(root = %root.display(), error = %e, "failed to stage mirror copy");
                        continue;
                    }
                }
            };
            let final_dir = root.join(bundle_id);
            match self.atomic_commit(&source, &final_dir) {
                Ok(()) => successes += 1,
                Err(e) => warn!(root = %root.display(), error = %e, "mirror commit failed"),
            }
        }
        if successes == 0 {
            bail!("operation_failed: no storage root accepted the commit");
        }
        Ok(successes)
    }

    /// Commit a rebuilt bundle over an existing one (§4.9 "Update"): the
    /// live directory is renamed aside with the same `.deleting.<ts>`
    /// prefix `scheduleDelete` uses, so a crash between the two renames
    /// still leaves the startup sweep able to reclaim it, then the wip
    /// directory is renamed into place. At least one mirror must succeed.
    pub fn replace_in_all_roots(&self, wip_dir: &Path, bundle_id: &str) -> Result<usize> {
        let mut successes = 0usize;
        for (i, root) in self.roots.iter().enumerate() {
            let source = if i == 0 {
                wip_dir.to_path_buf()
            } else {
                match copy_dir(wip_dir, &root.join(format!(".mirror-src.{bundle_id}"))) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(root = %root.display(), error = %e, "failed to stage mirror copy");
                        continue;
                    }
                }
            };
            let final_dir = root.join(bundle_id);
            if final_dir.exists() {
                let ts = chrono::Utc::now().timestamp_millis();
                let backup = root.join(format!("{DELETING_PREFIX}{ts}.{bundle_id}"));
                if let Err(e) = std::fs::rename(&final_dir, &backup) {
                    warn!(root = %root.display(), error = %e, "failed to move aside old bundle for update");
                    continue;
                }
            }
            match self.atomic_commit(&source, &final_dir) {
                Ok(()) => successes += 1,
                Err(e) => warn!(root = %root.display(), error = %e, "mirror update-commit failed"),
            }
        }
        if successes == 0 {
            bail!("operation_failed: no storage root accepted the update");
        }
        Ok(successes)
    }

    /// `scheduleDelete(root, bundleId)` — rename to `.deleting.<ts>` and
    /// return immediately; a background sweeper removes the contents.
    pub fn schedule_delete(&self, bundle_id: &str) -> Result<usize> {
        let mut scheduled = 0usize;
        for root in &self.roots {
            let bundle_dir = root.join(bundle_id);
            if !bundle_dir.exists() {
                continue;
            }
            let ts = chrono::Utc::now().timestamp_millis();
            let target = root.join(format!("{DELETING_PREFIX}{ts}.{bundle_id}"));
            if std::fs::rename(&bundle_dir, &target).is_ok() {
                scheduled += 1;
            }
        }
        Ok(scheduled)
    }

    /// `startupSweep()` — recursively delete all `.deleting.*` and
    /// `bundles-wip/*` entries older than the grace period. Entries whose
    /// name doesn't look like a UUID or a recognized sweep prefix are
    /// skipped, not deleted.
    pub fn startup_sweep(&self, tmp_dir: &Path, grace: std::time::Duration) -> Result<usize> {
        let mut removed = 0usize;
        let now = std::time::SystemTime::now();

        for root in self.roots.iter().chain(std::iter::once(&tmp_dir.to_path_buf())) {
            let Ok(entries) = std::fs::read_dir(root) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                let is_deleting = name.starts_with(DELETING_PREFIX);
                let is_wip_parent = name == WIP_DIR;
                if is_wip_parent {
                    removed += sweep_wip_children(&entry.path(), now, grace);
                    continue;
                }
                if !is_deleting {
                    continue;
                }
                let Ok(meta) = entry.metadata() else { continue };
                let Ok(age) = now.duration_since(meta.modified().unwrap_or(now)) else {
                    continue;
                };
                if age >= grace {
                    if std::fs::remove_dir_all(entry.path()).is_ok() {
                        removed += 1;
                        info!(entry = %entry.path().display(), "swept stale entry");
                    }
                }
            }
        }
        Ok(removed)
    }
}

fn sweep_wip_children(wip_parent: &Path, now: std::time::SystemTime, grace: std::time::Duration) -> usize {
    let mut removed = 0usize;
    let Ok(entries) = std::fs::read_dir(wip_parent) else {
        return 0;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if Uuid::parse_str(&name).is_err() {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(age) = now.duration_since(meta.modified().unwrap_or(now)) else {
            continue;
        };
        if age >= grace {
            if std::fs::remove_dir_all(entry.path()).is_ok() {
                removed += 1;
            }
        }
    }
    removed
}

fn is_cross_device(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18) // EXDEV
}

fn copy_then_delete(src: &Path, dst: &Path) -> Result<()> {
    copy_dir(src, dst)?;
    std::fs::remove_dir_all(src)?;
    Ok(())
}

fn copy_dir(src: &Path, dst: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dst)?;
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(dst.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn safe_join_rejects_traversal() {
        let root = Path::new("/bundle/root");
        assert!(Storage::safe_join(root, "../escape").is_err());
        assert!(Storage::safe_join(root, "/absolute").is_err());
        assert!(Storage::safe_join(root, "ok/nested.md").is_ok());
        let joined = Storage::safe_join(root, "ok/nested.md").unwrap();
        assert!(joined.starts_with(root));
    }

    #[test]
    fn atomic_commit_renames_into_place() {
        let base = tempdir().unwrap();
        let storage = Storage::new(vec![base.path().to_path_buf()]);
        let wip = base.path().join("wip1");
        std::fs::create_dir_all(&wip).unwrap();
        std::fs::write(wip.join("manifest.json"), "{}").unwrap();

        let final_dir = base.path().join("bundle-a");
        storage.atomic_commit(&wip, &final_dir).unwrap();
        assert!(final_dir.join("manifest.json").is_file());
        assert!(!wip.exists());
    }

    #[test]
    fn resolve_bundle_root_requires_manifest() {
        let base = tempdir().unwrap();
        let storage = Storage::new(vec![base.path().to_path_buf()]);
        let incomplete = base.path().join("incomplete");
        std::fs::create_dir_all(&incomplete).unwrap();
        assert!(storage.resolve_bundle_root("incomplete").is_none());

        std::fs::write(incomplete.join("manifest.json"), "{}").unwrap();
        assert!(storage.resolve_bundle_root("incomplete").is_some());
    }

    #[test]
    fn startup_sweep_removes_old_wip_and_deleting() {
        let base = tempdir().unwrap();
        let storage = Storage::new(vec![base.path().to_path_buf()]);

        let wip_child = base.path().join(WIP_DIR).join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&wip_child).unwrap();
        let deleting = base.path().join(format!("{DELETING_PREFIX}0.old-bundle"));
        std::fs::create_dir_all(&deleting).unwrap();

        let removed = storage
            .startup_sweep(base.path(), std::time::Duration::from_secs(0))
            .unwrap();
        assert_eq!(removed, 2);
        assert!(!wip_child.exists());
        assert!(!deleting.exists());
    }
}
