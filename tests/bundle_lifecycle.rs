//! End-to-end coverage of the scenarios in §8: a real `Lifecycle` over a
//! real (tempdir) storage root, ingesting a local directory rather than
//! hitting GitHub, since these tests must run offline.

use preflight_bundle::config::Config;
use preflight_bundle::fingerprint::RepoInput;
use preflight_bundle::fts::{self, Scope};
use preflight_bundle::lifecycle::{CreateBundleInput, Lifecycle};
use preflight_bundle::models::IfExists;
use preflight_bundle::storage::Storage;
use std::sync::Arc;

fn test_config(storage_dir: &std::path::Path) -> Arc<Config> {
    let mut config: Config = toml::from_str("").expect("defaulted config");
    config.storage.dirs = vec![storage_dir.to_path_buf()];
    config.storage.tmp_dir = storage_dir.join("tmp");
    Arc::new(config)
}

fn local_repo_input(path: &std::path::Path) -> RepoInput {
    RepoInput { kind: "local".to_string(), repo: path.display().to_string(), reference: None }
}

/// S2 — a one-line local doc is tokenized, indexed, and found by a
/// lower-cased, punctuation-insensitive query.
#[tokio::test]
async fn fts_search_finds_hello_world_in_a_freshly_created_bundle() {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("README.md"), "intro\n\nHello, world!\n").unwrap();

    let storage_dir = tempfile::tempdir().unwrap();
    let config = test_config(storage_dir.path());
    let storage = Storage::new(config.storage.dirs.clone());
    let lifecycle = Lifecycle::new(config, storage);

    let input = CreateBundleInput { repos: vec![local_repo_input(source.path())], ..Default::default() };
    let outcome = lifecycle.create_bundle(input, IfExists::Error).await.expect("bundle creation succeeds");
    assert!(outcome.created);

    let root = lifecycle.storage().resolve_bundle_root(&outcome.bundle_id).expect("bundle root resolves");
    let pool = fts::open(&root).await.expect("search index opens");
    let hits = fts::search(&pool, "hello world", 12, Scope::All, 20).await.expect("search succeeds");
    pool.close().await;

    assert!(hits.iter().any(|h| h.snippet.contains("Hello, world!") && h.line_no == 3), "expected a hit on line 3, got {hits:?}");
}

/// S1 (adapted) — creating the same input twice with `ifExists:
/// returnExisting` returns the same bundle id rather than a duplicate.
#[tokio::test]
async fn create_with_return_existing_reuses_the_same_bundle_id() {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("NOTES.md"), "some notes\n").unwrap();

    let storage_dir = tempfile::tempdir().unwrap();
    let config = test_config(storage_dir.path());
    let storage = Storage::new(config.storage.dirs.clone());
    let lifecycle = Lifecycle::new(config, storage);

    let input = || CreateBundleInput { repos: vec![local_repo_input(source.path())], ..Default::default() };

    let first = lifecycle.create_bundle(input(), IfExists::Error).await.expect("first create succeeds");
    let second = lifecycle.create_bundle(input(), IfExists::ReturnExisting).await.expect("second create succeeds");

    assert_eq!(first.bundle_id, second.bundle_id);
    assert!(!second.created);

    let err = lifecycle
        .create_bundle(input(), IfExists::Error)
        .await
        .expect_err("a third call with ifExists=error must be rejected");
    assert_eq!(err.code().as_str(), "bundle_exists");
}

/// S5 — an abandoned work-in-progress directory left behind by a crashed
/// create never shows up in `list_bundle_ids` and is reclaimed by the
/// startup sweep once its grace period has elapsed.
#[test]
fn startup_sweep_reclaims_abandoned_wip_directories() {
    let storage_dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(vec![storage_dir.path().to_path_buf()]);

    // `sweep_wip_children` only reclaims UUID-named entries (the shape
    // `allocate_wip` actually produces) so an arbitrary crashed-bundle-id
    // directory wouldn't be picked up; use a real one here.
    let crashed_id = uuid::Uuid::new_v4().to_string();
    let wip_root = storage_dir.path().join("bundles-wip").join(&crashed_id);
    std::fs::create_dir_all(&wip_root).unwrap();
    std::fs::write(wip_root.join("manifest.json"), "{}").unwrap();

    assert!(!storage.list_bundle_ids().contains(&crashed_id));

    let removed = storage.startup_sweep(&storage_dir.path().join("tmp"), std::time::Duration::from_secs(0)).expect("sweep succeeds");
    assert!(removed >= 1);
    assert!(!wip_root.exists(), "the wip directory should have been reclaimed");
}

/// S6 — evidence hash drift. A snippet's `snippetSha256` is stamped at read
/// time; after an update rewrites the same file, re-reading the same line
/// range yields a different hash, so a consumer holding the old hash can
/// detect that its evidence is stale.
#[tokio::test]
async fn evidence_hash_drifts_after_an_unrelated_update_touches_the_file() {
    use preflight_bundle::evidence::evidence_for_snippet;

    let source = tempfile::tempdir().unwrap();
    let doc_path = source.path().join("GUIDE.md");
    std::fs::write(&doc_path, "line one\nline two\nline three\n").unwrap();

    let storage_dir = tempfile::tempdir().unwrap();
    let config = test_config(storage_dir.path());
    let storage = Storage::new(config.storage.dirs.clone());
    let lifecycle = Lifecycle::new(config, storage);

    let input = CreateBundleInput { repos: vec![local_repo_input(source.path())], ..Default::default() };
    let outcome = lifecycle.create_bundle(input, IfExists::Error).await.expect("bundle creation succeeds");
    let root = lifecycle.storage().resolve_bundle_root(&outcome.bundle_id).unwrap();

    let repo_id = outcome.manifest.repos[0].id.clone();
    let norm_rel_path = format!("repos/{}/norm/GUIDE.md", repo_id.replace('/', "__"));
    let original = std::fs::read_to_string(root.join(&norm_rel_path)).expect("normalized file exists");
    let original_snippet = original.lines().nth(1).unwrap().to_string();
    let original_pointer = evidence_for_snippet(&norm_rel_path, 2, 2, &original_snippet);

    std::fs::write(&doc_path, "line one\nLINE TWO CHANGED\nline three\n").unwrap();
    let update = lifecycle.update_bundle(&outcome.bundle_id, false, false).await.expect("update succeeds");
    assert!(update.updated);

    let updated = std::fs::read_to_string(root.join(&norm_rel_path)).expect("normalized file still exists");
    let updated_snippet = updated.lines().nth(1).unwrap().to_string();
    let updated_pointer = evidence_for_snippet(&norm_rel_path, 2, 2, &updated_snippet);

    assert_ne!(original_pointer.snippet_sha256, updated_pointer.snippet_sha256);
}
