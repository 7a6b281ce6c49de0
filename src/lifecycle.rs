//! Bundle Lifecycle (BL) — §4.9.
//!
//! Owns the create/update/repair/delete state machine and the progress
//! tracker. Grounded on the teacher's `ingest.rs` orchestration order
//! (checkpoint -> scan -> upsert -> chunk -> embed) generalized to this
//! crate's IP -> PS/CB -> FTS -> SEM -> AC -> manifest pipeline, and on
//! `progress.rs`'s reporter idiom — extended here from a stream-of-events
//! reporter to a concurrently pollable map, since the tracker must be
//! *polled* by `taskId` or `fingerprint` rather than only streamed
//! (`dashmap`, sourced from mcb's dependency stack since the teacher
//! carries no concurrent-map crate).

use crate::ast::{self, callgraph::CallGraph};
use crate::config::{AnalysisMode, Config};
use crate::error::{ErrorCode, PreflightError};
use crate::fingerprint::{self, DedupIndex, RepoInput};
use crate::ingest::{self, github, IngestReport};
use crate::models::{self, FileFacts, FileKind, IfExists, IngestedFile, Manifest, NormalizedInputs, RepoEntry, RepoKind};
use crate::storage::Storage;
use crate::{chunk, embedding, fts, semantic};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

// ───────────────────────────── progress tracker ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Queued,
    Fetching,
    Normalizing,
    Indexing,
    Analyzing,
    Finalizing,
    Done,
    Failed,
}

/// `{ stage, percent, message, startedAt, taskId }` — safe to poll
/// concurrently (§4.9), backed by [`dashmap::DashMap`] rather than the
/// teacher's stream-of-events `SyncProgressReporter`, since a poll-style
/// `preflight_get_task_status` call needs random access by key, not a
/// subscription.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEntry {
    pub stage: ProgressStage,
    pub percent: u8,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub task_id: String,
}

#[derive(Default)]
pub struct ProgressTracker {
    by_fingerprint: DashMap<String, ProgressEntry>,
    by_task: DashMap<String, String>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&self, fingerprint: &str) -> String {
        let task_id = Uuid::new_v4().to_string();
        self.by_fingerprint.insert(
            fingerprint.to_string(),
            ProgressEntry {
                stage: ProgressStage::Queued,
                percent: 0,
                message: "queued".to_string(),
                started_at: Utc::now(),
                task_id: task_id.clone(),
            },
        );
        self.by_task.insert(task_id.clone(), fingerprint.to_string());
        task_id
    }

    fn update(&self, fingerprint: &str, stage: ProgressStage, percent: u8, message: impl Into<String>) {
        if let Some(mut entry) = self.by_fingerprint.get_mut(fingerprint) {
            entry.stage = stage;
            entry.percent = percent;
            entry.message = message.into();
        }
    }

    pub fn by_fingerprint(&self, fingerprint: &str) -> Option<ProgressEntry> {
        self.by_fingerprint.get(fingerprint).map(|e| e.clone())
    }

    pub fn by_task_id(&self, task_id: &str) -> Option<ProgressEntry> {
        let fp = self.by_task.get(task_id)?.clone();
        self.by_fingerprint(&fp)
    }
}

// ───────────────────────────── inputs / outcomes ─────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CreateBundleInput {
    pub repos: Vec<RepoInput>,
    pub libraries: Vec<String>,
    pub topics: Vec<String>,
    pub tags: Vec<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub bundle_id: String,
    pub fingerprint: String,
    pub created: bool,
    pub task_id: String,
    pub manifest: Manifest,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoDelta {
    pub repo_id: String,
    pub current_head: Option<String>,
    pub remote_head: Option<String>,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub bundle_id: String,
    pub checked_only: bool,
    pub updated: bool,
    pub deltas: Vec<RepoDelta>,
    pub manifest: Option<Manifest>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    Validate,
    Repair,
}

const REQUIRED_ARTIFACTS: &[&str] = &[fts::DB_RELATIVE_PATH, "START_HERE.md", "AGENTS.md", "OVERVIEW.md"];

#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub bundle_id: String,
    pub missing: Vec<String>,
    pub repaired: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub bundle_id: String,
    pub scheduled_roots: usize,
}

// ───────────────────────────── lifecycle ─────────────────────────────

pub struct Lifecycle {
    config: Arc<Config>,
    storage: Storage,
    dedup: AsyncMutex<DedupIndex>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
    pub progress: Arc<ProgressTracker>,
}

impl Lifecycle {
    pub fn new(config: Arc<Config>, storage: Storage) -> Self {
        let dedup_root = config.storage.dirs[0].clone();
        let dedup = DedupIndex::load_or_rebuild(&dedup_root, &storage);
        Self {
            config,
            storage,
            dedup: AsyncMutex::new(dedup),
            locks: DashMap::new(),
            progress: Arc::new(ProgressTracker::new()),
        }
    }

    fn lock_for(&self, fingerprint: &str) -> Arc<AsyncMutex<()>> {
        self.locks.entry(fingerprint.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Resolve a bundle id or fingerprint to `(bundleId, manifest)`, for
    /// tools that accept either (§4.9). Exposed to the MCP tool handlers.
    pub async fn resolve_bundle(&self, bundle_id_or_fp: &str) -> Result<(String, Manifest), PreflightError> {
        self.resolve_manifest(bundle_id_or_fp).await
    }

    /// Load a bundle's manifest by its directory id only (no fingerprint
    /// fallback). Exposed to the MCP tool handlers.
    pub fn manifest_by_id(&self, bundle_id: &str) -> Result<Manifest, PreflightError> {
        self.load_manifest(bundle_id)
    }

    /// §4.9 "Create": fingerprint, dedup, lock, build, atomic mirrored
    /// commit, dedup-index update. Any failure before the final rename is
    /// terminal and leaves no trace (the wip directory is removed by
    /// [`Storage::atomic_commit`]/[`Storage::replace_in_all_roots`] on error).
    pub async fn create_bundle(&self, input: CreateBundleInput, if_exists: IfExists) -> Result<CreateOutcome, PreflightError> {
        let normalized = fingerprint::canonicalize(&input.repos, &input.libraries, &input.topics);
        let fp = fingerprint::fingerprint(&normalized);
        let lock = self.lock_for(&fp);
        let _guard = lock.lock().await;

        let existing = self.dedup.lock().await.get(&fp).cloned();
        if let Some(existing_id) = existing {
            match if_exists {
                IfExists::Error => {
                    return Err(PreflightError::new(ErrorCode::BundleExists, format!("bundle '{existing_id}' already covers this input set"))
                        .with_details(serde_json::json!({ "bundleId": existing_id })))
                }
                IfExists::ReturnExisting => {
                    let manifest = self.load_manifest(&existing_id)?;
                    return Ok(CreateOutcome {
                        bundle_id: existing_id,
                        fingerprint: fp,
                        created: false,
                        task_id: Uuid::new_v4().to_string(),
                        manifest,
                        notes: Vec::new(),
                    });
                }
                IfExists::UpdateExisting => {
                    drop(_guard);
                    let update = self.update_bundle(&existing_id, false, true).await?;
                    let manifest = update.manifest.ok_or_else(|| {
                        PreflightError::new(ErrorCode::OperationFailed, "updateExisting did not produce a manifest")
                    })?;
                    return Ok(CreateOutcome {
                        bundle_id: existing_id,
                        fingerprint: fp,
                        created: false,
                        task_id: Uuid::new_v4().to_string(),
                        manifest,
                        notes: update.notes,
                    });
                }
                IfExists::CreateNew => {}
            }
        }

        let bundle_id = Uuid::new_v4().to_string();
        let task_id = self.progress.start(&fp);
        let tmp_dir = self.config.storage.tmp_dir.clone();
        let (wip_dir, _wip_name) = self
            .storage
            .allocate_wip(&tmp_dir)
            .map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;

        let now = Utc::now();
        let build = self
            .run_pipeline(&wip_dir, &bundle_id, &fp, normalized, &input.repos, input.tags, input.display_name, now, now)
            .await;

        let (manifest, notes) = match build {
            Ok(built) => built,
            Err(e) => {
                self.progress.update(&fp, ProgressStage::Failed, 100, e.to_string());
                let _ = std::fs::remove_dir_all(&wip_dir);
                return Err(PreflightError::new(ErrorCode::OperationFailed, format!("bundle build failed: {e}")));
            }
        };

        self.progress.update(&fp, ProgressStage::Finalizing, 95, "committing bundle");
        self.storage
            .commit_to_all_roots(&wip_dir, &bundle_id)
            .map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;

        self.dedup
            .lock()
            .await
            .insert(fp.clone(), bundle_id.clone())
            .map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;

        self.progress.update(&fp, ProgressStage::Done, 100, "ready");
        info!(bundle_id = %bundle_id, fingerprint = %fp, "bundle created");

        Ok(CreateOutcome { bundle_id, fingerprint: fp, created: true, task_id, manifest, notes })
    }

    /// §4.9 "Update". `checkOnly` polls each repo's remote HEAD without
    /// touching the bundle; otherwise rebuilds into a wip directory and
    /// swaps it in with [`Storage::replace_in_all_roots`], keeping the old
    /// bundle live until the swap succeeds.
    pub async fn update_bundle(&self, bundle_id_or_fp: &str, check_only: bool, force: bool) -> Result<UpdateOutcome, PreflightError> {
        let (bundle_id, manifest) = self.resolve_manifest(bundle_id_or_fp).await?;

        let repo_inputs: Vec<RepoInput> = manifest
            .inputs
            .repos
            .iter()
            .map(|r| RepoInput { kind: r.kind.clone(), repo: r.id.clone(), reference: r.reference.clone() })
            .collect();

        let deltas = self.compute_deltas(&manifest);
        let any_changed = deltas.iter().any(|d| d.changed);

        if check_only {
            return Ok(UpdateOutcome { bundle_id, checked_only: true, updated: false, deltas, manifest: None, notes: Vec::new() });
        }

        if !force && !any_changed {
            return Ok(UpdateOutcome {
                bundle_id,
                checked_only: false,
                updated: false,
                deltas,
                manifest: Some(manifest),
                notes: Vec::new(),
            });
        }

        let fp = manifest.fingerprint.clone();
        let lock = self.lock_for(&fp);
        let _guard = lock.lock().await;

        self.progress.start(&fp);
        let tmp_dir = self.config.storage.tmp_dir.clone();
        let (wip_dir, _) = self
            .storage
            .allocate_wip(&tmp_dir)
            .map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;

        let normalized = manifest.inputs.clone();
        let (rebuilt, notes) = self
            .run_pipeline(&wip_dir, &bundle_id, &fp, normalized, &repo_inputs, manifest.tags.clone(), manifest.display_name.clone(), manifest.created_at, Utc::now())
            .await
            .map_err(|e| {
                self.progress.update(&fp, ProgressStage::Failed, 100, e.to_string());
                let _ = std::fs::remove_dir_all(&wip_dir);
                PreflightError::new(ErrorCode::OperationFailed, format!("update rebuild failed: {e}"))
            })?;

        self.progress.update(&fp, ProgressStage::Finalizing, 95, "swapping bundle into place");
        self.storage
            .replace_in_all_roots(&wip_dir, &bundle_id)
            .map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;

        self.progress.update(&fp, ProgressStage::Done, 100, "ready");
        info!(bundle_id = %bundle_id, "bundle updated");

        Ok(UpdateOutcome { bundle_id, checked_only: false, updated: true, deltas, manifest: Some(rebuilt), notes })
    }

    fn compute_deltas(&self, manifest: &Manifest) -> Vec<RepoDelta> {
        manifest
            .repos
            .iter()
            .map(|repo| {
                let remote_head = match repo.kind {
                    RepoKind::Github => github::remote_head(&repo.id, None),
                    RepoKind::Local | RepoKind::Docs => None,
                };
                let changed = match (&repo.head_sha, &remote_head) {
                    (Some(current), Some(remote)) => current != remote,
                    // Local/docs repos and repos whose remote is unreachable are
                    // always considered possibly-changed; only `force` skips re-fetching them.
                    _ => true,
                };
                RepoDelta { repo_id: repo.id.clone(), current_head: repo.head_sha.clone(), remote_head, changed }
            })
            .collect()
    }

    /// §4.9 "Repair". Offline: verifies presence/non-emptiness of the
    /// required derived artifacts and, in `repair` mode, regenerates them
    /// from `repos/*/norm/**` without any network fetch.
    pub async fn repair_bundle(&self, bundle_id: &str, mode: RepairMode) -> Result<RepairOutcome, PreflightError> {
        let root = self
            .storage
            .resolve_bundle_root(bundle_id)
            .ok_or_else(|| PreflightError::bundle_not_found(bundle_id))?;

        let missing = missing_artifacts(&root);
        if mode == RepairMode::Validate || missing.is_empty() {
            return Ok(RepairOutcome { bundle_id: bundle_id.to_string(), missing, repaired: Vec::new() });
        }

        let manifest = self.load_manifest(bundle_id)?;
        let files = rediscover_norm_files(&root, &manifest.repos);
        let mut repaired = Vec::new();

        if missing.contains(&fts::DB_RELATIVE_PATH.to_string()) {
            rebuild_fts(&root, &files).await.map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;
            repaired.push(fts::DB_RELATIVE_PATH.to_string());
        }

        for doc in ["START_HERE.md", "AGENTS.md", "OVERVIEW.md"] {
            if missing.contains(&doc.to_string()) {
                write_generated_doc(&root, doc, &manifest)
                    .map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;
                repaired.push(doc.to_string());
            }
        }

        Ok(RepairOutcome { bundle_id: bundle_id.to_string(), missing, repaired })
    }

    /// §4.9 "Delete": rename to `.deleting.<ts>` across every root and
    /// acknowledge immediately; the startup/background sweeper finishes
    /// the removal.
    pub async fn delete_bundle(&self, bundle_id: &str) -> Result<DeleteOutcome, PreflightError> {
        if self.storage.resolve_bundle_root(bundle_id).is_none() {
            return Err(PreflightError::bundle_not_found(bundle_id));
        }
        let scheduled = self
            .storage
            .schedule_delete(bundle_id)
            .map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;
        self.dedup
            .lock()
            .await
            .remove_by_bundle_id(bundle_id)
            .map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;
        Ok(DeleteOutcome { bundle_id: bundle_id.to_string(), scheduled_roots: scheduled })
    }

    async fn resolve_manifest(&self, bundle_id_or_fp: &str) -> Result<(String, Manifest), PreflightError> {
        if let Some(manifest) = self.try_load_manifest(bundle_id_or_fp) {
            return Ok((bundle_id_or_fp.to_string(), manifest));
        }
        // Fall back to treating the argument as a fingerprint.
        let dedup = self.dedup.lock().await;
        let bundle_id = dedup.get(bundle_id_or_fp).cloned().ok_or_else(|| PreflightError::bundle_not_found(bundle_id_or_fp))?;
        drop(dedup);
        let manifest = self.load_manifest(&bundle_id)?;
        Ok((bundle_id, manifest))
    }

    fn try_load_manifest(&self, bundle_id: &str) -> Option<Manifest> {
        let root = self.storage.resolve_bundle_root(bundle_id)?;
        let contents = std::fs::read_to_string(root.join("manifest.json")).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn load_manifest(&self, bundle_id: &str) -> Result<Manifest, PreflightError> {
        self.try_load_manifest(bundle_id).ok_or_else(|| PreflightError::bundle_not_found(bundle_id))
    }

    /// IP -> PS/CB -> FTS -> SEM -> AC -> manifest write, in that strict
    /// order (§5 "Ordering"). Shared by create and the non-`checkOnly`,
    /// non-noop path of update.
    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        wip_dir: &Path,
        bundle_id: &str,
        fp: &str,
        inputs: NormalizedInputs,
        repo_inputs: &[RepoInput],
        tags: Vec<String>,
        display_name: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(Manifest, Vec<String>)> {
        self.progress.update(fp, ProgressStage::Fetching, 10, "fetching repositories");
        let limits = self.config.limits.clone();
        let timeouts = self.config.timeouts.clone();
        let parser_cfg = self.config.parser.clone();
        let wip_for_ingest = wip_dir.to_path_buf();
        let repos_for_ingest = repo_inputs.to_vec();
        let report: IngestReport = tokio::task::spawn_blocking(move || {
            ingest::run_ingest(&wip_for_ingest, &repos_for_ingest, &limits, &timeouts, &parser_cfg)
        })
        .await
        .context("ingest worker panicked")??;

        self.progress.update(fp, ProgressStage::Normalizing, 35, "chunking and building indexes");
        let wip_for_chunks = wip_dir.to_path_buf();
        let files_for_chunks = report.files.clone();
        let bundle_id_owned = bundle_id.to_string();
        let chunks = tokio::task::spawn_blocking(move || build_chunks(&wip_for_chunks, &bundle_id_owned, &files_for_chunks))
            .await
            .context("chunk worker panicked")?;

        self.progress.update(fp, ProgressStage::Indexing, 55, "indexing full text");
        let fts_pool = fts::open(wip_dir).await?;
        fts::rebuild(&fts_pool, wip_dir, &report.files).await?;
        fts_pool.close().await;

        let mut notes = report.notes.clone();
        if self.config.embedding.semantic_search_enabled {
            self.progress.update(fp, ProgressStage::Indexing, 65, "embedding chunks");
            match index_semantic(wip_dir, &self.config, &chunks).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(error = %e, "semantic indexing failed; bundle will serve FTS-only search");
                    notes.push(format!("semantic indexing skipped: {e}"));
                }
            }
        }

        self.progress.update(fp, ProgressStage::Analyzing, 80, "running static analysis");
        let wip_for_ast = wip_dir.to_path_buf();
        let files_for_ast = report.files.clone();
        let mode = self.config.analysis.mode;
        tokio::task::spawn_blocking(move || run_ast_analysis(&wip_for_ast, &files_for_ast, mode))
            .await
            .context("AST analysis worker panicked")?;

        self.progress.update(fp, ProgressStage::Finalizing, 90, "writing manifest and derived docs");
        let manifest = Manifest {
            schema_version: models::SCHEMA_VERSION,
            bundle_id: bundle_id.to_string(),
            fingerprint: fp.to_string(),
            created_at,
            updated_at,
            inputs,
            repos: report.repos,
            tags,
            display_name,
            primary_language: infer_primary_language(&report.files),
        };
        let manifest_json = models::to_canonical_json(&manifest)?;
        std::fs::write(wip_dir.join("manifest.json"), manifest_json)?;

        write_generated_doc(wip_dir, "START_HERE.md", &manifest)?;
        write_generated_doc(wip_dir, "AGENTS.md", &manifest)?;
        write_generated_doc(wip_dir, "OVERVIEW.md", &manifest)?;

        Ok((manifest, notes))
    }
}

fn build_chunks(wip_dir: &Path, bundle_id: &str, files: &[IngestedFile]) -> Vec<models::SemanticChunk> {
    let mut chunks = Vec::new();
    for file in files {
        if file.kind != FileKind::Doc {
            continue;
        }
        let full = wip_dir.join(&file.bundle_norm_relative_path);
        let Ok(content) = std::fs::read_to_string(&full) else { continue };
        let is_academic = matches!(
            Path::new(&file.repo_relative_path).extension().and_then(|e| e.to_str()),
            Some("pdf" | "docx" | "pptx" | "xlsx")
        );
        let file_chunks = if is_academic {
            chunk::chunk_academic(bundle_id, &file.repo_id, &file.bundle_norm_relative_path, &content)
        } else {
            chunk::chunk_generic(bundle_id, &file.repo_id, &file.bundle_norm_relative_path, &content)
        };
        chunks.extend(file_chunks);
    }
    chunks
}

async fn index_semantic(wip_dir: &Path, config: &Config, chunks: &[models::SemanticChunk]) -> Result<()> {
    if chunks.is_empty() {
        return Ok(());
    }
    let provider = embedding::create_provider(&config.embedding)?;
    let batch_size = config.embedding.batch_size.max(1);
    let mut rows = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = embedding::embed_texts(provider.as_ref(), &config.embedding, &texts).await?;
        for (chunk, vector) in batch.iter().zip(vectors.into_iter()) {
            rows.push(semantic::VectorRow {
                chunk_id: chunk.id.clone(),
                kind: crate::models::FtsKind::Doc,
                repo_id: chunk.metadata.repo_id.clone(),
                path: chunk.metadata.file_path.clone(),
                start_line: chunk.metadata.chunk_index,
                end_line: chunk.metadata.chunk_index,
                text: chunk.content.clone(),
                vector,
            });
        }
    }

    let pool = semantic::open(wip_dir).await?;
    semantic::rebuild(&pool, &rows).await?;
    pool.close().await;
    Ok(())
}

fn run_ast_analysis(wip_dir: &Path, files: &[IngestedFile], mode: AnalysisMode) {
    if mode == AnalysisMode::None {
        return;
    }
    let analysis_dir = wip_dir.join("analysis");
    if std::fs::create_dir_all(&analysis_dir).is_err() {
        return;
    }

    let mut facts: BTreeMap<String, FileFacts> = BTreeMap::new();
    let mut sources: Vec<(String, ast::Language, String)> = Vec::new();

    for file in files {
        if file.kind != FileKind::Code {
            continue;
        }
        let full = wip_dir.join(&file.bundle_norm_relative_path);
        let Ok(content) = std::fs::read_to_string(&full) else { continue };
        let path = Path::new(&file.bundle_norm_relative_path);
        let Some(language) = ast::Language::from_path(path) else { continue };

        if mode == AnalysisMode::Full {
            sources.push((file.bundle_norm_relative_path.clone(), language, content.clone()));
        }

        if let Some(mut file_facts) = ast::analyze_file(path, &content) {
            if mode == AnalysisMode::Quick {
                file_facts.complexity.clear();
            }
            facts.insert(file.bundle_norm_relative_path.clone(), file_facts);
        }
    }

    if let Ok(json) = models::to_canonical_json(&facts) {
        let _ = std::fs::write(analysis_dir.join("FACTS.json"), json);
    }

    if mode == AnalysisMode::Full && !sources.is_empty() {
        let graph = CallGraph::build(&sources);
        if let Ok(json) = models::to_canonical_json(&graph.snapshot()) {
            let _ = std::fs::write(analysis_dir.join("CALL_GRAPH.json"), json);
        }
    }
}

fn infer_primary_language(files: &[IngestedFile]) -> Option<String> {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for file in files {
        if file.kind != FileKind::Code {
            continue;
        }
        let ext = Path::new(&file.repo_relative_path).extension().and_then(|e| e.to_str()).unwrap_or("");
        let name = match ext {
            "rs" => "rust",
            "ts" | "tsx" => "typescript",
            "js" | "jsx" | "mjs" | "cjs" => "javascript",
            "py" => "python",
            "go" => "go",
            "java" => "java",
            _ => continue,
        };
        *counts.entry(name).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, n)| *n).map(|(name, _)| name.to_string())
}

fn missing_artifacts(root: &Path) -> Vec<String> {
    REQUIRED_ARTIFACTS
        .iter()
        .filter(|rel| {
            let path = root.join(rel);
            match std::fs::metadata(&path) {
                Ok(meta) => meta.len() == 0,
                Err(_) => true,
            }
        })
        .map(|s| s.to_string())
        .collect()
}

async fn rebuild_fts(root: &Path, files: &[IngestedFile]) -> Result<()> {
    let pool = fts::open(root).await?;
    fts::rebuild(&pool, root, files).await?;
    pool.close().await;
    Ok(())
}

/// Reconstruct an `IngestedFile` list by walking `repos/*/norm/**` directly,
/// for repair (no manifest-recorded file list is persisted; the norm tree
/// itself is the source of truth, per §4.9 "offline, no network fetch").
fn rediscover_norm_files(root: &Path, repos: &[RepoEntry]) -> Vec<IngestedFile> {
    let mut files = Vec::new();
    for repo in repos {
        let norm_dir = root.join("repos").join(crate::ingest::sanitize_repo_id(&repo.id)).join("norm");
        if !norm_dir.is_dir() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&norm_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else { continue };
            let Ok(repo_rel) = entry.path().strip_prefix(&norm_dir) else { continue };
            let Ok(meta) = entry.metadata() else { continue };
            files.push(IngestedFile {
                repo_id: repo.id.clone(),
                kind: crate::ingest::classify::classify(entry.path()),
                repo_relative_path: repo_rel.to_string_lossy().to_string(),
                bundle_norm_relative_path: rel.to_string_lossy().to_string(),
                sha256: String::new(),
                bytes: meta.len(),
            });
        }
    }
    files
}

fn write_generated_doc(root: &Path, name: &str, manifest: &Manifest) -> Result<()> {
    let content = match name {
        "START_HERE.md" => render_start_here(manifest),
        "AGENTS.md" => render_agents(manifest),
        "OVERVIEW.md" => render_overview(manifest),
        other => anyhow::bail!("unknown generated doc: {other}"),
    };
    std::fs::write(root.join(name), content)?;
    Ok(())
}

fn render_start_here(manifest: &Manifest) -> String {
    format!(
        "# {}\n\nBundle `{}` covers {} repo(s). Start with `OVERVIEW.md` for a summary, \
         then use `preflight_search_bundle` or `preflight_read_files` to explore.\n",
        manifest.display_name.clone().unwrap_or_else(|| manifest.bundle_id.clone()),
        manifest.bundle_id,
        manifest.repos.len(),
    )
}

fn render_agents(manifest: &Manifest) -> String {
    let mut out = String::from("# Agent notes\n\nThis bundle is read-only and content-addressed; ");
    out.push_str("re-fetching the same inputs returns this bundle rather than creating a new one.\n\n## Repositories\n\n");
    for repo in &manifest.repos {
        out.push_str(&format!("- `{}` ({:?})\n", repo.id, repo.kind));
    }
    out
}

fn render_overview(manifest: &Manifest) -> String {
    let mut out = format!(
        "# Overview\n\n- Bundle id: `{}`\n- Fingerprint: `{}`\n- Created: {}\n- Updated: {}\n",
        manifest.bundle_id, manifest.fingerprint, manifest.created_at, manifest.updated_at
    );
    if let Some(lang) = &manifest.primary_language {
        out.push_str(&format!("- Primary language: {lang}\n"));
    }
    if !manifest.tags.is_empty() {
        out.push_str(&format!("- Tags: {}\n", manifest.tags.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_tracker_resolves_by_task_id_and_fingerprint() {
        let tracker = ProgressTracker::new();
        let task_id = tracker.start("fp-1");
        tracker.update("fp-1", ProgressStage::Indexing, 50, "halfway");

        let by_fp = tracker.by_fingerprint("fp-1").unwrap();
        assert_eq!(by_fp.percent, 50);
        assert_eq!(by_fp.stage, ProgressStage::Indexing);

        let by_task = tracker.by_task_id(&task_id).unwrap();
        assert_eq!(by_task.task_id, task_id);
    }

    #[test]
    fn missing_artifacts_reports_zero_length_or_absent_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("START_HERE.md"), "hi").unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "").unwrap();
        let missing = missing_artifacts(dir.path());
        assert!(missing.contains(&"AGENTS.md".to_string()));
        assert!(missing.contains(&"OVERVIEW.md".to_string()));
        assert!(!missing.contains(&"START_HERE.md".to_string()));
    }

    #[test]
    fn infer_primary_language_picks_the_most_common_code_extension() {
        let files = vec![
            IngestedFile {
                repo_id: "r".into(),
                kind: FileKind::Code,
                repo_relative_path: "a.rs".into(),
                bundle_norm_relative_path: "repos/r/norm/a.rs".into(),
                sha256: String::new(),
                bytes: 10,
            },
            IngestedFile {
                repo_id: "r".into(),
                kind: FileKind::Code,
                repo_relative_path: "b.rs".into(),
                bundle_norm_relative_path: "repos/r/norm/b.rs".into(),
                sha256: String::new(),
                bytes: 10,
            },
            IngestedFile {
                repo_id: "r".into(),
                kind: FileKind::Code,
                repo_relative_path: "c.py".into(),
                bundle_norm_relative_path: "repos/r/norm/c.py".into(),
                sha256: String::new(),
                bytes: 10,
            },
        ];
        assert_eq!(infer_primary_language(&files), Some("rust".to_string()));
    }
}
