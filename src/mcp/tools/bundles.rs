//! Bundle Lifecycle tools: `preflight_list_bundles`, `preflight_create_bundle`,
//! `preflight_update_bundle`, `preflight_repair_bundle`, `preflight_delete_bundle`,
//! `preflight_get_task_status`, `preflight_cleanup_orphans` (§6).

use super::parse_params;
use crate::error::{ErrorCode, PreflightError};
use crate::lifecycle::{CreateBundleInput, RepairMode};
use crate::mcp::context::McpContext;
use crate::mcp::envelope::{Envelope, EnvelopeBuilder};
use crate::models::IfExists;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoInputParam {
    kind: String,
    repo: String,
    #[serde(default)]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBundleParams {
    #[serde(default)]
    repos: Vec<RepoInputParam>,
    #[serde(default)]
    libraries: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    if_exists: IfExists,
}

pub async fn create_bundle(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let builder = EnvelopeBuilder::new("preflight_create_bundle", request_id);
    let parsed: CreateBundleParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    if parsed.repos.is_empty() && parsed.libraries.is_empty() && parsed.topics.is_empty() {
        return builder.err(&PreflightError::new(ErrorCode::InvalidInput, "at least one of repos/libraries/topics is required"));
    }

    let input = CreateBundleInput {
        repos: parsed
            .repos
            .into_iter()
            .map(|r| crate::fingerprint::RepoInput { kind: r.kind, repo: r.repo, reference: r.reference })
            .collect(),
        libraries: parsed.libraries,
        topics: parsed.topics,
        tags: parsed.tags,
        display_name: parsed.display_name,
    };

    match ctx.lifecycle.create_bundle(input, parsed.if_exists).await {
        Ok(outcome) => {
            let mut builder = builder.bundle_id(outcome.bundle_id.clone());
            if !outcome.notes.is_empty() {
                for note in &outcome.notes {
                    builder.warn("partial_index", note.clone(), true);
                }
            }
            builder.ok(outcome)
        }
        Err(e) => builder.err(&e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBundleParams {
    bundle_id: String,
    #[serde(default)]
    check_only: bool,
    #[serde(default)]
    force: bool,
}

pub async fn update_bundle(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_update_bundle", request_id);
    let parsed: UpdateBundleParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    match ctx.lifecycle.update_bundle(&parsed.bundle_id, parsed.check_only, parsed.force).await {
        Ok(outcome) => {
            if !outcome.updated && !outcome.checked_only {
                builder.warn("no_changes", "no repository deltas detected; bundle left unchanged", true);
            }
            builder.ok(outcome)
        }
        Err(e) => builder.err(&e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepairBundleParams {
    bundle_id: String,
    #[serde(default)]
    mode: RepairModeParam,
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum RepairModeParam {
    #[default]
    Validate,
    Repair,
}

pub async fn repair_bundle(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_repair_bundle", request_id);
    let parsed: RepairBundleParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    let mode = match parsed.mode {
        RepairModeParam::Validate => RepairMode::Validate,
        RepairModeParam::Repair => RepairMode::Repair,
    };
    match ctx.lifecycle.repair_bundle(&parsed.bundle_id, mode).await {
        Ok(outcome) => {
            if !outcome.missing.is_empty() && outcome.repaired.is_empty() {
                builder.warn("bundle_incomplete", format!("{} artifact(s) missing", outcome.missing.len()), true);
            }
            builder.ok(outcome)
        }
        Err(e) => builder.err(&e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBundleParams {
    bundle_id: String,
}

pub async fn delete_bundle(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_delete_bundle", request_id);
    let parsed: DeleteBundleParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    match ctx.lifecycle.delete_bundle(&parsed.bundle_id).await {
        Ok(outcome) => builder.ok(outcome),
        Err(e) => builder.err(&e),
    }
}

pub async fn list_bundles(ctx: &McpContext, request_id: &str, _params: Value) -> Envelope {
    let builder = EnvelopeBuilder::new("preflight_list_bundles", request_id);
    let mut bundles = Vec::new();
    let mut skipped = 0usize;
    for bundle_id in ctx.storage().list_bundle_ids() {
        match ctx.lifecycle.manifest_by_id(&bundle_id) {
            Ok(manifest) => bundles.push(manifest),
            Err(_) => skipped += 1,
        }
    }
    let mut builder = builder;
    if skipped > 0 {
        builder.warn("partial_list", format!("{skipped} bundle(s) had an unreadable manifest and were skipped"), true);
    }
    builder.ok(serde_json::json!({ "bundles": bundles }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskStatusParams {
    task_id: String,
}

pub async fn get_task_status(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let builder = EnvelopeBuilder::new("preflight_get_task_status", request_id);
    let parsed: TaskStatusParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    match ctx.lifecycle.progress.by_task_id(&parsed.task_id) {
        Some(entry) => builder.ok(entry),
        None => builder.err(&PreflightError::new(ErrorCode::FileNotFound, format!("no task with id '{}'", parsed.task_id))),
    }
}

pub async fn cleanup_orphans(ctx: &McpContext, request_id: &str, _params: Value) -> Envelope {
    let builder = EnvelopeBuilder::new("preflight_cleanup_orphans", request_id);
    let tmp_dir = ctx.config().storage.tmp_dir.clone();
    let grace = std::time::Duration::from_secs(ctx.config().storage.sweep_grace_secs);
    match ctx.storage().startup_sweep(&tmp_dir, grace) {
        Ok(removed) => builder.ok(serde_json::json!({ "removed": removed })),
        Err(e) => builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
    }
}
