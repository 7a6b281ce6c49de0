//! Hybrid Search Core tools: `preflight_search_bundle`, `preflight_search_by_tags`,
//! `preflight_search_and_read`, `preflight_semantic_search` (§6, §4.6, §4.7).

use super::parse_params;
use crate::embedding;
use crate::error::{ErrorCode, PreflightError};
use crate::fts::{self, FtsHit, Scope};
use crate::mcp::context::McpContext;
use crate::mcp::cursor::Cursor;
use crate::mcp::envelope::{Envelope, EnvelopeBuilder, Truncation};
use crate::models::SearchScope;
use crate::semantic;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_PAGE_SIZE: usize = 20;

fn parse_scope(raw: &str) -> (SearchScope, Scope) {
    match raw {
        "docs" => (SearchScope::Docs, Scope::Docs),
        "code" => (SearchScope::Code, Scope::Code),
        _ => (SearchScope::All, Scope::All),
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    path: String,
    repo_id: String,
    line_no: i64,
    snippet: String,
    score: f64,
}

impl From<FtsHit> for SearchHit {
    fn from(hit: FtsHit) -> Self {
        SearchHit { path: hit.path, repo_id: hit.repo_id, line_no: hit.line_no, snippet: hit.snippet, score: hit.score }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchBundleParams {
    bundle_id: String,
    query: String,
    #[serde(default = "default_scope")]
    scope: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    cursor: Option<String>,
}

fn default_scope() -> String {
    "all".to_string()
}

pub async fn search_bundle(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_search_bundle", request_id);
    let parsed: SearchBundleParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };

    let page_size = parsed.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 200);
    let query_key = serde_json::json!({ "bundleId": parsed.bundle_id, "query": parsed.query, "scope": parsed.scope });
    let page_cursor = match &parsed.cursor {
        Some(raw) => match Cursor::decode_and_verify(raw, "preflight_search_bundle", &query_key) {
            Ok(c) => c.next(),
            Err(e) => return builder.err(&e),
        },
        None => Cursor::first_page("preflight_search_bundle", &query_key, page_size),
    };

    let (_, scope) = parse_scope(&parsed.scope);
    let db_path = root.join(fts::DB_RELATIVE_PATH);
    if !db_path.is_file() {
        return builder.err(&PreflightError::new(ErrorCode::IndexMissing, "this bundle has no search index"));
    }
    let pool = match fts::open(&root).await {
        Ok(p) => p,
        Err(e) => return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
    };
    let fetch_limit = (page_cursor.offset + page_cursor.page_size + 1) as i64;
    let hits = match fts::search(&pool, &parsed.query, 12, scope, fetch_limit).await {
        Ok(h) => h,
        Err(e) => {
            pool.close().await;
            return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string()));
        }
    };
    pool.close().await;

    emit_page(builder, hits, page_cursor, "preflight_search_bundle")
}

fn emit_page(mut builder: EnvelopeBuilder, hits: Vec<FtsHit>, page_cursor: Cursor, tool: &str) -> Envelope {
    let total_fetched = hits.len();
    let page: Vec<SearchHit> = hits.into_iter().skip(page_cursor.offset).take(page_cursor.page_size).map(SearchHit::from).collect();
    let truncated = total_fetched > page_cursor.offset + page_cursor.page_size;
    let next_cursor = if truncated { Some(page_cursor.encode()) } else { None };

    builder.truncation(Truncation {
        truncated,
        next_cursor,
        reason: if truncated { Some("more_results_available".to_string()) } else { None },
        returned_count: Some(page.len()),
        total_count: None,
    });
    if truncated {
        builder.next_action(tool, serde_json::json!({ "cursor": page_cursor.encode() }), "fetch the next page of results");
    }
    builder.ok(serde_json::json!({ "hits": page }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchByTagsParams {
    tags: Vec<String>,
    query: String,
    #[serde(default = "default_scope")]
    scope: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct TaggedHit {
    bundle_id: String,
    #[serde(flatten)]
    hit: SearchHit,
}

pub async fn search_by_tags(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_search_by_tags", request_id);
    let parsed: SearchByTagsParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    if parsed.tags.is_empty() {
        return builder.err(&PreflightError::new(ErrorCode::InvalidInput, "tags must not be empty"));
    }

    let page_size = parsed.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 200);
    let query_key = serde_json::json!({ "tags": parsed.tags, "query": parsed.query, "scope": parsed.scope });
    let page_cursor = match &parsed.cursor {
        Some(raw) => match Cursor::decode_and_verify(raw, "preflight_search_by_tags", &query_key) {
            Ok(c) => c.next(),
            Err(e) => return builder.err(&e),
        },
        None => Cursor::first_page("preflight_search_by_tags", &query_key, page_size),
    };

    let (_, scope) = parse_scope(&parsed.scope);
    let fanout_cap = ctx.config().limits.trace_fanout_bundle_cap;
    let mut matching_bundles = Vec::new();
    for bundle_id in ctx.storage().list_bundle_ids() {
        if let Ok(manifest) = ctx.lifecycle.manifest_by_id(&bundle_id) {
            if parsed.tags.iter().any(|t| manifest.tags.contains(t)) {
                matching_bundles.push(bundle_id);
            }
        }
    }
    let bundle_fanout_truncated = matching_bundles.len() > fanout_cap;
    matching_bundles.truncate(fanout_cap);

    let fetch_limit = (page_cursor.offset + page_cursor.page_size + 1) as i64;
    let mut tagged_hits: Vec<(String, FtsHit)> = Vec::new();
    for bundle_id in &matching_bundles {
        let Some(root) = ctx.storage().resolve_bundle_root(bundle_id) else { continue };
        let db_path = root.join(fts::DB_RELATIVE_PATH);
        if !db_path.is_file() {
            continue;
        }
        let Ok(pool) = fts::open(&root).await else { continue };
        let hits = fts::search(&pool, &parsed.query, 12, scope, fetch_limit).await.unwrap_or_default();
        pool.close().await;
        for hit in hits {
            tagged_hits.push((bundle_id.clone(), hit));
        }
    }
    tagged_hits.sort_by(|a, b| b.1.score.partial_cmp(&a.1.score).unwrap_or(std::cmp::Ordering::Equal));

    if bundle_fanout_truncated {
        builder.warn("bundle_fanout_truncated", format!("search limited to the first {fanout_cap} matching bundles"), true);
    }

    let total_fetched = tagged_hits.len();
    let page: Vec<TaggedHit> = tagged_hits
        .into_iter()
        .skip(page_cursor.offset)
        .take(page_cursor.page_size)
        .map(|(bundle_id, hit)| TaggedHit { bundle_id, hit: SearchHit::from(hit) })
        .collect();
    let truncated = total_fetched > page_cursor.offset + page_cursor.page_size;
    builder.truncation(Truncation {
        truncated,
        next_cursor: if truncated { Some(page_cursor.encode()) } else { None },
        reason: if truncated { Some("more_results_available".to_string()) } else { None },
        returned_count: Some(page.len()),
        total_count: None,
    });
    builder.ok(serde_json::json!({ "hits": page }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchAndReadParams {
    bundle_id: String,
    query: String,
    #[serde(default = "default_scope")]
    scope: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default = "default_context_lines")]
    context_lines: i64,
}

fn default_context_lines() -> i64 {
    5
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadHit {
    path: String,
    repo_id: String,
    line_no: i64,
    snippet: String,
    context: String,
}

pub async fn search_and_read(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_search_and_read", request_id);
    let parsed: SearchAndReadParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };
    let db_path = root.join(fts::DB_RELATIVE_PATH);
    if !db_path.is_file() {
        return builder.err(&PreflightError::new(ErrorCode::IndexMissing, "this bundle has no search index"));
    }
    let (_, scope) = parse_scope(&parsed.scope);
    let limit = parsed.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 200) as i64;

    let pool = match fts::open(&root).await {
        Ok(p) => p,
        Err(e) => return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
    };
    let hits = match fts::search(&pool, &parsed.query, 12, scope, limit).await {
        Ok(h) => h,
        Err(e) => {
            pool.close().await;
            return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string()));
        }
    };
    pool.close().await;

    let mut results = Vec::with_capacity(hits.len());
    let mut evidence = Vec::new();
    for hit in hits {
        let abs = root.join(&hit.path);
        let Ok(content) = std::fs::read_to_string(&abs) else { continue };
        let lines: Vec<&str> = content.lines().collect();
        let start = (hit.line_no - parsed.context_lines).max(1);
        let end = (hit.line_no + parsed.context_lines).min(lines.len() as i64);
        let start_idx = (start - 1) as usize;
        let end_idx = (end as usize).min(lines.len());
        let context = if start_idx < end_idx { lines[start_idx..end_idx].join("\n") } else { hit.snippet.clone() };
        evidence.push(crate::evidence::evidence_for_snippet(&hit.path, start, end, &context));
        results.push(ReadHit { path: hit.path, repo_id: hit.repo_id, line_no: hit.line_no, snippet: hit.snippet, context });
    }

    builder.evidence(evidence);
    builder.ok(serde_json::json!({ "hits": results }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SemanticSearchParams {
    bundle_id: String,
    query: String,
    #[serde(default = "default_scope")]
    scope: String,
    #[serde(default)]
    repo_id: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    hybrid: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SemanticHitOut {
    path: String,
    repo_id: String,
    start_line: i64,
    end_line: i64,
    text: String,
    score: f64,
}

pub async fn semantic_search(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_semantic_search", request_id);
    let parsed: SemanticSearchParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    if !ctx.config().embedding.semantic_search_enabled {
        return builder.err(&PreflightError::new(ErrorCode::IndexMissing, "semantic search is not enabled on this server"));
    }

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };
    let db_path = root.join(semantic::DB_RELATIVE_PATH);
    if !db_path.is_file() {
        return builder.err(&PreflightError::new(ErrorCode::IndexMissing, "this bundle has no semantic index; call preflight_repair_bundle or preflight_update_bundle"));
    }

    let provider = match embedding::create_provider(&ctx.config().embedding) {
        Ok(p) => p,
        Err(e) => return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
    };
    let query_vector = match embedding::embed_query(provider.as_ref(), &ctx.config().embedding, &parsed.query).await {
        Ok(v) => v,
        Err(e) => return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
    };

    let (_, scope) = parse_scope(&parsed.scope);
    let limit = parsed.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 200);
    let pool = match semantic::open(&root).await {
        Ok(p) => p,
        Err(e) => return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
    };
    let semantic_hits = match semantic::search(&pool, &query_vector, limit, scope, parsed.repo_id.as_deref()).await {
        Ok(h) => h,
        Err(e) => {
            pool.close().await;
            return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string()));
        }
    };

    let results: Vec<SemanticHitOut> = if parsed.hybrid {
        let fts_db = root.join(fts::DB_RELATIVE_PATH);
        let fts_hits = if fts_db.is_file() {
            match fts::open(&root).await {
                Ok(fts_pool) => {
                    let hits = fts::search(&fts_pool, &parsed.query, 12, scope, limit as i64).await.unwrap_or_default();
                    fts_pool.close().await;
                    hits
                }
                Err(_) => Vec::new(),
            }
        } else {
            Vec::new()
        };
        pool.close().await;
        let weights = &ctx.config().embedding;
        semantic::hybrid_score(&semantic_hits, &fts_hits, weights.dense_weight, weights.sparse_weight, limit)
            .into_iter()
            .map(|h| SemanticHitOut { path: h.path, repo_id: String::new(), start_line: h.line_no, end_line: h.line_no, text: h.snippet, score: h.score })
            .collect()
    } else {
        pool.close().await;
        semantic_hits
            .into_iter()
            .map(|h| SemanticHitOut { path: h.path, repo_id: h.repo_id, start_line: h.start_line, end_line: h.end_line, text: h.text, score: h.cosine as f64 })
            .collect()
    };

    builder.ok(serde_json::json!({ "hits": results }))
}
