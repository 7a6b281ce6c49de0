//! Evidence & Trace tools: `preflight_trace_upsert`, `preflight_trace_query`,
//! `preflight_evidence_dependency_graph` (§6, §4.10).

use super::parse_params;
use crate::error::{ErrorCode, PreflightError};
use crate::evidence::{self, TraceQuery};
use crate::mcp::context::McpContext;
use crate::mcp::dependency;
use crate::mcp::envelope::{Envelope, EnvelopeBuilder};
use crate::models::TraceEdge;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceUpsertParams {
    bundle_id: String,
    edges: Vec<TraceEdge>,
}

pub async fn trace_upsert(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_trace_upsert", request_id);
    let parsed: TraceUpsertParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    if parsed.edges.is_empty() {
        return builder.err(&PreflightError::new(ErrorCode::InvalidInput, "edges must not be empty"));
    }

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };
    let pool = match evidence::open(&root).await {
        Ok(p) => p,
        Err(e) => return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
    };
    let written = evidence::upsert(&pool, &parsed.edges).await;
    pool.close().await;

    match written {
        Ok(count) => builder.ok(serde_json::json!({ "written": count })),
        Err(e) => builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceQueryParams {
    #[serde(default)]
    bundle_id: Option<String>,
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default)]
    source_id: Option<String>,
    #[serde(default)]
    edge_type: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

pub async fn trace_query(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_trace_query", request_id);
    let parsed: TraceQueryParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    let filter = TraceQuery { source_type: parsed.source_type, source_id: parsed.source_id, edge_type: parsed.edge_type, limit: parsed.limit };

    match &parsed.bundle_id {
        Some(bundle_id) => {
            builder = builder.bundle_id(bundle_id.clone());
            let (_, root, _) = match ctx.resolve_bundle(bundle_id).await {
                Ok(v) => v,
                Err(e) => return builder.err(&e),
            };
            let db_path = root.join(evidence::DB_RELATIVE_PATH);
            if !db_path.is_file() {
                return builder.ok(serde_json::json!({ "edges": [] }));
            }
            let pool = match evidence::open(&root).await {
                Ok(p) => p,
                Err(e) => return builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
            };
            let edges = evidence::query(&pool, &filter).await;
            pool.close().await;
            match edges {
                Ok(edges) => builder.ok(serde_json::json!({ "edges": edges })),
                Err(e) => builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
            }
        }
        None => {
            let fanout_cap = ctx.config().limits.trace_fanout_bundle_cap;
            match evidence::query_across_bundles(ctx.storage(), &filter, fanout_cap).await {
                Ok(result) => {
                    if result.truncated {
                        builder.warn("bundle_fanout_truncated", format!("search limited to the first {fanout_cap} bundles"), true);
                    }
                    let edges: Vec<Value> = result
                        .edges
                        .into_iter()
                        .map(|(bundle_id, edge)| serde_json::json!({ "bundleId": bundle_id, "edge": edge }))
                        .collect();
                    builder.ok(serde_json::json!({ "edges": edges, "bundlesSearched": result.bundles_searched }))
                }
                Err(e) => builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DependencyGraphParams {
    bundle_id: String,
    path: String,
}

pub async fn evidence_dependency_graph(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_evidence_dependency_graph", request_id);
    let parsed: DependencyGraphParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };

    match dependency::build(&root, &parsed.path) {
        Ok(graph) => builder.ok(graph),
        Err(e) => builder.err(&PreflightError::new(ErrorCode::OperationFailed, e.to_string())),
    }
}
