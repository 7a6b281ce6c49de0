//! AST Core tools: `preflight_build_call_graph`, `preflight_query_call_graph`,
//! `preflight_extract_code`, `preflight_interface_summary` (§6, §4.8).

use super::{collect_source_files, parse_params};
use crate::ast::callgraph::{CallGraph, SymbolId};
use crate::ast;
use crate::error::{ErrorCode, PreflightError};
use crate::mcp::context::McpContext;
use crate::mcp::envelope::{Envelope, EnvelopeBuilder};
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildCallGraphParams {
    bundle_id: String,
    #[serde(default)]
    repo_id: Option<String>,
}

pub async fn build_call_graph(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_build_call_graph", request_id);
    let parsed: BuildCallGraphParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };
    let files = collect_source_files(&root, parsed.repo_id.as_deref());
    if files.is_empty() {
        builder.warn("no_source_files", "no source files with a known language were found", true);
    }
    let graph = CallGraph::build(&files);
    builder.ok(graph.snapshot())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryCallGraphParams {
    bundle_id: String,
    #[serde(default)]
    repo_id: Option<String>,
    query: QueryKind,
    #[serde(default)]
    symbol_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum QueryKind {
    GetDefinition,
    GetFileSymbols,
    GetIncomingCalls,
    GetOutgoingCalls,
    FindReferences,
    PrepareCallHierarchy,
    DetectCycles,
}

pub async fn query_call_graph(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_query_call_graph", request_id);
    let parsed: QueryCallGraphParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    if parsed.query != QueryKind::DetectCycles && parsed.query != QueryKind::GetFileSymbols && parsed.symbol_id.is_none() {
        return builder.err(&PreflightError::new(ErrorCode::InvalidInput, "symbolId is required for this query"));
    }

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };
    let files = collect_source_files(&root, parsed.repo_id.as_deref());
    let graph = CallGraph::build(&files);

    match parsed.query {
        QueryKind::GetFileSymbols => {
            let Some(symbol_id) = &parsed.symbol_id else {
                return builder.err(&PreflightError::new(ErrorCode::InvalidInput, "symbolId must name a file for getFileSymbols"));
            };
            builder.ok(serde_json::json!({ "symbols": graph.get_file_symbols(symbol_id) }))
        }
        QueryKind::DetectCycles => builder.ok(serde_json::json!({ "cycles": graph.detect_cycles() })),
        QueryKind::GetDefinition => {
            let id = SymbolId(parsed.symbol_id.unwrap());
            match graph.get_definition(&id) {
                Some(symbol) => builder.ok(symbol),
                None => builder.err(&PreflightError::new(ErrorCode::FileNotFound, format!("no symbol '{}' in the call graph", id.0))),
            }
        }
        QueryKind::GetIncomingCalls => {
            let id = SymbolId(parsed.symbol_id.unwrap());
            builder.ok(serde_json::json!({ "callers": graph.get_incoming_calls(&id) }))
        }
        QueryKind::GetOutgoingCalls => {
            let id = SymbolId(parsed.symbol_id.unwrap());
            builder.ok(serde_json::json!({ "callees": graph.get_outgoing_calls(&id) }))
        }
        QueryKind::FindReferences => {
            let id = SymbolId(parsed.symbol_id.unwrap());
            builder.ok(serde_json::json!({ "references": graph.find_references(&id) }))
        }
        QueryKind::PrepareCallHierarchy => {
            let id = SymbolId(parsed.symbol_id.clone().unwrap());
            match graph.prepare_call_hierarchy(&id) {
                Some(item) => builder.ok(serde_json::json!({
                    "symbol": item.symbol,
                    "incoming": item.incoming,
                    "outgoing": item.outgoing,
                })),
                None => builder.err(&PreflightError::new(ErrorCode::FileNotFound, format!("no symbol '{}' in the call graph", id.0))),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractCodeParams {
    bundle_id: String,
    path: String,
    #[serde(default)]
    start_line: Option<i64>,
    #[serde(default)]
    end_line: Option<i64>,
}

pub async fn extract_code(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_extract_code", request_id);
    let parsed: ExtractCodeParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };
    let abs = match Storage::safe_join(&root, &parsed.path) {
        Ok(p) => p,
        Err(_) => return builder.err(&PreflightError::invalid_path(&parsed.path)),
    };
    let content = match std::fs::read_to_string(&abs) {
        Ok(c) => c,
        Err(_) => return builder.err(&PreflightError::new(ErrorCode::FileNotFound, format!("no such file: {}", parsed.path))),
    };
    let lines: Vec<&str> = content.lines().collect();
    let start = parsed.start_line.unwrap_or(1).max(1);
    let end = parsed.end_line.unwrap_or(lines.len() as i64).min(lines.len().max(1) as i64).max(start);
    let start_idx = (start - 1) as usize;
    let end_idx = (end as usize).min(lines.len());
    let snippet = if start_idx < end_idx { lines[start_idx..end_idx].join("\n") } else { String::new() };

    let pointer = crate::evidence::evidence_for_snippet(&parsed.path, start, end, &snippet);
    builder.evidence(vec![pointer]);
    builder.ok(serde_json::json!({ "text": snippet }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterfaceSummaryParams {
    bundle_id: String,
    #[serde(default)]
    repo_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileInterface {
    path: String,
    exports: Vec<String>,
    extension_points: Vec<crate::models::ExtensionPoint>,
}

pub async fn interface_summary(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_interface_summary", request_id);
    let parsed: InterfaceSummaryParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };
    let files = collect_source_files(&root, parsed.repo_id.as_deref());

    let mut summaries = Vec::new();
    for (path, language, content) in &files {
        let exports = ast::outline::extract_exports(*language, content);
        let extension_points = ast::outline::extract_extension_points(*language, content);
        if exports.is_empty() && extension_points.is_empty() {
            continue;
        }
        summaries.push(FileInterface { path: path.clone(), exports, extension_points });
    }

    if files.is_empty() {
        builder.warn("no_source_files", "no source files with a known language were found", true);
    }
    builder.ok(serde_json::json!({ "files": summaries }))
}
