//! The fixed table of `preflight_*` tools (§6): name, description, JSON
//! Schema for parameters, and the dispatch from name to handler. Grounded
//! on the teacher's `ToolRegistry`/`Tool` trait in `src/traits.rs`, which
//! this generalizes from a dynamic registry of boxed trait objects to a
//! `match` over a closed tool set — there is no plugin mechanism here, so
//! dynamic dispatch buys nothing but indirection.

use super::context::McpContext;
use super::envelope::Envelope;
use super::tools;
use serde_json::{json, Value};

pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Every tool this server exposes, in the order they appear in the spec's
/// tool table. [`crate::mcp::bridge::McpBridge`] maps these to `rmcp::model::Tool`
/// descriptors for `list_tools`/`get_tool`.
pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "preflight_list_bundles",
            description: "List every bundle known to this server, with their manifests.",
            input_schema: schema(json!({}), &[]),
        },
        ToolDescriptor {
            name: "preflight_create_bundle",
            description: "Create a new bundle from one or more git repos, library names, or research topics.",
            input_schema: schema(
                json!({
                    "repos": { "type": "array", "items": { "type": "object" } },
                    "libraries": { "type": "array", "items": { "type": "string" } },
                    "topics": { "type": "array", "items": { "type": "string" } },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "displayName": { "type": "string" },
                    "ifExists": { "type": "string", "enum": ["error", "returnExisting", "updateExisting", "createNew"] },
                }),
                &[],
            ),
        },
        ToolDescriptor {
            name: "preflight_update_bundle",
            description: "Re-fingerprint a bundle's sources and re-ingest whatever changed.",
            input_schema: schema(json!({ "bundleId": { "type": "string" }, "checkOnly": { "type": "boolean" }, "force": { "type": "boolean" } }), &["bundleId"]),
        },
        ToolDescriptor {
            name: "preflight_repair_bundle",
            description: "Validate or rebuild a bundle's derived artifacts (indexes, analysis) without re-ingesting sources.",
            input_schema: schema(json!({ "bundleId": { "type": "string" }, "mode": { "type": "string", "enum": ["validate", "repair"] } }), &["bundleId"]),
        },
        ToolDescriptor {
            name: "preflight_delete_bundle",
            description: "Schedule a bundle for deletion.",
            input_schema: schema(json!({ "bundleId": { "type": "string" } }), &["bundleId"]),
        },
        ToolDescriptor {
            name: "preflight_read_files",
            description: "Read one or more files from a bundle, by line range, whole-file, outline, or symbol name.",
            input_schema: schema(
                json!({
                    "bundleId": { "type": "string" },
                    "files": { "type": "array", "items": { "type": "object" } },
                    "withLineNumbers": { "type": "boolean" },
                    "outline": { "type": "boolean" },
                }),
                &["bundleId", "files"],
            ),
        },
        ToolDescriptor {
            name: "preflight_search_bundle",
            description: "Full-text search within one bundle's docs and/or code.",
            input_schema: schema(
                json!({
                    "bundleId": { "type": "string" },
                    "query": { "type": "string" },
                    "scope": { "type": "string", "enum": ["docs", "code", "all"] },
                    "limit": { "type": "integer" },
                    "cursor": { "type": "string" },
                }),
                &["bundleId", "query"],
            ),
        },
        ToolDescriptor {
            name: "preflight_search_by_tags",
            description: "Full-text search across every bundle carrying any of the given tags.",
            input_schema: schema(
                json!({
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "query": { "type": "string" },
                    "scope": { "type": "string", "enum": ["docs", "code", "all"] },
                    "limit": { "type": "integer" },
                    "cursor": { "type": "string" },
                }),
                &["tags", "query"],
            ),
        },
        ToolDescriptor {
            name: "preflight_search_and_read",
            description: "Search a bundle and return each hit with surrounding source context, pre-read.",
            input_schema: schema(
                json!({
                    "bundleId": { "type": "string" },
                    "query": { "type": "string" },
                    "scope": { "type": "string", "enum": ["docs", "code", "all"] },
                    "limit": { "type": "integer" },
                    "contextLines": { "type": "integer" },
                }),
                &["bundleId", "query"],
            ),
        },
        ToolDescriptor {
            name: "preflight_semantic_search",
            description: "Dense-vector (optionally hybrid) semantic search within a bundle.",
            input_schema: schema(
                json!({
                    "bundleId": { "type": "string" },
                    "query": { "type": "string" },
                    "scope": { "type": "string", "enum": ["docs", "code", "all"] },
                    "repoId": { "type": "string" },
                    "limit": { "type": "integer" },
                    "hybrid": { "type": "boolean" },
                }),
                &["bundleId", "query"],
            ),
        },
        ToolDescriptor {
            name: "preflight_trace_upsert",
            description: "Upsert a batch of evidence-grounded trace edges into a bundle's trace store.",
            input_schema: schema(json!({ "bundleId": { "type": "string" }, "edges": { "type": "array", "items": { "type": "object" } } }), &["bundleId", "edges"]),
        },
        ToolDescriptor {
            name: "preflight_trace_query",
            description: "Query trace edges, within one bundle or fanned out across every bundle.",
            input_schema: schema(
                json!({
                    "bundleId": { "type": "string" },
                    "sourceType": { "type": "string" },
                    "sourceId": { "type": "string" },
                    "edgeType": { "type": "string" },
                    "limit": { "type": "integer" },
                }),
                &[],
            ),
        },
        ToolDescriptor {
            name: "preflight_evidence_dependency_graph",
            description: "Derive a file's direct dependency edges (imports in, imports out) within its repo.",
            input_schema: schema(json!({ "bundleId": { "type": "string" }, "path": { "type": "string" } }), &["bundleId", "path"]),
        },
        ToolDescriptor {
            name: "preflight_build_call_graph",
            description: "Build and return the full call graph for a bundle (or one repo within it).",
            input_schema: schema(json!({ "bundleId": { "type": "string" }, "repoId": { "type": "string" } }), &["bundleId"]),
        },
        ToolDescriptor {
            name: "preflight_query_call_graph",
            description: "Run one call-graph query (getDefinition, getIncomingCalls, getOutgoingCalls, findReferences, prepareCallHierarchy, getFileSymbols, detectCycles).",
            input_schema: schema(
                json!({
                    "bundleId": { "type": "string" },
                    "repoId": { "type": "string" },
                    "query": {
                        "type": "string",
                        "enum": ["getDefinition", "getFileSymbols", "getIncomingCalls", "getOutgoingCalls", "findReferences", "prepareCallHierarchy", "detectCycles"],
                    },
                    "symbolId": { "type": "string" },
                }),
                &["bundleId", "query"],
            ),
        },
        ToolDescriptor {
            name: "preflight_extract_code",
            description: "Extract an exact source snippet (with evidence pointer) from a bundle file.",
            input_schema: schema(json!({ "bundleId": { "type": "string" }, "path": { "type": "string" }, "startLine": { "type": "integer" }, "endLine": { "type": "integer" } }), &["bundleId", "path"]),
        },
        ToolDescriptor {
            name: "preflight_interface_summary",
            description: "Summarize every file's exported symbols and extension points (traits, interfaces, abstract classes) in a bundle.",
            input_schema: schema(json!({ "bundleId": { "type": "string" }, "repoId": { "type": "string" } }), &["bundleId"]),
        },
        ToolDescriptor {
            name: "preflight_cleanup_orphans",
            description: "Sweep the storage roots' tmp directories for abandoned work-in-progress bundles past the grace period.",
            input_schema: schema(json!({}), &[]),
        },
        ToolDescriptor {
            name: "preflight_get_task_status",
            description: "Look up the progress of a long-running bundle operation by its task id.",
            input_schema: schema(json!({ "taskId": { "type": "string" } }), &["taskId"]),
        },
    ]
}

/// Dispatch a tool call by name. Unknown names are the caller's
/// responsibility to avoid — [`super::bridge::McpBridge::call_tool`] checks
/// against [`descriptors`] first and turns a miss into a JSON-RPC method-not-found.
pub async fn call(ctx: &McpContext, name: &str, request_id: &str, params: Value) -> Envelope {
    match name {
        "preflight_list_bundles" => tools::bundles::list_bundles(ctx, request_id, params).await,
        "preflight_create_bundle" => tools::bundles::create_bundle(ctx, request_id, params).await,
        "preflight_update_bundle" => tools::bundles::update_bundle(ctx, request_id, params).await,
        "preflight_repair_bundle" => tools::bundles::repair_bundle(ctx, request_id, params).await,
        "preflight_delete_bundle" => tools::bundles::delete_bundle(ctx, request_id, params).await,
        "preflight_read_files" => tools::files::read_files(ctx, request_id, params).await,
        "preflight_search_bundle" => tools::search::search_bundle(ctx, request_id, params).await,
        "preflight_search_by_tags" => tools::search::search_by_tags(ctx, request_id, params).await,
        "preflight_search_and_read" => tools::search::search_and_read(ctx, request_id, params).await,
        "preflight_semantic_search" => tools::search::semantic_search(ctx, request_id, params).await,
        "preflight_trace_upsert" => tools::trace::trace_upsert(ctx, request_id, params).await,
        "preflight_trace_query" => tools::trace::trace_query(ctx, request_id, params).await,
        "preflight_evidence_dependency_graph" => tools::trace::evidence_dependency_graph(ctx, request_id, params).await,
        "preflight_build_call_graph" => tools::code::build_call_graph(ctx, request_id, params).await,
        "preflight_query_call_graph" => tools::code::query_call_graph(ctx, request_id, params).await,
        "preflight_extract_code" => tools::code::extract_code(ctx, request_id, params).await,
        "preflight_interface_summary" => tools::code::interface_summary(ctx, request_id, params).await,
        "preflight_cleanup_orphans" => tools::bundles::cleanup_orphans(ctx, request_id, params).await,
        "preflight_get_task_status" => tools::bundles::get_task_status(ctx, request_id, params).await,
        other => {
            let builder = super::envelope::EnvelopeBuilder::new(other, request_id);
            builder.err(&crate::error::PreflightError::new(crate::error::ErrorCode::InvalidInput, format!("unknown tool: {other}")))
        }
    }
}
