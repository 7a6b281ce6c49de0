//! # PreflightBundle
//!
//! Builds and serves evidence-grounded knowledge-base bundles for AI coding
//! assistants: immutable, content-addressed snapshots of git repos, local
//! directories, PDFs, and web docs, with hybrid (keyword + semantic) search
//! and an MCP tool surface.
//!
//! ## Modules
//!
//! - [`preflight_bundle::config`] — TOML + env configuration
//! - [`preflight_bundle::storage`] — multi-root mirrored bundle storage
//! - [`preflight_bundle::lifecycle`] — bundle create/update/repair/delete
//! - [`preflight_bundle::mcp`] — the `preflight_*` tool surface and its
//!   streamable-HTTP transport
//!
//! Every CLI subcommand below dispatches through the same
//! [`preflight_bundle::mcp::registry::call`] path the MCP server uses, so
//! the CLI and the server never drift in behavior.

use clap::{Parser, Subcommand};
use preflight_bundle::config;
use preflight_bundle::lifecycle::Lifecycle;
use preflight_bundle::mcp::{registry, McpContext};
use preflight_bundle::storage::Storage;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "preflight", about = "PreflightBundle — evidence-grounded knowledge bundles for AI coding assistants", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/preflight.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage bundles
    Bundle {
        #[command(subcommand)]
        action: BundleAction,
    },

    /// Full-text search within a bundle
    Search {
        bundle_id: String,
        query: String,
        #[arg(long, default_value = "all")]
        scope: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Dense-vector (optionally hybrid) semantic search within a bundle
    SemanticSearch {
        bundle_id: String,
        query: String,
        #[arg(long, default_value = "all")]
        scope: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        hybrid: bool,
    },

    /// Query evidence trace edges
    Trace {
        #[command(subcommand)]
        action: TraceAction,
    },

    /// Look up the progress of a long-running bundle operation
    TaskStatus { task_id: String },

    /// Sweep abandoned work-in-progress bundles past the grace period
    CleanupOrphans,

    /// Start a server
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum BundleAction {
    /// Create a bundle from repos, libraries, and/or topics
    Create {
        /// `kind:repo[@reference]`, e.g. `github:rust-lang/rust@stable`
        #[arg(long = "repo")]
        repos: Vec<String>,
        #[arg(long = "library")]
        libraries: Vec<String>,
        #[arg(long = "topic")]
        topics: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long, default_value = "error")]
        if_exists: String,
    },
    /// Re-fingerprint a bundle's sources and re-ingest whatever changed
    Update {
        bundle_id: String,
        #[arg(long)]
        check_only: bool,
        #[arg(long)]
        force: bool,
    },
    /// Validate or rebuild a bundle's derived artifacts
    Repair {
        bundle_id: String,
        #[arg(long, default_value = "validate")]
        mode: String,
    },
    /// Schedule a bundle for deletion
    Delete { bundle_id: String },
    /// List every known bundle
    List,
}

#[derive(Subcommand)]
enum TraceAction {
    /// Query trace edges, within one bundle or fanned out across every bundle
    Query {
        #[arg(long)]
        bundle_id: Option<String>,
        #[arg(long)]
        source_type: Option<String>,
        #[arg(long)]
        source_id: Option<String>,
        #[arg(long)]
        edge_type: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Start the MCP tool server
    Mcp,
}

fn parse_repo(raw: &str) -> Value {
    let (kind, rest) = raw.split_once(':').unwrap_or(("github", raw));
    let (repo, reference) = match rest.split_once('@') {
        Some((r, ver)) => (r, Some(ver)),
        None => (rest, None),
    };
    json!({ "kind": kind, "repo": repo, "reference": reference })
}

fn request_id() -> String {
    Uuid::new_v4().to_string()
}

async fn dispatch(ctx: &McpContext, tool: &str, params: Value) -> anyhow::Result<()> {
    let envelope = registry::call(ctx, tool, &request_id(), params).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if !envelope.ok {
        anyhow::bail!("{} failed", tool);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).json().init();

    let cli = Cli::parse();
    let cfg = Arc::new(config::load_config(&cli.config)?);
    let storage = Storage::new(cfg.storage.dirs.clone());
    let lifecycle = Arc::new(Lifecycle::new(cfg, storage));
    let ctx = McpContext::new(lifecycle.clone());

    match cli.command {
        Commands::Bundle { action } => match action {
            BundleAction::Create { repos, libraries, topics, tags, display_name, if_exists } => {
                let params = json!({
                    "repos": repos.iter().map(|r| parse_repo(r)).collect::<Vec<_>>(),
                    "libraries": libraries,
                    "topics": topics,
                    "tags": tags,
                    "displayName": display_name,
                    "ifExists": if_exists,
                });
                dispatch(&ctx, "preflight_create_bundle", params).await?;
            }
            BundleAction::Update { bundle_id, check_only, force } => {
                dispatch(&ctx, "preflight_update_bundle", json!({ "bundleId": bundle_id, "checkOnly": check_only, "force": force })).await?;
            }
            BundleAction::Repair { bundle_id, mode } => {
                dispatch(&ctx, "preflight_repair_bundle", json!({ "bundleId": bundle_id, "mode": mode })).await?;
            }
            BundleAction::Delete { bundle_id } => {
                dispatch(&ctx, "preflight_delete_bundle", json!({ "bundleId": bundle_id })).await?;
            }
            BundleAction::List => {
                dispatch(&ctx, "preflight_list_bundles", json!({})).await?;
            }
        },
        Commands::Search { bundle_id, query, scope, limit } => {
            dispatch(&ctx, "preflight_search_bundle", json!({ "bundleId": bundle_id, "query": query, "scope": scope, "limit": limit })).await?;
        }
        Commands::SemanticSearch { bundle_id, query, scope, limit, hybrid } => {
            dispatch(&ctx, "preflight_semantic_search", json!({ "bundleId": bundle_id, "query": query, "scope": scope, "limit": limit, "hybrid": hybrid })).await?;
        }
        Commands::Trace { action } => match action {
            TraceAction::Query { bundle_id, source_type, source_id, edge_type, limit } => {
                dispatch(
                    &ctx,
                    "preflight_trace_query",
                    json!({ "bundleId": bundle_id, "sourceType": source_type, "sourceId": source_id, "edgeType": edge_type, "limit": limit }),
                )
                .await?;
            }
        },
        Commands::TaskStatus { task_id } => {
            dispatch(&ctx, "preflight_get_task_status", json!({ "taskId": task_id })).await?;
        }
        Commands::CleanupOrphans => {
            dispatch(&ctx, "preflight_cleanup_orphans", json!({})).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Mcp => {
                preflight_bundle::mcp::http::run_server(lifecycle).await?;
            }
        },
    }

    Ok(())
}
