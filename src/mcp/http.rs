//! Streamable-HTTP transport for the MCP bridge (§6), grounded on the
//! teacher's `run_server` in `src/server.rs`: same `tower-http` CORS
//! posture (any origin/method/header, since MCP clients are local tools
//! rather than browsers with a same-origin policy to protect), same
//! `axum::serve` bind-and-run shape. The teacher mounted hand-written
//! `/tools/*` REST routes; here `rmcp`'s own JSON-RPC transport is nested
//! under `/mcp` instead of reimplementing the protocol.

use std::sync::Arc;

use axum::Router;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::tower::{StreamableHttpService, StreamableHttpServerConfig};
use tower_http::cors::{Any, CorsLayer};

use super::bridge::McpBridge;
use super::context::McpContext;
use crate::lifecycle::Lifecycle;

/// Start the MCP server, binding to `config.http.bind` and serving the
/// tool surface at `/mcp`. Runs until the process is terminated.
pub async fn run_server(lifecycle: Arc<Lifecycle>) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", lifecycle.config().http.host, lifecycle.config().http.port);
    let ctx = McpContext::new(lifecycle);

    let service = StreamableHttpService::new(
        move || Ok(McpBridge::new(ctx.clone())),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new().nest_service("/mcp", service).layer(cors);

    tracing::info!(%bind_addr, "MCP server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
