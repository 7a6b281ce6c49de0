//! JSON-RPC bridge from the `preflight_*` tool registry to `rmcp`'s
//! `ServerHandler`, grounded on the teacher's `McpBridge` in
//! `crates/context-harness/src/mcp.rs`. That bridge also exposed agents as
//! MCP prompts; this one only has tools, so `list_prompts`/`get_prompt`
//! are dropped rather than stubbed.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use uuid::Uuid;

use super::context::McpContext;
use super::registry;

#[derive(Clone)]
pub struct McpBridge {
    ctx: McpContext,
}

impl McpBridge {
    pub fn new(ctx: McpContext) -> Self {
        Self { ctx }
    }

    fn to_mcp_tool(descriptor: &registry::ToolDescriptor) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> = match &descriptor.input_schema {
            serde_json::Value::Object(map) => Arc::new(map.clone()),
            _ => Arc::new(serde_json::Map::new()),
        };
        Tool {
            name: Cow::Owned(descriptor.name.to_string()),
            title: None,
            description: Some(Cow::Owned(descriptor.description.to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(descriptor.name != "preflight_create_bundle" && !descriptor.name.contains("delete") && !descriptor.name.contains("update") && !descriptor.name.contains("repair") && !descriptor.name.contains("upsert") && !descriptor.name.contains("cleanup"))),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "preflight-bundle".to_string(),
                title: Some("PreflightBundle".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "PreflightBundle — evidence-grounded knowledge bundles for AI coding assistants. \
                 Call preflight_create_bundle to build a bundle from repos/libraries/topics, then \
                 preflight_search_bundle or preflight_semantic_search to query it, and \
                 preflight_read_files/preflight_extract_code to pull exact, evidence-stamped source."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = registry::descriptors().iter().map(Self::to_mcp_tool).collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        registry::descriptors().iter().find(|d| d.name == name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if !registry::descriptors().iter().any(|d| d.name == request.name) {
            return Err(McpError::new(ErrorCode::METHOD_NOT_FOUND, format!("no tool registered with name: {}", request.name), None));
        }

        let params = request.arguments.map(serde_json::Value::Object).unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
        let request_id = Uuid::new_v4().to_string();
        let envelope = registry::call(&self.ctx, &request.name, &request_id, params).await;

        let text = serde_json::to_string_pretty(&envelope).unwrap_or_default();
        if envelope.ok {
            Ok(CallToolResult::success(vec![Content::text(text)]))
        } else {
            Ok(CallToolResult::error(vec![Content::text(text)]))
        }
    }
}
