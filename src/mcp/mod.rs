//! MCP tool surface (§6): a ~20-tool JSON-RPC surface served over
//! streamable HTTP, every tool returning the same response envelope.
//!
//! Grounded on the teacher's `crates/context-harness/src/mcp.rs`
//! `ServerHandler` bridge (list_tools/get_tool/call_tool, tool descriptors)
//! and the top-level `src/traits.rs` `Tool`/`ToolContext` shapes — here
//! generalized from a dynamic, user-extensible tool registry to a fixed
//! match-on-name dispatch, since this surface's tool set is closed.

pub mod bridge;
pub mod context;
pub mod cursor;
pub mod dependency;
pub mod envelope;
pub mod http;
pub mod registry;
pub mod tools;

pub use bridge::McpBridge;
pub use context::McpContext;
pub use envelope::Envelope;
