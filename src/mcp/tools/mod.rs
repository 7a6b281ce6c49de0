//! Tool handlers, one module per cluster of the spec's §6 tool table.
//! Every handler is a free async fn `(ctx, request_id, params) -> Envelope`
//! so [`crate::mcp::registry`] can dispatch by name without a trait object
//! per tool — the teacher's `Tool` trait needed dynamic dispatch because
//! connectors/tools were user-extensible; our tool set is fixed, so a match
//! on name is simpler and keeps every handler's signature uniform.

pub mod bundles;
pub mod code;
pub mod files;
pub mod search;
pub mod trace;

use crate::error::{ErrorCode, PreflightError};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize tool params into `T`, mapping any shape mismatch to
/// `invalid_input` rather than letting a generic serde error leak through.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, PreflightError> {
    serde_json::from_value(params).map_err(|e| PreflightError::new(ErrorCode::InvalidInput, format!("invalid parameters: {e}")))
}

/// Collect every `(bundle-relative path, language, content)` triple for
/// source files under `root` (optionally narrowed to one repo's `norm/`
/// tree), for the AST-driven tools (call graph, interface summary).
pub fn collect_source_files(bundle_root: &std::path::Path, repo_id: Option<&str>) -> Vec<(String, crate::ast::Language, String)> {
    let scan_root = match repo_id {
        Some(id) => bundle_root.join("repos").join(crate::ingest::sanitize_repo_id(id)).join("norm"),
        None => bundle_root.join("repos"),
    };
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(&scan_root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let abs = entry.path();
        let Some(language) = crate::ast::Language::from_path(abs) else { continue };
        let Ok(rel) = abs.strip_prefix(bundle_root) else { continue };
        let Ok(content) = std::fs::read_to_string(abs) else { continue };
        files.push((rel.to_string_lossy().replace('\\', "/"), language, content));
    }
    files
}
