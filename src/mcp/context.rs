//! Shared state every tool handler runs against, analogous to the teacher's
//! `ToolContext` in `traits.rs` — there it wraps `Arc<Config>` and delegates
//! to `search_documents`/`get_document`/`get_sources`; here it wraps the
//! lifecycle/storage pair every `preflight_*` tool needs.

use crate::config::Config;
use crate::error::PreflightError;
use crate::lifecycle::Lifecycle;
use crate::models::Manifest;
use crate::storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct McpContext {
    pub lifecycle: Arc<Lifecycle>,
}

impl McpContext {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self { lifecycle }
    }

    pub fn config(&self) -> &Arc<Config> {
        self.lifecycle.config()
    }

    pub fn storage(&self) -> &Storage {
        self.lifecycle.storage()
    }

    /// Resolve `bundle_id_or_fp` and return both its manifest and the
    /// on-disk root, the shape almost every file/search/trace tool needs.
    pub async fn resolve_bundle(&self, bundle_id_or_fp: &str) -> Result<(String, PathBuf, Manifest), PreflightError> {
        let (bundle_id, manifest) = self.lifecycle.resolve_bundle(bundle_id_or_fp).await?;
        let root = self
            .storage()
            .resolve_bundle_root(&bundle_id)
            .ok_or_else(|| PreflightError::bundle_not_found(bundle_id_or_fp))?;
        Ok((bundle_id, root, manifest))
    }
}
