//! Canonical error taxonomy for anything that crosses the MCP tool boundary.
//!
//! Internal glue code uses `anyhow::Result` freely (see every other module);
//! [`PreflightError`] is reserved for outcomes a tool caller must be able to
//! branch on by code, per the response envelope's `error.code` field.

use serde::Serialize;
use thiserror::Error;

/// Canonical error codes. Kept as a string-valued enum so `code()` round
/// trips through JSON exactly as written in the tool responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BundleNotFound,
    BundleIncomplete,
    BundleExists,
    FileNotFound,
    InvalidPath,
    PermissionDenied,
    IndexMissing,
    IndexCorrupt,
    InvalidInput,
    InvalidRange,
    InvalidCursor,
    QuotaExceeded,
    Timeout,
    Cancelled,
    OperationFailed,
    DeprecatedParam,
    Unknown,
}

impl ErrorCode {
    /// Fixed recovery hint per code, per spec §6/§7.
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorCode::BundleNotFound => "call preflight_list_bundles to see available bundles",
            ErrorCode::BundleIncomplete => "call preflight_repair_bundle to regenerate missing artifacts",
            ErrorCode::BundleExists => "pass ifExists=returnExisting or updateExisting, or use the returned bundleId",
            ErrorCode::FileNotFound => "verify the path with preflight_read_files outline mode or preflight_search_bundle",
            ErrorCode::InvalidPath => "paths must be bundle-relative and may not escape the bundle root",
            ErrorCode::PermissionDenied => "check storage root permissions",
            ErrorCode::IndexMissing => "call repair_bundle",
            ErrorCode::IndexCorrupt => "call preflight_repair_bundle with mode=repair",
            ErrorCode::InvalidInput => "check the tool's input schema and retry",
            ErrorCode::InvalidRange => "line ranges must be 1-indexed and startLine <= endLine",
            ErrorCode::InvalidCursor => "cursors are opaque and tool-bound; call the tool again without a cursor to restart pagination",
            ErrorCode::QuotaExceeded => "reduce limit or narrow the query scope",
            ErrorCode::Timeout => "retry with a longer timeout or narrower scope",
            ErrorCode::Cancelled => "the operation was cancelled before completion",
            ErrorCode::OperationFailed => "see details for the underlying cause",
            ErrorCode::DeprecatedParam => "this parameter has been removed; see the tool's current schema",
            ErrorCode::Unknown => "an unexpected error occurred",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BundleNotFound => "bundle_not_found",
            ErrorCode::BundleIncomplete => "bundle_incomplete",
            ErrorCode::BundleExists => "bundle_exists",
            ErrorCode::FileNotFound => "file_not_found",
            ErrorCode::InvalidPath => "invalid_path",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::IndexMissing => "index_missing",
            ErrorCode::IndexCorrupt => "index_corrupt",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::InvalidRange => "invalid_range",
            ErrorCode::InvalidCursor => "invalid_cursor",
            ErrorCode::QuotaExceeded => "quota_exceeded",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::OperationFailed => "operation_failed",
            ErrorCode::DeprecatedParam => "deprecated_param",
            ErrorCode::Unknown => "unknown",
        }
    }
}

/// A typed error carrying a canonical code, message, optional hint override,
/// and optional structured details for the response envelope's `error` field.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct PreflightError {
    pub code_inner: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

// Avoid a field literally named `code` colliding with the Display impl above.
impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl PreflightError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code_inner: code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code_inner
    }

    pub fn bundle_not_found(bundle_id: &str) -> Self {
        Self::new(
            ErrorCode::BundleNotFound,
            format!("no bundle with id or fingerprint '{bundle_id}'"),
        )
    }

    pub fn invalid_path(rel: &str) -> Self {
        Self::new(ErrorCode::InvalidPath, format!("path escapes bundle root: '{rel}'"))
    }
}

pub type Result<T> = std::result::Result<T, PreflightError>;
