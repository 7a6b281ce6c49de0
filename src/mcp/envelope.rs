//! The response envelope every `preflight_*` tool returns (§6), so a caller
//! can branch on `ok` and read `meta`/`error`/`warnings` without per-tool
//! parsing. Grounded on the teacher's `AppError`/`ErrorBody` shape in
//! `server.rs`, generalized from "one error type" to the full envelope the
//! tool surface needs (data, warnings, nextActions, truncation, evidence).

use crate::error::PreflightError;
use crate::models::{EvidencePointer, SCHEMA_VERSION};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub tool: String,
    pub schema_version: u32,
    pub request_id: String,
    pub time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub code: String,
    pub message: String,
    pub recoverable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextAction {
    pub tool: String,
    pub args: Value,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Truncation {
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub ok: bool,
    pub meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub next_actions: Vec<NextAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<Truncation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub evidence: Vec<EvidencePointer>,
}

/// Accumulates the envelope's side channels (warnings/nextActions/evidence)
/// while a tool handler runs, then stamps `meta.timeMs` from the moment it
/// was created. One builder per tool invocation.
pub struct EnvelopeBuilder {
    tool: String,
    started: std::time::Instant,
    request_id: String,
    bundle_id: Option<String>,
    warnings: Vec<Warning>,
    next_actions: Vec<NextAction>,
    truncation: Option<Truncation>,
    evidence: Vec<EvidencePointer>,
}

impl EnvelopeBuilder {
    pub fn new(tool: &str, request_id: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            started: std::time::Instant::now(),
            request_id: request_id.into(),
            bundle_id: None,
            warnings: Vec::new(),
            next_actions: Vec::new(),
            truncation: None,
            evidence: Vec::new(),
        }
    }

    pub fn bundle_id(mut self, id: impl Into<String>) -> Self {
        self.bundle_id = Some(id.into());
        self
    }

    pub fn warn(&mut self, code: &str, message: impl Into<String>, recoverable: bool) {
        self.warnings.push(Warning { code: code.to_string(), message: message.into(), recoverable });
    }

    pub fn next_action(&mut self, tool: &str, args: Value, reason: impl Into<String>) {
        self.next_actions.push(NextAction { tool: tool.to_string(), args, reason: reason.into() });
    }

    pub fn truncation(&mut self, t: Truncation) {
        self.truncation = Some(t);
    }

    pub fn evidence(&mut self, mut pointers: Vec<EvidencePointer>) {
        self.evidence.append(&mut pointers);
    }

    fn meta(&self) -> Meta {
        Meta {
            tool: self.tool.clone(),
            schema_version: SCHEMA_VERSION,
            request_id: self.request_id.clone(),
            time_ms: self.started.elapsed().as_millis() as u64,
            bundle_id: self.bundle_id.clone(),
        }
    }

    pub fn ok<T: Serialize>(self, data: T) -> Envelope {
        Envelope {
            ok: true,
            meta: self.meta(),
            data: serde_json::to_value(data).ok(),
            error: None,
            warnings: self.warnings,
            next_actions: self.next_actions,
            truncation: self.truncation,
            evidence: self.evidence,
        }
    }

    pub fn err(self, error: &PreflightError) -> Envelope {
        Envelope {
            ok: false,
            meta: self.meta(),
            data: None,
            error: Some(ErrorBody {
                code: error.code().as_str().to_string(),
                message: error.message.clone(),
                hint: Some(error.code().hint().to_string()),
                details: error.details.clone(),
            }),
            warnings: self.warnings,
            next_actions: self.next_actions,
            truncation: self.truncation,
            evidence: self.evidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn ok_envelope_carries_schema_version_and_data() {
        let mut builder = EnvelopeBuilder::new("preflight_list_bundles", "req-1");
        builder.warn("partial", "one bundle skipped", true);
        let env = builder.ok(serde_json::json!({"bundles": []}));
        assert!(env.ok);
        assert_eq!(env.meta.schema_version, SCHEMA_VERSION);
        assert_eq!(env.warnings.len(), 1);
    }

    #[test]
    fn err_envelope_carries_hint() {
        let builder = EnvelopeBuilder::new("preflight_read_files", "req-2");
        let error = PreflightError::bundle_not_found("abc");
        let env = builder.err(&error);
        assert!(!env.ok);
        assert_eq!(env.error.as_ref().unwrap().code, ErrorCode::BundleNotFound.as_str());
        assert!(env.error.unwrap().hint.is_some());
    }
}
