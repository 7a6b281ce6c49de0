//! `preflight_read_files` (§6): line-range, whole-file, outline, or
//! symbol-addressed reads from a bundle's `norm/` tree.

use super::parse_params;
use crate::ast::{self, Language};
use crate::error::{ErrorCode, PreflightError};
use crate::mcp::context::McpContext;
use crate::mcp::envelope::{Envelope, EnvelopeBuilder};
use crate::models::EvidencePointer;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadFilesParams {
    bundle_id: String,
    files: Vec<FileRequest>,
    #[serde(default)]
    with_line_numbers: bool,
    #[serde(default)]
    outline: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRequest {
    path: String,
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileResult {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outline: Option<Vec<crate::models::OutlineSymbol>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn read_files(ctx: &McpContext, request_id: &str, params: Value) -> Envelope {
    let mut builder = EnvelopeBuilder::new("preflight_read_files", request_id);
    let parsed: ReadFilesParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return builder.err(&e),
    };
    builder = builder.bundle_id(parsed.bundle_id.clone());

    let (_, root, _) = match ctx.resolve_bundle(&parsed.bundle_id).await {
        Ok(v) => v,
        Err(e) => return builder.err(&e),
    };

    let mut results = Vec::with_capacity(parsed.files.len());
    let mut evidence = Vec::new();

    for request in &parsed.files {
        match read_one(&root, request, parsed.with_line_numbers, parsed.outline) {
            Ok((result, pointer)) => {
                if let Some(pointer) = pointer {
                    evidence.push(pointer);
                }
                results.push(result);
            }
            Err(e) => {
                builder.warn(e.code().as_str(), format!("{}: {}", request.path, e.message), true);
                results.push(FileResult { path: request.path.clone(), content: None, outline: None, error: Some(e.message) });
            }
        }
    }

    builder.evidence(evidence);
    builder.ok(serde_json::json!({ "files": results }))
}

fn read_one(
    root: &std::path::Path,
    request: &FileRequest,
    with_line_numbers: bool,
    outline_mode: bool,
) -> Result<(FileResult, Option<EvidencePointer>), PreflightError> {
    let abs = Storage::safe_join(root, &request.path).map_err(|_| PreflightError::invalid_path(&request.path))?;
    if !abs.is_file() {
        return Err(PreflightError::new(ErrorCode::FileNotFound, format!("no such file: {}", request.path)));
    }
    let content = std::fs::read_to_string(&abs).map_err(|e| PreflightError::new(ErrorCode::OperationFailed, e.to_string()))?;

    if outline_mode {
        let language = Language::from_path(std::path::Path::new(&request.path));
        let outline = language.map(|l| ast::outline::extract_outline(l, &content)).unwrap_or_default();
        return Ok((FileResult { path: request.path.clone(), content: None, outline: Some(outline), error: None }, None));
    }

    if let Some(symbol) = &request.symbol {
        let language = Language::from_path(std::path::Path::new(&request.path))
            .ok_or_else(|| PreflightError::new(ErrorCode::InvalidInput, "file extension has no known language for symbol reads"))?;
        let outline = ast::outline::extract_outline(language, &content);
        let found = find_symbol(&outline, symbol)
            .ok_or_else(|| PreflightError::new(ErrorCode::FileNotFound, format!("no symbol named '{symbol}' in {}", request.path)))?;
        let lines: Vec<&str> = content.lines().collect();
        let snippet = slice_lines(&lines, found.start_line, found.end_line, with_line_numbers);
        let pointer = crate::evidence::evidence_for_snippet(&request.path, found.start_line, found.end_line, &snippet);
        return Ok((FileResult { path: request.path.clone(), content: Some(snippet), outline: None, error: None }, Some(pointer)));
    }

    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = match &request.range {
        Some(range) => parse_range(range, lines.len())?,
        None => (1, lines.len() as i64),
    };
    let snippet = slice_lines(&lines, start, end, with_line_numbers);
    let pointer = crate::evidence::evidence_for_snippet(&request.path, start, end, &snippet);
    Ok((FileResult { path: request.path.clone(), content: Some(snippet), outline: None, error: None }, Some(pointer)))
}

fn find_symbol<'a>(symbols: &'a [crate::models::OutlineSymbol], name: &str) -> Option<&'a crate::models::OutlineSymbol> {
    for symbol in symbols {
        if symbol.name == name {
            return Some(symbol);
        }
        if let Some(found) = find_symbol(&symbol.children, name) {
            return Some(found);
        }
    }
    None
}

fn parse_range(range: &str, total_lines: usize) -> Result<(i64, i64), PreflightError> {
    let (start_str, end_str) = range
        .split_once('-')
        .ok_or_else(|| PreflightError::new(ErrorCode::InvalidRange, format!("range must be 'start-end': got '{range}'")))?;
    let start: i64 = start_str.trim().parse().map_err(|_| PreflightError::new(ErrorCode::InvalidRange, "range start is not a number"))?;
    let end: i64 = end_str.trim().parse().map_err(|_| PreflightError::new(ErrorCode::InvalidRange, "range end is not a number"))?;
    if start < 1 || end < start {
        return Err(PreflightError::new(ErrorCode::InvalidRange, "range must satisfy 1 <= start <= end"));
    }
    Ok((start, end.min(total_lines.max(1) as i64)))
}

fn slice_lines(lines: &[&str], start: i64, end: i64, with_line_numbers: bool) -> String {
    let start_idx = (start.max(1) - 1) as usize;
    let end_idx = (end.max(start) as usize).min(lines.len());
    if start_idx >= end_idx {
        return String::new();
    }
    lines[start_idx..end_idx]
        .iter()
        .enumerate()
        .map(|(i, line)| if with_line_numbers { format!("{:>6}  {line}", start_idx + i + 1) } else { line.to_string() })
        .collect::<Vec<_>>()
        .join("\n")
}
