//! UTF-8/LF normalization of a raw file into the `norm/` tree (§4.3).
//!
//! Every file copied into `raw/` passes through here before it is visible
//! to PS/CB/FTS/SEM/AC. Decoding is lossy (undecodable bytes become U+FFFD)
//! because the norm tree must always be valid UTF-8.

use crate::config::{ParserConfig, TimeoutsConfig};
use crate::parser::{self, ParseOpts};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

pub struct NormalizeOutcome {
    pub sha256: String,
    pub bytes: u64,
    pub warnings: Vec<String>,
}

/// Normalize `raw_path` into `norm_path`. Returns `Ok(None)` (and writes
/// nothing) if the raw file exceeds `max_file_bytes` — the caller records a
/// skipped note per §4.3.
///
/// PDF/Office/HTML files are routed through [`parser::parser_for`] first and
/// the rendered markdown is normalized as if it were the raw text; every
/// other extension takes the lossy-UTF8 path unchanged.
pub fn normalize_file(
    raw_path: &Path,
    norm_path: &Path,
    max_file_bytes: u64,
    parser_cfg: &ParserConfig,
    timeouts: &TimeoutsConfig,
) -> Result<Option<NormalizeOutcome>> {
    let raw_bytes = std::fs::read(raw_path)
        .with_context(|| format!("failed to read {}", raw_path.display()))?;
    if raw_bytes.len() as u64 > max_file_bytes {
        return Ok(None);
    }

    let mut warnings = Vec::new();
    let content: String = if let Some(document_parser) = parser::parser_for(raw_path) {
        let opts = ParseOpts { parser: parser_cfg, timeouts };
        match document_parser.parse(raw_path, &raw_bytes, &opts) {
            Ok(mut result) => {
                if result.full_text.is_none() {
                    result.render_markdown();
                }
                warnings.extend(result.warnings);
                warnings.extend(result.errors.iter().map(|e| format!("parse error: {e}")));
                result.full_text.unwrap_or_default()
            }
            Err(e) => {
                warnings.push(format!("document parser failed, falling back to raw text: {e}"));
                lossy_strip_bom(&raw_bytes)
            }
        }
    } else {
        lossy_strip_bom(&raw_bytes)
    };
    let normalized = to_lf(&content);

    if let Some(parent) = norm_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(norm_path, normalized.as_bytes())
        .with_context(|| format!("failed to write {}", norm_path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Ok(Some(NormalizeOutcome {
        sha256: format!("{:x}", hasher.finalize()),
        bytes: normalized.len() as u64,
        warnings,
    }))
}

fn lossy_strip_bom(raw_bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw_bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

fn to_lf(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                continue;
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn normalizes_crlf_and_bom() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("a.txt");
        std::fs::write(&raw, "\u{feff}line1\r\nline2\rline3\n").unwrap();
        let norm = dir.path().join("norm/a.txt");
        let parser_cfg = ParserConfig::default();
        let timeouts = TimeoutsConfig::default();
        let outcome = normalize_file(&raw, &norm, 1024, &parser_cfg, &timeouts).unwrap().unwrap();
        let written = std::fs::read_to_string(&norm).unwrap();
        assert_eq!(written, "line1\nline2\nline3\n");
        assert_eq!(outcome.bytes, written.len() as u64);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn skips_oversized_files() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("big.txt");
        std::fs::write(&raw, vec![b'a'; 100]).unwrap();
        let norm = dir.path().join("norm/big.txt");
        let parser_cfg = ParserConfig::default();
        let timeouts = TimeoutsConfig::default();
        let outcome = normalize_file(&raw, &norm, 10, &parser_cfg, &timeouts).unwrap();
        assert!(outcome.is_none());
        assert!(!norm.exists());
    }

    #[test]
    fn routes_pdf_extension_through_the_parser_subsystem() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("a.pdf");
        std::fs::write(&raw, b"not a real pdf").unwrap();
        let norm = dir.path().join("norm/a.pdf");
        let parser_cfg = ParserConfig::default();
        let timeouts = TimeoutsConfig::default();
        let outcome = normalize_file(&raw, &norm, 1024, &parser_cfg, &timeouts).unwrap().unwrap();
        assert!(!outcome.warnings.is_empty());
    }
}
