//! Native PDF extraction plus the page-level fallback chain (§4.4).
//!
//! Native extraction is the teacher's `extract.rs::extract_pdf` verbatim
//! (`pdf_extract::extract_text_from_mem`). `pdf_extract` joins pages with a
//! form-feed (`\x0c`); that's the only per-page signal it exposes, and it's
//! exactly what the fallback trigger needs — pages whose native text falls
//! under `minPageTextChars` are re-offered to each configured fallback
//! collaborator in order.

use super::{DocumentParser, NotConfiguredStrategy, PageFallbackStrategy, ParseOpts, ParseResult, ParsedContent};
use anyhow::Result;
use std::path::Path;

pub struct PdfParser {
    vlm: Box<dyn PageFallbackStrategy>,
    ocr: Box<dyn PageFallbackStrategy>,
}

impl Default for PdfParser {
    fn default() -> Self {
        Self { vlm: Box::new(NotConfiguredStrategy("vlm")), ocr: Box::new(NotConfiguredStrategy("ocr")) }
    }
}

impl PdfParser {
    pub fn with_strategies(vlm: Box<dyn PageFallbackStrategy>, ocr: Box<dyn PageFallbackStrategy>) -> Self {
        Self { vlm, ocr }
    }
}

impl DocumentParser for PdfParser {
    fn can_parse(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("pdf")).unwrap_or(false)
    }

    fn parse(&self, _path: &Path, bytes: &[u8], opts: &ParseOpts) -> Result<ParseResult> {
        let mut result = ParseResult::default();

        let native = match pdf_extract::extract_text_from_mem(bytes) {
            Ok(text) => text,
            Err(e) => {
                result.errors.push(format!("native PDF extraction failed: {e}"));
                return Ok(result);
            }
        };

        let pages: Vec<&str> = native.split('\x0c').collect();
        result.stats.pages = pages.len();
        result.stats.strategy = "native".to_string();

        for (index, page_text) in pages.iter().enumerate() {
            let trimmed = page_text.trim();
            if trimmed.chars().count() >= opts.parser.min_page_text_chars {
                result.contents.push(ParsedContent::text(trimmed.to_string()).on_page(index as u32 + 1));
                continue;
            }

            if let Some(text) = try_fallback(self.vlm.as_ref(), index, trimmed, &mut result.warnings)? {
                result.contents.push(ParsedContent::text(text).on_page(index as u32 + 1));
                continue;
            }
            if let Some(text) = try_fallback(self.ocr.as_ref(), index, trimmed, &mut result.warnings)? {
                result.contents.push(ParsedContent::text(text).on_page(index as u32 + 1));
                continue;
            }

            if !trimmed.is_empty() {
                result.contents.push(ParsedContent::text(trimmed.to_string()).on_page(index as u32 + 1));
            }
            result.warnings.push(format!(
                "page {} has fewer than {} characters of native text and no fallback recovered more",
                index + 1,
                opts.parser.min_page_text_chars
            ));
        }

        result.stats.elements = result.contents.len();
        result.success = true;
        result.render_markdown();
        Ok(result)
    }
}

fn try_fallback(
    strategy: &dyn PageFallbackStrategy,
    index: usize,
    native_text: &str,
    warnings: &mut Vec<String>,
) -> Result<Option<String>> {
    match strategy.extract_page(index, native_text) {
        Ok(Some(text)) => {
            warnings.push(format!("page {} recovered via {} fallback", index + 1, strategy.name()));
            Ok(Some(text))
        }
        Ok(None) => Ok(None),
        Err(e) => {
            warnings.push(format!("page {} {} fallback failed: {e}", index + 1, strategy.name()));
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ParserConfig, TimeoutsConfig};

    #[test]
    fn invalid_pdf_reports_an_error_rather_than_panicking() {
        let parser = PdfParser::default();
        let parser_cfg = ParserConfig::default();
        let timeouts = TimeoutsConfig::default();
        let opts = ParseOpts { parser: &parser_cfg, timeouts: &timeouts };
        let result = parser.parse(Path::new("a.pdf"), b"not a pdf", &opts).unwrap();
        assert!(!result.success);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn can_parse_matches_pdf_extension_case_insensitively() {
        let parser = PdfParser::default();
        assert!(parser.can_parse(Path::new("a.PDF")));
        assert!(!parser.can_parse(Path::new("a.docx")));
    }
}
