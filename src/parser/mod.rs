//! Parser Subsystem (PS) — §4.4.
//!
//! Every format parser implements the same contract: `can_parse` by
//! extension, `parse` bytes into `ParsedContent[]`. PDF extraction falls
//! back through a chain — native text, then two pluggable page-level
//! collaborators (VLM, OCR), then an optional MinerU-compatible cloud
//! batch parser — recording every fallback taken in `warnings[]` so no
//! strategy switch happens silently. The VLM/OCR steps are modeled as
//! trait objects rather than wired to a concrete engine: no page-rasterizer
//! or OCR crate is part of this crate's dependency stack, and the spec
//! itself treats "specific LLM providers used for ... VLM fallback" as an
//! external collaborator, out of scope for this repo to implement.

pub mod cloud;
pub mod html;
pub mod office;
pub mod pdf;

use crate::config::{ParserConfig, TimeoutsConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsedContentType {
    Text,
    Heading,
    CodeBlock,
    Table,
    Equation,
    Image,
    List,
    Caption,
    Footnote,
}

/// One extracted element, with a page number where the source format has
/// pages (PDF) and `None` otherwise (Office/HTML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedContent {
    pub content_type: ParsedContentType,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl ParsedContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self { content_type: ParsedContentType::Text, text: text.into(), page: None }
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn typed(content_type: ParsedContentType, text: impl Into<String>) -> Self {
        Self { content_type, text: text.into(), page: None }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseStats {
    pub pages: usize,
    pub elements: usize,
    pub strategy: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub success: bool,
    pub contents: Vec<ParsedContent>,
    pub full_text: Option<String>,
    pub stats: ParseStats,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ParseResult {
    /// Join `contents` into a single markdown-ish text, used both as the
    /// `fullText` convenience field and as the bytes written into `norm/`.
    pub fn render_markdown(&mut self) {
        let mut out = String::new();
        for item in &self.contents {
            match item.content_type {
                ParsedContentType::Heading => {
                    out.push_str("## ");
                    out.push_str(&item.text);
                    out.push_str("\n\n");
                }
                ParsedContentType::CodeBlock => {
                    out.push_str("```\n");
                    out.push_str(&item.text);
                    out.push_str("\n```\n\n");
                }
                ParsedContentType::Table => {
                    out.push_str(&item.text);
                    out.push_str("\n\n");
                }
                _ => {
                    out.push_str(&item.text);
                    out.push_str("\n\n");
                }
            }
        }
        self.full_text = Some(out);
    }
}

pub struct ParseOpts<'a> {
    pub parser: &'a ParserConfig,
    pub timeouts: &'a TimeoutsConfig,
}

pub trait DocumentParser: Send + Sync {
    fn can_parse(&self, path: &Path) -> bool;
    fn parse(&self, path: &Path, bytes: &[u8], opts: &ParseOpts) -> anyhow::Result<ParseResult>;
}

/// A page-level fallback collaborator for the PDF chain (§4.4 steps 2-3:
/// VLM extraction, OCR). `extract_page` returns `Ok(None)` when the
/// strategy has nothing better than the page's native text (not
/// configured, or genuinely no extra signal), rather than erroring —
/// absence of a configured fallback is not a parse failure.
pub trait PageFallbackStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract_page(&self, page_index: usize, native_text: &str) -> anyhow::Result<Option<String>>;
}

/// Default stand-in for VLM/OCR when no concrete engine is wired up.
pub struct NotConfiguredStrategy(pub &'static str);

impl PageFallbackStrategy for NotConfiguredStrategy {
    fn name(&self) -> &'static str {
        self.0
    }

    fn extract_page(&self, _page_index: usize, _native_text: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

/// Dispatch by extension to the matching format parser. Returns `None` for
/// extensions this subsystem doesn't own (plain text/code falls through
/// [`crate::ingest::normalize`] unchanged).
pub fn parser_for(path: &Path) -> Option<Box<dyn DocumentParser>> {
    let parsers: Vec<Box<dyn DocumentParser>> =
        vec![Box::new(pdf::PdfParser::default()), Box::new(office::OfficeParser), Box::new(html::HtmlParser)];
    parsers.into_iter().find(|p| p.can_parse(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_extension() {
        assert!(parser_for(Path::new("a.pdf")).is_some());
        assert!(parser_for(Path::new("a.docx")).is_some());
        assert!(parser_for(Path::new("a.html")).is_some());
        assert!(parser_for(Path::new("a.rs")).is_none());
    }

    #[test]
    fn render_markdown_joins_contents_with_heading_markers() {
        let mut result = ParseResult {
            success: true,
            contents: vec![
                ParsedContent::typed(ParsedContentType::Heading, "Intro"),
                ParsedContent::text("hello world"),
            ],
            ..Default::default()
        };
        result.render_markdown();
        let text = result.full_text.unwrap();
        assert!(text.starts_with("## Intro"));
        assert!(text.contains("hello world"));
    }
}
