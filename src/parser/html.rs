//! HTML-to-markdown conversion (§4.4 "Office / HTML").
//!
//! No teacher or pack-repo file parses HTML directly; `html2text` is the
//! crate `criticalinsight-sly`/`Idleness76-Weavegraph` in the wider example
//! pool reach for exactly this job, so it's adopted here rather than
//! hand-rolling a tag stripper.

use super::{DocumentParser, ParseOpts, ParseResult, ParsedContent};
use anyhow::{Context, Result};
use std::path::Path;

const WRAP_WIDTH: usize = 100;

pub struct HtmlParser;

impl DocumentParser for HtmlParser {
    fn can_parse(&self, path: &Path) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(), Some("html" | "htm"))
    }

    fn parse(&self, _path: &Path, bytes: &[u8], _opts: &ParseOpts) -> Result<ParseResult> {
        let markdown = html2text::from_read(bytes, WRAP_WIDTH).context("failed to convert HTML to text")?;
        let mut result = ParseResult { success: true, ..Default::default() };
        for block in markdown.split("\n\n") {
            let trimmed = block.trim();
            if !trimmed.is_empty() {
                result.contents.push(ParsedContent::text(trimmed.to_string()));
            }
        }
        result.stats.elements = result.contents.len();
        result.stats.strategy = "html2text".to_string();
        result.render_markdown();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ParserConfig, TimeoutsConfig};

    #[test]
    fn strips_chrome_and_keeps_body_text() {
        let parser_cfg = ParserConfig::default();
        let timeouts = TimeoutsConfig::default();
        let opts = ParseOpts { parser: &parser_cfg, timeouts: &timeouts };
        let html = b"<html><head><style>body{color:red}</style></head><body><h1>Title</h1><p>Hello world</p></body></html>";
        let result = HtmlParser.parse(Path::new("a.html"), html, &opts).unwrap();
        assert!(result.success);
        let combined: String = result.contents.iter().map(|c| c.text.clone()).collect::<Vec<_>>().join(" ");
        assert!(combined.contains("Title"));
        assert!(combined.contains("Hello world"));
        assert!(!combined.contains("color:red"));
    }
}
