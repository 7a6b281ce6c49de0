//! DOCX/PPTX/XLSX extraction (§4.4 "Office / HTML").
//!
//! Adapted from the teacher's `extract.rs`: same `zip` + `quick_xml`
//! streaming-event approach, the same zip-bomb bound
//! (`MAX_XML_ENTRY_BYTES`) and xlsx sheet/cell caps. The teacher returned
//! one flat string per document; here each paragraph/slide/sheet becomes
//! its own [`ParsedContent`] so the chunker can tell prose from tabular
//! data.

use super::{DocumentParser, ParseOpts, ParseResult, ParsedContent, ParsedContentType};
use anyhow::{anyhow, Result};
use std::io::Read;
use std::path::Path;

const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;

pub struct OfficeParser;

impl DocumentParser for OfficeParser {
    fn can_parse(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
            Some("docx" | "pptx" | "xlsx")
        )
    }

    fn parse(&self, path: &Path, bytes: &[u8], _opts: &ParseOpts) -> Result<ParseResult> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
        let mut result = match ext.as_str() {
            "docx" => extract_docx(bytes)?,
            "pptx" => extract_pptx(bytes)?,
            "xlsx" => extract_xlsx(bytes)?,
            other => return Err(anyhow!("unsupported office extension: {other}")),
        };
        result.stats.elements = result.contents.len();
        result.success = true;
        result.render_markdown();
        Ok(result)
    }
}

fn read_zip_entry_bounded(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>, name: &str, max_bytes: u64) -> Result<Vec<u8>> {
    let entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry.take(max_bytes).read_to_end(&mut out)?;
    if out.len() as u64 >= max_bytes {
        return Err(anyhow!("zip entry {name} exceeds size limit ({max_bytes} bytes)"));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<ParseResult> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    let paragraphs = extract_paragraphs(&doc_xml)?;
    let mut result = ParseResult::default();
    result.contents.extend(paragraphs.into_iter().filter(|p| !p.trim().is_empty()).map(ParsedContent::text));
    Ok(result)
}

/// Splits `word/document.xml`'s `<w:t>` runs into paragraphs on `<w:p>`
/// boundaries, rather than the teacher's single concatenated string.
fn extract_paragraphs(xml: &[u8]) -> Result<Vec<String>> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            quick_xml::events::Event::Start(e) if e.local_name().as_ref() == b"t" => {
                if let quick_xml::events::Event::Text(te) = reader.read_event_into(&mut buf)? {
                    current.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            quick_xml::events::Event::End(e) if e.local_name().as_ref() == b"p" => {
                paragraphs.push(std::mem::take(&mut current));
            }
            quick_xml::events::Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}

fn extract_pptx(bytes: &[u8]) -> Result<ParseResult> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut slide_names: Vec<String> =
        archive.file_names().filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml")).map(|s| s.to_string()).collect();
    slide_names.sort_by_key(|name| name.trim_start_matches("ppt/slides/slide").trim_end_matches(".xml").parse::<u32>().unwrap_or(u32::MAX));

    let mut result = ParseResult::default();
    result.stats.pages = slide_names.len();
    for (index, name) in slide_names.iter().enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_a_t_elements(&xml)?;
        if !text.trim().is_empty() {
            result.contents.push(ParsedContent::text(text).on_page(index as u32 + 1));
        }
    }
    Ok(result)
}

fn extract_a_t_elements(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            quick_xml::events::Event::Start(e) if e.local_name().as_ref() == b"t" => {
                if let quick_xml::events::Event::Text(te) = reader.read_event_into(&mut buf)? {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            quick_xml::events::Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<ParseResult> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let shared_strings = read_shared_strings(&mut archive).unwrap_or_default();
    let sheet_names = list_worksheet_names(&mut archive);

    let mut result = ParseResult::default();
    result.stats.pages = sheet_names.len();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let rows = extract_xlsx_sheet_rows(&sheet_xml, &shared_strings)?;
        if !rows.is_empty() {
            let table_markdown = rows.iter().map(|row| format!("| {} |", row.join(" | "))).collect::<Vec<_>>().join("\n");
            result.contents.push(ParsedContent::typed(ParsedContentType::Table, table_markdown));
        }
    }
    Ok(result)
}

fn read_shared_strings(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Result<Vec<String>> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            quick_xml::events::Event::Start(e) if e.local_name().as_ref() == b"si" => in_si = true,
            quick_xml::events::Event::Start(e) if in_si && e.local_name().as_ref() == b"t" => {
                if let quick_xml::events::Event::Text(te) = reader.read_event_into(&mut buf)? {
                    strings.push(te.unescape().unwrap_or_default().into_owned());
                }
            }
            quick_xml::events::Event::End(e) if e.local_name().as_ref() == b"si" => in_si = false,
            quick_xml::events::Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive.file_names().filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml")).map(|s| s.to_string()).collect();
    names.sort_by_key(|name| name.trim_start_matches("xl/worksheets/sheet").trim_end_matches(".xml").parse::<u32>().unwrap_or(u32::MAX));
    names
}

fn extract_xlsx_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared_str = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf)? {
            quick_xml::events::Event::Start(e) if e.local_name().as_ref() == b"row" => current_row = Vec::new(),
            quick_xml::events::Event::Start(e) if e.local_name().as_ref() == b"c" => {
                cell_is_shared_str =
                    e.attributes().any(|a| a.as_ref().map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s").unwrap_or(false));
            }
            quick_xml::events::Event::Start(e) if e.local_name().as_ref() == b"v" => in_v = true,
            quick_xml::events::Event::Text(te) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    let resolved = if cell_is_shared_str {
                        s.parse::<usize>().ok().and_then(|i| shared_strings.get(i)).cloned().unwrap_or_default()
                    } else {
                        s.to_string()
                    };
                    current_row.push(resolved);
                    cell_count += 1;
                }
                in_v = false;
            }
            quick_xml::events::Event::End(e) if e.local_name().as_ref() == b"v" => in_v = false,
            quick_xml::events::Event::End(e) if e.local_name().as_ref() == b"row" => {
                if !current_row.is_empty() {
                    rows.push(std::mem::take(&mut current_row));
                }
            }
            quick_xml::events::Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ParserConfig, TimeoutsConfig};

    fn opts<'a>(parser_cfg: &'a ParserConfig, timeouts: &'a TimeoutsConfig) -> ParseOpts<'a> {
        ParseOpts { parser: parser_cfg, timeouts }
    }

    #[test]
    fn invalid_zip_is_an_error_for_docx() {
        let parser_cfg = ParserConfig::default();
        let timeouts = TimeoutsConfig::default();
        let err = OfficeParser.parse(Path::new("a.docx"), b"not a zip", &opts(&parser_cfg, &timeouts)).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let parser_cfg = ParserConfig::default();
        let timeouts = TimeoutsConfig::default();
        assert!(OfficeParser.parse(Path::new("a.txt"), b"", &opts(&parser_cfg, &timeouts)).is_err());
    }
}
