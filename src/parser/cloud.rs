//! Optional MinerU-compatible cloud batch parser (§4.4 step 4).
//!
//! Upload → poll → download-zip, same blocking-reqwest shape as
//! `embedding::local_tract::download_to_cache`. Unset `cloud_base_url` means
//! the strategy is simply absent: [`CloudParser::new`] returns `None` rather
//! than a parser that always errors, so `parser_for` never routes a document
//! to a collaborator that was never configured.

use super::{DocumentParser, ParseOpts, ParseResult, ParsedContent};
use anyhow::{anyhow, Result};
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Why a cloud parse attempt didn't produce text, classified so an MCP
/// caller (or an LLM reading `ParseResult.errors`) can tell "nothing is
/// configured" apart from "the service rejected us" apart from "the network
/// is down".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudParseError {
    NotConfigured,
    AuthFailed,
    Unreachable,
    EndpointError,
    TaskTimeout,
    TaskFailed,
}

impl CloudParseError {
    fn message(&self, detail: impl std::fmt::Display) -> String {
        let label = match self {
            CloudParseError::NotConfigured => "cloud parser not configured",
            CloudParseError::AuthFailed => "cloud parser authentication failed",
            CloudParseError::Unreachable => "cloud parser endpoint unreachable",
            CloudParseError::EndpointError => "cloud parser endpoint returned an error",
            CloudParseError::TaskTimeout => "cloud parser task timed out",
            CloudParseError::TaskFailed => "cloud parser task failed",
        };
        format!("{label}: {detail}")
    }
}

pub struct CloudParser {
    base_url: String,
    api_key: Option<String>,
    auth_mode: String,
    client: reqwest::blocking::Client,
}

impl CloudParser {
    /// `None` when no `parser.cloud_base_url` is configured — absence, not
    /// a failure mode.
    pub fn new(opts: &ParseOpts) -> Option<Self> {
        let base_url = opts.parser.cloud_base_url.clone()?;
        Some(Self {
            base_url,
            api_key: opts.parser.cloud_api_key.clone(),
            auth_mode: opts.parser.cloud_auth_mode.clone(),
            client: reqwest::blocking::Client::new(),
        })
    }

    fn authed(&self, builder: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match (&self.api_key, self.auth_mode.as_str()) {
            (Some(key), "bearer") => builder.header("Authorization", format!("Bearer {key}")),
            (Some(key), "api-key") => builder.header("X-Api-Key", key),
            _ => builder,
        }
    }

    fn upload(&self, file_name: &str, bytes: &[u8]) -> std::result::Result<String, CloudParseError> {
        let part = reqwest::blocking::multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = reqwest::blocking::multipart::Form::new().part("file", part);
        let req = self.authed(self.client.post(format!("{}/tasks", self.base_url))).multipart(form);
        let resp = req.send().map_err(|_| CloudParseError::Unreachable)?;
        classify_status(&resp)?;
        let json: serde_json::Value = resp.json().map_err(|_| CloudParseError::EndpointError)?;
        json.get("taskId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(CloudParseError::EndpointError)
    }

    fn poll(&self, task_id: &str, total_timeout: Duration) -> std::result::Result<String, CloudParseError> {
        let deadline = Instant::now() + total_timeout;
        loop {
            let resp = self
                .authed(self.client.get(format!("{}/tasks/{}", self.base_url, task_id)))
                .send()
                .map_err(|_| CloudParseError::Unreachable)?;
            classify_status(&resp)?;
            let json: serde_json::Value = resp.json().map_err(|_| CloudParseError::EndpointError)?;
            match json.get("status").and_then(|v| v.as_str()) {
                Some("done") => {
                    return json
                        .get("resultUrl")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .ok_or(CloudParseError::EndpointError)
                }
                Some("failed") => return Err(CloudParseError::TaskFailed),
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(CloudParseError::TaskTimeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn download_zip(&self, result_url: &str) -> std::result::Result<Vec<u8>, CloudParseError> {
        let resp = self.authed(self.client.get(result_url)).send().map_err(|_| CloudParseError::Unreachable)?;
        classify_status(&resp)?;
        resp.bytes().map(|b| b.to_vec()).map_err(|_| CloudParseError::EndpointError)
    }

    /// Extract the MinerU `full.md` entry from the downloaded result archive.
    fn markdown_from_zip(&self, zip_bytes: &[u8]) -> std::result::Result<String, CloudParseError> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes)).map_err(|_| CloudParseError::EndpointError)?;
        let mut name = None;
        for i in 0..archive.len() {
            if let Ok(entry) = archive.by_index(i) {
                if entry.name().ends_with(".md") {
                    name = Some(entry.name().to_string());
                    break;
                }
            }
        }
        let name = name.ok_or(CloudParseError::EndpointError)?;
        let mut entry = archive.by_name(&name).map_err(|_| CloudParseError::EndpointError)?;
        let mut out = String::new();
        entry.read_to_string(&mut out).map_err(|_| CloudParseError::EndpointError)?;
        Ok(out)
    }

    pub fn parse_document(&self, path: &Path, bytes: &[u8], timeout_total: Duration) -> Result<ParseResult> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("document");
        let outcome = (|| {
            let task_id = self.upload(file_name, bytes)?;
            let result_url = self.poll(&task_id, timeout_total)?;
            let markdown = self.download_zip(&result_url).and_then(|zip_bytes| self.markdown_from_zip(&zip_bytes))?;
            Ok::<String, CloudParseError>(markdown)
        })();

        let mut result = ParseResult::default();
        match outcome {
            Ok(markdown) => {
                for block in markdown.split("\n\n") {
                    let trimmed = block.trim();
                    if !trimmed.is_empty() {
                        result.contents.push(ParsedContent::text(trimmed.to_string()));
                    }
                }
                result.stats.elements = result.contents.len();
                result.stats.strategy = "cloud".to_string();
                result.success = true;
                result.render_markdown();
                Ok(result)
            }
            Err(kind) => {
                result.errors.push(kind.message("see warnings for the underlying detail"));
                Ok(result)
            }
        }
    }
}

fn classify_status(resp: &reqwest::blocking::Response) -> std::result::Result<(), CloudParseError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(CloudParseError::AuthFailed);
    }
    Err(CloudParseError::EndpointError)
}

/// `DocumentParser` wrapper so `parser_for` could route to the cloud parser
/// like any other format strategy, if a caller opts in explicitly — unlike
/// `pdf`/`office`/`html`, this one is never auto-selected by extension since
/// it duplicates PDF/Office coverage and costs a network round trip.
pub struct CloudDocumentParser;

impl DocumentParser for CloudDocumentParser {
    fn can_parse(&self, _path: &Path) -> bool {
        false
    }

    fn parse(&self, path: &Path, bytes: &[u8], opts: &ParseOpts) -> Result<ParseResult> {
        match CloudParser::new(opts) {
            Some(cloud) => cloud.parse_document(path, bytes, opts.timeouts.cloud_parser_poll_total()),
            None => {
                let mut result = ParseResult::default();
                result.errors.push(CloudParseError::NotConfigured.message("parser.cloud_base_url is unset"));
                Ok(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ParserConfig, TimeoutsConfig};

    #[test]
    fn absent_base_url_yields_not_configured_without_a_network_call() {
        let parser_cfg = ParserConfig::default();
        let timeouts = TimeoutsConfig::default();
        let opts = ParseOpts { parser: &parser_cfg, timeouts: &timeouts };
        let result = CloudDocumentParser.parse(Path::new("a.pdf"), b"ignored", &opts).unwrap();
        assert!(!result.success);
        assert!(result.errors[0].contains("not configured"));
    }

    #[test]
    fn cloud_parser_is_never_auto_selected_by_extension() {
        assert!(!CloudDocumentParser.can_parse(Path::new("a.pdf")));
    }
}
