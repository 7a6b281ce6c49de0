//! Configuration parsing and validation.
//!
//! PreflightBundle is configured via a TOML file (default: `./config/preflight.toml`),
//! overlaid with the environment variables enumerated in the spec (`PREFLIGHT_*`).
//! Environment variables take precedence over the file so that a single binary
//! can be reconfigured per-invocation without editing the TOML on disk.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub parser: ParserConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Ordered mirror roots. Reads use the first root where a bundle
    /// exists; writes mirror to every root currently reachable.
    #[serde(default = "default_storage_dirs")]
    pub dirs: Vec<PathBuf>,
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// Grace period before the startup/background sweeper reclaims
    /// `bundles-wip/*` and `.deleting.*` entries.
    #[serde(default = "default_sweep_grace_secs")]
    pub sweep_grace_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dirs: default_storage_dirs(),
            tmp_dir: default_tmp_dir(),
            sweep_grace_secs: default_sweep_grace_secs(),
        }
    }
}

fn default_storage_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("./data/bundles")]
}
fn default_tmp_dir() -> PathBuf {
    std::env::temp_dir().join("preflight")
}
fn default_sweep_grace_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,
    #[serde(default = "default_max_fts_query_tokens")]
    pub max_fts_query_tokens: usize,
    #[serde(default = "default_fanout_bundle_cap")]
    pub trace_fanout_bundle_cap: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_total_bytes: default_max_total_bytes(),
            max_fts_query_tokens: default_max_fts_query_tokens(),
            trace_fanout_bundle_cap: default_fanout_bundle_cap(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    512 * 1024
}
fn default_max_total_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_max_fts_query_tokens() -> usize {
    12
}
fn default_fanout_bundle_cap() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub mode: AnalysisMode,
    #[serde(default)]
    pub ast_engine: AstEngine,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    None,
    Quick,
    #[default]
    Full,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AstEngine {
    #[default]
    Native,
    Wasm,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutsConfig {
    #[serde(default = "default_git_clone_timeout_ms")]
    pub git_clone_ms: u64,
    #[serde(default = "default_vlm_timeout_ms")]
    pub vlm_ms: u64,
    #[serde(default = "default_cloud_parser_poll_ms")]
    pub cloud_parser_poll_total_ms: u64,
    #[serde(default = "default_http_read_ms")]
    pub http_read_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            git_clone_ms: default_git_clone_timeout_ms(),
            vlm_ms: default_vlm_timeout_ms(),
            cloud_parser_poll_total_ms: default_cloud_parser_poll_ms(),
            http_read_ms: default_http_read_ms(),
        }
    }
}

fn default_git_clone_timeout_ms() -> u64 {
    5 * 60 * 1000
}
fn default_vlm_timeout_ms() -> u64 {
    60 * 1000
}
fn default_cloud_parser_poll_ms() -> u64 {
    10 * 60 * 1000
}
fn default_http_read_ms() -> u64 {
    30 * 1000
}

impl TimeoutsConfig {
    pub fn git_clone(&self) -> Duration {
        Duration::from_millis(self.git_clone_ms)
    }
    pub fn vlm(&self) -> Duration {
        Duration::from_millis(self.vlm_ms)
    }
    pub fn cloud_parser_poll_total(&self) -> Duration {
        Duration::from_millis(self.cloud_parser_poll_total_ms)
    }
    pub fn http_read(&self) -> Duration {
        Duration::from_millis(self.http_read_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8420
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub semantic_search_enabled: bool,
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub azure: bool,
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f64,
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f64,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            semantic_search_enabled: false,
            provider: default_embedding_provider(),
            model: None,
            dimension: None,
            base_url: None,
            azure: false,
            auth_mode: default_auth_mode(),
            dense_weight: default_dense_weight(),
            sparse_weight: default_sparse_weight(),
            timeout_secs: default_embedding_timeout_secs(),
            max_retries: default_embedding_max_retries(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_auth_mode() -> String {
    "auto".to_string()
}
fn default_dense_weight() -> f64 {
    0.7
}
fn default_sparse_weight() -> f64 {
    0.3
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_embedding_max_retries() -> u32 {
    5
}
fn default_embedding_batch_size() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

fn default_final_limit() -> i64 {
    20
}

/// The optional MinerU-compatible cloud batch parser (§4.4 "Cloud batch
/// parser") and the page-level text threshold that triggers PDF fallback.
/// Unset `base_url` means the strategy is simply absent, not an error — a
/// `not configured` classification, not a `Configuration` failure.
#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    #[serde(default)]
    pub cloud_base_url: Option<String>,
    #[serde(default)]
    pub cloud_api_key: Option<String>,
    #[serde(default = "default_auth_mode")]
    pub cloud_auth_mode: String,
    #[serde(default = "default_min_page_text_chars")]
    pub min_page_text_chars: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            cloud_base_url: None,
            cloud_api_key: None,
            cloud_auth_mode: default_auth_mode(),
            min_page_text_chars: default_min_page_text_chars(),
        }
    }
}

fn default_min_page_text_chars() -> usize {
    50
}

/// Load config from `path` if it exists (defaults otherwise), then overlay
/// `PREFLIGHT_*` environment variables, then validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "failed to parse config file")?
    } else {
        toml::from_str("").expect("empty TOML parses to all-default Config")
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("PREFLIGHT_STORAGE_DIR") {
        config.storage.dirs = vec![PathBuf::from(v)];
    }
    if let Ok(v) = std::env::var("PREFLIGHT_STORAGE_DIRS") {
        config.storage.dirs = v.split(';').map(PathBuf::from).collect();
    }
    if let Ok(v) = std::env::var("PREFLIGHT_TMP_DIR") {
        config.storage.tmp_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("PREFLIGHT_MAX_FILE_BYTES") {
        if let Ok(n) = v.parse() {
            config.limits.max_file_bytes = n;
        }
    }
    if let Ok(v) = std::env::var("PREFLIGHT_MAX_TOTAL_BYTES") {
        if let Ok(n) = v.parse() {
            config.limits.max_total_bytes = n;
        }
    }
    if let Ok(v) = std::env::var("PREFLIGHT_ANALYSIS_MODE") {
        config.analysis.mode = match v.as_str() {
            "none" => AnalysisMode::None,
            "quick" => AnalysisMode::Quick,
            _ => AnalysisMode::Full,
        };
    }
    if let Ok(v) = std::env::var("PREFLIGHT_AST_ENGINE") {
        config.analysis.ast_engine = if v == "wasm" { AstEngine::Wasm } else { AstEngine::Native };
    }
    if let Ok(v) = std::env::var("PREFLIGHT_GIT_CLONE_TIMEOUT_MS") {
        if let Ok(n) = v.parse() {
            config.timeouts.git_clone_ms = n;
        }
    }
    if let Ok(v) = std::env::var("PREFLIGHT_HTTP_ENABLED") {
        config.http.enabled = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = std::env::var("PREFLIGHT_HTTP_HOST") {
        config.http.host = v;
    }
    if let Ok(v) = std::env::var("PREFLIGHT_HTTP_PORT") {
        if let Ok(n) = v.parse() {
            config.http.port = n;
        }
    }
    if let Ok(v) = std::env::var("PREFLIGHT_SEMANTIC_SEARCH") {
        config.embedding.semantic_search_enabled = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = std::env::var("PREFLIGHT_EMBEDDING_PROVIDER") {
        config.embedding.provider = v;
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.storage.dirs.is_empty() {
        anyhow::bail!("storage.dirs must contain at least one root");
    }
    if !(0.0..=1.0).contains(&config.embedding.dense_weight) {
        anyhow::bail!("embedding.dense_weight must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.embedding.sparse_weight) {
        anyhow::bail!("embedding.sparse_weight must be in [0.0, 1.0]");
    }
    if config.embedding.semantic_search_enabled
        && !["ollama", "openai", "local"].contains(&config.embedding.provider.as_str())
    {
        anyhow::bail!(
            "embedding.provider must be 'ollama', 'openai', or 'local', got '{}'",
            config.embedding.provider
        );
    }
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.storage.dirs.len(), 1);
        assert_eq!(config.analysis.mode, AnalysisMode::Full);
    }

    #[test]
    fn rejects_out_of_range_weights() {
        let mut config: Config = toml::from_str("").unwrap();
        config.embedding.dense_weight = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn env_override_storage_dirs() {
        std::env::set_var("PREFLIGHT_STORAGE_DIRS", "/a;/b");
        let mut config: Config = toml::from_str("").unwrap();
        apply_env_overrides(&mut config);
        assert_eq!(config.storage.dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        std::env::remove_var("PREFLIGHT_STORAGE_DIRS");
    }
}
