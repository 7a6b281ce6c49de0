//! Core data types shared across every subsystem (§3 of the bundle spec).
//!
//! These are the serializable shapes written to `manifest.json`, returned
//! from search/AST tools, and stored in the FTS/semantic/trace SQLite
//! databases. Kept in one module, as the teacher does with its own
//! `models.rs`, because nearly every other module needs them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: u32 = 1;

/// `ifExists` policy for `create_bundle` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IfExists {
    Error,
    ReturnExisting,
    UpdateExisting,
    CreateNew,
}

impl Default for IfExists {
    fn default() -> Self {
        IfExists::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    Github,
    Local,
    Docs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoSource {
    Git,
    Archive,
    Local,
}

/// One repository/document-set entry inside the manifest's `repos[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoEntry {
    pub kind: RepoKind,
    /// Normalized `owner/repo` for github, a stable path-derived id for
    /// local/docs inputs.
    pub id: String,
    pub source: RepoSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// The canonical, on-disk manifest (`manifest.json`). Invariants: see §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub bundle_id: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub inputs: NormalizedInputs,
    pub repos: Vec<RepoEntry>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_language: Option<String>,
}

/// The canonicalized input set the fingerprint is derived from (§4.2/§8).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedInputs {
    pub repos: Vec<NormalizedRepoInput>,
    pub libraries: Vec<String>,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct NormalizedRepoInput {
    pub kind: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Doc,
    Code,
    Asset,
}

/// A single normalized file produced by the ingestion pipeline (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedFile {
    pub repo_id: String,
    pub kind: FileKind,
    pub repo_relative_path: String,
    pub bundle_norm_relative_path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Text,
    Heading,
    Table,
    Figure,
    Formula,
    Code,
    List,
    Summary,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkMetadata {
    pub bundle_id: String,
    pub repo_id: String,
    pub file_path: String,
    pub chunk_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_heading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_chunk_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Doc,
    Section,
    Chunk,
}

/// A semantic chunk (§3, §4.5). `id` is content-hash + source-coordinate
/// derived so re-ingesting identical content reproduces identical ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticChunk {
    pub id: String,
    pub content: String,
    pub chunk_type: ChunkType,
    pub metadata: ChunkMetadata,
}

/// One row of the FTS line index (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtsRow {
    pub bundle_rel_path: String,
    pub kind: FtsKind,
    pub repo_id: String,
    pub line_no: i64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtsKind {
    Doc,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Docs,
    Code,
    All,
}

impl SearchScope {
    pub fn parse(s: &str) -> Self {
        match s {
            "docs" => SearchScope::Docs,
            "code" => SearchScope::Code,
            _ => SearchScope::All,
        }
    }
}

/// One dense-vector row keyed by chunk id (§3, §4.7).
#[derive(Debug, Clone)]
pub struct SemanticRow {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub dimension: usize,
    pub kind: FtsKind,
    pub repo_id: String,
    pub path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    Interface,
    Type,
    Enum,
    Variable,
}

/// An outline symbol (§3, §4.8), derived on demand from `norm/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineSymbol {
    pub kind: SymbolKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub start_line: i64,
    pub end_line: i64,
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineSymbol>,
}

/// Per-function complexity facts (§4.8, S4).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComplexityFacts {
    pub cyclomatic: u32,
    pub cognitive: u32,
    pub max_nesting_depth: u32,
    pub line_count: u32,
    pub param_count: u32,
}

/// One language's flavor of `import`/`use`/`require` (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportKind {
    Import,
    ExportFrom,
    DynamicImport,
    Require,
    PythonImport,
    PythonFrom,
    GoImport,
    JavaImport,
    RustUse,
    RustExternCrate,
}

/// A single import/require/use statement extracted from source (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRef {
    pub kind: ImportKind,
    pub source: String,
    pub line: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}

/// Interface/func-type/type-constraint declaration used for extension-point
/// detection (Go interfaces, Rust traits, TS interfaces) (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionPoint {
    pub name: String,
    pub kind: String,
    pub start_line: i64,
    pub end_line: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

/// Per-file static-analysis facts, one entry per source file, aggregated
/// into `analysis/FACTS.json` (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileFacts {
    pub path: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outline: Vec<OutlineSymbol>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_points: Vec<ExtensionPoint>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub complexity: BTreeMap<String, ComplexityFacts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMethod {
    Exact,
    Heuristic,
}

/// A trace edge between two addressable entities (§3, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEdge {
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub target_type: String,
    pub target_id: String,
    pub edge_type: String,
    pub confidence: f64,
    pub method: EdgeMethod,
    #[serde(default)]
    pub sources: Vec<EvidencePointer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `(path, line range, optional snippet hash)` — grounds any factual claim
/// a tool returns (§3, §4.10, GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidencePointer {
    pub path: String,
    pub start_line: i64,
    pub end_line: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet_sha256: Option<String>,
}

/// Bundle lifecycle state (§3 "Lifecycles").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    Planned,
    Fetching,
    Normalizing,
    Indexing,
    Ready,
    Updating,
    Repairing,
    Deleting,
    Gone,
}

/// Canonical JSON re-serialization: sorted keys, 2-space indent, trailing
/// newline, UTF-8 — per spec §6 file-format rules. `serde_json::Value`
/// preserves insertion order for objects by default; round-tripping through
/// a `BTreeMap` at every object level gives us key sorting for free.
pub fn to_canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let raw = serde_json::to_value(value)?;
    let sorted = sort_value(raw);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    sorted.serialize(&mut ser)?;
    let mut s = String::from_utf8(buf).expect("serde_json output is valid UTF-8");
    s.push('\n');
    Ok(s)
}

fn sort_value(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(arr) => serde_json::Value::Array(arr.into_iter().map(sort_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_keys() {
        #[derive(Serialize)]
        struct S {
            z: i32,
            a: i32,
        }
        let out = to_canonical_json(&S { z: 1, a: 2 }).unwrap();
        assert!(out.find("\"a\"").unwrap() < out.find("\"z\"").unwrap());
        assert!(out.ends_with('\n'));
    }
}
