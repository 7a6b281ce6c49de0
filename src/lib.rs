//! PreflightBundle core: builds and serves evidence-grounded knowledge-base
//! bundles for AI coding assistants.
//!
//! Module map mirrors the component table in the design doc:
//! - [`storage`] — multi-root mirrored bundle storage, atomic commit, sweep.
//! - [`fingerprint`] — input canonicalization and de-dup index.
//! - [`ingest`] — repo/local/docs fetchers and raw→norm normalization.
//! - [`chunk`] — markdown-to-chunk splitting for the generic and academic
//!   chunkers.
//! - [`fts`] — per-bundle FTS5 line index and claim verification.
//! - [`semantic`] — optional dense-vector index and hybrid scoring.
//! - [`ast`] — tree-sitter outlines, imports/exports, complexity, call graph.
//! - [`models`] — shared data shapes (manifest, chunks, rows, edges).
//! - [`config`] — TOML + env configuration.
//! - [`error`] — canonical error taxonomy for the tool boundary.
//! - [`embedding`] — dense-vector embedding adapters (Ollama/OpenAI/local).
//! - [`lifecycle`] — bundle create/update/repair/delete state machine and
//!   progress tracker.
//! - [`evidence`] — per-bundle trace store and evidence-pointer hashing.
//! - [`parser`] — PDF/Office/HTML/cloud document parsing chain.
//! - [`mcp`] — the `preflight_*` tool surface and its streamable-HTTP transport.

pub mod ast;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod fts;
pub mod ingest;
pub mod lifecycle;
pub mod mcp;
pub mod models;
pub mod parser;
pub mod semantic;
pub mod storage;
