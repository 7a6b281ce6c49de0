//! Evidence & Trace (ET) — §4.10.
//!
//! Per-bundle SQLite store (`trace/trace.sqlite3`) with `edges`/`sources`
//! tables, and the `snippetSha256` drift-detection helper every
//! file-grounded tool result uses to populate `evidence[]`. Grounded on the
//! teacher's `sqlx`-based migration/query idiom, already reused by
//! [`crate::fts`] and [`crate::semantic`] for their own per-bundle
//! databases — here applied to a third, edge-shaped schema instead of a
//! line index or a vector store.

use crate::models::{EdgeMethod, EvidencePointer, TraceEdge};
use crate::storage::Storage;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

pub const DB_RELATIVE_PATH: &str = "trace/trace.sqlite3";

/// Open (creating if absent) the per-bundle trace database in WAL mode.
pub async fn open(bundle_root: &Path) -> Result<SqlitePool> {
    let db_path = bundle_root.join(DB_RELATIVE_PATH);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS edges (
            id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            target_type TEXT NOT NULL,
            target_id TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            confidence REAL NOT NULL,
            method TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sources (
            edge_id TEXT NOT NULL REFERENCES edges(id),
            path TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            snippet_sha256 TEXT,
            uri TEXT,
            PRIMARY KEY (edge_id, path, start_line, end_line, snippet_sha256)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_type, source_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type)").execute(pool).await?;

    Ok(())
}

/// Upsert a batch of edges (§4.10). Idempotent by `id`: re-upserting the
/// same edge replaces its scalar fields and merges `sources[]`, deduping on
/// `(path, startLine, endLine, snippetSha256)` rather than appending
/// duplicates every call.
pub async fn upsert(pool: &SqlitePool, edges: &[TraceEdge]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for edge in edges {
        sqlx::query(
            "INSERT INTO edges (id, source_type, source_id, target_type, target_id, edge_type, confidence, method, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                source_type = excluded.source_type,
                source_id = excluded.source_id,
                target_type = excluded.target_type,
                target_id = excluded.target_id,
                edge_type = excluded.edge_type,
                confidence = excluded.confidence,
                method = excluded.method,
                updated_at = excluded.updated_at",
        )
        .bind(&edge.id)
        .bind(&edge.source_type)
        .bind(&edge.source_id)
        .bind(&edge.target_type)
        .bind(&edge.target_id)
        .bind(&edge.edge_type)
        .bind(edge.confidence)
        .bind(method_str(edge.method))
        .bind(edge.created_at.to_rfc3339())
        .bind(edge.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for source in &edge.sources {
            sqlx::query(
                "INSERT INTO sources (edge_id, path, start_line, end_line, snippet_sha256, uri)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(edge_id, path, start_line, end_line, snippet_sha256) DO UPDATE SET
                    uri = excluded.uri",
            )
            .bind(&edge.id)
            .bind(&source.path)
            .bind(source.start_line)
            .bind(source.end_line)
            .bind(&source.snippet_sha256)
            .bind(&source.uri)
            .execute(&mut *tx)
            .await?;
        }

        written += 1;
    }

    tx.commit().await?;
    Ok(written)
}

fn method_str(method: EdgeMethod) -> &'static str {
    match method {
        EdgeMethod::Exact => "exact",
        EdgeMethod::Heuristic => "heuristic",
    }
}

fn method_from_str(s: &str) -> EdgeMethod {
    match s {
        "exact" => EdgeMethod::Exact,
        _ => EdgeMethod::Heuristic,
    }
}

/// Query filter for [`query`] / [`query_across_bundles`]. All fields are
/// optional narrowing predicates, applied with `AND`.
#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub edge_type: Option<String>,
    pub limit: Option<i64>,
}

/// Query edges within a single bundle's trace database.
pub async fn query(pool: &SqlitePool, filter: &TraceQuery) -> Result<Vec<TraceEdge>> {
    let limit = filter.limit.unwrap_or(200).clamp(1, 2000);
    let rows = sqlx::query(
        "SELECT id, source_type, source_id, target_type, target_id, edge_type, confidence, method, created_at, updated_at
         FROM edges
         WHERE (?1 IS NULL OR source_type = ?1)
           AND (?2 IS NULL OR source_id = ?2)
           AND (?3 IS NULL OR edge_type = ?3)
         ORDER BY updated_at DESC
         LIMIT ?4",
    )
    .bind(&filter.source_type)
    .bind(&filter.source_id)
    .bind(&filter.edge_type)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut edges = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.try_get("id")?;
        let source_rows = sqlx::query(
            "SELECT path, start_line, end_line, snippet_sha256, uri FROM sources WHERE edge_id = ? ORDER BY path, start_line",
        )
        .bind(&id)
        .fetch_all(pool)
        .await?;
        let sources = source_rows
            .into_iter()
            .map(|r| {
                Ok(EvidencePointer {
                    path: r.try_get("path")?,
                    start_line: r.try_get("start_line")?,
                    end_line: r.try_get("end_line")?,
                    uri: r.try_get("uri")?,
                    snippet: None,
                    snippet_sha256: r.try_get("snippet_sha256")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        edges.push(TraceEdge {
            id,
            source_type: row.try_get("source_type")?,
            source_id: row.try_get("source_id")?,
            target_type: row.try_get("target_type")?,
            target_id: row.try_get("target_id")?,
            edge_type: row.try_get("edge_type")?,
            confidence: row.try_get("confidence")?,
            method: method_from_str(&row.try_get::<String, _>("method")?),
            sources,
            created_at: row.try_get::<String, _>("created_at")?.parse()?,
            updated_at: row.try_get::<String, _>("updated_at")?.parse()?,
        });
    }

    Ok(edges)
}

/// Result of a cross-bundle query (§4.10: "when `bundleId` is omitted, fan
/// out across all bundle roots with a hard cap and a `truncated` flag").
#[derive(Debug, Clone)]
pub struct CrossBundleResult {
    pub edges: Vec<(String, TraceEdge)>,
    pub bundles_searched: usize,
    pub truncated: bool,
}

/// Fan out a query across every bundle in `storage`, up to `bundle_cap`
/// bundles. Used when `preflight_trace_query` is called without a
/// `bundleId`.
pub async fn query_across_bundles(storage: &Storage, filter: &TraceQuery, bundle_cap: usize) -> Result<CrossBundleResult> {
    let all_ids = storage.list_bundle_ids();
    let truncated = all_ids.len() > bundle_cap;
    let mut edges = Vec::new();
    let mut bundles_searched = 0usize;

    for bundle_id in all_ids.into_iter().take(bundle_cap) {
        let Some(root) = storage.resolve_bundle_root(&bundle_id) else { continue };
        let db_path = root.join(DB_RELATIVE_PATH);
        if !db_path.is_file() {
            continue;
        }
        let pool = match open(&root).await {
            Ok(p) => p,
            Err(_) => continue,
        };
        let found = query(&pool, filter).await.unwrap_or_default();
        pool.close().await;
        bundles_searched += 1;
        for edge in found {
            edges.push((bundle_id.clone(), edge));
        }
    }

    Ok(CrossBundleResult { edges, bundles_searched, truncated })
}

/// SHA-256 over the exact returned snippet bytes (UTF-8, LF line endings),
/// for the drift check a consumer runs to notice a snippet no longer
/// matches what is on disk at `(path, startLine, endLine)` (§4.10).
pub fn snippet_sha256(snippet: &str) -> String {
    let normalized = snippet.replace("\r\n", "\n");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build an [`EvidencePointer`] for a snippet read from `path`, stamping
/// its `snippetSha256` so later reads can detect drift.
pub fn evidence_for_snippet(path: &str, start_line: i64, end_line: i64, snippet: &str) -> EvidencePointer {
    EvidencePointer {
        path: path.to_string(),
        start_line,
        end_line,
        uri: None,
        snippet_sha256: Some(snippet_sha256(snippet)),
        snippet: Some(snippet.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EdgeMethod;
    use chrono::Utc;

    fn sample_edge(id: &str, path: &str) -> TraceEdge {
        let now = Utc::now();
        TraceEdge {
            id: id.to_string(),
            source_type: "function".to_string(),
            source_id: "crate::foo".to_string(),
            target_type: "test".to_string(),
            target_id: "tests::foo_works".to_string(),
            edge_type: "tested_by".to_string(),
            confidence: 0.9,
            method: EdgeMethod::Heuristic,
            sources: vec![evidence_for_snippet(path, 10, 20, "fn foo() {}")],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_dedupes_sources() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(dir.path()).await.unwrap();

        let edge = sample_edge("e1", "src/foo.rs");
        upsert(&pool, &[edge.clone()]).await.unwrap();
        upsert(&pool, &[edge.clone()]).await.unwrap();
        upsert(&pool, &[edge]).await.unwrap();

        let found = query(&pool, &TraceQuery::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].sources.len(), 1);
    }

    #[tokio::test]
    async fn query_filters_by_source_id() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(dir.path()).await.unwrap();
        upsert(&pool, &[sample_edge("e1", "src/foo.rs")]).await.unwrap();

        let mut other = sample_edge("e2", "src/bar.rs");
        other.source_id = "crate::bar".to_string();
        upsert(&pool, &[other]).await.unwrap();

        let filter = TraceQuery { source_id: Some("crate::foo".to_string()), ..Default::default() };
        let found = query(&pool, &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "e1");
    }

    #[test]
    fn snippet_hash_is_stable_across_crlf_and_lf() {
        assert_eq!(snippet_sha256("fn foo() {}\n"), snippet_sha256("fn foo() {}\r\n"));
    }
}
