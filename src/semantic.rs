//! Semantic Index (SEM) — §4.7.
//!
//! Optional dense-vector index, active only when
//! `embedding.semantic_search_enabled`. Vectors are stored as
//! little-endian f32 BLOBs via [`crate::embedding::vec_to_blob`]/`blob_to_vec`
//! (kept verbatim from the teacher's embedding module) and searched
//! exhaustively with [`crate::embedding::cosine_similarity`] — no ANN layer,
//! per the spec's explicit deferral to a future `sqlite-vec` integration.

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::fts::{FtsHit, Scope};
use crate::models::FtsKind;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

pub const DB_RELATIVE_PATH: &str = "indexes/semantic.sqlite3";

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
        "CREATE TABLE IF NOT EXISTS vectors (
            chunk_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            repo_id TEXT NOT NULL,
            path TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            dimension INTEGER NOT NULL,
            text TEXT NOT NULL,
            vector BLOB NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub struct VectorRow {
    pub chunk_id: String,
    pub kind: FtsKind,
    pub repo_id: String,
    pub path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub text: String,
    pub vector: Vec<f32>,
}

/// Replace the index contents with `rows`. Vectors are L2-normalized at
/// write time so stored dot products equal cosine similarity directly.
pub async fn rebuild(pool: &SqlitePool, rows: &[VectorRow]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM vectors").execute(&mut *tx).await?;

    for row in rows {
        let normalized = l2_normalize(&row.vector);
        let blob = vec_to_blob(&normalized);
        sqlx::query(
            "INSERT INTO vectors (chunk_id, kind, repo_id, path, start_line, end_line, dimension, text, vector)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.chunk_id)
        .bind(kind_str(row.kind))
        .bind(&row.repo_id)
        .bind(&row.path)
        .bind(row.start_line)
        .bind(row.end_line)
        .bind(normalized.len() as i64)
        .bind(&row.text)
        .bind(blob)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(rows.len())
}

fn kind_str(kind: FtsKind) -> &'static str {
    match kind {
        FtsKind::Doc => "doc",
        FtsKind::Code => "code",
    }
}

fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub chunk_id: String,
    pub kind: FtsKind,
    pub repo_id: String,
    pub path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub text: String,
    pub cosine: f32,
}

/// Exhaustive cosine search over every row whose `kind`/`repo_id` passes the
/// optional filters, keeping the top `k`.
pub async fn search(pool: &SqlitePool, query_vector: &[f32], k: usize, scope: Scope, repo_id: Option<&str>) -> Result<Vec<SemanticHit>> {
    let normalized_query = l2_normalize(query_vector);
    let rows = sqlx::query("SELECT chunk_id, kind, repo_id, path, start_line, end_line, text, vector FROM vectors")
        .fetch_all(pool)
        .await?;

    let mut hits = Vec::new();
    for row in rows {
        let kind_raw: String = row.try_get("kind")?;
        let kind = if kind_raw == "doc" { FtsKind::Doc } else { FtsKind::Code };
        if !scope_matches(scope, kind) {
            continue;
        }
        let row_repo_id: String = row.try_get("repo_id")?;
        if let Some(filter) = repo_id {
            if filter != row_repo_id {
                continue;
            }
        }
        let blob: Vec<u8> = row.try_get("vector")?;
        let vector = blob_to_vec(&blob);
        let cosine = cosine_similarity(&normalized_query, &vector);
        hits.push(SemanticHit {
            chunk_id: row.try_get("chunk_id")?,
            kind,
            repo_id: row_repo_id,
            path: row.try_get("path")?,
            start_line: row.try_get("start_line")?,
            end_line: row.try_get("end_line")?,
            text: row.try_get("text")?,
            cosine,
        });
    }

    hits.sort_by(|a, b| b.cosine.partial_cmp(&a.cosine).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(k);
    Ok(hits)
}

fn scope_matches(scope: Scope, kind: FtsKind) -> bool {
    match scope {
        Scope::Docs => kind == FtsKind::Doc,
        Scope::Code => kind == FtsKind::Code,
        Scope::All => true,
    }
}

#[derive(Debug, Clone)]
pub struct HybridHit {
    pub path: String,
    pub line_no: i64,
    pub snippet: String,
    pub score: f64,
}

/// `denseWeight · cosine + sparseWeight · normalizedFtsRank` (§4.7). FTS
/// hits are already rank-ordered by `bm25`; we convert rank position to a
/// `[0,1]` score since bm25's raw scale isn't directly comparable to cosine.
pub fn hybrid_score(semantic: &[SemanticHit], fts: &[FtsHit], dense_weight: f64, sparse_weight: f64, k: usize) -> Vec<HybridHit> {
    use std::collections::HashMap;

    let mut combined: HashMap<(String, i64), f64> = HashMap::new();
    let mut snippets: HashMap<(String, i64), String> = HashMap::new();

    for hit in semantic {
        let key = (hit.path.clone(), hit.start_line);
        *combined.entry(key.clone()).or_insert(0.0) += dense_weight * hit.cosine as f64;
        snippets.entry(key).or_insert_with(|| hit.text.clone());
    }

    let fts_len = fts.len().max(1);
    for (rank, hit) in fts.iter().enumerate() {
        let normalized_rank = 1.0 - (rank as f64 / fts_len as f64);
        let key = (hit.path.clone(), hit.line_no);
        *combined.entry(key.clone()).or_insert(0.0) += sparse_weight * normalized_rank;
        snippets.entry(key).or_insert_with(|| hit.snippet.clone());
    }

    let mut ranked: Vec<HybridHit> = combined
        .into_iter()
        .map(|((path, line_no), score)| HybridHit {
            snippet: snippets.remove(&(path.clone(), line_no)).unwrap_or_default(),
            path,
            line_no,
            score,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(id: &str, vector: Vec<f32>) -> VectorRow {
        VectorRow {
            chunk_id: id.to_string(),
            kind: FtsKind::Doc,
            repo_id: "x/y".to_string(),
            path: "repos/x/y/norm/a.md".to_string(),
            start_line: 1,
            end_line: 1,
            text: "sample".to_string(),
            vector,
        }
    }

    #[tokio::test]
    async fn search_ranks_closest_vector_first() {
        let dir = tempdir().unwrap();
        let pool = open(dir.path()).await.unwrap();
        rebuild(&pool, &[row("a", vec![1.0, 0.0]), row("b", vec![0.0, 1.0])]).await.unwrap();

        let hits = search(&pool, &[1.0, 0.0], 2, Scope::All, None).await.unwrap();
        assert_eq!(hits[0].chunk_id, "a");
        assert!(hits[0].cosine > hits[1].cosine);
    }

    #[test]
    fn hybrid_score_favors_items_present_in_both_signals() {
        let semantic = vec![SemanticHit {
            chunk_id: "a".into(),
            kind: FtsKind::Doc,
            repo_id: "x".into(),
            path: "f.md".into(),
            start_line: 3,
            end_line: 3,
            text: "t".into(),
            cosine: 0.9,
        }];
        let fts = vec![FtsHit {
            kind: FtsKind::Doc,
            repo_id: "x".into(),
            path: "f.md".into(),
            line_no: 3,
            snippet: "t".into(),
            score: 1.0,
        }];
        let ranked = hybrid_score(&semantic, &fts, 0.7, 0.3, 5);
        assert_eq!(ranked[0].path, "f.md");
        assert_eq!(ranked[0].line_no, 3);
    }
}
