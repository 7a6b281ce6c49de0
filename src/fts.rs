//! FTS Index (FTS) — §4.6.
//!
//! Per-bundle SQLite database (`indexes/search.sqlite3`) with a single
//! FTS5 virtual table built from `repos/*/norm/**`. The teacher's original
//! `migrate.rs`/`search.rs` used `sqlx` with idempotent
//! `CREATE TABLE IF NOT EXISTS` migrations and a similar tokenize-then-match
//! query pipeline against a single shared database; here the same idiom
//! (sqlx pool, `sqlite_master` presence checks, one bulk-insert transaction
//! per rebuild) is applied to a one-database-per-bundle layout instead.

use crate::models::{FileKind, FtsKind, IngestedFile};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

pub const DB_RELATIVE_PATH: &str = "indexes/search.sqlite3";

/// Open (creating if absent) the per-bundle search database in WAL mode.
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
        "CREATE VIRTUAL TABLE IF NOT EXISTS lines USING fts5(
            bundle_rel_path UNINDEXED,
            kind UNINDEXED,
            repo_id UNINDEXED,
            line_no UNINDEXED,
            text
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            repo_id TEXT NOT NULL,
            lines INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Rebuild the whole index from the `norm/` tree of every ingested doc/code
/// file. There is no incremental update — a rebuild replaces everything in
/// one transaction (§4.6).
pub async fn rebuild(pool: &SqlitePool, bundle_root: &Path, files: &[IngestedFile]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM lines").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM files").execute(&mut *tx).await?;

    let mut total_rows = 0usize;
    for file in files {
        let fts_kind = match file.kind {
            FileKind::Doc => FtsKind::Doc,
            FileKind::Code => FtsKind::Code,
            FileKind::Asset => continue,
        };
        let norm_path = bundle_root.join(&file.bundle_norm_relative_path);
        let Ok(contents) = std::fs::read_to_string(&norm_path) else {
            continue;
        };
        let mut line_count = 0i64;
        for (idx, line) in contents.lines().enumerate() {
            let line_no = (idx + 1) as i64;
            sqlx::query("INSERT INTO lines (bundle_rel_path, kind, repo_id, line_no, text) VALUES (?, ?, ?, ?, ?)")
                .bind(&file.bundle_norm_relative_path)
                .bind(kind_str(fts_kind))
                .bind(&file.repo_id)
                .bind(line_no)
                .bind(line)
                .execute(&mut *tx)
                .await?;
            line_count = line_no;
            total_rows += 1;
        }
        sqlx::query("INSERT OR REPLACE INTO files (path, kind, repo_id, lines) VALUES (?, ?, ?, ?)")
            .bind(&file.bundle_norm_relative_path)
            .bind(kind_str(fts_kind))
            .bind(&file.repo_id)
            .bind(line_count)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(total_rows)
}

fn kind_str(kind: FtsKind) -> &'static str {
    match kind {
        FtsKind::Doc => "doc",
        FtsKind::Code => "code",
    }
}

/// `buildFtsQuery` — §4.6 step 1. `fts:` prefix passes the remainder
/// through untouched (trusted raw FTS5 syntax); otherwise tokenize by
/// Unicode word boundaries, lower-case, cap at `max_tokens`, escape `"`
/// inside each token, quote each token, join with `OR`.
pub fn build_fts_query(input: &str, max_tokens: usize) -> String {
    if let Some(raw) = input.strip_prefix("fts:") {
        return raw.to_string();
    }
    let tokens: Vec<String> = input
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase().replace('"', "\"\""))
        .take(max_tokens)
        .collect();
    tokens
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[derive(Debug, Clone)]
pub struct FtsHit {
    pub kind: FtsKind,
    pub repo_id: String,
    pub path: String,
    pub line_no: i64,
    pub snippet: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Docs,
    Code,
    All,
}

/// Match against FTS5, filter by `scope`, order by rank, limit `N` (§4.6
/// step 2/3). Empty `match_expr` (e.g. all tokens stripped) returns no hits.
pub async fn search(pool: &SqlitePool, input: &str, max_tokens: usize, scope: Scope, limit: i64) -> Result<Vec<FtsHit>> {
    let match_expr = build_fts_query(input, max_tokens);
    if match_expr.trim().is_empty() {
        return Ok(Vec::new());
    }

    let scope_clause = match scope {
        Scope::Docs => " AND kind = 'doc'",
        Scope::Code => " AND kind = 'code'",
        Scope::All => "",
    };
    let sql = format!(
        "SELECT bundle_rel_path, kind, repo_id, line_no, text, bm25(lines) AS score
         FROM lines WHERE lines MATCH ?{scope_clause}
         ORDER BY score LIMIT ?"
    );

    let rows = sqlx::query(&sql).bind(&match_expr).bind(limit).fetch_all(pool).await?;
    let mut hits = Vec::with_capacity(rows.len());
    for row in rows {
        let kind: String = row.try_get("kind")?;
        hits.push(FtsHit {
            kind: if kind == "doc" { FtsKind::Doc } else { FtsKind::Code },
            repo_id: row.try_get("repo_id")?,
            path: row.try_get("bundle_rel_path")?,
            line_no: row.try_get("line_no")?,
            snippet: row.try_get("text")?,
            score: row.try_get("score")?,
        });
    }
    Ok(hits)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimConfidence {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct ClaimVerification {
    pub supporting: Vec<FtsHit>,
    pub contradicting: Vec<FtsHit>,
    pub related: Vec<FtsHit>,
    pub confidence: ClaimConfidence,
    pub summary: String,
}

/// `verifyClaimInIndex` — §4.6. Runs three sub-queries (claim terms, claim
/// plus negation markers, claim plus neutral words) and classifies hits.
pub async fn verify_claim_in_index(pool: &SqlitePool, claim: &str, max_tokens: usize, scope: Scope, limit: i64) -> Result<ClaimVerification> {
    let supporting = search(pool, claim, max_tokens, scope, limit).await?;

    let negated = format!("{claim} does not OR {claim} not OR {claim} except");
    let contradicting = search(pool, &negated, max_tokens, scope, limit).await?;

    let neutral = format!("{claim} overview OR {claim} mentions OR {claim} about");
    let related = search(pool, &neutral, max_tokens, scope, limit).await?;

    let confidence = classify_confidence(supporting.len(), contradicting.len());
    let summary = format!(
        "{} supporting, {} contradicting, {} related hit(s) for claim '{claim}'",
        supporting.len(),
        contradicting.len(),
        related.len()
    );

    Ok(ClaimVerification {
        supporting,
        contradicting,
        related,
        confidence,
        summary,
    })
}

fn classify_confidence(supporting: usize, contradicting: usize) -> ClaimConfidence {
    match (supporting, contradicting) {
        (0, 0) => ClaimConfidence::None,
        (s, c) if s > 0 && c > 0 => {
            if s >= 3 || c >= 3 {
                ClaimConfidence::Medium
            } else {
                ClaimConfidence::Low
            }
        }
        (s, 0) if s >= 3 => ClaimConfidence::High,
        (s, 0) if s > 0 => ClaimConfidence::Medium,
        (0, c) if c > 0 => ClaimConfidence::Low,
        _ => ClaimConfidence::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;
    use tempfile::tempdir;

    fn sample_file(bundle_root: &Path, rel: &str, kind: FileKind, content: &str) -> IngestedFile {
        let full = bundle_root.join(rel);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, content).unwrap();
        IngestedFile {
            repo_id: "x/y".to_string(),
            kind,
            repo_relative_path: "README.md".to_string(),
            bundle_norm_relative_path: rel.to_string(),
            sha256: "deadbeef".to_string(),
            bytes: content.len() as u64,
        }
    }

    #[test]
    fn fts_query_tokenizes_and_caps() {
        let q = build_fts_query("Hello, World! extra words here", 2);
        assert_eq!(q, "\"hello\" OR \"world\"");
    }

    #[test]
    fn fts_query_passthrough_for_raw_prefix() {
        let q = build_fts_query("fts:\"exact phrase\"", 12);
        assert_eq!(q, "\"exact phrase\"");
    }

    #[tokio::test]
    async fn search_finds_hello_world_line() {
        let dir = tempdir().unwrap();
        let file = sample_file(dir.path(), "repos/x/y/norm/README.md", FileKind::Doc, "intro\nHello, world!\noutro\n");

        let pool = open(dir.path()).await.unwrap();
        rebuild(&pool, dir.path(), &[file]).await.unwrap();

        let hits = search(&pool, "hello world", 12, Scope::All, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_no, 2);
        assert_eq!(hits[0].path, "repos/x/y/norm/README.md");
    }
}
