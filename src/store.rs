//! SQLite persistence for index snapshots.
//!
//! A build is written whole, inside one transaction, replacing whatever was
//! stored before. Postings, edges and structure trees are derived data, so
//! nothing is patched incrementally. Loading rebuilds an [`IndexSnapshot`]
//! with the same document IDs, postings and edges that were saved.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::Config;
use crate::index::InvertedIndex;
use crate::models::{
    Document, EdgeKind, Namespace, ParseStatus, Posting, RawBlob, RelationEdge, SkippedBlob,
};
use crate::resolve::sort_edges;
use crate::snapshot::IndexSnapshot;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create all tables. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS build_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS blobs (
            path TEXT PRIMARY KEY,
            byte_len INTEGER NOT NULL,
            ingested_at TEXT NOT NULL,
            content_hash TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS skipped_blobs (
            path TEXT NOT NULL,
            reason TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            blob_path TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            title TEXT NOT NULL,
            raw_text TEXT NOT NULL,
            status TEXT NOT NULL,
            meta_json TEXT NOT NULL,
            tree_json TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            duplicate_of TEXT,
            UNIQUE(blob_path, ordinal)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS postings (
            term TEXT NOT NULL,
            namespace TEXT NOT NULL,
            document_id TEXT NOT NULL,
            frequency INTEGER NOT NULL,
            positions_json TEXT NOT NULL,
            PRIMARY KEY (term, namespace, document_id),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS edges (
            a TEXT NOT NULL,
            b TEXT NOT NULL,
            kind TEXT NOT NULL,
            strength REAL NOT NULL,
            PRIMARY KEY (a, b, kind)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_postings_document_id ON postings(document_id)",
        "CREATE INDEX IF NOT EXISTS idx_documents_blob_path ON documents(blob_path)",
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }
    Ok(())
}

/// Replace the stored snapshot with `snapshot`.
pub async fn save_snapshot(pool: &SqlitePool, snapshot: &IndexSnapshot) -> Result<()> {
    let mut tx = pool.begin().await?;

    for sql in [
        "DELETE FROM postings",
        "DELETE FROM edges",
        "DELETE FROM documents",
        "DELETE FROM blobs",
        "DELETE FROM skipped_blobs",
        "DELETE FROM build_info",
    ] {
        sqlx::query(sql).execute(&mut *tx).await?;
    }

    for blob in snapshot.blobs() {
        sqlx::query(
            "INSERT INTO blobs (path, byte_len, ingested_at, content_hash) VALUES (?, ?, ?, ?)",
        )
        .bind(&blob.path)
        .bind(blob.byte_len as i64)
        .bind(blob.ingested_at.to_rfc3339())
        .bind(&blob.content_hash)
        .execute(&mut *tx)
        .await?;
    }

    for skipped in snapshot.skipped() {
        sqlx::query("INSERT INTO skipped_blobs (path, reason) VALUES (?, ?)")
            .bind(&skipped.path)
            .bind(&skipped.reason)
            .execute(&mut *tx)
            .await?;
    }

    for doc in snapshot.documents() {
        sqlx::query(
            r#"
            INSERT INTO documents (id, blob_path, ordinal, title, raw_text, status, meta_json, tree_json, content_hash, duplicate_of)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.blob_path)
        .bind(doc.ordinal as i64)
        .bind(&doc.title)
        .bind(&doc.raw_text)
        .bind(doc.status.as_str())
        .bind(serde_json::to_string(&doc.meta)?)
        .bind(serde_json::to_string(&doc.tree)?)
        .bind(&doc.content_hash)
        .bind(&doc.duplicate_of)
        .execute(&mut *tx)
        .await?;
    }

    for posting in snapshot.index().all_postings() {
        sqlx::query(
            "INSERT INTO postings (term, namespace, document_id, frequency, positions_json) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&posting.term)
        .bind(posting.namespace.key())
        .bind(&posting.document_id)
        .bind(posting.frequency as i64)
        .bind(serde_json::to_string(&posting.positions)?)
        .execute(&mut *tx)
        .await?;
    }

    for edge in snapshot.edges() {
        sqlx::query("INSERT INTO edges (a, b, kind, strength) VALUES (?, ?, ?, ?)")
            .bind(&edge.a)
            .bind(&edge.b)
            .bind(edge.kind.as_str())
            .bind(edge.strength)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("INSERT INTO build_info (key, value) VALUES ('built_at', ?)")
        .bind(snapshot.built_at().to_rfc3339())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn load_snapshot(pool: &SqlitePool) -> Result<IndexSnapshot> {
    let built_at: Option<String> =
        sqlx::query_scalar("SELECT value FROM build_info WHERE key = 'built_at'")
            .fetch_optional(pool)
            .await?;
    let Some(built_at) = built_at else {
        bail!("no index has been built yet; run `docmesh build` first");
    };
    let built_at = parse_ts(&built_at)?;

    let blob_rows =
        sqlx::query("SELECT path, byte_len, ingested_at, content_hash FROM blobs ORDER BY path")
            .fetch_all(pool)
            .await?;
    let mut blobs = Vec::with_capacity(blob_rows.len());
    for row in &blob_rows {
        let ingested_at: String = row.get("ingested_at");
        blobs.push(RawBlob {
            path: row.get("path"),
            byte_len: row.get::<i64, _>("byte_len") as u64,
            ingested_at: parse_ts(&ingested_at)?,
            content_hash: row.get("content_hash"),
            text: String::new(),
        });
    }

    let skipped: Vec<SkippedBlob> =
        sqlx::query("SELECT path, reason FROM skipped_blobs ORDER BY path")
            .fetch_all(pool)
            .await?
            .iter()
            .map(|row| SkippedBlob {
                path: row.get("path"),
                reason: row.get("reason"),
            })
            .collect();

    let doc_rows = sqlx::query(
        "SELECT id, blob_path, ordinal, title, raw_text, status, meta_json, tree_json, content_hash, duplicate_of FROM documents ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    let mut documents = Vec::with_capacity(doc_rows.len());
    for row in &doc_rows {
        let status: String = row.get("status");
        let meta_json: String = row.get("meta_json");
        let tree_json: String = row.get("tree_json");
        let id: String = row.get("id");
        documents.push(Document {
            status: parse_status(&status)
                .ok_or_else(|| anyhow!("unknown parse status '{}' for {}", status, id))?,
            meta: serde_json::from_str(&meta_json)
                .with_context(|| format!("corrupt metadata for document {}", id))?,
            tree: serde_json::from_str(&tree_json)
                .with_context(|| format!("corrupt structure tree for document {}", id))?,
            id,
            blob_path: row.get("blob_path"),
            ordinal: row.get::<i64, _>("ordinal") as usize,
            title: row.get("title"),
            raw_text: row.get("raw_text"),
            content_hash: row.get("content_hash"),
            duplicate_of: row.get("duplicate_of"),
        });
    }

    let posting_rows =
        sqlx::query("SELECT term, namespace, document_id, positions_json FROM postings")
            .fetch_all(pool)
            .await?;
    let mut by_doc: HashMap<String, Vec<Posting>> = HashMap::new();
    for row in &posting_rows {
        let namespace: String = row.get("namespace");
        let positions_json: String = row.get("positions_json");
        let positions: Vec<u32> = serde_json::from_str(&positions_json)?;
        let document_id: String = row.get("document_id");
        by_doc.entry(document_id.clone()).or_default().push(Posting {
            term: row.get("term"),
            namespace: Namespace::from_key(&namespace),
            document_id,
            frequency: positions.len() as u32,
            positions,
        });
    }

    let mut index = InvertedIndex::new();
    for doc in &documents {
        index.index_document(&doc.id, by_doc.remove(&doc.id).unwrap_or_default());
    }

    let mut edges = Vec::new();
    for row in sqlx::query("SELECT a, b, kind, strength FROM edges")
        .fetch_all(pool)
        .await?
    {
        let kind: String = row.get("kind");
        edges.push(RelationEdge {
            a: row.get("a"),
            b: row.get("b"),
            kind: EdgeKind::parse(&kind).ok_or_else(|| anyhow!("unknown edge kind '{}'", kind))?,
            strength: row.get("strength"),
        });
    }
    sort_edges(&mut edges);

    Ok(IndexSnapshot::new(
        built_at, blobs, skipped, documents, index, edges,
    ))
}

/// Create the database file and schema. Used by `docmesh init`.
pub async fn init_db(config: &Config) -> Result<()> {
    let pool = connect(config).await?;
    let migrated = run_migrations(&pool).await;
    pool.close().await;
    migrated
}

/// Connect, migrate and replace the stored snapshot.
pub async fn persist_snapshot(config: &Config, snapshot: &IndexSnapshot) -> Result<()> {
    let pool = connect(config).await?;
    run_migrations(&pool).await?;
    let saved = save_snapshot(&pool, snapshot).await;
    pool.close().await;
    saved
}

/// Connect, migrate and load the stored snapshot for read commands.
pub async fn open_snapshot(config: &Config) -> Result<IndexSnapshot> {
    let pool = connect(config).await?;
    run_migrations(&pool).await?;
    let snapshot = load_snapshot(&pool).await;
    pool.close().await;
    snapshot
}

fn parse_status(s: &str) -> Option<ParseStatus> {
    match s {
        "unparsed" => Some(ParseStatus::Unparsed),
        "parsed" => Some(ParseStatus::Parsed),
        "failed" => Some(ParseStatus::Failed),
        _ => None,
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp: {}", s))?
        .with_timezone(&Utc))
}
