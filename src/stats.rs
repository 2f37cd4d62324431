//! Index statistics for `docmesh stats`.
//!
//! Loads the persisted snapshot and prints its counts: documents by parse
//! status, postings, relation edges and a per-blob breakdown.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::models::{EdgeKind, ParseStatus};
use crate::snapshot::IndexSnapshot;
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub blobs: usize,
    pub skipped_blobs: usize,
    pub documents: usize,
    pub failed: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub terms: usize,
    pub postings: usize,
    pub sibling_edges: usize,
    pub topical_edges: usize,
    pub by_blob: Vec<BlobStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobStats {
    pub path: String,
    pub documents: usize,
    pub bytes: u64,
}

pub fn collect_stats(snapshot: &IndexSnapshot) -> IndexStats {
    let documents: Vec<_> = snapshot.documents().collect();
    let edges = snapshot.edges();

    let mut per_blob: BTreeMap<&str, usize> = BTreeMap::new();
    for doc in &documents {
        *per_blob.entry(doc.blob_path.as_str()).or_insert(0) += 1;
    }
    let by_blob = snapshot
        .blobs()
        .iter()
        .map(|b| BlobStats {
            path: b.path.clone(),
            documents: per_blob.get(b.path.as_str()).copied().unwrap_or(0),
            bytes: b.byte_len,
        })
        .collect();

    IndexStats {
        blobs: snapshot.blobs().len(),
        skipped_blobs: snapshot.skipped().len(),
        documents: documents.len(),
        failed: documents
            .iter()
            .filter(|d| d.status == ParseStatus::Failed)
            .count(),
        malformed: documents.iter().filter(|d| d.meta.malformed).count(),
        duplicates: documents.iter().filter(|d| d.duplicate_of.is_some()).count(),
        terms: snapshot.index().term_count(),
        postings: snapshot.index().posting_count(),
        sibling_edges: edges.iter().filter(|e| e.kind == EdgeKind::Sibling).count(),
        topical_edges: edges.iter().filter(|e| e.kind == EdgeKind::Topical).count(),
        by_blob,
    }
}

/// Run the stats command: load the snapshot and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let snapshot = store::open_snapshot(config).await?;
    let stats = collect_stats(&snapshot);

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docmesh index stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Built:       {}", format_age(snapshot.built_at()));
    println!();
    println!("  Blobs:       {} ({} skipped)", stats.blobs, stats.skipped_blobs);
    println!("  Documents:   {}", stats.documents);
    println!("    failed:    {}", stats.failed);
    println!("    malformed: {}", stats.malformed);
    println!("    duplicate: {}", stats.duplicates);
    println!("  Terms:       {}", stats.terms);
    println!("  Postings:    {}", stats.postings);
    println!(
        "  Edges:       {} sibling, {} topical",
        stats.sibling_edges, stats.topical_edges
    );

    if !stats.by_blob.is_empty() {
        println!();
        println!("  By blob:");
        println!("  {:<48} {:>6} {:>10}", "BLOB", "DOCS", "SIZE");
        println!("  {}", "-".repeat(66));
        for b in &stats.by_blob {
            println!(
                "  {:<48} {:>6} {:>10}",
                b.path,
                b.documents,
                format_bytes(b.bytes)
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_age(ts: chrono::DateTime<chrono::Utc>) -> String {
    let delta = (chrono::Utc::now() - ts).num_seconds();
    let stamp = ts.format("%Y-%m-%d %H:%M").to_string();

    if delta < 0 {
        stamp
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::build_from_blobs;
    use crate::models::RawBlob;
    use chrono::Utc;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(12), "12 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_collect_stats() {
        let text = "# A\n\nfirst\n<SEP>\n# B\n\nsecond\n<SEP>\n```rust\nfn main() {";
        let blobs = vec![RawBlob {
            path: "x.md".to_string(),
            byte_len: text.len() as u64,
            ingested_at: Utc::now(),
            content_hash: String::new(),
            text: text.to_string(),
        }];
        let config = Config::minimal("/tmp/unused", "<SEP>");
        let (snapshot, _) = build_from_blobs(blobs, Vec::new(), &config);

        let stats = collect_stats(&snapshot);
        assert_eq!(stats.blobs, 1);
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.sibling_edges, 3);
        assert_eq!(stats.by_blob[0].documents, 3);
        assert_eq!(stats.by_blob[0].bytes, text.len() as u64);
    }
}
