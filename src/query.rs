//! Query service: search, related documents and tables of contents.
//!
//! Every call takes the current [`IndexSnapshot`] from the shared
//! [`SnapshotHandle`] once and answers entirely from it, so a rebuild that
//! swaps the snapshot mid-request cannot mix old and new data.
//!
//! Bad input and missing documents are errors ([`Error::InvalidQuery`],
//! [`Error::NotFound`]); a valid query with no matches is an empty `Ok`.
//!
//! The `run_*` functions are the CLI entry points. They load the persisted
//! snapshot and print to stdout.

use serde::Serialize;
use std::sync::Arc;

use crate::config::{Config, RetrievalConfig};
use crate::error::{Error, Result};
use crate::models::{Document, EdgeKind, NodeKind, StructureNode, TocEntry};
use crate::snapshot::{IndexSnapshot, SnapshotHandle};
use crate::store;
use crate::tokenize::Tokenizer;

/// A single ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub score: f64,
    pub snippet: String,
    pub blob_path: String,
    pub ordinal: usize,
}

/// A document reachable from another through a relation edge.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedDocument {
    pub id: String,
    pub title: String,
    pub kind: EdgeKind,
    pub strength: f64,
    pub blob_path: String,
    pub ordinal: usize,
}

pub struct QueryService {
    snapshots: Arc<SnapshotHandle>,
    tokenizer: Tokenizer,
    retrieval: RetrievalConfig,
    code_weight: f64,
}

impl QueryService {
    pub fn new(snapshots: Arc<SnapshotHandle>, config: &Config) -> Self {
        Self {
            snapshots,
            tokenizer: Tokenizer::from_config(&config.index),
            retrieval: config.retrieval.clone(),
            code_weight: config.index.code_weight,
        }
    }

    /// The handle this service reads from. Rebuilds swap through it.
    pub fn handle(&self) -> &Arc<SnapshotHandle> {
        &self.snapshots
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshots.load()
    }

    /// Rank documents for `query` by summed TF-IDF.
    ///
    /// `limit` defaults to `retrieval.final_limit`. A query whose every token
    /// is a stopword (or too short) is valid and matches nothing.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".to_string()));
        }
        let limit = limit.unwrap_or(self.retrieval.final_limit);
        if limit == 0 {
            return Err(Error::InvalidQuery("limit must be at least 1".to_string()));
        }

        let terms = self.tokenizer.terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.snapshots.load();
        let hits = snapshot
            .index()
            .rank(&terms, self.code_weight)
            .into_iter()
            .filter_map(|(id, score)| {
                let doc = snapshot.document(&id)?;
                Some(SearchHit {
                    snippet: self.snippet(&doc.raw_text, &terms),
                    title: doc.title.clone(),
                    blob_path: doc.blob_path.clone(),
                    ordinal: doc.ordinal,
                    id,
                    score,
                })
            })
            .take(limit)
            .collect();

        Ok(hits)
    }

    /// Documents related to `id`: siblings in ordinal order, then topical
    /// neighbours by descending strength (ties by ID).
    pub fn related_to(&self, id: &str) -> Result<Vec<RelatedDocument>> {
        let snapshot = self.snapshots.load();
        if snapshot.document(id).is_none() {
            return Err(Error::not_found(id));
        }

        let mut siblings = Vec::new();
        let mut topical = Vec::new();
        for edge in snapshot.edges_of(id) {
            let Some(other) = edge.other(id).and_then(|o| snapshot.document(o)) else {
                continue;
            };
            let related = RelatedDocument {
                id: other.id.clone(),
                title: other.title.clone(),
                kind: edge.kind,
                strength: edge.strength,
                blob_path: other.blob_path.clone(),
                ordinal: other.ordinal,
            };
            match edge.kind {
                EdgeKind::Sibling => siblings.push(related),
                EdgeKind::Topical => topical.push(related),
            }
        }

        siblings.sort_by_key(|r| r.ordinal);
        topical.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        siblings.extend(topical);
        Ok(siblings)
    }

    /// Heading-only projection of the document's structure tree.
    pub fn table_of_contents(&self, id: &str) -> Result<Vec<TocEntry>> {
        let snapshot = self.snapshots.load();
        let doc = snapshot.document(id).ok_or_else(|| Error::not_found(id))?;
        Ok(toc_entries(&doc.tree))
    }

    pub fn get_document(&self, id: &str) -> Result<Document> {
        self.snapshots
            .load()
            .document(id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))
    }

    /// Text around the first token of `text` matching one of `terms`,
    /// or the leading text when none does.
    fn snippet(&self, text: &str, terms: &[String]) -> String {
        let width = self.retrieval.snippet_chars;
        let first_match = self
            .tokenizer
            .tokens(text)
            .into_iter()
            .find(|t| terms.contains(&t.term));

        let (start, end) = match first_match {
            Some(token) => {
                let half = width / 2;
                let start = floor_boundary(text, token.start.saturating_sub(half));
                let end = ceil_boundary(text, start.saturating_add(width).min(text.len()));
                (start, end)
            }
            None => (0, ceil_boundary(text, width.min(text.len()))),
        };

        let body = text[start..end]
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let mut out = String::new();
        if start > 0 {
            out.push_str("...");
        }
        out.push_str(&body);
        if end < text.len() {
            out.push_str("...");
        }
        out
    }
}

// Heading depth is bounded by the six heading levels, so recursion stays shallow.
fn toc_entries(node: &StructureNode) -> Vec<TocEntry> {
    let mut out = Vec::new();
    for child in &node.children {
        match child.kind {
            NodeKind::Heading { level } => out.push(TocEntry {
                level,
                text: child.text.clone(),
                span: child.span,
                children: toc_entries(child),
            }),
            _ => out.extend(toc_entries(child)),
        }
    }
    out
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

// ============ CLI ============

async fn open_service(config: &Config) -> anyhow::Result<QueryService> {
    let snapshot = store::open_snapshot(config).await?;
    Ok(QueryService::new(
        Arc::new(SnapshotHandle::new(snapshot)),
        config,
    ))
}

/// Print the error and exit non-zero. Used for `NotFound` and `InvalidQuery`.
fn exit_with(e: Error) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let service = open_service(config).await?;
    let hits = service.search(query, limit).unwrap_or_else(|e| exit_with(e));

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({}#{})",
            i + 1,
            hit.score,
            hit.title,
            hit.blob_path,
            hit.ordinal
        );
        println!("    id: {}", hit.id);
        println!("    > {}", hit.snippet);
        println!();
    }

    Ok(())
}

pub async fn run_related(config: &Config, id: &str) -> anyhow::Result<()> {
    let service = open_service(config).await?;
    let related = service.related_to(id).unwrap_or_else(|e| exit_with(e));

    if related.is_empty() {
        println!("No related documents.");
        return Ok(());
    }

    for r in &related {
        println!(
            "{:<8} {:.3}  {}  {} ({}#{})",
            r.kind.as_str(),
            r.strength,
            r.id,
            r.title,
            r.blob_path,
            r.ordinal
        );
    }
    Ok(())
}

pub async fn run_toc(config: &Config, id: &str) -> anyhow::Result<()> {
    let service = open_service(config).await?;
    let toc = service.table_of_contents(id).unwrap_or_else(|e| exit_with(e));

    if toc.is_empty() {
        println!("(no headings)");
        return Ok(());
    }

    let mut stack: Vec<(usize, &TocEntry)> = toc.iter().rev().map(|e| (0, e)).collect();
    while let Some((depth, entry)) = stack.pop() {
        println!("{}{} {}", "  ".repeat(depth), "#".repeat(entry.level as usize), entry.text);
        stack.extend(entry.children.iter().rev().map(|c| (depth + 1, c)));
    }
    Ok(())
}

pub async fn run_get(config: &Config, id: &str) -> anyhow::Result<()> {
    let service = open_service(config).await?;
    let doc = service.get_document(id).unwrap_or_else(|e| exit_with(e));

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("title:        {}", doc.title);
    println!("blob:         {}", doc.blob_path);
    println!("ordinal:      {}", doc.ordinal);
    println!("status:       {}", doc.status.as_str());
    println!("words:        {}", doc.meta.word_count);
    if !doc.meta.code_languages.is_empty() {
        let langs: Vec<&str> = doc.meta.code_languages.iter().map(|s| s.as_str()).collect();
        println!("languages:    {}", langs.join(", "));
    }
    if !doc.meta.callouts.is_empty() {
        println!("callouts:     {}", doc.meta.callouts.join(", "));
    }
    if doc.meta.malformed {
        println!("malformed:    true");
    }
    if let Some(ref original) = doc.duplicate_of {
        println!("duplicate of: {}", original);
    }
    println!();

    println!("--- Body ---");
    println!("{}", doc.raw_text);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::build_from_blobs;
    use crate::models::RawBlob;
    use crate::segment::document_id;
    use chrono::Utc;

    fn blob(path: &str, text: &str) -> RawBlob {
        RawBlob {
            path: path.to_string(),
            byte_len: text.len() as u64,
            ingested_at: Utc::now(),
            content_hash: String::new(),
            text: text.to_string(),
        }
    }

    fn service_for(blobs: Vec<RawBlob>) -> QueryService {
        let config = Config::minimal("/tmp/unused", "<SEP>");
        let (snapshot, _) = build_from_blobs(blobs, Vec::new(), &config);
        QueryService::new(Arc::new(SnapshotHandle::new(snapshot)), &config)
    }

    fn corpus() -> QueryService {
        service_for(vec![
            blob(
                "guides.md",
                "# Async Rust\n\nTokio runs futures on a scheduler.\n<SEP>\n# Error handling\n\nUse anyhow in binaries.\n<SEP>\n# Testing\n\nWrite tests.",
            ),
            blob(
                "more.md",
                "# Async Rust patterns\n\nSelect and join.\n\n```rust\nasync fn run() {}\n```",
            ),
        ])
    }

    #[test]
    fn test_empty_query_is_invalid() {
        let service = corpus();
        assert!(matches!(service.search("", None), Err(Error::InvalidQuery(_))));
        assert!(matches!(service.search("  \t\n", None), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_no_match_is_empty_ok() {
        let service = corpus();
        assert!(service.search("nonexistenttoken", None).unwrap().is_empty());
        // Only stopwords: valid input, nothing to match.
        assert!(service.search("the of", None).unwrap().is_empty());
    }

    #[test]
    fn test_search_ranks_and_snippets() {
        let service = corpus();
        let hits = service.search("tokio", None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Async Rust");
        assert_eq!(hits[0].id, document_id("guides.md", 0));
        assert!(hits[0].snippet.contains("Tokio"));
        assert!(hits[0].score > 0.0);

        let hits = service.search("async", None).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_search_respects_limit() {
        let service = corpus();
        assert_eq!(service.search("async", Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_snippet_windows_long_text() {
        let filler = "lorem ipsum ".repeat(100);
        let service = service_for(vec![blob("long.md", &format!("{}needle {}", filler, filler))]);
        let hits = service.search("needle", None).unwrap();
        let snippet = &hits[0].snippet;
        assert!(snippet.contains("needle"));
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert!(snippet.len() < 300);
    }

    #[test]
    fn test_related_unknown_is_not_found() {
        let service = corpus();
        assert!(matches!(
            service.related_to("does-not-exist"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            service.table_of_contents("does-not-exist"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            service.get_document("does-not-exist"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_sibling_completeness_and_order() {
        let service = corpus();
        for ordinal in 0..3 {
            let id = document_id("guides.md", ordinal);
            let related = service.related_to(&id).unwrap();
            let siblings: Vec<&RelatedDocument> = related
                .iter()
                .filter(|r| r.kind == EdgeKind::Sibling)
                .collect();
            assert_eq!(siblings.len(), 2);
            assert!(siblings.iter().all(|r| r.blob_path == "guides.md"));
            assert!(siblings.windows(2).all(|w| w[0].ordinal < w[1].ordinal));

            // Siblings come before any topical neighbour.
            let first_topical = related.iter().position(|r| r.kind == EdgeKind::Topical);
            if let Some(pos) = first_topical {
                assert!(pos >= siblings.len());
            }
        }
    }

    #[test]
    fn test_topical_neighbour_found() {
        let service = corpus();
        let related = service.related_to(&document_id("more.md", 0)).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].kind, EdgeKind::Topical);
        assert_eq!(related[0].id, document_id("guides.md", 0));
        assert!(related[0].strength > 0.15);
    }

    #[test]
    fn test_toc_reproduces_nesting() {
        let service = service_for(vec![blob(
            "toc.md",
            "# One\n\nintro\n\n## Two\n\ntext\n\n### Three\n\n- item\n\n## Four",
        )]);
        let toc = service.table_of_contents(&document_id("toc.md", 0)).unwrap();
        assert_eq!(toc.len(), 1);
        assert_eq!(toc[0].text, "One");
        assert_eq!(toc[0].children.len(), 2);
        assert_eq!(toc[0].children[0].text, "Two");
        assert_eq!(toc[0].children[0].children[0].text, "Three");
        assert_eq!(toc[0].children[0].children[0].level, 3);
        assert_eq!(toc[0].children[1].text, "Four");
        assert!(toc[0].children[1].children.is_empty());
    }

    #[test]
    fn test_get_document_returns_body() {
        let service = corpus();
        let doc = service.get_document(&document_id("guides.md", 1)).unwrap();
        assert_eq!(doc.title, "Error handling");
        assert!(doc.raw_text.contains("anyhow"));
    }

    #[test]
    fn test_reader_keeps_snapshot_across_swap() {
        let service = corpus();
        let before = service.snapshot();
        service.handle().swap(IndexSnapshot::empty());
        assert!(service.search("tokio", None).unwrap().is_empty());
        assert_eq!(before.document_count(), 4);
    }
}
