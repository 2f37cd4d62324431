//! Ingestion pipeline orchestration.
//!
//! Coordinates a full build: scan → segment → parse → analyze per blob,
//! then a single-writer merge into the inverted index, duplicate marking and
//! cross-reference resolution. Blobs share no mutable state during the
//! per-blob phase, so each one runs on its own blocking task. A blob whose
//! task fails is skipped; the rest of the batch proceeds.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connector_fs::{self, CorpusScan};
use crate::index::{analyze, InvertedIndex};
use crate::models::{Document, EdgeKind, ParseStatus, Posting, RawBlob, SkippedBlob};
use crate::parse::parse_document;
use crate::resolve::resolve;
use crate::segment::{document_id, normalized_hash, segment};
use crate::snapshot::IndexSnapshot;
use crate::store;
use crate::tokenize::Tokenizer;

/// Documents and per-document postings produced from one blob.
#[derive(Debug, Clone)]
pub struct BlobOutput {
    pub documents: Vec<Document>,
    pub postings: Vec<Vec<Posting>>,
}

/// Summary of a build, printed by `docmesh build` and returned by `/rebuild`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub blobs: usize,
    pub skipped: Vec<SkippedBlob>,
    pub documents: usize,
    pub malformed: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub terms: usize,
    pub postings: usize,
    pub sibling_edges: usize,
    pub topical_edges: usize,
}

/// Segment, parse and analyze one blob. Pure; safe to run on any thread.
pub fn process_blob(blob: &RawBlob, config: &Config, tokenizer: &Tokenizer) -> BlobOutput {
    let stubs = segment(&blob.text, &config.corpus.separator);
    debug!(path = %blob.path, documents = stubs.len(), "segmented blob");

    let mut documents = Vec::with_capacity(stubs.len());
    let mut postings = Vec::with_capacity(stubs.len());

    for stub in stubs {
        let id = document_id(&blob.path, stub.ordinal);
        let parsed = parse_document(&stub.text, &config.parser);

        if parsed.meta.malformed {
            warn!(
                document = %id,
                path = %blob.path,
                ordinal = stub.ordinal,
                "malformed document indexed with best-effort structure"
            );
        }

        let doc_postings = match parsed.status {
            ParseStatus::Parsed => analyze(&id, &parsed.tree, tokenizer),
            _ => Vec::new(),
        };

        documents.push(Document {
            id,
            blob_path: blob.path.clone(),
            ordinal: stub.ordinal,
            title: parsed.meta.title.clone(),
            content_hash: normalized_hash(&stub.text),
            raw_text: stub.text,
            status: parsed.status,
            meta: parsed.meta,
            tree: parsed.tree,
            duplicate_of: None,
        });
        postings.push(doc_postings);
    }

    BlobOutput {
        documents,
        postings,
    }
}

/// Mark every document whose normalized text equals that of a document with
/// a smaller ID.
pub fn mark_duplicates(documents: &mut [Document]) {
    let mut order: Vec<usize> = (0..documents.len()).collect();
    order.sort_by(|&a, &b| documents[a].id.cmp(&documents[b].id));

    let mut first_seen: HashMap<String, String> = HashMap::new();
    for i in order {
        let doc = &mut documents[i];
        match first_seen.get(&doc.content_hash) {
            Some(original) => doc.duplicate_of = Some(original.clone()),
            None => {
                doc.duplicate_of = None;
                first_seen.insert(doc.content_hash.clone(), doc.id.clone());
            }
        }
    }
}

/// The single-writer merge phase: fold per-blob outputs into one snapshot.
pub fn assemble(
    blobs: Vec<RawBlob>,
    skipped: Vec<SkippedBlob>,
    outputs: Vec<BlobOutput>,
    config: &Config,
    tokenizer: &Tokenizer,
) -> (IndexSnapshot, BuildReport) {
    let mut index = InvertedIndex::new();
    let mut documents = Vec::new();

    for output in outputs {
        for (doc, postings) in output.documents.into_iter().zip(output.postings) {
            index.index_document(&doc.id, postings);
            documents.push(doc);
        }
    }

    mark_duplicates(&mut documents);
    let edges = resolve(&documents, tokenizer, &config.resolver);

    let report = BuildReport {
        blobs: blobs.len(),
        skipped: skipped.clone(),
        documents: documents.len(),
        malformed: documents.iter().filter(|d| d.meta.malformed).count(),
        failed: documents
            .iter()
            .filter(|d| d.status == ParseStatus::Failed)
            .count(),
        duplicates: documents.iter().filter(|d| d.duplicate_of.is_some()).count(),
        terms: index.term_count(),
        postings: index.posting_count(),
        sibling_edges: edges.iter().filter(|e| e.kind == EdgeKind::Sibling).count(),
        topical_edges: edges.iter().filter(|e| e.kind == EdgeKind::Topical).count(),
    };

    let snapshot = IndexSnapshot::new(Utc::now(), blobs, skipped, documents, index, edges);
    (snapshot, report)
}

/// Build a snapshot from already-read blobs on the current thread.
pub fn build_from_blobs(
    blobs: Vec<RawBlob>,
    skipped: Vec<SkippedBlob>,
    config: &Config,
) -> (IndexSnapshot, BuildReport) {
    let tokenizer = Tokenizer::from_config(&config.index);
    let outputs = blobs
        .iter()
        .map(|blob| process_blob(blob, config, &tokenizer))
        .collect();
    assemble(blobs, skipped, outputs, config, &tokenizer)
}

/// Scan the corpus root and build a snapshot, processing blobs in parallel.
pub async fn build_snapshot(config: &Config) -> Result<(IndexSnapshot, BuildReport)> {
    let scan_config = config.clone();
    let CorpusScan { blobs, mut skipped } =
        tokio::task::spawn_blocking(move || connector_fs::scan_corpus(&scan_config)).await??;

    let config = Arc::new(config.clone());
    let tokenizer = Arc::new(Tokenizer::from_config(&config.index));

    let mut handles = Vec::with_capacity(blobs.len());
    for blob in blobs {
        let config = config.clone();
        let tokenizer = tokenizer.clone();
        let path = blob.path.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let output = process_blob(&blob, &config, &tokenizer);
            (blob, output)
        });
        handles.push((path, handle));
    }

    // Awaited in spawn order so the merge is deterministic.
    let mut kept_blobs = Vec::with_capacity(handles.len());
    let mut outputs = Vec::with_capacity(handles.len());
    for (path, handle) in handles {
        match handle.await {
            Ok((blob, output)) => {
                kept_blobs.push(blob);
                outputs.push(output);
            }
            Err(e) => {
                warn!(path = %path, error = %e, "blob worker failed; blob excluded from build");
                skipped.push(SkippedBlob {
                    path,
                    reason: format!("worker failed: {}", e),
                });
            }
        }
    }

    let (snapshot, report) = assemble(kept_blobs, skipped, outputs, &config, &tokenizer);
    info!(
        blobs = report.blobs,
        documents = report.documents,
        skipped = report.skipped.len(),
        terms = report.terms,
        edges = report.sibling_edges + report.topical_edges,
        "index build complete"
    );
    Ok((snapshot, report))
}

/// CLI entry point for `docmesh build`.
pub async fn run_build(config: &Config, dry_run: bool) -> Result<()> {
    let (snapshot, report) = build_snapshot(config).await?;

    if dry_run {
        println!("build (dry-run)");
    } else {
        store::persist_snapshot(config, &snapshot).await?;
        println!("build");
    }

    print_report(&report);
    println!("ok");
    Ok(())
}

fn print_report(report: &BuildReport) {
    println!("  blobs read: {}", report.blobs);
    println!("  blobs skipped: {}", report.skipped.len());
    for s in &report.skipped {
        println!("    {}: {}", s.path, s.reason);
    }
    println!("  documents: {}", report.documents);
    println!("  malformed documents: {}", report.malformed);
    println!("  failed documents: {}", report.failed);
    println!("  duplicate documents: {}", report.duplicates);
    println!("  terms: {}", report.terms);
    println!("  postings: {}", report.postings);
    println!("  sibling edges: {}", report.sibling_edges);
    println!("  topical edges: {}", report.topical_edges);
}
