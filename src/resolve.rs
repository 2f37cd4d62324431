//! Cross-reference resolution: sibling and topical relation edges.
//!
//! Siblings are documents cut from the same blob; every pair of them is
//! connected with strength 1.0. Topical edges connect documents from
//! different blobs whose feature sets overlap: the Jaccard index over the
//! normalized terms of headings up to `heading_max_level`, unioned with the
//! document's declared code languages. A language and a heading word with
//! the same spelling count as one feature. Only scores strictly above the
//! threshold are kept.
//!
//! All pairs are scored, so time is O(n²) in the number of documents. Space
//! is O(edges kept).

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ResolverConfig;
use crate::models::{Document, EdgeKind, RelationEdge};
use crate::tokenize::Tokenizer;

/// The per-document inputs to topical scoring.
#[derive(Debug, Clone)]
pub struct TopicFeatures<'a> {
    pub id: &'a str,
    pub blob_path: &'a str,
    pub features: BTreeSet<String>,
}

pub fn topic_features<'a>(
    doc: &'a Document,
    tokenizer: &Tokenizer,
    heading_max_level: u8,
) -> TopicFeatures<'a> {
    let mut features: BTreeSet<String> = doc
        .meta
        .outline
        .iter()
        .filter(|h| h.level <= heading_max_level)
        .flat_map(|h| tokenizer.terms(&h.text))
        .collect();
    features.extend(doc.meta.code_languages.iter().cloned());
    TopicFeatures {
        id: &doc.id,
        blob_path: &doc.blob_path,
        features,
    }
}

/// `|a ∩ b| / |a ∪ b|`, defined as 0 when both sets are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Connect every pair of documents that share a blob.
pub fn sibling_edges(documents: &[Document]) -> Vec<RelationEdge> {
    let mut by_blob: BTreeMap<&str, Vec<&Document>> = BTreeMap::new();
    for doc in documents {
        by_blob.entry(doc.blob_path.as_str()).or_default().push(doc);
    }

    let mut edges = Vec::new();
    for docs in by_blob.values() {
        for (i, x) in docs.iter().enumerate() {
            for y in &docs[i + 1..] {
                edges.push(RelationEdge::new(&x.id, &y.id, EdgeKind::Sibling, 1.0));
            }
        }
    }
    edges
}

/// Score every cross-blob pair and keep those above `threshold`.
pub fn topical_edges(features: &[TopicFeatures<'_>], threshold: f64) -> Vec<RelationEdge> {
    let mut edges = Vec::new();
    for (i, x) in features.iter().enumerate() {
        if x.features.is_empty() {
            continue;
        }
        for y in &features[i + 1..] {
            if x.blob_path == y.blob_path || y.features.is_empty() {
                continue;
            }
            let score = jaccard(&x.features, &y.features);
            if score > threshold {
                edges.push(RelationEdge::new(x.id, y.id, EdgeKind::Topical, score));
            }
        }
    }
    edges
}

/// All relation edges for `documents`, in a deterministic order: siblings
/// first, then by descending strength, then by `(a, b)`.
pub fn resolve(
    documents: &[Document],
    tokenizer: &Tokenizer,
    config: &ResolverConfig,
) -> Vec<RelationEdge> {
    let features: Vec<TopicFeatures<'_>> = documents
        .iter()
        .map(|doc| topic_features(doc, tokenizer, config.heading_max_level))
        .collect();

    let mut edges = sibling_edges(documents);
    edges.extend(topical_edges(&features, config.topical_threshold));
    sort_edges(&mut edges);
    edges
}

pub fn sort_edges(edges: &mut [RelationEdge]) {
    edges.sort_by(|x, y| {
        x.kind
            .cmp(&y.kind)
            .then_with(|| {
                y.strength
                    .partial_cmp(&x.strength)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| x.a.cmp(&y.a))
            .then_with(|| x.b.cmp(&y.b))
    });
}
