//! Immutable index snapshots and the handle that swaps them atomically.
//!
//! A build produces a complete [`IndexSnapshot`]. Readers take an
//! `Arc<IndexSnapshot>` from the [`SnapshotHandle`] and keep using it for the
//! whole request, so a concurrent rebuild can never expose a half-built
//! index: they see either the old snapshot or the new one.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::index::InvertedIndex;
use crate::models::{Document, DocumentId, RawBlob, RelationEdge, SkippedBlob};

#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    built_at: DateTime<Utc>,
    blobs: Vec<RawBlob>,
    skipped: Vec<SkippedBlob>,
    documents: BTreeMap<DocumentId, Document>,
    index: InvertedIndex,
    edges: Vec<RelationEdge>,
    /// Document ID → indices into `edges`.
    adjacency: HashMap<DocumentId, Vec<usize>>,
}

impl IndexSnapshot {
    pub fn new(
        built_at: DateTime<Utc>,
        blobs: Vec<RawBlob>,
        skipped: Vec<SkippedBlob>,
        documents: Vec<Document>,
        index: InvertedIndex,
        edges: Vec<RelationEdge>,
    ) -> Self {
        let mut adjacency: HashMap<DocumentId, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            adjacency.entry(edge.a.clone()).or_default().push(i);
            adjacency.entry(edge.b.clone()).or_default().push(i);
        }

        Self {
            built_at,
            blobs,
            skipped,
            documents: documents.into_iter().map(|d| (d.id.clone(), d)).collect(),
            index,
            edges,
            adjacency,
        }
    }

    pub fn empty() -> Self {
        Self::new(
            Utc::now(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            InvertedIndex::new(),
            Vec::new(),
        )
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn blobs(&self) -> &[RawBlob] {
        &self.blobs
    }

    pub fn skipped(&self) -> &[SkippedBlob] {
        &self.skipped
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    /// Documents ordered by ID.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn edges(&self) -> &[RelationEdge] {
        &self.edges
    }

    /// Edges touching `id`, in snapshot edge order.
    pub fn edges_of(&self, id: &str) -> Vec<&RelationEdge> {
        self.adjacency
            .get(id)
            .map(|idx| idx.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }
}

/// Shared pointer to the current snapshot.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot in effect right now. Cheap: clones an `Arc`.
    pub fn load(&self) -> Arc<IndexSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `snapshot` and return the one it replaced.
    pub fn swap(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(snapshot))
    }
}
