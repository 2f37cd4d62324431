//! Core data models used throughout docmesh.
//!
//! These types represent the blobs, documents, structure trees, postings and
//! relation edges that flow through the ingestion and query pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stable, positional document identifier (see [`crate::segment::document_id`]).
pub type DocumentId = String;

/// One ingested source file, possibly holding several concatenated documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlob {
    /// Path relative to the corpus root, `/`-separated.
    pub path: String,
    pub byte_len: u64,
    pub ingested_at: DateTime<Utc>,
    pub content_hash: String,
    #[serde(skip)]
    pub text: String,
}

/// A blob left out of the current build, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBlob {
    pub path: String,
    pub reason: String,
}

/// A raw text span cut from a blob by the segmenter, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStub {
    pub ordinal: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Unparsed,
    Parsed,
    Failed,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Unparsed => "unparsed",
            ParseStatus::Parsed => "parsed",
            ParseStatus::Failed => "failed",
        }
    }
}

/// A segmented, self-contained article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub blob_path: String,
    pub ordinal: usize,
    pub title: String,
    pub raw_text: String,
    pub status: ParseStatus,
    pub meta: DocumentMeta,
    pub tree: StructureNode,
    /// SHA-256 of the whitespace-normalized text.
    pub content_hash: String,
    /// Set when an earlier document (by ID) has identical normalized text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<DocumentId>,
}

/// Half-open byte range `[start, end)` into a document's raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Heading {
        level: u8,
    },
    Paragraph,
    CodeBlock {
        /// Declared fence language, lowercased. Empty when none was given.
        language: String,
    },
    Blockquote {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callout: Option<String>,
    },
    ListItem,
}

impl NodeKind {
    pub fn heading_level(&self) -> Option<u8> {
        match self {
            NodeKind::Heading { level } => Some(*level),
            _ => None,
        }
    }
}

/// A node of a document's heading/content tree. Rooted at [`NodeKind::Root`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureNode {
    #[serde(flatten)]
    pub kind: NodeKind,
    pub text: String,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StructureNode>,
}

impl StructureNode {
    pub fn root(len: usize) -> Self {
        Self {
            kind: NodeKind::Root,
            text: String::new(),
            span: Span { start: 0, end: len },
            children: Vec::new(),
        }
    }

    /// Pre-order traversal, excluding `self`.
    pub fn descendants(&self) -> Vec<&StructureNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&StructureNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

/// Heading-only projection of a structure tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub level: u8,
    pub text: String,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Malformation {
    /// A code fence opened at `offset` was never closed and ran to end of input.
    UnclosedCodeFence { offset: usize, language: String },
}

/// Flat metadata record produced alongside the structure tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    pub word_count: usize,
    pub code_languages: BTreeSet<String>,
    pub outline: Vec<OutlineEntry>,
    pub callouts: Vec<String>,
    pub malformed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub malformations: Vec<Malformation>,
}

/// Which part of a document a term was drawn from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Namespace {
    Text,
    /// Code-block contents, keyed by declared fence language (possibly empty).
    Code(String),
}

impl Namespace {
    pub fn key(&self) -> String {
        match self {
            Namespace::Text => "text".to_string(),
            Namespace::Code(lang) => format!("code:{}", lang),
        }
    }

    pub fn from_key(key: &str) -> Self {
        match key.strip_prefix("code:") {
            Some(lang) => Namespace::Code(lang.to_string()),
            None => Namespace::Text,
        }
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> String {
        ns.key()
    }
}

impl From<String> for Namespace {
    fn from(key: String) -> Namespace {
        Namespace::from_key(&key)
    }
}

/// Links a term to one document and the token positions where it occurs.
///
/// `frequency` always equals `positions.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub term: String,
    pub namespace: Namespace,
    pub document_id: DocumentId,
    pub positions: Vec<u32>,
    pub frequency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Sibling,
    Topical,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Sibling => "sibling",
            EdgeKind::Topical => "topical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sibling" => Some(EdgeKind::Sibling),
            "topical" => Some(EdgeKind::Topical),
            _ => None,
        }
    }
}

/// Undirected relation between two documents. Stored with `a < b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub a: DocumentId,
    pub b: DocumentId,
    pub kind: EdgeKind,
    pub strength: f64,
}

impl RelationEdge {
    pub fn new(x: &str, y: &str, kind: EdgeKind, strength: f64) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self {
            a: a.to_string(),
            b: b.to_string(),
            kind,
            strength,
        }
    }

    /// The endpoint that is not `id`, if `id` is one of the endpoints.
    pub fn other(&self, id: &str) -> Option<&str> {
        if self.a == id {
            Some(&self.b)
        } else if self.b == id {
            Some(&self.a)
        } else {
            None
        }
    }
}
