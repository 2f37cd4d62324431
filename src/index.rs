//! Inverted index over parsed documents.
//!
//! Prose (headings, paragraphs, blockquotes, list items) is flattened in
//! document order and indexed under [`Namespace::Text`]; positions are token
//! ordinals within that flattened stream. Code blocks are kept out of the
//! prose stream and indexed under [`Namespace::Code`] keyed by their declared
//! language, with the language tag itself indexed as the first code token.
//!
//! Indexing a document always replaces its previous postings, so indexing
//! the same text twice is idempotent.
//!
//! # Ranking
//!
//! `score(d) = Σ_t Σ_ns w(ns) × tf(t, ns, d) × ln(1 + N / df(t, ns))`
//!
//! where `w(Text) = 1` and `w(Code) = code_weight`. Ties are broken by
//! ascending document ID.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{DocumentId, Namespace, NodeKind, Posting, StructureNode};
use crate::tokenize::Tokenizer;

/// Build the postings for one document's structure tree.
///
/// Output is sorted by `(term, namespace)` and therefore deterministic.
pub fn analyze(document_id: &str, tree: &StructureNode, tokenizer: &Tokenizer) -> Vec<Posting> {
    let mut streams: BTreeMap<Namespace, Vec<String>> = BTreeMap::new();

    for node in tree.descendants() {
        match &node.kind {
            NodeKind::Root => {}
            NodeKind::CodeBlock { language } => {
                let stream = streams.entry(Namespace::Code(language.clone())).or_default();
                stream.extend(tokenizer.terms(language));
                stream.extend(tokenizer.terms(&node.text));
            }
            _ => streams
                .entry(Namespace::Text)
                .or_default()
                .extend(tokenizer.terms(&node.text)),
        }
    }

    let mut grouped: BTreeMap<(String, Namespace), Vec<u32>> = BTreeMap::new();
    for (namespace, terms) in streams {
        for (position, term) in terms.into_iter().enumerate() {
            grouped
                .entry((term, namespace.clone()))
                .or_default()
                .push(position as u32);
        }
    }

    grouped
        .into_iter()
        .map(|((term, namespace), positions)| Posting {
            frequency: positions.len() as u32,
            term,
            namespace,
            document_id: document_id.to_string(),
            positions,
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    /// term → namespace → document → positions
    terms: BTreeMap<String, BTreeMap<Namespace, BTreeMap<DocumentId, Vec<u32>>>>,
    /// Every indexed document and the keys it contributed, for replacement.
    documents: BTreeMap<DocumentId, Vec<(String, Namespace)>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all postings for `document_id` with `postings`.
    ///
    /// A document with no postings still counts towards `N` in ranking.
    pub fn index_document(&mut self, document_id: &str, postings: Vec<Posting>) {
        self.remove_document(document_id);

        let mut keys = Vec::with_capacity(postings.len());
        for posting in postings {
            keys.push((posting.term.clone(), posting.namespace.clone()));
            self.terms
                .entry(posting.term)
                .or_default()
                .entry(posting.namespace)
                .or_default()
                .insert(document_id.to_string(), posting.positions);
        }
        self.documents.insert(document_id.to_string(), keys);
    }

    pub fn remove_document(&mut self, document_id: &str) {
        let Some(keys) = self.documents.remove(document_id) else {
            return;
        };
        for (term, namespace) in keys {
            let Some(by_ns) = self.terms.get_mut(&term) else {
                continue;
            };
            if let Some(docs) = by_ns.get_mut(&namespace) {
                docs.remove(document_id);
                if docs.is_empty() {
                    by_ns.remove(&namespace);
                }
            }
            if by_ns.is_empty() {
                self.terms.remove(&term);
            }
        }
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.documents.contains_key(document_id)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Number of distinct `(term, namespace)` keys.
    pub fn term_count(&self) -> usize {
        self.terms.values().map(|by_ns| by_ns.len()).sum()
    }

    pub fn posting_count(&self) -> usize {
        self.terms
            .values()
            .flat_map(|by_ns| by_ns.values())
            .map(|docs| docs.len())
            .sum()
    }

    /// Postings for one term in one namespace, ordered by document ID.
    pub fn postings(&self, term: &str, namespace: &Namespace) -> Vec<Posting> {
        self.terms
            .get(term)
            .and_then(|by_ns| by_ns.get(namespace))
            .map(|docs| {
                docs.iter()
                    .map(|(doc, positions)| make_posting(term, namespace, doc, positions))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All postings of one document, ordered by `(term, namespace)`.
    pub fn document_postings(&self, document_id: &str) -> Vec<Posting> {
        let Some(keys) = self.documents.get(document_id) else {
            return Vec::new();
        };
        let mut out: Vec<Posting> = keys
            .iter()
            .filter_map(|(term, namespace)| {
                let positions = self.terms.get(term)?.get(namespace)?.get(document_id)?;
                Some(make_posting(term, namespace, document_id, positions))
            })
            .collect();
        out.sort_by(|a, b| (&a.term, &a.namespace).cmp(&(&b.term, &b.namespace)));
        out
    }

    /// Every posting, ordered by term, namespace, then document ID.
    pub fn all_postings(&self) -> Vec<Posting> {
        let mut out = Vec::with_capacity(self.posting_count());
        for (term, by_ns) in &self.terms {
            for (namespace, docs) in by_ns {
                for (doc, positions) in docs {
                    out.push(make_posting(term, namespace, doc, positions));
                }
            }
        }
        out
    }

    /// Rank documents for already-normalized query `terms` by summed TF-IDF.
    ///
    /// Repeated query terms count once. Documents scoring zero are omitted.
    pub fn rank(&self, terms: &[String], code_weight: f64) -> Vec<(DocumentId, f64)> {
        let n = self.document_count() as f64;
        let unique: BTreeSet<&String> = terms.iter().collect();
        let mut scores: BTreeMap<&str, f64> = BTreeMap::new();

        for term in unique {
            let Some(by_ns) = self.terms.get(term.as_str()) else {
                continue;
            };
            for (namespace, docs) in by_ns {
                let weight = match namespace {
                    Namespace::Text => 1.0,
                    Namespace::Code(_) => code_weight,
                };
                let df = docs.len() as f64;
                let idf = (1.0 + n / df).ln();
                for (doc, positions) in docs {
                    *scores.entry(doc.as_str()).or_insert(0.0) +=
                        weight * positions.len() as f64 * idf;
                }
            }
        }

        let mut ranked: Vec<(DocumentId, f64)> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(doc, score)| (doc.to_string(), score))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }
}

fn make_posting(term: &str, namespace: &Namespace, doc: &str, positions: &[u32]) -> Posting {
    Posting {
        term: term.to_string(),
        namespace: namespace.clone(),
        document_id: doc.to_string(),
        positions: positions.to_vec(),
        frequency: positions.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserConfig;
    use crate::parse::parse_document;

    fn postings_for(id: &str, text: &str) -> Vec<Posting> {
        let out = parse_document(text, &ParserConfig::default());
        analyze(id, &out.tree, &Tokenizer::default())
    }

    fn index_of(docs: &[(&str, &str)]) -> InvertedIndex {
        let mut index = InvertedIndex::new();
        for (id, text) in docs {
            index.index_document(id, postings_for(id, text));
        }
        index
    }

    #[test]
    fn test_positions_are_token_ordinals() {
        let postings = postings_for("d1", "# Rust guide\n\nRust is fast. Cargo builds rust.");
        let rust = postings
            .iter()
            .find(|p| p.term == "rust" && p.namespace == Namespace::Text)
            .unwrap();
        // rust(0) guide(1) rust(2) [is dropped] fast(3) cargo(4) builds(5) rust(6)
        assert_eq!(rust.positions, vec![0, 2, 6]);
        assert_eq!(rust.frequency, 3);
    }

    #[test]
    fn test_frequency_matches_positions() {
        let postings = postings_for("d1", "a b c alpha alpha beta\n\n```sh\nalpha run run\n```");
        for p in &postings {
            assert_eq!(p.frequency as usize, p.positions.len());
        }
    }

    #[test]
    fn test_code_is_indexed_separately() {
        let postings = postings_for("d1", "Intro text\n\n```python\nprint(1)");
        let text_terms: Vec<&str> = postings
            .iter()
            .filter(|p| p.namespace == Namespace::Text)
            .map(|p| p.term.as_str())
            .collect();
        assert_eq!(text_terms, vec!["intro", "text"]);

        let py = Namespace::Code("python".to_string());
        let code: Vec<(&str, &[u32])> = postings
            .iter()
            .filter(|p| p.namespace == py)
            .map(|p| (p.term.as_str(), p.positions.as_slice()))
            .collect();
        assert_eq!(code, vec![("print", &[1u32][..]), ("python", &[0u32][..])]);
    }

    #[test]
    fn test_reindex_is_idempotent_and_replaces() {
        let text = "# Title\n\nsome words here\n\n```rust\nlet x = 1;\n```";
        let mut index = InvertedIndex::new();
        index.index_document("d1", postings_for("d1", text));
        let first = index.all_postings();
        index.index_document("d1", postings_for("d1", text));
        assert_eq!(index.all_postings(), first);
        assert_eq!(index.document_count(), 1);

        index.index_document("d1", postings_for("d1", "completely different"));
        assert!(index.postings("words", &Namespace::Text).is_empty());
        assert_eq!(index.postings("different", &Namespace::Text).len(), 1);
        assert_eq!(index.document_postings("d1").len(), 2);
    }

    #[test]
    fn test_remove_document_prunes_terms() {
        let mut index = index_of(&[("d1", "alpha beta"), ("d2", "beta gamma")]);
        assert_eq!(index.term_count(), 3);
        index.remove_document("d1");
        assert_eq!(index.term_count(), 2);
        assert!(!index.contains_document("d1"));
        assert!(index.postings("alpha", &Namespace::Text).is_empty());
    }

    #[test]
    fn test_rank_tf_idf() {
        let index = index_of(&[
            ("a", "rust rust rust"),
            ("b", "rust python"),
            ("c", "python python"),
        ]);
        let ranked = index.rank(&["rust".to_string()], 0.5);
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(ranked[0].1 > ranked[1].1);

        let idf = (1.0f64 + 3.0 / 2.0).ln();
        assert!((ranked[0].1 - 3.0 * idf).abs() < 1e-9);
    }

    #[test]
    fn test_rank_ties_broken_by_id() {
        let index = index_of(&[("zeta", "shared"), ("alpha", "shared"), ("mid", "shared")]);
        let ranked = index.rank(&["shared".to_string()], 0.5);
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_rank_code_weight() {
        let index = index_of(&[("a", "```go\nspawn\n```"), ("b", "spawn")]);
        let ranked = index.rank(&["spawn".to_string()], 0.5);
        assert_eq!(ranked[0].0, "b");
        assert!((ranked[1].1 * 2.0 - ranked[0].1).abs() < 1e-9);

        let ranked = index.rank(&["spawn".to_string()], 0.0);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_rank_unknown_and_duplicate_terms() {
        let index = index_of(&[("a", "alpha")]);
        assert!(index.rank(&["missing".to_string()], 0.5).is_empty());
        let once = index.rank(&["alpha".to_string()], 0.5);
        let twice = index.rank(&["alpha".to_string(), "alpha".to_string()], 0.5);
        assert_eq!(once, twice);
    }
}
