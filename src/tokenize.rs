//! Term normalization shared by the indexer, the resolver and query parsing.
//!
//! Text is split on non-alphanumeric boundaries and lowercased. Tokens
//! shorter than the configured minimum or found in the stopword set are
//! dropped. Queries go through the same [`Tokenizer`] as documents.

use std::collections::HashSet;

use crate::config::IndexConfig;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "if", "in", "into",
    "is", "it", "its", "of", "on", "or", "so", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "were", "will", "with",
];

/// A normalized term and the byte range it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    min_len: usize,
    stopwords: HashSet<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(2, &[])
    }
}

impl Tokenizer {
    pub fn new(min_len: usize, extra_stopwords: &[String]) -> Self {
        let mut stopwords: HashSet<String> = STOPWORDS.iter().map(|s| s.to_string()).collect();
        stopwords.extend(extra_stopwords.iter().map(|s| s.to_lowercase()));
        Self { min_len, stopwords }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(config.min_token_len, &config.extra_stopwords)
    }

    pub fn tokens(&self, text: &str) -> Vec<Token> {
        let mut out = Vec::new();
        let mut start: Option<usize> = None;

        for (i, ch) in text.char_indices() {
            if ch.is_alphanumeric() {
                if start.is_none() {
                    start = Some(i);
                }
            } else if let Some(s) = start.take() {
                self.push_token(&mut out, text, s, i);
            }
        }
        if let Some(s) = start {
            self.push_token(&mut out, text, s, text.len());
        }

        out
    }

    /// Normalized terms only, in order, duplicates kept.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.tokens(text).into_iter().map(|t| t.term).collect()
    }

    fn push_token(&self, out: &mut Vec<Token>, text: &str, start: usize, end: usize) {
        let raw = &text[start..end];
        if raw.chars().count() < self.min_len {
            return;
        }
        let term = raw.to_lowercase();
        if self.stopwords.contains(&term) {
            return;
        }
        out.push(Token { term, start, end });
    }
}
