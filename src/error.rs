//! Error taxonomy shared by ingestion and the query service.
//!
//! Query-time failures (`NotFound`, `InvalidQuery`) are always surfaced as
//! errors so callers can tell them apart from an empty result list.
//! Malformed markdown is *not* an error: it is recorded on the document's
//! metadata and indexing continues.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// No document with this ID exists in the current snapshot.
    #[error("document not found: {id}")]
    NotFound { id: String },

    /// The query text is empty or contains only whitespace.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A raw blob could not be read. Fatal for that blob only.
    #[error("failed to ingest {}: {source}", path.display())]
    IngestionFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(id: impl Into<String>) -> Self {
        Error::NotFound { id: id.into() }
    }

    /// Short machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::InvalidQuery(_) => "invalid_query",
            Error::IngestionFailure { .. } => "ingestion_failure",
            Error::Storage(_) | Error::Serialization(_) => "internal",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
