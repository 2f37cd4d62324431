//! Export the index snapshot as JSON.
//!
//! Produces one document holding every indexed document (with its metadata
//! and structure tree) and all relation edges, suitable for static site
//! rendering or offline inspection.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::models::{Document, RelationEdge, SkippedBlob};
use crate::snapshot::IndexSnapshot;
use crate::store;

#[derive(Serialize)]
pub struct ExportData<'a> {
    built_at: DateTime<Utc>,
    documents: Vec<&'a Document>,
    edges: &'a [RelationEdge],
    skipped: &'a [SkippedBlob],
}

impl<'a> ExportData<'a> {
    pub fn from_snapshot(snapshot: &'a IndexSnapshot) -> Self {
        Self {
            built_at: snapshot.built_at(),
            documents: snapshot.documents().collect(),
            edges: snapshot.edges(),
            skipped: snapshot.skipped(),
        }
    }
}

/// Export the persisted snapshot as pretty JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let snapshot = store::open_snapshot(config).await?;
    let data = ExportData::from_snapshot(&snapshot);
    let doc_count = data.documents.len();
    let edge_count = data.edges.len();
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!(
                "Exported {} documents, {} edges to {}",
                doc_count,
                edge_count,
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::build_from_blobs;
    use crate::models::RawBlob;

    #[test]
    fn test_export_shape() {
        let blobs = vec![RawBlob {
            path: "a.md".to_string(),
            byte_len: 0,
            ingested_at: Utc::now(),
            content_hash: String::new(),
            text: "# One\n<SEP>\n# Two".to_string(),
        }];
        let config = Config::minimal("/tmp/unused", "<SEP>");
        let (snapshot, _) = build_from_blobs(blobs, Vec::new(), &config);

        let value = serde_json::to_value(ExportData::from_snapshot(&snapshot)).unwrap();
        assert_eq!(value["documents"].as_array().unwrap().len(), 2);
        assert_eq!(value["edges"][0]["kind"], "sibling");
        assert_eq!(value["documents"][0]["tree"]["kind"], "root");
    }
}
