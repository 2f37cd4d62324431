//! Filesystem blob discovery.
//!
//! Walks `corpus.root`, applies include/exclude globs and reads each match
//! as one [`RawBlob`]. A file that cannot be read (or is not UTF-8) is an
//! ingestion failure for that file only: it is logged, recorded as a
//! [`SkippedBlob`] and the walk continues.

use anyhow::{bail, Result};
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Error;
use crate::models::{RawBlob, SkippedBlob};

/// Result of walking the corpus root.
#[derive(Debug, Default)]
pub struct CorpusScan {
    /// Readable blobs, sorted by relative path.
    pub blobs: Vec<RawBlob>,
    pub skipped: Vec<SkippedBlob>,
}

pub fn scan_corpus(config: &Config) -> Result<CorpusScan> {
    let corpus = &config.corpus;
    let root = &corpus.root;
    if !root.is_dir() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&corpus.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.docmesh/**".to_string(),
    ];
    default_excludes.extend(corpus.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut scan = CorpusScan::default();

    let walker = WalkDir::new(root).follow_links(corpus.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| relative_path(root, p))
                    .unwrap_or_default();
                warn!(path = %path, error = %e, "skipping unreadable corpus entry");
                scan.skipped.push(SkippedBlob {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel_str = relative_path(root, entry.path());
        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match read_blob(entry.path(), &rel_str) {
            Ok(blob) => {
                debug!(path = %blob.path, bytes = blob.byte_len, "read blob");
                scan.blobs.push(blob);
            }
            Err(e) => {
                warn!(path = %rel_str, error = %e, "skipping blob");
                scan.skipped.push(SkippedBlob {
                    path: rel_str,
                    reason: e.to_string(),
                });
            }
        }
    }

    // Sort for deterministic ordering
    scan.blobs.sort_by(|a, b| a.path.cmp(&b.path));
    scan.skipped.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(scan)
}

/// Read one file into a [`RawBlob`].
pub fn read_blob(path: &Path, relative_path: &str) -> Result<RawBlob, Error> {
    let bytes = std::fs::read(path).map_err(|source| Error::IngestionFailure {
        path: path.to_path_buf(),
        source,
    })?;
    let byte_len = bytes.len() as u64;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    let text = String::from_utf8(bytes).map_err(|e| Error::IngestionFailure {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;

    Ok(RawBlob {
        path: relative_path.to_string(),
        byte_len,
        ingested_at: Utc::now(),
        content_hash,
        text,
    })
}

/// `path` relative to `root`, always `/`-separated.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
