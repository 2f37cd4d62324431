//! # docmesh
//!
//! Turns a directory of concatenated article blobs into a navigable
//! knowledge base: documents are split on a literal separator, parsed into
//! heading trees, indexed for full-text search and linked to related
//! documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ connector  │──▶│ segment → parse → index  │──▶│ snapshot │
//! │    _fs     │   │   (one task per blob)    │   │ + SQLite │
//! └────────────┘   └────────────┬─────────────┘   └────┬─────┘
//!                               │ merge                 │
//!                               ▼                       ▼
//!                         ┌──────────┐           ┌─────────────┐
//!                         │ resolve  │           │    query    │
//!                         │  edges   │           │ CLI / HTTP  │
//!                         └──────────┘           └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error taxonomy |
//! | [`connector_fs`] | Blob discovery on the filesystem |
//! | [`segment`] | Separator splitting and stable document IDs |
//! | [`parse`] | Markdown structure trees and metadata |
//! | [`tokenize`] | Term normalization |
//! | [`index`] | Postings and TF-IDF ranking |
//! | [`resolve`] | Sibling and topical relation edges |
//! | [`ingest`] | Build orchestration |
//! | [`snapshot`] | Immutable snapshots with atomic swap |
//! | [`store`] | SQLite persistence |
//! | [`query`] | Search, related documents, tables of contents |
//! | [`server`] | JSON HTTP server |
//! | [`stats`] | Index statistics |
//! | [`export`] | JSON export |

pub mod config;
pub mod connector_fs;
pub mod error;
pub mod export;
pub mod index;
pub mod ingest;
pub mod models;
pub mod parse;
pub mod query;
pub mod resolve;
pub mod segment;
pub mod server;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod tokenize;
