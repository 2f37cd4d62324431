//! # docmesh CLI
//!
//! The `docmesh` binary builds the document index from a corpus of
//! concatenated article blobs and answers queries against it.
//!
//! ## Usage
//!
//! ```bash
//! docmesh --config ./config/docmesh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docmesh init` | Create the SQLite database and schema |
//! | `docmesh build` | Segment, parse and index the corpus; persist the snapshot |
//! | `docmesh search "<query>"` | Ranked full-text search |
//! | `docmesh related <id>` | Sibling and topical neighbours of a document |
//! | `docmesh toc <id>` | Heading outline of a document |
//! | `docmesh get <id>` | Full document with metadata |
//! | `docmesh stats` | Snapshot counts and database size |
//! | `docmesh export [path]` | Snapshot as JSON |
//! | `docmesh serve` | JSON HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docmesh::{config, export, ingest, query, server, stats, store};

/// docmesh: segmentation, structure extraction and cross-reference indexing
/// for concatenated article corpora.
#[derive(Parser)]
#[command(name = "docmesh", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docmesh.toml")]
    config: PathBuf,

    /// Log pipeline progress to stderr (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest the corpus root and replace the stored index.
    Build {
        /// Build and report without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search indexed documents.
    Search {
        query: String,

        /// Maximum number of results (defaults to `retrieval.final_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List documents related to a document.
    Related { id: String },

    /// Print a document's table of contents.
    Toc { id: String },

    /// Print a document by ID.
    Get { id: String },

    /// Show index statistics.
    Stats,

    /// Export the index as JSON (to stdout when no path is given).
    Export { path: Option<PathBuf> },

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            store::init_db(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Build { dry_run } => {
            ingest::run_build(&cfg, dry_run).await?;
        }
        Commands::Search { query, limit } => {
            query::run_search(&cfg, &query, limit).await?;
        }
        Commands::Related { id } => {
            query::run_related(&cfg, &id).await?;
        }
        Commands::Toc { id } => {
            query::run_toc(&cfg, &id).await?;
        }
        Commands::Get { id } => {
            query::run_get(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Export { path } => {
            export::run_export(&cfg, path.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
