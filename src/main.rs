//! # MCP Scout CLI (`scout`)
//!
//! The `scout` binary is the primary interface for the discovery index. It
//! provides one-off search, index status, cache refresh, the HTTP query
//! server, and the publisher-side bundle builder.
//!
//! ## Usage
//!
//! ```bash
//! scout [--config ./scout.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scout search "<query>"` | Resolve a capability description to servers |
//! | `scout info` | Show catalog, cache, and search-mode status |
//! | `scout refresh` | Force a live aggregation cycle |
//! | `scout serve` | Start the HTTP query server |
//! | `scout build-data <dir>` | Build a publishable data bundle |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mcp_scout::{build_data, config, database::Database, server};

/// MCP Scout — a discovery index for Model Context Protocol servers.
///
/// All commands accept an optional `--config` flag pointing to a TOML
/// configuration file; without it, built-in defaults apply.
#[derive(Parser)]
#[command(
    name = "scout",
    about = "MCP Scout — find the right MCP server for a task",
    version,
    long_about = "MCP Scout aggregates public MCP server listings into a deduplicated catalog \
    and answers free-text capability queries via semantic search, with a deterministic lexical \
    fallback when no embedding model is available."
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Search the catalog for servers matching a description.
    Search {
        /// Free-text capability description.
        query: String,

        /// Maximum number of results (overrides `search.top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show catalog, cache, and search-mode status.
    Info,

    /// Force a live aggregation cycle, bypassing cache freshness.
    Refresh,

    /// Start the HTTP query server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// `find_service` tool endpoint.
    Serve,

    /// Fetch, aggregate, and embed everything, then write a bundle.
    ///
    /// Produces `catalog.json`, `embeddings.bin`, and `data_info.json` in
    /// the output directory, ready to publish as a release asset.
    BuildData {
        /// Output directory for the bundle files.
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Search { query, top_k } => {
            let db = Database::init(cfg).await?;
            let k = top_k.unwrap_or(db.config().search.top_k);
            let hits = db.search(&query, k);
            if hits.is_empty() {
                println!("No matching servers found.");
                return Ok(());
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{:>2}. {} ({:.3})\n    {}\n    {} [{}]",
                    i + 1,
                    hit.entry.name,
                    hit.score,
                    hit.entry.description,
                    hit.entry.url,
                    hit.entry.category,
                );
            }
        }
        Commands::Info => {
            let db = Database::init(cfg).await?;
            println!("{}", serde_json::to_string_pretty(&db.info())?);
        }
        Commands::Refresh => {
            let mut db = Database::init(cfg).await?;
            db.refresh().await?;
            println!(
                "Catalog refreshed: {} entries.",
                db.catalog().entry_count()
            );
        }
        Commands::Serve => {
            let db = Database::init(cfg).await?;
            server::run_server(db).await?;
        }
        Commands::BuildData { out_dir } => {
            build_data::run_build_data(&cfg, &out_dir).await?;
            println!("Bundle written to {}", out_dir.display());
        }
    }

    Ok(())
}
