//! # docvec CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docvec init` | Create the SQLite database and run schema migrations |
//! | `docvec ingest [DIR]` | Extract, chunk, embed and index a documents directory |
//! | `docvec query "<text>"` | Top-K similarity search with an optional metadata filter |
//! | `docvec stats` | Show indexes and per-file record counts |
//!
//! ## Examples
//!
//! ```bash
//! docvec ingest ./documents --dry-run
//! docvec query "capital allocation" --k 3 --filter "filename~Berkshire"
//! docvec query "buybacks" --filter-json '{"op":"eq","field":"filename","value":"a.pdf"}' --json
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use docvec::config;
use docvec::docvec_core::filter::Filter;
use docvec::{ingest, migrate, search, stats};

/// docvec: PDF ingestion and vector retrieval.
///
/// All commands read a TOML config (`--config`). `DATABASE_URL`,
/// `OPENAI_API_KEY` and `DOCVEC_INDEX` override it.
#[derive(Parser)]
#[command(name = "docvec", version, about = "Ingest documents into a vector index and query it")]
struct Cli {
    /// Path to configuration file (TOML) [default: ./config/docvec.toml].
    /// Only a missing default file falls back to built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and tables. Safe to run repeatedly.
    Init,

    /// Ingest a documents directory into the configured index.
    Ingest {
        /// Documents directory; overrides `documents.root`.
        dir: Option<PathBuf>,

        /// Report documents and estimated chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the index.
    Query {
        text: String,

        /// Number of results; defaults to `retrieval.top_k`.
        #[arg(long)]
        k: Option<usize>,

        /// Shorthand filter: `field=value`, `field~value` (contains) or `field^value` (prefix).
        #[arg(long, conflicts_with = "filter_json")]
        filter: Option<String>,

        /// Filter expression as JSON, e.g. `{"op":"contains","field":"filename","value":"Berkshire"}`.
        #[arg(long)]
        filter_json: Option<String>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show indexes and per-file counts.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docvec=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
        }
        Commands::Ingest { dir, dry_run } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, finishing in-flight work");
                    on_signal.cancel();
                }
            });
            ingest::run_ingest(&cfg, dir, dry_run, cancel).await?;
        }
        Commands::Query {
            text,
            k,
            filter,
            filter_json,
            json,
        } => {
            let filter = parse_filter(filter.as_deref(), filter_json.as_deref())?;
            search::run_query(&cfg, &text, k, filter, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = "./config/docvec.toml";

/// Load the config file. A path given with `--config` must exist; a
/// missing default file means defaults plus environment.
fn load(explicit: Option<&Path>) -> anyhow::Result<config::Config> {
    if let Some(path) = explicit {
        return config::load_config(path);
    }
    let path = Path::new(DEFAULT_CONFIG);
    if path.exists() {
        return config::load_config(path);
    }
    tracing::debug!(path = %path.display(), "config file not found, using defaults");
    let mut cfg = config::Config::default();
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}

fn parse_filter(shorthand: Option<&str>, json: Option<&str>) -> anyhow::Result<Option<Filter>> {
    match (shorthand, json) {
        (Some(_), Some(_)) => bail!("use either --filter or --filter-json, not both"),
        (Some(expr), None) => Ok(Some(expr.parse()?)),
        (None, Some(raw)) => {
            let filter: Filter =
                serde_json::from_str(raw).context("--filter-json is not a valid filter")?;
            filter.validate()?;
            Ok(Some(filter))
        }
        (None, None) => Ok(None),
    }
}
