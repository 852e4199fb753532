//! # Sprint Pulse CLI (`pulse`)
//!
//! ## Usage
//!
//! ```bash
//! pulse --config ./config/pulse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pulse init` | Create the response-cache database |
//! | `pulse metrics` | Fetch sprints and print delivery metrics |
//! | `pulse search "<query>"` | BM25 search over the configured corpus |
//! | `pulse retro` | Metrics plus a retrieval-grounded retrospective |
//! | `pulse cache stats` | Show cached summaries |
//! | `pulse cache clear` | Delete cached summaries |
//!
//! Log verbosity follows `RUST_LOG` (default `warn`); `--verbose` raises it
//! to `debug` for this crate. Logs go to stderr, results to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sprint_pulse::config;
use sprint_pulse::migrate;
use sprint_pulse::refresh::{self, RetroOptions};

/// Sprint Pulse: sprint delivery metrics and retrieval-grounded
/// retrospectives.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pulse.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pulse",
    about = "Sprint delivery metrics and retrieval-grounded retrospectives",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pulse.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the response-cache database.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Compute sprint metrics for the lookback window.
    Metrics {
        /// Read sprints and issues from a JSON snapshot instead of Jira.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Print the metrics window as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the retrieval corpus with BM25.
    Search {
        /// The search query string.
        query: String,

        /// Number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Generate a retrospective summary for the lookback window.
    ///
    /// Summaries are cached by a fingerprint of the prompt and generation
    /// parameters; an identical request is served from the cache.
    Retro {
        /// Read sprints and issues from a JSON snapshot instead of Jira.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Question to focus the retrospective on; also the retrieval query.
        #[arg(long)]
        focus: Option<String>,

        /// Skip the cache lookup. The fresh summary is still stored.
        #[arg(long)]
        no_cache: bool,

        /// Publish the result to Confluence (`[publish]` section).
        #[arg(long)]
        publish: bool,

        /// Print the prompt and fingerprint without generating.
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect or clear the response cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts per model and the age range.
    Stats,
    /// Delete every cached summary.
    Clear,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,sprint_pulse=debug,sprint_pulse_core=debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Cache database initialized successfully.");
        }
        Commands::Metrics { snapshot, json } => {
            refresh::run_metrics(&cfg, snapshot.as_deref(), json).await?;
        }
        Commands::Search { query, k } => {
            refresh::run_search(&cfg, &query, k).await?;
        }
        Commands::Retro {
            snapshot,
            focus,
            no_cache,
            publish,
            dry_run,
        } => {
            let opts = RetroOptions {
                snapshot: snapshot.as_deref(),
                focus: focus.as_deref(),
                no_cache,
                publish,
                dry_run,
            };
            refresh::run_retro(&cfg, &opts).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => refresh::run_cache_stats(&cfg).await?,
            CacheAction::Clear => refresh::run_cache_clear(&cfg).await?,
        },
    }

    Ok(())
}
