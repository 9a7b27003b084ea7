//! # Notion RAG CLI (`nrag`)
//!
//! Keeps a per-tenant semantic index of a Notion tasks database and a
//! routines database, and answers similarity queries against it.
//!
//! ## Usage
//!
//! ```bash
//! nrag --config ./config/nrag.toml [--tenant ID] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nrag init` | Create the tenant directory and index |
//! | `nrag sync` | Incrementally index new and edited records |
//! | `nrag search <tasks\|routines> "<query>"` | Similarity search in one collection |
//! | `nrag context "<query>"` | Top tasks and routines for a query |
//! | `nrag stats` | Chunk counts and last sync time |
//! | `nrag purge` | Delete all of a tenant's indexed data |
//!
//! ## Examples
//!
//! ```bash
//! # Index everything edited since the last pass
//! nrag sync --config ./config/nrag.toml
//!
//! # Rebuild one tenant from scratch
//! nrag --tenant 42 sync --full
//!
//! # What's relevant for planning tomorrow morning?
//! nrag context "deep work before lunch" --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use notion_rag::config;
use notion_rag::engine::Engine;
use notion_rag::ingest::{self, SyncArgs};
use notion_rag::progress::ProgressMode;
use notion_rag::{search, stats, tenant};
use notion_rag_core::models::RecordKind;

/// Notion RAG: incremental semantic indexing of Notion tasks and routines.
#[derive(Parser)]
#[command(
    name = "nrag",
    about = "Incremental semantic index over Notion tasks and routines",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nrag.toml")]
    config: PathBuf,

    /// Tenant id. Data lives under `{storage.root}/user_{id}/`; without
    /// this flag the `default` tenant is used.
    #[arg(long, global = true)]
    tenant: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tenant directory and index schema. Idempotent.
    Init,

    /// Index records created or edited since the last committed pass.
    Sync {
        /// Ignore the watermark and consider every record.
        #[arg(long)]
        full: bool,

        /// Report record and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Restrict the pass to one collection (`tasks` or `routines`).
        #[arg(long)]
        only: Option<RecordKind>,

        /// Print the sync report as JSON.
        #[arg(long)]
        json: bool,

        /// Progress on stderr: `off`, `human` or `json`. Defaults to
        /// `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Similarity search in one collection.
    Search {
        /// `tasks` or `routines`.
        collection: RecordKind,

        query: String,

        /// Number of results (defaults to the collection's configured top-k).
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Build the retrieval context (top tasks and routines) for a query.
    Context {
        query: String,

        #[arg(long)]
        json: bool,
    },

    /// Show indexed chunk counts and the last sync time.
    Stats,

    /// Delete the tenant's index, sync state and directory.
    Purge,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;
    let tenant_id = cli.tenant.as_deref();

    match cli.command {
        Commands::Init => {
            let engine = Engine::open(&cfg, tenant_id).await?;
            println!("Tenant {} initialized.", engine.paths().label());
            println!("  index: {}", engine.paths().index_path().display());
            engine.close().await;
        }
        Commands::Sync {
            full,
            dry_run,
            only,
            json,
            progress,
        } => {
            let args = SyncArgs {
                full,
                dry_run,
                only,
                json,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            ingest::run_sync(&cfg, tenant_id, args).await?;
        }
        Commands::Search {
            collection,
            query,
            limit,
            json,
        } => {
            search::run_search(&cfg, tenant_id, collection, &query, limit, json).await?;
        }
        Commands::Context { query, json } => {
            search::run_context(&cfg, tenant_id, &query, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg, tenant_id).await?;
        }
        Commands::Purge => {
            let paths = tenant::TenantPaths::resolve(&cfg.storage.root, tenant_id)?;
            tenant::run_purge(&paths)?;
        }
    }

    Ok(())
}
