//! `nrag sync`: run one sync pass for a tenant and print its report.
//!
//! Ctrl-C cancels the pass between records; a cancelled pass leaves the
//! watermark and synced-ID sets untouched so the next run redoes the work.

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use notion_rag_core::models::RecordKind;
use notion_rag_core::sync::{SyncOptions, SyncReport};

use crate::config::Config;
use crate::engine::Engine;
use crate::progress::ProgressMode;

pub struct SyncArgs {
    pub full: bool,
    pub dry_run: bool,
    pub only: Option<RecordKind>,
    pub json: bool,
    pub progress: ProgressMode,
}

pub async fn run_sync(config: &Config, tenant: Option<&str>, args: SyncArgs) -> Result<()> {
    if !args.dry_run && !config.embedding.is_enabled() {
        bail!("sync requires an embedding provider. Set [embedding] provider in config (or use --dry-run).");
    }

    let engine = Engine::open(config, tenant).await?;
    let synchronizer = engine.synchronizer()?;

    let opts = SyncOptions {
        full: args.full,
        dry_run: args.dry_run,
        kinds: match args.only {
            Some(kind) => vec![kind],
            None => RecordKind::ALL.to_vec(),
        },
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current record");
            on_signal.cancel();
        }
    });

    let reporter = args.progress.reporter();
    let result = synchronizer
        .sync_with(&opts, &cancel, reporter.as_ref())
        .await;
    signal_task.abort();

    let label = engine.paths().label().to_string();
    engine.close().await;
    let report = result.with_context(|| format!("sync failed for tenant {}", label))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&label, &report, args.only.is_some());
    }

    if report.cancelled {
        bail!("sync cancelled; state not committed");
    }
    Ok(())
}

fn print_report(tenant: &str, report: &SyncReport, single_kind: bool) {
    let mode = match (report.full, report.dry_run) {
        (_, true) => " (dry-run)",
        (true, false) => " (full)",
        (false, false) => "",
    };
    println!("sync tenant {}{}", tenant, mode);

    for c in &report.collections {
        println!("  {}:", c.kind.collection());
        println!("    fetched: {}", c.fetched);
        println!("    selected: {}", c.selected);
        if report.dry_run {
            println!("    would process: {}", c.processed);
            println!("    estimated chunks: {}", c.chunks_written);
        } else {
            println!("    processed: {}", c.processed);
            println!("    unchanged: {}", c.unchanged);
            println!("    chunks written: {}", c.chunks_written);
            println!("    chunks deleted: {}", c.chunks_deleted);
            println!("    pruned: {}", c.pruned);
        }
        if c.failed > 0 {
            println!("    failed: {}", c.failed);
        }
        if c.timestamp_fallbacks > 0 {
            println!("    unparseable timestamps: {}", c.timestamp_fallbacks);
        }
    }

    if !report.errors.is_empty() {
        println!("  errors:");
        for e in &report.errors {
            println!(
                "    {} {} [{}]: {}",
                e.kind, e.parent_id, e.stage, e.message
            );
        }
    }

    if report.cancelled {
        println!("  cancelled: state not committed");
        return;
    }
    if report.committed {
        match report.watermark {
            Some(wm) if !single_kind => {
                println!("  watermark: {}", wm.format("%Y-%m-%dT%H:%M:%S%.6fZ"))
            }
            _ => println!("  watermark: unchanged (single-collection pass)"),
        }
        if !report.state_saved {
            println!("  warning: sync state could not be saved; the next pass will reprocess");
        }
    }
    println!("ok");
}
