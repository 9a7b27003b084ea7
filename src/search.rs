//! `nrag search` and `nrag context`: read-only queries against a tenant's
//! index.

use anyhow::{bail, Result};

use notion_rag_core::context::Context;
use notion_rag_core::models::{RecordKind, SearchResult};

use crate::config::Config;
use crate::engine::Engine;

fn require_embeddings(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }
    Ok(())
}

pub async fn run_search(
    config: &Config,
    tenant: Option<&str>,
    kind: RecordKind,
    query: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    require_embeddings(config)?;

    let engine = Engine::open(config, tenant).await?;
    let top_k = limit.unwrap_or(match kind {
        RecordKind::Task => config.retrieval.task_top_k,
        RecordKind::Routine => config.retrieval.routine_top_k,
    });
    let results = engine.context_builder().search(kind, query, top_k).await;
    engine.close().await;
    let results = results?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, kind, result);
    }
    Ok(())
}

pub async fn run_context(
    config: &Config,
    tenant: Option<&str>,
    query: &str,
    json: bool,
) -> Result<()> {
    require_embeddings(config)?;

    let engine = Engine::open(config, tenant).await?;
    let context = engine.context_builder().build(query).await;
    engine.close().await;
    let context = context?;

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
    } else {
        print_context(&context);
    }
    Ok(())
}

fn label(kind: RecordKind, result: &SearchResult) -> &str {
    let key = match kind {
        RecordKind::Task => "title",
        RecordKind::Routine => "name",
    };
    result.meta_str(key).unwrap_or("(untitled)")
}

fn print_result(rank: usize, kind: RecordKind, result: &SearchResult) {
    println!(
        "{}. [{:.3}] {} / {}",
        rank,
        result.distance,
        kind.as_str(),
        label(kind, result)
    );
    if let Some(status) = result.meta_str("status").filter(|s| !s.is_empty()) {
        println!("    status: {}", status);
    }
    if let Some(url) = result.meta_str("url") {
        println!("    url: {}", url);
    }
    let excerpt: String = result.text.replace('\n', " ").chars().take(160).collect();
    println!("    excerpt: \"{}\"", excerpt.trim());
    println!("    id: {}", result.chunk_id);
    println!();
}

fn print_context(context: &Context) {
    println!("context for \"{}\"", context.query);
    println!(
        "  calendar view: {} - {}",
        context.calendar_view_start, context.calendar_view_end
    );
    println!();

    for (kind, results) in [
        (RecordKind::Task, &context.tasks),
        (RecordKind::Routine, &context.routines),
    ] {
        println!("{} ({}):", kind.collection(), results.len());
        if results.is_empty() {
            println!("  (none)");
        }
        for (i, result) in results.iter().enumerate() {
            println!(
                "  {}. [{:.3}] {}",
                i + 1,
                result.distance,
                label(kind, result)
            );
        }
        println!();
    }
}
