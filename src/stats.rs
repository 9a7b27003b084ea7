//! `nrag stats`: what a tenant has indexed and when it last synced.

use anyhow::Result;
use chrono::{DateTime, Utc};

use notion_rag_core::models::RecordKind;

use crate::config::Config;
use crate::engine::Engine;
use crate::sqlite_store::collection_counts;

pub async fn run_stats(config: &Config, tenant: Option<&str>) -> Result<()> {
    let engine = Engine::open(config, tenant).await?;
    let state = engine.load_state().await;

    let db_size = std::fs::metadata(engine.paths().index_path())
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Tenant Stats: {}", engine.paths().label());
    println!("================================");
    println!();
    println!("  Directory:   {}", engine.paths().dir.display());
    println!("  Index size:  {}", format_bytes(db_size));
    println!(
        "  Last sync:   {}",
        match state.last_sync {
            Some(ts) => format_ts_relative(ts, Utc::now()),
            None => "never".to_string(),
        }
    );
    println!();
    println!(
        "  {:<12} {:>8} {:>8} {:>8}",
        "COLLECTION", "RECORDS", "CHUNKS", "SYNCED"
    );
    println!("  {}", "-".repeat(40));

    for kind in RecordKind::ALL {
        let (chunks, parents) = collection_counts(engine.pool(), kind.collection()).await?;
        println!(
            "  {:<12} {:>8} {:>8} {:>8}",
            kind.collection(),
            parents,
            chunks,
            state.synced(kind).len()
        );
    }
    println!();

    engine.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to `now` (e.g. "3 hours ago").
fn format_ts_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_relative_times() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(format_ts_relative(now - Duration::seconds(5), now), "just now");
        assert_eq!(format_ts_relative(now - Duration::minutes(1), now), "1 min ago");
        assert_eq!(format_ts_relative(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_ts_relative(now - Duration::days(2), now), "2 days ago");
        assert_eq!(
            format_ts_relative(now - Duration::days(40), now),
            "2025-01-29 12:00"
        );
        assert_eq!(
            format_ts_relative(now + Duration::hours(1), now),
            "2025-03-10 13:00"
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
