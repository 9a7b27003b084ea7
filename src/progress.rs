//! Sync progress reporting.
//!
//! Reports observable progress during `nrag sync` so users see what is being
//! fetched, how much is left, and which collection failed. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use notion_rag_core::models::RecordKind;
use notion_rag_core::sync::{CollectionReport, NoProgress, SyncProgress};
use notion_rag_core::RagError;

fn emit(line: &str) {
    let mut err = std::io::stderr().lock();
    let _ = err.write_all(line.as_bytes());
    let _ = err.flush();
}

/// Human-friendly progress on stderr: "sync tasks  ingesting  12 / 40 records".
pub struct StderrProgress;

impl SyncProgress for StderrProgress {
    fn on_fetched(&self, kind: RecordKind, fetched: usize, selected: usize) {
        emit(&format!(
            "sync {}  fetched {} records, {} selected\n",
            kind.collection(),
            format_number(fetched as u64),
            format_number(selected as u64)
        ));
    }

    fn on_record(&self, kind: RecordKind, done: usize, total: usize) {
        emit(&format!(
            "sync {}  ingesting  {} / {} records\n",
            kind.collection(),
            format_number(done as u64),
            format_number(total as u64)
        ));
    }

    fn on_collection_failed(&self, kind: RecordKind, error: &RagError) {
        emit(&format!("sync {}  failed: {}\n", kind.collection(), error));
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn write(obj: serde_json::Value) {
        if let Ok(line) = serde_json::to_string(&obj) {
            emit(&format!("{}\n", line));
        }
    }
}

impl SyncProgress for JsonProgress {
    fn on_fetched(&self, kind: RecordKind, fetched: usize, selected: usize) {
        Self::write(serde_json::json!({
            "event": "progress",
            "collection": kind.collection(),
            "phase": "fetched",
            "fetched": fetched,
            "selected": selected
        }));
    }

    fn on_record(&self, kind: RecordKind, done: usize, total: usize) {
        Self::write(serde_json::json!({
            "event": "progress",
            "collection": kind.collection(),
            "phase": "ingesting",
            "n": done,
            "total": total
        }));
    }

    fn on_collection_done(&self, report: &CollectionReport) {
        Self::write(serde_json::json!({
            "event": "collection_done",
            "collection": report.kind.collection(),
            "report": report
        }));
    }

    fn on_collection_failed(&self, kind: RecordKind, error: &RagError) {
        Self::write(serde_json::json!({
            "event": "collection_failed",
            "collection": kind.collection(),
            "error": error.to_string()
        }));
    }
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgress> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!("unknown progress mode '{}': use off, human or json", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_mode_parse() {
        assert_eq!("json".parse::<ProgressMode>().unwrap(), ProgressMode::Json);
        assert_eq!("off".parse::<ProgressMode>().unwrap(), ProgressMode::Off);
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
