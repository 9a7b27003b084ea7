//! Incremental sync orchestrator.
//!
//! One pass walks each requested record kind independently:
//!
//! ```text
//! FETCH → FILTER → for each record: SERIALIZE → CHUNK → (skip if unchanged)
//!       → EMBED → REPLACE (delete old chunks + insert new, one unit)
//! → PRUNE records that vanished from the source
//! → COMMIT sync state
//! ```
//!
//! # Failure model
//!
//! - A record that fails to serialize, embed or write is recorded as a
//!   [`RecordError`] and the pass moves on. Embedding runs before the
//!   delete, so a failed embed leaves the record's old chunks in place.
//! - A fetch failure, or an index that cannot even be counted, fails the
//!   kind at pass level. The other kind still runs, but state is not
//!   committed and [`Synchronizer::sync`] returns the first such error.
//! - A failed state save is logged and reported (`state_saved = false`);
//!   the next pass will redo more work than necessary, never less.
//!
//! # Watermark
//!
//! Notion reports `last_edited_time` truncated to the minute, so an edit
//! made during the pass's start minute carries a stamp at or before the
//! start instant. The committed `last_sync` is therefore the minute
//! *before* the one the pass started in. Records are re-processed when
//! their `last_edited_time` is strictly later than it, or when the
//! timestamp is missing or unparseable. Records already indexed in that
//! window are selected again and fall through the unchanged check.
//!
//! # Unchanged skip
//!
//! Each chunk's metadata carries `embedding_model` (model name and
//! dimension). Switching embedders therefore makes every stored chunk
//! differ, and the next `--full` pass re-embeds it.
//!
//! # Concurrency
//!
//! Two passes over the same tenant must not overlap; the caller serializes
//! them. Searches may run during a pass.
//!
//! Cancellation is checked between records only, so a record is never left
//! half-written.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_record, ChunkParams};
use crate::collection::Collection;
use crate::error::{RagError, Result};
use crate::models::{Chunk, RecordKind, SourceRecord};
use crate::serialize::serialize;
use crate::source::SourceConnector;
use crate::state::{parse_timestamp, StateStore};
use crate::store::{Filter, StoredChunk};

/// Where in the per-record pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStage {
    Serialize,
    Embed,
    Index,
}

impl std::fmt::Display for RecordStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RecordStage::Serialize => "serialize",
            RecordStage::Embed => "embed",
            RecordStage::Index => "index",
        })
    }
}

/// A per-record failure folded into the [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    pub parent_id: String,
    pub kind: RecordKind,
    pub stage: RecordStage,
    pub message: String,
}

/// Options for one pass.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Ignore `last_sync` and consider every fetched record.
    pub full: bool,
    /// Serialize and chunk, but embed and write nothing.
    pub dry_run: bool,
    pub kinds: Vec<RecordKind>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            full: false,
            dry_run: false,
            kinds: RecordKind::ALL.to_vec(),
        }
    }
}

/// Per-kind counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionReport {
    pub kind: RecordKind,
    /// Records returned by the connector.
    pub fetched: usize,
    /// Records newer than the watermark (or all, on a full pass).
    pub selected: usize,
    /// Records whose chunks were rewritten (or would be, on a dry run).
    pub processed: usize,
    /// Selected records whose stored chunks already matched.
    pub unchanged: usize,
    pub failed: usize,
    /// Records selected only because their timestamp did not parse.
    pub timestamp_fallbacks: usize,
    pub chunks_written: usize,
    pub chunks_deleted: usize,
    /// Parents removed because the source no longer returns them.
    pub pruned: usize,
}

impl CollectionReport {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            fetched: 0,
            selected: 0,
            processed: 0,
            unchanged: 0,
            failed: 0,
            timestamp_fallbacks: 0,
            chunks_written: 0,
            chunks_deleted: 0,
            pruned: 0,
        }
    }
}

/// Structured outcome of [`Synchronizer::sync`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    /// The `last_sync` written by this pass, if it advanced.
    pub watermark: Option<DateTime<Utc>>,
    pub full: bool,
    pub dry_run: bool,
    pub collections: Vec<CollectionReport>,
    pub errors: Vec<RecordError>,
    /// The watermark and synced-ID sets were advanced.
    pub committed: bool,
    /// The committed state reached durable storage.
    pub state_saved: bool,
    pub cancelled: bool,
}

impl SyncReport {
    fn new(started_at: DateTime<Utc>, opts: &SyncOptions) -> Self {
        Self {
            started_at,
            watermark: None,
            full: opts.full,
            dry_run: opts.dry_run,
            collections: Vec::new(),
            errors: Vec::new(),
            committed: false,
            state_saved: false,
            cancelled: false,
        }
    }

    pub fn records_processed(&self) -> usize {
        self.collections.iter().map(|c| c.processed).sum()
    }

    pub fn chunks_written(&self) -> usize {
        self.collections.iter().map(|c| c.chunks_written).sum()
    }

    pub fn collection(&self, kind: RecordKind) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.kind == kind)
    }
}

/// Observer for pass progress. Every method has a no-op default.
pub trait SyncProgress: Send + Sync {
    fn on_fetched(&self, _kind: RecordKind, _fetched: usize, _selected: usize) {}
    fn on_record(&self, _kind: RecordKind, _done: usize, _total: usize) {}
    fn on_collection_done(&self, _report: &CollectionReport) {}
    fn on_collection_failed(&self, _kind: RecordKind, _error: &RagError) {}
}

/// Discards all progress events.
pub struct NoProgress;

impl SyncProgress for NoProgress {}

enum RecordOutcome {
    Written { written: usize, deleted: usize },
    Unchanged,
    Planned { chunks: usize },
}

struct RecordFailure {
    stage: RecordStage,
    error: RagError,
}

fn fail(stage: RecordStage) -> impl FnOnce(RagError) -> RecordFailure {
    move |error| RecordFailure { stage, error }
}

/// What a kind's pass produced when it completed at pass level.
struct KindOutcome {
    /// Every ID fetched this pass. A record whose write failed may still
    /// hold older chunks, so it stays tracked until the source drops it.
    synced: BTreeSet<String>,
}

/// Drives sync passes for one tenant.
pub struct Synchronizer {
    source: Arc<dyn SourceConnector>,
    tasks: Collection,
    routines: Collection,
    state: Arc<dyn StateStore>,
    params: ChunkParams,
}

impl Synchronizer {
    pub fn new(
        source: Arc<dyn SourceConnector>,
        tasks: Collection,
        routines: Collection,
        state: Arc<dyn StateStore>,
        params: ChunkParams,
    ) -> Self {
        Self {
            source,
            tasks,
            routines,
            state,
            params,
        }
    }

    pub fn collection(&self, kind: RecordKind) -> &Collection {
        match kind {
            RecordKind::Task => &self.tasks,
            RecordKind::Routine => &self.routines,
        }
    }

    /// Run a pass without cancellation or progress reporting.
    pub async fn sync(&self, opts: &SyncOptions) -> Result<SyncReport> {
        self.sync_with(opts, &CancellationToken::new(), &NoProgress)
            .await
    }

    pub async fn sync_with(
        &self,
        opts: &SyncOptions,
        cancel: &CancellationToken,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        let started_at = Utc::now();
        let mut state = self.state.load().await;
        let watermark = if opts.full { None } else { state.last_sync };
        let mut report = SyncReport::new(started_at, opts);

        info!(
            source = self.source.name(),
            full = opts.full,
            dry_run = opts.dry_run,
            watermark = ?watermark,
            "sync pass started"
        );

        let mut pass_error: Option<RagError> = None;
        let mut synced: BTreeMap<RecordKind, BTreeSet<String>> = BTreeMap::new();

        for &kind in &opts.kinds {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let previous = state.synced(kind).clone();
            match self
                .sync_kind(kind, watermark, &previous, opts, cancel, progress, &mut report)
                .await
            {
                Ok(outcome) => {
                    synced.insert(kind, outcome.synced);
                }
                Err(e) => {
                    warn!(collection = kind.collection(), error = %e, "collection pass failed");
                    progress.on_collection_failed(kind, &e);
                    pass_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = pass_error {
            return Err(e);
        }
        if report.cancelled {
            info!("sync pass cancelled; state not committed");
            return Ok(report);
        }
        if opts.dry_run {
            return Ok(report);
        }

        // A pass restricted to some kinds must not move the shared
        // watermark past records of the kinds it skipped.
        if RecordKind::ALL.iter().all(|k| opts.kinds.contains(k)) {
            let watermark = watermark_for(started_at);
            state.last_sync = Some(watermark);
            report.watermark = Some(watermark);
        }
        for (kind, ids) in synced {
            *state.synced_mut(kind) = ids;
        }
        report.committed = true;

        match self.state.save(&state).await {
            Ok(()) => report.state_saved = true,
            Err(e) => warn!(error = %e, "could not persist sync state; next pass will reprocess"),
        }

        info!(
            processed = report.records_processed(),
            chunks_written = report.chunks_written(),
            errors = report.errors.len(),
            "sync pass finished"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn sync_kind(
        &self,
        kind: RecordKind,
        watermark: Option<DateTime<Utc>>,
        previous: &BTreeSet<String>,
        opts: &SyncOptions,
        cancel: &CancellationToken,
        progress: &dyn SyncProgress,
        report: &mut SyncReport,
    ) -> Result<KindOutcome> {
        let collection = self.collection(kind);
        let records = self.source.fetch(kind).await?;
        // Probe the index so an unreachable store fails the pass instead of
        // every record.
        collection.count().await?;

        let mut cr = CollectionReport::new(kind);
        cr.fetched = records.len();

        let mut selected: Vec<&SourceRecord> = Vec::new();
        for record in &records {
            match modified_since(record, watermark) {
                Selection::Skip => {}
                Selection::Include => selected.push(record),
                Selection::IncludeUnparsed => {
                    cr.timestamp_fallbacks += 1;
                    selected.push(record);
                }
            }
        }
        cr.selected = selected.len();
        progress.on_fetched(kind, cr.fetched, cr.selected);
        debug!(collection = kind.collection(), fetched = cr.fetched, selected = cr.selected, "filtered");

        let total = selected.len();
        for (i, record) in selected.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.sync_record(collection, record, opts.dry_run).await {
                Ok(RecordOutcome::Written { written, deleted }) => {
                    cr.processed += 1;
                    cr.chunks_written += written;
                    cr.chunks_deleted += deleted;
                }
                Ok(RecordOutcome::Unchanged) => cr.unchanged += 1,
                Ok(RecordOutcome::Planned { chunks }) => {
                    cr.processed += 1;
                    cr.chunks_written += chunks;
                }
                Err(RecordFailure { stage, error }) => {
                    let parent_id = record.id().to_string();
                    warn!(
                        parent_id = %parent_id,
                        collection = kind.collection(),
                        stage = %stage,
                        error = %error,
                        "record failed"
                    );
                    cr.failed += 1;
                    report.errors.push(RecordError {
                        parent_id,
                        kind,
                        stage,
                        message: error.to_string(),
                    });
                }
            }
            progress.on_record(kind, i + 1, total);
        }

        let current: BTreeSet<String> = records
            .iter()
            .map(|r| r.id())
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect();

        if !opts.dry_run && !report.cancelled {
            for gone in previous.difference(&current) {
                match collection.delete(&Filter::parent(gone)).await {
                    Ok(0) => {}
                    Ok(n) => {
                        info!(parent_id = %gone, collection = kind.collection(), chunks = n, "pruned record missing from source");
                        cr.pruned += 1;
                        cr.chunks_deleted += n;
                    }
                    Err(e) => {
                        warn!(parent_id = %gone, collection = kind.collection(), error = %e, "prune failed");
                        report.errors.push(RecordError {
                            parent_id: gone.clone(),
                            kind,
                            stage: RecordStage::Index,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        progress.on_collection_done(&cr);
        report.collections.push(cr);

        Ok(KindOutcome { synced: current })
    }

    async fn sync_record(
        &self,
        collection: &Collection,
        record: &SourceRecord,
        dry_run: bool,
    ) -> std::result::Result<RecordOutcome, RecordFailure> {
        let serialized = serialize(record).map_err(fail(RecordStage::Serialize))?;
        let parent_id = serialized.parent_id.as_str();
        let mut chunks = chunk_record(
            parent_id,
            &serialized.text,
            &serialized.metadata,
            &self.params,
        );
        let fingerprint = embedder_fingerprint(collection);
        for chunk in &mut chunks {
            chunk
                .metadata
                .insert("embedding_model".into(), fingerprint.as_str().into());
        }

        if dry_run {
            return Ok(RecordOutcome::Planned {
                chunks: chunks.len(),
            });
        }

        let existing = collection
            .get(&Filter::parent(parent_id))
            .await
            .map_err(fail(RecordStage::Index))?;
        if matches_stored(&chunks, &existing) {
            debug!(parent_id, collection = collection.name(), "unchanged; skipped");
            return Ok(RecordOutcome::Unchanged);
        }

        let staged = collection
            .stage(&chunks)
            .await
            .map_err(|e| RagError::EmbeddingBackend {
                parent_id: parent_id.to_string(),
                reason: match e {
                    RagError::EmbeddingBackend { reason, .. } => reason,
                    other => other.to_string(),
                },
            })
            .map_err(fail(RecordStage::Embed))?;

        let deleted = collection
            .replace_parent(parent_id, staged)
            .await
            .map_err(fail(RecordStage::Index))?;

        Ok(RecordOutcome::Written {
            written: chunks.len(),
            deleted,
        })
    }
}

/// One minute below the minute floor of the pass start, so a
/// minute-precision stamp inside the start minute compares as newer.
fn watermark_for(started_at: DateTime<Utc>) -> DateTime<Utc> {
    let floor = started_at
        .duration_trunc(Duration::minutes(1))
        .unwrap_or(started_at);
    floor - Duration::minutes(1)
}

fn embedder_fingerprint(collection: &Collection) -> String {
    let embedder = collection.embedder();
    format!("{}/{}", embedder.model_name(), embedder.dims())
}

enum Selection {
    Skip,
    Include,
    IncludeUnparsed,
}

fn modified_since(record: &SourceRecord, watermark: Option<DateTime<Utc>>) -> Selection {
    let Some(watermark) = watermark else {
        return Selection::Include;
    };
    let Some(raw) = record.last_edited_time() else {
        return Selection::IncludeUnparsed;
    };
    match parse_timestamp(raw) {
        Ok(ts) if ts > watermark => Selection::Include,
        Ok(_) => Selection::Skip,
        Err(e) => {
            warn!(parent_id = record.id(), error = %e, "treating record as modified");
            Selection::IncludeUnparsed
        }
    }
}

/// True when the stored chunk set is exactly the freshly computed one.
/// Metadata carries `content_hash`, so equal metadata means equal text.
fn matches_stored(chunks: &[Chunk], stored: &[StoredChunk]) -> bool {
    if chunks.len() != stored.len() {
        return false;
    }
    let by_id: BTreeMap<&str, &StoredChunk> = stored.iter().map(|s| (s.id.as_str(), s)).collect();
    chunks.iter().all(|c| {
        by_id
            .get(c.id.as_str())
            .map(|s| s.metadata == c.metadata && s.document == c.text)
            .unwrap_or(false)
    })
}
