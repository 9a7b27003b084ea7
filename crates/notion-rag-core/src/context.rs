//! Context builder: one similarity query per collection, shaped into a
//! bounded [`Context`] for a downstream reasoning step.
//!
//! Cardinality is bounded by the per-collection `top_k`; byte size is not
//! truncated here. The builder is read-only and may run while a sync pass
//! is writing.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collection::Collection;
use crate::error::Result;
use crate::models::{RecordKind, SearchResult};

pub const DEFAULT_TASK_TOP_K: usize = 5;
pub const DEFAULT_ROUTINE_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    pub task_top_k: usize,
    pub routine_top_k: usize,
    /// Start of the user's calendar view window, `HH:MM`.
    pub calendar_view_start: String,
    /// End of the calendar view window; may wrap past midnight.
    pub calendar_view_end: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            task_top_k: DEFAULT_TASK_TOP_K,
            routine_top_k: DEFAULT_ROUTINE_TOP_K,
            calendar_view_start: "10:00".into(),
            calendar_view_end: "02:00".into(),
        }
    }
}

/// Retrieved context for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub query: String,
    pub tasks: Vec<SearchResult>,
    pub routines: Vec<SearchResult>,
    pub calendar_view_start: String,
    pub calendar_view_end: String,
    pub generated_at: DateTime<Utc>,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.routines.is_empty()
    }
}

pub struct ContextBuilder {
    tasks: Collection,
    routines: Collection,
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(tasks: Collection, routines: Collection, config: ContextConfig) -> Self {
        Self {
            tasks,
            routines,
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Top-`top_k` chunks of one collection, most similar first.
    pub async fn search(
        &self,
        kind: RecordKind,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collection = match kind {
            RecordKind::Task => &self.tasks,
            RecordKind::Routine => &self.routines,
        };
        collection.query(query, top_k).await
    }

    pub async fn build(&self, query: &str) -> Result<Context> {
        let tasks = self
            .search(RecordKind::Task, query, self.config.task_top_k)
            .await?;
        let routines = self
            .search(RecordKind::Routine, query, self.config.routine_top_k)
            .await?;

        Ok(Context {
            query: query.to_string(),
            tasks,
            routines,
            calendar_view_start: self.config.calendar_view_start.clone(),
            calendar_view_end: self.config.calendar_view_end.clone(),
            generated_at: Utc::now(),
        })
    }
}
