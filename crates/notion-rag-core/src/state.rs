//! Sync state: the persisted watermark and per-kind synced-ID sets.
//!
//! Persisted shape:
//!
//! ```json
//! {"last_sync": "2026-10-18T09:00:00Z", "tasks_synced": ["t1"], "routines_synced": []}
//! ```
//!
//! `last_sync` may also be a naive ISO-8601 string (no offset), which is
//! read as UTC. Loading never fails: a missing or unreadable state is the
//! zero value, which makes the next pass a full sync.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::models::RecordKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default, with = "watermark")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tasks_synced: BTreeSet<String>,
    #[serde(default)]
    pub routines_synced: BTreeSet<String>,
}

impl SyncState {
    pub fn synced(&self, kind: RecordKind) -> &BTreeSet<String> {
        match kind {
            RecordKind::Task => &self.tasks_synced,
            RecordKind::Routine => &self.routines_synced,
        }
    }

    pub fn synced_mut(&mut self, kind: RecordKind) -> &mut BTreeSet<String> {
        match kind {
            RecordKind::Task => &mut self.tasks_synced,
            RecordKind::Routine => &mut self.routines_synced,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| RagError::SyncStateIo(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| RagError::SyncStateIo(e.to_string()))
    }
}

/// Parse a source or state timestamp.
///
/// Accepts RFC 3339 (`2026-10-18T09:00:00.000Z`, `...+02:00`), naive
/// date-times (read as UTC) and bare dates (midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let v = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(v, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(RagError::TimestampParse {
        value: value.to_string(),
    })
}

mod watermark {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => super::parse_timestamp(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Durable location for one tenant's [`SyncState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state, or the zero value if none is readable.
    async fn load(&self) -> SyncState;

    /// Persist the state. Callers treat failure as non-fatal.
    async fn save(&self, state: &SyncState) -> Result<()>;
}

/// Process-local [`StateStore`].
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<SyncState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SyncState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// The last saved state, if any.
    pub fn saved(&self) -> Option<SyncState> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> SyncState {
        self.saved().unwrap_or_default()
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        let mut slot = self
            .state
            .lock()
            .map_err(|_| RagError::SyncStateIo("state lock poisoned".into()))?;
        *slot = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2026-10-18T09:30:00.000Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2026-10-18T11:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2026-10-18T09:30:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2026-10-18").unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("last tuesday").unwrap_err();
        assert!(matches!(err, RagError::TimestampParse { .. }));
    }

    #[test]
    fn test_state_json_shape() {
        let mut state = SyncState {
            last_sync: Some(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()),
            ..Default::default()
        };
        state.tasks_synced.insert("t1".into());
        let json = state.to_json().unwrap();
        assert!(json.contains("\"last_sync\": \"2026-01-02T03:04:05.000000Z\""));
        assert_eq!(SyncState::from_json(&json).unwrap(), state);
    }

    #[test]
    fn test_state_accepts_naive_and_null() {
        let s = SyncState::from_json(r#"{"last_sync": "2025-06-01T12:00:00.123456"}"#).unwrap();
        assert!(s.last_sync.is_some());
        assert!(s.tasks_synced.is_empty());

        let s = SyncState::from_json(r#"{"last_sync": null}"#).unwrap();
        assert_eq!(s, SyncState::default());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStateStore::new();
        assert_eq!(store.load().await, SyncState::default());
        let state = SyncState {
            last_sync: Some(Utc::now()),
            ..Default::default()
        };
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await, state);
    }
}
