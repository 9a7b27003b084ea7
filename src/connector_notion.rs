//! Notion database connector.
//!
//! Queries the tasks and routines databases through
//! `POST /v1/databases/{id}/query`, following `next_cursor` until
//! `has_more` is false. Auth is a bearer token from `NOTION_API_KEY`.
//!
//! # Property mapping
//!
//! | Field | Tasks DB | Routines DB |
//! |-------|----------|-------------|
//! | title / name | `Task` (title) | `Task` (title) |
//! | status | `Status` (status) | `Status` (multi_select) |
//! | priority | `Priority` (select) | |
//! | due / time | `Due Date` (date) | `Time` (date) |
//! | scheduled time | `Scheduled Time` (date) | |
//! | duration | `Estimated Duration (minutes)` (number) | `Duration` (number) |
//! | tags / days | `Tags` (multi_select) | `Days` (multi_select) |
//! | notes | `Notes` (rich_text) | `Notes` (rich_text) |
//! | category, energy, location | | `Category`, `Energy Level`, `Location` (select) |
//!
//! Values are read by the property's declared `type`, so a column switched
//! from `select` to `status` keeps working. Tasks without a title become
//! "Untitled Task" and default to status "Not Started"; routines without a
//! name are skipped.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use notion_rag_core::models::{RecordKind, Routine, SourceRecord, Task};
use notion_rag_core::source::SourceConnector;
use notion_rag_core::RagError;

use crate::config::NotionConfig;
use crate::http::{client_with_timeout, post_json_with_retry};

const PAGE_SIZE: usize = 100;

pub struct NotionConnector {
    client: reqwest::Client,
    token: String,
    base_url: String,
    api_version: String,
    max_retries: u32,
    tasks_database_id: String,
    routines_database_id: String,
}

impl NotionConnector {
    /// Build from `[notion]` config and the `NOTION_API_KEY` environment
    /// variable.
    pub fn from_config(config: &NotionConfig) -> Result<Self> {
        let token = std::env::var("NOTION_API_KEY")
            .map_err(|_| anyhow!("NOTION_API_KEY environment variable not set"))?;
        let tasks_database_id = config
            .tasks_database_id
            .clone()
            .ok_or_else(|| anyhow!("notion.tasks_database_id is not set"))?;
        let routines_database_id = config
            .routines_database_id
            .clone()
            .ok_or_else(|| anyhow!("notion.routines_database_id is not set"))?;

        Ok(Self {
            client: client_with_timeout(config.timeout_secs)?,
            token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            max_retries: config.max_retries,
            tasks_database_id,
            routines_database_id,
        })
    }

    fn database_id(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Task => &self.tasks_database_id,
            RecordKind::Routine => &self.routines_database_id,
        }
    }

    /// Every page of one database, in API order.
    async fn query_all(&self, database_id: &str) -> Result<Vec<Value>> {
        let endpoint = format!("{}/v1/databases/{}/query", self.base_url, database_id);
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = serde_json::json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = Value::String(c.clone());
            }

            let json = post_json_with_retry(&self.client, "Notion", self.max_retries, |c| {
                c.post(&endpoint)
                    .bearer_auth(&self.token)
                    .header("Notion-Version", &self.api_version)
                    .json(&body)
            })
            .await?;

            let (results, next) = parse_query_page(&json)?;
            debug!(database_id, page_len = results.len(), "fetched notion page");
            pages.extend(results);

            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        Ok(pages)
    }
}

#[async_trait]
impl SourceConnector for NotionConnector {
    fn name(&self) -> &str {
        "notion"
    }

    async fn fetch(&self, kind: RecordKind) -> notion_rag_core::Result<Vec<SourceRecord>> {
        let pages = self
            .query_all(self.database_id(kind))
            .await
            .map_err(|e| RagError::Source {
                kind,
                reason: format!("{:#}", e),
            })?;

        Ok(match kind {
            RecordKind::Task => pages
                .iter()
                .map(|p| SourceRecord::from(task_from_page(p)))
                .collect(),
            RecordKind::Routine => pages
                .iter()
                .filter_map(routine_from_page)
                .map(SourceRecord::from)
                .collect(),
        })
    }
}

/// Split one query response into its results and the cursor for the next
/// page (`None` when this is the last page).
fn parse_query_page(json: &Value) -> Result<(Vec<Value>, Option<String>)> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow!("Invalid Notion response: missing results array"))?
        .clone();
    let has_more = json
        .get("has_more")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let next = if has_more {
        json.get("next_cursor")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    } else {
        None
    };
    Ok((results, next))
}

/// A property value decoded by its declared `type`.
#[derive(Debug, Clone, PartialEq)]
enum PropertyValue {
    Text(String),
    List(Vec<String>),
    Number(f64),
    Bool(bool),
    Empty,
}

impl PropertyValue {
    fn text(self) -> Option<String> {
        match self {
            PropertyValue::Text(s) if !s.trim().is_empty() => Some(s),
            PropertyValue::List(items) if !items.is_empty() => Some(items.join(", ")),
            _ => None,
        }
    }

    fn list(self) -> Vec<String> {
        match self {
            PropertyValue::List(items) => items,
            PropertyValue::Text(s) if !s.trim().is_empty() => vec![s],
            _ => Vec::new(),
        }
    }

    fn minutes(self) -> Option<u32> {
        match self {
            PropertyValue::Number(n) if n.is_finite() && n >= 0.0 => Some(n.round() as u32),
            _ => None,
        }
    }
}

fn plain_text(fragments: &Value) -> String {
    fragments
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn option_name(option: &Value) -> Option<String> {
    option.get("name").and_then(|n| n.as_str()).map(str::to_string)
}

fn decode_property(prop: &Value) -> PropertyValue {
    let Some(kind) = prop.get("type").and_then(|t| t.as_str()) else {
        return PropertyValue::Empty;
    };
    let value = prop.get(kind).unwrap_or(&Value::Null);
    if value.is_null() {
        return PropertyValue::Empty;
    }

    match kind {
        "title" | "rich_text" => PropertyValue::Text(plain_text(value)),
        "select" | "status" => option_name(value)
            .map(PropertyValue::Text)
            .unwrap_or(PropertyValue::Empty),
        "multi_select" => PropertyValue::List(
            value
                .as_array()
                .map(|items| items.iter().filter_map(option_name).collect())
                .unwrap_or_default(),
        ),
        "date" => value
            .get("start")
            .and_then(|s| s.as_str())
            .map(|s| PropertyValue::Text(s.to_string()))
            .unwrap_or(PropertyValue::Empty),
        "number" => value
            .as_f64()
            .map(PropertyValue::Number)
            .unwrap_or(PropertyValue::Empty),
        "checkbox" => value
            .as_bool()
            .map(PropertyValue::Bool)
            .unwrap_or(PropertyValue::Empty),
        "url" | "email" | "phone_number" => value
            .as_str()
            .map(|s| PropertyValue::Text(s.to_string()))
            .unwrap_or(PropertyValue::Empty),
        _ => PropertyValue::Empty,
    }
}

fn prop(page: &Value, name: &str) -> PropertyValue {
    page.get("properties")
        .and_then(|p| p.get(name))
        .map(decode_property)
        .unwrap_or(PropertyValue::Empty)
}

fn page_str(page: &Value, key: &str) -> Option<String> {
    page.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn task_from_page(page: &Value) -> Task {
    Task {
        id: page_str(page, "id").unwrap_or_default(),
        title: prop(page, "Task")
            .text()
            .unwrap_or_else(|| "Untitled Task".to_string()),
        status: Some(
            prop(page, "Status")
                .text()
                .unwrap_or_else(|| "Not Started".to_string()),
        ),
        priority: prop(page, "Priority").text(),
        due_date: prop(page, "Due Date").text(),
        scheduled_time: prop(page, "Scheduled Time").text(),
        estimated_duration: prop(page, "Estimated Duration (minutes)").minutes(),
        tags: prop(page, "Tags").list(),
        notes: prop(page, "Notes").text(),
        url: page_str(page, "url"),
        last_edited_time: page_str(page, "last_edited_time"),
    }
}

fn routine_from_page(page: &Value) -> Option<Routine> {
    let id = page_str(page, "id").unwrap_or_default();
    let Some(name) = prop(page, "Task").text() else {
        warn!(page_id = %id, "skipping routine without a name");
        return None;
    };

    let recurring = match prop(page, "Recurring") {
        PropertyValue::Bool(b) => Some(b),
        _ => None,
    };

    Some(Routine {
        id,
        name,
        category: prop(page, "Category").text(),
        days: prop(page, "Days").list(),
        time: prop(page, "Time").text(),
        duration: prop(page, "Duration").minutes(),
        energy_level: prop(page, "Energy Level").text(),
        location: prop(page, "Location").text(),
        status: prop(page, "Status").list(),
        recurring,
        recurrence_pattern: prop(page, "Recurrence Pattern").text(),
        notes: prop(page, "Notes").text(),
        url: page_str(page, "url"),
        last_edited_time: page_str(page, "last_edited_time"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task_page() -> Value {
        json!({
            "object": "page",
            "id": "a1b2",
            "url": "https://www.notion.so/a1b2",
            "last_edited_time": "2025-03-01T08:15:00.000Z",
            "properties": {
                "Task": { "type": "title", "title": [
                    { "plain_text": "Write " }, { "plain_text": "quarterly report" }
                ]},
                "Status": { "type": "status", "status": { "name": "In Progress" } },
                "Priority": { "type": "select", "select": { "name": "High" } },
                "Due Date": { "type": "date", "date": { "start": "2025-03-07", "end": null } },
                "Estimated Duration (minutes)": { "type": "number", "number": 90 },
                "Tags": { "type": "multi_select", "multi_select": [
                    { "name": "work" }, { "name": "writing" }
                ]},
                "Notes": { "type": "rich_text", "rich_text": [{ "plain_text": "Use Q4 numbers" }] }
            }
        })
    }

    #[test]
    fn test_task_mapping() {
        let task = task_from_page(&task_page());
        assert_eq!(task.id, "a1b2");
        assert_eq!(task.title, "Write quarterly report");
        assert_eq!(task.status.as_deref(), Some("In Progress"));
        assert_eq!(task.priority.as_deref(), Some("High"));
        assert_eq!(task.due_date.as_deref(), Some("2025-03-07"));
        assert_eq!(task.scheduled_time, None);
        assert_eq!(task.estimated_duration, Some(90));
        assert_eq!(task.tags, vec!["work", "writing"]);
        assert_eq!(task.notes.as_deref(), Some("Use Q4 numbers"));
        assert_eq!(task.last_edited_time.as_deref(), Some("2025-03-01T08:15:00.000Z"));
    }

    #[test]
    fn test_task_defaults() {
        let page = json!({
            "id": "x",
            "properties": {
                "Task": { "type": "title", "title": [] },
                "Status": { "type": "status", "status": null }
            }
        });
        let task = task_from_page(&page);
        assert_eq!(task.title, "Untitled Task");
        assert_eq!(task.status.as_deref(), Some("Not Started"));
        assert!(task.tags.is_empty());
    }

    #[test]
    fn test_status_as_select_column() {
        let mut page = task_page();
        page["properties"]["Status"] = json!({ "type": "select", "select": { "name": "Done" } });
        assert_eq!(task_from_page(&page).status.as_deref(), Some("Done"));
    }

    #[test]
    fn test_routine_mapping_and_skip() {
        let page = json!({
            "id": "r1",
            "url": "https://www.notion.so/r1",
            "properties": {
                "Task": { "type": "title", "title": [{ "plain_text": "Morning run" }] },
                "Duration": { "type": "number", "number": 30 },
                "Category": { "type": "select", "select": { "name": "Health" } },
                "Days": { "type": "multi_select", "multi_select": [{ "name": "Mon" }, { "name": "Wed" }] },
                "Status": { "type": "multi_select", "multi_select": [{ "name": "Active" }] },
                "Energy Level": { "type": "select", "select": { "name": "High" } },
                "Time": { "type": "date", "date": { "start": "2025-01-01T07:00:00.000+00:00" } },
                "Location": { "type": "select", "select": null }
            }
        });
        let routine = routine_from_page(&page).unwrap();
        assert_eq!(routine.name, "Morning run");
        assert_eq!(routine.duration, Some(30));
        assert_eq!(routine.days, vec!["Mon", "Wed"]);
        assert_eq!(routine.status, vec!["Active"]);
        assert_eq!(routine.location, None);
        assert_eq!(routine.last_edited_time, None);

        let nameless = json!({ "id": "r2", "properties": {} });
        assert!(routine_from_page(&nameless).is_none());
    }

    #[test]
    fn test_pagination_cursor() {
        let page = json!({ "results": [{}, {}], "has_more": true, "next_cursor": "c2" });
        let (results, next) = parse_query_page(&page).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(next.as_deref(), Some("c2"));

        let last = json!({ "results": [], "has_more": false, "next_cursor": null });
        assert_eq!(parse_query_page(&last).unwrap().1, None);

        assert!(parse_query_page(&json!({ "object": "error" })).is_err());
    }

    #[test]
    fn test_unknown_property_type_is_empty() {
        let v = decode_property(&json!({ "type": "formula", "formula": { "string": "x" } }));
        assert_eq!(v, PropertyValue::Empty);
        assert_eq!(decode_property(&json!({})), PropertyValue::Empty);
    }
}
