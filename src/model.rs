use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::error::{Result, StoreError};
use crate::store::frontmatter::Metadata;

pub const IN_PROGRESS_COLUMN: &str = "in-progress";
pub const DONE_COLUMN: &str = "done";

/// RFC 3339, UTC, millisecond precision: `2025-01-01T00:00:00.000Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts full RFC 3339 timestamps and bare `YYYY-MM-DD` dates.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Elapsed time as `H:MM`; negative spans count as zero.
pub fn format_work_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let minutes = (end - start).num_minutes().max(0);
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

/// Pull a timestamp out of `meta`. Unparseable values stay behind in `meta`
/// so they are written back untouched.
fn take_timestamp(meta: &mut Metadata, key: &str) -> Option<DateTime<Utc>> {
    let ts = meta.get(key).and_then(parse_timestamp)?;
    meta.remove(key);
    Some(ts)
}

fn take_string(meta: &mut Metadata, key: &str) -> Option<String> {
    let value = meta.get_string(key)?;
    meta.remove(key);
    Some(value)
}

/// A task as stored in `task.md`. Fields the store reasons about are typed;
/// everything else (scheduling data, collaborator fields) rides in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_in_progress_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_in_done_at: Option<DateTime<Utc>>,
    /// `H:MM`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worked_on_for: Option<String>,
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub extra: Metadata,
}

impl TaskRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            parent_id: None,
            project_id: None,
            created_at: None,
            moved_in_progress_at: None,
            moved_in_done_at: None,
            worked_on_for: None,
            extra: Metadata::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Frontmatter for `task.md`. The title lives in the body heading, not here.
    pub fn to_metadata(&self) -> Metadata {
        let mut meta = self.extra.clone();
        meta.remove("title");
        meta.remove("description");
        meta.insert("id", self.id.as_str());
        meta.set_opt("parent_id", self.parent_id.as_deref());
        meta.set_opt("project_id", self.project_id.as_deref());
        meta.set_opt("worked_on_for", self.worked_on_for.as_deref());
        for (key, ts) in [
            ("created_at", &self.created_at),
            ("moved_in_progress_at", &self.moved_in_progress_at),
            ("moved_in_done_at", &self.moved_in_done_at),
        ] {
            if let Some(ts) = ts {
                meta.insert(key, format_timestamp(ts));
            } else if meta.get(key).is_some_and(|value| parse_timestamp(value).is_some()) {
                meta.remove(key);
            }
        }
        meta
    }

    /// Rebuild a task from parsed frontmatter and body. The title falls back to
    /// the body heading, then `fallback_title`; a missing `id` is derived from
    /// the title.
    pub fn from_document(mut meta: Metadata, body: &str, fallback_title: &str) -> Self {
        use crate::store::frontmatter::{extract_title, strip_title_header};

        let title = take_string(&mut meta, "title")
            .or_else(|| extract_title(body))
            .unwrap_or_else(|| fallback_title.to_string());
        let id = take_string(&mut meta, "id")
            .unwrap_or_else(|| crate::store::paths::generate_id_from_name(&title));
        let description = match take_string(&mut meta, "description") {
            Some(desc) => desc,
            None => strip_title_header(body),
        };

        Self {
            id,
            title,
            description,
            parent_id: take_string(&mut meta, "parent_id"),
            project_id: take_string(&mut meta, "project_id"),
            created_at: take_timestamp(&mut meta, "created_at"),
            moved_in_progress_at: take_timestamp(&mut meta, "moved_in_progress_at"),
            moved_in_done_at: take_timestamp(&mut meta, "moved_in_done_at"),
            worked_on_for: take_string(&mut meta, "worked_on_for"),
            extra: meta,
        }
    }

    /// Set one frontmatter field by key. Typed fields are parsed into place,
    /// anything else lands in `extra`; a null value clears the field.
    pub fn set_field(&mut self, key: &str, value: Value) -> Result<()> {
        let text = match &value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        };
        match key {
            "id" | "title" | "description" => {
                return Err(StoreError::Validation(format!(
                    "'{key}' cannot be set as a plain field"
                )));
            }
            "parent_id" => self.parent_id = text,
            "project_id" => self.project_id = text,
            "worked_on_for" => self.worked_on_for = text,
            "created_at" | "moved_in_progress_at" | "moved_in_done_at" => {
                let ts = match value {
                    Value::Null => None,
                    ref other => Some(parse_timestamp(other).ok_or_else(|| {
                        StoreError::Validation(format!("'{key}' is not a timestamp"))
                    })?),
                };
                match key {
                    "created_at" => self.created_at = ts,
                    "moved_in_progress_at" => self.moved_in_progress_at = ts,
                    _ => self.moved_in_done_at = ts,
                }
            }
            _ if value.is_null() => {
                self.extra.remove(key);
            }
            _ => self.extra.insert(key, value),
        }
        Ok(())
    }

    /// Stamp timing fields for a move between columns: entering `in-progress`
    /// sets `moved_in_progress_at`; entering `done` sets `moved_in_done_at`
    /// and, when the start is known, `worked_on_for`.
    pub fn record_column_change(&mut self, from_slug: &str, to_slug: &str, now: DateTime<Utc>) {
        let from = from_slug.replace('_', "-");
        let to = to_slug.replace('_', "-");
        if from == to {
            return;
        }
        if to == IN_PROGRESS_COLUMN {
            self.moved_in_progress_at = Some(now);
        }
        if to == DONE_COLUMN {
            self.moved_in_done_at = Some(now);
            if let Some(start) = self.moved_in_progress_at {
                self.worked_on_for = Some(format_work_duration(start, now));
            }
        }
    }

    /// Drop timing fields that make no sense for the column the task sits in.
    /// Only `in-progress` keeps `moved_in_progress_at`; only `done` keeps
    /// everything.
    pub fn normalize_for_column(&mut self, column_slug: &str) {
        let column = column_slug.replace('_', "-");
        if column == DONE_COLUMN {
            return;
        }
        self.moved_in_done_at = None;
        self.worked_on_for = None;
        if column != IN_PROGRESS_COLUMN {
            self.moved_in_progress_at = None;
        }
    }
}

/// Contents of `column.md`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnRecord {
    pub name: String,
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ColumnRecord {
    pub fn new(name: impl Into<String>, position: i64) -> Self {
        Self {
            name: name.into(),
            position,
            limit: None,
            created_at: None,
        }
    }

    pub fn to_metadata(&self, created_at: &DateTime<Utc>) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("position", self.position);
        meta.set_opt("limit", self.limit);
        meta.insert("created_at", format_timestamp(created_at));
        meta
    }
}

/// A tag-like grouping stored in the board frontmatter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardParent {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl BoardParent {
    fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        map.insert("id".into(), self.id.as_str().into());
        map.insert("name".into(), self.name.as_str().into());
        map.insert("color".into(), self.color.as_str().into());
        if let Some(ts) = &self.created_at {
            map.insert("created_at".into(), format_timestamp(ts).into());
        }
        Value::Mapping(map)
    }

    fn from_value(value: &Value) -> Option<Self> {
        if !value.is_mapping() {
            return None;
        }
        let name = value.get("name").and_then(Value::as_str).unwrap_or_default();
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| crate::store::paths::generate_id_from_name(name));
        Some(Self {
            id,
            name: name.to_string(),
            color: value
                .get("color")
                .and_then(Value::as_str)
                .unwrap_or("blue")
                .to_string(),
            created_at: value.get("created_at").and_then(parse_timestamp),
        })
    }
}

/// Contents of `board.md`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<BoardParent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl BoardRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            parents: Vec::new(),
            created_at: None,
        }
    }

    pub fn to_metadata(&self, created_at: &DateTime<Utc>) -> Metadata {
        let mut meta = Metadata::new();
        meta.set_opt("id", self.id.as_deref());
        meta.insert("name", self.name.as_str());
        meta.insert("description", self.description.as_str());
        if !self.parents.is_empty() {
            meta.insert(
                "parents",
                Value::Sequence(self.parents.iter().map(BoardParent::to_value).collect()),
            );
        }
        meta.insert("created_at", format_timestamp(created_at));
        meta
    }

    pub fn from_metadata(meta: &Metadata, fallback_name: &str) -> Self {
        let parents = match meta.get("parents") {
            Some(Value::Sequence(items)) => {
                items.iter().filter_map(BoardParent::from_value).collect()
            }
            _ => Vec::new(),
        };
        Self {
            id: meta.get_string("id"),
            name: meta
                .get_string("name")
                .unwrap_or_else(|| fallback_name.to_string()),
            description: meta.get_string("description").unwrap_or_default(),
            parents,
            created_at: meta.get("created_at").and_then(parse_timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSnapshot {
    /// Directory name under `columns/`.
    pub slug: String,
    #[serde(flatten)]
    pub column: ColumnRecord,
    pub tasks: Vec<TaskRecord>,
}

/// A board as read back from disk: metadata, ordered columns and their tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardSnapshot {
    pub slug: String,
    #[serde(flatten)]
    pub board: BoardRecord,
    pub columns: Vec<ColumnSnapshot>,
}

impl BoardSnapshot {
    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|col| col.tasks.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_use_millisecond_zulu_format() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2025-01-01T00:00:00.000Z");
        assert_eq!(parse_timestamp(&Value::from("2025-01-01T00:00:00.000Z")), Some(ts));
        assert_eq!(parse_timestamp(&Value::from("2025-01-01")), Some(ts));
        assert_eq!(parse_timestamp(&Value::from("yesterday")), None);
    }

    #[test]
    fn task_metadata_keeps_extras_and_drops_title() {
        let mut task = TaskRecord::new("T-1", "Title").with_description("desc");
        task.extra.insert("scheduled_date", "2025-05-05");
        task.extra.insert("title", "stale");
        task.parent_id = Some("P-1".into());
        let meta = task.to_metadata();
        assert_eq!(meta.get_str("id"), Some("T-1"));
        assert_eq!(meta.get_str("parent_id"), Some("P-1"));
        assert_eq!(meta.get_str("scheduled_date"), Some("2025-05-05"));
        assert!(!meta.contains_key("title"));
        assert!(!meta.contains_key("description"));
    }

    #[test]
    fn task_from_document_reads_heading_and_description() {
        let mut meta = Metadata::new();
        meta.insert("id", "T-9");
        meta.insert("created_at", "2025-01-01T00:00:00.000Z");
        meta.insert("custom", "kept");
        let task = TaskRecord::from_document(meta, "# Ship it\n\nsoon", "fallback");
        assert_eq!(task.id, "T-9");
        assert_eq!(task.title, "Ship it");
        assert_eq!(task.description, "soon");
        assert!(task.created_at.is_some());
        assert_eq!(task.extra.get_str("custom"), Some("kept"));
        assert!(!task.extra.contains_key("created_at"));
    }

    #[test]
    fn task_without_id_synthesizes_one_from_title() {
        let task = TaskRecord::from_document(Metadata::new(), "# Fix The Bug", "x");
        assert_eq!(task.id, "fix_the_bug");
    }

    #[test]
    fn unparseable_timestamp_survives_round_trip() {
        let mut meta = Metadata::new();
        meta.insert("id", "T-1");
        meta.insert("created_at", "last tuesday");
        let task = TaskRecord::from_document(meta, "", "t");
        assert_eq!(task.created_at, None);
        assert_eq!(task.to_metadata().get_str("created_at"), Some("last tuesday"));
    }

    #[test]
    fn normalize_for_column_clears_timing_by_column() {
        let now = Utc::now();
        let mut task = TaskRecord::new("T-1", "t");
        task.moved_in_progress_at = Some(now);
        task.moved_in_done_at = Some(now);
        task.worked_on_for = Some("01:00".into());

        let mut done = task.clone();
        done.normalize_for_column("done");
        assert_eq!(done, task);

        let mut doing = task.clone();
        doing.normalize_for_column("in_progress");
        assert_eq!(doing.moved_in_progress_at, Some(now));
        assert_eq!(doing.moved_in_done_at, None);
        assert_eq!(doing.worked_on_for, None);

        let mut todo = task.clone();
        todo.normalize_for_column("todo");
        assert_eq!(todo.moved_in_progress_at, None);
        assert_eq!(todo.moved_in_done_at, None);
    }

    #[test]
    fn set_field_routes_typed_and_extra_keys() {
        let mut task = TaskRecord::new("T-1", "t");
        task.set_field("parent_id", Value::from("P-7")).unwrap();
        task.set_field("time_block_minutes", Value::from(30)).unwrap();
        task.set_field("created_at", Value::from("2025-01-01")).unwrap();
        assert_eq!(task.parent_id.as_deref(), Some("P-7"));
        assert_eq!(task.extra.get_i64("time_block_minutes"), Some(30));
        assert!(task.created_at.is_some());

        task.set_field("time_block_minutes", Value::Null).unwrap();
        assert!(!task.extra.contains_key("time_block_minutes"));
        assert!(task.set_field("id", Value::from("x")).is_err());
        assert!(task.set_field("created_at", Value::from("soon")).is_err());
    }

    #[test]
    fn column_change_stamps_progress_and_duration() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 11, 5, 0).unwrap();
        let mut task = TaskRecord::new("T-1", "t");
        task.record_column_change("todo", "in_progress", start);
        assert_eq!(task.moved_in_progress_at, Some(start));
        task.record_column_change("in-progress", "done", end);
        assert_eq!(task.moved_in_done_at, Some(end));
        assert_eq!(task.worked_on_for.as_deref(), Some("2:05"));

        let mut same = TaskRecord::new("T-2", "t");
        same.record_column_change("done", "done", end);
        assert_eq!(same.moved_in_done_at, None);
        assert_eq!(format_work_duration(end, start), "0:00");
    }

    #[test]
    fn board_record_round_trips_parents() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut board = BoardRecord::new("Roadmap");
        board.description = "Q3".into();
        board.parents.push(BoardParent {
            id: "infra".into(),
            name: "Infra".into(),
            color: "red".into(),
            created_at: Some(ts),
        });
        let meta = board.to_metadata(&ts);
        let back = BoardRecord::from_metadata(&meta, "fallback");
        assert_eq!(back.name, "Roadmap");
        assert_eq!(back.description, "Q3");
        assert_eq!(back.parents, board.parents);
        assert_eq!(back.created_at, Some(ts));
    }
}
