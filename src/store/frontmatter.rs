//! `---`-delimited YAML metadata followed by a markdown body.
//!
//! Keys are written in a fixed order regardless of how the map was built, so
//! two writers holding the same logical metadata produce the same bytes:
//! priority fields, then scheduling fields, then everything else
//! alphabetically, then timestamps. Null values are never written.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::error::{Result, StoreError};
use crate::store::files::FileSystem;

pub const DELIMITER: &str = "---";

const PRIORITY_FIELDS: [&str; 4] = ["id", "title", "parent_id", "project_id"];

const SCHEDULING_FIELDS: [&str; 7] = [
    "scheduled_date",
    "scheduled_time",
    "time_block_minutes",
    "task_type",
    "calendar_event_id",
    "recurrence",
    "meeting_data",
];

const TIMESTAMP_FIELDS: [&str; 4] = [
    "moved_in_progress_at",
    "moved_in_done_at",
    "worked_on_for",
    "created_at",
];

fn is_reserved(key: &str) -> bool {
    PRIORITY_FIELDS.contains(&key)
        || SCHEDULING_FIELDS.contains(&key)
        || TIMESTAMP_FIELDS.contains(&key)
}

/// Frontmatter key/value pairs. Storage order is irrelevant; see
/// [`serialize`] for the order on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Scalar value rendered as a string. Lets `id: 42` compare equal to `"42"`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert when `value` is present, otherwise drop any existing entry.
    pub fn set_opt<V: Into<Value>>(&mut self, key: &str, value: Option<V>) {
        match value {
            Some(value) => self.insert(key, value),
            None => {
                self.0.remove(key);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.values().filter(|value| !value.is_null()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(_, value)| !value.is_null())
    }

    pub fn extend(&mut self, other: Metadata) {
        self.0.extend(other.0);
    }

    /// Keys in the order they are written to disk.
    pub fn ordered_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::with_capacity(self.0.len());
        let present = |key: &&str| self.contains_key(key);

        keys.extend(PRIORITY_FIELDS.iter().copied().filter(present));
        keys.extend(SCHEDULING_FIELDS.iter().copied().filter(present));
        keys.extend(
            self.iter()
                .map(|(key, _)| key.as_str())
                .filter(|key| !is_reserved(key)),
        );
        keys.extend(TIMESTAMP_FIELDS.iter().copied().filter(present));
        keys
    }

    fn to_mapping(&self) -> Mapping {
        let mut mapping = Mapping::new();
        for key in self.ordered_keys() {
            if let Some(value) = self.get(key) {
                mapping.insert(Value::String(key.to_string()), value.clone());
            }
        }
        mapping
    }
}

impl FromIterator<(String, Value)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub metadata: Metadata,
    pub body: String,
}

/// Split raw text into metadata and body. Text without a leading `---` line
/// is all body. Only unindented `---` lines delimit the block, so block
/// scalars may contain them. `path` is only used for error reporting.
pub fn parse(path: &Path, raw: &str) -> Result<Document> {
    let mut lines = raw.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(Document::default());
    };
    if first.trim_end() != DELIMITER {
        return Ok(Document {
            metadata: Metadata::new(),
            body: raw.to_string(),
        });
    }

    let mut yaml = String::new();
    let mut offset = first.len();
    let mut closed = false;
    for line in lines.by_ref() {
        offset += line.len();
        if line.trim_end() == DELIMITER {
            closed = true;
            break;
        }
        yaml.push_str(line);
    }
    if !closed {
        return Err(StoreError::parse(
            path,
            "frontmatter block is missing its closing '---'",
        ));
    }

    let metadata = parse_mapping(path, &yaml)?;
    let rest = &raw[offset..];
    let body = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    Ok(Document {
        metadata,
        body: body.to_string(),
    })
}

fn parse_mapping(path: &Path, yaml: &str) -> Result<Metadata> {
    if yaml.trim().is_empty() {
        return Ok(Metadata::new());
    }
    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|err| StoreError::parse(path, format!("invalid YAML frontmatter: {err}")))?;

    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(Metadata::new()),
        _ => {
            return Err(StoreError::parse(
                path,
                "frontmatter is not a key/value mapping",
            ));
        }
    };

    let mut metadata = Metadata::new();
    for (key, value) in mapping {
        let key = match key {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(StoreError::parse(
                    path,
                    format!("unsupported frontmatter key: {other:?}"),
                ));
            }
        };
        if !value.is_null() {
            metadata.insert(key, value);
        }
    }
    Ok(metadata)
}

/// Render metadata and body. When the metadata carries a `title`, the body's
/// leading heading is set to it.
pub fn serialize(metadata: &Metadata, body: &str) -> Result<String> {
    match metadata.get_str("title") {
        Some(title) => {
            let title = title.to_string();
            serialize_with_title(&title, metadata, body)
        }
        None => render(metadata, body),
    }
}

/// Render with an explicit heading title, whether or not `title` is a
/// metadata key.
pub fn serialize_with_title(title: &str, metadata: &Metadata, body: &str) -> Result<String> {
    render(metadata, &ensure_title_header(body, title))
}

fn render(metadata: &Metadata, body: &str) -> Result<String> {
    let mapping = metadata.to_mapping();
    let yaml = if mapping.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(&Value::Mapping(mapping))?
    };
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n\n{body}"))
}

/// Make sure the body opens with `# {title}`. An existing leading heading is
/// replaced in place; otherwise one is prepended with a blank line after it.
pub fn ensure_title_header(body: &str, title: &str) -> String {
    let heading = format!("# {title}");
    if body.trim().is_empty() {
        return heading;
    }

    let mut lines: Vec<&str> = body.split('\n').collect();
    if let Some(idx) = lines.iter().position(|line| !line.trim().is_empty())
        && is_heading(lines[idx])
    {
        lines[idx] = &heading;
        return lines.join("\n");
    }

    format!("{heading}\n\n{body}")
}

/// Text of the first `# ` heading in the body.
pub fn extract_title(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find(|line| is_heading(line))
        .map(|line| line[2..].trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Body without its leading heading and the blank lines right after it.
pub fn strip_title_header(body: &str) -> String {
    let lines: Vec<&str> = body.split('\n').collect();
    let Some(idx) = lines.iter().position(|line| !line.trim().is_empty()) else {
        return String::new();
    };
    if !is_heading(lines[idx]) {
        return body.to_string();
    }
    let rest = lines[idx + 1..]
        .iter()
        .skip_while(|line| line.trim().is_empty())
        .copied()
        .collect::<Vec<_>>();
    rest.join("\n")
}

fn is_heading(line: &str) -> bool {
    line.trim_start().starts_with("# ")
}

/// Read and parse a file; parse failures become `StoreError::Parse` naming it.
pub fn read_document(fs: &FileSystem, path: &Path) -> Result<Document> {
    let raw = fs.read_text(path)?;
    parse(path, &raw)
}

pub fn write_document(
    fs: &FileSystem,
    path: &Path,
    title: &str,
    metadata: &Metadata,
    body: &str,
) -> Result<()> {
    let raw = serialize_with_title(title, metadata, body)?;
    fs.write_text(path, &raw)
}
