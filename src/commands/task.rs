use chrono::Utc;
use colored::Colorize;
use serde_yaml::Value;
use uuid::Uuid;

use crate::commands::Workspace;
use crate::error::{Result, StoreError};
use crate::model::TaskRecord;
use crate::output::{self, Format};
use crate::store::paths;

/// Optional fields for `task save`.
#[derive(Debug, Default)]
pub struct TaskFields {
    pub id: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    /// `key=value` pairs; values are read as YAML scalars.
    pub set: Vec<String>,
}

fn new_task_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("task-{}", &raw[..8])
}

/// Split `key=value`, reading the value as YAML so numbers and booleans keep
/// their type. An empty value clears the field.
fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(StoreError::Validation(format!(
            "expected key=value, got '{raw}'"
        )));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(StoreError::Validation(format!("missing key in '{raw}'")));
    }
    let value = value.trim();
    let value = if value.is_empty() {
        Value::Null
    } else {
        match serde_yaml::from_str::<Value>(value) {
            Ok(parsed @ (Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Null)) => {
                parsed
            }
            _ => Value::String(value.to_string()),
        }
    };
    Ok((key.to_string(), value))
}

pub fn save(
    ws: &mut Workspace,
    board: &str,
    column: &str,
    title: &str,
    fields: TaskFields,
    format: Format,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(StoreError::Validation("task title cannot be empty".into()));
    }
    let root = ws.prepare_board(board)?;
    let mut task = match fields.id {
        Some(id) => ws
            .store
            .load_task(&root, board, column, &id)?
            .unwrap_or_else(|| TaskRecord::new(id, title)),
        None => TaskRecord::new(new_task_id(), title),
    };
    task.title = title.to_string();
    if let Some(description) = fields.description {
        task.description = description;
    }
    if let Some(parent_id) = fields.parent_id {
        task.parent_id = Some(parent_id).filter(|id| !id.trim().is_empty());
    }
    for raw in &fields.set {
        let (key, value) = parse_assignment(raw)?;
        task.set_field(&key, value)?;
    }

    let path = ws.store.save_task(&root, board, column, &task)?;
    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({
                "column": paths::safe_name(column),
                "path": path,
                "task": task,
            })
        ),
        Format::Pretty => {
            output::print_task(&task, Format::Pretty)?;
            println!("  {} {}", "file:".dimmed(), path.display());
        }
        Format::Minimal => println!("{}", task.id),
    }
    Ok(())
}

pub fn delete(
    ws: &mut Workspace,
    board: &str,
    column: &str,
    id: &str,
    format: Format,
) -> Result<()> {
    let root = ws.prepare_board(board)?;
    let deleted = ws.store.delete_task(&root, board, column, id)?;
    match format {
        Format::Json => println!("{}", serde_json::json!({ "id": id, "deleted": deleted })),
        Format::Pretty if deleted => println!("Deleted task {}", id.cyan()),
        Format::Pretty => println!("{}", format!("No task {id} in {column}.").dimmed()),
        Format::Minimal => println!("{deleted}"),
    }
    Ok(())
}

/// Move a task between columns, stamping progress timestamps on the way.
pub fn move_task(
    ws: &mut Workspace,
    board: &str,
    from: &str,
    to: &str,
    id: &str,
    format: Format,
) -> Result<()> {
    let root = ws.prepare_board(board)?;
    let moved = match ws.store.load_task(&root, board, from, id)? {
        Some(mut task) => {
            task.record_column_change(&paths::safe_name(from), &paths::safe_name(to), Utc::now());
            let moved = ws.store.move_task(&root, board, from, to, &task)?;
            moved.then_some(task)
        }
        None => None,
    };

    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({
                "id": id,
                "moved": moved.is_some(),
                "to": paths::safe_name(to),
                "task": moved,
            })
        ),
        Format::Pretty => match &moved {
            Some(task) => println!(
                "Moved {} to {}",
                format!("[{}]", task.id).cyan().bold(),
                paths::safe_name(to).green()
            ),
            None => println!("{}", format!("No task {id} in {from}.").dimmed()),
        },
        Format::Minimal => println!("{}", moved.is_some()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_keep_scalar_types() {
        assert_eq!(
            parse_assignment("time_block_minutes=30").unwrap(),
            ("time_block_minutes".to_string(), Value::from(30))
        );
        assert_eq!(
            parse_assignment("task_type = meeting").unwrap(),
            ("task_type".to_string(), Value::from("meeting"))
        );
        assert_eq!(
            parse_assignment("scheduled_time=09:30").unwrap().1,
            Value::from("09:30")
        );
        assert_eq!(parse_assignment("recurrence=").unwrap().1, Value::Null);
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn generated_ids_are_short_and_unique() {
        let a = new_task_id();
        let b = new_task_id();
        assert!(a.starts_with("task-"));
        assert_eq!(a.len(), 13);
        assert_ne!(a, b);
    }
}
