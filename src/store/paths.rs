//! Directory layout of a storage root and collision-free task folder naming.
//!
//! ```text
//! {root}/{board}/board.md
//! {root}/{board}/.migrated-task-storage
//! {root}/{board}/columns/{column}/column.md
//! {root}/{board}/columns/{column}/tasks/{task[-n]}/task.md
//! ```

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::Result;
use crate::store::files::{BOARD_FILENAME, FileSystem, dir_name};
use crate::store::frontmatter;

pub const COLUMNS_DIR: &str = "columns";
pub const TASKS_DIR: &str = "tasks";
pub const TASK_FILENAME: &str = "task.md";
pub const COLUMN_FILENAME: &str = "column.md";
pub const MIGRATION_MARKER: &str = ".migrated-task-storage";

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_FOLDER_RETRIES: usize = 100;
pub const UNNAMED: &str = "unnamed";

/// Filesystem-safe slug: lower-case ASCII letters, digits and single hyphens,
/// at most [`MAX_NAME_LEN`] characters, never empty.
pub fn safe_name(text: &str) -> String {
    let lowered = text.replace(['/', '\\'], "-").to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    let hyphenated = kept.split_whitespace().collect::<Vec<_>>().join("-");

    let mut slug = String::with_capacity(hyphenated.len());
    for c in hyphenated.chars() {
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    let mut slug = slug.trim_matches('-').to_string();

    if slug.len() > MAX_NAME_LEN {
        slug.truncate(MAX_NAME_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }

    if slug.is_empty() {
        UNNAMED.to_string()
    } else {
        slug
    }
}

/// Identifier synthesized from a name when a file carries none:
/// `"Fix The Bug"` -> `"fix_the_bug"`.
pub fn generate_id_from_name(name: &str) -> String {
    let kept: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    let id = kept.split_whitespace().collect::<Vec<_>>().join("_");
    if id.is_empty() { UNNAMED.to_string() } else { id }
}

/// `in-progress` -> `In Progress`.
pub fn display_name_from_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn board_dir(root: &Path, board_name: &str) -> PathBuf {
    root.join(safe_name(board_name))
}

pub fn board_file(root: &Path, board_name: &str) -> PathBuf {
    board_dir(root, board_name).join(BOARD_FILENAME)
}

pub fn columns_dir(board_dir: &Path) -> PathBuf {
    board_dir.join(COLUMNS_DIR)
}

pub fn column_dir(board_dir: &Path, column_name: &str) -> PathBuf {
    columns_dir(board_dir).join(safe_name(column_name))
}

pub fn tasks_dir(column_dir: &Path) -> PathBuf {
    column_dir.join(TASKS_DIR)
}

pub fn migration_marker(board_dir: &Path) -> PathBuf {
    board_dir.join(MIGRATION_MARKER)
}

/// The `id` stored in `{folder}/task.md`, `None` if there is no `task.md` or
/// it has no id. Corrupt files are errors.
pub fn read_task_id(fs: &FileSystem, folder: &Path) -> Result<Option<String>> {
    let task_file = folder.join(TASK_FILENAME);
    if !fs.file_exists(&task_file) {
        return Ok(None);
    }
    let doc = frontmatter::read_document(fs, &task_file)?;
    Ok(doc.metadata.get_string("id"))
}

/// Folder under `{column_dir}/tasks/` whose `task.md` carries `task_id`.
///
/// Linear scan in name order with no index. Unreadable folders are skipped.
/// If several folders claim the same id the first one in name order wins.
pub fn find_task_folder_by_id(
    fs: &FileSystem,
    column_dir: &Path,
    task_id: &str,
) -> Result<Option<PathBuf>> {
    let mut found: Option<PathBuf> = None;
    for folder in fs.list_dirs(&tasks_dir(column_dir))? {
        match read_task_id(fs, &folder) {
            Ok(Some(id)) if id == task_id => {
                if let Some(ref first) = found {
                    warn!(
                        "task {task_id} appears in both {} and {}; using the first",
                        first.display(),
                        folder.display()
                    );
                } else {
                    found = Some(folder);
                }
            }
            Ok(_) => {}
            Err(err) => debug!("skipping unreadable task folder {}: {err}", folder.display()),
        }
    }
    Ok(found)
}

/// Pick the folder name `task_id` should live in under `{column_dir}/tasks/`.
pub fn allocate_folder_name(
    fs: &FileSystem,
    column_dir: &Path,
    title: &str,
    task_id: &str,
) -> Result<String> {
    allocate_folder_name_with_retries(fs, column_dir, title, task_id, MAX_FOLDER_RETRIES)
}

/// Try `{slug}`, then `{slug}-2` ..= `{slug}-{max_retries}`, taking the first
/// name that is free or already holds this task. Falls back to
/// `{slug}-{task id}`.
pub fn allocate_folder_name_with_retries(
    fs: &FileSystem,
    column_dir: &Path,
    title: &str,
    task_id: &str,
    max_retries: usize,
) -> Result<String> {
    let base = safe_name(title);
    let tasks = tasks_dir(column_dir);

    let candidates = std::iter::once(base.clone())
        .chain((2..=max_retries).map(|n| format!("{base}-{n}")));
    for candidate in candidates {
        let path = tasks.join(&candidate);
        if !fs.exists(&path) {
            return Ok(candidate);
        }
        // A corrupt occupant counts as a collision.
        if let Ok(Some(id)) = read_task_id(fs, &path)
            && id == task_id
        {
            return Ok(candidate);
        }
    }

    let suffix = task_id.to_lowercase().replace(['/', '\\'], "-");
    Ok(format!("{base}-{suffix}"))
}

/// Name of the folder containing `path`.
pub fn folder_name(path: &Path) -> String {
    dir_name(path)
}
