use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::model::{
    BoardRecord, BoardSnapshot, ColumnRecord, ColumnSnapshot, TaskRecord, format_timestamp,
    parse_timestamp,
};
use crate::store::files::{BOARD_FILENAME, FileSystem, dir_name};
use crate::store::frontmatter::{self, extract_title};
use crate::store::paths::{self, COLUMN_FILENAME, TASK_FILENAME};

/// What `cleanup_column` did.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CleanupSummary {
    pub removed: Vec<String>,
    pub kept: usize,
    /// Folders whose `task.md` could not be read; never deleted.
    pub skipped: Vec<PathBuf>,
}

/// Saves and removes boards, columns and tasks under a storage root.
#[derive(Debug, Clone)]
pub struct BoardPersistence {
    fs: FileSystem,
}

impl BoardPersistence {
    pub fn new(fs: FileSystem) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    pub fn board_file_path(&self, root: &Path, board_name: &str) -> PathBuf {
        paths::board_file(root, board_name)
    }

    /// Immediate subdirectories of the root; empty if the root is missing.
    pub fn list_board_directories(&self, root: &Path) -> Result<Vec<PathBuf>> {
        self.fs.list_dirs(root)
    }

    /// Write `task.md` for `task`, renaming its folder when the title slug
    /// changed. Any failure is reported with the task title and column.
    pub fn save_task(
        &self,
        root: &Path,
        board_name: &str,
        column_name: &str,
        task: &TaskRecord,
    ) -> Result<PathBuf> {
        self.write_task(root, board_name, column_name, task)
            .map_err(|source| StoreError::TaskSave {
                title: task.title.clone(),
                column: column_name.to_string(),
                source: Box::new(source),
            })
    }

    fn write_task(
        &self,
        root: &Path,
        board_name: &str,
        column_name: &str,
        task: &TaskRecord,
    ) -> Result<PathBuf> {
        if task.id.trim().is_empty() {
            return Err(StoreError::Validation("task id cannot be empty".into()));
        }
        let column_dir = paths::column_dir(&paths::board_dir(root, board_name), column_name);
        let tasks_dir = paths::tasks_dir(&column_dir);
        self.fs.ensure_dir(&tasks_dir)?;

        let existing = paths::find_task_folder_by_id(&self.fs, &column_dir, &task.id)?;
        let folder_name =
            paths::allocate_folder_name(&self.fs, &column_dir, &task.title, &task.id)?;
        let folder = tasks_dir.join(&folder_name);

        match existing {
            Some(old) if old != folder => {
                // Side files inside the folder travel with it.
                self.fs.rename(&old, &folder)?;
            }
            Some(_) => {}
            None => self.fs.ensure_dir(&folder)?,
        }

        let mut metadata = task.to_metadata();
        if !metadata.contains_key("created_at") {
            metadata.insert("created_at", format_timestamp(&Utc::now()));
        }

        let path = folder.join(TASK_FILENAME);
        frontmatter::write_document(&self.fs, &path, &task.title, &metadata, &task.description)?;
        debug!("saved task {} to {}", task.id, path.display());
        Ok(path)
    }

    /// Read one task by id from a column.
    pub fn load_task(
        &self,
        root: &Path,
        board_name: &str,
        column_name: &str,
        task_id: &str,
    ) -> Result<Option<TaskRecord>> {
        let column_dir = paths::column_dir(&paths::board_dir(root, board_name), column_name);
        let Some(folder) = paths::find_task_folder_by_id(&self.fs, &column_dir, task_id)? else {
            return Ok(None);
        };
        let doc = frontmatter::read_document(&self.fs, &folder.join(TASK_FILENAME))?;
        Ok(Some(TaskRecord::from_document(
            doc.metadata,
            &doc.body,
            &paths::folder_name(&folder),
        )))
    }

    /// Remove the task's folder. `false` if no folder carries `task_id`.
    pub fn delete_task(
        &self,
        root: &Path,
        board_name: &str,
        column_name: &str,
        task_id: &str,
    ) -> Result<bool> {
        let column_dir = paths::column_dir(&paths::board_dir(root, board_name), column_name);
        match paths::find_task_folder_by_id(&self.fs, &column_dir, task_id)? {
            Some(folder) => self.fs.delete(&folder),
            None => Ok(false),
        }
    }

    /// Move a task folder between columns and re-save it in the destination
    /// with timing fields normalized for that column. `false` if the task is
    /// not in the source column.
    pub fn move_task(
        &self,
        root: &Path,
        board_name: &str,
        from_column: &str,
        to_column: &str,
        task: &TaskRecord,
    ) -> Result<bool> {
        let board_dir = paths::board_dir(root, board_name);
        let from_dir = paths::column_dir(&board_dir, from_column);
        let to_dir = paths::column_dir(&board_dir, to_column);

        let Some(old_folder) = paths::find_task_folder_by_id(&self.fs, &from_dir, &task.id)? else {
            return Ok(false);
        };

        let to_tasks = paths::tasks_dir(&to_dir);
        self.fs.ensure_dir(&to_tasks)?;
        let folder_name = paths::allocate_folder_name(&self.fs, &to_dir, &task.title, &task.id)?;
        let new_folder = to_tasks.join(folder_name);
        if old_folder != new_folder {
            self.fs.rename(&old_folder, &new_folder)?;
        }

        let mut moved = task.clone();
        moved.normalize_for_column(&paths::safe_name(to_column));
        self.save_task(root, board_name, to_column, &moved)?;
        info!(
            "moved task {} from {} to {}",
            task.id,
            paths::safe_name(from_column),
            paths::safe_name(to_column)
        );
        Ok(true)
    }

    /// Write `column.md` for `column` (its directory comes from `column.name`).
    pub fn save_column_metadata(
        &self,
        root: &Path,
        board_name: &str,
        column: &ColumnRecord,
    ) -> Result<PathBuf> {
        let column_dir = paths::column_dir(&paths::board_dir(root, board_name), &column.name);
        self.fs.ensure_dir(&column_dir)?;

        let created_at = column.created_at.unwrap_or_else(Utc::now);
        let metadata = column.to_metadata(&created_at);
        let path = column_dir.join(COLUMN_FILENAME);
        frontmatter::write_document(
            &self.fs,
            &path,
            &column.name,
            &metadata,
            "Column metadata and configuration.",
        )?;
        Ok(path)
    }

    /// Delete task folders whose id is not in `live_ids`. Folders without a
    /// readable id are left alone.
    pub fn cleanup_column(
        &self,
        root: &Path,
        board_name: &str,
        column_name: &str,
        live_ids: &HashSet<String>,
    ) -> Result<CleanupSummary> {
        let column_dir = paths::column_dir(&paths::board_dir(root, board_name), column_name);
        let mut summary = CleanupSummary::default();

        for folder in self.fs.list_dirs(&paths::tasks_dir(&column_dir))? {
            match paths::read_task_id(&self.fs, &folder) {
                Ok(Some(id)) if !live_ids.contains(&id) => {
                    self.fs.delete(&folder)?;
                    debug!("removed orphaned task folder {}", folder.display());
                    summary.removed.push(id);
                }
                Ok(Some(_)) => summary.kept += 1,
                Ok(None) => {}
                Err(err) => {
                    warn!("skipping corrupted task folder {}: {err}", folder.display());
                    summary.skipped.push(folder);
                }
            }
        }
        Ok(summary)
    }

    /// Write `board.md`. An existing body below the heading is kept.
    pub fn save_board_metadata(&self, root: &Path, board: &BoardRecord) -> Result<PathBuf> {
        let path = paths::board_file(root, &board.name);
        let (body, existing_created) = if self.fs.file_exists(&path) {
            match frontmatter::read_document(&self.fs, &path) {
                Ok(doc) => {
                    let created = doc.metadata.get("created_at").and_then(parse_timestamp);
                    (doc.body, created)
                }
                Err(err) => {
                    warn!("overwriting unreadable board file {}: {err}", path.display());
                    (String::new(), None)
                }
            }
        } else {
            (String::new(), None)
        };

        let created_at = board
            .created_at
            .or(existing_created)
            .unwrap_or_else(Utc::now);
        let metadata = board.to_metadata(&created_at);
        frontmatter::write_document(&self.fs, &path, &board.name, &metadata, &body)?;
        Ok(path)
    }

    /// Read a board with its columns in display order and their tasks.
    /// `None` if the board has no `board.md`.
    pub fn load_board(&self, root: &Path, board_name: &str) -> Result<Option<BoardSnapshot>> {
        let board_dir = paths::board_dir(root, board_name);
        let board_file = board_dir.join(BOARD_FILENAME);
        if !self.fs.file_exists(&board_file) {
            return Ok(None);
        }
        let slug = dir_name(&board_dir);
        let doc = frontmatter::read_document(&self.fs, &board_file)?;
        let board = BoardRecord::from_metadata(&doc.metadata, &slug);
        let columns = self.load_columns(&board_dir)?;

        Ok(Some(BoardSnapshot {
            slug,
            board,
            columns,
        }))
    }

    fn load_columns(&self, board_dir: &Path) -> Result<Vec<ColumnSnapshot>> {
        let mut loaded = Vec::new();
        for column_dir in self.fs.list_dirs(&paths::columns_dir(board_dir))? {
            let slug = dir_name(&column_dir);
            let (record, explicit_position) = self.load_column_record(&column_dir, &slug);
            let tasks = self.load_tasks(&column_dir, &slug)?;
            loaded.push((explicit_position, ColumnSnapshot {
                slug,
                column: record,
                tasks,
            }));
        }

        // Columns without a stored position take the lowest free slots, in
        // directory order.
        let mut taken: BTreeSet<i64> = loaded.iter().filter_map(|(pos, _)| *pos).collect();
        let mut next = 0;
        for (position, snapshot) in loaded.iter_mut() {
            match position {
                Some(pos) => snapshot.column.position = *pos,
                None => {
                    while taken.contains(&next) {
                        next += 1;
                    }
                    snapshot.column.position = next;
                    taken.insert(next);
                }
            }
        }

        let mut columns: Vec<ColumnSnapshot> = loaded.into_iter().map(|(_, col)| col).collect();
        columns.sort_by(|a, b| {
            a.column
                .position
                .cmp(&b.column.position)
                .then_with(|| a.column.name.cmp(&b.column.name))
        });
        Ok(columns)
    }

    fn load_column_record(&self, column_dir: &Path, slug: &str) -> (ColumnRecord, Option<i64>) {
        let fallback_name = paths::display_name_from_slug(slug);
        let path = column_dir.join(COLUMN_FILENAME);
        if !self.fs.file_exists(&path) {
            return (ColumnRecord::new(fallback_name, 0), None);
        }
        let doc = match frontmatter::read_document(&self.fs, &path) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("ignoring unreadable column file {}: {err}", path.display());
                return (ColumnRecord::new(fallback_name, 0), None);
            }
        };

        let name = doc
            .metadata
            .get_string("name")
            .or_else(|| extract_title(&doc.body))
            .unwrap_or(fallback_name);
        let position = doc.metadata.get_i64("position");
        let mut record = ColumnRecord::new(name, position.unwrap_or(0));
        record.limit = doc
            .metadata
            .get_i64("limit")
            .and_then(|limit| u32::try_from(limit).ok());
        record.created_at = doc.metadata.get("created_at").and_then(parse_timestamp);
        (record, position)
    }

    fn load_tasks(&self, column_dir: &Path, column_slug: &str) -> Result<Vec<TaskRecord>> {
        let mut tasks = Vec::new();
        for folder in self.fs.list_dirs(&paths::tasks_dir(column_dir))? {
            let path = folder.join(TASK_FILENAME);
            if !self.fs.file_exists(&path) {
                continue;
            }
            match frontmatter::read_document(&self.fs, &path) {
                Ok(doc) => {
                    let mut task =
                        TaskRecord::from_document(doc.metadata, &doc.body, &dir_name(&folder));
                    task.normalize_for_column(column_slug);
                    tasks.push(task);
                }
                Err(err) => warn!("skipping unreadable task {}: {err}", path.display()),
            }
        }
        Ok(tasks)
    }

    /// Remove the whole board directory. `false` if it did not exist.
    pub fn delete_board(&self, root: &Path, board_name: &str) -> Result<bool> {
        let board_dir = paths::board_dir(root, board_name);
        let removed = self.fs.delete(&board_dir)?;
        if removed {
            info!("deleted board {}", board_dir.display());
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::paths::{column_dir, tasks_dir};
    use chrono::TimeZone;
    use tempfile::{TempDir, tempdir};

    fn setup() -> (TempDir, BoardPersistence, PathBuf) {
        let dir = tempdir().unwrap();
        let fs = FileSystem::new(dir.path());
        let root = dir.path().join("boards");
        (dir, BoardPersistence::new(fs), root)
    }

    fn task_folders(root: &Path, board: &str, column: &str) -> Vec<String> {
        let col = column_dir(&paths::board_dir(root, board), column);
        FileSystem::new(root)
            .list_dirs(&tasks_dir(&col))
            .unwrap()
            .iter()
            .map(|p| dir_name(p))
            .collect()
    }

    #[test]
    fn save_task_writes_heading_and_ordered_frontmatter() {
        let (_dir, store, root) = setup();
        let mut task = TaskRecord::new("T-1", "Fix Bug").with_description("Steps here");
        task.parent_id = Some("P-1".into());
        task.created_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        task.extra.insert("scheduled_date", "2025-02-02");

        let path = store.save_task(&root, "My Board", "To Do", &task).unwrap();
        assert_eq!(path, root.join("my-board/columns/to-do/tasks/fix-bug/task.md"));
        let raw = std::fs::read_to_string(&path).unwrap();
        let keys: Vec<&str> = raw
            .lines()
            .skip(1)
            .take_while(|line| *line != "---")
            .filter_map(|line| line.split(':').next())
            .collect();
        assert_eq!(keys, vec!["id", "parent_id", "scheduled_date", "created_at"]);
        assert!(raw.ends_with("---\n\n# Fix Bug\n\nSteps here"));

        let doc = frontmatter::read_document(store.fs(), &path).unwrap();
        let back = TaskRecord::from_document(doc.metadata, &doc.body, "x");
        assert_eq!(back, task);
    }

    #[test]
    fn save_task_defaults_created_at() {
        let (_dir, store, root) = setup();
        let path = store
            .save_task(&root, "b", "todo", &TaskRecord::new("T-1", "Task"))
            .unwrap();
        let doc = frontmatter::read_document(store.fs(), &path).unwrap();
        assert!(doc.metadata.get("created_at").and_then(parse_timestamp).is_some());
    }

    #[test]
    fn resave_with_new_title_renames_folder_and_keeps_side_files() {
        let (_dir, store, root) = setup();
        let mut task = TaskRecord::new("T-1", "Old Name");
        let path = store.save_task(&root, "b", "todo", &task).unwrap();
        let side = path.parent().unwrap().join("attachment.txt");
        std::fs::write(&side, "keep me").unwrap();

        task.title = "New Name".into();
        let new_path = store.save_task(&root, "b", "todo", &task).unwrap();
        assert!(new_path.ends_with("tasks/new-name/task.md"));
        assert_eq!(task_folders(&root, "b", "todo"), vec!["new-name"]);
        assert_eq!(
            std::fs::read_to_string(new_path.parent().unwrap().join("attachment.txt")).unwrap(),
            "keep me"
        );
    }

    #[test]
    fn distinct_tasks_with_same_title_get_distinct_folders() {
        let (_dir, store, root) = setup();
        store.save_task(&root, "b", "todo", &TaskRecord::new("T-1", "Same")).unwrap();
        store.save_task(&root, "b", "todo", &TaskRecord::new("T-2", "Same")).unwrap();
        store.save_task(&root, "b", "todo", &TaskRecord::new("T-1", "Same")).unwrap();
        assert_eq!(task_folders(&root, "b", "todo"), vec!["same", "same-2"]);
    }

    #[test]
    fn save_task_failure_names_task_and_column() {
        let (_dir, store, root) = setup();
        // A file where the board directory should be.
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("b"), "not a dir").unwrap();
        let err = store
            .save_task(&root, "b", "todo", &TaskRecord::new("T-1", "Broken"))
            .unwrap_err();
        assert_eq!(err.code(), "task_save_failed");
        assert!(err.to_string().contains("\"Broken\""));
        assert!(err.to_string().contains("\"todo\""));
    }

    #[test]
    fn delete_task_reports_whether_anything_was_removed() {
        let (_dir, store, root) = setup();
        store.save_task(&root, "b", "todo", &TaskRecord::new("T-1", "Gone")).unwrap();
        assert!(store.delete_task(&root, "b", "todo", "T-1").unwrap());
        assert!(!store.delete_task(&root, "b", "todo", "T-1").unwrap());
        assert!(task_folders(&root, "b", "todo").is_empty());
    }

    #[test]
    fn move_task_relocates_and_normalizes_timing() {
        let (_dir, store, root) = setup();
        let now = Utc::now();
        let mut task = TaskRecord::new("T-1", "Ship");
        task.moved_in_progress_at = Some(now);
        task.moved_in_done_at = Some(now);
        task.worked_on_for = Some("02:00".into());
        let old = store.save_task(&root, "b", "done", &task).unwrap();
        std::fs::write(old.parent().unwrap().join("notes.txt"), "n").unwrap();

        assert!(store.move_task(&root, "b", "done", "In Progress", &task).unwrap());
        assert!(task_folders(&root, "b", "done").is_empty());
        assert_eq!(task_folders(&root, "b", "in-progress"), vec!["ship"]);

        let moved = store.load_task(&root, "b", "in-progress", "T-1").unwrap().unwrap();
        assert!(moved.moved_in_progress_at.is_some());
        assert_eq!(moved.moved_in_done_at, None);
        assert_eq!(moved.worked_on_for, None);
        assert!(
            column_dir(&paths::board_dir(&root, "b"), "in-progress")
                .join("tasks/ship/notes.txt")
                .is_file()
        );
    }

    #[test]
    fn move_missing_task_returns_false() {
        let (_dir, store, root) = setup();
        let task = TaskRecord::new("T-404", "Ghost");
        assert!(!store.move_task(&root, "b", "todo", "done", &task).unwrap());
    }

    #[test]
    fn column_metadata_has_position_limit_and_body() {
        let (_dir, store, root) = setup();
        let mut column = ColumnRecord::new("In Progress", 1);
        column.limit = Some(3);
        let path = store.save_column_metadata(&root, "b", &column).unwrap();
        assert_eq!(path, root.join("b/columns/in-progress/column.md"));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("---\nlimit: 3\nposition: 1\ncreated_at: "));
        assert!(raw.ends_with("---\n\n# In Progress\n\nColumn metadata and configuration."));
    }

    #[test]
    fn cleanup_removes_only_orphans_and_spares_corrupt_folders() {
        let (_dir, store, root) = setup();
        for (id, title) in [("T-1", "One"), ("T-2", "Two"), ("T-3", "Three")] {
            store.save_task(&root, "b", "todo", &TaskRecord::new(id, title)).unwrap();
        }
        let col = column_dir(&paths::board_dir(&root, "b"), "todo");
        std::fs::create_dir_all(tasks_dir(&col).join("corrupt")).unwrap();
        std::fs::write(tasks_dir(&col).join("corrupt/task.md"), "---\nid: [oops\n").unwrap();

        let live: HashSet<String> = ["T-1", "T-2"].iter().map(|s| s.to_string()).collect();
        let summary = store.cleanup_column(&root, "b", "todo", &live).unwrap();
        assert_eq!(summary.removed, vec!["T-3"]);
        assert_eq!(summary.kept, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(task_folders(&root, "b", "todo"), vec!["corrupt", "one", "two"]);
    }

    #[test]
    fn list_board_directories_of_missing_root_is_empty() {
        let (_dir, store, root) = setup();
        assert!(store.list_board_directories(&root).unwrap().is_empty());
        store.save_board_metadata(&root, &BoardRecord::new("Alpha")).unwrap();
        assert_eq!(store.list_board_directories(&root).unwrap(), vec![root.join("alpha")]);
    }

    #[test]
    fn load_board_orders_columns_and_fills_positions() {
        let (_dir, store, root) = setup();
        let mut board = BoardRecord::new("Roadmap");
        board.description = "Plans".into();
        store.save_board_metadata(&root, &board).unwrap();
        store.save_column_metadata(&root, "Roadmap", &ColumnRecord::new("Done", 2)).unwrap();
        store.save_column_metadata(&root, "Roadmap", &ColumnRecord::new("To Do", 0)).unwrap();
        // No column.md: gets the lowest free position.
        store
            .save_task(&root, "Roadmap", "in-progress", &TaskRecord::new("T-1", "Work"))
            .unwrap();

        let snapshot = store.load_board(&root, "Roadmap").unwrap().unwrap();
        assert_eq!(snapshot.slug, "roadmap");
        assert_eq!(snapshot.board.name, "Roadmap");
        assert_eq!(snapshot.board.description, "Plans");
        let names: Vec<(&str, i64)> = snapshot
            .columns
            .iter()
            .map(|c| (c.column.name.as_str(), c.column.position))
            .collect();
        assert_eq!(names, vec![("To Do", 0), ("In Progress", 1), ("Done", 2)]);
        assert_eq!(snapshot.task_count(), 1);
    }

    #[test]
    fn load_board_skips_corrupt_tasks() {
        let (_dir, store, root) = setup();
        store.save_board_metadata(&root, &BoardRecord::new("b")).unwrap();
        store.save_task(&root, "b", "todo", &TaskRecord::new("T-1", "Good")).unwrap();
        let col = column_dir(&paths::board_dir(&root, "b"), "todo");
        std::fs::create_dir_all(tasks_dir(&col).join("bad")).unwrap();
        std::fs::write(tasks_dir(&col).join("bad/task.md"), "---\nunterminated").unwrap();

        let snapshot = store.load_board(&root, "b").unwrap().unwrap();
        assert_eq!(snapshot.task_count(), 1);
        assert_eq!(snapshot.columns[0].tasks[0].title, "Good");
    }

    #[test]
    fn missing_board_loads_as_none_and_delete_is_idempotent() {
        let (_dir, store, root) = setup();
        assert!(store.load_board(&root, "nope").unwrap().is_none());
        store.save_board_metadata(&root, &BoardRecord::new("Temp")).unwrap();
        assert!(store.board_file_path(&root, "Temp").is_file());
        assert!(store.delete_board(&root, "Temp").unwrap());
        assert!(!store.delete_board(&root, "Temp").unwrap());
    }

    #[test]
    fn save_board_keeps_created_at_and_body() {
        let (_dir, store, root) = setup();
        let path = store.save_board_metadata(&root, &BoardRecord::new("Keep")).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, format!("{raw}\n\nFree-form notes")).unwrap();
        let first = frontmatter::read_document(store.fs(), &path).unwrap();

        let mut board = BoardRecord::new("Keep");
        board.description = "changed".into();
        store.save_board_metadata(&root, &board).unwrap();
        let second = frontmatter::read_document(store.fs(), &path).unwrap();
        assert_eq!(first.metadata.get("created_at"), second.metadata.get("created_at"));
        assert!(second.body.contains("Free-form notes"));
        assert!(second.body.starts_with("# Keep"));
    }
}
