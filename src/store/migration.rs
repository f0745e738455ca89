use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;

use crate::error::Result;
use crate::model::format_timestamp;
use crate::store::files::{FileSystem, dir_name};
use crate::store::frontmatter::{self, Document, extract_title};
use crate::store::paths::{self, COLUMN_FILENAME, TASK_FILENAME};

/// Outcome of upgrading one board to the folder-per-task layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub board: String,
    pub already_migrated: bool,
    pub migrated_tasks: usize,
    pub relocated_folders: usize,
    pub failures: Vec<String>,
}

/// Moves flat `*.md` task files into `tasks/{slug}/task.md` folders, once per
/// board. The marker file is the only record that a board was upgraded.
#[derive(Debug, Clone)]
pub struct TaskStorageMigration {
    fs: FileSystem,
}

impl TaskStorageMigration {
    pub fn new(fs: FileSystem) -> Self {
        Self { fs }
    }

    pub fn is_migrated(&self, board_dir: &Path) -> bool {
        self.fs.file_exists(&paths::migration_marker(board_dir))
    }

    /// Upgrade every board of a project under the data directory.
    pub fn migrate_project_if_needed(&self, project: &str) -> Result<Vec<MigrationReport>> {
        self.migrate_root_if_needed(&self.fs.project_boards_dir(project))
    }

    /// Upgrade every board directory directly under `root`.
    pub fn migrate_root_if_needed(&self, root: &Path) -> Result<Vec<MigrationReport>> {
        self.fs
            .list_dirs(root)?
            .iter()
            .map(|board_dir| self.migrate_board_if_needed(board_dir))
            .collect()
    }

    /// No-op once the marker exists. Per-task failures are recorded and
    /// skipped; the marker is written regardless so the board is not retried.
    pub fn migrate_board_if_needed(&self, board_dir: &Path) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            board: dir_name(board_dir),
            ..MigrationReport::default()
        };
        let marker = paths::migration_marker(board_dir);
        if self.fs.file_exists(&marker) {
            report.already_migrated = true;
            return Ok(report);
        }

        let columns_dir = paths::columns_dir(board_dir);
        if !self.fs.dir_exists(&columns_dir) {
            return Ok(report);
        }

        for column_dir in self.fs.list_dirs(&columns_dir)? {
            if let Err(err) = self.migrate_column(&column_dir, &mut report) {
                warn!("failed to migrate column {}: {err}", column_dir.display());
                report
                    .failures
                    .push(format!("{}: {err}", column_dir.display()));
            }
        }

        self.fs.write_text(
            &marker,
            &format!("Migrated at {}", format_timestamp(&Utc::now())),
        )?;
        info!(
            "migrated board {}: {} task files, {} folders relocated, {} failures",
            report.board,
            report.migrated_tasks,
            report.relocated_folders,
            report.failures.len()
        );
        Ok(report)
    }

    fn migrate_column(&self, column_dir: &Path, report: &mut MigrationReport) -> Result<()> {
        let tasks_dir = paths::tasks_dir(column_dir);
        self.fs.ensure_dir(&tasks_dir)?;

        let mut legacy = self.fs.list_files(column_dir, Some("*.md"))?;
        legacy.retain(|path| dir_name(path) != COLUMN_FILENAME);
        legacy.extend(self.fs.list_files(&tasks_dir, Some("*.md"))?);

        for file in legacy {
            match self.migrate_legacy_file(column_dir, &file) {
                Ok(target) => {
                    debug!("migrated {} -> {}", file.display(), target.display());
                    report.migrated_tasks += 1;
                }
                Err(err) => {
                    warn!("failed to migrate task file {}: {err}", file.display());
                    report.failures.push(format!("{}: {err}", file.display()));
                }
            }
        }

        for folder in self.fs.list_dirs(column_dir)? {
            if folder == tasks_dir || !self.fs.file_exists(&folder.join(TASK_FILENAME)) {
                continue;
            }
            match self.relocate_folder(column_dir, &folder) {
                Ok(target) => {
                    debug!("relocated {} -> {}", folder.display(), target.display());
                    report.relocated_folders += 1;
                }
                Err(err) => {
                    warn!("failed to relocate task folder {}: {err}", folder.display());
                    report.failures.push(format!("{}: {err}", folder.display()));
                }
            }
        }

        if self.fs.is_empty_dir(&tasks_dir)? {
            self.fs.delete(&tasks_dir)?;
        }
        Ok(())
    }

    fn migrate_legacy_file(&self, column_dir: &Path, file: &Path) -> Result<PathBuf> {
        let doc = frontmatter::read_document(&self.fs, file)?;
        let stem = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = legacy_title(&doc, &stem);
        let stored_id = doc.metadata.get_string("id");
        let id = stored_id
            .clone()
            .unwrap_or_else(|| paths::generate_id_from_name(&title));

        let folder = paths::allocate_folder_name(&self.fs, column_dir, &title, &id)?;
        let target = paths::tasks_dir(column_dir).join(folder).join(TASK_FILENAME);
        if stored_id.is_some() {
            self.fs.rename(file, &target)?;
        } else {
            self.write_with_id(doc, &id, &target)?;
            self.fs.delete(file)?;
        }
        Ok(target)
    }

    /// Rewrite a task file with `id` added to its frontmatter. Other keys and
    /// the body are kept as they were.
    fn write_with_id(&self, doc: Document, id: &str, target: &Path) -> Result<()> {
        let mut metadata = doc.metadata;
        metadata.insert("id", id);
        let raw = frontmatter::serialize(&metadata, &doc.body)?;
        self.fs.write_text(target, &raw)
    }

    /// Move a `{column}/{folder}/task.md` folder into `tasks/`, picking a fresh
    /// name only if `tasks/{folder}` is already taken. A task file without an
    /// `id` gets the derived one written into its frontmatter.
    fn relocate_folder(&self, column_dir: &Path, folder: &Path) -> Result<PathBuf> {
        let name = dir_name(folder);
        let tasks_dir = paths::tasks_dir(column_dir);
        let mut target = tasks_dir.join(&name);
        if self.fs.exists(&target) {
            let id = paths::read_task_id(&self.fs, folder)?
                .unwrap_or_else(|| paths::generate_id_from_name(&name));
            target = tasks_dir.join(paths::allocate_folder_name(&self.fs, column_dir, &name, &id)?);
        }
        self.fs.rename(folder, &target)?;

        let task_file = target.join(TASK_FILENAME);
        let doc = frontmatter::read_document(&self.fs, &task_file)?;
        if doc.metadata.get_string("id").is_none() {
            let id = paths::generate_id_from_name(&legacy_title(&doc, &dir_name(&target)));
            debug!("stamping id {id} on {}", task_file.display());
            self.write_with_id(doc, &id, &task_file)?;
        }
        Ok(target)
    }
}

/// Title a legacy task would load with: frontmatter `title`, then the first
/// heading, then `fallback`.
fn legacy_title(doc: &Document, fallback: &str) -> String {
    doc.metadata
        .get_string("title")
        .or_else(|| extract_title(&doc.body))
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, String> {
        fn walk(base: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, String>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                let rel = path.strip_prefix(base).unwrap().to_path_buf();
                if path.is_dir() {
                    out.insert(rel, "<dir>".into());
                    walk(base, &path, out);
                } else {
                    out.insert(rel, std::fs::read_to_string(&path).unwrap());
                }
            }
        }
        let mut out = BTreeMap::new();
        walk(dir, dir, &mut out);
        out
    }

    fn legacy_board(root: &Path) -> (FileSystem, PathBuf) {
        let fs = FileSystem::new(root);
        let board = root.join("board-a");
        fs.write_text(&board.join("board.md"), "---\nname: Board A\n---\n\n# Board A")
            .unwrap();
        let todo = board.join("columns/todo");
        fs.write_text(&todo.join("column.md"), "---\nposition: 0\n---\n\n# Todo")
            .unwrap();
        fs.write_text(&todo.join("fix-bug.md"), "---\nid: T-1\n---\n\n# Fix Bug\n\nbody")
            .unwrap();
        fs.write_text(&todo.join("tasks/write-docs.md"), "---\nid: T-2\n---\n\n# Write Docs")
            .unwrap();
        fs.write_text(&todo.join("No Id.md"), "---\npriority: high\n---\n\n# No Id Here")
            .unwrap();
        fs.write_text(&board.join("columns/done/old-folder/task.md"), "---\nid: T-3\n---\n\n# Old")
            .unwrap();
        fs.write_text(&board.join("columns/done/old-folder/notes.txt"), "n")
            .unwrap();
        (fs, board)
    }

    #[test]
    fn migrates_flat_files_and_relocates_folders() {
        let dir = tempdir().unwrap();
        let (fs, board) = legacy_board(dir.path());
        let migration = TaskStorageMigration::new(fs.clone());

        let report = migration.migrate_board_if_needed(&board).unwrap();
        assert!(!report.already_migrated);
        assert_eq!(report.migrated_tasks, 3);
        assert_eq!(report.relocated_folders, 1);
        assert!(report.failures.is_empty());

        let todo_tasks = board.join("columns/todo/tasks");
        assert!(todo_tasks.join("fix-bug/task.md").is_file());
        assert!(todo_tasks.join("write-docs/task.md").is_file());
        assert!(!board.join("columns/todo/fix-bug.md").exists());
        assert!(board.join("columns/todo/column.md").is_file());

        // A missing id is derived from the title and written back.
        let stored_id = paths::read_task_id(&fs, &todo_tasks.join("no-id-here")).unwrap();
        assert_eq!(stored_id.as_deref(), Some("no_id_here"));
        let doc = frontmatter::read_document(&fs, &todo_tasks.join("no-id-here/task.md")).unwrap();
        assert_eq!(doc.metadata.get_str("priority"), Some("high"));
        assert_eq!(doc.body, "# No Id Here");
        assert!(!board.join("columns/todo/No Id.md").exists());

        assert!(board.join("columns/done/tasks/old-folder/notes.txt").is_file());
        assert!(!board.join("columns/done/old-folder").exists());

        let marker = fs.read_text(&board.join(paths::MIGRATION_MARKER)).unwrap();
        assert!(marker.starts_with("Migrated at "));
    }

    #[test]
    fn derived_ids_are_stable_after_migration() {
        use crate::store::board::BoardPersistence;

        let dir = tempdir().unwrap();
        let (fs, board) = legacy_board(dir.path());
        fs.write_text(&board.join("columns/done/loose/task.md"), "# Loose Ends\n\nnotes")
            .unwrap();
        TaskStorageMigration::new(fs.clone())
            .migrate_board_if_needed(&board)
            .unwrap();

        let store = BoardPersistence::new(fs.clone());
        let snapshot = store.load_board(dir.path(), "board-a").unwrap().unwrap();
        let todo = snapshot.columns.iter().find(|c| c.slug == "todo").unwrap();
        let task = todo.tasks.iter().find(|t| t.title == "No Id Here").unwrap();
        assert_eq!(task.id, "no_id_here");

        store.save_task(dir.path(), "board-a", "todo", task).unwrap();
        let folders = fs.list_dirs(&board.join("columns/todo/tasks")).unwrap();
        assert_eq!(folders.len(), 3);
        assert!(store.delete_task(dir.path(), "board-a", "todo", "no_id_here").unwrap());

        let loose = paths::read_task_id(&fs, &board.join("columns/done/tasks/loose")).unwrap();
        assert_eq!(loose.as_deref(), Some("loose_ends"));
        let doc = frontmatter::read_document(&fs, &board.join("columns/done/tasks/loose/task.md"))
            .unwrap();
        assert_eq!(doc.body, "# Loose Ends\n\nnotes");
    }

    #[test]
    fn second_run_is_a_no_op() {
        let dir = tempdir().unwrap();
        let (fs, board) = legacy_board(dir.path());
        let migration = TaskStorageMigration::new(fs);

        migration.migrate_board_if_needed(&board).unwrap();
        let after_first = snapshot(&board);
        let second = migration.migrate_board_if_needed(&board).unwrap();
        assert!(second.already_migrated);
        assert_eq!(second.migrated_tasks, 0);
        assert_eq!(snapshot(&board), after_first);
    }

    #[test]
    fn corrupt_file_is_skipped_and_marker_still_written() {
        let dir = tempdir().unwrap();
        let fs = FileSystem::new(dir.path());
        let board = dir.path().join("b");
        fs.write_text(&board.join("columns/todo/broken.md"), "---\nid: [\n")
            .unwrap();
        fs.write_text(&board.join("columns/todo/ok.md"), "---\nid: T-1\n---\n\n# Ok")
            .unwrap();

        let migration = TaskStorageMigration::new(fs);
        let report = migration.migrate_board_if_needed(&board).unwrap();
        assert_eq!(report.migrated_tasks, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(board.join("columns/todo/broken.md").is_file());
        assert!(migration.is_migrated(&board));
    }

    #[test]
    fn empty_tasks_dir_is_removed() {
        let dir = tempdir().unwrap();
        let fs = FileSystem::new(dir.path());
        let board = dir.path().join("b");
        fs.write_text(&board.join("columns/empty/column.md"), "---\nposition: 0\n---\n")
            .unwrap();

        TaskStorageMigration::new(fs)
            .migrate_board_if_needed(&board)
            .unwrap();
        assert!(!board.join("columns/empty/tasks").exists());
        assert!(board.join(paths::MIGRATION_MARKER).is_file());
    }

    #[test]
    fn board_without_columns_is_left_unmarked() {
        let dir = tempdir().unwrap();
        let fs = FileSystem::new(dir.path());
        let board = dir.path().join("b");
        fs.ensure_dir(&board).unwrap();
        let migration = TaskStorageMigration::new(fs);
        let report = migration.migrate_board_if_needed(&board).unwrap();
        assert!(!report.already_migrated);
        assert!(!migration.is_migrated(&board));
    }

    #[test]
    fn relocation_avoids_existing_folder() {
        let dir = tempdir().unwrap();
        let fs = FileSystem::new(dir.path());
        let column = dir.path().join("b/columns/todo");
        fs.write_text(&column.join("tasks/task/task.md"), "---\nid: A\n---\n\n# Task")
            .unwrap();
        fs.write_text(&column.join("task/task.md"), "---\nid: B\n---\n\n# Task")
            .unwrap();

        let report = TaskStorageMigration::new(fs.clone())
            .migrate_board_if_needed(&dir.path().join("b"))
            .unwrap();
        assert_eq!(report.relocated_folders, 1);
        assert_eq!(
            paths::read_task_id(&fs, &column.join("tasks/task-2")).unwrap(),
            Some("B".into())
        );
    }

    #[test]
    fn root_and_project_migrations_cover_every_board() {
        let dir = tempdir().unwrap();
        let fs = FileSystem::new(dir.path());
        let root = dir.path().join("boards");
        fs.write_text(&root.join("one/columns/todo/a.md"), "---\nid: A\n---\n\n# A")
            .unwrap();
        fs.write_text(&root.join("two/columns/todo/b.md"), "---\nid: B\n---\n\n# B")
            .unwrap();
        let migration = TaskStorageMigration::new(fs.clone());
        let reports = migration.migrate_root_if_needed(&root).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.migrated_tasks == 1));

        let project_board = fs.project_boards_dir("Side").join("three");
        fs.write_text(&project_board.join("columns/todo/c.md"), "---\nid: C\n---\n\n# C")
            .unwrap();
        let reports = migration.migrate_project_if_needed("Side").unwrap();
        assert_eq!(reports.len(), 1);
        assert!(project_board.join("columns/todo/tasks/c/task.md").is_file());
    }
}
