use std::fs;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use log::{debug, warn};
use regex::Regex;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{IoContext, Result, StoreError};

pub const DATA_DIR_NAME: &str = "mkanban";
pub const BOARD_FILENAME: &str = "board.md";
pub const PROJECT_FILENAME: &str = "project.md";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteType {
    General,
    Meetings,
    Daily,
}

impl NoteType {
    pub const ALL: [NoteType; 3] = [Self::General, Self::Meetings, Self::Daily];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Meetings => "meetings",
            Self::Daily => "daily",
        }
    }
}

/// Outcome of a best-effort recursive copy. Failures on individual entries are
/// collected in `errors`; the copy itself never stops early.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub succeeded: bool,
    pub copied_count: usize,
    pub errors: Vec<String>,
}

/// Thin layer over `std::fs` plus the on-disk naming scheme for the data
/// directory. Mutating calls create missing parent directories; I/O failures
/// carry the path that was being touched.
#[derive(Debug, Clone)]
pub struct FileSystem {
    base_dir: PathBuf,
    data_dir_override: Option<PathBuf>,
}

impl FileSystem {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            data_dir_override: None,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create the data directory if it is missing.
    pub fn initialize(&self) -> Result<()> {
        self.ensure_dir(&self.data_dir())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir_override
            .clone()
            .unwrap_or_else(|| self.base_dir.join(DATA_DIR_NAME))
    }

    pub fn set_data_dir(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(StoreError::Validation(
                "data directory path cannot be empty".into(),
            ));
        }
        self.data_dir_override = Some(path);
        Ok(())
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir().join("projects")
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.projects_dir().join(crate::store::paths::safe_name(project))
    }

    pub fn project_boards_dir(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("boards")
    }

    pub fn project_notes_dir(&self, project: &str, note_type: Option<NoteType>) -> PathBuf {
        let notes = self.project_dir(project).join("notes");
        match note_type {
            Some(kind) => notes.join(kind.dir_name()),
            None => notes,
        }
    }

    pub fn project_time_dir(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("time").join("logs")
    }

    pub fn global_dir(&self) -> PathBuf {
        self.data_dir().join("global")
    }

    pub fn goals_dir(&self) -> PathBuf {
        self.global_dir().join("goals")
    }

    pub fn global_notes_dir(&self, note_type: Option<NoteType>) -> PathBuf {
        let notes = self.global_dir().join("notes");
        match note_type {
            Some(kind) => notes.join(kind.dir_name()),
            None => notes,
        }
    }

    pub fn agenda_dir(&self) -> PathBuf {
        self.data_dir().join("agenda")
    }

    pub fn agenda_day_dir(&self, year: u32, month: u32, day: u32) -> PathBuf {
        self.agenda_dir()
            .join(year.to_string())
            .join(format!("{month:02}"))
            .join(format!("{day:02}"))
    }

    /// `YYYY-MM-DD` -> `agenda/YYYY/MM/DD`.
    pub fn agenda_day_dir_from_date(&self, date: &str) -> Result<PathBuf> {
        let parsed = chrono::NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|err| StoreError::Validation(format!("invalid agenda date '{date}': {err}")))?;
        Ok(self.agenda_day_dir(parsed.year() as u32, parsed.month(), parsed.day()))
    }

    pub fn create_project_structure(&self, project: &str) -> Result<()> {
        self.ensure_dir(&self.project_boards_dir(project))?;
        for kind in NoteType::ALL {
            self.ensure_dir(&self.project_notes_dir(project, Some(kind)))?;
        }
        self.ensure_dir(&self.project_time_dir(project))
    }

    /// Project slugs whose directory holds a `project.md`.
    pub fn list_projects(&self) -> Result<Vec<String>> {
        let mut projects = Vec::new();
        for dir in self.list_dirs(&self.projects_dir())? {
            if self.file_exists(&dir.join(PROJECT_FILENAME)) {
                projects.push(dir_name(&dir));
            }
        }
        Ok(projects)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    pub fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    pub fn ensure_dir(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(path).at(path)
    }

    pub fn read_text(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        fs::read_to_string(path).at(path)
    }

    pub fn write_text(&self, path: &Path, contents: &str) -> Result<()> {
        self.ensure_parent(path)?;
        fs::write(path, contents).at(path)
    }

    /// Remove a file or a whole directory tree. Returns `false` when there was
    /// nothing to remove.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(StoreError::io(path, err)),
        };
        if meta.is_dir() {
            fs::remove_dir_all(path).at(path)?;
        } else {
            fs::remove_file(path).at(path)?;
        }
        Ok(true)
    }

    /// Move a file or directory. Returns `false` if `from` does not exist.
    pub fn rename(&self, from: &Path, to: &Path) -> Result<bool> {
        if !from.exists() {
            return Ok(false);
        }
        self.ensure_parent(to)?;
        fs::rename(from, to).at(from)?;
        debug!("renamed {} -> {}", from.display(), to.display());
        Ok(true)
    }

    /// Regular files directly inside `dir`, sorted by name. Dot-files are
    /// skipped; `pattern` is a glob supporting `*` and `?`.
    pub fn list_files(&self, dir: &Path, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let matcher = pattern.map(glob_to_regex).transpose()?;

        let mut files = Vec::new();
        for entry in fs::read_dir(dir).at(dir)? {
            let entry = entry.at(dir)?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Some(ref re) = matcher
                && !re.is_match(&name)
            {
                continue;
            }
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Immediate subdirectories of `dir`, sorted by name.
    pub fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in fs::read_dir(dir).at(dir)? {
            let entry = entry.at(dir)?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// True when `dir` exists and holds no entries at all, hidden ones included.
    pub fn is_empty_dir(&self, dir: &Path) -> Result<bool> {
        if !dir.is_dir() {
            return Ok(false);
        }
        Ok(fs::read_dir(dir).at(dir)?.next().is_none())
    }

    pub fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        if !from.is_file() {
            return Err(StoreError::NotFound(from.to_path_buf()));
        }
        self.ensure_parent(to)?;
        fs::copy(from, to).at(to)?;
        Ok(())
    }

    /// Copy `src` into `dst` recursively. Existing files in `dst` that are not
    /// in `src` are left alone. `on_progress(done, total)` fires once per entry
    /// with `total` counting the whole tree.
    pub fn copy_dir_recursive(
        &self,
        src: &Path,
        dst: &Path,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> CopyReport {
        let mut report = CopyReport::default();
        if !src.is_dir() {
            report
                .errors
                .push(format!("source directory does not exist: {}", src.display()));
            return report;
        }
        if let Err(err) = self.ensure_dir(dst) {
            report.errors.push(err.to_string());
            return report;
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(err) => report
                    .errors
                    .push(format!("error reading {}: {err}", src.display())),
            }
        }

        let total = entries.len();
        for (idx, entry) in entries.iter().enumerate() {
            let path = entry.path();
            match path.strip_prefix(src) {
                Ok(rel) => {
                    let target = dst.join(rel);
                    if entry.file_type().is_dir() {
                        if let Err(err) = self.ensure_dir(&target) {
                            report.errors.push(err.to_string());
                        }
                    } else {
                        match self.copy_file(path, &target) {
                            Ok(()) => report.copied_count += 1,
                            Err(err) => report
                                .errors
                                .push(format!("failed to copy file {}: {err}", path.display())),
                        }
                    }
                }
                Err(err) => report
                    .errors
                    .push(format!("failed to copy {}: {err}", path.display())),
            }
            on_progress(idx + 1, total);
        }

        report.succeeded = report.errors.is_empty();
        report
    }

    /// Probe a directory by creating it if needed and writing then removing a
    /// throwaway file.
    pub fn is_writable(&self, dir: &Path) -> bool {
        match self.probe_write(dir) {
            Ok(()) => true,
            Err(err) => {
                warn!("directory {} is not writable: {err}", dir.display());
                false
            }
        }
    }

    fn probe_write(&self, dir: &Path) -> Result<()> {
        self.ensure_dir(dir)?;
        let probe = dir.join(format!(".write-test-{}", Uuid::new_v4().simple()));
        fs::write(&probe, "test").at(&probe)?;
        self.delete(&probe)?;
        Ok(())
    }

    /// Names of board directories (those holding a `board.md`) under `dir`.
    pub fn list_boards(&self, dir: &Path) -> Result<Vec<String>> {
        let mut boards = Vec::new();
        for sub in self.list_dirs(dir)? {
            if self.file_exists(&sub.join(BOARD_FILENAME)) {
                boards.push(dir_name(&sub));
            }
        }
        Ok(boards)
    }

    pub fn has_boards(&self, dir: &Path) -> Result<bool> {
        Ok(!self.list_boards(dir)?.is_empty())
    }

    fn ensure_parent(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.ensure_dir(parent),
            _ => Ok(()),
        }
    }
}

/// Last path component as an owned string.
pub fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$"))
        .map_err(|err| StoreError::Validation(format!("invalid file pattern '{pattern}': {err}")))
}
