//! Location of the boards root.
//!
//! The active root is recorded in `{documents}/.mkanban/config.json`:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "boardsDirectory": "/srv/kanban/"
//! }
//! ```
//!
//! Without `boardsDirectory` the root is `{documents}/boards`. The document is
//! read once per [`StorageConfig`] and cached until [`StorageConfig::clear_cache`].

use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::store::files::FileSystem;

pub const CONFIG_VERSION: &str = "1.0";
pub const CONFIG_DIR_NAME: &str = ".mkanban";
pub const CONFIG_FILENAME: &str = "config.json";
pub const DEFAULT_BOARDS_SUBDIR: &str = "boards";

pub const DOCUMENTS_DIR_ENV: &str = "MKANBAN_DOCUMENTS_DIR";
pub const LOAD_TIMEOUT_ENV: &str = "MKANBAN_CONFIG_LOAD_TIMEOUT_MS";
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 10_000;

const FILE_SCHEME: &str = "file://";
const CONTENT_SCHEME: &str = "content://";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub version: String,
    #[serde(
        rename = "boardsDirectory",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub boards_directory: Option<String>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            boards_directory: None,
        }
    }
}

/// Result of copying a boards tree to a new root. Partial failure is a value,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardMigration {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copied_files: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl BoardMigration {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            copied_files: None,
            errors: Vec::new(),
        }
    }
}

/// Canonical form of `path` even when its tail does not exist yet: the
/// deepest existing ancestor is canonicalized and the rest appended.
fn resolve_existing(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(real) = std::fs::canonicalize(current) {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// A trimmed, non-empty path from `name`. Unset is `None`; set but blank is
/// an error.
pub fn optional_trimmed_path_from_env(name: &str) -> Result<Option<PathBuf>> {
    let Some(value) = std::env::var_os(name) else {
        return Ok(None);
    };
    let value = value.to_string_lossy();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation(format!("{name} is set but empty")));
    }
    Ok(Some(PathBuf::from(trimmed)))
}

/// Explicit flag, then `MKANBAN_DOCUMENTS_DIR`, then the platform documents
/// directory, then `~/Documents`.
pub fn resolve_documents_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = optional_trimmed_path_from_env(DOCUMENTS_DIR_ENV)? {
        return Ok(dir);
    }
    if let Some(dir) = dirs::document_dir() {
        return Ok(dir);
    }
    dirs::home_dir()
        .map(|home| home.join("Documents"))
        .ok_or_else(|| StoreError::Validation("could not determine a documents directory".into()))
}

fn load_timeout_from_env(var: &str, default_ms: u64) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_ms))
}

/// Filesystem path behind a stored location. `file://` is stripped;
/// `content://` provider URIs map to the absolute path after the scheme.
pub fn location_to_path(location: &str) -> PathBuf {
    if let Some(rest) = location.strip_prefix(FILE_SCHEME) {
        return PathBuf::from(rest);
    }
    if let Some(rest) = location.strip_prefix(CONTENT_SCHEME) {
        return PathBuf::from(format!("/{}", rest.trim_start_matches('/')));
    }
    PathBuf::from(location)
}

fn with_trailing_separator(location: &str) -> String {
    if location.ends_with('/') || location.ends_with(MAIN_SEPARATOR) {
        location.to_string()
    } else {
        format!("{location}/")
    }
}

#[derive(Debug)]
pub struct StorageConfig {
    documents_dir: PathBuf,
    fs: FileSystem,
    load_timeout: Duration,
    cached: Option<ConfigDocument>,
}

impl StorageConfig {
    pub fn new(documents_dir: impl Into<PathBuf>) -> Self {
        let documents_dir = documents_dir.into();
        Self {
            fs: FileSystem::new(&documents_dir),
            documents_dir,
            load_timeout: load_timeout_from_env(LOAD_TIMEOUT_ENV, DEFAULT_LOAD_TIMEOUT_MS),
            cached: None,
        }
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    pub fn config_dir(&self) -> PathBuf {
        self.documents_dir.join(CONFIG_DIR_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILENAME)
    }

    pub fn default_boards_directory(&self) -> PathBuf {
        self.documents_dir.join(DEFAULT_BOARDS_SUBDIR)
    }

    /// The custom root if one is configured, else the default.
    pub fn boards_directory(&mut self) -> PathBuf {
        match self.load().boards_directory {
            Some(location) => location_to_path(&location),
            None => self.default_boards_directory(),
        }
    }

    /// Validate, probe and persist a new root. Accepts plain paths,
    /// `file://` URIs and `content://` provider URIs.
    pub fn set_boards_directory(&mut self, location: &str) -> Result<PathBuf> {
        let trimmed = location.trim();
        if trimmed.is_empty() {
            return Err(StoreError::Validation(
                "boards directory path cannot be empty".into(),
            ));
        }
        let normalized = with_trailing_separator(trimmed);
        self.validate_location(&normalized)?;

        let mut config = self.load();
        config.boards_directory = Some(normalized.clone());
        self.save(config)?;
        info!("boards directory updated to {normalized}");
        Ok(location_to_path(&normalized))
    }

    fn validate_location(&self, location: &str) -> Result<()> {
        let path = location_to_path(location);
        if location.starts_with(CONTENT_SCHEME) {
            // Provider directories are never created, only probed.
            if !self.fs.dir_exists(&path) || !self.fs.is_writable(&path) {
                return Err(StoreError::Validation(format!(
                    "invalid directory path {location}: provider directory is not writable"
                )));
            }
            return Ok(());
        }
        if !self.fs.is_writable(&path) {
            return Err(StoreError::Validation(format!(
                "invalid directory path {location}: directory is not writable"
            )));
        }
        Ok(())
    }

    pub fn reset_to_default(&mut self) -> Result<()> {
        let mut config = self.load();
        config.boards_directory = None;
        self.save(config)?;
        info!("boards directory reset to default");
        Ok(())
    }

    pub fn is_using_custom_directory(&mut self) -> bool {
        self.load().boards_directory.is_some()
    }

    pub fn full_config(&mut self) -> ConfigDocument {
        self.load()
    }

    pub fn clear_cache(&mut self) {
        self.cached = None;
    }

    pub fn has_existing_boards(&self, dir: &Path) -> Result<bool> {
        self.fs.has_boards(dir)
    }

    /// Boards in `dir`, or in the configured root when `dir` is `None`.
    pub fn list_boards(&mut self, dir: Option<&Path>) -> Result<Vec<String>> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => self.boards_directory(),
        };
        self.fs.list_boards(&dir)
    }

    /// Copy every file under `old_root` into `new_root`. Never deletes from
    /// either side.
    pub fn migrate_boards(
        &self,
        old_root: &Path,
        new_root: &Path,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> BoardMigration {
        if old_root.as_os_str().is_empty() || new_root.as_os_str().is_empty() {
            return BoardMigration::failed("Source and destination paths are required");
        }
        let (old_real, new_real) = (resolve_existing(old_root), resolve_existing(new_root));
        if old_real == new_real {
            return BoardMigration::failed("Source and destination paths cannot be the same");
        }
        if new_real.starts_with(&old_real) || old_real.starts_with(&new_real) {
            return BoardMigration::failed(
                "Source and destination directories cannot be nested inside each other",
            );
        }

        match self.has_existing_boards(old_root) {
            Ok(true) => {}
            Ok(false) => {
                return BoardMigration {
                    success: true,
                    message: "No boards found in source directory, nothing to migrate".into(),
                    copied_files: Some(0),
                    errors: Vec::new(),
                };
            }
            Err(err) => return BoardMigration::failed(format!("Migration error: {err}")),
        }

        if !self.fs.is_writable(new_root) {
            return BoardMigration::failed("Destination directory is not writable");
        }

        info!(
            "copying boards from {} to {}",
            old_root.display(),
            new_root.display()
        );
        let report = self.fs.copy_dir_recursive(old_root, new_root, on_progress);
        if !report.succeeded {
            warn!("board migration finished with {} errors", report.errors.len());
            return BoardMigration {
                success: false,
                message: format!("Migration failed: {} errors occurred", report.errors.len()),
                copied_files: Some(report.copied_count),
                errors: report.errors,
            };
        }

        BoardMigration {
            success: true,
            message: format!("Successfully migrated {} files", report.copied_count),
            copied_files: Some(report.copied_count),
            errors: Vec::new(),
        }
    }

    /// Cached document, or a fresh read raced against the load timeout.
    /// Timeouts and unreadable files fall back to defaults.
    fn load(&mut self) -> ConfigDocument {
        if let Some(config) = &self.cached {
            return config.clone();
        }

        let (tx, rx) = mpsc::channel();
        let fs = self.fs.clone();
        let dir = self.config_dir();
        let path = self.config_path();
        thread::spawn(move || {
            let _ = tx.send(read_or_create(&fs, &dir, &path));
        });

        let config = match rx.recv_timeout(self.load_timeout) {
            Ok(Ok(config)) => config,
            Ok(Err(err)) => {
                warn!("failed to load storage config, using defaults: {err}");
                ConfigDocument::default()
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "loading storage config timed out after {}ms, using defaults",
                    self.load_timeout.as_millis()
                );
                ConfigDocument::default()
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("storage config loader exited early, using defaults");
                ConfigDocument::default()
            }
        };
        self.cached = Some(config.clone());
        config
    }

    fn save(&mut self, config: ConfigDocument) -> Result<()> {
        write_config(&self.fs, &self.config_path(), &config)?;
        self.cached = Some(config);
        Ok(())
    }
}

fn read_or_create(fs: &FileSystem, dir: &Path, path: &Path) -> Result<ConfigDocument> {
    fs.ensure_dir(dir)?;
    if !fs.file_exists(path) {
        let config = ConfigDocument::default();
        write_config(fs, path, &config)?;
        return Ok(config);
    }
    let raw = fs.read_text(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_config(fs: &FileSystem, path: &Path, config: &ConfigDocument) -> Result<()> {
    fs.write_text(path, &serde_json::to_string_pretty(config)?)
}
