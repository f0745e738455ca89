use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("corrupt frontmatter in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to save task \"{title}\" to column \"{column}\": {source}")]
    TaskSave {
        title: String,
        column: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io_error",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::Parse { .. } => "parse_error",
            Self::TaskSave { .. } => "task_save_failed",
            Self::Yaml(_) => "yaml_error",
            Self::Json(_) => "json_error",
        }
    }

    /// Wrap an `io::Error` with the path that was being touched.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Attach a path to bare `io::Result`s coming out of `std::fs`.
pub trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|err| StoreError::io(path, err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
