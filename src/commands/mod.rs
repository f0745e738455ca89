pub mod board;
pub mod boards;
pub mod cleanup;
pub mod column;
pub mod config;
pub mod init;
pub mod migrate_layout;
pub mod relocate;
pub mod task;

use std::path::PathBuf;

use crate::config::{StorageConfig, resolve_documents_dir};
use crate::error::Result;
use crate::store::board::BoardPersistence;
use crate::store::files::FileSystem;
use crate::store::migration::TaskStorageMigration;
use crate::store::paths;

/// Everything a command needs: the config plus stores bound to the same
/// documents directory.
pub struct Workspace {
    pub config: StorageConfig,
    pub store: BoardPersistence,
    pub migration: TaskStorageMigration,
}

impl Workspace {
    pub fn open(documents_dir: Option<PathBuf>) -> Result<Self> {
        let documents = resolve_documents_dir(documents_dir)?;
        let fs = FileSystem::new(&documents);
        Ok(Self {
            config: StorageConfig::new(&documents),
            store: BoardPersistence::new(fs.clone()),
            migration: TaskStorageMigration::new(fs),
        })
    }

    pub fn root(&mut self) -> PathBuf {
        self.config.boards_directory()
    }

    /// Resolve the root and bring `board` up to the folder-per-task layout
    /// before anything reads or writes it.
    pub fn prepare_board(&mut self, board: &str) -> Result<PathBuf> {
        let root = self.root();
        self.migration
            .migrate_board_if_needed(&paths::board_dir(&root, board))?;
        Ok(root)
    }
}
