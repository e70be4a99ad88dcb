//! File system paths for the sync core.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths under the Dropmate base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.dropmate)
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `~/.dropmate`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".dropmate"),
        })
    }

    /// Paths rooted at a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// `<base>/config.json`
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// `<base>/secure-store.json`, backing the file secure storage.
    pub fn secure_store_file(&self) -> PathBuf {
        self.base_dir.join("secure-store.json")
    }

    /// `<base>/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// `<base>/logs/sync.jsonl`
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("sync.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
