//! Filesystem layout of the client's state directory.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".robohire";
const STORAGE_FILE_NAME: &str = "storage.json";

/// Resolves every file the client reads or writes.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.robohire)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a Paths instance rooted at `~/.robohire`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Config file path (~/.robohire/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Durable key-value storage holding the session (~/.robohire/storage.json).
    pub fn storage_file(&self) -> PathBuf {
        self.base_dir.join(STORAGE_FILE_NAME)
    }

    /// Logs directory (~/.robohire/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Client log file (~/.robohire/logs/client.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("client.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
