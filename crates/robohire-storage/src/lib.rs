//! Durable key-value storage for the RoboHire client.
//!
//! - [`FileStore`]: JSON file under the client's state directory
//! - [`MemoryStore`]: in-process map for tests and ephemeral runs

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

use robohire_config::Paths;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default durable store at `paths.storage_file()`.
pub fn create_storage(paths: &Paths) -> StorageResult<Box<dyn KeyValueStore>> {
    paths
        .ensure_dirs()
        .map_err(|e| StorageError::Platform(e.to_string()))?;
    Ok(Box::new(FileStore::new(paths.storage_file())))
}
