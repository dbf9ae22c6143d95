//! Durable storage for the board blob.
//!
//! The persisted form is the flat byte encoding produced by
//! [`Board::serialize`](crate::board::Board::serialize). [`FileStorage`]
//! keeps it in a single file; [`MemoryStorage`] keeps it in process for
//! tests and throwaway runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Errors raised while reading or writing the persisted board.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A filesystem operation failed.
    #[error("board storage I/O error at {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The backend refused the write for a non-I/O reason.
    #[error("board storage unavailable: {0}")]
    Unavailable(String),
}

/// Load/save interface for the persisted board.
pub trait BoardStorage: Send + Sync {
    /// Read the stored blob, or `None` if nothing has been saved yet.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the stored blob exists but cannot be
    /// read.
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the stored blob.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the blob could not be written.
    fn save(&self, data: &[u8]) -> Result<(), StorageError>;
}

/// Board blob kept in a single file.
///
/// Saves go to a sibling `.tmp` file which is then renamed over the
/// target, so an interrupted write leaves the previous board intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Store the board at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The board file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl BoardStorage for FileStorage {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&self, data: &[u8]) -> Result<(), StorageError> {
        let tmp = self.temp_path();
        std::fs::write(&tmp, data).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Board blob kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemoryStorage {
    /// Start empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a previously saved blob.
    pub fn with_blob(blob: Vec<u8>) -> Self {
        Self {
            blob: Mutex::new(Some(blob)),
        }
    }

    /// The last saved blob.
    pub fn blob(&self) -> Option<Vec<u8>> {
        self.blob
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BoardStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blob())
    }

    fn save(&self, data: &[u8]) -> Result<(), StorageError> {
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(data.to_vec());
        Ok(())
    }
}
