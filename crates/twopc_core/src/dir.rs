//! Coordinator directory management.
//!
//! A coordinator persists its state in a directory:
//!
//! ```text
//! coordinator/
//! ├── LOCK            # exclusive lock: one coordinator process per directory
//! └── decisions.log   # decision log
//! ```

use crate::error::{CoordinatorError, CoordinatorResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// Holds the exclusive lock on a coordinator directory.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct CoordinatorDir {
    path: PathBuf,
    _lock_file: File,
}

impl CoordinatorDir {
    /// File name of the decision log inside a coordinator directory.
    pub const LOG_FILE: &'static str = "decisions.log";

    /// Opens or creates a coordinator directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path is not a directory
    /// - Another process holds the lock (`CoordinatorLocked`)
    pub fn open(path: &Path, create_if_missing: bool) -> CoordinatorResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoordinatorError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("coordinator directory does not exist: {}", path.display()),
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoordinatorError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoordinatorError::CoordinatorLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the decision log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(Self::LOG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("coordinator");

        let dir = CoordinatorDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.log_path(), path.join("decisions.log"));
    }

    #[test]
    fn open_missing_without_create_fails() {
        let temp = tempdir().unwrap();
        let result = CoordinatorDir::open(&temp.path().join("absent"), false);
        assert!(result.is_err());
    }

    #[test]
    fn second_open_is_locked_out() {
        let temp = tempdir().unwrap();
        let _first = CoordinatorDir::open(temp.path(), true).unwrap();

        let second = CoordinatorDir::open(temp.path(), true);
        assert!(matches!(second, Err(CoordinatorError::CoordinatorLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(CoordinatorDir::open(temp.path(), true).unwrap());
        assert!(CoordinatorDir::open(temp.path(), true).is_ok());
    }
}
