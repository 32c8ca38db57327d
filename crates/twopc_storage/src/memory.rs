//! Volatile backend kept entirely in RAM.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A byte store that lives only as long as the process.
///
/// Clones are handles onto one shared buffer, so a log reopened over a clone
/// sees every byte written through the original. Crash tests rely on this to
/// restart a coordinator without touching the disk.
///
/// ```rust
/// use twopc_storage::{InMemoryBackend, StorageBackend};
///
/// let mut log = InMemoryBackend::new();
/// log.append(b"tx,ABORT,1\n").unwrap();
/// let reopened = log.clone();
/// assert_eq!(reopened.size().unwrap(), 11);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.bytes.read().to_vec()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(len)?));

        range
            .and_then(|range| bytes.get(range))
            .map(<[u8]>::to_vec)
            .ok_or(StorageError::ReadPastEnd {
                offset,
                len,
                size: bytes.len() as u64,
            })
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let start = bytes.len();
        bytes.extend_from_slice(data);
        Ok(start as u64)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        let size = bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        bytes.clear();
        bytes.extend_from_slice(data);
        Ok(())
    }
}
