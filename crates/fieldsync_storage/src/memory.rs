//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A heap-backed storage backend.
///
/// Clones share the same buffer, which lets a test keep a handle to the bytes
/// a log wrote, tamper with them, and reopen the log over the same data.
///
/// ```rust
/// use fieldsync_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let observer = backend.clone();
/// backend.append(b"abc").unwrap();
/// assert_eq!(observer.size().unwrap(), 3);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites a single byte in place.
    ///
    /// Only meant for corruption tests; real logs never rewrite bytes.
    pub fn poke(&self, offset: usize, byte: u8) {
        if let Some(slot) = self.data.write().get_mut(offset) {
            *slot = byte;
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        data.clear();
        data.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn read_past_end_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(5, 0).unwrap().is_empty());
    }

    #[test]
    fn truncate_drops_tail() {
        let mut backend = InMemoryBackend::with_data(b"keep-drop".to_vec());
        backend.truncate(4).unwrap();
        assert_eq!(backend.data(), b"keep");
        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncatePastEnd { .. })
        ));
    }

    #[test]
    fn replace_is_seen_by_clones() {
        let mut backend = InMemoryBackend::with_data(b"old old old".to_vec());
        let twin = backend.clone();
        backend.replace(b"new").unwrap();
        assert_eq!(twin.data(), b"new");
        assert_eq!(backend.append(b"er").unwrap(), 3);
    }

    #[test]
    fn clones_share_bytes() {
        let mut backend = InMemoryBackend::new();
        let twin = backend.clone();
        backend.append(b"xyz").unwrap();
        twin.poke(1, b'Y');
        assert_eq!(backend.data(), b"xYz");
    }
}
