//! In-memory file store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::{FileStore, ReadHandle, WriteHandle};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type FileMap = Arc<RwLock<BTreeMap<PathBuf, Vec<u8>>>>;

/// An in-memory file store.
///
/// This store keeps every file in a shared map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// Directories are implicit: a path is a directory while at least one file
/// lives below it.
///
/// # Thread Safety
///
/// This store is thread-safe. Clones share the same files.
///
/// # Example
///
/// ```rust
/// use lobdb_storage::{FileStore, InMemoryStore};
/// use std::io::Write;
/// use std::path::Path;
///
/// let store = InMemoryStore::new();
/// store.create(Path::new("a/b.lob.db")).unwrap().write_all(b"test data").unwrap();
/// assert_eq!(store.size(Path::new("a/b.lob.db")).unwrap(), 9);
/// assert!(store.is_dir(Path::new("a")));
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    files: FileMap,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the paths of all files in the store.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.read().keys().cloned().collect()
    }

    /// Returns the number of files in the store.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Removes every file from the store.
    pub fn clear(&self) {
        self.files.write().clear();
    }
}

/// Write handle appending into a file of an [`InMemoryStore`].
struct MemoryWriter {
    files: FileMap,
    path: PathBuf,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.write();
        match files.get_mut(&self.path) {
            Some(data) => {
                data.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file removed while open: {}", self.path.display()),
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        // Writes land in the map immediately
        Ok(())
    }
}

impl FileStore for InMemoryStore {
    fn create(&self, path: &Path) -> StorageResult<WriteHandle> {
        self.files.write().insert(path.to_path_buf(), Vec::new());
        Ok(Box::new(MemoryWriter {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
        }))
    }

    fn open_read(&self, path: &Path) -> StorageResult<ReadHandle> {
        let files = self.files.read();
        let data = files.get(path).ok_or_else(|| StorageError::NotFound {
            path: path.to_path_buf(),
        })?;
        Ok(Box::new(Cursor::new(data.clone())))
    }

    fn delete(&self, path: &Path) -> StorageResult<bool> {
        Ok(self.files.write().remove(path).is_some())
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let mut files = self.files.write();
        let data = files.remove(from).ok_or_else(|| StorageError::NotFound {
            path: from.to_path_buf(),
        })?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> StorageResult<u64> {
        let mut files = self.files.write();
        let data = files
            .get(from)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                path: from.to_path_buf(),
            })?;
        let len = data.len() as u64;
        files.insert(to.to_path_buf(), data);
        Ok(len)
    }

    fn list(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        let files = self.files.read();
        let mut entries = BTreeSet::new();
        for path in files.keys() {
            let Ok(rest) = path.strip_prefix(dir) else {
                continue;
            };
            if let Some(first) = rest.components().next() {
                entries.insert(dir.join(first));
            }
        }
        Ok(entries.into_iter().collect())
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .read()
            .keys()
            .any(|p| p != path && p.starts_with(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn size(&self, path: &Path) -> StorageResult<u64> {
        self.files
            .read()
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_path_buf(),
            })
    }
}
