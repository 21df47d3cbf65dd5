//! OS filesystem store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::{FileStore, ReadHandle, WriteHandle};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Buffer size for file handles handed out by [`DiskStore`].
const HANDLE_BUFFER_SIZE: usize = 4096;

/// A file store backed by the OS filesystem.
///
/// Data survives process restarts. Every path is used as given; the store
/// has no root of its own.
///
/// # Durability
///
/// - Write handles are buffered and flushed on `flush()` or drop
/// - With `sync_on_close`, `flush()` also calls `File::sync_all()`
///
/// # Thread Safety
///
/// The store holds no state besides its options and can be shared across
/// threads. Concurrent mutation of the same paths must be serialized by the
/// caller.
///
/// # Example
///
/// ```no_run
/// use lobdb_storage::{DiskStore, FileStore};
/// use std::io::Write;
/// use std::path::Path;
///
/// let store = DiskStore::new();
/// let mut out = store.create(Path::new("data/test.lobs.db/1.temp.lob.db")).unwrap();
/// out.write_all(b"persistent data").unwrap();
/// out.flush().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct DiskStore {
    sync_on_close: bool,
}

impl DiskStore {
    /// Creates a disk store that does not fsync on flush.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether flushing a write handle also syncs file data to disk.
    #[must_use]
    pub const fn sync_on_close(mut self, value: bool) -> Self {
        self.sync_on_close = value;
        self
    }

    fn create_parent_dirs(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Buffered file writer that optionally syncs on flush.
struct DiskWriter {
    inner: BufWriter<File>,
    sync: bool,
}

impl Write for DiskWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        if self.sync {
            self.inner.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl FileStore for DiskStore {
    fn create(&self, path: &Path) -> StorageResult<WriteHandle> {
        Self::create_parent_dirs(path)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Box::new(DiskWriter {
            inner: BufWriter::with_capacity(HANDLE_BUFFER_SIZE, file),
            sync: self.sync_on_close,
        }))
    }

    fn open_read(&self, path: &Path) -> StorageResult<ReadHandle> {
        let file = File::open(path).map_err(|e| StorageError::from_io(e, path))?;
        Ok(Box::new(BufReader::with_capacity(HANDLE_BUFFER_SIZE, file)))
    }

    fn delete(&self, path: &Path) -> StorageResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        if !from.is_file() {
            return Err(StorageError::NotFound {
                path: from.to_path_buf(),
            });
        }
        Self::create_parent_dirs(to)?;
        fs::rename(from, to)?;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> StorageResult<u64> {
        if !from.is_file() {
            return Err(StorageError::NotFound {
                path: from.to_path_buf(),
            });
        }
        Self::create_parent_dirs(to)?;
        Ok(fs::copy(from, to)?)
    }

    fn list(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn size(&self, path: &Path) -> StorageResult<u64> {
        let metadata = fs::metadata(path).map_err(|e| StorageError::from_io(e, path))?;
        Ok(metadata.len())
    }
}
