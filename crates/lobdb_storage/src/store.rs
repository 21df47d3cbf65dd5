//! File store trait definition.

use crate::error::StorageResult;
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Writable stream returned by [`FileStore::create`].
pub type WriteHandle = Box<dyn Write + Send>;

/// Readable stream returned by [`FileStore::open_read`].
pub type ReadHandle = Box<dyn Read + Send>;

/// A path-addressed file store.
///
/// File stores are **opaque byte stores**. They create, read, move and
/// delete whole files; the LOB manager owns all naming and layout decisions.
///
/// # Invariants
///
/// - `create` truncates an existing file and creates missing parent directories
/// - `rename` replaces the target atomically when both paths share a filesystem
/// - `delete` of a missing file succeeds and reports `false`
/// - `list` of a missing directory returns an empty listing
/// - Stores must be `Send + Sync`; they do not serialize operations themselves
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::DiskStore`] - For persistent storage
pub trait FileStore: Send + Sync + fmt::Debug {
    /// Creates (or truncates) the file at `path` and opens it for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directories cannot be created.
    fn create(&self, path: &Path) -> StorageResult<WriteHandle>;

    /// Opens the file at `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] if the file does not exist.
    fn open_read(&self, path: &Path) -> StorageResult<ReadHandle>;

    /// Deletes the file at `path`.
    ///
    /// Returns `true` if a file was removed, `false` if it was already gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    fn delete(&self, path: &Path) -> StorageResult<bool>;

    /// Moves `from` to `to`, replacing `to` if it exists.
    ///
    /// Missing parent directories of `to` are created.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` does not exist or the move fails.
    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Copies the contents of `from` into a new file at `to`.
    ///
    /// Returns the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` does not exist or the copy fails.
    fn copy(&self, from: &Path, to: &Path) -> StorageResult<u64>;

    /// Lists the immediate entries of directory `dir` as full paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    fn list(&self, dir: &Path) -> StorageResult<Vec<PathBuf>>;

    /// Returns true if `path` names a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Returns true if `path` names an existing file.
    fn exists(&self, path: &Path) -> bool;

    /// Returns the size of the file at `path` in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] if the file does not exist.
    fn size(&self, path: &Path) -> StorageResult<u64>;
}
