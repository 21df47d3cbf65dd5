//! LOB values.
//!
//! A [`LobValue`] is immutable: its kind, precision and content never change
//! after creation. Lifecycle operations ([`LobValue::link`],
//! [`LobValue::unlink`]) return a new value; when a transition moves the
//! backing file, every older handle to that file is retired and further
//! reads through it fail with [`LobError::UseAfterClose`].

use crate::context::LobContext;
use crate::error::{LobError, LobResult};
use crate::types::{Layout, LobKind, ObjectId, TableId};
use lobdb_storage::{decompressing_reader, FileStore, ReadHandle};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Values with a larger precision hash their length instead of their content.
pub const HASH_PRECISION_CAP: u64 = 4096;

/// Handle to a LOB file shared by all clones of a value.
///
/// While `auto_delete` is set, dropping the last handle removes the file.
/// A retired handle no longer owns its path: the file was deleted or moved
/// by a lifecycle transition.
#[derive(Debug)]
pub(crate) struct BackingFile {
    path: PathBuf,
    store: Arc<dyn FileStore>,
    lock: Arc<Mutex<()>>,
    auto_delete: AtomicBool,
    retired: AtomicBool,
}

impl BackingFile {
    pub(crate) fn new(ctx: &LobContext, path: PathBuf, auto_delete: bool) -> Arc<Self> {
        Arc::new(Self {
            path,
            store: Arc::clone(ctx.store()),
            lock: Arc::clone(ctx.lock_handle()),
            auto_delete: AtomicBool::new(auto_delete),
            retired: AtomicBool::new(false),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn is_auto_delete(&self) -> bool {
        self.auto_delete.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(AtomicOrdering::Acquire)
    }

    /// Marks the handle retired; returns true if it was live.
    pub(crate) fn retire(&self) -> bool {
        !self.retired.swap(true, AtomicOrdering::AcqRel)
    }

    pub(crate) fn ensure_live(&self) -> LobResult<()> {
        if self.is_retired() {
            return Err(LobError::use_after_close(&self.path));
        }
        Ok(())
    }
}

impl Drop for BackingFile {
    fn drop(&mut self) {
        if self.is_retired() || !self.is_auto_delete() {
            return;
        }
        let _guard = self.lock.lock();
        match self.store.delete(&self.path) {
            Ok(true) => debug!(path = %self.path.display(), "auto-deleted LOB temp file"),
            Ok(false) => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to auto-delete LOB temp file"),
        }
    }
}

/// Location and state of a file-backed value.
#[derive(Debug, Clone)]
pub struct FileRef {
    pub(crate) object_id: ObjectId,
    pub(crate) table: Option<TableId>,
    pub(crate) compressed: bool,
    pub(crate) layout: Layout,
    pub(crate) file: Arc<BackingFile>,
}

impl FileRef {
    /// Returns the object id.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Returns the owning table, `None` for temp files.
    #[must_use]
    pub fn table(&self) -> Option<TableId> {
        self.table
    }

    /// Returns true if the file content is compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Returns the file naming scheme.
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Storage of a LOB value's content.
#[derive(Debug, Clone)]
pub enum Representation {
    /// Content held in memory, stored with the row.
    Inline {
        /// The content; UTF-8 for CLOBs.
        data: Arc<[u8]>,
        /// Table the value is stamped with, if any.
        table: Option<TableId>,
    },
    /// Content held in a LOB file.
    FileBacked(FileRef),
}

/// A BLOB or CLOB value.
#[derive(Debug, Clone)]
pub struct LobValue {
    pub(crate) kind: LobKind,
    pub(crate) precision: u64,
    pub(crate) repr: Representation,
    pub(crate) hash: OnceLock<u32>,
}

impl LobValue {
    pub(crate) fn from_parts(kind: LobKind, precision: u64, repr: Representation) -> Self {
        Self {
            kind,
            precision,
            repr,
            hash: OnceLock::new(),
        }
    }

    /// Creates an inline BLOB.
    #[must_use]
    pub fn inline_binary(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let precision = data.len() as u64;
        Self::from_parts(
            LobKind::Binary,
            precision,
            Representation::Inline {
                data: data.into(),
                table: None,
            },
        )
    }

    /// Creates an inline CLOB.
    #[must_use]
    pub fn inline_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let precision = text.chars().count() as u64;
        Self::from_parts(
            LobKind::Character,
            precision,
            Representation::Inline {
                data: text.into_bytes().into(),
                table: None,
            },
        )
    }

    /// Creates an inline value of `kind` from stored bytes.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if a CLOB payload is not valid UTF-8.
    pub fn inline(kind: LobKind, data: Vec<u8>) -> LobResult<Self> {
        match kind {
            LobKind::Binary => Ok(Self::inline_binary(data)),
            LobKind::Character => {
                let text = String::from_utf8(data)
                    .map_err(|e| LobError::corruption(format!("inline CLOB is not UTF-8: {e}")))?;
                Ok(Self::inline_text(text))
            }
        }
    }

    /// Reattaches a linked value recorded in row metadata.
    ///
    /// In a sharded database a value written before sharding was enabled
    /// keeps its flat name; it is found there when no sharded file exists.
    /// The file itself is not opened until the value is read.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for object id 0.
    pub fn open(
        ctx: &LobContext,
        kind: LobKind,
        table: TableId,
        object_id: ObjectId,
        precision: u64,
        compressed: bool,
    ) -> LobResult<Self> {
        if object_id.as_u32() == 0 {
            return Err(LobError::invalid_operation("object id 0 is never allocated"));
        }
        let mut layout = ctx.layout();
        let mut path = ctx.path_for(layout, Some(table), object_id);
        if layout == Layout::Sharded && !ctx.store().exists(&path) {
            let flat = ctx.path_for(Layout::Flat, Some(table), object_id);
            if ctx.store().exists(&flat) {
                layout = Layout::Flat;
                path = flat;
            }
        }
        Ok(Self::from_parts(
            kind,
            precision,
            Representation::FileBacked(FileRef {
                object_id,
                table: Some(table),
                compressed,
                layout,
                file: BackingFile::new(ctx, path, false),
            }),
        ))
    }

    /// Returns the value type.
    #[must_use]
    pub fn kind(&self) -> LobKind {
        self.kind
    }

    /// Returns the length in bytes (BLOB) or characters (CLOB).
    #[must_use]
    pub fn precision(&self) -> u64 {
        self.precision
    }

    /// Returns the storage representation.
    #[must_use]
    pub fn representation(&self) -> &Representation {
        &self.repr
    }

    /// Returns true if the content is held inline.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self.repr, Representation::Inline { .. })
    }

    /// Returns true if the content lives in a LOB file.
    #[must_use]
    pub fn is_file_backed(&self) -> bool {
        matches!(self.repr, Representation::FileBacked(_))
    }

    /// Returns the file reference of a file-backed value.
    #[must_use]
    pub fn file(&self) -> Option<&FileRef> {
        match &self.repr {
            Representation::FileBacked(file) => Some(file),
            Representation::Inline { .. } => None,
        }
    }

    /// Returns the owning table id.
    #[must_use]
    pub fn table_id(&self) -> Option<TableId> {
        match &self.repr {
            Representation::Inline { table, .. } => *table,
            Representation::FileBacked(file) => file.table,
        }
    }

    /// Returns true if the value's file is owned by a table.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.file().is_some_and(|file| file.table.is_some())
    }

    /// Returns the object id of a file-backed value.
    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        self.file().map(FileRef::object_id)
    }

    /// Returns the backing file path of a file-backed value.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.file().map(FileRef::path)
    }

    /// Returns true if the value's file content is compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.file().is_some_and(FileRef::is_compressed)
    }

    /// Returns the inline content.
    #[must_use]
    pub fn inline_bytes(&self) -> Option<&[u8]> {
        match &self.repr {
            Representation::Inline { data, .. } => Some(data),
            Representation::FileBacked(_) => None,
        }
    }

    /// Returns true if the file will be removed when the last handle is dropped.
    #[must_use]
    pub fn is_auto_delete(&self) -> bool {
        self.file()
            .is_some_and(|file| file.file.is_auto_delete() && !file.file.is_retired())
    }

    /// Opens a reader over the content (UTF-8 for CLOBs).
    ///
    /// # Errors
    ///
    /// Returns `UseAfterClose` if the file was closed or moved, or a storage
    /// error if it cannot be opened.
    pub fn reader(&self) -> LobResult<ReadHandle> {
        match &self.repr {
            Representation::Inline { data, .. } => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            Representation::FileBacked(file) => {
                file.file.ensure_live()?;
                let handle = match file.file.store.open_read(file.path()) {
                    Ok(handle) => handle,
                    Err(e) if e.is_not_found() && file.file.is_retired() => {
                        return Err(LobError::use_after_close(file.path()));
                    }
                    Err(e) => return Err(e.into()),
                };
                Ok(decompressing_reader(handle, file.compressed)?)
            }
        }
    }

    /// Reads the whole content.
    ///
    /// # Errors
    ///
    /// See [`LobValue::reader`].
    pub fn read_bytes(&self) -> LobResult<Vec<u8>> {
        if let Representation::Inline { data, .. } = &self.repr {
            return Ok(data.to_vec());
        }
        let hint = usize::try_from(self.precision).unwrap_or(0).min(1 << 20);
        let mut data = Vec::with_capacity(hint);
        self.reader()?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Reads the content as text: the characters of a CLOB, hex digits of a BLOB.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if CLOB content is not valid UTF-8, or see
    /// [`LobValue::reader`].
    pub fn read_string(&self) -> LobResult<String> {
        let data = self.read_bytes()?;
        match self.kind {
            LobKind::Character => String::from_utf8(data)
                .map_err(|e| LobError::corruption(format!("CLOB content is not UTF-8: {e}"))),
            LobKind::Binary => Ok(data.iter().map(|byte| format!("{byte:02x}")).collect()),
        }
    }

    /// Returns the value's hash code.
    ///
    /// Values up to [`HASH_PRECISION_CAP`] hash their content; larger values
    /// hash their precision so that hashing stays cheap. Equal values always
    /// have equal hash codes; use [`LobValue::content_eq`] for equality.
    ///
    /// # Errors
    ///
    /// See [`LobValue::reader`].
    pub fn hash_code(&self) -> LobResult<u32> {
        if self.precision > HASH_PRECISION_CAP {
            return Ok((self.precision ^ (self.precision >> 32)) as u32);
        }
        if let Some(&hash) = self.hash.get() {
            return Ok(hash);
        }
        let hash = crc32fast::hash(&self.read_bytes()?);
        Ok(*self.hash.get_or_init(|| hash))
    }

    /// Compares full content: CLOBs as strings, BLOBs as unsigned bytes.
    ///
    /// # Errors
    ///
    /// See [`LobValue::read_string`].
    pub fn compare(&self, other: &LobValue) -> LobResult<Ordering> {
        match self.kind {
            LobKind::Character => Ok(self.read_string()?.cmp(&other.read_string()?)),
            LobKind::Binary => Ok(self.read_bytes()?.cmp(&other.read_bytes()?)),
        }
    }

    /// Returns true if both values have the same content.
    ///
    /// # Errors
    ///
    /// See [`LobValue::compare`].
    pub fn content_eq(&self, other: &LobValue) -> LobResult<bool> {
        if self.kind == other.kind && self.precision != other.precision {
            return Ok(false);
        }
        Ok(self.compare(other)? == Ordering::Equal)
    }

    /// Returns an estimate of the memory held by this value.
    #[must_use]
    pub fn memory_footprint(&self) -> usize {
        match &self.repr {
            Representation::Inline { data, .. } => data.len() + 32,
            Representation::FileBacked(_) => 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LobConfig;
    use lobdb_storage::InMemoryStore;

    fn context() -> LobContext {
        LobContext::open(
            "db/test",
            Arc::new(InMemoryStore::new()),
            LobConfig::default().inline_threshold(16),
        )
        .unwrap()
    }

    #[test]
    fn inline_binary_precision() {
        let value = LobValue::inline_binary(vec![1, 2, 3]);
        assert_eq!(value.kind(), LobKind::Binary);
        assert_eq!(value.precision(), 3);
        assert!(value.is_inline());
        assert!(!value.is_linked());
        assert_eq!(value.inline_bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(value.read_string().unwrap(), "010203");
    }

    #[test]
    fn inline_text_counts_characters() {
        let value = LobValue::inline_text("héllo wörld");
        assert_eq!(value.precision(), 11);
        assert_eq!(value.read_bytes().unwrap().len(), 13);
        assert_eq!(value.read_string().unwrap(), "héllo wörld");
    }

    #[test]
    fn inline_rejects_invalid_utf8() {
        let result = LobValue::inline(LobKind::Character, vec![0xff, 0xfe]);
        assert!(matches!(result, Err(LobError::Corruption { .. })));
        assert!(LobValue::inline(LobKind::Binary, vec![0xff]).is_ok());
    }

    #[test]
    fn small_values_hash_content() {
        let a = LobValue::inline_text("same");
        let b = LobValue::inline_text("same");
        let c = LobValue::inline_text("diff");
        assert_eq!(a.hash_code().unwrap(), b.hash_code().unwrap());
        assert_ne!(a.hash_code().unwrap(), c.hash_code().unwrap());
        assert_eq!(a.hash_code().unwrap(), crc32fast::hash(b"same"));
    }

    #[test]
    fn large_values_hash_length() {
        let ctx = context();
        let a = LobValue::create_blob(&vec![1u8; 5000][..], None, &ctx).unwrap();
        let b = LobValue::create_blob(&vec![2u8; 5000][..], None, &ctx).unwrap();

        assert_eq!(a.hash_code().unwrap(), 5000);
        assert_eq!(a.hash_code().unwrap(), b.hash_code().unwrap());
        // Equality still compares content
        assert!(!a.content_eq(&b).unwrap());
    }

    #[test]
    fn compare_orders_content() {
        let a = LobValue::inline_binary(vec![0x01]);
        let b = LobValue::inline_binary(vec![0xff]);
        assert_eq!(a.compare(&b).unwrap(), Ordering::Less);

        let x = LobValue::inline_text("apple");
        let y = LobValue::inline_text("banana");
        assert_eq!(y.compare(&x).unwrap(), Ordering::Greater);
        assert!(x.content_eq(&LobValue::inline_text("apple")).unwrap());
    }

    #[test]
    fn inline_and_file_values_compare_equal() {
        let ctx = context();
        let text = "x".repeat(40);
        let file = LobValue::create_clob(text.as_bytes(), None, &ctx).unwrap();
        let inline = LobValue::inline_text(text);

        assert!(file.is_file_backed());
        assert!(file.content_eq(&inline).unwrap());
        assert_eq!(file.hash_code().unwrap(), inline.hash_code().unwrap());
    }

    #[test]
    fn memory_footprint_estimates() {
        let ctx = context();
        assert_eq!(LobValue::inline_binary(vec![0; 10]).memory_footprint(), 42);
        let file = LobValue::create_blob(&[0u8; 100][..], None, &ctx).unwrap();
        assert_eq!(file.memory_footprint(), 128);
    }

    #[test]
    fn open_reattaches_linked_file() {
        let ctx = context();
        let value = LobValue::create_blob(&[9u8; 64][..], None, &ctx).unwrap();
        let linked = value.link(&ctx, TableId::new(3)).unwrap();
        let object_id = linked.object_id().unwrap();

        let reopened =
            LobValue::open(&ctx, LobKind::Binary, TableId::new(3), object_id, 64, false).unwrap();
        assert_eq!(reopened.path(), linked.path());
        assert_eq!(reopened.read_bytes().unwrap(), vec![9u8; 64]);
        assert!(!reopened.is_auto_delete());
    }

    #[test]
    fn open_finds_flat_value_in_sharded_database() {
        let store = Arc::new(InMemoryStore::new());
        {
            let mut out = store.create(Path::new("db/test.6.1.lob.db")).unwrap();
            std::io::Write::write_all(&mut out, &[5u8; 40]).unwrap();
        }
        let ctx = LobContext::open("db/test", store.clone(), LobConfig::default()).unwrap();

        let value =
            LobValue::open(&ctx, LobKind::Binary, TableId::new(6), ObjectId::new(1), 40, false)
                .unwrap();
        assert_eq!(value.file().unwrap().layout(), Layout::Flat);
        assert_eq!(value.path(), Some(Path::new("db/test.6.1.lob.db")));
        assert_eq!(value.read_bytes().unwrap(), vec![5u8; 40]);

        let unlinked = value.unlink(&ctx).unwrap();
        assert_eq!(unlinked.path(), Some(Path::new("db/test.1.temp.db")));
        assert_eq!(unlinked.read_bytes().unwrap(), vec![5u8; 40]);

        let relinked = unlinked.link(&ctx, TableId::new(6)).unwrap();
        assert_eq!(relinked.path(), Some(Path::new("db/test.6.1.lob.db")));
    }

    #[test]
    fn open_prefers_sharded_file() {
        let store = Arc::new(InMemoryStore::new());
        let ctx = LobContext::open("db/test", store.clone(), LobConfig::default()).unwrap();
        store.create(Path::new("db/test.lobs.db/1.t6.lob.db")).unwrap();
        store.create(Path::new("db/test.6.1.lob.db")).unwrap();

        let value =
            LobValue::open(&ctx, LobKind::Binary, TableId::new(6), ObjectId::new(1), 0, false)
                .unwrap();
        assert_eq!(value.file().unwrap().layout(), Layout::Sharded);
    }

    #[test]
    fn open_rejects_object_zero() {
        let ctx = context();
        let result = LobValue::open(&ctx, LobKind::Binary, TableId::new(1), ObjectId::new(0), 0, false);
        assert!(matches!(result, Err(LobError::InvalidOperation { .. })));
    }
}
