//! Per-database LOB context.

use crate::config::LobConfig;
use crate::error::{LobError, LobResult};
use crate::shard::{ObjectIdAllocator, ObjectLocator, SequentialAllocator, ShardScanAllocator};
use crate::types::{Layout, ObjectId, TableId};
use crate::value::BackingFile;
use lobdb_storage::{DiskStore, FileStore, WriteHandle};
use parking_lot::{Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Shared state of the large-object area of one open database.
///
/// Every session of the database uses the same context. It owns the LOB
/// lock: all operations that create, rename, copy or delete LOB files run
/// inside one critical section of this lock, and object id allocation is
/// part of the same critical section as the file creation that follows it.
///
/// The lock is not reentrant. Lifecycle operations take it exactly once.
///
/// # Example
///
/// ```rust
/// use lobdb_core::{LobConfig, LobContext, LobValue};
/// use lobdb_storage::InMemoryStore;
/// use std::sync::Arc;
///
/// let ctx = LobContext::open("data/test", Arc::new(InMemoryStore::new()), LobConfig::default())?;
/// let value = LobValue::create_blob(&[7u8; 1000][..], None, &ctx)?;
/// assert!(value.is_file_backed());
/// assert_eq!(value.precision(), 1000);
/// # Ok::<(), lobdb_core::LobError>(())
/// ```
pub struct LobContext {
    config: LobConfig,
    store: Arc<dyn FileStore>,
    locator: ObjectLocator,
    lock: Arc<Mutex<()>>,
    allocator: Box<dyn ObjectIdAllocator>,
}

impl std::fmt::Debug for LobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobContext")
            .field("base", &self.locator.base())
            .field("config", &self.config)
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}

impl LobContext {
    /// Opens the LOB area of the database at path `base`.
    ///
    /// `base` is the database path prefix; LOB files are named after it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or, in flat mode,
    /// if the database directory cannot be listed to seed the allocator.
    pub fn open(
        base: impl Into<PathBuf>,
        store: Arc<dyn FileStore>,
        config: LobConfig,
    ) -> LobResult<Self> {
        config.validate()?;
        let locator = ObjectLocator::new(base, config.shard_fanout);

        let allocator: Box<dyn ObjectIdAllocator> = if config.legacy_flat_naming {
            Box::new(SequentialAllocator::seeded(store.as_ref(), &locator)?)
        } else {
            Box::new(ShardScanAllocator::new(config.max_allocation_probes))
        };

        debug!(
            base = %locator.base().display(),
            fanout = config.shard_fanout,
            flat = config.legacy_flat_naming,
            "opened LOB context"
        );

        Ok(Self {
            config,
            store,
            locator,
            lock: Arc::new(Mutex::new(())),
            allocator,
        })
    }

    /// Opens the LOB area of a database on the OS filesystem.
    ///
    /// # Errors
    ///
    /// See [`LobContext::open`].
    pub fn open_on_disk(base: impl Into<PathBuf>, config: LobConfig) -> LobResult<Self> {
        Self::open(base, Arc::new(DiskStore::new()), config)
    }

    /// Replaces the object id allocator.
    #[must_use]
    pub fn with_allocator(mut self, allocator: Box<dyn ObjectIdAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LobConfig {
        &self.config
    }

    /// Returns the file store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    /// Returns the path locator.
    #[must_use]
    pub fn locator(&self) -> &ObjectLocator {
        &self.locator
    }

    /// Returns the database path.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        self.locator.base()
    }

    /// Returns the layout used for new files.
    #[must_use]
    pub fn layout(&self) -> Layout {
        if self.config.legacy_flat_naming {
            Layout::Flat
        } else {
            Layout::Sharded
        }
    }

    /// Returns the canonical path of an object.
    #[must_use]
    pub fn path_for(&self, layout: Layout, table: Option<TableId>, object_id: ObjectId) -> PathBuf {
        self.locator.path(layout, table, object_id)
    }

    /// Acquires the LOB lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub(crate) fn lock_handle(&self) -> &Arc<Mutex<()>> {
        &self.lock
    }

    /// Allocates an object id. The guard proves the LOB lock is held.
    pub(crate) fn allocate_object_id(&self, _guard: &MutexGuard<'_, ()>) -> LobResult<ObjectId> {
        let id = self
            .allocator
            .allocate(self.store.as_ref(), &self.locator, self.layout())?;
        debug!(object_id = id.as_u32(), "allocated LOB object id");
        Ok(id)
    }

    /// Rejects values whose layout this database cannot serve.
    pub(crate) fn check_layout(&self, layout: Layout) -> LobResult<()> {
        if layout == Layout::Sharded && self.config.legacy_flat_naming {
            return Err(LobError::unsupported_configuration(
                "sharded LOB used with a database opened in legacy flat mode",
            ));
        }
        Ok(())
    }

    /// Allocates an object id and creates its temp file with auto-delete armed.
    pub(crate) fn create_temp(&self) -> LobResult<(ObjectId, Arc<BackingFile>, WriteHandle)> {
        let guard = self.lock();
        let object_id = self.allocate_object_id(&guard)?;
        let path = self.path_for(self.layout(), None, object_id);
        let handle = self.store.create(&path)?;
        debug!(path = %path.display(), "created LOB temp file");
        Ok((object_id, BackingFile::new(self, path, true), handle))
    }
}
