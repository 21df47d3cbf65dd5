//! Object identity and shard directory layout.
//!
//! LOB files live below the database path:
//!
//! ```text
//! <base>.lobs.db/
//! ├─ 1.t7.lob.db            # object 1, linked to table 7
//! ├─ 2.temp.lob.db          # object 2, not linked yet
//! └─ 3.lobs.db/             # shard for objects 3*fanout ..
//!    └─ 769.t7.lob.db       # object 3*256+1
//! <base>.7.12.lob.db        # legacy flat file: table 7, object 12
//! <base>.13.temp.db         # legacy flat temp file
//! ```
//!
//! An object id is read as base-`fanout` digits. A non-zero lowest digit
//! places the file itself; every higher digit adds one `<digit>.lobs.db`
//! directory, most significant first. Slot 0 of a directory is never used
//! for a file, so each directory holds at most `fanout - 1` files.

use crate::error::{LobError, LobResult};
use crate::types::{Layout, ObjectId, TableId};
use lobdb_storage::FileStore;
use rand::Rng;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Suffix of shard directories and of the shard root.
pub const LOBS_DIRECTORY_SUFFIX: &str = ".lobs.db";
/// Suffix of LOB files.
pub const LOB_FILE_SUFFIX: &str = ".lob.db";
/// Suffix shared by every database file.
pub const DB_FILE_SUFFIX: &str = ".db";
/// Suffix of legacy flat temp files.
pub const FLAT_TEMP_SUFFIX: &str = ".temp.db";
/// Table marker of unlinked sharded files.
const TEMP_MARKER: &str = "temp";

/// Owner encoded in a LOB file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileOwner {
    /// Linked to a table.
    Table(TableId),
    /// Unlinked temp file.
    Temp,
}

/// Computes canonical paths of LOB files for one database.
#[derive(Debug, Clone)]
pub struct ObjectLocator {
    base: PathBuf,
    fanout: u32,
}

impl ObjectLocator {
    /// Creates a locator for database path `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>, fanout: u32) -> Self {
        Self {
            base: base.into(),
            fanout,
        }
    }

    /// Returns the database path.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns the shard fanout.
    #[must_use]
    pub const fn fanout(&self) -> u32 {
        self.fanout
    }

    /// Returns the root directory of the shard tree.
    #[must_use]
    pub fn shard_root(&self) -> PathBuf {
        with_suffix(self.base.clone(), LOBS_DIRECTORY_SUFFIX)
    }

    /// Returns the directory holding legacy flat files.
    #[must_use]
    pub fn flat_dir(&self) -> PathBuf {
        match self.base.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Returns the shard path prefix of `object_id`.
    ///
    /// For ids with a zero lowest digit this is the shard directory whose
    /// slots the id's children occupy.
    #[must_use]
    pub fn shard_prefix(&self, object_id: ObjectId) -> PathBuf {
        let mut id = object_id.as_u32();
        let leaf = (id % self.fanout > 0).then(|| id.to_string());

        id /= self.fanout;
        let mut digits = Vec::new();
        while id > 0 {
            digits.push(id % self.fanout);
            id /= self.fanout;
        }

        let mut path = self.shard_root();
        for digit in digits.iter().rev() {
            path.push(format!("{digit}{LOBS_DIRECTORY_SUFFIX}"));
        }
        if let Some(leaf) = leaf {
            path.push(leaf);
        }
        path
    }

    /// Returns the canonical sharded file path.
    #[must_use]
    pub fn sharded_path(&self, table: Option<TableId>, object_id: ObjectId) -> PathBuf {
        let owner = match table {
            Some(table) => format!(".t{}", table.as_u32()),
            None => format!(".{TEMP_MARKER}"),
        };
        with_suffix(
            self.shard_prefix(object_id),
            &format!("{owner}{LOB_FILE_SUFFIX}"),
        )
    }

    /// Returns the canonical legacy flat file path.
    #[must_use]
    pub fn flat_path(&self, table: Option<TableId>, object_id: ObjectId) -> PathBuf {
        let suffix = match table {
            Some(table) => format!(".{}.{}{LOB_FILE_SUFFIX}", table.as_u32(), object_id.as_u32()),
            None => format!(".{}{FLAT_TEMP_SUFFIX}", object_id.as_u32()),
        };
        with_suffix(self.base.clone(), &suffix)
    }

    /// Returns the canonical path for `layout`.
    #[must_use]
    pub fn path(&self, layout: Layout, table: Option<TableId>, object_id: ObjectId) -> PathBuf {
        match layout {
            Layout::Sharded => self.sharded_path(table, object_id),
            Layout::Flat => self.flat_path(table, object_id),
        }
    }

    /// Parses a flat file name of this database into owner and object id.
    ///
    /// Returns `None` for names belonging to other databases or other files.
    #[must_use]
    pub fn parse_flat_name(&self, name: &str) -> Option<(FileOwner, ObjectId)> {
        let base_name = self.base.file_name()?.to_str()?;
        let rest = name.strip_prefix(base_name)?.strip_prefix('.')?;

        if let Some(id) = rest.strip_suffix(FLAT_TEMP_SUFFIX) {
            let id = id.parse().ok()?;
            return Some((FileOwner::Temp, ObjectId::new(id)));
        }

        let (table, id) = rest.strip_suffix(LOB_FILE_SUFFIX)?.split_once('.')?;
        Some((
            FileOwner::Table(TableId::new(table.parse().ok()?)),
            ObjectId::new(id.parse().ok()?),
        ))
    }
}

/// Parses a sharded file name such as `769.t7.lob.db` into owner and object id.
#[must_use]
pub fn parse_sharded_name(name: &str) -> Option<(FileOwner, ObjectId)> {
    let (id, owner) = name.strip_suffix(LOB_FILE_SUFFIX)?.split_once('.')?;
    let id = ObjectId::new(id.parse().ok()?);
    if owner == TEMP_MARKER {
        return Some((FileOwner::Temp, id));
    }
    let table = owner.strip_prefix('t')?.parse().ok()?;
    Some((FileOwner::Table(TableId::new(table)), id))
}

/// Returns the object slot number encoded in a shard directory entry name.
///
/// Files (`769.t7.lob.db`) and nested shard directories (`3.lobs.db`) both
/// start with their number; anything else yields `None`.
fn entry_number(name: &str) -> Option<u32> {
    if !name.ends_with(DB_FILE_SUFFIX) {
        return None;
    }
    let (number, _) = name.split_once('.')?;
    number.parse().ok().filter(|&n| n > 0)
}

fn with_suffix(path: PathBuf, suffix: &str) -> PathBuf {
    let mut name: OsString = path.into_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Hands out object ids for new LOB files.
///
/// Callers must hold the database's LOB lock from allocation until the file
/// for the returned id has been created.
pub trait ObjectIdAllocator: Send + Sync + fmt::Debug {
    /// Returns an object id with no file in the store under `layout` naming.
    ///
    /// # Errors
    ///
    /// Returns `AllocationExhausted` if no free id can be found, or a storage
    /// error if a directory cannot be listed.
    fn allocate(
        &self,
        store: &dyn FileStore,
        locator: &ObjectLocator,
        layout: Layout,
    ) -> LobResult<ObjectId>;
}

/// Allocates ids by scanning shard directories for a free slot.
///
/// Full directories are left for a randomly chosen child shard, so that
/// sessions racing through the same scan rarely pick the same path.
#[derive(Debug, Clone)]
pub struct ShardScanAllocator {
    max_probes: u32,
}

impl ShardScanAllocator {
    /// Creates an allocator that gives up after `max_probes` directories.
    #[must_use]
    pub const fn new(max_probes: u32) -> Self {
        Self { max_probes }
    }

    /// Returns the smallest free slot in `[1, fanout)` of the directory for `object_id`.
    fn free_slot(
        store: &dyn FileStore,
        locator: &ObjectLocator,
        object_id: u32,
    ) -> LobResult<Option<u32>> {
        let fanout = locator.fanout();
        let dir = locator.shard_prefix(ObjectId::new(object_id));

        let mut used = vec![false; fanout as usize];
        let mut entries = 0u32;
        for path in store.list(&dir)? {
            let Some(number) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(entry_number)
            else {
                continue;
            };
            entries += 1;
            used[(number % fanout) as usize] = true;
        }

        if entries >= fanout {
            return Ok(None);
        }
        Ok((1..fanout).find(|&slot| !used[slot as usize]))
    }
}

impl ObjectIdAllocator for ShardScanAllocator {
    fn allocate(
        &self,
        store: &dyn FileStore,
        locator: &ObjectLocator,
        _layout: Layout,
    ) -> LobResult<ObjectId> {
        let fanout = locator.fanout();
        let mut object_id = 0u32;

        for _ in 0..self.max_probes {
            if let Some(slot) = Self::free_slot(store, locator, object_id)? {
                return Ok(ObjectId::new(object_id + slot));
            }

            let dir = rand::thread_rng().gen_range(1..fanout);
            debug!(object_id, dir, "shard directory full, descending");
            object_id = match object_id
                .checked_add(dir)
                .and_then(|id| id.checked_mul(fanout))
            {
                Some(child) => child,
                // The path is as deep as ids allow; only a broken random
                // source gets here.
                None => 0,
            };
        }

        Err(LobError::AllocationExhausted {
            probes: self.max_probes,
        })
    }
}

/// Allocates ids from a counter.
///
/// Made for legacy flat naming, where any id is a valid file name. Under
/// sharded naming it skips ids with a zero lowest digit and ids whose slot is
/// taken in their shard directory.
#[derive(Debug)]
pub struct SequentialAllocator {
    next: AtomicU32,
}

impl SequentialAllocator {
    /// Creates an allocator starting at `first`.
    #[must_use]
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first.max(1)),
        }
    }

    /// Creates an allocator continuing after the highest flat file id on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the database directory cannot be listed.
    pub fn seeded(store: &dyn FileStore, locator: &ObjectLocator) -> LobResult<Self> {
        let highest = store
            .list(&locator.flat_dir())?
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .filter_map(|name| locator.parse_flat_name(name))
            .map(|(_, id)| id.as_u32())
            .max()
            .unwrap_or(0);
        Ok(Self::starting_at(highest.saturating_add(1)))
    }
}

impl SequentialAllocator {
    /// Returns true if a file or shard directory occupies the slot of `id`.
    fn sharded_slot_taken(
        store: &dyn FileStore,
        locator: &ObjectLocator,
        id: ObjectId,
    ) -> LobResult<bool> {
        let fanout = locator.fanout();
        let slot = id.as_u32() % fanout;
        if slot == 0 {
            return Ok(true);
        }
        let prefix = locator.shard_prefix(id);
        let Some(dir) = prefix.parent() else {
            return Ok(false);
        };
        let taken = store
            .list(dir)?
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .filter_map(entry_number)
            .any(|number| number % fanout == slot);
        Ok(taken)
    }
}

impl ObjectIdAllocator for SequentialAllocator {
    fn allocate(
        &self,
        store: &dyn FileStore,
        locator: &ObjectLocator,
        layout: Layout,
    ) -> LobResult<ObjectId> {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id == u32::MAX {
                return Err(LobError::AllocationExhausted { probes: id });
            }
            let id = ObjectId::new(id);
            let taken = match layout {
                Layout::Flat => store.exists(&locator.flat_path(None, id)),
                Layout::Sharded => Self::sharded_slot_taken(store, locator, id)?,
            };
            if !taken {
                return Ok(id);
            }
        }
    }
}
