//! Ownership transitions of LOB values.
//!
//! ```text
//!            link                  close / table drop
//!   Temp ───────────────▶ Linked ─────────────────────▶ Removed
//!     ▲                     │
//!     └──────── unlink ─────┘
//! ```
//!
//! Small (inline) values have no file; linking only stamps their owner.
//! Every transition that creates, renames, copies or deletes a file runs in
//! one critical section of the context's LOB lock.

use crate::context::LobContext;
use crate::error::LobResult;
use crate::types::TableId;
use crate::value::{BackingFile, FileRef, LobValue, Representation};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state of a value handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobState {
    /// Inline value without a file.
    Small,
    /// File without a durable owner; removed when the last handle is dropped.
    Temp,
    /// File owned by a table.
    Linked,
    /// File closed, or moved by a transition of another handle.
    Removed,
}

impl fmt::Display for LobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Small => "small",
            Self::Temp => "temp",
            Self::Linked => "linked",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

impl LobValue {
    /// Returns the lifecycle state of this handle.
    #[must_use]
    pub fn state(&self) -> LobState {
        match &self.repr {
            Representation::Inline { .. } => LobState::Small,
            Representation::FileBacked(file) if file.file.is_retired() => LobState::Removed,
            Representation::FileBacked(file) if file.table.is_some() => LobState::Linked,
            Representation::FileBacked(_) => LobState::Temp,
        }
    }

    fn with_file(&self, file: FileRef) -> Self {
        let mut value = self.clone();
        value.repr = Representation::FileBacked(file);
        value
    }

    /// Makes `table` the owner of the value's content.
    ///
    /// - Small: the value is stamped with `table`.
    /// - Temp: the file is renamed to its linked name and no longer auto-deleted.
    ///   This handle, and every clone of it, is retired.
    /// - Linked to `table`: returned unchanged.
    /// - Linked to another table: the file is copied under a new object id,
    ///   so that both tables own an independent file.
    ///
    /// # Errors
    ///
    /// Returns `UseAfterClose` for a retired handle, `UnsupportedConfiguration`
    /// for a sharded value in a flat-mode database, or any storage error. A
    /// partially copied file is removed before the error is returned.
    pub fn link(&self, ctx: &LobContext, table: TableId) -> LobResult<Self> {
        let file = match &self.repr {
            Representation::Inline { data, table: owner } => {
                if *owner == Some(table) {
                    return Ok(self.clone());
                }
                let mut value = self.clone();
                value.repr = Representation::Inline {
                    data: Arc::clone(data),
                    table: Some(table),
                };
                return Ok(value);
            }
            Representation::FileBacked(file) => file,
        };
        file.file.ensure_live()?;
        ctx.check_layout(file.layout)?;

        match file.table {
            Some(owner) if owner == table => Ok(self.clone()),
            Some(_) => self.copy_to(ctx, file, table),
            None => self.move_to(ctx, file, table),
        }
    }

    fn move_to(&self, ctx: &LobContext, file: &FileRef, table: TableId) -> LobResult<Self> {
        let target = ctx.path_for(file.layout, Some(table), file.object_id);
        {
            let _guard = ctx.lock();
            file.file.ensure_live()?;
            ctx.store().rename(file.path(), &target)?;
            file.file.retire();
        }
        debug!(
            object_id = file.object_id.as_u32(),
            table = table.as_u32(),
            "linked LOB"
        );

        Ok(self.with_file(FileRef {
            table: Some(table),
            file: BackingFile::new(ctx, target, false),
            ..file.clone()
        }))
    }

    fn copy_to(&self, ctx: &LobContext, file: &FileRef, table: TableId) -> LobResult<Self> {
        let layout = ctx.layout();
        let (object_id, target) = {
            let guard = ctx.lock();
            file.file.ensure_live()?;
            let object_id = ctx.allocate_object_id(&guard)?;
            let target = ctx.path_for(layout, Some(table), object_id);
            if let Err(e) = ctx.store().copy(file.path(), &target) {
                if let Err(cleanup) = ctx.store().delete(&target) {
                    warn!(path = %target.display(), error = %cleanup, "failed to remove partial LOB copy");
                }
                return Err(e.into());
            }
            (object_id, target)
        };
        debug!(
            from = file.object_id.as_u32(),
            to = object_id.as_u32(),
            table = table.as_u32(),
            "copied LOB to new owner"
        );

        Ok(self.with_file(FileRef {
            object_id,
            table: Some(table),
            compressed: file.compressed,
            layout,
            file: BackingFile::new(ctx, target, false),
        }))
    }

    /// Releases the table's ownership of the value's file.
    ///
    /// The file is renamed to its temp name and removed again when the last
    /// handle of the returned value is dropped, unless it is linked first.
    /// Small and temp values are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `UseAfterClose` for a retired handle, `UnsupportedConfiguration`
    /// for a sharded value in a flat-mode database, or any storage error.
    pub fn unlink(&self, ctx: &LobContext) -> LobResult<Self> {
        let Representation::FileBacked(file) = &self.repr else {
            return Ok(self.clone());
        };
        file.file.ensure_live()?;
        ctx.check_layout(file.layout)?;
        if file.table.is_none() {
            return Ok(self.clone());
        }

        // Values predating sharding keep their flat naming.
        let temp = ctx.path_for(file.layout, None, file.object_id);
        {
            let _guard = ctx.lock();
            file.file.ensure_live()?;
            if ctx.store().delete(&temp)? {
                debug!(path = %temp.display(), "removed stale LOB temp file");
            }
            ctx.store().rename(file.path(), &temp)?;
            file.file.retire();
        }
        debug!(object_id = file.object_id.as_u32(), "unlinked LOB");

        Ok(self.with_file(FileRef {
            table: None,
            file: BackingFile::new(ctx, temp, true),
            ..file.clone()
        }))
    }

    /// Deletes the value's file; idempotent.
    ///
    /// Small values have nothing to delete. Once closed, reads through any
    /// handle of the file fail with `UseAfterClose`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be deleted; the handle
    /// stays usable in that case.
    pub fn close(&self, ctx: &LobContext) -> LobResult<()> {
        let Representation::FileBacked(file) = &self.repr else {
            return Ok(());
        };
        let _guard = ctx.lock();
        if file.file.is_retired() {
            return Ok(());
        }
        ctx.store().delete(file.path())?;
        file.file.retire();
        debug!(path = %file.path().display(), "closed LOB");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LobConfig;
    use crate::error::LobError;
    use crate::types::ObjectId;
    use lobdb_storage::{FileStore, InMemoryStore};
    use std::path::Path;

    fn context(store: Arc<InMemoryStore>) -> LobContext {
        LobContext::open("db/test", store, LobConfig::default().inline_threshold(8)).unwrap()
    }

    fn blob(ctx: &LobContext, len: usize) -> LobValue {
        LobValue::create_blob(&vec![3u8; len][..], None, ctx).unwrap()
    }

    #[test]
    fn link_renames_temp_file() {
        let store = Arc::new(InMemoryStore::new());
        let ctx = context(store.clone());
        let temp = blob(&ctx, 32);
        assert_eq!(temp.state(), LobState::Temp);

        let linked = temp.link(&ctx, TableId::new(7)).unwrap();
        assert_eq!(linked.state(), LobState::Linked);
        assert_eq!(temp.state(), LobState::Removed);
        assert_eq!(
            linked.path().unwrap(),
            Path::new("db/test.lobs.db/1.t7.lob.db")
        );
        assert!(!store.exists(Path::new("db/test.lobs.db/1.temp.lob.db")));

        // Dropping the retired temp handle must not delete the linked file
        drop(temp);
        assert!(store.exists(linked.path().unwrap()));
        assert_eq!(linked.read_bytes().unwrap(), vec![3u8; 32]);
    }

    #[test]
    fn link_is_idempotent() {
        let ctx = context(Arc::new(InMemoryStore::new()));
        let linked = blob(&ctx, 32).link(&ctx, TableId::new(2)).unwrap();
        let again = linked.link(&ctx, TableId::new(2)).unwrap();
        assert_eq!(again.path(), linked.path());
        assert_eq!(again.object_id(), linked.object_id());
        assert_eq!(linked.state(), LobState::Linked);
    }

    #[test]
    fn link_to_other_table_copies() {
        let store = Arc::new(InMemoryStore::new());
        let ctx = context(store.clone());
        let first = blob(&ctx, 32).link(&ctx, TableId::new(1)).unwrap();
        let second = first.link(&ctx, TableId::new(2)).unwrap();

        assert_ne!(first.object_id(), second.object_id());
        assert_eq!(store.file_count(), 2);

        first.close(&ctx).unwrap();
        assert_eq!(second.read_bytes().unwrap(), vec![3u8; 32]);
    }

    #[test]
    fn small_values_are_stamped() {
        let ctx = context(Arc::new(InMemoryStore::new()));
        let small = LobValue::inline_binary(vec![1, 2]);
        let linked = small.link(&ctx, TableId::new(5)).unwrap();
        assert_eq!(linked.state(), LobState::Small);
        assert_eq!(linked.table_id(), Some(TableId::new(5)));
        assert_eq!(small.table_id(), None);
        assert!(linked.unlink(&ctx).unwrap().is_inline());
        assert!(linked.close(&ctx).is_ok());
    }

    #[test]
    fn unlink_rearms_auto_delete() {
        let store = Arc::new(InMemoryStore::new());
        let ctx = context(store.clone());
        let linked = blob(&ctx, 32).link(&ctx, TableId::new(3)).unwrap();

        let unlinked = linked.unlink(&ctx).unwrap();
        assert!(unlinked.is_auto_delete());
        assert!(matches!(
            linked.read_bytes(),
            Err(LobError::UseAfterClose { .. })
        ));

        drop(unlinked);
        assert_eq!(store.file_count(), 0);
    }

    #[test]
    fn unlink_replaces_stale_temp_file() {
        let store = Arc::new(InMemoryStore::new());
        let ctx = context(store.clone());
        let linked = blob(&ctx, 32).link(&ctx, TableId::new(3)).unwrap();
        let temp_path = ctx.path_for(ctx.layout(), None, linked.object_id().unwrap());
        store.create(&temp_path).unwrap();

        let unlinked = linked.unlink(&ctx).unwrap();
        assert_eq!(unlinked.path().unwrap(), temp_path);
        assert_eq!(unlinked.read_bytes().unwrap(), vec![3u8; 32]);
    }

    #[test]
    fn close_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let ctx = context(store.clone());
        let linked = blob(&ctx, 32).link(&ctx, TableId::new(3)).unwrap();

        linked.close(&ctx).unwrap();
        linked.close(&ctx).unwrap();
        assert_eq!(store.file_count(), 0);
        assert_eq!(linked.state(), LobState::Removed);
        assert!(matches!(
            linked.link(&ctx, TableId::new(4)),
            Err(LobError::UseAfterClose { .. })
        ));
    }

    #[test]
    fn flat_values_keep_flat_names() {
        let store = Arc::new(InMemoryStore::new());
        let flat_ctx = LobContext::open(
            "db/test",
            store.clone(),
            LobConfig::default().inline_threshold(8).legacy_flat_naming(true),
        )
        .unwrap();
        let linked = blob(&flat_ctx, 32).link(&flat_ctx, TableId::new(6)).unwrap();
        assert_eq!(linked.path().unwrap(), Path::new("db/test.6.1.lob.db"));

        // The same file used from a database opened with sharding
        let ctx = context(store.clone());
        let reopened = LobValue::open(
            &ctx,
            crate::types::LobKind::Binary,
            TableId::new(6),
            ObjectId::new(1),
            32,
            false,
        )
        .unwrap();
        assert_eq!(reopened.path().unwrap(), Path::new("db/test.6.1.lob.db"));
        let unlinked = reopened.unlink(&ctx).unwrap();
        assert_eq!(unlinked.path().unwrap(), Path::new("db/test.1.temp.db"));
        assert_eq!(unlinked.read_bytes().unwrap().len(), 32);
        drop(linked);
    }

    #[test]
    fn sharded_values_rejected_in_flat_mode() {
        let store = Arc::new(InMemoryStore::new());
        let ctx = context(store.clone());
        let value = blob(&ctx, 32);
        let flat_ctx = LobContext::open(
            "db/test",
            store,
            LobConfig::default().legacy_flat_naming(true),
        )
        .unwrap();
        assert!(matches!(
            value.link(&flat_ctx, TableId::new(1)),
            Err(LobError::UnsupportedConfiguration { .. })
        ));
    }
}
