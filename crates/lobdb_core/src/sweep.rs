//! Table-drop sweep, temp file purge and LOB area inventory.
//!
//! All three walk the LOB area the same way: the shard tree below
//! `<base>.lobs.db` (unless the database uses legacy flat naming) and the
//! legacy flat files next to the database. Files are recognized by name
//! alone.
//!
//! Sweeps are best-effort. A file or directory that cannot be removed or
//! listed is logged and counted, and the sweep moves on.

use crate::context::LobContext;
use crate::error::LobResult;
use crate::shard::{parse_sharded_name, FileOwner};
use crate::types::{Layout, TableId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files deleted.
    pub removed: u64,
    /// Files or directories skipped because of an error.
    pub failed: u64,
}

/// Files and bytes owned by one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableUsage {
    /// Number of LOB files.
    pub files: u64,
    /// Total file size in bytes.
    pub bytes: u64,
}

/// Summary of the files in a LOB area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Linked files per owning table.
    pub tables: BTreeMap<TableId, TableUsage>,
    /// Number of temp files.
    pub temp_files: u64,
    /// Total size of temp files in bytes.
    pub temp_bytes: u64,
    /// Number of files using legacy flat naming.
    pub flat_files: u64,
    /// Deepest shard directory level holding a file (0 = shard root).
    pub max_depth: u32,
    /// Largest number of files in one shard directory.
    pub max_files_per_directory: u64,
    /// Directories that could not be listed.
    pub unreadable_directories: u64,
}

impl Inventory {
    /// Returns the number of LOB files found.
    #[must_use]
    pub fn total_files(&self) -> u64 {
        self.temp_files + self.tables.values().map(|usage| usage.files).sum::<u64>()
    }

    /// Returns the total size of all LOB files in bytes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.temp_bytes + self.tables.values().map(|usage| usage.bytes).sum::<u64>()
    }
}

/// A LOB file found by a scan.
#[derive(Debug, Clone)]
struct LobFile {
    path: PathBuf,
    owner: FileOwner,
    layout: Layout,
    depth: u32,
}

/// Result of walking the LOB area.
#[derive(Debug, Default)]
struct Scan {
    files: Vec<LobFile>,
    unreadable: u64,
}

impl LobContext {
    /// Deletes every LOB file linked to `table`.
    ///
    /// Values of the table read after the sweep fail with a storage error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the shard root or the database directory
    /// cannot be listed; per-file failures are counted in the report.
    pub fn remove_all_for_table(&self, table: TableId) -> LobResult<SweepReport> {
        let report = self.remove_matching(|owner| owner == FileOwner::Table(table))?;
        info!(
            table = table.as_u32(),
            removed = report.removed,
            failed = report.failed,
            "removed LOB files of dropped table"
        );
        Ok(report)
    }

    /// Deletes every temp LOB file.
    ///
    /// Meant for database open, before any value exists: temp files of live
    /// values are deleted too.
    ///
    /// # Errors
    ///
    /// See [`LobContext::remove_all_for_table`].
    pub fn purge_temp_files(&self) -> LobResult<SweepReport> {
        let report = self.remove_matching(|owner| owner == FileOwner::Temp)?;
        if report.removed > 0 || report.failed > 0 {
            info!(
                removed = report.removed,
                failed = report.failed,
                "purged orphaned LOB temp files"
            );
        }
        Ok(report)
    }

    /// Counts the LOB files of the database.
    ///
    /// # Errors
    ///
    /// Returns an error if a root directory cannot be listed or a file size
    /// cannot be read.
    pub fn inventory(&self) -> LobResult<Inventory> {
        let scan = self.scan()?;
        let mut inventory = Inventory {
            unreadable_directories: scan.unreadable,
            ..Inventory::default()
        };
        let mut per_directory: HashMap<&Path, u64> = HashMap::new();

        for file in &scan.files {
            let size = self.store().size(&file.path)?;
            match file.owner {
                FileOwner::Table(table) => {
                    let usage = inventory.tables.entry(table).or_default();
                    usage.files += 1;
                    usage.bytes += size;
                }
                FileOwner::Temp => {
                    inventory.temp_files += 1;
                    inventory.temp_bytes += size;
                }
            }
            match file.layout {
                Layout::Flat => inventory.flat_files += 1,
                Layout::Sharded => {
                    inventory.max_depth = inventory.max_depth.max(file.depth);
                    if let Some(dir) = file.path.parent() {
                        *per_directory.entry(dir).or_default() += 1;
                    }
                }
            }
        }
        inventory.max_files_per_directory = per_directory.values().copied().max().unwrap_or(0);
        Ok(inventory)
    }

    fn remove_matching(&self, select: impl Fn(FileOwner) -> bool) -> LobResult<SweepReport> {
        let scan = self.scan()?;
        let mut report = SweepReport {
            failed: scan.unreadable,
            ..SweepReport::default()
        };

        for file in scan.files.iter().filter(|file| select(file.owner)) {
            let _guard = self.lock();
            match self.store().delete(&file.path) {
                Ok(true) => {
                    report.removed += 1;
                    debug!(path = %file.path.display(), "removed LOB file");
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(path = %file.path.display(), error = %e, "failed to remove LOB file");
                }
            }
        }
        Ok(report)
    }

    fn scan(&self) -> LobResult<Scan> {
        let mut scan = Scan::default();
        if self.layout() == Layout::Sharded {
            self.scan_shards(&mut scan)?;
        }
        self.scan_flat(&mut scan)?;
        Ok(scan)
    }

    fn scan_shards(&self, scan: &mut Scan) -> LobResult<()> {
        let store = self.store();
        let mut pending = vec![(self.locator().shard_root(), 0u32)];

        while let Some((dir, depth)) = pending.pop() {
            let entries = match store.list(&dir) {
                Ok(entries) => entries,
                Err(e) if depth == 0 => return Err(e.into()),
                Err(e) => {
                    scan.unreadable += 1;
                    warn!(path = %dir.display(), error = %e, "failed to list LOB shard directory");
                    continue;
                }
            };
            for path in entries {
                if store.is_dir(&path) {
                    pending.push((path, depth + 1));
                    continue;
                }
                let Some((owner, _)) = file_name(&path).and_then(parse_sharded_name) else {
                    continue;
                };
                scan.files.push(LobFile {
                    path,
                    owner,
                    layout: Layout::Sharded,
                    depth,
                });
            }
        }
        Ok(())
    }

    fn scan_flat(&self, scan: &mut Scan) -> LobResult<()> {
        let locator = self.locator();
        for path in self.store().list(&locator.flat_dir())? {
            let Some((owner, _)) = file_name(&path).and_then(|name| locator.parse_flat_name(name))
            else {
                continue;
            };
            if self.store().is_dir(&path) {
                continue;
            }
            scan.files.push(LobFile {
                path,
                owner,
                layout: Layout::Flat,
                depth: 0,
            });
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}
