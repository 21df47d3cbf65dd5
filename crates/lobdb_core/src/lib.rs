//! # LobDB Core
//!
//! Large-object storage manager for LobDB.
//!
//! This crate provides:
//! - BLOB and CLOB values kept inline or in files, chosen by size
//! - Streaming creation with optional compression
//! - Sharded file layout with bounded directory fanout
//! - Ownership lifecycle (temp, linked, removed) with auto-delete of temp files
//! - Table-drop sweep and temp file purge
//!
//! ## Example
//!
//! ```rust
//! use lobdb_core::{LobConfig, LobContext, LobState, LobValue, TableId};
//! use lobdb_storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! let ctx = LobContext::open(
//!     "data/orders",
//!     Arc::new(InMemoryStore::new()),
//!     LobConfig::default().inline_threshold(64),
//! )?;
//!
//! let text = "x".repeat(1000);
//! let value = LobValue::create_clob(text.as_bytes(), None, &ctx)?;
//! assert_eq!(value.state(), LobState::Temp);
//!
//! let stored = value.link(&ctx, TableId::new(7))?;
//! assert_eq!(stored.read_string()?, text);
//!
//! ctx.remove_all_for_table(TableId::new(7))?;
//! # Ok::<(), lobdb_core::LobError>(())
//! ```
//!
//! ## Thread Safety
//!
//! [`LobContext`] is shared by all sessions of a database. [`LobValue`] is
//! `Send + Sync`; linked files are immutable and read without locking.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod config;
mod context;
mod error;
mod lifecycle;
mod shard;
mod sweep;
mod types;
mod value;
mod writer;

pub use buffer::{buffer_size, IO_BUFFER_SIZE, IO_BUFFER_SIZE_COMPRESS};
pub use config::LobConfig;
pub use context::LobContext;
pub use error::{LobError, LobResult};
pub use lifecycle::LobState;
pub use shard::{
    parse_sharded_name, FileOwner, ObjectIdAllocator, ObjectLocator, SequentialAllocator,
    ShardScanAllocator, DB_FILE_SUFFIX, FLAT_TEMP_SUFFIX, LOBS_DIRECTORY_SUFFIX, LOB_FILE_SUFFIX,
};
pub use sweep::{Inventory, SweepReport, TableUsage};
pub use types::{Layout, LobKind, ObjectId, TableId};
pub use value::{FileRef, LobValue, Representation, HASH_PRECISION_CAP};

pub use lobdb_storage::CompressionAlgorithm;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
