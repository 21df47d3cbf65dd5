//! # LobDB Storage
//!
//! File store abstraction and compression adapters for LobDB.
//!
//! This crate provides the lowest-level storage abstraction used by the
//! large-object manager. File stores are **opaque byte stores** addressed by
//! path - they do not interpret the data they hold.
//!
//! ## Design Principles
//!
//! - Stores expose whole-file operations (create, read, rename, copy, delete, list)
//! - No knowledge of LOB naming, sharding or object ids
//! - Must be `Send + Sync` for concurrent access
//! - Callers serialize mutations; stores do not lock across operations
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral databases
//! - [`DiskStore`] - For persistent storage using OS file APIs
//!
//! Streams can be wrapped with [`CompressingWriter`] and
//! [`decompressing_reader`] for transparent compression.
//!
//! ## Example
//!
//! ```rust
//! use lobdb_storage::{FileStore, InMemoryStore};
//! use std::io::{Read, Write};
//! use std::path::Path;
//!
//! let store = InMemoryStore::new();
//! let mut out = store.create(Path::new("db.lobs.db/1.temp.lob.db")).unwrap();
//! out.write_all(b"hello world").unwrap();
//! drop(out);
//!
//! let mut data = Vec::new();
//! store
//!     .open_read(Path::new("db.lobs.db/1.temp.lob.db"))
//!     .unwrap()
//!     .read_to_end(&mut data)
//!     .unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compress;
mod error;
mod file;
mod memory;
mod store;

pub use compress::{decompressing_reader, CompressingWriter, CompressionAlgorithm};
pub use error::{StorageError, StorageResult};
pub use file::DiskStore;
pub use memory::InMemoryStore;
pub use store::{FileStore, ReadHandle, WriteHandle};
