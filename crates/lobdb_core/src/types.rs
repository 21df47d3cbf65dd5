//! Core type definitions for LobDB.

use std::fmt;

/// Identifier of the table owning a linked LOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub u32);

impl TableId {
    /// Creates a new table ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table:{}", self.0)
    }
}

/// Identifier of a LOB object; selects its place in the shard tree.
///
/// Object ID 0 is never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Creates a new object ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lob:{}", self.0)
    }
}

/// Type of a large object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobKind {
    /// Binary large object; precision counts bytes.
    Binary,
    /// Character large object stored as UTF-8; precision counts characters.
    Character,
}

impl LobKind {
    /// Returns the SQL type name.
    #[must_use]
    pub const fn sql_name(self) -> &'static str {
        match self {
            Self::Binary => "BLOB",
            Self::Character => "CLOB",
        }
    }
}

impl fmt::Display for LobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// File naming scheme of a file-backed LOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Files spread over a bounded-fanout directory tree.
    Sharded,
    /// Legacy naming: every file next to the database file.
    Flat,
}
