//! LOB storage configuration.

use crate::error::{LobError, LobResult};
use crate::types::LobKind;
use lobdb_storage::CompressionAlgorithm;

/// Configuration for the large-object manager of one database.
#[derive(Debug, Clone)]
pub struct LobConfig {
    /// Largest value (bytes for BLOB, characters for CLOB) kept inline.
    pub inline_threshold: u64,

    /// Maximum number of object slots per shard directory.
    pub shard_fanout: u32,

    /// Compression for BLOB files (`None` = uncompressed).
    pub blob_compression: Option<CompressionAlgorithm>,

    /// Compression for CLOB files (`None` = uncompressed).
    pub clob_compression: Option<CompressionAlgorithm>,

    /// Whether new files use the legacy flat naming instead of shard directories.
    pub legacy_flat_naming: bool,

    /// Maximum shard directories probed before allocation gives up.
    pub max_allocation_probes: u32,
}

impl Default for LobConfig {
    fn default() -> Self {
        Self {
            inline_threshold: 128,
            shard_fanout: 256,
            blob_compression: None,
            clob_compression: None,
            legacy_flat_naming: false,
            max_allocation_probes: 1024,
        }
    }
}

impl LobConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inline threshold.
    #[must_use]
    pub const fn inline_threshold(mut self, value: u64) -> Self {
        self.inline_threshold = value;
        self
    }

    /// Sets the shard directory fanout.
    #[must_use]
    pub const fn shard_fanout(mut self, value: u32) -> Self {
        self.shard_fanout = value;
        self
    }

    /// Sets BLOB compression.
    #[must_use]
    pub fn blob_compression(mut self, algorithm: Option<CompressionAlgorithm>) -> Self {
        self.blob_compression = algorithm;
        self
    }

    /// Sets CLOB compression.
    #[must_use]
    pub fn clob_compression(mut self, algorithm: Option<CompressionAlgorithm>) -> Self {
        self.clob_compression = algorithm;
        self
    }

    /// Sets whether new files use legacy flat naming.
    #[must_use]
    pub const fn legacy_flat_naming(mut self, value: bool) -> Self {
        self.legacy_flat_naming = value;
        self
    }

    /// Sets the allocation probe limit.
    #[must_use]
    pub const fn max_allocation_probes(mut self, value: u32) -> Self {
        self.max_allocation_probes = value;
        self
    }

    /// Returns the compression configured for `kind`.
    #[must_use]
    pub fn compression_for(&self, kind: LobKind) -> Option<CompressionAlgorithm> {
        match kind {
            LobKind::Binary => self.blob_compression,
            LobKind::Character => self.clob_compression,
        }
    }

    /// Checks that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedConfiguration` if the fanout is below 2 or the
    /// probe limit is zero.
    pub fn validate(&self) -> LobResult<()> {
        if self.shard_fanout < 2 {
            return Err(LobError::unsupported_configuration(format!(
                "shard fanout must be at least 2, got {}",
                self.shard_fanout
            )));
        }
        if self.max_allocation_probes == 0 {
            return Err(LobError::unsupported_configuration(
                "max_allocation_probes must be positive",
            ));
        }
        Ok(())
    }
}
