//! Compression adapters for file store streams.
//!
//! A compressed stream starts with a one-byte algorithm tag followed by the
//! algorithm's own framing:
//!
//! ```text
//! [tag: u8][compressed payload...]
//! ```
//!
//! - `tag = 0x01` -> zstd frames
//!
//! The tag lets a reader decode a stream without knowing which algorithm was
//! configured when it was written.

use crate::error::{StorageError, StorageResult};
use crate::store::{ReadHandle, WriteHandle};
use std::io::{self, Read, Write};

/// Default zstd compression level.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

const TAG_ZSTD: u8 = 0x01;

/// Compression algorithms available for LOB streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// Zstandard with the given compression level.
    Zstd {
        /// Compression level passed to the encoder.
        level: i32,
    },
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        Self::zstd()
    }
}

impl CompressionAlgorithm {
    /// Zstandard at the default level.
    #[must_use]
    pub const fn zstd() -> Self {
        Self::Zstd {
            level: DEFAULT_ZSTD_LEVEL,
        }
    }

    /// Returns the stream tag byte written before the payload.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Zstd { .. } => TAG_ZSTD,
        }
    }
}

enum Sink {
    Plain(WriteHandle),
    Zstd(zstd::stream::write::Encoder<'static, WriteHandle>),
}

/// A write handle that optionally compresses everything written to it.
///
/// [`CompressingWriter::finish`] must be called to complete the stream;
/// dropping the writer without finishing leaves a truncated compressed
/// stream behind.
pub struct CompressingWriter {
    sink: Sink,
}

impl CompressingWriter {
    /// Wraps `inner`, compressing with `algorithm` when one is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag byte cannot be written or the encoder
    /// cannot be created.
    pub fn new(
        mut inner: WriteHandle,
        algorithm: Option<CompressionAlgorithm>,
    ) -> StorageResult<Self> {
        let sink = match algorithm {
            None => Sink::Plain(inner),
            Some(algorithm @ CompressionAlgorithm::Zstd { level }) => {
                inner.write_all(&[algorithm.tag()])?;
                let encoder = zstd::stream::write::Encoder::new(inner, level)
                    .map_err(|e| StorageError::Compression(e.to_string()))?;
                Sink::Zstd(encoder)
            }
        };
        Ok(Self { sink })
    }

    /// Returns true if written data is compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        matches!(self.sink, Sink::Zstd(_))
    }

    /// Completes the stream and flushes the underlying handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the final frame or the flush fails.
    pub fn finish(self) -> StorageResult<()> {
        match self.sink {
            Sink::Plain(mut inner) => inner.flush()?,
            Sink::Zstd(encoder) => {
                let mut inner = encoder
                    .finish()
                    .map_err(|e| StorageError::Compression(e.to_string()))?;
                inner.flush()?;
            }
        }
        Ok(())
    }
}

impl Write for CompressingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Plain(inner) => inner.write(buf),
            Sink::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Plain(inner) => inner.flush(),
            Sink::Zstd(encoder) => encoder.flush(),
        }
    }
}

/// Wraps `inner` in a decoder when the stream was written compressed.
///
/// # Errors
///
/// Returns an error if the tag byte is missing or names an unknown algorithm.
pub fn decompressing_reader(mut inner: ReadHandle, compressed: bool) -> StorageResult<ReadHandle> {
    if !compressed {
        return Ok(inner);
    }

    let mut tag = [0u8; 1];
    inner.read_exact(&mut tag).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StorageError::Compression("compressed stream has no algorithm tag".into())
        } else {
            StorageError::Io(e)
        }
    })?;

    match tag[0] {
        TAG_ZSTD => {
            let decoder = zstd::stream::read::Decoder::new(inner)
                .map_err(|e| StorageError::Compression(e.to_string()))?;
            Ok(Box::new(decoder))
        }
        other => Err(StorageError::UnknownCompression(other)),
    }
}
