//! Streaming creation of LOB values.
//!
//! A source is read in chunks sized by [`buffer_size`]. The first chunk
//! decides the representation: if it holds no more than the inline threshold
//! the value stays in memory, otherwise a temp file is created and the rest
//! of the source is streamed into it.
//!
//! BLOB sources are counted in bytes. CLOB sources are UTF-8 byte streams
//! counted in characters; chunks always end on a character boundary.

use crate::buffer::{buffer_size, IO_BUFFER_SIZE};
use crate::context::LobContext;
use crate::error::{LobError, LobResult};
use crate::types::LobKind;
use crate::value::{FileRef, LobValue, Representation};
use lobdb_storage::{CompressingWriter, CompressionAlgorithm, WriteHandle};
use std::io::{self, Cursor, Read, Write};
use tracing::debug;

/// A source read in units: bytes for BLOBs, characters for CLOBs.
trait ChunkSource {
    /// Appends up to `units` units to `buf` and returns how many were read.
    ///
    /// Fewer than `units` are returned only at the end of the source.
    fn read_units(&mut self, units: u32, buf: &mut Vec<u8>) -> LobResult<u64>;
}

struct ByteSource<R>(R);

impl<R: Read> ChunkSource for ByteSource<R> {
    fn read_units(&mut self, units: u32, buf: &mut Vec<u8>) -> LobResult<u64> {
        let start = buf.len();
        (&mut self.0).take(u64::from(units)).read_to_end(buf)?;
        Ok((buf.len() - start) as u64)
    }
}

/// Splits a UTF-8 byte stream into characters.
struct CharSource<R> {
    inner: R,
    pending: Vec<u8>,
}

impl<R: Read> CharSource<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    fn fill(&mut self) -> LobResult<usize> {
        let mut chunk = [0u8; IO_BUFFER_SIZE as usize];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(read) => {
                    self.pending.extend_from_slice(&chunk[..read]);
                    return Ok(read);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<R: Read> ChunkSource for CharSource<R> {
    fn read_units(&mut self, units: u32, buf: &mut Vec<u8>) -> LobResult<u64> {
        let units = u64::from(units);
        let mut count = 0u64;

        while count < units {
            let mut pos = 0;
            while count < units && pos < self.pending.len() {
                let width = utf8_width(self.pending[pos])
                    .ok_or_else(|| LobError::corruption("invalid UTF-8 in CLOB source"))?;
                let Some(encoded) = self.pending.get(pos..pos + width) else {
                    break;
                };
                if std::str::from_utf8(encoded).is_err() {
                    return Err(LobError::corruption("invalid UTF-8 in CLOB source"));
                }
                buf.extend_from_slice(encoded);
                pos += width;
                count += 1;
            }
            self.pending.drain(..pos);

            if count < units && self.fill()? == 0 {
                if !self.pending.is_empty() {
                    return Err(LobError::corruption(
                        "CLOB source ends inside a UTF-8 sequence",
                    ));
                }
                break;
            }
        }
        Ok(count)
    }
}

/// Returns the encoded length announced by a UTF-8 leading byte.
fn utf8_width(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7f => Some(1),
        0xc2..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf4 => Some(4),
        _ => None,
    }
}

impl LobValue {
    /// Creates a BLOB from a byte stream.
    ///
    /// `declared_length` is a hint: at most that many bytes are read, and the
    /// precision of the result is the number actually transferred.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the source or writing the file fails; a
    /// partially written temp file is removed before the error is returned.
    pub fn create_blob<R: Read>(
        source: R,
        declared_length: Option<u64>,
        ctx: &LobContext,
    ) -> LobResult<Self> {
        Self::create(LobKind::Binary, source, declared_length, ctx)
    }

    /// Creates a CLOB from a UTF-8 byte stream; `declared_length` counts characters.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` for malformed UTF-8, otherwise as [`LobValue::create_blob`].
    pub fn create_clob<R: Read>(
        source: R,
        declared_length: Option<u64>,
        ctx: &LobContext,
    ) -> LobResult<Self> {
        Self::create(LobKind::Character, source, declared_length, ctx)
    }

    /// Creates a value of `kind` from a stream.
    ///
    /// # Errors
    ///
    /// See [`LobValue::create_blob`] and [`LobValue::create_clob`].
    pub fn create<R: Read>(
        kind: LobKind,
        source: R,
        declared_length: Option<u64>,
        ctx: &LobContext,
    ) -> LobResult<Self> {
        match kind {
            LobKind::Binary => Self::create_from(kind, &mut ByteSource(source), declared_length, ctx),
            LobKind::Character => {
                Self::create_from(kind, &mut CharSource::new(source), declared_length, ctx)
            }
        }
    }

    fn create_from(
        kind: LobKind,
        source: &mut dyn ChunkSource,
        declared_length: Option<u64>,
        ctx: &LobContext,
    ) -> LobResult<Self> {
        let threshold = ctx.config().inline_threshold;
        let compression = ctx.config().compression_for(kind);
        let remaining = declared_length.unwrap_or(u64::MAX);

        let mut first = Vec::new();
        let size = buffer_size(remaining, threshold, compression.is_some());
        let first_count = source.read_units(size, &mut first)?;

        if first_count <= threshold {
            return Ok(Self::from_parts(
                kind,
                first_count,
                Representation::Inline {
                    data: first.into(),
                    table: None,
                },
            ));
        }

        let (object_id, file, handle) = ctx.create_temp()?;
        // On error `file` is dropped with auto-delete armed, removing the partial file.
        let rest = write_file(
            source,
            handle,
            &first,
            remaining - first_count,
            threshold,
            compression,
        )?;
        let precision = first_count + rest;

        debug!(
            object_id = object_id.as_u32(),
            kind = %kind,
            precision,
            compressed = compression.is_some(),
            "stored LOB in temp file"
        );

        Ok(Self::from_parts(
            kind,
            precision,
            Representation::FileBacked(FileRef {
                object_id,
                table: None,
                compressed: compression.is_some(),
                layout: ctx.layout(),
                file,
            }),
        ))
    }

    /// Converts the value to `target`, re-materializing its content.
    ///
    /// BLOB bytes are decoded as UTF-8 into a CLOB; CLOB characters are
    /// encoded as UTF-8 into a BLOB. The result is unlinked.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if a BLOB is not valid UTF-8, or any error of
    /// reading this value or creating the new one.
    pub fn convert(&self, target: LobKind, ctx: &LobContext) -> LobResult<Self> {
        if self.kind == target {
            return Ok(self.clone());
        }
        Self::create(target, self.reader()?, None, ctx)
    }

    /// Moves an inline value larger than the current inline threshold to a file.
    ///
    /// A value stamped with a table is linked to that table. Values that
    /// fit, and file-backed values, are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns any error of creating or linking the file.
    pub fn spill_if_oversized(&self, ctx: &LobContext) -> LobResult<Self> {
        let Representation::Inline { data, table } = &self.repr else {
            return Ok(self.clone());
        };
        if self.precision <= ctx.config().inline_threshold {
            return Ok(self.clone());
        }

        let spilled = Self::create(
            self.kind,
            Cursor::new(&data[..]),
            Some(self.precision),
            ctx,
        )?;
        match table {
            Some(table) => spilled.link(ctx, *table),
            None => Ok(spilled),
        }
    }
}

fn write_file(
    source: &mut dyn ChunkSource,
    handle: WriteHandle,
    first: &[u8],
    mut remaining: u64,
    threshold: u64,
    compression: Option<CompressionAlgorithm>,
) -> LobResult<u64> {
    let mut out = CompressingWriter::new(handle, compression)?;
    out.write_all(first)?;

    let mut transferred = 0u64;
    let mut buf = Vec::new();
    loop {
        let size = buffer_size(remaining, threshold, compression.is_some());
        if size == 0 {
            break;
        }
        buf.clear();
        let count = source.read_units(size, &mut buf)?;
        if count == 0 {
            break;
        }
        out.write_all(&buf)?;
        transferred += count;
        remaining -= count;
    }

    out.finish()?;
    Ok(transferred)
}
