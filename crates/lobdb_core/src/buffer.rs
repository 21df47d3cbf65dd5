//! Streaming buffer sizing.
//!
//! Whether a value is kept inline or spilled to a file is decided from the
//! first buffered read. The buffer is therefore always larger than the
//! inline threshold whenever more data than the threshold may follow.

/// I/O unit for uncompressed streams.
pub const IO_BUFFER_SIZE: u32 = 4 * 1024;

/// I/O unit for compressed streams.
pub const IO_BUFFER_SIZE_COMPRESS: u32 = 128 * 1024;

/// Returns the next chunk size for a stream with `remaining` units left.
///
/// The result is never larger than `remaining` (clamped to `u32::MAX`) and
/// only zero when `remaining` is zero. When `remaining` exceeds
/// `inplace_threshold`, the result does too.
#[must_use]
pub fn buffer_size(remaining: u64, inplace_threshold: u64, compress: bool) -> u32 {
    let remaining = remaining.min(u64::from(u32::MAX));
    let inplace = if inplace_threshold >= u64::from(u32::MAX) {
        remaining
    } else {
        inplace_threshold
    };

    let mut unit = u64::from(if compress {
        IO_BUFFER_SIZE_COMPRESS
    } else {
        IO_BUFFER_SIZE
    });
    if unit < remaining && unit <= inplace {
        unit = round_up(remaining.min(inplace + 1), u64::from(IO_BUFFER_SIZE));
    }

    // Both operands are at most u32::MAX after the clamp.
    u32::try_from(remaining.min(unit)).unwrap_or(u32::MAX)
}

fn round_up(x: u64, granularity: u64) -> u64 {
    x.div_ceil(granularity).saturating_mul(granularity)
}
