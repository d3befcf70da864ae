//! # mstream pump
//!
//! The pump engine and the transformation backends built on it.
//!
//! A pump stream wraps one inner stream and runs every byte through a
//! [`PumpBackend`]: a compressor or decompressor, or the text filter.
//!
//! ## Backends
//!
//! - [`Gzip`] - RFC 1952 members (`flate2`)
//! - [`Bzip2`] - bzip2 streams (`bzip2`)
//! - [`Lz4Frame`] - LZ4 frames (`lz4_flex` blocks, `xxhash-rust` checksums)
//! - [`Xz`] - .xz containers (`xz2`)
//! - [`TextCrlf`] - BOM stripping and line ending conversion
//!
//! ## Example
//!
//! ```ignore
//! use mstream_core::{IoWriteStream, StreamConfig, StreamExt};
//! use mstream_pump::gzip_wstream;
//!
//! let file = IoWriteStream::create("out.gz")?;
//! let mut gz = gzip_wstream(Box::new(file), &StreamConfig::default())?;
//! gz.write_str("Hello, compression!")?;
//! gz.close();
//! ```

mod bz2;
mod gzip;
mod lz4;
mod pump;
mod queue;
mod text;
mod xz;

pub use bz2::Bzip2;
pub use gzip::Gzip;
pub use lz4::Lz4Frame;
pub use pump::{
    Progress, Pump, PumpAction, PumpBackend, PumpStream, Step, StepError, GENERIC_FAILURE,
};
pub use text::TextCrlf;
pub use xz::Xz;

use mstream_core::{Compression, Result, Stream, StreamConfig};
use tracing::debug;

/// Minimum staging buffer size allowed.
pub const MIN_BUFFER_SIZE: usize = 4 * 1024;

/// Maximum staging buffer size allowed (16 MiB).
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Clamp a configured staging size to the valid range.
#[inline]
pub fn clamp_buffer_size(size: usize) -> usize {
    size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)
}

fn buffer_size(config: &StreamConfig) -> usize {
    clamp_buffer_size(config.pump_buffer_size)
}

/// Decompress a gzip read stream.
pub fn gzip_rstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<Gzip>> {
    PumpStream::reader(inner, Gzip::decoder(), buffer_size(config))
}

/// Compress a write stream with gzip.
pub fn gzip_wstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<Gzip>> {
    PumpStream::writer(inner, Gzip::encoder(config.compression_level), buffer_size(config))
}

/// Decompress a bzip2 read stream.
pub fn bz2_rstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<Bzip2>> {
    PumpStream::reader(inner, Bzip2::decoder(), buffer_size(config))
}

/// Compress a write stream with bzip2.
pub fn bz2_wstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<Bzip2>> {
    PumpStream::writer(inner, Bzip2::encoder(config.compression_level), buffer_size(config))
}

/// Decompress an LZ4 frame read stream.
pub fn lz4_rstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<Lz4Frame>> {
    PumpStream::reader(inner, Lz4Frame::decoder(), buffer_size(config))
}

/// Compress a write stream into an LZ4 frame.
pub fn lz4_wstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<Lz4Frame>> {
    PumpStream::writer(inner, Lz4Frame::encoder(), buffer_size(config))
}

/// Decompress an xz read stream.
pub fn xz_rstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<Xz>> {
    PumpStream::reader(inner, Xz::decoder()?, buffer_size(config))
}

/// Compress a write stream with xz.
pub fn xz_wstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<Xz>> {
    PumpStream::writer(inner, Xz::encoder(config.compression_level)?, buffer_size(config))
}

/// Text filter for read streams: strip a BOM, turn `\r\n` into `\n`.
pub fn text_rstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<TextCrlf>> {
    let mut s = PumpStream::reader(inner, TextCrlf::decoder(), buffer_size(config))?;
    s.meta_mut().set_binary(false);
    s.meta_mut().set_utf8(true);
    Ok(s)
}

/// Text filter for write streams: turn `\n` into `\r\n`.
pub fn text_wstream(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<PumpStream<TextCrlf>> {
    let mut s = PumpStream::writer(inner, TextCrlf::encoder(), buffer_size(config))?;
    s.meta_mut().set_binary(false);
    Ok(s)
}

/// Decompressing read stream for `compression`.
pub fn compressed_rstream(
    inner: Box<dyn Stream>,
    compression: Compression,
    config: &StreamConfig,
) -> Result<Box<dyn Stream>> {
    debug!(codec = compression.name(), "opening decompressing stream");
    Ok(match compression {
        Compression::Gzip => Box::new(gzip_rstream(inner, config)?),
        Compression::Bzip2 => Box::new(bz2_rstream(inner, config)?),
        Compression::Lz4 => Box::new(lz4_rstream(inner, config)?),
        Compression::Xz => Box::new(xz_rstream(inner, config)?),
    })
}

/// Compressing write stream for `compression`.
pub fn compressed_wstream(
    inner: Box<dyn Stream>,
    compression: Compression,
    config: &StreamConfig,
) -> Result<Box<dyn Stream>> {
    debug!(codec = compression.name(), "opening compressing stream");
    Ok(match compression {
        Compression::Gzip => Box::new(gzip_wstream(inner, config)?),
        Compression::Bzip2 => Box::new(bz2_wstream(inner, config)?),
        Compression::Lz4 => Box::new(lz4_wstream(inner, config)?),
        Compression::Xz => Box::new(xz_wstream(inner, config)?),
    })
}
