//! Per-block compression for v2 block streams.
//!
//! Each block is compressed on its own, with no state carried between
//! blocks: raw Snappy (`snap::raw`) or a raw LZ4 block (`lz4_flex::block`).

use lz4_flex::block::{compress_into, decompress_into, get_maximum_output_size};
use mstream_core::{CompressionMethod, Error, Result};

/// Block compressor/decompressor for one method.
pub(crate) struct BlockCodec {
    method: CompressionMethod,
    snappy_enc: snap::raw::Encoder,
    snappy_dec: snap::raw::Decoder,
}

impl BlockCodec {
    pub(crate) fn new(method: CompressionMethod) -> Self {
        BlockCodec {
            method,
            snappy_enc: snap::raw::Encoder::new(),
            snappy_dec: snap::raw::Decoder::new(),
        }
    }

    pub(crate) fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Worst-case compressed size of a block of `capacity` bytes; 0 when
    /// blocks travel uncompressed.
    pub(crate) fn bound(&self, capacity: usize) -> usize {
        match self.method {
            CompressionMethod::None => 0,
            CompressionMethod::Snappy => snap::raw::max_compress_len(capacity),
            CompressionMethod::Lz4 => get_maximum_output_size(capacity),
        }
    }

    /// Compress `src` into `dst`, returning the compressed length.
    pub(crate) fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        match self.method {
            CompressionMethod::None => {
                dst[..src.len()].copy_from_slice(src);
                Ok(src.len())
            }
            CompressionMethod::Snappy => self
                .snappy_enc
                .compress(src, dst)
                .map_err(|e| Error::write(format!("snappy: compress failed: {e}"))),
            CompressionMethod::Lz4 => compress_into(src, dst)
                .map_err(|e| Error::write(format!("lz4: compress failed: {e}"))),
        }
    }

    /// Decompress `src` into `dst`, returning the decompressed length.
    /// Output that would not fit in `dst` is an error.
    pub(crate) fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        match self.method {
            CompressionMethod::None => {
                if src.len() > dst.len() {
                    return Err(Error::protocol(format!(
                        "block of {} bytes exceeds buffer of {}",
                        src.len(),
                        dst.len()
                    )));
                }
                dst[..src.len()].copy_from_slice(src);
                Ok(src.len())
            }
            CompressionMethod::Snappy => self
                .snappy_dec
                .decompress(src, dst)
                .map_err(|e| Error::read(format!("snappy: uncompress failed: {e}"))),
            CompressionMethod::Lz4 => decompress_into(src, dst)
                .map_err(|e| Error::read(format!("lz4: uncompress failed: {e}"))),
        }
    }
}
