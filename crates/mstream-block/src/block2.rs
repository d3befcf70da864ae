//! Block framing, version 2.
//!
//! Same message discipline as v1 with a wider header and optional
//! per-block compression:
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────────────┐
//! │ i64 LE: len << 1 | final │ len bytes, compressed if enabled │
//! └──────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! With compression enabled `len` is the compressed size; the receiver
//! decompresses each block before handing bytes out.

use mstream_core::{
    CompressionMethod, Error, FlushLevel, Result, Stream, StreamConfig, StreamExt, StreamMeta,
};
use tracing::{debug, trace};

use crate::block::BlockStream;
use crate::codec::BlockCodec;

/// Large-block framing with optional Snappy or LZ4 compression.
pub struct BlockStream2 {
    meta: StreamMeta,
    inner: Box<dyn Stream>,
    buf: Vec<u8>,
    /// Compressed form of the current block; empty without compression.
    compbuf: Vec<u8>,
    codec: BlockCodec,
    fill: usize,
    remaining: usize,
    readpos: usize,
    pending_final: bool,
    blocks: u64,
    bytes: u64,
}

impl BlockStream2 {
    /// Frame `inner` with blocks of `capacity` bytes compressed by
    /// `method`.
    pub fn new(
        mut inner: Box<dyn Stream>,
        capacity: usize,
        method: CompressionMethod,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::open(format!("{}: block size must be positive", inner.name())));
        }
        let meta = StreamMeta::wrapping(inner.as_ref()).binary();
        inner.set_swap_bytes(cfg!(target_endian = "big"));
        let codec = BlockCodec::new(method);
        let compbuf = vec![0; codec.bound(capacity)];
        debug!(
            stream = %meta.name(),
            access = meta.access().name(),
            capacity,
            compression = method.name(),
            "block stream v2 created"
        );
        Ok(BlockStream2 {
            meta,
            inner,
            buf: vec![0; capacity],
            compbuf,
            codec,
            fill: 0,
            remaining: 0,
            readpos: 0,
            pending_final: false,
            blocks: 0,
            bytes: 0,
        })
    }

    /// Frame `inner` with the v2 settings from `config`.
    pub fn from_config(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<Self> {
        Self::new(inner, config.block2_size, config.block2_compression)
    }

    /// Switch a connection from v1 to v2 framing: the v1 layer is dropped
    /// and its transport reused.
    pub fn from_block_stream(
        bs: BlockStream,
        capacity: usize,
        method: CompressionMethod,
    ) -> Result<Self> {
        Self::new(bs.into_inner(), capacity, method)
    }

    /// Payload capacity of one block.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Per-block compression method.
    pub fn compression(&self) -> CompressionMethod {
        self.codec.method()
    }

    /// Blocks written or read so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Uncompressed payload bytes written or read so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Replace the block buffers with ones of `capacity` bytes. Unread and
    /// unwritten data is discarded.
    pub fn resize_buffer(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(Error::open(format!("{}: block size must be positive", self.meta.name())));
        }
        self.buf = vec![0; capacity];
        self.compbuf = vec![0; self.codec.bound(capacity)];
        self.fill = 0;
        self.reset();
        Ok(())
    }

    /// Forget the current inbound block.
    pub fn reset(&mut self) {
        self.remaining = 0;
        self.readpos = 0;
        self.pending_final = false;
    }

    /// Unread part of the current inbound block.
    pub fn buffer(&self) -> &[u8] {
        &self.buf[self.readpos..self.readpos + self.remaining]
    }

    /// The whole outgoing block buffer, for callers that serialize in
    /// place. Commit with [`set_fill`](Self::set_fill).
    pub fn write_buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Declare the first `fill` bytes of the outgoing buffer as pending.
    pub fn set_fill(&mut self, fill: usize) -> Result<()> {
        if fill > self.buf.len() {
            return Err(Error::write(format!(
                "{}: fill {fill} exceeds block size {}",
                self.meta.name(),
                self.buf.len()
            )));
        }
        self.fill = fill;
        Ok(())
    }

    /// Read the next header and load its block. `Ok(false)` on a clean end
    /// of file.
    fn next_block(&mut self) -> Result<bool> {
        let Some(raw) = self.inner.read_i64()? else {
            return Ok(false);
        };
        if raw < 0 {
            return Err(Error::protocol(format!(
                "{}: invalid block size {raw}",
                self.meta.name()
            )));
        }
        let len = (raw >> 1) as usize;
        let last = raw & 1 == 1;
        trace!(stream = %self.meta.name(), len, last, "block header read");

        let compressed = self.codec.method() != CompressionMethod::None;
        let limit = if compressed { self.compbuf.len() } else { self.buf.len() };
        if len > limit {
            return Err(Error::protocol(format!(
                "{}: invalid block size {len} (maximum {limit})",
                self.meta.name()
            )));
        }
        self.pending_final = last;
        self.readpos = 0;
        self.remaining = 0;
        self.blocks += 1;
        if len == 0 {
            return Ok(true);
        }

        let target = if compressed { &mut self.compbuf[..len] } else { &mut self.buf[..len] };
        let got = self.inner.read_fully(target)?;
        if got < len {
            return Err(Error::unexpected_eof(got, len));
        }
        self.remaining = if compressed {
            self.codec.decompress(&self.compbuf[..len], &mut self.buf)?
        } else {
            len
        };
        Ok(true)
    }

    fn read_message(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.remaining == 0 {
            if self.pending_final {
                self.pending_final = false;
                return Ok(0);
            }
            if !self.next_block()? {
                return Ok(0);
            }
        }

        let mut cnt = 0;
        while cnt < buf.len() {
            let n = (buf.len() - cnt).min(self.remaining);
            buf[cnt..cnt + n].copy_from_slice(&self.buf[self.readpos..self.readpos + n]);
            cnt += n;
            self.readpos += n;
            self.remaining -= n;
            self.bytes += n as u64;
            if self.remaining == 0 {
                if self.pending_final {
                    break;
                }
                if !self.next_block()? {
                    return Err(Error::unexpected_eof(0, 8));
                }
            }
        }
        if !buf.is_empty() && cnt == 0 {
            self.pending_final = false;
        }
        Ok(cnt)
    }

    fn emit_block(&mut self, last: bool) -> Result<()> {
        let len = self.fill;
        self.fill = 0;
        let payload = if len > 0 && self.codec.method() != CompressionMethod::None {
            let n = self.codec.compress(&self.buf[..len], &mut self.compbuf)?;
            &self.compbuf[..n]
        } else {
            &self.buf[..len]
        };
        let header = ((payload.len() as i64) << 1) | i64::from(last);
        trace!(
            stream = %self.meta.name(),
            len,
            wire_len = payload.len(),
            last,
            "block header write"
        );
        self.inner.write_i64(header)?;
        self.inner.write_bytes(payload)?;
        self.blocks += 1;
        self.bytes += len as u64;
        Ok(())
    }
}

impl Stream for BlockStream2 {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        let result = self.read_message(buf);
        if result.is_err() {
            self.reset();
            self.fill = 0;
        }
        result
    }

    fn write_raw(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = (self.buf.len() - self.fill).min(buf.len());
            self.buf[self.fill..self.fill + n].copy_from_slice(&buf[..n]);
            self.fill += n;
            buf = &buf[n..];
            if self.fill == self.buf.len() {
                self.emit_block(false)?;
            }
        }
        Ok(())
    }

    fn flush_raw(&mut self, level: FlushLevel) -> Result<()> {
        self.emit_block(true)?;
        self.inner.flush(level)
    }

    fn close_raw(&mut self) {
        if !self.meta.is_readonly() && self.fill > 0 && self.meta.error().is_none() {
            if let Err(err) = self.flush_raw(FlushLevel::Data) {
                self.meta.set_error(err);
            }
        }
        self.inner.close();
    }

    fn inner(&self) -> Option<&dyn Stream> {
        Some(self.inner.as_ref())
    }

    fn inner_mut(&mut self) -> Option<&mut dyn Stream> {
        Some(self.inner.as_mut())
    }

    fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }
}

impl Drop for BlockStream2 {
    fn drop(&mut self) {
        self.close();
    }
}
