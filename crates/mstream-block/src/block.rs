//! Block framing, version 1.
//!
//! Every block on the wire is a two-byte little-endian header followed by
//! the payload:
//!
//! ```text
//! ┌──────────────────────────┬─────────────────────┐
//! │ u16 LE: len << 1 | final │ len payload bytes   │
//! └──────────────────────────┴─────────────────────┘
//! ```
//!
//! A writer cuts a non-final block whenever its buffer fills up; `flush`
//! always emits a final block, even an empty one. A reader hands out the
//! payload of consecutive blocks and reports the end of a message with a
//! single zero-length read after the final block.

use mstream_core::{
    BufferWriteStream, Error, FlushLevel, Result, Stream, StreamConfig, StreamExt, StreamMeta,
};
use tracing::{debug, trace};

/// Default payload capacity: 8 KiB minus the header.
pub const BLOCK: usize = 8 * 1024 - 2;

/// Largest payload a v1 header can describe.
pub const MAX_BLOCK: usize = 0x7fff;

/// Blocking-message framing over a binary stream.
pub struct BlockStream {
    meta: StreamMeta,
    inner: Box<dyn Stream>,
    buf: Vec<u8>,
    /// Bytes accumulated for the next outgoing block.
    fill: usize,
    /// Unread payload bytes of the current inbound block.
    remaining: usize,
    /// The current inbound block is final and its end has not been
    /// reported yet.
    pending_final: bool,
    /// The inner stream reported end of file at a message boundary.
    eof: bool,
    prompt: Option<Prompt>,
    prompting: bool,
    blocks: u64,
    bytes: u64,
}

struct Prompt {
    text: Vec<u8>,
    target: Box<dyn Stream>,
}

impl BlockStream {
    /// Frame `inner` with the default block size.
    pub fn new(inner: Box<dyn Stream>) -> Self {
        Self::build(inner, BLOCK)
    }

    /// Frame `inner` with blocks of at most `capacity` payload bytes.
    pub fn with_capacity(inner: Box<dyn Stream>, capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_BLOCK {
            return Err(Error::open(format!(
                "{}: block size {capacity} outside 1..={MAX_BLOCK}",
                inner.name()
            )));
        }
        Ok(Self::build(inner, capacity))
    }

    /// Frame `inner` with the block size from `config`.
    pub fn from_config(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<Self> {
        Self::with_capacity(inner, config.block_size)
    }

    fn build(mut inner: Box<dyn Stream>, capacity: usize) -> Self {
        let meta = StreamMeta::wrapping(inner.as_ref()).binary();
        // Headers are little-endian on every host
        inner.set_swap_bytes(cfg!(target_endian = "big"));
        debug!(
            stream = %meta.name(),
            access = meta.access().name(),
            capacity,
            "block stream created"
        );
        BlockStream {
            meta,
            inner,
            buf: vec![0; capacity],
            fill: 0,
            remaining: 0,
            pending_final: false,
            eof: false,
            prompt: None,
            prompting: false,
            blocks: 0,
            bytes: 0,
        }
    }

    /// Payload capacity of one block.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Blocks written or read so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Payload bytes written or read so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Write `prompt` to `target` (and flush it) whenever a read reaches
    /// the end of a message, then read again before reporting it.
    pub fn set_prompt(&mut self, prompt: impl Into<Vec<u8>>, target: Box<dyn Stream>) {
        self.prompt = Some(Prompt {
            text: prompt.into(),
            target,
        });
    }

    /// Remove the prompt, handing back its text and target stream.
    pub fn take_prompt(&mut self) -> Option<(Vec<u8>, Box<dyn Stream>)> {
        self.prompt.take().map(|p| (p.text, p.target))
    }

    /// The prompt target, for writing replies to the peer.
    pub fn prompt_target_mut(&mut self) -> Option<&mut dyn Stream> {
        match &mut self.prompt {
            Some(p) => Some(p.target.as_mut()),
            None => None,
        }
    }

    /// Read the next piece of the current message.
    ///
    /// Returns the byte count and whether the message ended with this
    /// piece. A `true` here replaces the zero-length read that would
    /// otherwise follow.
    pub fn read_next(&mut self, buf: &mut [u8]) -> Result<(usize, bool)> {
        let n = self.read_bytes(buf)?;
        let last = self.remaining == 0;
        if last {
            self.pending_final = false;
        }
        Ok((n, last))
    }

    /// Read one whole message of at most `cnt` elements of `elmsize` bytes
    /// and consume its end marker. A message that does not fit is a
    /// protocol error.
    pub fn read_block(&mut self, buf: &mut [u8], elmsize: usize, cnt: usize) -> Result<usize> {
        let n = self.read(buf, elmsize, cnt)?;
        if n == 0 {
            return Ok(0);
        }
        match self.end_of_message() {
            Ok(()) => Ok(n),
            Err(err) => {
                self.reset_read_state();
                self.meta.set_error(err.clone());
                Err(err)
            }
        }
    }

    fn end_of_message(&mut self) -> Result<()> {
        if self.remaining == 0 && !self.pending_final {
            // Message filled the caller buffer exactly; an empty final
            // block may still follow
            if !self.read_header()? {
                return Err(Error::unexpected_eof(0, 2));
            }
        }
        if self.remaining > 0 || !self.pending_final {
            return Err(Error::protocol(format!(
                "{}: message larger than the read buffer",
                self.meta.name()
            )));
        }
        self.pending_final = false;
        Ok(())
    }

    /// Give back the framed transport. Buffered output is written first as
    /// a final block.
    pub fn into_inner(mut self) -> Box<dyn Stream> {
        if !self.meta.is_readonly() && self.fill > 0 && self.meta.error().is_none() {
            if let Err(err) = self.emit_block(true) {
                self.meta.set_error(err);
            }
        }
        self.fill = 0;
        let placeholder = Box::new(BufferWriteStream::new(self.meta.name().to_owned()));
        std::mem::replace(&mut self.inner, placeholder)
    }

    /// Read and decode the next header. `Ok(false)` on a clean end of file.
    fn read_header(&mut self) -> Result<bool> {
        let Some(raw) = self.inner.read_i16()? else {
            return Ok(false);
        };
        let raw = raw as u16;
        let len = usize::from(raw >> 1);
        let last = raw & 1 == 1;
        trace!(stream = %self.meta.name(), len, last, "block header read");
        if len > self.buf.len() {
            return Err(Error::protocol(format!(
                "{}: invalid block size {len} (maximum {})",
                self.meta.name(),
                self.buf.len()
            )));
        }
        self.remaining = len;
        self.pending_final = last;
        self.blocks += 1;
        Ok(true)
    }

    fn read_message(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.remaining == 0 {
            if self.pending_final {
                self.pending_final = false;
                return Ok(0);
            }
            if !self.read_header()? {
                self.eof = true;
                return Ok(0);
            }
        }
        self.eof = false;

        let mut cnt = 0;
        while cnt < buf.len() {
            let n = (buf.len() - cnt).min(self.remaining);
            if n > 0 {
                let got = self.inner.read_fully(&mut buf[cnt..cnt + n])?;
                if got < n {
                    return Err(Error::unexpected_eof(got, n));
                }
                cnt += n;
                self.remaining -= n;
                self.bytes += n as u64;
            }
            if self.remaining == 0 {
                if self.pending_final {
                    break;
                }
                if !self.read_header()? {
                    return Err(Error::unexpected_eof(0, 2));
                }
            }
        }
        // An empty final block reports the end of the message only once
        if !buf.is_empty() && cnt == 0 {
            self.pending_final = false;
        }
        Ok(cnt)
    }

    fn send_prompt(&mut self) -> Result<bool> {
        let Some(prompt) = self.prompt.as_mut() else {
            return Ok(false);
        };
        trace!(stream = %self.meta.name(), len = prompt.text.len(), "sending prompt");
        prompt.target.write_bytes(&prompt.text)?;
        prompt.target.flush(FlushLevel::Data)?;
        Ok(true)
    }

    fn reset_read_state(&mut self) {
        self.remaining = 0;
        self.pending_final = false;
        self.fill = 0;
    }

    fn emit_block(&mut self, last: bool) -> Result<()> {
        let len = self.fill;
        self.fill = 0;
        let header = ((len as u16) << 1) | u16::from(last);
        trace!(stream = %self.meta.name(), len, last, "block header write");
        self.inner.write_i16(header as i16)?;
        self.inner.write_bytes(&self.buf[..len])?;
        self.blocks += 1;
        self.bytes += len as u64;
        Ok(())
    }
}

impl Stream for BlockStream {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self.read_message(buf) {
            Ok(n) => n,
            Err(err) => {
                self.reset_read_state();
                return Err(err);
            }
        };
        if n > 0 || buf.is_empty() || self.eof || self.prompting {
            return Ok(n);
        }
        if !self.send_prompt()? {
            return Ok(0);
        }
        self.prompting = true;
        let result = self.read_raw(buf);
        self.prompting = false;
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

    /// Emit the final block of the message, then flush the transport.
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

impl Drop for BlockStream {
    fn drop(&mut self) {
        self.close();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Refusing, Wire};
    use mstream_core::{BufferReadStream, ErrorKind, IoWriteStream};

    fn writer(wire: &Wire, capacity: usize) -> BlockStream {
        BlockStream::with_capacity(wire.writer("wire"), capacity).unwrap()
    }

    fn reader(bytes: Vec<u8>, capacity: usize) -> BlockStream {
        BlockStream::with_capacity(Box::new(BufferReadStream::new(bytes, "wire")), capacity).unwrap()
    }

    /// Collect one message, up to its end marker.
    fn read_message(bs: &mut BlockStream, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = bs.read_bytes(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_header_layout() {
        let wire = Wire::default();
        let mut bs = writer(&wire, 4);
        bs.write_bytes(b"abcdef").unwrap();
        bs.flush(FlushLevel::Data).unwrap();
        assert_eq!(wire.bytes(), b"\x08\x00abcd\x05\x00ef");
        assert_eq!(bs.blocks(), 2);
        assert_eq!(bs.bytes(), 6);
    }

    #[test]
    fn test_empty_flush_sends_final_block() {
        let wire = Wire::default();
        let mut bs = writer(&wire, 16);
        bs.flush(FlushLevel::Data).unwrap();
        bs.flush(FlushLevel::All).unwrap();
        assert_eq!(wire.bytes(), b"\x01\x00\x01\x00");
    }

    #[test]
    fn test_full_buffer_then_flush_adds_empty_final_block() {
        let wire = Wire::default();
        let mut bs = writer(&wire, 4);
        bs.write_bytes(b"abcd").unwrap();
        bs.flush(FlushLevel::Data).unwrap();
        assert_eq!(wire.bytes(), b"\x08\x00abcd\x01\x00");

        let mut rd = reader(wire.bytes(), 4);
        let mut buf = [0u8; 16];
        assert_eq!(rd.read_bytes(&mut buf).unwrap(), 4);
        assert_eq!(rd.read_bytes(&mut buf).unwrap(), 0);
        // End of file after the message
        assert_eq!(rd.read_bytes(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_messages_roundtrip_across_capacities() {
        let big: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
        let messages: [&[u8]; 4] = [b"hello", b"", &big, b"x"];
        for capacity in [1, 3, 64, BLOCK, MAX_BLOCK] {
            let wire = Wire::default();
            let mut bs = writer(&wire, capacity);
            for msg in messages {
                bs.write_bytes(msg).unwrap();
                bs.flush(FlushLevel::Data).unwrap();
            }
            drop(bs);

            let mut rd = reader(wire.bytes(), capacity);
            for msg in messages {
                assert_eq!(read_message(&mut rd, 7), msg, "capacity {capacity}");
            }
            let mut buf = [0u8; 8];
            assert_eq!(rd.read_bytes(&mut buf).unwrap(), 0);
            assert!(rd.error().is_none());
        }
    }

    #[test]
    fn test_bare_flush_reports_end_once() {
        let mut rd = reader(b"\x01\x00\x07\x00abc".to_vec(), 8);
        let mut buf = [0u8; 8];
        assert_eq!(rd.read_bytes(&mut buf).unwrap(), 0);
        assert_eq!(rd.read_bytes(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(rd.read_bytes(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_oversized_header_is_protocol_error() {
        let mut bytes = vec![20u8, 0];
        bytes.extend_from_slice(b"0123456789");
        let mut rd = reader(bytes, 4);
        let mut buf = [0u8; 16];
        let err = rd.read_bytes(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        // Sticky
        assert_eq!(rd.read_bytes(&mut buf).unwrap_err(), err);

        // The payload is still on the transport
        let mut inner = rd.into_inner();
        assert_eq!(inner.read_bytes(&mut buf).unwrap(), 10);
    }

    #[test]
    fn test_truncated_payload_copies_inner_error() {
        let mut rd = reader(b"\x08\x00ab".to_vec(), 8);
        let mut buf = [0u8; 16];
        let err = rd.read_bytes(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert_eq!(rd.error(), rd.inner().unwrap().error());
    }

    #[test]
    fn test_half_header_is_error() {
        let mut rd = reader(vec![0x08], 8);
        let mut buf = [0u8; 4];
        assert_eq!(rd.read_bytes(&mut buf).unwrap_err().kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_write_failure_copies_inner_error() {
        let inner = Box::new(IoWriteStream::new(Refusing, "socket"));
        let mut bs = BlockStream::with_capacity(inner, 4).unwrap();
        let err = bs.write_bytes(b"abcdef").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);
        assert_eq!(bs.error(), bs.inner().unwrap().error());
        assert_eq!(bs.flush(FlushLevel::Data).unwrap_err(), err);
    }

    #[test]
    fn test_read_next_marks_last_piece() {
        let mut rd = reader(b"\x04\x00ab\x03\x00c\x05\x00de".to_vec(), 8);
        let mut buf = [0u8; 16];
        assert_eq!(rd.read_next(&mut buf).unwrap(), (3, true));
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(rd.read_next(&mut buf).unwrap(), (2, true));
        assert_eq!(&buf[..2], b"de");

        let mut rd = reader(b"\x04\x00ab\x03\x00c".to_vec(), 8);
        assert_eq!(rd.read_next(&mut buf[..1]).unwrap(), (1, false));
        assert_eq!(rd.read_next(&mut buf[..8]).unwrap(), (2, true));
    }

    #[test]
    fn test_read_block() {
        let wire = Wire::default();
        let mut bs = writer(&wire, 2);
        bs.write_bytes(b"hello").unwrap();
        bs.flush(FlushLevel::Data).unwrap();
        bs.write_bytes(b"hello world").unwrap();
        bs.flush(FlushLevel::Data).unwrap();
        drop(bs);

        let mut rd = reader(wire.bytes(), 2);
        let mut buf = [0u8; 5];
        assert_eq!(rd.read_block(&mut buf, 1, 5).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        let err = rd.read_block(&mut buf, 1, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(rd.error(), Some(&err));
    }

    #[test]
    fn test_read_block_exact_fit() {
        let wire = Wire::default();
        let mut bs = writer(&wire, 5);
        bs.write_bytes(b"hello").unwrap();
        bs.flush(FlushLevel::Data).unwrap();
        bs.write_bytes(b"again").unwrap();
        bs.flush(FlushLevel::Data).unwrap();
        drop(bs);

        let mut rd = reader(wire.bytes(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(rd.read_block(&mut buf, 1, 5).unwrap(), 5);
        assert_eq!(rd.read_block(&mut buf, 1, 5).unwrap(), 5);
        assert_eq!(&buf, b"again");
    }

    #[test]
    fn test_prompt_handshake() {
        let wire = Wire::default();
        let mut bs = writer(&wire, 16);
        bs.write_bytes(b"query").unwrap();
        bs.flush(FlushLevel::Data).unwrap();
        // The peer answers the prompt with an empty final block
        bs.flush(FlushLevel::Data).unwrap();
        bs.write_bytes(b"next").unwrap();
        bs.flush(FlushLevel::Data).unwrap();
        drop(bs);

        let prompts = Wire::default();
        let mut rd = reader(wire.bytes(), 16);
        rd.set_prompt(b"\x01\x02\n".to_vec(), prompts.writer("client"));

        assert_eq!(read_message(&mut rd, 64), b"query");
        assert_eq!(prompts.bytes(), b"\x01\x02\n");
        assert_eq!(read_message(&mut rd, 64), b"next");
        assert_eq!(prompts.bytes(), b"\x01\x02\n\x01\x02\n");

        // At end of file nobody is prompted
        let mut buf = [0u8; 4];
        assert_eq!(rd.read_bytes(&mut buf).unwrap(), 0);
        assert_eq!(prompts.bytes().len(), 6);
        assert!(rd.take_prompt().is_some());
    }

    #[test]
    fn test_close_flushes_pending_data() {
        let wire = Wire::default();
        let mut bs = writer(&wire, 8);
        bs.write_bytes(b"xyz").unwrap();
        drop(bs);
        assert_eq!(wire.bytes(), b"\x07\x00xyz");
    }

    #[test]
    fn test_capacity_limits() {
        let inner = || Box::new(BufferWriteStream::new("w")) as Box<dyn Stream>;
        assert_eq!(
            BlockStream::with_capacity(inner(), 0).err().map(|e| e.kind()),
            Some(ErrorKind::Open)
        );
        assert!(BlockStream::with_capacity(inner(), MAX_BLOCK + 1).is_err());
        assert_eq!(BlockStream::new(inner()).capacity(), BLOCK);
        let config = StreamConfig {
            block_size: 100,
            ..StreamConfig::default()
        };
        assert_eq!(BlockStream::from_config(inner(), &config).unwrap().capacity(), 100);
    }

    #[test]
    fn test_into_inner_writes_pending_final_block() {
        let wire = Wire::default();
        let mut bs = writer(&wire, 8);
        bs.write_bytes(b"ab").unwrap();
        let mut inner = bs.into_inner();
        inner.write_bytes(b"raw").unwrap();
        assert_eq!(wire.bytes(), b"\x05\x00abraw");
    }
}
