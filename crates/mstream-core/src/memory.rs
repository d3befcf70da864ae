//! In-memory streams over a [`Buffer`].

use crate::buffer::Buffer;
use crate::error::Result;
use crate::stream::{Stream, StreamExt, StreamMeta};

/// Read stream over an owned byte buffer.
///
/// Reads return whatever is left, possibly fewer bytes than asked for, and
/// `Ok(0)` once the buffer is exhausted.
#[derive(Debug)]
pub struct BufferReadStream {
    meta: StreamMeta,
    buf: Buffer,
}

impl BufferReadStream {
    /// Create a reader over `data`.
    pub fn new(data: impl Into<Buffer>, name: impl Into<String>) -> Self {
        BufferReadStream {
            meta: StreamMeta::reader(name).binary(),
            buf: data.into(),
        }
    }

    /// The underlying buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buf
    }
}

impl Stream for BufferReadStream {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.buf.read(buf))
    }
}

impl Drop for BufferReadStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Write stream that collects everything into a growable buffer.
///
/// Flush is a no-op; the bytes are visible through [`buffer`](Self::buffer)
/// as soon as `write` returns.
#[derive(Debug)]
pub struct BufferWriteStream {
    meta: StreamMeta,
    buf: Buffer,
}

impl BufferWriteStream {
    /// Create an empty writer.
    pub fn new(name: impl Into<String>) -> Self {
        BufferWriteStream {
            meta: StreamMeta::writer(name).binary(),
            buf: Buffer::default(),
        }
    }

    /// Bytes written so far.
    pub fn buffer(&self) -> &Buffer {
        &self.buf
    }

    /// Take the bytes written so far and start over with an empty buffer.
    pub fn take_buffer(&mut self) -> Buffer {
        std::mem::take(&mut self.buf)
    }
}

impl Stream for BufferWriteStream {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        self.buf.append(buf);
        Ok(())
    }
}

impl Drop for BufferWriteStream {
    fn drop(&mut self) {
        self.close();
    }
}
