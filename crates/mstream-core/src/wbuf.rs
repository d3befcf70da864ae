//! Write-buffer stream: batches small writes into one larger write.

use tracing::trace;

use crate::buffer::Staging;
use crate::error::{Error, Result};
use crate::stream::{Stream, StreamExt, StreamMeta};
use crate::types::FlushLevel;

/// Write stream that collects writes in a fixed buffer. Whenever the buffer
/// fills up it is written to the inner stream, which is then flushed.
pub struct WriteBufferStream {
    meta: StreamMeta,
    inner: Box<dyn Stream>,
    buf: Staging,
}

impl WriteBufferStream {
    /// Wrap `inner` with a buffer of `capacity` bytes.
    pub fn new(inner: Box<dyn Stream>, capacity: usize) -> Result<Self> {
        if inner.is_readonly() {
            return Err(Error::open(format!(
                "{}: write buffer needs a write stream",
                inner.name()
            )));
        }
        if capacity == 0 {
            return Err(Error::open(format!(
                "{}: write buffer capacity must be positive",
                inner.name()
            )));
        }
        Ok(WriteBufferStream {
            meta: StreamMeta::wrapping(inner.as_ref()),
            inner,
            buf: Staging::with_capacity(capacity),
        })
    }

    /// Bytes waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn drain(&mut self, level: FlushLevel) -> Result<()> {
        trace!(stream = %self.meta.name(), bytes = self.buf.len(), "draining write buffer");
        let result = self.inner.write_bytes(self.buf.staged());
        self.buf.reset();
        result?;
        self.inner.flush(level)
    }
}

impl Stream for WriteBufferStream {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn write_raw(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.buf.stage(buf);
            buf = &buf[n..];
            if self.buf.spare_len() == 0 {
                self.drain(FlushLevel::Data)?;
            }
        }
        Ok(())
    }

    fn flush_raw(&mut self, level: FlushLevel) -> Result<()> {
        self.drain(level)
    }

    fn close_raw(&mut self) {
        if self.meta.error().is_none() {
            if let Err(err) = self.drain(FlushLevel::Data) {
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
}

impl Drop for WriteBufferStream {
    fn drop(&mut self) {
        self.close();
    }
}
