//! Tee stream: duplicates all output to two write streams.

use crate::error::{Error, Result};
use crate::stream::{Stream, StreamExt, StreamMeta};
use crate::types::FlushLevel;

/// Write stream that forwards every write and flush to an original stream
/// and a second (log) stream.
pub struct TeeStream {
    meta: StreamMeta,
    orig: Box<dyn Stream>,
    log: Box<dyn Stream>,
}

impl TeeStream {
    /// Attach `log` to `orig`. Both must be write streams.
    pub fn attach(orig: Box<dyn Stream>, log: Box<dyn Stream>) -> Result<Self> {
        if orig.is_readonly() || log.is_readonly() {
            return Err(Error::open(format!(
                "tee requires two write streams ({}, {})",
                orig.name(),
                log.name()
            )));
        }
        let meta = StreamMeta::wrapping(orig.as_ref());
        Ok(TeeStream { meta, orig, log })
    }

    /// Close and drop the log stream, returning the original.
    pub fn detach(self) -> Box<dyn Stream> {
        let TeeStream { orig, mut log, .. } = self;
        log.close();
        orig
    }

    /// The log stream.
    pub fn log(&self) -> &dyn Stream {
        self.log.as_ref()
    }
}

impl Stream for TeeStream {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        let orig = self.orig.write_bytes(buf);
        let log = self.log.write_bytes(buf);
        orig.and(log)
    }

    fn flush_raw(&mut self, level: FlushLevel) -> Result<()> {
        let orig = self.orig.flush(level);
        let log = self.log.flush(level);
        orig.and(log)
    }

    fn close_raw(&mut self) {
        self.orig.close();
        self.log.close();
    }

    fn inner(&self) -> Option<&dyn Stream> {
        Some(self.orig.as_ref())
    }

    fn inner_mut(&mut self) -> Option<&mut dyn Stream> {
        Some(self.orig.as_mut())
    }
}
