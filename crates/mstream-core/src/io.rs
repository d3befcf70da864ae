//! Bridges between streams and `std::io`.
//!
//! [`IoReadStream`] and [`IoWriteStream`] turn any `Read`/`Write` (files,
//! sockets, stdin/stdout) into a transport stream. [`StreamReader`] and
//! [`StreamWriter`] go the other way and expose a stream to code that
//! expects `std::io` traits.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::trace;

use crate::error::{Error, ErrorKind, Result};
use crate::stream::{Stream, StreamExt, StreamMeta};
use crate::types::FlushLevel;

/// Errors after which a blocking call may be retried.
fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Transport stream over a `std::io::Read`.
///
/// A read fills the whole request unless the source reaches end of file.
pub struct IoReadStream<R> {
    meta: StreamMeta,
    inner: R,
}

impl<R: Read + Send> IoReadStream<R> {
    /// Wrap a reader. The stream starts out binary.
    pub fn new(inner: R, name: impl Into<String>) -> Self {
        IoReadStream {
            meta: StreamMeta::reader(name).binary(),
            inner,
        }
    }

    /// The wrapped reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl IoReadStream<File> {
    /// Open a file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| Error::from_io(ErrorKind::Open, &name, &e))?;
        Ok(IoReadStream::new(file, name))
    }
}

impl<R: Read + Send> Stream for IoReadStream<R> {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut got = 0;
        while got < buf.len() {
            match self.inner.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if is_retryable(&e) => {
                    if self.meta.should_abandon() {
                        if got > 0 {
                            break;
                        }
                        return Err(Error::timeout(format!("{}: {e}", self.meta.name())));
                    }
                    trace!(stream = %self.meta.name(), "retrying read after {}", e.kind());
                }
                Err(e) => return Err(Error::from_io(ErrorKind::Read, self.meta.name(), &e)),
            }
        }
        Ok(got)
    }
}

/// Transport stream over a `std::io::Write`.
pub struct IoWriteStream<W: Write> {
    meta: StreamMeta,
    inner: W,
}

impl<W: Write + Send> IoWriteStream<W> {
    /// Wrap a writer. The stream starts out binary.
    pub fn new(inner: W, name: impl Into<String>) -> Self {
        IoWriteStream {
            meta: StreamMeta::writer(name).binary(),
            inner,
        }
    }

    /// The wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl IoWriteStream<File> {
    /// Create or truncate a file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), OpenOptions::new().write(true).create(true).truncate(true))
    }

    /// Open a file for appending, creating it when missing.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), OpenOptions::new().append(true).create(true))
    }

    fn open_with(path: &Path, options: &OpenOptions) -> Result<Self> {
        let name = path.display().to_string();
        let file = options
            .open(path)
            .map_err(|e| Error::from_io(ErrorKind::Open, &name, &e))?;
        Ok(IoWriteStream::new(file, name))
    }
}

impl<W: Write + Send> Stream for IoWriteStream<W> {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn write_raw(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.inner.write(buf) {
                Ok(0) => {
                    return Err(Error::write(format!(
                        "{}: write returned zero bytes",
                        self.meta.name()
                    )))
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if is_retryable(&e) => {
                    if self.meta.should_abandon() {
                        return Err(Error::timeout(format!("{}: {e}", self.meta.name())));
                    }
                    trace!(stream = %self.meta.name(), "retrying write after {}", e.kind());
                }
                Err(e) => return Err(Error::from_io(ErrorKind::Write, self.meta.name(), &e)),
            }
        }
        Ok(())
    }

    fn flush_raw(&mut self, _level: FlushLevel) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| Error::from_io(ErrorKind::Write, self.meta.name(), &e))
    }

    fn close_raw(&mut self) {
        if let Err(e) = self.inner.flush() {
            let err = Error::from_io(ErrorKind::Write, self.meta.name(), &e);
            self.meta.set_error(err);
        }
    }
}

impl<W: Write> Drop for IoWriteStream<W> {
    fn drop(&mut self) {
        if !self.meta.is_closed() {
            let _ = self.inner.flush();
        }
    }
}

/// `std::io::Read` over a read stream.
pub struct StreamReader<S> {
    stream: S,
}

impl<S: Stream> StreamReader<S> {
    /// Read from `stream` through `std::io::Read`.
    pub fn new(stream: S) -> Self {
        StreamReader { stream }
    }

    /// The wrapped stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Give back the wrapped stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Stream> Read for StreamReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.stream.read_bytes(buf)?)
    }
}

/// `std::io::Write` over a write stream.
pub struct StreamWriter<S> {
    stream: S,
}

impl<S: Stream> StreamWriter<S> {
    /// Write to `stream` through `std::io::Write`.
    pub fn new(stream: S) -> Self {
        StreamWriter { stream }
    }

    /// The wrapped stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Give back the wrapped stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Stream> Write for StreamWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(StreamExt::flush(&mut self.stream, FlushLevel::Data)?)
    }
}
