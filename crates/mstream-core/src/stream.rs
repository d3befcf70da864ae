//! The stream capability object.
//!
//! ## Layering
//!
//! ```text
//! StreamExt  (caller-facing: element counts, sticky errors, typed I/O)
//!       ↓
//! Stream     (backend: raw byte operations of one concrete stream)
//!       ↓
//! inner: Box<dyn Stream>  (optional, exclusively owned)
//! ```
//!
//! Backends implement [`Stream`]; callers use the blanket [`StreamExt`]
//! methods, which enforce the direction invariant and keep the sticky error.

use std::fmt;
use std::mem::size_of;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::types::{Access, FlushLevel};

/// Callback consulted by transports when a blocking call times out.
///
/// Returns `true` to abandon the call with a timeout error, `false` to retry.
pub type TimeoutCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Attributes shared by every stream.
pub struct StreamMeta {
    name: String,
    access: Access,
    binary: bool,
    swap_bytes: bool,
    utf8: bool,
    error: Option<Error>,
    timeout: Option<Duration>,
    timeout_check: Option<TimeoutCheck>,
    closed: bool,
}

impl StreamMeta {
    /// Metadata for a fresh stream.
    pub fn new(name: impl Into<String>, access: Access) -> Self {
        StreamMeta {
            name: name.into(),
            access,
            binary: false,
            swap_bytes: false,
            utf8: false,
            error: None,
            timeout: None,
            timeout_check: None,
            closed: false,
        }
    }

    /// Metadata for a read-only stream.
    pub fn reader(name: impl Into<String>) -> Self {
        Self::new(name, Access::Read)
    }

    /// Metadata for a write-only stream.
    pub fn writer(name: impl Into<String>) -> Self {
        Self::new(name, Access::Write)
    }

    /// Metadata for a wrapper around `inner`: same name, direction, flags
    /// and timeout settings.
    pub fn wrapping(inner: &dyn Stream) -> Self {
        let im = inner.meta();
        StreamMeta {
            name: im.name.clone(),
            access: im.access,
            binary: im.binary,
            swap_bytes: im.swap_bytes,
            utf8: im.utf8,
            error: None,
            timeout: im.timeout,
            timeout_check: im.timeout_check.clone(),
            closed: false,
        }
    }

    /// Mark the stream as binary (builder style).
    pub fn binary(mut self) -> Self {
        self.binary = true;
        self
    }

    /// Diagnostic name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stream direction.
    #[inline]
    pub fn access(&self) -> Access {
        self.access
    }

    /// True for read-only streams.
    #[inline]
    pub fn is_readonly(&self) -> bool {
        self.access == Access::Read
    }

    /// True for binary (as opposed to text) streams.
    #[inline]
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Set the binary flag.
    pub fn set_binary(&mut self, binary: bool) {
        self.binary = binary;
    }

    /// True when typed values are byte-swapped on the wire.
    #[inline]
    pub fn swap_bytes(&self) -> bool {
        self.swap_bytes
    }

    /// Set the byte-swap flag.
    pub fn set_swap_bytes(&mut self, swap: bool) {
        self.swap_bytes = swap;
    }

    /// True when the content is known to be UTF-8.
    #[inline]
    pub fn is_utf8(&self) -> bool {
        self.utf8
    }

    /// Mark the content as UTF-8.
    pub fn set_utf8(&mut self, utf8: bool) {
        self.utf8 = utf8;
    }

    /// The sticky error, if any.
    #[inline]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Record an error. The first error wins.
    pub fn set_error(&mut self, err: Error) {
        if self.error.is_none() {
            debug!(
                stream = %self.name,
                kind = %err.kind(),
                "stream error: {}",
                err.message()
            );
            self.error = Some(err);
        }
    }

    /// Forget the sticky error.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Configured timeout.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Configured timeout callback.
    pub fn timeout_check(&self) -> Option<&TimeoutCheck> {
        self.timeout_check.as_ref()
    }

    /// Set timeout and callback.
    pub fn set_timeout(&mut self, timeout: Option<Duration>, check: Option<TimeoutCheck>) {
        self.timeout = timeout;
        self.timeout_check = check;
    }

    /// Ask the timeout callback whether a timed-out call must be abandoned.
    /// Without a callback every timeout is fatal.
    pub fn should_abandon(&self) -> bool {
        self.timeout_check.as_ref().map_or(true, |check| check())
    }

    /// True once `close` ran.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for StreamMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamMeta")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("binary", &self.binary)
            .field("swap_bytes", &self.swap_bytes)
            .field("utf8", &self.utf8)
            .field("error", &self.error)
            .field("timeout", &self.timeout)
            .field("has_timeout_check", &self.timeout_check.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Backend operations of a concrete stream.
///
/// Implementations only deal with bytes. Direction checks, element
/// counting and error stickiness live in [`StreamExt`].
pub trait Stream: Send {
    /// Shared attributes.
    fn meta(&self) -> &StreamMeta;

    /// Shared attributes, mutably.
    fn meta_mut(&mut self) -> &mut StreamMeta;

    /// Read up to `buf.len()` bytes. `Ok(0)` means end of file, or end of
    /// message for block streams.
    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        let _ = buf;
        Err(Error::read(format!(
            "{}: stream does not support reading",
            self.meta().name()
        )))
    }

    /// Write all of `buf` or fail.
    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        let _ = buf;
        Err(Error::write(format!(
            "{}: stream does not support writing",
            self.meta().name()
        )))
    }

    /// Push buffered output down the chain.
    fn flush_raw(&mut self, level: FlushLevel) -> Result<()> {
        let _ = level;
        Ok(())
    }

    /// Graceful shutdown. Called at most once, by [`StreamExt::close`].
    fn close_raw(&mut self) {}

    /// The wrapped stream, for wrappers.
    fn inner(&self) -> Option<&dyn Stream> {
        None
    }

    /// The wrapped stream, mutably, for wrappers.
    fn inner_mut(&mut self) -> Option<&mut dyn Stream> {
        None
    }

    /// Whether the peer is still reachable.
    fn is_alive(&self) -> bool {
        self.inner().map_or(true, |inner| inner.is_alive())
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn meta(&self) -> &StreamMeta {
        (**self).meta()
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        (**self).meta_mut()
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_raw(buf)
    }

    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_raw(buf)
    }

    fn flush_raw(&mut self, level: FlushLevel) -> Result<()> {
        (**self).flush_raw(level)
    }

    fn close_raw(&mut self) {
        (**self).close_raw()
    }

    fn inner(&self) -> Option<&dyn Stream> {
        (**self).inner()
    }

    fn inner_mut(&mut self) -> Option<&mut dyn Stream> {
        (**self).inner_mut()
    }

    fn is_alive(&self) -> bool {
        (**self).is_alive()
    }
}

macro_rules! typed_io {
    ($t:ty, $read:ident, $write:ident, $read_array:ident, $write_array:ident) => {
        #[doc = concat!("Read one `", stringify!($t), "`. `Ok(None)` on a clean end of file.")]
        fn $read(&mut self) -> Result<Option<$t>> {
            let mut raw = [0u8; size_of::<$t>()];
            if self.read_fully(&mut raw)? == 0 {
                return Ok(None);
            }
            let value = <$t>::from_ne_bytes(raw);
            Ok(Some(if self.swap_bytes() { value.swap_bytes() } else { value }))
        }

        #[doc = concat!("Write one `", stringify!($t), "`.")]
        fn $write(&mut self, value: $t) -> Result<()> {
            let value = if self.swap_bytes() { value.swap_bytes() } else { value };
            self.write_bytes(&value.to_ne_bytes())
        }

        #[doc = concat!("Fill `values` with `", stringify!($t), "`s; anything short is an error.")]
        fn $read_array(&mut self, values: &mut [$t]) -> Result<()> {
            const WIDTH: usize = size_of::<$t>();
            let mut raw = vec![0u8; values.len() * WIDTH];
            let got = self.read_fully(&mut raw)?;
            if got < raw.len() {
                let err = Error::unexpected_eof(got, raw.len());
                self.meta_mut().set_error(err.clone());
                return Err(err);
            }
            let swap = self.swap_bytes();
            for (value, chunk) in values.iter_mut().zip(raw.chunks_exact(WIDTH)) {
                let mut bytes = [0u8; WIDTH];
                bytes.copy_from_slice(chunk);
                let v = <$t>::from_ne_bytes(bytes);
                *value = if swap { v.swap_bytes() } else { v };
            }
            Ok(())
        }

        #[doc = concat!("Write a slice of `", stringify!($t), "`s.")]
        fn $write_array(&mut self, values: &[$t]) -> Result<()> {
            let swap = self.swap_bytes();
            let mut raw = Vec::with_capacity(values.len() * size_of::<$t>());
            for &v in values {
                let v = if swap { v.swap_bytes() } else { v };
                raw.extend_from_slice(&v.to_ne_bytes());
            }
            self.write_bytes(&raw)
        }
    };
}

/// Caller-facing stream operations, available on every [`Stream`].
pub trait StreamExt: Stream {
    /// Diagnostic name.
    fn name(&self) -> &str {
        self.meta().name()
    }

    /// True for read-only streams.
    fn is_readonly(&self) -> bool {
        self.meta().is_readonly()
    }

    /// True when typed values are byte-swapped.
    fn swap_bytes(&self) -> bool {
        self.meta().swap_bytes()
    }

    /// Set the byte-swap flag.
    fn set_swap_bytes(&mut self, swap: bool) {
        self.meta_mut().set_swap_bytes(swap);
    }

    /// Declare the byte order of the peer; typed values are swapped when it
    /// differs from the host order. Marks the stream binary.
    fn set_big_endian(&mut self, big_endian: bool) {
        let meta = self.meta_mut();
        meta.set_binary(true);
        meta.set_swap_bytes(big_endian != cfg!(target_endian = "big"));
    }

    /// Read up to `cnt` elements of `elmsize` bytes into `buf`.
    ///
    /// Returns the number of whole elements read; `Ok(0)` is end of file (or
    /// end of message on block streams).
    ///
    /// # Panics
    /// On a write-only stream, or when `buf` is shorter than
    /// `elmsize * cnt`.
    fn read(&mut self, buf: &mut [u8], elmsize: usize, cnt: usize) -> Result<usize> {
        assert!(
            self.meta().is_readonly(),
            "read on write-only stream {}",
            self.meta().name()
        );
        if let Some(err) = self.meta().error() {
            return Err(err.clone());
        }
        let size = elmsize * cnt;
        match self.read_raw(&mut buf[..size]) {
            Ok(n) if elmsize > 0 => Ok(n / elmsize),
            Ok(_) => Ok(0),
            Err(err) => {
                self.meta_mut().set_error(err.clone());
                Err(err)
            }
        }
    }

    /// Read up to `buf.len()` bytes.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len();
        self.read(buf, 1, len)
    }

    /// Read until `buf` is full or the stream reports end of file.
    ///
    /// Returns the number of bytes read; a short count means end of file.
    fn read_fully(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut got = 0;
        while got < buf.len() {
            let n = self.read_bytes(&mut buf[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        if got > 0 && got < buf.len() {
            let err = Error::unexpected_eof(got, buf.len());
            self.meta_mut().set_error(err.clone());
            return Err(err);
        }
        Ok(got)
    }

    /// Read one line (up to and including `\n`) of at most `buf.len()`
    /// bytes. Returns the number of bytes stored.
    fn read_line(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut len = 0;
        while len < buf.len() {
            if self.read_bytes(&mut buf[len..len + 1])? == 0 {
                break;
            }
            len += 1;
            if buf[len - 1] == b'\n' {
                break;
            }
        }
        Ok(len)
    }

    /// Write `cnt` elements of `elmsize` bytes from `buf`.
    ///
    /// Returns `cnt`; a zero-sized request succeeds without touching the
    /// backend.
    ///
    /// # Panics
    /// On a read-only stream, or when `buf` is shorter than
    /// `elmsize * cnt`.
    fn write(&mut self, buf: &[u8], elmsize: usize, cnt: usize) -> Result<usize> {
        assert!(
            !self.meta().is_readonly(),
            "write on read-only stream {}",
            self.meta().name()
        );
        if let Some(err) = self.meta().error() {
            return Err(err.clone());
        }
        let size = elmsize * cnt;
        if size == 0 {
            return Ok(cnt);
        }
        match self.write_raw(&buf[..size]) {
            Ok(()) => Ok(cnt),
            Err(err) => {
                self.meta_mut().set_error(err.clone());
                Err(err)
            }
        }
    }

    /// Write all of `buf`.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.write(buf, 1, buf.len()).map(|_| ())
    }

    /// Write a string.
    fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Formatted write; lets `write!(stream, ...)` work. Returns the number
    /// of bytes written.
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        let text = match args.as_str() {
            Some(s) => s.to_owned(),
            None => fmt::format(args),
        };
        self.write_bytes(text.as_bytes())?;
        Ok(text.len())
    }

    /// Push buffered output down the chain. A no-op on readers.
    fn flush(&mut self, level: FlushLevel) -> Result<()> {
        if self.meta().is_readonly() {
            return Ok(());
        }
        if let Some(err) = self.meta().error() {
            return Err(err.clone());
        }
        self.flush_raw(level).map_err(|err| {
            self.meta_mut().set_error(err.clone());
            err
        })
    }

    /// Graceful, idempotent shutdown. Does not release memory; dropping the
    /// stream does.
    fn close(&mut self) {
        if self.meta().is_closed() {
            return;
        }
        self.meta_mut().closed = true;
        self.close_raw();
    }

    /// The sticky error, if any.
    fn error(&self) -> Option<&Error> {
        self.meta().error()
    }

    /// Kind of the sticky error, if any.
    fn error_kind(&self) -> Option<ErrorKind> {
        self.meta().error().map(Error::kind)
    }

    /// Record an error on this stream (first error wins).
    fn set_error(&mut self, err: Error) {
        self.meta_mut().set_error(err);
    }

    /// Copy the sticky error of `other` onto this stream.
    fn copy_error_from(&mut self, other: &dyn Stream) {
        if let Some(err) = other.meta().error() {
            self.meta_mut().set_error(err.clone());
        }
    }

    /// Clear the sticky error here and down the chain.
    fn clear_error(&mut self) {
        self.meta_mut().clear_error();
        if let Some(inner) = self.inner_mut() {
            inner.clear_error();
        }
    }

    /// Configure the timeout here and down the chain.
    fn set_timeout(&mut self, timeout: Option<Duration>, check: Option<TimeoutCheck>) {
        if let Some(inner) = self.inner_mut() {
            inner.set_timeout(timeout, check.clone());
        }
        self.meta_mut().set_timeout(timeout, check);
    }

    /// Configured timeout.
    fn timeout(&self) -> Option<Duration> {
        self.meta().timeout()
    }

    /// Read one signed byte. `Ok(None)` on a clean end of file.
    fn read_i8(&mut self) -> Result<Option<i8>> {
        let mut raw = [0u8; 1];
        if self.read_fully(&mut raw)? == 0 {
            return Ok(None);
        }
        Ok(Some(raw[0] as i8))
    }

    /// Write one signed byte.
    fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_bytes(&[value as u8])
    }

    typed_io!(i16, read_i16, write_i16, read_i16_array, write_i16_array);
    typed_io!(i32, read_i32, write_i32, read_i32_array, write_i32_array);
    typed_io!(i64, read_i64, write_i64, read_i64_array, write_i64_array);
}

impl<S: Stream + ?Sized> StreamExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BufferReadStream, BufferWriteStream};

    struct Failing {
        meta: StreamMeta,
        calls: usize,
    }

    impl Stream for Failing {
        fn meta(&self) -> &StreamMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut StreamMeta {
            &mut self.meta
        }

        fn write_raw(&mut self, _buf: &[u8]) -> Result<()> {
            self.calls += 1;
            Err(Error::write(format!("disk full ({})", self.calls)))
        }
    }

    #[test]
    fn test_sticky_error_first_wins() {
        let mut s = Failing {
            meta: StreamMeta::writer("failing"),
            calls: 0,
        };
        assert!(s.write_bytes(b"abc").is_err());
        let err = s.write_bytes(b"def").unwrap_err();
        // Second call never reached the backend
        assert_eq!(s.calls, 1);
        assert_eq!(err.message(), "disk full (1)");
        assert_eq!(s.error_kind(), Some(ErrorKind::Write));

        s.clear_error();
        assert!(s.error().is_none());
        assert_eq!(s.write_bytes(b"x").unwrap_err().message(), "disk full (2)");
    }

    #[test]
    fn test_zero_sized_write() {
        let mut s = Failing {
            meta: StreamMeta::writer("failing"),
            calls: 0,
        };
        assert_eq!(s.write(b"", 4, 0).unwrap(), 0);
        assert_eq!(s.write(b"", 0, 7).unwrap(), 7);
        assert_eq!(s.calls, 0);
    }

    #[test]
    #[should_panic(expected = "write on read-only stream")]
    fn test_write_on_reader_panics() {
        let mut s = BufferReadStream::new(b"abc".to_vec(), "r");
        let _ = s.write_bytes(b"x");
    }

    #[test]
    fn test_typed_roundtrip_with_swap() {
        let mut w = BufferWriteStream::new("w");
        w.set_swap_bytes(true);
        w.write_i16(0x0102).unwrap();
        w.write_i32(-5).unwrap();
        w.write_i64_array(&[1, -1, i64::MAX]).unwrap();
        let bytes = w.take_buffer().into_vec();
        assert_eq!(&bytes[..2], &0x0102i16.swap_bytes().to_ne_bytes());

        let mut r = BufferReadStream::new(bytes, "r");
        r.set_swap_bytes(true);
        assert_eq!(r.read_i16().unwrap(), Some(0x0102));
        assert_eq!(r.read_i32().unwrap(), Some(-5));
        let mut arr = [0i64; 3];
        r.read_i64_array(&mut arr).unwrap();
        assert_eq!(arr, [1, -1, i64::MAX]);
        assert_eq!(r.read_i8().unwrap(), None);
    }

    #[test]
    fn test_short_typed_read_is_unexpected_eof() {
        let mut r = BufferReadStream::new(vec![1, 2, 3], "r");
        let err = r.read_i32().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert_eq!(r.error_kind(), Some(ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_short_array_read_is_unexpected_eof() {
        let mut r = BufferReadStream::new(vec![0; 6], "r");
        let mut arr = [0i32; 2];
        assert_eq!(
            r.read_i32_array(&mut arr).unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_read_line() {
        let mut r = BufferReadStream::new(b"first\nsecond".to_vec(), "r");
        let mut buf = [0u8; 64];
        let n = r.read_line(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"first\n");
        let n = r.read_line(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"second");
        assert_eq!(r.read_line(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_fmt() {
        let mut w = BufferWriteStream::new("w");
        let n = write!(w, "{}-{}", 12, "ab").unwrap();
        assert_eq!(n, 5);
        assert_eq!(w.buffer().as_slice(), b"12-ab");
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut w = BufferWriteStream::new("w");
        w.close();
        assert!(w.meta().is_closed());
        w.close();
    }

    #[test]
    fn test_set_big_endian() {
        let mut r = BufferReadStream::new(vec![0, 1], "r");
        r.set_big_endian(true);
        assert!(r.meta().is_binary());
        assert_eq!(r.read_i16().unwrap(), Some(1));
    }
}
