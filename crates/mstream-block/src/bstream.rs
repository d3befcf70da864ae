//! Buffered reader over any read stream.
//!
//! A [`Bstream`] keeps a growable buffer in front of a stream so callers
//! can look at more than one read's worth of data at a time. Consumed
//! bytes are compacted away before the buffer grows, and one spare byte
//! after the valid data is always kept at zero.
//!
//! ```text
//! ┌──────────┬─────────────────┬───┬─────────────┐
//! │ consumed │ unread          │ 0 │ free        │
//! └──────────┴─────────────────┴───┴─────────────┘
//! 0          pos               len              size
//! ```

use mstream_core::{Error, Result, Stream, StreamConfig, StreamExt};
use tracing::trace;

/// Chunk size used in line mode.
const LINE_MODE_SIZE: usize = 8192;

/// How [`Bstream::next`] fetches data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Read up to this many bytes per call.
    Chunk(usize),
    /// Read byte by byte until a newline.
    Line,
}

/// Growable read buffer over a stream.
pub struct Bstream {
    inner: Box<dyn Stream>,
    /// `size + 1` bytes; the extra one holds the terminator.
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    eof: bool,
    mode: ReadMode,
}

impl Bstream {
    /// Buffer `inner` with an initial chunk size of `size` bytes. A size of
    /// zero selects line mode.
    pub fn new(inner: Box<dyn Stream>, size: usize) -> Result<Self> {
        if !inner.is_readonly() {
            return Err(Error::open(format!("{}: buffered reader needs a read stream", inner.name())));
        }
        let (mode, size) = match size {
            0 => (ReadMode::Line, LINE_MODE_SIZE),
            n => (ReadMode::Chunk(n), n),
        };
        Ok(Bstream {
            inner,
            buf: vec![0; size + 1],
            pos: 0,
            len: 0,
            eof: false,
            mode,
        })
    }

    /// Buffer `inner` with the chunk size from `config`.
    pub fn from_config(inner: Box<dyn Stream>, config: &StreamConfig) -> Result<Self> {
        Self::new(inner, config.bstream_size)
    }

    /// Current capacity, excluding the terminator byte.
    pub fn capacity(&self) -> usize {
        self.buf.len() - 1
    }

    /// How [`next`](Self::next) fetches data.
    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// True once the inner stream reported end of file (or end of message).
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Allow reading past an end of message, e.g. the next request on a
    /// block stream.
    pub fn clear_eof(&mut self) {
        self.eof = false;
    }

    /// Buffered bytes not yet consumed.
    pub fn available(&self) -> &[u8] {
        &self.buf[self.pos..self.len]
    }

    /// Mark `n` buffered bytes as consumed.
    pub fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.len);
    }

    /// The wrapped stream.
    pub fn inner(&self) -> &dyn Stream {
        self.inner.as_ref()
    }

    /// The wrapped stream, mutably. Bytes read from it directly bypass the
    /// buffer.
    pub fn inner_mut(&mut self) -> &mut dyn Stream {
        self.inner.as_mut()
    }

    /// Give back the wrapped stream. Buffered bytes are lost.
    pub fn into_inner(self) -> Box<dyn Stream> {
        self.inner
    }

    /// Issue one inner read of up to `n` bytes, compacting and growing the
    /// buffer first so that at least `n` bytes fit after the unread data.
    ///
    /// Returns the number of bytes added; 0 at end of file, and on every
    /// call after that.
    pub fn read(&mut self, n: usize) -> Result<usize> {
        if self.eof {
            return Ok(0);
        }
        self.compact();
        let size = self.capacity();
        if self.len + n > size {
            let grown = size + n.max(size);
            trace!(stream = %self.inner.name(), from = size, to = grown, "growing read buffer");
            self.buf.resize(grown + 1, 0);
        }
        let want = n.min(self.capacity() - self.len);
        let got = self.inner.read_bytes(&mut self.buf[self.len..self.len + want])?;
        if got == 0 && want > 0 {
            self.eof = true;
            return Ok(0);
        }
        self.len += got;
        self.buf[self.len] = 0;
        Ok(got)
    }

    /// Fetch more data according to the read mode.
    ///
    /// In chunk mode this is one [`read`](Self::read) of the chunk size. In
    /// line mode bytes are read one at a time up to and including the next
    /// newline, so nothing past the line is taken from the inner stream.
    /// Returns the number of bytes added.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<usize> {
        match self.mode {
            ReadMode::Chunk(size) => self.read(size),
            ReadMode::Line => {
                let mut added = 0;
                while self.read(1)? == 1 {
                    added += 1;
                    if self.buf[self.len - 1] == b'\n' {
                        break;
                    }
                }
                Ok(added)
            }
        }
    }

    /// Consume and return the next line without its `\n`. A final line
    /// without a newline is returned at end of file; `Ok(None)` after that.
    pub fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut scanned = 0;
        loop {
            if let Some(i) = self.available()[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + i;
                let line = self.available()[..end].to_vec();
                self.consume(end + 1);
                return Ok(Some(line));
            }
            scanned = self.available().len();
            if self.next()? == 0 {
                if self.available().is_empty() {
                    return Ok(None);
                }
                let line = self.available().to_vec();
                self.consume(line.len());
                return Ok(Some(line));
            }
        }
    }

    /// Iterate over the remaining lines.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { bs: self }
    }

    fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        // Move the unread bytes and their terminator down
        self.buf.copy_within(self.pos..=self.len, 0);
        self.len -= self.pos;
        self.pos = 0;
    }
}

/// Iterator over the lines of a [`Bstream`].
pub struct Lines<'a> {
    bs: &'a mut Bstream,
}

impl Iterator for Lines<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.bs.next_line().transpose()
    }
}
