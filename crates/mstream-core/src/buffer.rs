//! Byte buffers used by the stream layers.
//!
//! [`Buffer`] is the backing store of the in-memory streams. [`Staging`]
//! holds bytes a wrapper has produced or received but not yet handed on.

/// Backing store of the memory streams.
///
/// `pos` is the read cursor of a [`BufferReadStream`](crate::memory::BufferReadStream).
/// A [`BufferWriteStream`](crate::memory::BufferWriteStream) appends and
/// keeps `pos` at the end of the data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    pos: usize,
}

impl Buffer {
    /// Wrap existing bytes, cursor at the start.
    pub fn new(data: Vec<u8>) -> Self {
        Buffer { data, pos: 0 }
    }

    /// Empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Buffer {
            data: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// All bytes held.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Bytes after the cursor.
    #[inline]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Cursor position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes held.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the buffer holds nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy up to `buf.len()` bytes from the cursor onward.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    /// Append bytes; the allocation grows by doubling.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.pos = self.data.len();
    }

    /// Move the cursor back to the start.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Take the bytes out.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Buffer::new(data)
    }
}

/// Bytes held between a stream and its inner stream.
///
/// The staged bytes are `data[start..end]`. Producers fill [`spare`] in
/// place and [`commit`] what they wrote; consumers [`release`] from the
/// front. The allocation never changes size, and the window rewinds to
/// offset 0 whenever it runs empty.
///
/// [`spare`]: Staging::spare
/// [`commit`]: Staging::commit
/// [`release`]: Staging::release
#[derive(Debug)]
pub struct Staging {
    data: Box<[u8]>,
    start: usize,
    end: usize,
}

impl Staging {
    pub fn with_capacity(capacity: usize) -> Self {
        Staging {
            data: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of staged bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn staged(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Unused space after the staged bytes.
    pub fn spare(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    pub fn spare_len(&self) -> usize {
        self.data.len() - self.end
    }

    /// Stage `n` bytes just written into [`spare`](Self::spare).
    pub fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.spare_len());
        self.end += n;
    }

    /// Copy as much of `bytes` as fits into the spare space.
    pub fn stage(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.spare_len());
        self.data[self.end..self.end + n].copy_from_slice(&bytes[..n]);
        self.end += n;
        n
    }

    /// Hand on the first `n` staged bytes.
    pub fn release(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        self.start += n;
        if self.start >= self.end {
            self.reset();
        }
    }

    /// Discard everything staged.
    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}
