//! Bytes a backend has produced but not yet handed to the engine.

#[derive(Debug, Default)]
pub(crate) struct OutputQueue {
    buf: Vec<u8>,
    pos: usize,
}

impl OutputQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        OutputQueue {
            buf: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Queue bytes behind whatever is still pending.
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Spare room at the tail, for producers that write in place. Returns
    /// the slice to fill; call [`commit`](Self::commit) with the count used.
    pub(crate) fn reserve(&mut self, len: usize) -> &mut [u8] {
        let start = self.buf.len();
        self.buf.resize(start + len, 0);
        &mut self.buf[start..]
    }

    /// Keep `used` bytes of the last [`reserve`](Self::reserve) call.
    pub(crate) fn commit(&mut self, reserved: usize, used: usize) {
        let len = self.buf.len() - reserved + used;
        self.buf.truncate(len);
    }

    /// Copy as much as fits into `dst`. Returns the count copied.
    pub(crate) fn emit(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.buf.len() - self.pos);
        dst[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
        n
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }
}
