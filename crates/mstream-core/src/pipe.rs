//! In-process pipe: a connected pair of read and write streams.
//!
//! The writer blocks while the pipe holds [`PIPE_CAPACITY`] bytes; the reader
//! blocks while it is empty. Closing (or dropping) the writer turns the
//! remaining bytes into a normal end of file for the reader. Writing after
//! the reader went away fails.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::{Error, Result};
use crate::stream::{Stream, StreamExt, StreamMeta};

/// Bytes the pipe holds before the writer blocks.
pub const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug)]
struct PipeState {
    data: VecDeque<u8>,
    reader_open: bool,
    writer_open: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<PipeState>,
    readable: Condvar,
    writable: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a connected `(reader, writer)` pair.
pub fn rendezvous_streams(name: &str) -> (PipeReader, PipeWriter) {
    let shared = Arc::new(Shared {
        state: Mutex::new(PipeState {
            data: VecDeque::new(),
            reader_open: true,
            writer_open: true,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    let reader = PipeReader {
        meta: StreamMeta::reader(name).binary(),
        shared: Arc::clone(&shared),
    };
    let writer = PipeWriter {
        meta: StreamMeta::writer(name).binary(),
        shared,
    };
    (reader, writer)
}

/// Read end of a pipe.
#[derive(Debug)]
pub struct PipeReader {
    meta: StreamMeta,
    shared: Arc<Shared>,
}

impl Stream for PipeReader {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    /// Blocks until at least one byte is available or the writer is gone.
    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.lock();
        while state.data.is_empty() && state.writer_open {
            state = match self.meta.timeout() {
                None => self
                    .shared
                    .readable
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(timeout) => {
                    let (state, result) = self
                        .shared
                        .readable
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner);
                    if result.timed_out() && state.data.is_empty() && self.meta.should_abandon() {
                        return Err(Error::timeout(format!(
                            "{}: timed out waiting for data",
                            self.meta.name()
                        )));
                    }
                    state
                }
            };
        }
        let n = buf.len().min(state.data.len());
        for (dst, src) in buf.iter_mut().zip(state.data.drain(..n)) {
            *dst = src;
        }
        drop(state);
        if n > 0 {
            self.shared.writable.notify_all();
        }
        Ok(n)
    }

    fn close_raw(&mut self) {
        trace!(stream = %self.meta.name(), "closing pipe reader");
        self.shared.lock().reader_open = false;
        self.shared.writable.notify_all();
    }

    fn is_alive(&self) -> bool {
        let state = self.shared.lock();
        state.writer_open || !state.data.is_empty()
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// Write end of a pipe.
#[derive(Debug)]
pub struct PipeWriter {
    meta: StreamMeta,
    shared: Arc<Shared>,
}

impl Stream for PipeWriter {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn write_raw(&mut self, mut buf: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        while !buf.is_empty() {
            if !state.reader_open {
                return Err(Error::write(format!("{}: broken pipe", self.meta.name())));
            }
            let room = PIPE_CAPACITY.saturating_sub(state.data.len());
            if room == 0 {
                state = match self.meta.timeout() {
                    None => self
                        .shared
                        .writable
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner),
                    Some(timeout) => {
                        let (state, result) = self
                            .shared
                            .writable
                            .wait_timeout(state, timeout)
                            .unwrap_or_else(PoisonError::into_inner);
                        if result.timed_out() && self.meta.should_abandon() {
                            return Err(Error::timeout(format!(
                                "{}: timed out waiting for the reader",
                                self.meta.name()
                            )));
                        }
                        state
                    }
                };
                continue;
            }
            let n = room.min(buf.len());
            state.data.extend(&buf[..n]);
            buf = &buf[n..];
            self.shared.readable.notify_all();
        }
        Ok(())
    }

    fn close_raw(&mut self) {
        trace!(stream = %self.meta.name(), "closing pipe writer");
        self.shared.lock().writer_open = false;
        self.shared.readable.notify_all();
    }

    fn is_alive(&self) -> bool {
        self.shared.lock().reader_open
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}
