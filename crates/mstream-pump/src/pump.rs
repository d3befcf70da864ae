//! The pump engine.
//!
//! A [`Pump`] drives a [`PumpBackend`] between a caller buffer and an inner
//! stream through one staging buffer:
//!
//! ```text
//! read:   inner ──read──▶ staging ──step──▶ caller buffer
//! write:  caller buffer ──step──▶ staging ──write──▶ inner
//! ```
//!
//! The staging buffer is sized once, to at least the backend's elbow room,
//! and every write-direction step is invoked with at least that much free
//! destination space.

use mstream_core::buffer::Staging;
use mstream_core::{Error, ErrorKind, FlushLevel, Result, Stream, StreamExt, StreamMeta};
use thiserror::Error;
use tracing::{debug, trace};

/// Message used when a backend fails without saying why.
pub const GENERIC_FAILURE: &str = "processing failed without further detail";

/// What the engine asks of a backend step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PumpAction {
    /// Transform what is available; more input may follow.
    Continue,
    /// Emit everything buffered so that the peer can decode it.
    FlushData,
    /// Like `FlushData`, and reset so that a reader can resynchronize.
    FlushAll,
    /// No more input will ever arrive; emit all remaining state.
    Finish,
}

impl From<FlushLevel> for PumpAction {
    fn from(level: FlushLevel) -> Self {
        match level {
            FlushLevel::Data => PumpAction::FlushData,
            FlushLevel::All => PumpAction::FlushAll,
        }
    }
}

/// Outcome of one backend step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Step {
    /// Bytes taken from the source window.
    pub consumed: usize,
    /// Bytes written to the destination window.
    pub produced: usize,
    /// The requested flush or finish is complete (or the encoded stream
    /// ended, for decoders).
    pub done: bool,
}

impl Step {
    /// A step that made progress but is not done.
    pub fn progress(consumed: usize, produced: usize) -> Self {
        Step {
            consumed,
            produced,
            done: false,
        }
    }

    /// A step that completed the current action.
    pub fn done(consumed: usize, produced: usize) -> Self {
        Step {
            consumed,
            produced,
            done: true,
        }
    }
}

/// Failure of a backend step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", failure_text(.detail))]
pub struct StepError {
    /// The backend's own error text, if it has one.
    pub detail: Option<String>,
}

impl StepError {
    /// Failure with a backend message.
    pub fn new(detail: impl Into<String>) -> Self {
        StepError {
            detail: Some(detail.into()),
        }
    }

    /// Failure without a message.
    pub fn unknown() -> Self {
        StepError { detail: None }
    }

    /// The text reported to the caller.
    pub fn text(&self) -> &str {
        failure_text(&self.detail)
    }
}

fn failure_text(detail: &Option<String>) -> &str {
    detail.as_deref().unwrap_or(GENERIC_FAILURE)
}

/// A byte transformation the pump can drive.
pub trait PumpBackend: Send {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Worst-case bytes a single step may emit.
    fn elbow_room(&self) -> usize {
        0
    }

    /// Transform bytes from `src` into `dst`.
    ///
    /// Non-terminal steps must make progress (consume or produce) whenever
    /// `src` is non-empty or the backend still holds output.
    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> core::result::Result<Step, StepError>;

    /// Release backend resources. Called exactly once.
    fn finalize(&mut self) {}
}

/// Result of a write-direction pump pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Input consumed; the backend may still hold state.
    Pending,
    /// The requested flush or finish completed and was drained.
    Complete,
}

/// Pump state: backend plus staging buffer.
pub struct Pump<B: PumpBackend> {
    backend: B,
    staging: Staging,
    elbow_room: usize,
    input_done: bool,
    finished: bool,
}

impl<B: PumpBackend> Pump<B> {
    /// Create a pump with a staging buffer of at least `buffer_size` bytes.
    pub fn new(backend: B, buffer_size: usize) -> Self {
        let elbow_room = backend.elbow_room();
        let capacity = buffer_size.max(elbow_room).max(1);
        Pump {
            backend,
            staging: Staging::with_capacity(capacity),
            elbow_room,
            input_done: false,
            finished: false,
        }
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Staging buffer capacity.
    pub fn capacity(&self) -> usize {
        self.staging.capacity()
    }

    /// Backend elbow room.
    pub fn elbow_room(&self) -> usize {
        self.elbow_room
    }

    /// True once the transformation reported completion.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn backend_error(&self, kind: ErrorKind, err: StepError) -> Error {
        debug!(backend = self.backend.name(), "backend step failed: {}", err.text());
        Error::new(kind, err.text())
    }

    /// Fill `dst` with transformed bytes pulled from `inner`.
    ///
    /// Returns fewer bytes than requested only when the transformation
    /// ended; `Ok(0)` is end of file.
    pub fn pump_in(&mut self, inner: &mut dyn Stream, dst: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < dst.len() && !self.finished {
            if self.staging.is_empty() && !self.input_done {
                let n = inner.read_bytes(self.staging.spare())?;
                if n == 0 {
                    self.input_done = true;
                } else {
                    self.staging.commit(n);
                }
            }
            let action = if self.input_done {
                PumpAction::Finish
            } else {
                PumpAction::Continue
            };
            let step = match self
                .backend
                .step(self.staging.staged(), &mut dst[filled..], action)
            {
                Ok(step) => step,
                Err(err) => return Err(self.backend_error(ErrorKind::Read, err)),
            };
            self.staging.release(step.consumed);
            filled += step.produced;
            if step.done {
                trace!(backend = self.backend.name(), "input transformation complete");
                self.finished = true;
            } else if step.consumed == 0 && step.produced == 0 && self.input_done {
                return Err(Error::read(format!(
                    "{}: truncated input",
                    self.backend.name()
                )));
            } else if step.consumed == 0 && step.produced == 0 && !self.staging.is_empty() {
                return Err(self.backend_error(ErrorKind::Read, StepError::unknown()));
            }
        }
        Ok(filled)
    }

    /// Push `src` through the backend into `inner`.
    ///
    /// With [`PumpAction::Continue`] this returns as soon as `src` is
    /// consumed and never reports [`Progress::Complete`]. Flush and finish
    /// actions loop until the backend is drained, then write the staging
    /// buffer out.
    pub fn pump_out(
        &mut self,
        inner: &mut dyn Stream,
        mut src: &[u8],
        action: PumpAction,
    ) -> Result<Progress> {
        if self.finished {
            if src.is_empty() {
                return Ok(Progress::Complete);
            }
            return Err(Error::write(format!(
                "{}: write after end of stream",
                self.backend.name()
            )));
        }
        let min_room = self.elbow_room.max(1);
        loop {
            if self.staging.spare_len() < min_room {
                self.drain(inner)?;
            }
            let step = match self.backend.step(src, self.staging.spare(), action) {
                Ok(step) => step,
                Err(err) => return Err(self.backend_error(ErrorKind::Write, err)),
            };
            src = &src[step.consumed..];
            self.staging.commit(step.produced);

            let stalled = step.consumed == 0 && step.produced == 0 && !step.done;
            if stalled {
                if self.staging.is_empty() {
                    return Err(self.backend_error(ErrorKind::Write, StepError::unknown()));
                }
                self.drain(inner)?;
            }
            if !src.is_empty() {
                continue;
            }
            match action {
                PumpAction::Continue => return Ok(Progress::Pending),
                _ if step.done => {
                    self.drain(inner)?;
                    if action == PumpAction::Finish {
                        self.finished = true;
                    }
                    return Ok(Progress::Complete);
                }
                _ => {}
            }
        }
    }

    /// Write everything staged to `inner`.
    fn drain(&mut self, inner: &mut dyn Stream) -> Result<()> {
        if !self.staging.is_empty() {
            trace!(
                backend = self.backend.name(),
                bytes = self.staging.len(),
                "draining staging buffer"
            );
            let result = inner.write_bytes(self.staging.staged());
            self.staging.reset();
            result?;
        }
        Ok(())
    }
}

impl<B: PumpBackend> Drop for Pump<B> {
    fn drop(&mut self) {
        self.backend.finalize();
    }
}

/// A stream that pumps its data through a backend on the way to or from
/// its inner stream.
pub struct PumpStream<B: PumpBackend> {
    meta: StreamMeta,
    inner: Box<dyn Stream>,
    pump: Pump<B>,
}

impl<B: PumpBackend> PumpStream<B> {
    /// Wrap a read stream: reads return transformed inner bytes.
    pub fn reader(inner: Box<dyn Stream>, backend: B, buffer_size: usize) -> Result<Self> {
        if !inner.is_readonly() {
            return Err(Error::open(format!(
                "{}: {} reader needs a read stream",
                inner.name(),
                backend.name()
            )));
        }
        Ok(Self::wrap(inner, backend, buffer_size))
    }

    /// Wrap a write stream: written bytes are transformed before reaching
    /// the inner stream.
    pub fn writer(inner: Box<dyn Stream>, backend: B, buffer_size: usize) -> Result<Self> {
        if inner.is_readonly() {
            return Err(Error::open(format!(
                "{}: {} writer needs a write stream",
                inner.name(),
                backend.name()
            )));
        }
        Ok(Self::wrap(inner, backend, buffer_size))
    }

    fn wrap(inner: Box<dyn Stream>, backend: B, buffer_size: usize) -> Self {
        let meta = StreamMeta::wrapping(inner.as_ref());
        let pump = Pump::new(backend, buffer_size);
        debug!(
            stream = %meta.name(),
            backend = pump.backend().name(),
            access = meta.access().name(),
            staging = pump.capacity(),
            elbow_room = pump.elbow_room(),
            "pump stream created"
        );
        PumpStream { meta, inner, pump }
    }

    /// The pump state.
    pub fn pump(&self) -> &Pump<B> {
        &self.pump
    }
}

impl<B: PumpBackend> Stream for PumpStream<B> {
    fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut StreamMeta {
        &mut self.meta
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.pump.pump_in(self.inner.as_mut(), buf)
    }

    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        self.pump
            .pump_out(self.inner.as_mut(), buf, PumpAction::Continue)
            .map(|_| ())
    }

    fn flush_raw(&mut self, level: FlushLevel) -> Result<()> {
        self.pump
            .pump_out(self.inner.as_mut(), &[], PumpAction::from(level))?;
        self.inner.flush(level)
    }

    fn close_raw(&mut self) {
        if !self.meta.is_readonly() && self.meta.error().is_none() {
            let result = self
                .pump
                .pump_out(self.inner.as_mut(), &[], PumpAction::Finish)
                .and_then(|_| self.inner.flush(FlushLevel::Data));
            if let Err(err) = result {
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

impl<B: PumpBackend> Drop for PumpStream<B> {
    fn drop(&mut self) {
        self.close();
    }
}
