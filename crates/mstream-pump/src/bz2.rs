//! Bzip2 backend.

use bzip2::{Action, Compress, Decompress, Status};
use mstream_core::CompressionLevel;

use crate::pump::{PumpAction, PumpBackend, Step, StepError};

/// Work factor passed to libbzip2 (its default).
const WORK_FACTOR: u32 = 30;

/// Bzip2 compressor or decompressor.
pub struct Bzip2 {
    mode: Mode,
}

enum Mode {
    Encode(Compress),
    Decode { inner: Decompress, fed: bool },
}

impl Bzip2 {
    /// Compressing backend; the level selects the block size (1..=9).
    pub fn encoder(level: CompressionLevel) -> Self {
        let level = level.to_level().clamp(1, 9);
        Bzip2 {
            mode: Mode::Encode(Compress::new(bzip2::Compression::new(level), WORK_FACTOR)),
        }
    }

    /// Decompressing backend. Concatenated streams decode as one.
    pub fn decoder() -> Self {
        Bzip2 {
            mode: Mode::Decode {
                inner: Decompress::new(false),
                fed: false,
            },
        }
    }
}

impl PumpBackend for Bzip2 {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> Result<Step, StepError> {
        match &mut self.mode {
            Mode::Encode(enc) => {
                // libbzip2 rejects a run call that cannot make progress
                if action == PumpAction::Continue && src.is_empty() {
                    return Ok(Step::default());
                }
                let bz_action = match action {
                    PumpAction::Continue => Action::Run,
                    PumpAction::FlushData | PumpAction::FlushAll => Action::Flush,
                    PumpAction::Finish => Action::Finish,
                };
                let before_in = enc.total_in();
                let before_out = enc.total_out();
                let status = enc
                    .compress(src, dst, bz_action)
                    .map_err(|e| StepError::new(format!("bzip2: {e}")))?;
                let consumed = (enc.total_in() - before_in) as usize;
                let produced = (enc.total_out() - before_out) as usize;
                let done = match action {
                    PumpAction::Continue => false,
                    PumpAction::FlushData | PumpAction::FlushAll => status == Status::RunOk,
                    PumpAction::Finish => status == Status::StreamEnd,
                };
                Ok(Step {
                    consumed,
                    produced,
                    done,
                })
            }
            Mode::Decode { inner, fed } => {
                if src.is_empty() && !*fed {
                    // Between streams: only the end of input completes
                    return Ok(Step {
                        done: action == PumpAction::Finish,
                        ..Step::default()
                    });
                }
                *fed = true;
                let before_in = inner.total_in();
                let before_out = inner.total_out();
                let status = inner
                    .decompress(src, dst)
                    .map_err(|e| StepError::new(format!("bzip2: {e}")))?;
                let consumed = (inner.total_in() - before_in) as usize;
                let produced = (inner.total_out() - before_out) as usize;
                if status == Status::StreamEnd {
                    // Another stream may follow
                    *inner = Decompress::new(false);
                    *fed = false;
                }
                Ok(Step::progress(consumed, produced))
            }
        }
    }
}
