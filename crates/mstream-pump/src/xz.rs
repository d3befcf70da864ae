//! XZ backend (LZMA2 in the .xz container).

use mstream_core::{CompressionLevel, Error, Result};
use xz2::stream::{Action, Check, Status, Stream as LzmaStream, CONCATENATED};

use crate::pump::{PumpAction, PumpBackend, Step, StepError};

/// XZ compressor or decompressor.
pub struct Xz {
    lzma: LzmaStream,
    encoding: bool,
    fed: bool,
}

impl Xz {
    /// Compressing backend; the level is the xz preset (0..=9).
    pub fn encoder(level: CompressionLevel) -> Result<Self> {
        let preset = level.to_level().min(9);
        let lzma = LzmaStream::new_easy_encoder(preset, Check::Crc64)
            .map_err(|e| Error::open(format!("xz: {e}")))?;
        Ok(Xz {
            lzma,
            encoding: true,
            fed: false,
        })
    }

    /// Decompressing backend without a memory limit. Concatenated streams
    /// decode as one; the end of input is only recognized on `Finish`.
    pub fn decoder() -> Result<Self> {
        let lzma = LzmaStream::new_stream_decoder(u64::MAX, CONCATENATED)
            .map_err(|e| Error::open(format!("xz: {e}")))?;
        Ok(Xz {
            lzma,
            encoding: false,
            fed: false,
        })
    }
}

impl PumpBackend for Xz {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> core::result::Result<Step, StepError> {
        if action == PumpAction::Continue && src.is_empty() {
            return Ok(Step::default());
        }
        if !self.encoding && src.is_empty() && !self.fed {
            return Ok(Step {
                done: action == PumpAction::Finish,
                ..Step::default()
            });
        }
        self.fed |= !src.is_empty();

        let lzma_action = if self.encoding {
            match action {
                PumpAction::Continue => Action::Run,
                PumpAction::FlushData => Action::SyncFlush,
                PumpAction::FlushAll => Action::FullFlush,
                PumpAction::Finish => Action::Finish,
            }
        } else if action == PumpAction::Finish {
            Action::Finish
        } else {
            Action::Run
        };
        let before_in = self.lzma.total_in();
        let before_out = self.lzma.total_out();
        let status = self
            .lzma
            .process(src, dst, lzma_action)
            .map_err(|e| StepError::new(format!("xz: {e}")))?;
        let consumed = (self.lzma.total_in() - before_in) as usize;
        let produced = (self.lzma.total_out() - before_out) as usize;

        let done = status == Status::StreamEnd && (!self.encoding || action != PumpAction::Continue);
        Ok(Step {
            consumed,
            produced,
            done,
        })
    }
}
