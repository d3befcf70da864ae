//! Gzip backend (RFC 1952).
//!
//! The deflate body is produced and consumed by `flate2`'s raw engines; the
//! member header and the CRC-32/ISIZE trailer are handled here so that the
//! stream can be driven step by step.

use flate2::{Compress, Crc, Decompress, FlushCompress, FlushDecompress, Status};
use mstream_core::CompressionLevel;

use crate::pump::{PumpAction, PumpBackend, Step, StepError};
use crate::queue::OutputQueue;

/// Gzip magic number.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compression method: DEFLATE.
const CM_DEFLATE: u8 = 8;

/// Header flags.
const FHCRC: u8 = 2;
const FEXTRA: u8 = 4;
const FNAME: u8 = 8;
const FCOMMENT: u8 = 16;
const FRESERVED: u8 = 0xe0;

/// OS identifier: Unix.
const OS_UNIX: u8 = 3;

const HEADER_LEN: usize = 10;
const TRAILER_LEN: usize = 8;

/// Gzip compressor or decompressor.
pub struct Gzip {
    mode: Mode,
}

enum Mode {
    Encode(Encoder),
    Decode(Decoder),
}

impl Gzip {
    /// Compressing backend for write streams.
    pub fn encoder(level: CompressionLevel) -> Self {
        let numeric = level.to_level().min(9);
        let xfl = match level {
            CompressionLevel::Best => 2,
            CompressionLevel::Fast => 4,
            _ => 0,
        };
        let mut queue = OutputQueue::with_capacity(HEADER_LEN + TRAILER_LEN);
        queue.push(&GZIP_MAGIC);
        queue.push(&[CM_DEFLATE, 0, 0, 0, 0, 0, xfl, OS_UNIX]);
        Gzip {
            mode: Mode::Encode(Encoder {
                deflate: Compress::new(flate2::Compression::new(numeric), false),
                crc: Crc::new(),
                queue,
                ended: false,
            }),
        }
    }

    /// Decompressing backend for read streams. Concatenated members decode
    /// as one stream.
    pub fn decoder() -> Self {
        Gzip {
            mode: Mode::Decode(Decoder {
                inflate: Decompress::new(false),
                crc: Crc::new(),
                state: DecodeState::Header,
                acc: Vec::with_capacity(HEADER_LEN),
            }),
        }
    }
}

impl PumpBackend for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> Result<Step, StepError> {
        match &mut self.mode {
            Mode::Encode(enc) => enc.step(src, dst, action),
            Mode::Decode(dec) => dec.step(src, dst, action),
        }
    }
}

struct Encoder {
    deflate: Compress,
    crc: Crc,
    /// Header at the start, trailer at the end.
    queue: OutputQueue,
    ended: bool,
}

impl Encoder {
    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> Result<Step, StepError> {
        let mut produced = self.queue.emit(dst);
        if !self.queue.is_empty() {
            return Ok(Step::progress(0, produced));
        }
        if self.ended {
            return Ok(Step::done(0, produced));
        }

        let flush = match action {
            PumpAction::Continue => FlushCompress::None,
            PumpAction::FlushData => FlushCompress::Sync,
            PumpAction::FlushAll => FlushCompress::Full,
            PumpAction::Finish => FlushCompress::Finish,
        };
        let room = dst.len() - produced;
        let before_in = self.deflate.total_in();
        let before_out = self.deflate.total_out();
        let status = self
            .deflate
            .compress(src, &mut dst[produced..], flush)
            .map_err(|e| StepError::new(format!("gzip: {e}")))?;
        let consumed = (self.deflate.total_in() - before_in) as usize;
        let written = (self.deflate.total_out() - before_out) as usize;
        self.crc.update(&src[..consumed]);
        produced += written;

        match action {
            PumpAction::Continue => Ok(Step::progress(consumed, produced)),
            PumpAction::FlushData | PumpAction::FlushAll => Ok(Step {
                consumed,
                produced,
                done: consumed == src.len() && written < room,
            }),
            PumpAction::Finish => {
                if status != Status::StreamEnd {
                    return Ok(Step::progress(consumed, produced));
                }
                self.ended = true;
                self.queue.push(&self.crc.sum().to_le_bytes());
                self.queue.push(&self.crc.amount().to_le_bytes());
                produced += self.queue.emit(&mut dst[produced..]);
                Ok(Step {
                    consumed,
                    produced,
                    done: self.queue.is_empty(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Header,
    Body,
    Trailer,
    Done,
}

struct Decoder {
    inflate: Decompress,
    crc: Crc,
    state: DecodeState,
    /// Partial header or trailer bytes.
    acc: Vec<u8>,
}

impl Decoder {
    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> Result<Step, StepError> {
        match self.state {
            DecodeState::Header => {
                if src.is_empty() {
                    // Input may end before a member, never inside one
                    if action == PumpAction::Finish && self.acc.is_empty() {
                        self.state = DecodeState::Done;
                        return Ok(Step::done(0, 0));
                    }
                    return Ok(Step::progress(0, 0));
                }
                let before = self.acc.len();
                self.acc.extend_from_slice(src);
                match parse_header(&self.acc)? {
                    None => Ok(Step::progress(src.len(), 0)),
                    Some(len) => {
                        self.acc.clear();
                        self.state = DecodeState::Body;
                        Ok(Step::progress(len - before, 0))
                    }
                }
            }
            DecodeState::Body => {
                let before_in = self.inflate.total_in();
                let before_out = self.inflate.total_out();
                let status = self
                    .inflate
                    .decompress(src, dst, FlushDecompress::None)
                    .map_err(|e| StepError::new(format!("gzip: {e}")))?;
                let consumed = (self.inflate.total_in() - before_in) as usize;
                let produced = (self.inflate.total_out() - before_out) as usize;
                self.crc.update(&dst[..produced]);
                if status == Status::StreamEnd {
                    self.state = DecodeState::Trailer;
                }
                Ok(Step::progress(consumed, produced))
            }
            DecodeState::Trailer => {
                let n = (TRAILER_LEN - self.acc.len()).min(src.len());
                self.acc.extend_from_slice(&src[..n]);
                if self.acc.len() < TRAILER_LEN {
                    return Ok(Step::progress(n, 0));
                }
                let crc = u32::from_le_bytes([self.acc[0], self.acc[1], self.acc[2], self.acc[3]]);
                let isize = u32::from_le_bytes([self.acc[4], self.acc[5], self.acc[6], self.acc[7]]);
                if crc != self.crc.sum() {
                    return Err(StepError::new("gzip: crc mismatch"));
                }
                if isize != self.crc.amount() {
                    return Err(StepError::new("gzip: length mismatch"));
                }
                // Another member may follow
                self.inflate.reset(false);
                self.crc.reset();
                self.acc.clear();
                self.state = DecodeState::Header;
                Ok(Step::progress(n, 0))
            }
            DecodeState::Done => Ok(Step::done(0, 0)),
        }
    }
}

/// Parse a member header. Returns its length once `buf` holds all of it.
fn parse_header(buf: &[u8]) -> Result<Option<usize>, StepError> {
    if buf.len() >= 2 && buf[..2] != GZIP_MAGIC {
        return Err(StepError::new("gzip: invalid magic"));
    }
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    if buf[2] != CM_DEFLATE {
        return Err(StepError::new("gzip: unsupported compression method"));
    }
    let flags = buf[3];
    if flags & FRESERVED != 0 {
        return Err(StepError::new("gzip: reserved header flags set"));
    }

    let mut pos = HEADER_LEN;
    if flags & FEXTRA != 0 {
        if buf.len() < pos + 2 {
            return Ok(None);
        }
        let xlen = u16::from_le_bytes([buf[pos], buf[pos + 1]]) as usize;
        pos += 2 + xlen;
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            if pos >= buf.len() {
                return Ok(None);
            }
            match buf[pos..].iter().position(|&b| b == 0) {
                Some(end) => pos += end + 1,
                None => return Ok(None),
            }
        }
    }
    if flags & FHCRC != 0 {
        pos += 2;
    }
    Ok(if buf.len() >= pos { Some(pos) } else { None })
}
