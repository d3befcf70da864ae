//! LZ4 frame backend.
//!
//! Frames are written with independent 64 KiB blocks and a content
//! checksum. The reader accepts any block size, verifies block and content
//! checksums when present, skips skippable frames and rejects linked-block
//! frames. Concatenated frames decode as one stream.
//!
//! ## Frame layout
//!
//! ```text
//! magic(4) FLG BD [content size(8)] [dict id(4)] HC
//! { block size(4) data [block checksum(4)] }*
//! end mark(4) [content checksum(4)]
//! ```

use lz4_flex::block::{compress_into, decompress_into, get_maximum_output_size};
use xxhash_rust::xxh32::{xxh32, Xxh32};

use crate::pump::{PumpAction, PumpBackend, Step, StepError};
use crate::queue::OutputQueue;

const MAGIC: u32 = 0x184D_2204;
const SKIPPABLE_MAGIC: u32 = 0x184D_2A50;
const SKIPPABLE_MASK: u32 = 0xFFFF_FFF0;

const FLG_VERSION: u8 = 0x40;
const FLG_BLOCK_INDEPENDENT: u8 = 0x20;
const FLG_BLOCK_CHECKSUM: u8 = 0x10;
const FLG_CONTENT_SIZE: u8 = 0x08;
const FLG_CONTENT_CHECKSUM: u8 = 0x04;
const FLG_RESERVED: u8 = 0x02;
const FLG_DICT_ID: u8 = 0x01;

/// Block maximum size id 4 (64 KiB).
const BD_64K: u8 = 0x40;
const BLOCK_SIZE: usize = 64 * 1024;

const UNCOMPRESSED_BIT: u32 = 0x8000_0000;

/// Largest header this encoder writes: magic, FLG, BD, HC.
const HEADER_LEN: usize = 7;

/// LZ4 frame compressor or decompressor.
pub struct Lz4Frame {
    mode: Mode,
}

enum Mode {
    Encode(Encoder),
    Decode(Box<Decoder>),
}

impl Lz4Frame {
    /// Compressing backend.
    pub fn encoder() -> Self {
        Lz4Frame {
            mode: Mode::Encode(Encoder {
                block: Vec::with_capacity(BLOCK_SIZE),
                queue: OutputQueue::with_capacity(max_step_output()),
                hasher: Xxh32::new(0),
                header_written: false,
                ended: false,
            }),
        }
    }

    /// Decompressing backend.
    pub fn decoder() -> Self {
        Lz4Frame {
            mode: Mode::Decode(Box::new(Decoder {
                state: DecodeState::Magic,
                acc: Vec::with_capacity(16),
                need: 4,
                flags: 0,
                block_max: 0,
                hasher: Xxh32::new(0),
                out: Vec::new(),
                out_pos: 0,
            })),
        }
    }
}

/// Worst case for one encoder step: header, one sealed block, end mark and
/// content checksum.
fn max_step_output() -> usize {
    HEADER_LEN + 4 + get_maximum_output_size(BLOCK_SIZE) + 4 + 4
}

impl PumpBackend for Lz4Frame {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn elbow_room(&self) -> usize {
        match self.mode {
            Mode::Encode(_) => max_step_output(),
            Mode::Decode(_) => 0,
        }
    }

    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> Result<Step, StepError> {
        match &mut self.mode {
            Mode::Encode(enc) => enc.step(src, dst, action),
            Mode::Decode(dec) => dec.step(src, dst, action),
        }
    }
}

struct Encoder {
    block: Vec<u8>,
    queue: OutputQueue,
    hasher: Xxh32,
    header_written: bool,
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
        if !self.header_written {
            let descriptor = [FLG_VERSION | FLG_BLOCK_INDEPENDENT | FLG_CONTENT_CHECKSUM, BD_64K];
            self.queue.push(&MAGIC.to_le_bytes());
            self.queue.push(&descriptor);
            self.queue.push(&[(xxh32(&descriptor, 0) >> 8) as u8]);
            self.header_written = true;
        }

        let take = (BLOCK_SIZE - self.block.len()).min(src.len());
        self.block.extend_from_slice(&src[..take]);
        self.hasher.update(&src[..take]);
        let all_taken = take == src.len();
        if self.block.len() == BLOCK_SIZE {
            self.seal_block()?;
        }

        if all_taken {
            match action {
                PumpAction::Continue => {}
                PumpAction::FlushData | PumpAction::FlushAll => self.seal_block()?,
                PumpAction::Finish => {
                    self.seal_block()?;
                    self.queue.push(&0u32.to_le_bytes());
                    self.queue.push(&self.hasher.digest().to_le_bytes());
                    self.ended = true;
                }
            }
        }

        produced += self.queue.emit(&mut dst[produced..]);
        Ok(Step {
            consumed: take,
            produced,
            done: action != PumpAction::Continue && all_taken && self.queue.is_empty(),
        })
    }

    /// Compress the pending block into the queue. Incompressible blocks are
    /// stored as is.
    fn seal_block(&mut self) -> Result<(), StepError> {
        if self.block.is_empty() {
            return Ok(());
        }
        let len = self.block.len();
        let reserved = 4 + get_maximum_output_size(len);
        let room = self.queue.reserve(reserved);
        let n = compress_into(&self.block, &mut room[4..])
            .map_err(|e| StepError::new(format!("lz4: {e}")))?;
        let used = if n >= len {
            room[..4].copy_from_slice(&(len as u32 | UNCOMPRESSED_BIT).to_le_bytes());
            room[4..4 + len].copy_from_slice(&self.block);
            4 + len
        } else {
            room[..4].copy_from_slice(&(n as u32).to_le_bytes());
            4 + n
        };
        self.queue.commit(reserved, used);
        self.block.clear();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Magic,
    Descriptor,
    SkipSize,
    Skip(usize),
    BlockSize,
    Block { size: usize, compressed: bool },
    ContentChecksum,
}

struct Decoder {
    state: DecodeState,
    /// Bytes of the current header field or block.
    acc: Vec<u8>,
    /// Length `acc` must reach before it can be interpreted.
    need: usize,
    flags: u8,
    block_max: usize,
    hasher: Xxh32,
    /// Decoded block not yet handed out.
    out: Vec<u8>,
    out_pos: usize,
}

impl Decoder {
    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> Result<Step, StepError> {
        let mut consumed = 0;
        let mut produced = self.emit(dst);
        while self.out_pos == self.out.len() && consumed < src.len() {
            if let DecodeState::Skip(remaining) = self.state {
                let n = remaining.min(src.len() - consumed);
                consumed += n;
                self.state = if n == remaining {
                    self.expect(DecodeState::Magic, 4)
                } else {
                    DecodeState::Skip(remaining - n)
                };
                continue;
            }
            let n = (self.need - self.acc.len()).min(src.len() - consumed);
            self.acc.extend_from_slice(&src[consumed..consumed + n]);
            consumed += n;
            if self.acc.len() == self.need {
                self.advance()?;
                produced += self.emit(&mut dst[produced..]);
            }
        }

        // Frames may follow each other; the input ends between two of them
        let done = action == PumpAction::Finish
            && consumed == src.len()
            && self.at_frame_boundary()
            && self.out_pos == self.out.len();
        Ok(Step {
            consumed,
            produced,
            done,
        })
    }

    fn at_frame_boundary(&self) -> bool {
        self.state == DecodeState::Magic && self.acc.is_empty()
    }

    fn emit(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.out.len() - self.out_pos);
        dst[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
        self.out_pos += n;
        n
    }

    fn expect(&mut self, state: DecodeState, need: usize) -> DecodeState {
        self.acc.clear();
        self.need = need;
        state
    }

    /// Interpret the completed field in `acc`.
    fn advance(&mut self) -> Result<(), StepError> {
        self.state = match self.state {
            DecodeState::Magic => {
                let magic = read_u32(&self.acc);
                if magic == MAGIC {
                    self.expect(DecodeState::Descriptor, 2)
                } else if magic & SKIPPABLE_MASK == SKIPPABLE_MAGIC {
                    self.expect(DecodeState::SkipSize, 4)
                } else {
                    return Err(StepError::new("lz4: invalid frame magic"));
                }
            }
            DecodeState::SkipSize => {
                let size = read_u32(&self.acc) as usize;
                self.acc.clear();
                if size == 0 {
                    self.expect(DecodeState::Magic, 4)
                } else {
                    DecodeState::Skip(size)
                }
            }
            DecodeState::Descriptor if self.acc.len() == 2 => {
                let (flg, bd) = (self.acc[0], self.acc[1]);
                if flg & 0xc0 != FLG_VERSION || flg & FLG_RESERVED != 0 || bd & 0x8f != 0 {
                    return Err(StepError::new("lz4: invalid frame descriptor"));
                }
                if flg & FLG_BLOCK_INDEPENDENT == 0 {
                    return Err(StepError::new("lz4: linked blocks are not supported"));
                }
                if flg & FLG_DICT_ID != 0 {
                    return Err(StepError::new("lz4: dictionaries are not supported"));
                }
                self.block_max = match (bd >> 4) & 0x07 {
                    4 => 64 * 1024,
                    5 => 256 * 1024,
                    6 => 1024 * 1024,
                    7 => 4 * 1024 * 1024,
                    _ => return Err(StepError::new("lz4: invalid block maximum size")),
                };
                self.flags = flg;
                self.hasher = Xxh32::new(0);
                let content_size = if flg & FLG_CONTENT_SIZE != 0 { 8 } else { 0 };
                // Keep FLG and BD for the header checksum
                self.need = 2 + content_size + 1;
                DecodeState::Descriptor
            }
            DecodeState::Descriptor => {
                let (descriptor, hc) = self.acc.split_at(self.acc.len() - 1);
                if (xxh32(descriptor, 0) >> 8) as u8 != hc[0] {
                    return Err(StepError::new("lz4: header checksum mismatch"));
                }
                self.expect(DecodeState::BlockSize, 4)
            }
            DecodeState::BlockSize => {
                let raw = read_u32(&self.acc);
                if raw == 0 {
                    if self.flags & FLG_CONTENT_CHECKSUM != 0 {
                        self.expect(DecodeState::ContentChecksum, 4)
                    } else {
                        self.expect(DecodeState::Magic, 4)
                    }
                } else {
                    let size = (raw & !UNCOMPRESSED_BIT) as usize;
                    if size > self.block_max {
                        return Err(StepError::new(format!(
                            "lz4: block of {size} bytes exceeds maximum {}",
                            self.block_max
                        )));
                    }
                    let checksum = if self.flags & FLG_BLOCK_CHECKSUM != 0 { 4 } else { 0 };
                    self.expect(
                        DecodeState::Block {
                            size,
                            compressed: raw & UNCOMPRESSED_BIT == 0,
                        },
                        size + checksum,
                    )
                }
            }
            DecodeState::Block { size, compressed } => {
                let data = &self.acc[..size];
                if self.flags & FLG_BLOCK_CHECKSUM != 0 && xxh32(data, 0) != read_u32(&self.acc[size..]) {
                    return Err(StepError::new("lz4: block checksum mismatch"));
                }
                if compressed {
                    self.out.resize(self.block_max, 0);
                    let n = decompress_into(data, &mut self.out)
                        .map_err(|e| StepError::new(format!("lz4: {e}")))?;
                    self.out.truncate(n);
                } else {
                    self.out.clear();
                    self.out.extend_from_slice(data);
                }
                self.out_pos = 0;
                if self.flags & FLG_CONTENT_CHECKSUM != 0 {
                    self.hasher.update(&self.out);
                }
                self.expect(DecodeState::BlockSize, 4)
            }
            DecodeState::ContentChecksum => {
                if self.hasher.digest() != read_u32(&self.acc) {
                    return Err(StepError::new("lz4: content checksum mismatch"));
                }
                self.expect(DecodeState::Magic, 4)
            }
            DecodeState::Skip(_) => self.state,
        };
        Ok(())
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(data: &[u8]) -> Vec<u8> {
        let mut enc = Lz4Frame::encoder();
        let mut dst = vec![0u8; max_step_output()];
        let mut out = Vec::new();
        let mut src = data;
        while !src.is_empty() {
            let step = enc.step(src, &mut dst, PumpAction::Continue).unwrap();
            assert!(!step.done);
            src = &src[step.consumed..];
            out.extend_from_slice(&dst[..step.produced]);
        }
        loop {
            let step = enc.step(&[], &mut dst, PumpAction::Finish).unwrap();
            out.extend_from_slice(&dst[..step.produced]);
            if step.done {
                return out;
            }
        }
    }

    fn decode(frame: &[u8], split: usize, dst_len: usize) -> Result<Vec<u8>, StepError> {
        let mut dec = Lz4Frame::decoder();
        let mut dst = vec![0u8; dst_len];
        let mut out = Vec::new();
        let mut pos = 0;
        loop {
            let end = (pos + split).min(frame.len());
            let action = if pos == frame.len() {
                PumpAction::Finish
            } else {
                PumpAction::Continue
            };
            let step = dec.step(&frame[pos..end], &mut dst, action)?;
            pos += step.consumed;
            out.extend_from_slice(&dst[..step.produced]);
            if step.done {
                return Ok(out);
            }
            if action == PumpAction::Finish && step.produced == 0 && step.consumed == 0 {
                return Err(StepError::new("truncated"));
            }
        }
    }

    #[test]
    fn test_frame_header() {
        let frame = encode(b"hello");
        assert_eq!(read_u32(&frame), MAGIC);
        assert_eq!(frame[4], 0x64);
        assert_eq!(frame[5], BD_64K);
    }

    #[test]
    fn test_multi_block_roundtrip_with_small_windows() {
        let data: Vec<u8> = (0..BLOCK_SIZE * 2 + 123).map(|i| (i % 97) as u8).collect();
        let frame = encode(&data);
        assert_eq!(decode(&frame, 1000, 333).unwrap(), data);
        assert_eq!(decode(&frame, 3, 70_000).unwrap(), data);
    }

    #[test]
    fn test_incompressible_block_stored() {
        let mut x: u32 = 0x1234_5678;
        let data: Vec<u8> = (0..5000)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x as u8
            })
            .collect();
        let frame = encode(&data);
        let block_header = read_u32(&frame[HEADER_LEN..]);
        assert_ne!(block_header & UNCOMPRESSED_BIT, 0);
        assert_eq!(decode(&frame, 64, 64).unwrap(), data);
    }

    #[test]
    fn test_empty_frame() {
        let frame = encode(b"");
        // Header, end mark, checksum
        assert_eq!(frame.len(), HEADER_LEN + 8);
        assert_eq!(decode(&frame, 16, 16).unwrap(), b"");
    }

    #[test]
    fn test_content_checksum_verified() {
        let mut frame = encode(b"checksummed content");
        let n = frame.len();
        frame[n - 1] ^= 0x01;
        let err = decode(&frame, 8, 8).unwrap_err();
        assert_eq!(err.text(), "lz4: content checksum mismatch");
    }

    #[test]
    fn test_linked_blocks_rejected() {
        let descriptor = [FLG_VERSION | FLG_CONTENT_CHECKSUM, BD_64K];
        let mut frame = MAGIC.to_le_bytes().to_vec();
        frame.extend_from_slice(&descriptor);
        frame.push((xxh32(&descriptor, 0) >> 8) as u8);
        let err = decode(&frame, 64, 64).unwrap_err();
        assert_eq!(err.text(), "lz4: linked blocks are not supported");
    }

    #[test]
    fn test_skippable_frame_ignored() {
        let mut stream = (SKIPPABLE_MAGIC | 3).to_le_bytes().to_vec();
        stream.extend_from_slice(&5u32.to_le_bytes());
        stream.extend_from_slice(b"junk!");
        stream.extend_from_slice(&encode(b"after the skip"));
        assert_eq!(decode(&stream, 2, 4).unwrap(), b"after the skip");
    }

    #[test]
    fn test_concatenated_frames() {
        let mut stream = encode(b"first frame\n");
        stream.extend_from_slice(&encode(b""));
        stream.extend_from_slice(&encode(b"second frame\n"));
        assert_eq!(decode(&stream, 5, 7).unwrap(), b"first frame\nsecond frame\n");
    }

    #[test]
    fn test_truncated_second_frame() {
        let mut stream = encode(b"complete");
        let second = encode(b"cut short");
        stream.extend_from_slice(&second[..second.len() - 3]);
        assert_eq!(decode(&stream, 64, 64).unwrap_err().text(), "truncated");
    }

    #[test]
    fn test_reads_lz4_flex_frames() {
        use std::io::Write;
        let data = b"frame written by another encoder ".repeat(100);
        let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
        enc.write_all(&data).unwrap();
        let frame = enc.finish().unwrap();
        assert_eq!(decode(&frame, 100, 100).unwrap(), data);
    }
}
