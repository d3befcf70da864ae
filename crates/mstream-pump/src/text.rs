//! Text normalization backend.
//!
//! Reading strips a leading UTF-8 byte order mark and turns `\r\n` into
//! `\n`. Writing turns `\n` into `\r\n`. Both directions handle sequences
//! split across step boundaries.

use crate::pump::{PumpAction, PumpBackend, Step, StepError};

const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

/// CRLF / BOM text filter.
pub struct TextCrlf {
    direction: Direction,
}

enum Direction {
    Decode(Decoder),
    Encode { pending_lf: bool },
}

impl TextCrlf {
    /// Filter for read streams.
    pub fn decoder() -> Self {
        TextCrlf {
            direction: Direction::Decode(Decoder {
                bom_matched: 0,
                bom_done: false,
                held: Vec::with_capacity(UTF8_BOM.len() + 1),
                pending_cr: false,
            }),
        }
    }

    /// Filter for write streams.
    pub fn encoder() -> Self {
        TextCrlf {
            direction: Direction::Encode { pending_lf: false },
        }
    }
}

impl PumpBackend for TextCrlf {
    fn name(&self) -> &'static str {
        "text"
    }

    /// At most one extra byte per step when a `\n` expands.
    fn elbow_room(&self) -> usize {
        2
    }

    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> Result<Step, StepError> {
        match &mut self.direction {
            Direction::Decode(dec) => Ok(dec.step(src, dst, action)),
            Direction::Encode { pending_lf } => Ok(encode(pending_lf, src, dst, action)),
        }
    }
}

fn encode(pending_lf: &mut bool, src: &[u8], dst: &mut [u8], action: PumpAction) -> Step {
    let mut out = 0;
    if *pending_lf {
        if dst.is_empty() {
            return Step::default();
        }
        dst[0] = b'\n';
        out = 1;
        *pending_lf = false;
    }
    let mut consumed = 0;
    while consumed < src.len() && out < dst.len() {
        let b = src[consumed];
        consumed += 1;
        if b == b'\n' {
            dst[out] = b'\r';
            out += 1;
            if out == dst.len() {
                *pending_lf = true;
                break;
            }
        }
        dst[out] = b;
        out += 1;
    }
    let done = action != PumpAction::Continue && consumed == src.len() && !*pending_lf;
    Step {
        consumed,
        produced: out,
        done,
    }
}

struct Decoder {
    /// Leading bytes that matched the BOM so far.
    bom_matched: usize,
    bom_done: bool,
    /// Bytes to emit before anything else.
    held: Vec<u8>,
    pending_cr: bool,
}

impl Decoder {
    fn step(&mut self, src: &[u8], dst: &mut [u8], action: PumpAction) -> Step {
        let mut consumed = 0;
        let mut out = 0;

        while !self.bom_done && consumed < src.len() {
            if src[consumed] == UTF8_BOM[self.bom_matched] {
                consumed += 1;
                self.bom_matched += 1;
                if self.bom_matched == UTF8_BOM.len() {
                    self.bom_done = true;
                }
            } else {
                // Not a BOM after all: replay what matched
                self.held.extend_from_slice(&UTF8_BOM[..self.bom_matched]);
                self.bom_done = true;
            }
        }
        let finishing = action == PumpAction::Finish && src.len() == consumed;
        if finishing && !self.bom_done {
            self.held.extend_from_slice(&UTF8_BOM[..self.bom_matched]);
            self.bom_done = true;
        }

        let held = self.held.len().min(dst.len());
        dst[..held].copy_from_slice(&self.held[..held]);
        self.held.drain(..held);
        out += held;
        if !self.held.is_empty() {
            return Step::progress(consumed, out);
        }

        while consumed < src.len() && out < dst.len() {
            let b = src[consumed];
            if self.pending_cr {
                self.pending_cr = false;
                if b != b'\n' {
                    dst[out] = b'\r';
                    out += 1;
                    continue;
                }
            }
            consumed += 1;
            if b == b'\r' {
                self.pending_cr = true;
            } else {
                dst[out] = b;
                out += 1;
            }
        }

        if action == PumpAction::Finish && consumed == src.len() {
            if self.pending_cr {
                if out == dst.len() {
                    return Step::progress(consumed, out);
                }
                dst[out] = b'\r';
                out += 1;
                self.pending_cr = false;
            }
            return Step::done(consumed, out);
        }
        Step::progress(consumed, out)
    }
}
