//! # mstream block
//!
//! Message framing over byte streams, and a buffered reader.
//!
//! ## Framing
//!
//! - [`BlockStream`] - v1: 2-byte headers, blocks of up to 32 KiB, and an
//!   optional prompt handshake
//! - [`BlockStream2`] - v2: 8-byte headers, large blocks, optional Snappy or
//!   LZ4 compression per block
//!
//! A writer ends a message with `flush`. A reader returns the message's
//! bytes followed by exactly one zero-length read.
//!
//! ## Example
//!
//! ```ignore
//! use mstream_block::BlockStream;
//! use mstream_core::{FlushLevel, StreamExt};
//!
//! let mut out = BlockStream::new(socket_writer);
//! out.write_str("SELECT 1;")?;
//! out.flush(FlushLevel::Data)?;
//! ```

mod block;
mod block2;
mod bstream;
mod codec;

#[cfg(test)]
mod testutil;

pub use block::{BlockStream, BLOCK, MAX_BLOCK};
pub use block2::BlockStream2;
pub use bstream::{Bstream, Lines, ReadMode};
