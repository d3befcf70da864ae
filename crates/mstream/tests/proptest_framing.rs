//! Property-based tests for block framing and buffered reading.
//!
//! These tests verify that framing properties hold across a wide range of inputs:
//! - Messages survive v1 and v2 framing for any block size
//! - Every flush produces exactly one end-of-message read
//! - The buffered reader keeps unread data at the front while growing
//!
//! Run with: cargo test --test proptest_framing

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use mstream::{
    BlockStream, BlockStream2, Bstream, BufferReadStream, CompressionMethod, FlushLevel,
    IoWriteStream, Stream, StreamExt, MAX_BLOCK,
};

#[derive(Clone, Default)]
struct Sink(Arc<Mutex<Vec<u8>>>);

impl Sink {
    fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Strategy for a conversation: a handful of messages, some empty.
fn messages_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..3000), 1..6)
}

/// Strategy for the v2 compression method.
fn method_strategy() -> impl Strategy<Value = CompressionMethod> {
    prop_oneof![
        Just(CompressionMethod::None),
        Just(CompressionMethod::Snappy),
        Just(CompressionMethod::Lz4),
    ]
}

fn send(out: &mut dyn Stream, messages: &[Vec<u8>], piece: usize) {
    for msg in messages {
        for chunk in msg.chunks(piece) {
            out.write_bytes(chunk).unwrap();
        }
        out.flush(FlushLevel::Data).unwrap();
    }
}

/// Read the whole input, splitting it at zero-length reads. Stops at the
/// first zero-length read that follows another one.
fn receive(input: &mut dyn Stream, chunk: usize, expected: usize) -> Vec<Vec<u8>> {
    let mut messages = Vec::new();
    let mut current = Vec::new();
    let mut buf = vec![0u8; chunk];
    while messages.len() < expected {
        let n = input.read_bytes(&mut buf).unwrap();
        if n == 0 {
            messages.push(std::mem::take(&mut current));
        } else {
            current.extend_from_slice(&buf[..n]);
        }
    }
    messages
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    })]

    /// Property: v1 framing returns every message and one end marker per flush.
    #[test]
    fn prop_v1_roundtrip(
        messages in messages_strategy(),
        capacity in prop_oneof![1usize..16, 16usize..2048, Just(MAX_BLOCK)],
        piece in 1usize..700,
        chunk in 1usize..900,
    ) {
        let sink = Sink::default();
        let mut out = BlockStream::with_capacity(Box::new(IoWriteStream::new(sink.clone(), "out")), capacity).unwrap();
        send(&mut out, &messages, piece);
        drop(out);

        let inner = Box::new(BufferReadStream::new(sink.bytes(), "in"));
        let mut input = BlockStream::with_capacity(inner, capacity).unwrap();
        prop_assert_eq!(receive(&mut input, chunk, messages.len()), messages);

        // Nothing but end of file afterwards
        let mut buf = [0u8; 4];
        prop_assert_eq!(input.read_bytes(&mut buf).unwrap(), 0);
        prop_assert_eq!(input.read_bytes(&mut buf).unwrap(), 0);
    }

    /// Property: v2 framing round-trips with every compression method.
    #[test]
    fn prop_v2_roundtrip(
        messages in messages_strategy(),
        capacity in 1usize..5000,
        method in method_strategy(),
        chunk in 1usize..900,
    ) {
        let sink = Sink::default();
        let mut out = BlockStream2::new(Box::new(IoWriteStream::new(sink.clone(), "out")), capacity, method).unwrap();
        send(&mut out, &messages, 1024);
        drop(out);

        let inner = Box::new(BufferReadStream::new(sink.bytes(), "in"));
        let mut input = BlockStream2::new(inner, capacity, method).unwrap();
        prop_assert_eq!(receive(&mut input, chunk, messages.len()), messages);
    }

    /// Property: flushing K times without data yields K end markers.
    #[test]
    fn prop_flush_cardinality(flushes in 1usize..20) {
        let sink = Sink::default();
        let mut out = BlockStream::new(Box::new(IoWriteStream::new(sink.clone(), "out")));
        for _ in 0..flushes {
            out.flush(FlushLevel::Data).unwrap();
        }
        drop(out);

        let mut input = BlockStream::new(Box::new(BufferReadStream::new(sink.bytes(), "in")));
        let mut buf = [0u8; 8];
        for _ in 0..flushes {
            prop_assert_eq!(input.read_bytes(&mut buf).unwrap(), 0);
        }
        prop_assert_eq!(input.blocks() as usize, flushes);
        // One more read hits end of file, not another block
        prop_assert_eq!(input.read_bytes(&mut buf).unwrap(), 0);
        prop_assert_eq!(input.blocks() as usize, flushes);
    }

    /// Property: growth keeps the unread remainder at the front, with room
    /// for the requested increment.
    #[test]
    fn prop_bstream_growth(
        size in 1usize..64,
        first in 1usize..64,
        consumed in 0usize..64,
        more in 1usize..256,
    ) {
        let data: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
        let mut bs = Bstream::new(Box::new(BufferReadStream::new(data.clone(), "in")), size).unwrap();
        let got = bs.read(first).unwrap();
        let consumed = consumed.min(got);
        bs.consume(consumed);
        let remainder = got - consumed;

        let added = bs.read(more).unwrap();
        prop_assert!(bs.capacity() >= remainder + more);
        prop_assert_eq!(added, more);
        prop_assert_eq!(bs.available(), &data[consumed..got + added]);
    }
}
