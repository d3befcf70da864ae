//! Sticky errors through stream chains.

use std::sync::Arc;
use std::time::Duration;

use mstream::{
    gzip_wstream, rendezvous_streams, BlockStream, Bstream, BufferReadStream, ErrorKind,
    FlushLevel, IoWriteStream, Stream, StreamConfig, StreamExt,
};

use super::Refusing;

/// The innermost stream of a chain.
fn innermost(mut s: &dyn Stream) -> &dyn Stream {
    while let Some(inner) = s.inner() {
        s = inner;
    }
    s
}

#[test]
fn test_transport_error_reaches_top_unchanged() {
    let transport = Box::new(IoWriteStream::new(Refusing, "socket"));
    let framed = Box::new(BlockStream::new(transport));
    let mut gz = gzip_wstream(framed, &StreamConfig::default()).unwrap();

    gz.write_str("doomed").unwrap();
    let err = gz.flush(FlushLevel::Data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Write);
    assert!(err.message().contains("peer went away"));

    let root = innermost(&gz);
    assert_eq!(root.meta().error(), Some(&err));
    assert_eq!(gz.inner().unwrap().meta().error(), Some(&err));

    // Sticky until cleared
    assert_eq!(gz.write_str("more").unwrap_err(), err);
    gz.clear_error();
    assert!(innermost(&gz).meta().error().is_none());
}

#[test]
fn test_protocol_error_under_buffered_reader() {
    let bytes = vec![0xff, 0xff, 0, 0];
    let framed = BlockStream::with_capacity(Box::new(BufferReadStream::new(bytes, "peer")), 64).unwrap();
    let mut bs = Bstream::new(Box::new(framed), 16).unwrap();
    let err = bs.read(16).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(bs.inner().meta().error(), Some(&err));
    // The transport itself is fine
    assert!(bs.inner().inner().unwrap().meta().error().is_none());
}

#[test]
fn test_timeout_is_recoverable() {
    let (rd, wr) = rendezvous_streams("slow");
    let mut input = BlockStream::new(Box::new(rd));
    input.set_timeout(Some(Duration::from_millis(20)), Some(Arc::new(|| true)));
    assert_eq!(input.inner().unwrap().timeout(), Some(Duration::from_millis(20)));

    let mut buf = [0u8; 16];
    let err = input.read_bytes(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_recoverable());

    // Small enough to sit in the pipe without a reader
    let mut out = BlockStream::new(Box::new(wr));
    out.write_str("late").unwrap();
    out.flush(FlushLevel::Data).unwrap();

    input.clear_error();
    input.set_timeout(None, None);
    assert_eq!(input.read_bytes(&mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"late");
}
