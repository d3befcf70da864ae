//! Pumps, framing and buffered reading stacked on each other.

use mstream::{
    gzip_rstream, gzip_wstream, open_rastream, open_wstream, read_to_end, BlockStream,
    BlockStream2, Bstream, CompressionMethod, FlushLevel, StreamConfig, StreamExt, TeeStream,
};

use super::SharedSink;

#[test]
fn test_gzip_message_inside_v2_blocks() {
    let config = StreamConfig::default();
    let sink = SharedSink::default();
    let payload: Vec<u8> = (0..150_000u32).map(|i| (i % 97) as u8).collect();

    let framed = BlockStream2::new(sink.writer(), 32 * 1024, CompressionMethod::None).unwrap();
    let mut gz = gzip_wstream(Box::new(framed), &config).unwrap();
    gz.write_bytes(&payload).unwrap();
    // Finishing the gzip member also ends the block message
    gz.close();
    assert!(gz.error().is_none());
    drop(gz);

    let framed = BlockStream2::new(sink.reader(), 32 * 1024, CompressionMethod::None).unwrap();
    let mut gz = gzip_rstream(Box::new(framed), &config).unwrap();
    assert_eq!(read_to_end(&mut gz).unwrap(), payload);
}

#[test]
fn test_bstream_lines_per_message() {
    let sink = SharedSink::default();
    let mut out = BlockStream::new(sink.writer());
    out.write_str("a\nb\n").unwrap();
    out.flush(FlushLevel::Data).unwrap();
    out.write_str("c\n").unwrap();
    out.flush(FlushLevel::Data).unwrap();
    drop(out);

    let mut bs = Bstream::new(Box::new(BlockStream::new(sink.reader())), 64).unwrap();
    let first: Vec<Vec<u8>> = bs.lines().map(|l| l.unwrap()).collect();
    assert_eq!(first, vec![b"a".to_vec(), b"b".to_vec()]);
    assert!(bs.is_eof());

    bs.clear_eof();
    assert_eq!(bs.next_line().unwrap(), Some(b"c".to_vec()));
    assert_eq!(bs.next_line().unwrap(), None);
}

#[test]
fn test_text_reader_over_compressed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.csv.gz");
    let mut w = open_wstream(&path).unwrap();
    w.write_str("\u{feff}id,name\r\n1,ada\r\n").unwrap();
    w.close();
    drop(w);

    let mut r = open_rastream(&path).unwrap();
    assert_eq!(read_to_end(r.as_mut()).unwrap(), b"id,name\n1,ada\n");
}

#[test]
fn test_tee_copies_framed_output() {
    let wire = SharedSink::default();
    let log = SharedSink::default();
    let framed = BlockStream::new(wire.writer());
    let mut tee = TeeStream::attach(Box::new(framed), log.writer()).unwrap();
    tee.write_str("logged request").unwrap();
    tee.flush(FlushLevel::Data).unwrap();

    let mut framed = tee.detach();
    framed.write_str("not logged").unwrap();
    framed.flush(FlushLevel::Data).unwrap();
    drop(framed);

    assert_eq!(log.0.lock().unwrap().as_slice(), b"logged request");
    let mut rd = BlockStream::new(wire.reader());
    let mut buf = [0u8; 64];
    assert_eq!(rd.read_bytes(&mut buf).unwrap(), 14);
    assert_eq!(rd.read_bytes(&mut buf).unwrap(), 0);
    assert_eq!(rd.read_bytes(&mut buf).unwrap(), 10);
}
