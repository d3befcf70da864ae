//! Block framing between two threads over in-process pipes.

use std::thread;

use mstream::{
    rendezvous_streams, BlockStream, BlockStream2, CompressionMethod, FlushLevel, Stream,
    StreamExt,
};

const PROMPT: &[u8] = b"\x01\x02\n";

/// Read one message, up to its end marker.
fn read_message(s: &mut dyn Stream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let n = s.read_bytes(&mut buf).unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[test]
fn test_messages_cross_threads() {
    let (rd, wr) = rendezvous_streams("requests");
    let big = vec![b'q'; 100_000];
    let expected = vec![b"first".to_vec(), Vec::new(), big.clone()];

    let sender = thread::spawn(move || {
        let mut out = BlockStream::new(Box::new(wr));
        for msg in [&b"first"[..], &b""[..], &big[..]] {
            out.write_bytes(msg).unwrap();
            out.flush(FlushLevel::Data).unwrap();
        }
        out.blocks()
    });

    let mut input = BlockStream::new(Box::new(rd));
    for msg in &expected {
        assert_eq!(&read_message(&mut input), msg);
    }
    // Sender gone: end of file
    let mut buf = [0u8; 8];
    assert_eq!(input.read_bytes(&mut buf).unwrap(), 0);

    let written = sender.join().unwrap();
    assert_eq!(input.blocks(), written);
}

#[test]
fn test_prompt_handshake_between_peers() {
    let (server_in, client_out) = rendezvous_streams("to-server");
    let (client_in, server_out) = rendezvous_streams("to-client");

    let server = thread::spawn(move || {
        let mut requests = BlockStream::new(Box::new(server_in));
        requests.set_prompt(PROMPT, Box::new(BlockStream::new(Box::new(server_out))));

        let mut handled = Vec::new();
        loop {
            let request = read_message(&mut requests);
            if request.is_empty() {
                break;
            }
            let reply = requests.prompt_target_mut().unwrap();
            reply.write_str("&1 ok\n").unwrap();
            reply.flush(FlushLevel::Data).unwrap();
            handled.push(request);
        }
        handled
    });

    let mut requests = BlockStream::new(Box::new(client_out));
    let mut replies = BlockStream::new(Box::new(client_in));

    requests.write_str("sSELECT 1;").unwrap();
    requests.flush(FlushLevel::Data).unwrap();
    // The server asks whether more input follows
    assert_eq!(read_message(&mut replies), PROMPT);
    requests.flush(FlushLevel::Data).unwrap();
    assert_eq!(read_message(&mut replies), b"&1 ok\n");

    drop(requests);
    assert_eq!(server.join().unwrap(), vec![b"sSELECT 1;".to_vec()]);
}

#[test]
fn test_upgrade_to_v2_mid_connection() {
    let (rd, wr) = rendezvous_streams("upgrade");

    let sender = thread::spawn(move || {
        let mut v1 = BlockStream::new(Box::new(wr));
        v1.write_str("switch to v2").unwrap();
        v1.flush(FlushLevel::Data).unwrap();
        let mut v2 = BlockStream2::from_block_stream(v1, 64 * 1024, CompressionMethod::Lz4).unwrap();
        v2.write_bytes(&vec![b'r'; 200_000]).unwrap();
        v2.flush(FlushLevel::Data).unwrap();
    });

    let mut v1 = BlockStream::new(Box::new(rd));
    assert_eq!(read_message(&mut v1), b"switch to v2");
    let mut v2 = BlockStream2::from_block_stream(v1, 64 * 1024, CompressionMethod::Lz4).unwrap();
    assert_eq!(read_message(&mut v2), vec![b'r'; 200_000]);
    sender.join().unwrap();
}
