//! Integration tests for mstream.
//!
//! These tests stack transports, pumps and framing the way a client and a
//! server do, and check the behavior seen at the top of each chain.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use mstream::{BufferReadStream, IoWriteStream, Stream};

mod errors;
mod framing;
mod layering;

/// Byte sink that stays readable after its writer is boxed into a chain.
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn writer(&self) -> Box<dyn Stream> {
        Box::new(IoWriteStream::new(self.clone(), "sink"))
    }

    pub fn reader(&self) -> Box<dyn Stream> {
        Box::new(BufferReadStream::new(self.0.lock().unwrap().clone(), "sink"))
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink whose peer has gone away.
pub struct Refusing;

impl Write for Refusing {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
