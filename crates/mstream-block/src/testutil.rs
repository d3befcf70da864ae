//! Shared helpers for the unit tests of this crate.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use mstream_core::{BufferReadStream, IoWriteStream, Stream};

/// A byte sink whose contents stay reachable after the writer is boxed.
#[derive(Clone, Default)]
pub(crate) struct Wire(Arc<Mutex<Vec<u8>>>);

impl Wire {
    pub(crate) fn writer(&self, name: &str) -> Box<dyn Stream> {
        Box::new(IoWriteStream::new(self.clone(), name))
    }

    pub(crate) fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn reader(&self, name: &str) -> Box<dyn Stream> {
        Box::new(BufferReadStream::new(self.bytes(), name))
    }
}

impl Write for Wire {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A sink that refuses every write.
pub(crate) struct Refusing;

impl Write for Refusing {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
