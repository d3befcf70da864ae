//! File openers.
//!
//! The file extension picks the codec: `.gz`, `.bz2`, `.lz4` and `.xz`
//! files are decompressed on read and compressed on write. The `a`
//! variants open text streams; on read they strip a byte order mark and
//! turn `\r\n` into `\n`.

use std::ffi::OsStr;
use std::path::Path;

use mstream_core::{
    Compression, IoReadStream, IoWriteStream, Result, Stream, StreamConfig, StreamExt,
};
use mstream_pump::{compressed_rstream, compressed_wstream, text_rstream};
use tracing::debug;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate.
    Write,
    /// Create or append.
    Append,
}

/// Codec implied by the extension of `path`, if any.
pub fn compression_for(path: &Path) -> Option<Compression> {
    path.extension()
        .and_then(OsStr::to_str)
        .and_then(Compression::from_extension)
}

/// Open `path` in `mode`, with the codec implied by its extension and the
/// text filter when `text` is set.
pub fn open_path(
    path: impl AsRef<Path>,
    mode: OpenMode,
    text: bool,
    config: &StreamConfig,
) -> Result<Box<dyn Stream>> {
    let path = path.as_ref();
    let compression = compression_for(path);
    debug!(
        path = %path.display(),
        ?mode,
        text,
        codec = compression.map_or("none", Compression::name),
        "opening file stream"
    );

    let mut stream: Box<dyn Stream> = match mode {
        OpenMode::Read => {
            let file: Box<dyn Stream> = Box::new(IoReadStream::open(path)?);
            match compression {
                Some(c) => compressed_rstream(file, c, config)?,
                None => file,
            }
        }
        OpenMode::Write | OpenMode::Append => {
            let file: Box<dyn Stream> = if mode == OpenMode::Append {
                Box::new(IoWriteStream::append(path)?)
            } else {
                Box::new(IoWriteStream::create(path)?)
            };
            match compression {
                Some(c) => compressed_wstream(file, c, config)?,
                None => file,
            }
        }
    };

    if text {
        if mode == OpenMode::Read {
            stream = Box::new(text_rstream(stream, config)?);
        } else {
            stream.meta_mut().set_binary(false);
        }
    } else {
        stream.meta_mut().set_binary(true);
    }
    Ok(stream)
}

/// Open a binary file for reading.
pub fn open_rstream(path: impl AsRef<Path>) -> Result<Box<dyn Stream>> {
    open_path(path, OpenMode::Read, false, &StreamConfig::default())
}

/// Create or truncate a binary file for writing.
pub fn open_wstream(path: impl AsRef<Path>) -> Result<Box<dyn Stream>> {
    open_path(path, OpenMode::Write, false, &StreamConfig::default())
}

/// Open a binary file for appending.
pub fn append_wstream(path: impl AsRef<Path>) -> Result<Box<dyn Stream>> {
    open_path(path, OpenMode::Append, false, &StreamConfig::default())
}

/// Open a text file for reading.
pub fn open_rastream(path: impl AsRef<Path>) -> Result<Box<dyn Stream>> {
    open_path(path, OpenMode::Read, true, &StreamConfig::default())
}

/// Create or truncate a text file for writing.
pub fn open_wastream(path: impl AsRef<Path>) -> Result<Box<dyn Stream>> {
    open_path(path, OpenMode::Write, true, &StreamConfig::default())
}

/// Open a text file for appending.
pub fn append_wastream(path: impl AsRef<Path>) -> Result<Box<dyn Stream>> {
    open_path(path, OpenMode::Append, true, &StreamConfig::default())
}

/// Read everything left on `stream`.
pub fn read_to_end(stream: &mut dyn Stream) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = stream.read_bytes(&mut buf)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}
