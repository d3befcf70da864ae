//! # mstream
//!
//! Layered byte streams for database client/server traffic and dump files.
//!
//! A stream is a [`Stream`] value; wrappers own the stream they wrap, so a
//! chain like "socket → block framing → buffered reader" is built by boxing
//! each layer into the next one. Errors are sticky and travel up the chain
//! unchanged.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mstream::{open_rstream, open_wstream, FlushLevel, StreamExt};
//!
//! // Compression follows the extension
//! let mut out = open_wstream("dump.sql.gz")?;
//! out.write_str("COPY 3 RECORDS INTO t FROM STDIN;\n")?;
//! out.close();
//!
//! let mut input = open_rstream("dump.sql.gz")?;
//! let mut line = [0u8; 128];
//! let n = input.read_line(&mut line)?;
//! ```
//!
//! ## Layers
//!
//! | Layer | Types | Crate |
//! |-------|-------|-------|
//! | Transports | [`IoReadStream`], [`IoWriteStream`], memory, pipe | `mstream-core` |
//! | Pumps | [`PumpStream`] over gzip, bzip2, lz4, xz, text | `mstream-pump` |
//! | Framing | [`BlockStream`], [`BlockStream2`] | `mstream-block` |
//! | Buffered reading | [`Bstream`] | `mstream-block` |

mod open;

pub use open::{
    append_wastream, append_wstream, compression_for, open_path, open_rastream, open_rstream,
    open_wastream, open_wstream, read_to_end, OpenMode,
};

pub use mstream_core::{
    rendezvous_streams, Access, Buffer, BufferReadStream, BufferWriteStream, Compression,
    CompressionLevel, CompressionMethod, Error, ErrorKind, FlushLevel, IoReadStream,
    IoWriteStream, PipeReader, PipeWriter, Result, Stream, StreamConfig, StreamExt, StreamMeta,
    StreamReader, StreamWriter, TeeStream, TimeoutCheck, WriteBufferStream,
};

pub use mstream_pump::{
    bz2_rstream, bz2_wstream, compressed_rstream, compressed_wstream, gzip_rstream, gzip_wstream,
    lz4_rstream, lz4_wstream, text_rstream, text_wstream, xz_rstream, xz_wstream, Bzip2, Gzip,
    Lz4Frame, PumpAction, PumpBackend, PumpStream, Step, StepError, TextCrlf, Xz,
};

pub use mstream_block::{BlockStream, BlockStream2, Bstream, ReadMode, BLOCK, MAX_BLOCK};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        BlockStream, BlockStream2, Bstream, Error, ErrorKind, FlushLevel, Result, Stream,
        StreamConfig, StreamExt,
    };
}
