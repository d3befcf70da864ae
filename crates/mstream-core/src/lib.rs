//! # mstream core
//!
//! The stream abstraction shared by every layer of mstream: the [`Stream`]
//! capability trait, its caller-facing [`StreamExt`] operations, the sticky
//! error model and the base transports.
//!
//! ## Design Philosophy
//!
//! - **Sticky errors**: the first failure is kept on the stream and returned
//!   by every later call until cleared
//! - **Verbatim propagation**: wrappers clone the inner error value, so the
//!   root cause text survives any chain depth
//! - **Single ownership**: a wrapper owns its inner stream; dropping the outer
//!   stream closes and drops the whole chain
//!
//! ## Transports
//!
//! - [`BufferReadStream`] / [`BufferWriteStream`] - in-memory
//! - [`IoReadStream`] / [`IoWriteStream`] - any `std::io::Read` / `Write`
//! - [`rendezvous_streams`] - in-process pipe
//!
//! ## Example
//!
//! ```ignore
//! use mstream_core::{BufferWriteStream, StreamExt};
//!
//! let mut out = BufferWriteStream::new("memory");
//! out.write_i32(42)?;
//! out.write_str("hello")?;
//! let bytes = out.take_buffer().into_vec();
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod io;
pub mod memory;
pub mod pipe;
pub mod stream;
pub mod tee;
pub mod types;
pub mod wbuf;

pub use buffer::{Buffer, Staging};
pub use config::StreamConfig;
pub use error::{Error, ErrorKind, Result};
pub use io::{IoReadStream, IoWriteStream, StreamReader, StreamWriter};
pub use memory::{BufferReadStream, BufferWriteStream};
pub use pipe::{rendezvous_streams, PipeReader, PipeWriter};
pub use stream::{Stream, StreamExt, StreamMeta, TimeoutCheck};
pub use tee::TeeStream;
pub use types::{Access, Compression, CompressionLevel, CompressionMethod, FlushLevel};
pub use wbuf::WriteBufferStream;
