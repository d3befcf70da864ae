//! Core type definitions shared by every stream layer.

use serde::{Deserialize, Serialize};

/// Direction of a stream, fixed for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// The stream only supports `read`.
    Read,
    /// The stream only supports `write` and `flush`.
    Write,
}

impl Access {
    /// Name used in panic messages and logs.
    pub fn name(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
        }
    }
}

/// Flush strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlushLevel {
    /// Push pending data through to the peer.
    #[default]
    Data,
    /// Push pending data and ask the codecs to reset so that a reader can
    /// resynchronize from this point.
    All,
}

/// Compression level presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// Optimized for speed over ratio.
    Fast,

    /// Balanced speed and ratio.
    #[default]
    Default,

    /// Optimized for ratio over speed.
    Best,

    /// Custom level (algorithm-specific range, clamped by the backend).
    Custom(u32),
}

impl CompressionLevel {
    /// Convert to a 1..=9 style numeric level.
    pub fn to_level(self) -> u32 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Default => 6,
            CompressionLevel::Best => 9,
            CompressionLevel::Custom(level) => level,
        }
    }

    /// Create from numeric level.
    pub fn from_level(level: u32) -> Self {
        match level {
            1 => CompressionLevel::Fast,
            6 => CompressionLevel::Default,
            9 => CompressionLevel::Best,
            _ => CompressionLevel::Custom(level),
        }
    }
}

/// Whole-stream compression formats driven by the pump engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compression {
    /// Gzip member (RFC 1952).
    Gzip,
    /// Bzip2 stream.
    Bzip2,
    /// LZ4 frame.
    Lz4,
    /// XZ container (LZMA2).
    Xz,
}

impl Compression {
    /// Get algorithm name as string.
    pub fn name(self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
            Compression::Lz4 => "lz4",
            Compression::Xz => "xz",
        }
    }

    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Compression::Gzip => "gz",
            Compression::Bzip2 => "bz2",
            Compression::Lz4 => "lz4",
            Compression::Xz => "xz",
        }
    }

    /// Pick a format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "gz" => Some(Compression::Gzip),
            "bz2" => Some(Compression::Bzip2),
            "lz4" => Some(Compression::Lz4),
            "xz" => Some(Compression::Xz),
            _ => None,
        }
    }
}

/// Per-block compression of the v2 framing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompressionMethod {
    /// Payload is sent as is.
    #[default]
    None,
    /// Snappy raw block format.
    Snappy,
    /// LZ4 block format.
    Lz4,
}

impl CompressionMethod {
    /// Get method name as string.
    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Snappy => "snappy",
            CompressionMethod::Lz4 => "lz4",
        }
    }
}
