//! Stream layer configuration.

use serde::{Deserialize, Serialize};

use crate::types::{CompressionLevel, CompressionMethod};

/// Default staging buffer size of a pump stream (64 KiB).
pub const DEFAULT_PUMP_BUFFER_SIZE: usize = 64 * 1024;

/// Default payload capacity of a v1 block (8 KiB minus the header).
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024 - 2;

/// Default payload capacity of a v2 block (128 KiB).
pub const DEFAULT_BLOCK2_SIZE: usize = 128 * 1024;

/// Default chunk size of a buffered reader.
pub const DEFAULT_BSTREAM_SIZE: usize = 8192;

/// Configuration for stream construction.
///
/// Hosts usually deserialize this from their own configuration file and pass
/// the relevant fields to the constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Staging buffer size of pump streams (default: 64 KiB).
    pub pump_buffer_size: usize,

    /// Payload capacity of v1 blocks (default: 8190).
    pub block_size: usize,

    /// Payload capacity of v2 blocks (default: 128 KiB).
    pub block2_size: usize,

    /// Per-block compression of v2 block streams.
    pub block2_compression: CompressionMethod,

    /// Level used by compressing pump streams.
    pub compression_level: CompressionLevel,

    /// Initial chunk size of buffered readers (default: 8192).
    pub bstream_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            pump_buffer_size: DEFAULT_PUMP_BUFFER_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            block2_size: DEFAULT_BLOCK2_SIZE,
            block2_compression: CompressionMethod::None,
            compression_level: CompressionLevel::Default,
            bstream_size: DEFAULT_BSTREAM_SIZE,
        }
    }
}
