//! Block checksum functions.
//!
//! The pipeline treats the checksum as a pure function of a block's bytes.
//! [`Crc32`] is the default; anything implementing [`BlockChecksum`] can be
//! plugged in (tests use this to inject failures).

use thiserror::Error;

/// A recognized checksum failure reported by a [`BlockChecksum`] implementation.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// The implementation refused or failed to process the block.
    #[error("checksum of {len}-byte block failed: {message}")]
    Failed { len: usize, message: String },
}

impl ChecksumError {
    pub fn failed(len: usize, message: impl Into<String>) -> Self {
        ChecksumError::Failed {
            len,
            message: message.into(),
        }
    }
}

/// Deterministic, stateless 32-bit checksum over a byte slice.
///
/// Implementations are shared by every worker thread of a run, so they must
/// not rely on interior state for correctness.
pub trait BlockChecksum: Send + Sync + 'static {
    fn checksum(&self, data: &[u8]) -> Result<u32, ChecksumError>;
}

impl<F> BlockChecksum for F
where
    F: Fn(&[u8]) -> Result<u32, ChecksumError> + Send + Sync + 'static,
{
    fn checksum(&self, data: &[u8]) -> Result<u32, ChecksumError> {
        self(data)
    }
}

/// CRC-32 (IEEE 802.3, reflected, init and xorout `0xFFFFFFFF`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32;

impl BlockChecksum for Crc32 {
    fn checksum(&self, data: &[u8]) -> Result<u32, ChecksumError> {
        Ok(crc32(data))
    }
}

/// CRC-32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Render a checksum the way it appears in the output file: 8 lowercase hex digits.
pub fn to_hex(checksum: u32) -> String {
    format!("{:08x}", checksum)
}
