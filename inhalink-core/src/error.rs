//! Error types for inhalink-core

use crate::command::Opcode;

/// Result type alias for inhalink-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Payload is shorter than its fixed layout
    #[error("Payload too short: expected at least {expected} bytes, got {actual} bytes")]
    PayloadTooShort {
        expected: usize,
        actual: usize,
    },

    /// Payload does not have its exact fixed size
    #[error("Unexpected payload length: expected {expected} bytes, got {actual} bytes")]
    UnexpectedLength {
        expected: usize,
        actual: usize,
    },

    /// CRC verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Authentication key text has an unsupported length
    #[error("Authentication key must be 16 or 32 characters, got {0}")]
    InvalidKeyLength(usize),

    /// Authentication key text cannot be interpreted
    #[error("Invalid authentication key: {0}")]
    InvalidKeyEncoding(String),

    /// Hex key failed to decode
    #[error("Invalid hex key: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Unknown RACP op code
    #[error("Unknown RACP opcode: {0}")]
    UnknownOpcode(u8),

    /// Known op code in a place where another was expected
    #[error("Unexpected RACP opcode: {0}")]
    UnexpectedOpcode(Opcode),

    /// Unknown RACP response code
    #[error("Unknown RACP response code: {0}")]
    UnknownResponseCode(u8),
}

impl Error {
    /// The peer sent data that does not hold together
    ///
    /// Key errors are configuration problems on our side and are excluded.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::PayloadTooShort { .. }
                | Self::UnexpectedLength { .. }
                | Self::ChecksumMismatch { .. }
                | Self::UnknownOpcode(_)
                | Self::UnexpectedOpcode(_)
                | Self::UnknownResponseCode(_)
        )
    }

    /// Key material is unusable (fix the connection info, do not retry)
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKeyLength(_) | Self::InvalidKeyEncoding(_) | Self::Hex(_)
        )
    }
}
