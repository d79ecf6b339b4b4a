//! High-level error types

use inhalink_core::SessionState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] inhalink_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] inhalink_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] inhalink_types::Error),

    #[error("Serial number mismatch: expected {expected}, device reports {actual}")]
    SerialNumberMismatch {
        expected: String,
        actual: String,
    },

    #[error("Authentication failed - device response does not match the key")]
    AuthenticationFailed,

    #[error("Authentication did not complete within {seconds}s")]
    AuthenticationTimeout {
        seconds: u64,
    },

    #[error("Record transfer failed with status {status}")]
    TransferFailed {
        status: u8,
    },

    #[error("Record transfer exceeded {max} records")]
    TooManyRecords {
        max: usize,
    },

    #[error("GATT operation failed in {state} with status {status}")]
    OperationFailed {
        state: SessionState,
        status: u8,
    },

    #[error("Connection lost")]
    UnexpectedDisconnect,

    #[error("Session closed")]
    Closed,
}

impl Error {
    /// Link-level failure (taxonomy: transport)
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::OperationFailed { .. }
                | Self::UnexpectedDisconnect
                | Self::AuthenticationTimeout { .. }
        )
    }

    /// The device sent something that cannot be trusted
    pub fn is_integrity_failure(&self) -> bool {
        match self {
            Self::Core(e) => e.is_integrity_failure(),
            Self::SerialNumberMismatch { .. }
            | Self::AuthenticationFailed
            | Self::TransferFailed { .. }
            | Self::TooManyRecords { .. } => true,
            _ => false,
        }
    }

    /// A fresh connection attempt may succeed without changing configuration
    pub fn is_recoverable(&self) -> bool {
        if let Self::Core(e) = self {
            return !e.is_key_error();
        }
        !matches!(self, Self::Types(_))
    }
}
