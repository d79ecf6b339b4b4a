//! Transport errors

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Operation rejected by the stack: {0}")]
    Rejected(String),

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("Bluetooth radio unavailable")]
    RadioUnavailable,

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),
}
