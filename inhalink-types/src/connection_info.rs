//! Application-side identity of a paired inhaler

use std::fmt;

use crate::error::{Error, Result};

/// Device family
///
/// Selects the descriptor used to build discovery filters and sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolType {
    /// Dose-counting add-on speaking the authenticated dispenser protocol
    Dispenser = 1,
}

impl ProtocolType {
    /// Stable numeric code used by persistence layers
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ProtocolType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Dispenser),
            _ => Err(Error::Parse(format!("unknown protocol type: {}", value))),
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispenser => write!(f, "dispenser"),
        }
    }
}

/// What the application knows about one paired device
///
/// Owned by the persistence layer. The protocol core only ever advances
/// `last_record_id`, after a record transfer has been fully committed.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Serial number printed on the device and exposed over GATT
    pub serial_number: String,

    /// Shared authentication key, 16 ASCII characters or 32 hex digits
    pub authentication_key: String,

    /// Device family
    pub protocol_type: ProtocolType,

    /// Id of the newest inhale record already synchronised (0 = never synced)
    pub last_record_id: u16,
}

impl ConnectionInfo {
    pub fn new(
        serial_number: impl Into<String>,
        authentication_key: impl Into<String>,
        protocol_type: ProtocolType,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            authentication_key: authentication_key.into(),
            protocol_type,
            last_record_id: 0,
        }
    }

    /// Set the synchronisation cursor
    pub fn with_last_record_id(mut self, last_record_id: u16) -> Self {
        self.last_record_id = last_record_id;
        self
    }

    /// True until the first successful record transfer
    pub fn is_first_sync(&self) -> bool {
        self.last_record_id == 0
    }

    /// Check the shape of the record before it is handed to the protocol core
    pub fn validate(&self) -> Result<()> {
        if self.serial_number.is_empty() {
            return Err(Error::Validation("serial number is empty".into()));
        }

        if !self.serial_number.is_ascii() {
            return Err(Error::Validation(format!(
                "serial number {:?} is not ASCII",
                self.serial_number
            )));
        }

        match self.authentication_key.len() {
            16 | 32 => Ok(()),
            len => Err(Error::Validation(format!(
                "authentication key must be 16 or 32 characters, got {}",
                len
            ))),
        }
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("serial_number", &self.serial_number)
            .field("authentication_key", &"<redacted>")
            .field("protocol_type", &self.protocol_type)
            .field("last_record_id", &self.last_record_id)
            .finish()
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inhaler[SN: {}, {}, last record: {}]",
            self.serial_number, self.protocol_type, self.last_record_id
        )
    }
}
