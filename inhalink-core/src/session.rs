//! Observable states of a dispenser session
//!
//! A session walks these states strictly in order during bring-up:
//! - link and identity: connecting, service discovery, serial number check
//! - authentication: notification setup and the two handshake rounds
//! - synchronisation: device information reads and notification setup
//!
//! From `Idle` a device state change runs the record transfer states and
//! returns to `Idle`. `Closed` can follow any state and is final.

use std::fmt;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    ServiceDiscovery,
    ReadSerialNumber,
    SetNotifyAuthentication,

    /// Local challenge sent, waiting for the peer challenge
    Authentication1,

    /// Response sent, waiting for the peer's proof
    Authentication2,

    ReadingManufacturerName,
    ReadingHardwareRevision,
    ReadingSoftwareRevision,
    ReadingDeviceState,
    SetNotifyDeviceState,

    /// Authenticated and synchronised, waiting for device state changes
    Idle,

    SendingNonce,
    SendingRecordRequest,
    ReceivingRecords,

    Closed,
}

impl SessionState {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Handshake in progress (the authentication deadline applies)
    pub fn is_authenticating(self) -> bool {
        matches!(
            self,
            Self::SetNotifyAuthentication | Self::Authentication1 | Self::Authentication2
        )
    }

    /// Past the handshake and still connected
    pub fn is_authenticated(self) -> bool {
        matches!(
            self,
            Self::ReadingManufacturerName
                | Self::ReadingHardwareRevision
                | Self::ReadingSoftwareRevision
                | Self::ReadingDeviceState
                | Self::SetNotifyDeviceState
                | Self::Idle
                | Self::SendingNonce
                | Self::SendingRecordRequest
                | Self::ReceivingRecords
        )
    }

    /// Record transfer sub-sequence
    pub fn is_transferring(self) -> bool {
        matches!(
            self,
            Self::SendingNonce | Self::SendingRecordRequest | Self::ReceivingRecords
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::ServiceDiscovery => "SERVICE_DISCOVERY",
            Self::ReadSerialNumber => "READ_SERIAL_NUMBER",
            Self::SetNotifyAuthentication => "SET_NOTIFY_AUTHENTICATION",
            Self::Authentication1 => "AUTHENTICATION_1",
            Self::Authentication2 => "AUTHENTICATION_2",
            Self::ReadingManufacturerName => "READING_MANUFACTURER_NAME",
            Self::ReadingHardwareRevision => "READING_HARDWARE_REVISION",
            Self::ReadingSoftwareRevision => "READING_SOFTWARE_REVISION",
            Self::ReadingDeviceState => "READING_DEVICE_STATE",
            Self::SetNotifyDeviceState => "SET_NOTIFY_DEVICE_STATE",
            Self::Idle => "IDLE",
            Self::SendingNonce => "SENDING_NONCE",
            Self::SendingRecordRequest => "SENDING_RECORD_REQUEST",
            Self::ReceivingRecords => "RECEIVING_RECORDS",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
