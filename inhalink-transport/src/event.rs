//! Transport callbacks delivered to a session

use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Completion status reported by the stack for an asynchronous operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GattStatus {
    Success,
    Failure(u8),
}

impl GattStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Everything a link reports back to its session
///
/// Completion events answer an earlier submission on the same link;
/// `CharacteristicChanged` and `Disconnected` can arrive at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Link layer connection established
    Connected,

    ServicesDiscovered {
        status: GattStatus,
    },

    CharacteristicRead {
        characteristic: Uuid,
        value: Bytes,
        status: GattStatus,
    },

    /// Notification
    CharacteristicChanged {
        characteristic: Uuid,
        value: Bytes,
    },

    CharacteristicWritten {
        characteristic: Uuid,
        status: GattStatus,
    },

    /// Notification subscription acknowledged
    DescriptorWritten {
        characteristic: Uuid,
        descriptor: Uuid,
        status: GattStatus,
    },

    /// Link lost or connection attempt failed
    Disconnected,
}

impl SessionEvent {
    pub fn read(characteristic: Uuid, value: impl Into<Bytes>) -> Self {
        Self::CharacteristicRead {
            characteristic,
            value: value.into(),
            status: GattStatus::Success,
        }
    }

    pub fn changed(characteristic: Uuid, value: impl Into<Bytes>) -> Self {
        Self::CharacteristicChanged {
            characteristic,
            value: value.into(),
        }
    }

    pub fn written(characteristic: Uuid) -> Self {
        Self::CharacteristicWritten {
            characteristic,
            status: GattStatus::Success,
        }
    }

    pub fn subscribed(characteristic: Uuid, descriptor: Uuid) -> Self {
        Self::DescriptorWritten {
            characteristic,
            descriptor,
            status: GattStatus::Success,
        }
    }

    /// Status of a completion event, `None` for unsolicited events
    pub fn status(&self) -> Option<GattStatus> {
        match self {
            Self::ServicesDiscovered { status }
            | Self::CharacteristicRead { status, .. }
            | Self::CharacteristicWritten { status, .. }
            | Self::DescriptorWritten { status, .. } => Some(*status),
            Self::Connected | Self::CharacteristicChanged { .. } | Self::Disconnected => None,
        }
    }
}

/// Channel a link uses to hand events to its session's executor
///
/// Links may send from any thread; the receiving side processes events one
/// at a time.
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
