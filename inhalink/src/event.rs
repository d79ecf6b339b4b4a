//! Events delivered to the application

use inhalink_types::{ConnectionInfo, DeviceInfo, InhaleEventInfo};
use tokio::sync::mpsc;

/// What the application hears about a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Device authenticated
    Connected(ConnectionInfo),

    /// Session ended, for whatever reason; sent exactly once per session
    Disconnected(ConnectionInfo),

    /// State-read cycle or record transfer completed
    ///
    /// `connection_info.last_record_id` already reflects the new cursor.
    Updated {
        connection_info: ConnectionInfo,
        device_info: DeviceInfo,
        inhale_events: Vec<InhaleEventInfo>,
    },
}

impl DeviceEvent {
    pub fn connection_info(&self) -> &ConnectionInfo {
        match self {
            Self::Connected(info) | Self::Disconnected(info) => info,
            Self::Updated { connection_info, .. } => connection_info,
        }
    }
}

pub type DeviceEventSender = mpsc::UnboundedSender<DeviceEvent>;

pub type DeviceEventReceiver = mpsc::UnboundedReceiver<DeviceEvent>;

pub fn device_event_channel() -> (DeviceEventSender, DeviceEventReceiver) {
    mpsc::unbounded_channel()
}
