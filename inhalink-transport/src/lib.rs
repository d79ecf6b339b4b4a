//! Transport layer for inhalink
//!
//! The protocol core never talks to a Bluetooth stack directly. It submits
//! operations through [`GattLink`] and receives their completions as
//! [`SessionEvent`]s; discovery goes through [`ScanRadio`]. Platform
//! backends implement these traits.

pub mod error;
pub mod event;
pub mod recording;

pub use error::{Error, Result};
pub use event::{EventReceiver, EventSender, GattStatus, SessionEvent, event_channel};
pub use recording::{GattOp, LinkRecorder, OpKind, OpenedLink, RecordingConnector, RecordingLink};

use inhalink_types::{AdvertisementFilter, DeviceId};
use uuid::Uuid;

/// Connection to one peripheral
///
/// Every method only *submits* an operation and returns at once. `Err`
/// means the stack refused the submission; otherwise the outcome arrives
/// later on the link's event channel.
pub trait GattLink: Send {
    /// Device this link talks to
    fn device(&self) -> &DeviceId;

    /// Open the connection (completes with `Connected` or `Disconnected`)
    fn connect(&mut self) -> Result<()>;

    /// Discover services (completes with `ServicesDiscovered`)
    fn discover_services(&mut self) -> Result<()>;

    /// Read a characteristic (completes with `CharacteristicRead`)
    fn read(&mut self, characteristic: Uuid) -> Result<()>;

    /// Write a characteristic with response (completes with `CharacteristicWritten`)
    fn write(&mut self, characteristic: Uuid, value: &[u8]) -> Result<()>;

    /// Subscribe to notifications (completes with `DescriptorWritten`)
    fn enable_notifications(&mut self, characteristic: Uuid) -> Result<()>;

    /// Tear the connection down
    fn disconnect(&mut self) -> Result<()>;
}

/// Creates links for discovered devices
pub trait GattConnector: Send + Sync {
    /// Create a link whose events are delivered to `events`
    fn open(&self, device: &DeviceId, events: EventSender) -> Result<Box<dyn GattLink>>;
}

/// Radio scan duty cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// App in background
    LowPower,

    /// App in foreground
    LowLatency,
}

/// Discovery radio
pub trait ScanRadio: Send {
    /// Start scanning with exactly these filters, replacing any active set
    fn start_scan(&mut self, filters: &[AdvertisementFilter], mode: ScanMode) -> Result<()>;

    /// Stop scanning
    fn stop_scan(&mut self) -> Result<()>;
}
