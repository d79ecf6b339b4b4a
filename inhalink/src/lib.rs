//! # inhalink
//!
//! Synchronisation of inhale records from Bluetooth LE metered-dose
//! inhalers.
//!
//! ## Features
//!
//! - Mutual AES-128 challenge-response authentication
//! - Incremental record transfer with per-record keystream decryption and CRC checks
//! - Discovery of paired devices with bounded scan filters
//! - One event-driven session task per connected device
//!
//! ## Quick Start
//!
//! ```no_run
//! use inhalink::{
//!     ConnectionInfo, DeviceEvent, DispenserSession, ProtocolType, RecordingLink,
//!     SessionContext, device_event_channel, event_channel,
//! };
//!
//! #[tokio::main]
//! async fn main() -> inhalink::Result<()> {
//!     let info = ConnectionInfo::new("MDI0042", "0123456789abcdef", ProtocolType::Dispenser);
//!     let (events, mut updates) = device_event_channel();
//!
//!     // A platform link would push its completions into `link_tx`
//!     let (_link_tx, link_rx) = event_channel();
//!     let (link, _recorder) = RecordingLink::new("AA:BB:CC:DD:EE:FF");
//!
//!     let session = DispenserSession::new(info, Box::new(link), SessionContext::new(events))?;
//!     let (_close, close_rx) = tokio::sync::oneshot::channel();
//!     tokio::spawn(session.run(link_rx, close_rx));
//!
//!     while let Some(event) = updates.recv().await {
//!         if let DeviceEvent::Updated { inhale_events, .. } = event {
//!             println!("{} new inhalations", inhale_events.len());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod descriptor;
pub mod dispenser;
pub mod error;
pub mod event;
pub mod manager;
pub mod scanner;

// Re-exports
pub use clock::{DeviceEpochClock, TimeReference};
pub use config::{ScannerConfig, SessionConfig};
pub use descriptor::{DispenserProtocol, ProtocolDescriptor, descriptor_for};
pub use dispenser::{DispenserSession, SessionContext};
pub use error::{Error, Result};
pub use event::{DeviceEvent, DeviceEventReceiver, DeviceEventSender, device_event_channel};
pub use manager::{SessionHandle, SessionManager, SessionRegistry};
pub use scanner::{Discovery, PermissionCheck, Scanner};

// Re-export lower layers
pub use inhalink_core::SessionState;
pub use inhalink_transport::{
    EventReceiver, EventSender, GattConnector, GattLink, GattStatus, RecordingConnector,
    RecordingLink, ScanMode, ScanRadio, SessionEvent, event_channel,
};
pub use inhalink_types::{
    Advertisement, AdvertisementFilter, ConnectionInfo, DeviceId, DeviceInfo, InhaleEventInfo,
    ProtocolType,
};
