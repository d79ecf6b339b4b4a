//! Type definitions for inhalink
//!
//! Plain data shared by every layer: what the application knows about a
//! device, what the device reports back, and what discovery sees on air.

pub mod advertisement;
pub mod connection_info;
pub mod device_info;
pub mod error;
pub mod inhale_event;

pub use advertisement::{Advertisement, AdvertisementFilter, DeviceId};
pub use connection_info::{ConnectionInfo, ProtocolType};
pub use device_info::DeviceInfo;
pub use error::{Error, Result};
pub use inhale_event::InhaleEventInfo;
