//! Device family descriptors
//!
//! A descriptor knows how to find devices of one family over the air and
//! how to start a session with them.

use inhalink_core::constants::{advertising, gatt};
use inhalink_transport::GattLink;
use inhalink_types::{AdvertisementFilter, ConnectionInfo, DeviceId, ProtocolType};

use crate::dispenser::{DispenserSession, SessionContext};
use crate::error::Result;

pub trait ProtocolDescriptor: Send + Sync {
    fn protocol_type(&self) -> ProtocolType;

    /// Filter matching exactly the device described by `connection_info`
    fn create_filter(&self, connection_info: &ConnectionInfo) -> AdvertisementFilter;

    /// Filter matching any device of the family
    fn generic_filter(&self) -> AdvertisementFilter;

    /// Whether `candidate` is the device a tracked session is bound to
    fn is_same_device(&self, tracked: &DeviceId, candidate: &DeviceId) -> bool;

    fn create_session(
        &self,
        connection_info: ConnectionInfo,
        link: Box<dyn GattLink>,
        context: SessionContext,
    ) -> Result<DispenserSession>;
}

/// Metered-dose inhaler family
///
/// Dispensers advertise the dispenser service and carry their serial number
/// as ASCII in the manufacturer data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispenserProtocol;

impl ProtocolDescriptor for DispenserProtocol {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::Dispenser
    }

    fn create_filter(&self, connection_info: &ConnectionInfo) -> AdvertisementFilter {
        AdvertisementFilter {
            service_uuid: Some(gatt::DISPENSER_SERVICE),
            manufacturer_id: Some(advertising::MANUFACTURER_ID),
            manufacturer_data: Some(connection_info.serial_number.as_bytes().to_vec()),
            name: None,
            connection_info: Some(connection_info.clone()),
        }
    }

    fn generic_filter(&self) -> AdvertisementFilter {
        AdvertisementFilter {
            service_uuid: Some(gatt::DISPENSER_SERVICE),
            ..AdvertisementFilter::default()
        }
    }

    fn is_same_device(&self, tracked: &DeviceId, candidate: &DeviceId) -> bool {
        tracked == candidate
    }

    fn create_session(
        &self,
        connection_info: ConnectionInfo,
        link: Box<dyn GattLink>,
        context: SessionContext,
    ) -> Result<DispenserSession> {
        DispenserSession::new(connection_info, link, context)
    }
}

/// Descriptor for a device family
pub fn descriptor_for(protocol_type: ProtocolType) -> &'static dyn ProtocolDescriptor {
    match protocol_type {
        ProtocolType::Dispenser => &DispenserProtocol,
    }
}
