//! Discovery data: device handles, advertisements and the filters that match them

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::connection_info::ConnectionInfo;

/// Transport-level handle of a physical device (address or platform id)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One received advertisement (live or from a batched report)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    /// Device that sent it
    pub device: DeviceId,

    /// Complete or shortened local name
    pub local_name: Option<String>,

    /// Advertised service UUIDs
    pub service_uuids: Vec<Uuid>,

    /// Manufacturer specific data keyed by company identifier
    pub manufacturer_data: HashMap<u16, Vec<u8>>,

    pub rssi: Option<i16>,
}

impl Advertisement {
    pub fn new(device: impl Into<DeviceId>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn with_service(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    pub fn with_manufacturer_data(mut self, company_id: u16, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data.insert(company_id, data.into());
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }
}

/// Discovery filter
///
/// Every populated field must match. A filter without `connection_info` is
/// the generic fallback for a whole device family; it can tell that an
/// advertisement belongs to the family but not which paired device sent it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementFilter {
    pub service_uuid: Option<Uuid>,

    pub manufacturer_id: Option<u16>,

    /// Exact manufacturer data expected for `manufacturer_id`
    pub manufacturer_data: Option<Vec<u8>>,

    /// Expected prefix of the local name
    pub name: Option<String>,

    /// Paired device this filter was built for
    pub connection_info: Option<ConnectionInfo>,
}

impl AdvertisementFilter {
    pub fn is_generic(&self) -> bool {
        self.connection_info.is_none()
    }

    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        if let Some(uuid) = self.service_uuid {
            if !advertisement.service_uuids.contains(&uuid) {
                return false;
            }
        }

        if let Some(company_id) = self.manufacturer_id {
            let Some(data) = advertisement.manufacturer_data.get(&company_id) else {
                return false;
            };

            if let Some(expected) = &self.manufacturer_data {
                if data != expected {
                    return false;
                }
            }
        }

        if let Some(prefix) = &self.name {
            match &advertisement.local_name {
                Some(name) if name.starts_with(prefix.as_str()) => {}
                _ => return false,
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolType;

    const SERVICE: Uuid = Uuid::from_u128(0x1234);

    fn specific() -> AdvertisementFilter {
        AdvertisementFilter {
            service_uuid: Some(SERVICE),
            manufacturer_id: Some(0x0A1B),
            manufacturer_data: Some(b"SN01".to_vec()),
            name: None,
            connection_info: Some(ConnectionInfo::new(
                "SN01",
                "0123456789abcdef",
                ProtocolType::Dispenser,
            )),
        }
    }

    #[test]
    fn test_specific_filter_matches_serial() {
        let adv = Advertisement::new("AA:BB")
            .with_service(SERVICE)
            .with_manufacturer_data(0x0A1B, b"SN01".to_vec());
        assert!(specific().matches(&adv));
        assert!(!specific().is_generic());
    }

    #[test]
    fn test_specific_filter_rejects_other_serial() {
        let adv = Advertisement::new("AA:BB")
            .with_service(SERVICE)
            .with_manufacturer_data(0x0A1B, b"SN02".to_vec());
        assert!(!specific().matches(&adv));
    }

    #[test]
    fn test_specific_filter_rejects_longer_serial() {
        let adv = Advertisement::new("AA:BB")
            .with_service(SERVICE)
            .with_manufacturer_data(0x0A1B, b"SN012".to_vec());
        assert!(!specific().matches(&adv));
    }

    #[test]
    fn test_missing_manufacturer_data() {
        let adv = Advertisement::new("AA:BB").with_service(SERVICE);
        assert!(!specific().matches(&adv));
    }

    #[test]
    fn test_name_prefix() {
        let filter = AdvertisementFilter {
            name: Some("MDI".into()),
            ..AdvertisementFilter::default()
        };
        assert!(filter.is_generic());
        assert!(filter.matches(&Advertisement::new("x").with_name("MDI-42")));
        assert!(!filter.matches(&Advertisement::new("x").with_name("Watch")));
        assert!(!filter.matches(&Advertisement::new("x")));
    }
}
