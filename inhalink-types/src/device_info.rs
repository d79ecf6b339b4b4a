//! Device information structures

use std::fmt;

/// Device information
///
/// Filled in step by step while a session comes up and handed to the
/// application after every completed state-read cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Manufacturer name (Device Information service)
    pub manufacturer_name: String,

    /// Hardware revision
    pub hardware_revision: String,

    /// Firmware revision
    pub software_revision: String,

    /// Dose counter reported by the device
    pub doses_taken: u16,

    /// Newest inhale record id known to be synchronised
    pub last_record_id: u16,
}

impl DeviceInfo {
    pub fn new(last_record_id: u16) -> Self {
        Self {
            last_record_id,
            ..Self::default()
        }
    }

    /// Records the device holds that have not been synchronised yet
    pub fn pending_records(&self) -> u16 {
        self.doses_taken.saturating_sub(self.last_record_id)
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[{} HW: {}, SW: {}, doses: {}, last record: {}]",
            self.manufacturer_name,
            self.hardware_revision,
            self.software_revision,
            self.doses_taken,
            self.last_record_id
        )
    }
}
