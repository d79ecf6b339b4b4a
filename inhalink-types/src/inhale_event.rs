//! Decoded inhale event records

use std::fmt;

use chrono::{DateTime, Utc};

/// One historical dosing record
///
/// Values are as measured by the device; only `inhale_start_offset` is
/// rescaled (the wire carries tenths of a second, this holds milliseconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InhaleEventInfo {
    /// Record id, monotonically increasing per device
    pub event_uid: u16,

    /// When the dose was taken
    pub event_time: DateTime<Utc>,

    /// Milliseconds from actuation to start of inhalation
    pub inhale_start_offset: u32,

    pub inhale_duration: u16,

    pub inhale_peak: u16,

    pub inhale_peak_offset: u16,

    pub inhale_volume: u16,

    /// Device status bitmask
    pub status: u8,
}

impl InhaleEventInfo {
    /// Check a single bit of the status bitmask
    pub fn has_status_bit(&self, bit: u8) -> bool {
        bit < 8 && self.status & (1 << bit) != 0
    }
}

impl fmt::Display for InhaleEventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InhaleEvent[#{} at {}, duration: {}, peak: {}, volume: {}, status: 0x{:02X}]",
            self.event_uid,
            self.event_time.to_rfc3339(),
            self.inhale_duration,
            self.inhale_peak,
            self.inhale_volume,
            self.status
        )
    }
}
