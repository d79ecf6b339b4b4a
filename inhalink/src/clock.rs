//! Resolution of device-relative event times

use chrono::{DateTime, Duration, Utc};

/// Turns the raw time field of an inhale record into an absolute time
pub trait TimeReference: Send + Sync {
    fn resolve_event_time(&self, raw_offset: i32) -> DateTime<Utc>;
}

/// Device clock counting seconds from a fixed epoch
///
/// Devices report the offset with either sign depending on firmware; the
/// magnitude is the number of seconds since `epoch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEpochClock {
    epoch: DateTime<Utc>,
}

impl DeviceEpochClock {
    /// 2000-01-01T00:00:00Z
    pub const DEFAULT_EPOCH_SECS: i64 = 946_684_800;

    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self { epoch }
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }
}

impl Default for DeviceEpochClock {
    fn default() -> Self {
        Self::new(DateTime::from_timestamp(Self::DEFAULT_EPOCH_SECS, 0).unwrap_or_default())
    }
}

impl TimeReference for DeviceEpochClock {
    fn resolve_event_time(&self, raw_offset: i32) -> DateTime<Utc> {
        self.epoch + Duration::seconds(i64::from(raw_offset.unsigned_abs()))
    }
}
