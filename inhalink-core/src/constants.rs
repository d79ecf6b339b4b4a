//! Protocol constants

use uuid::Uuid;

/// Default authentication deadline (seconds)
pub const DEFAULT_AUTHENTICATION_TIMEOUT: u64 = 10;

/// Default cap on records accepted in one transfer
pub const DEFAULT_MAX_RECORDS_PER_TRANSFER: usize = 1024;

/// Default number of specific scan filters before collapsing to the generic one
pub const DEFAULT_MAX_SCAN_FILTERS: usize = 8;

/// Expand a 16-bit SIG assigned number onto the Bluetooth base UUID
const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(0x0000_0000_0000_1000_8000_0080_5F9B_34FB | ((short as u128) << 96))
}

/// GATT services and characteristics
pub mod gatt {
    use super::{Uuid, sig_uuid};

    /// Vendor service carrying authentication, state and records
    pub const DISPENSER_SERVICE: Uuid = Uuid::from_u128(0x8F3C_0001_5C6A_4C1E_9D5B_3A2E_7F10_C0DE);

    /// Challenges, responses and the transfer nonce (write + notify)
    pub const AUTHENTICATION: Uuid = Uuid::from_u128(0x8F3C_0002_5C6A_4C1E_9D5B_3A2E_7F10_C0DE);

    /// Dose counter (read + notify)
    pub const DEVICE_STATE: Uuid = Uuid::from_u128(0x8F3C_0003_5C6A_4C1E_9D5B_3A2E_7F10_C0DE);

    /// Encrypted inhale event records (notify)
    pub const INHALE_EVENT: Uuid = Uuid::from_u128(0x8F3C_0004_5C6A_4C1E_9D5B_3A2E_7F10_C0DE);

    /// Record Access Control Point (write + notify)
    pub const RECORD_ACCESS_CONTROL_POINT: Uuid = sig_uuid(0x2A52);

    pub const DEVICE_INFORMATION_SERVICE: Uuid = sig_uuid(0x180A);
    pub const SERIAL_NUMBER: Uuid = sig_uuid(0x2A25);
    pub const HARDWARE_REVISION: Uuid = sig_uuid(0x2A27);
    pub const SOFTWARE_REVISION: Uuid = sig_uuid(0x2A28);
    pub const MANUFACTURER_NAME: Uuid = sig_uuid(0x2A29);

    /// Client Characteristic Configuration descriptor
    pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = sig_uuid(0x2902);
}

/// Advertising identifiers of the dispenser family
pub mod advertising {
    /// Company identifier used in manufacturer specific data
    pub const MANUFACTURER_ID: u16 = 0x0A7D;

    /// Local name prefix
    pub const NAME_PREFIX: &str = "MDI";
}
