//! CRC-16 used to protect inhale event records
//!
//! CCITT polynomial in reflected form (0x8408), initial value 0xFFFF, no
//! final XOR (CRC-16/MCRF4XX). The checksum travels little-endian, which makes
//! the CRC of `data || crc` come out as zero.

use tracing::trace;

const POLYNOMIAL: u16 = 0x8408;
const INITIAL: u16 = 0xFFFF;

/// Compute the CRC over `data`
///
/// # Examples
///
/// ```
/// use inhalink_core::crc16;
///
/// assert_eq!(crc16::compute(b"123456789"), 0x6F91);
/// ```
pub fn compute(data: &[u8]) -> u16 {
    let mut crc = INITIAL;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }

    trace!(
        len = data.len(),
        crc = format!("0x{:04X}", crc),
        "Calculated CRC"
    );

    crc
}

/// CRC of `data` in its two-byte wire form
pub fn bytes(data: &[u8]) -> [u8; 2] {
    compute(data).to_le_bytes()
}

/// Check `data` against a received checksum
pub fn verify(data: &[u8], received: [u8; 2]) -> bool {
    bytes(data) == received
}
