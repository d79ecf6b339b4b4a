//! Wire formats exchanged after authentication
//!
//! All multi-byte fields are little-endian.
//!
//! ```text
//! Device state (6 bytes, read or notified)
//! ┌──────────────┬──────────────┬──────────┐
//! │  reserved    │  dose count  │ reserved │
//! │   3 bytes    │   u16 LE     │  1 byte  │
//! └──────────────┴──────────────┴──────────┘
//!
//! Record request (5 bytes, written to RACP)
//! ┌────────┬──────────┬─────────────┬─────────────┐
//! │ opcode │ operator │ filter type │ min id      │
//! │   1    │    3     │      1      │  u16 LE     │
//! └────────┴──────────┴─────────────┴─────────────┘
//!
//! Inhale event (19 bytes, notified, keystream protected)
//! ┌─────┬──────┬───────┬──────────┬──────┬─────────────┬────────┬────────┬─────┐
//! │ uid │ time │ start │ duration │ peak │ peak offset │ volume │ status │ CRC │
//! │ u16 │ i32  │  u16  │   u16    │ u16  │     u16     │  u16   │   u8   │ u16 │
//! └─────┴──────┴───────┴──────────┴──────┴─────────────┴────────┴────────┴─────┘
//!
//! RACP response (4 bytes, notified)
//! ┌───────────────┬──────────┬────────────────┬────────┐
//! │ response op 6 │ reserved │ request opcode │ status │
//! └───────────────┴──────────┴────────────────┴────────┘
//! ```

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::command::{FilterType, Opcode, Operator, ResponseCode};
use crate::crc16;
use crate::error::{Error, Result};

/// Device state characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub doses_taken: u16,
}

impl DeviceState {
    pub const SIZE: usize = 6;

    const DOSE_COUNT_OFFSET: usize = 3;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::PayloadTooShort {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        let doses_taken =
            LittleEndian::read_u16(&buf[Self::DOSE_COUNT_OFFSET..Self::DOSE_COUNT_OFFSET + 2]);

        Ok(Self { doses_taken })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_bytes(0, Self::DOSE_COUNT_OFFSET);
        buf.put_u16_le(self.doses_taken);
        buf.put_u8(0);
        buf.freeze()
    }
}

/// "Report every record with id >= `min_record_id`"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRequest {
    pub min_record_id: u16,
}

impl RecordRequest {
    pub const SIZE: usize = 5;

    /// Request everything newer than `last_record_id`
    ///
    /// Saturates at the top of the id space rather than wrapping back to
    /// record 0.
    pub fn after(last_record_id: u16) -> Self {
        Self {
            min_record_id: last_record_id.saturating_add(1),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(Opcode::ReportStoredRecords.into());
        buf.put_u8(Operator::GreaterThanOrEqual as u8);
        buf.put_u8(FilterType::RecordId as u8);
        buf.put_u16_le(self.min_record_id);
        buf.freeze()
    }
}

/// Decrypted inhale event record, fields as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InhaleEventRecord {
    pub event_uid: u16,

    /// Device-relative time of the event, resolved by the time reference
    pub time_offset: i32,

    /// Start of inhalation in tenths of a second
    pub start_offset: u16,

    pub duration: u16,
    pub peak: u16,
    pub peak_offset: u16,
    pub volume: u16,
    pub status: u8,
}

impl InhaleEventRecord {
    /// Payload without CRC
    pub const PAYLOAD_SIZE: usize = 17;

    /// Payload plus CRC
    pub const SIZE: usize = Self::PAYLOAD_SIZE + 2;

    /// Scale of `start_offset` in milliseconds
    pub const START_OFFSET_SCALE_MS: u32 = 100;

    /// Decode a decrypted record and check its CRC
    ///
    /// # Errors
    ///
    /// - `UnexpectedLength` unless the record is exactly 19 bytes
    /// - `ChecksumMismatch` if the CRC over the first 17 bytes does not
    ///   match, which is also what a record under the wrong key looks like
    pub fn decode(plain: &[u8]) -> Result<Self> {
        if plain.len() != Self::SIZE {
            return Err(Error::UnexpectedLength {
                expected: Self::SIZE,
                actual: plain.len(),
            });
        }

        let (payload, crc) = plain.split_at(Self::PAYLOAD_SIZE);
        let received = u16::from_le_bytes([crc[0], crc[1]]);
        let expected = crc16::compute(payload);

        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }

        let mut buf = payload;
        Ok(Self {
            event_uid: buf.get_u16_le(),
            time_offset: buf.get_i32_le(),
            start_offset: buf.get_u16_le(),
            duration: buf.get_u16_le(),
            peak: buf.get_u16_le(),
            peak_offset: buf.get_u16_le(),
            volume: buf.get_u16_le(),
            status: buf.get_u8(),
        })
    }

    /// Encode with trailing CRC (plaintext)
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16_le(self.event_uid);
        buf.put_i32_le(self.time_offset);
        buf.put_u16_le(self.start_offset);
        buf.put_u16_le(self.duration);
        buf.put_u16_le(self.peak);
        buf.put_u16_le(self.peak_offset);
        buf.put_u16_le(self.volume);
        buf.put_u8(self.status);

        let crc = crc16::bytes(&buf);
        buf.put_slice(&crc);
        buf
    }

    pub fn start_offset_ms(&self) -> u32 {
        u32::from(self.start_offset) * Self::START_OFFSET_SCALE_MS
    }
}

/// Final notification of a record transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RacpResponse {
    pub request_opcode: u8,
    pub status: u8,
}

impl RacpResponse {
    pub const SIZE: usize = 4;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::PayloadTooShort {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        let opcode = Opcode::try_from(buf[0])?;
        if opcode != Opcode::ResponseCode {
            return Err(Error::UnexpectedOpcode(opcode));
        }

        let request = Opcode::try_from(buf[2])?;
        if request != Opcode::ReportStoredRecords {
            return Err(Error::UnexpectedOpcode(request));
        }

        Ok(Self {
            request_opcode: buf[2],
            status: buf[3],
        })
    }

    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&[
            Opcode::ResponseCode.into(),
            0,
            self.request_opcode,
            self.status,
        ])
    }

    /// Only status 1 counts as success
    pub fn is_success(&self) -> bool {
        self.status == ResponseCode::Success as u8
    }

    pub fn response_code(&self) -> Result<ResponseCode> {
        ResponseCode::try_from(self.status)
    }
}

impl fmt::Display for RacpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.response_code() {
            Ok(code) => write!(f, "RacpResponse[request={}, {}]", self.request_opcode, code),
            Err(_) => write!(
                f,
                "RacpResponse[request={}, status={}]",
                self.request_opcode, self.status
            ),
        }
    }
}
