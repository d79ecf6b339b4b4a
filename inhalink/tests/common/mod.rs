//! Simulated dispenser answering the app side of the protocol

#![allow(dead_code)]

use inhalink::{GattStatus, SessionEvent};
use inhalink_core::cipher::{BLOCK_SIZE, Block};
use inhalink_core::constants::gatt;
use inhalink_core::{AuthKey, BlockCipher, InhaleEventRecord, Nonce, RacpResponse, RecordKeystream};
use inhalink_transport::{GattOp, LinkRecorder};

pub const SERIAL: &str = "MDI0042";
pub const KEY: &str = "000102030405060708090a0b0c0d0e0f";
pub const OTHER_KEY: &str = "ffeeddccbbaa99887766554433221100";

/// Device-side protocol state
pub struct SimulatedDispenser {
    pub serial: String,
    key: AuthKey,
    pub challenge: [u8; 8],
    pub doses: u16,
    pub records: Vec<InhaleEventRecord>,
}

impl SimulatedDispenser {
    pub fn new(key: &str) -> Self {
        Self {
            serial: SERIAL.to_string(),
            key: AuthKey::parse(key).unwrap(),
            challenge: [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7],
            doses: 0,
            records: Vec::new(),
        }
    }

    /// Device holding `count` records with ids 1..=count
    pub fn with_records(mut self, count: u16) -> Self {
        self.records = (1..=count).map(record).collect();
        self.doses = count;
        self
    }

    /// AES(L || P): what the app must write after seeing our challenge
    pub fn expected_response(&self, local: &[u8]) -> Block {
        self.encrypt_pair(local, &self.challenge)
    }

    /// AES(P || L): our proof for the app
    pub fn proof(&self, local: &[u8]) -> Block {
        self.encrypt_pair(&self.challenge, local)
    }

    fn encrypt_pair(&self, first: &[u8], second: &[u8]) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        block[..8].copy_from_slice(first);
        block[8..].copy_from_slice(second);
        BlockCipher::new(&self.key).encrypt_block(&block)
    }

    /// Six byte device state buffer
    pub fn device_state(&self) -> Vec<u8> {
        let [lo, hi] = self.doses.to_le_bytes();
        vec![0x01, 0x00, 0x00, lo, hi, 0x00]
    }

    /// Records with id >= `min_record_id`, encrypted under `nonce`
    pub fn encrypted_records(&self, nonce: &[u8], min_record_id: u16) -> Vec<Vec<u8>> {
        let nonce: Nonce = nonce.try_into().unwrap();
        let mut stream = RecordKeystream::new(&self.key, nonce);

        self.records
            .iter()
            .filter(|r| r.event_uid >= min_record_id)
            .map(|r| stream.apply(&r.encode()))
            .collect()
    }
}

pub fn record(uid: u16) -> InhaleEventRecord {
    InhaleEventRecord {
        event_uid: uid,
        time_offset: 86_400 * i32::from(uid),
        start_offset: 12,
        duration: 1_500,
        peak: 300,
        peak_offset: 400,
        volume: 2_000,
        status: 0,
    }
}

pub fn racp(status: u8) -> Vec<u8> {
    RacpResponse {
        request_opcode: 1,
        status,
    }
    .encode()
    .to_vec()
}

pub fn subscribed(characteristic: uuid::Uuid) -> SessionEvent {
    SessionEvent::subscribed(characteristic, gatt::CLIENT_CHARACTERISTIC_CONFIGURATION)
}

pub fn discovered() -> SessionEvent {
    SessionEvent::ServicesDiscovered {
        status: GattStatus::Success,
    }
}

/// Values written to `characteristic`, oldest first
pub fn writes(recorder: &LinkRecorder, characteristic: uuid::Uuid) -> Vec<Vec<u8>> {
    recorder
        .writes_to(characteristic)
        .into_iter()
        .map(|b| b.to_vec())
        .collect()
}

pub fn last_write(recorder: &LinkRecorder) -> Option<(uuid::Uuid, Vec<u8>)> {
    match recorder.last_op() {
        Some(GattOp::Write(characteristic, value)) => Some((characteristic, value.to_vec())),
        _ => None,
    }
}
