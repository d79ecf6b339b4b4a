//! Counter-mode keystream over the block cipher
//!
//! The nonce is a 128-bit big-endian counter. Each 16-byte chunk of data is
//! XORed with the encryption of the current counter value, and the counter is
//! advanced once per chunk. Applying the keystream twice restores the input.

use crate::cipher::{AuthKey, BLOCK_SIZE, BlockCipher};

/// Nonce size in bytes
pub const NONCE_SIZE: usize = BLOCK_SIZE;

/// 128-bit counter block
pub type Nonce = [u8; NONCE_SIZE];

/// Advance the nonce by one, big-endian
///
/// The carry ripples from the last byte towards the first; all-0xFF wraps
/// to all-zero.
///
/// # Examples
///
/// ```
/// use inhalink_core::keystream::increment_nonce;
///
/// let mut nonce = [0u8; 16];
/// nonce[15] = 0xFF;
/// increment_nonce(&mut nonce);
/// assert_eq!(&nonce[14..], &[0x01, 0x00]);
/// ```
pub fn increment_nonce(nonce: &mut Nonce) {
    for byte in nonce.iter_mut().rev() {
        let (next, overflow) = byte.overflowing_add(1);
        *byte = next;
        if !overflow {
            return;
        }
    }
}

/// Stateless counter-mode transform
#[derive(Debug, Clone)]
pub struct KeystreamCipher {
    cipher: BlockCipher,
}

impl KeystreamCipher {
    pub fn new(key: &AuthKey) -> Self {
        Self {
            cipher: BlockCipher::new(key),
        }
    }

    /// XOR `data` with the keystream starting at `nonce`
    pub fn apply_keystream(&self, data: &[u8], nonce: &Nonce) -> Vec<u8> {
        let mut out = data.to_vec();
        self.apply_keystream_in_place(&mut out, nonce);
        out
    }

    pub fn apply_keystream_in_place(&self, data: &mut [u8], nonce: &Nonce) {
        let mut counter = *nonce;

        for chunk in data.chunks_mut(BLOCK_SIZE) {
            let keystream = self.cipher.encrypt_block(&counter);
            for (byte, key) in chunk.iter_mut().zip(keystream.iter()) {
                *byte ^= key;
            }
            increment_nonce(&mut counter);
        }
    }
}

/// Keystream position for a record transfer
///
/// Every record is transformed starting at the current nonce, after which
/// the nonce moves forward by exactly one block regardless of the record
/// length. Both ends of the link step in lockstep.
#[derive(Debug, Clone)]
pub struct RecordKeystream {
    cipher: KeystreamCipher,
    nonce: Nonce,
}

impl RecordKeystream {
    pub fn new(key: &AuthKey, nonce: Nonce) -> Self {
        Self {
            cipher: KeystreamCipher::new(key),
            nonce,
        }
    }

    /// Transform one record and advance to the next position
    pub fn apply(&mut self, record: &[u8]) -> Vec<u8> {
        let out = self.cipher.apply_keystream(record, &self.nonce);
        increment_nonce(&mut self.nonce);
        out
    }

    /// Nonce the next record will be transformed with
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }
}
