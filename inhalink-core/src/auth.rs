//! Mutual challenge-response authentication
//!
//! Both sides prove knowledge of the shared key without sending it:
//!
//! 1. App writes its 8-byte challenge `L`
//! 2. Device notifies its 8-byte challenge `P`
//! 3. App writes `AES(key, L || P)`
//! 4. Device notifies `AES(key, P || L)`, which the app checks
//!
//! The same characteristic later carries the 16-byte nonce that seeds the
//! record keystream.

use tracing::trace;

use crate::cipher::{AuthKey, BLOCK_SIZE, Block, BlockCipher};
use crate::error::{Error, Result};
use crate::keystream::Nonce;

/// Challenge size in bytes
pub const CHALLENGE_SIZE: usize = 8;

pub type Challenge = [u8; CHALLENGE_SIZE];

/// Fresh random challenge
pub fn generate_challenge() -> Challenge {
    rand::random()
}

/// Fresh random keystream nonce
pub fn generate_nonce() -> Nonce {
    rand::random()
}

/// Encrypt the concatenation `first || second` as a single block
pub fn make_response(cipher: &BlockCipher, first: &Challenge, second: &Challenge) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    block[..CHALLENGE_SIZE].copy_from_slice(first);
    block[CHALLENGE_SIZE..].copy_from_slice(second);

    cipher.encrypt_block(&block)
}

/// Interpret a notification as a peer challenge
pub fn parse_challenge(payload: &[u8]) -> Result<Challenge> {
    payload.try_into().map_err(|_| Error::UnexpectedLength {
        expected: CHALLENGE_SIZE,
        actual: payload.len(),
    })
}

/// Interpret a notification as a peer response block
pub fn parse_response(payload: &[u8]) -> Result<Block> {
    payload.try_into().map_err(|_| Error::UnexpectedLength {
        expected: BLOCK_SIZE,
        actual: payload.len(),
    })
}

/// App side of one handshake
#[derive(Debug, Clone)]
pub struct Handshake {
    cipher: BlockCipher,
    local: Challenge,
}

impl Handshake {
    pub fn new(key: &AuthKey, local: Challenge) -> Self {
        Self {
            cipher: BlockCipher::new(key),
            local,
        }
    }

    /// Start a handshake with a random local challenge
    pub fn start(key: &AuthKey) -> Self {
        Self::new(key, generate_challenge())
    }

    pub fn local_challenge(&self) -> &Challenge {
        &self.local
    }

    /// Block the app writes after receiving the peer challenge
    pub fn response_to(&self, peer: &Challenge) -> Block {
        make_response(&self.cipher, &self.local, peer)
    }

    /// Check the device's proof: it must decrypt to `peer || local`
    pub fn verify(&self, peer: &Challenge, response: &Block) -> bool {
        let plain = self.cipher.decrypt_block(response);
        let ok = plain[..CHALLENGE_SIZE] == peer[..] && plain[CHALLENGE_SIZE..] == self.local[..];

        trace!(ok, "Verified peer authentication response");

        ok
    }
}
