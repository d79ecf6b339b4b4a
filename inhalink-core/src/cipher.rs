//! AES-128 single-block cipher and authentication key parsing
//!
//! The handshake payloads are exactly one block each, so there is no
//! chaining mode and no padding here. Counter mode lives in `keystream`.

use std::fmt;
use std::str::FromStr;

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::error::{Error, Result};

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// One cipher block
pub type Block = [u8; BLOCK_SIZE];

/// 128-bit authentication key shared between the app and one device
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey([u8; BLOCK_SIZE]);

impl AuthKey {
    /// Parse the textual key stored with the connection info
    ///
    /// - 16 characters: the ASCII bytes of the text are the key
    /// - 32 characters: the text is the key in hex
    ///
    /// # Examples
    ///
    /// ```
    /// use inhalink_core::cipher::AuthKey;
    ///
    /// let ascii = AuthKey::parse("0123456789abcdef").unwrap();
    /// assert_eq!(ascii.as_bytes(), b"0123456789abcdef");
    ///
    /// let hex = AuthKey::parse("000102030405060708090a0b0c0d0e0f").unwrap();
    /// assert_eq!(hex.as_bytes()[15], 0x0F);
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut key = [0u8; BLOCK_SIZE];

        match text.len() {
            BLOCK_SIZE => {
                if !text.is_ascii() {
                    return Err(Error::InvalidKeyEncoding(
                        "16 character key must be ASCII".into(),
                    ));
                }
                key.copy_from_slice(text.as_bytes());
            }
            32 => hex::decode_to_slice(text, &mut key)?,
            len => return Err(Error::InvalidKeyLength(len)),
        }

        Ok(Self(key))
    }

    pub fn from_bytes(bytes: Block) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &Block {
        &self.0
    }
}

impl FromStr for AuthKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthKey(<redacted>)")
    }
}

/// AES-128 over exactly one block
#[derive(Clone)]
pub struct BlockCipher {
    cipher: Aes128,
}

impl BlockCipher {
    pub fn new(key: &AuthKey) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(key.as_bytes())),
        }
    }

    pub fn encrypt_block(&self, block: &Block) -> Block {
        let mut buf = GenericArray::clone_from_slice(block);
        self.cipher.encrypt_block(&mut buf);

        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    pub fn decrypt_block(&self, block: &Block) -> Block {
        let mut buf = GenericArray::clone_from_slice(block);
        self.cipher.decrypt_block(&mut buf);

        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&buf);
        out
    }
}

impl fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlockCipher(AES-128)")
    }
}
