//! # inhalink-core
//!
//! Core protocol implementation for connected metered-dose inhalers.
//!
//! This crate provides the low-level protocol primitives:
//! - CRC-16 record checksum
//! - AES-128 block cipher and authentication key parsing
//! - Counter-mode keystream with manual nonce arithmetic
//! - Challenge-response handshake
//! - RACP codes and record wire formats
//! - Session states and protocol constants

pub mod auth;
pub mod cipher;
pub mod command;
pub mod constants;
pub mod crc16;
pub mod error;
pub mod keystream;
pub mod record;
pub mod session;

pub use auth::{Challenge, Handshake};
pub use cipher::{AuthKey, BlockCipher};
pub use command::{Opcode, ResponseCode};
pub use error::{Error, Result};
pub use keystream::{KeystreamCipher, Nonce, RecordKeystream};
pub use record::{DeviceState, InhaleEventRecord, RacpResponse, RecordRequest};
pub use session::SessionState;
