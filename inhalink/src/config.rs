//! Configuration
//!
//! Values come from the embedding application; defaults live in
//! `inhalink_core::constants`.

use std::time::Duration;

use inhalink_core::constants::{
    DEFAULT_AUTHENTICATION_TIMEOUT, DEFAULT_MAX_RECORDS_PER_TRANSFER, DEFAULT_MAX_SCAN_FILTERS,
};

/// Per-session limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for the handshake, counted from the authentication subscription
    pub authentication_timeout: Duration,

    /// Records accepted in one transfer before it is treated as a protocol error
    pub max_records_per_transfer: usize,
}

impl SessionConfig {
    pub fn with_authentication_timeout(mut self, timeout: Duration) -> Self {
        self.authentication_timeout = timeout;
        self
    }

    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records_per_transfer = max;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            authentication_timeout: Duration::from_secs(DEFAULT_AUTHENTICATION_TIMEOUT),
            max_records_per_transfer: DEFAULT_MAX_RECORDS_PER_TRANSFER,
        }
    }
}

/// Discovery limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Specific filters allowed before collapsing to the generic filter
    pub max_filters: usize,
}

impl ScannerConfig {
    pub fn with_max_filters(mut self, max_filters: usize) -> Self {
        self.max_filters = max_filters;
        self
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_filters: DEFAULT_MAX_SCAN_FILTERS,
        }
    }
}
