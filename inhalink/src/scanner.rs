//! Discovery of paired devices
//!
//! The scanner keeps one filter set installed on the radio for the paired
//! devices that currently have no session. When there are more devices than
//! the radio can filter on, it falls back to the generic family filter and
//! resolves the device from the advertisement itself.

use std::collections::HashMap;

use tracing::{debug, info};

use inhalink_transport::{ScanMode, ScanRadio};
use inhalink_types::{Advertisement, AdvertisementFilter, ConnectionInfo, DeviceId};

use crate::config::ScannerConfig;
use crate::descriptor::descriptor_for;
use crate::error::Result;

/// Whether the application may scan right now
pub type PermissionCheck = Box<dyn Fn() -> bool + Send>;

/// Advertisement resolved to a paired device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub connection_info: ConnectionInfo,
    pub device: DeviceId,
}

pub struct Scanner {
    radio: Box<dyn ScanRadio>,
    config: ScannerConfig,
    permission: PermissionCheck,

    /// One specific filter per wanted device, installed or not
    candidates: Vec<AdvertisementFilter>,

    /// Filters on the radio (or to be installed on the next start)
    filters: Vec<AdvertisementFilter>,

    requested: bool,
    scanning: bool,
    in_foreground: bool,

    /// Devices already reported, with the serial they resolved to
    ///
    /// Cleared on every filter installation and pruned to `candidates`.
    reported: HashMap<DeviceId, String>,
}

impl Scanner {
    pub fn new(
        radio: Box<dyn ScanRadio>,
        config: ScannerConfig,
        permission: impl Fn() -> bool + Send + 'static,
    ) -> Self {
        Self {
            radio,
            config,
            permission: Box::new(permission),
            candidates: Vec::new(),
            filters: Vec::new(),
            requested: false,
            scanning: false,
            in_foreground: false,
            reported: HashMap::new(),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn filters(&self) -> &[AdvertisementFilter] {
        &self.filters
    }

    pub fn scan_mode(&self) -> ScanMode {
        if self.in_foreground {
            ScanMode::LowLatency
        } else {
            ScanMode::LowPower
        }
    }

    /// Replace the devices to look for
    ///
    /// Restarts a running scan when the filter set changes. An empty list
    /// stops scanning.
    pub fn set_connection_info(&mut self, connection_infos: Vec<ConnectionInfo>) -> Result<()> {
        self.candidates = connection_infos
            .iter()
            .map(|info| descriptor_for(info.protocol_type).create_filter(info))
            .collect();

        // A device leaving the wanted set must be reported again once it returns
        let candidates = &self.candidates;
        self.reported.retain(|_, serial| {
            candidates.iter().any(|f| {
                f.connection_info
                    .as_ref()
                    .is_some_and(|info| info.serial_number == *serial)
            })
        });

        let filters = self.build_filters();
        if filters == self.filters && self.scanning {
            return Ok(());
        }

        self.filters = filters;
        self.restart()
    }

    pub fn start(&mut self) -> Result<()> {
        self.requested = true;
        self.restart()
    }

    pub fn stop(&mut self) -> Result<()> {
        self.requested = false;
        self.halt()
    }

    /// Switch between low-latency (foreground) and low-power scanning
    pub fn set_in_foreground(&mut self, in_foreground: bool) -> Result<()> {
        if self.in_foreground == in_foreground {
            return Ok(());
        }

        self.in_foreground = in_foreground;
        if self.scanning {
            return self.restart();
        }
        Ok(())
    }

    /// Re-evaluate the permission predicate
    pub fn on_permission_changed(&mut self) -> Result<()> {
        if (self.permission)() {
            if self.scanning {
                return Ok(());
            }
            return self.restart();
        }

        debug!("Scan permission revoked");
        self.halt()
    }

    /// Resolve a live advertisement
    ///
    /// Returns `None` when nothing installed matches, when the device is not
    /// one of the paired devices, or when it was already reported and is still
    /// wanted.
    pub fn on_advertisement(&mut self, advertisement: &Advertisement) -> Option<Discovery> {
        if !self.filters.iter().any(|f| f.matches(advertisement)) {
            return None;
        }

        let connection_info = self
            .candidates
            .iter()
            .find(|f| f.matches(advertisement))
            .and_then(|f| f.connection_info.clone())?;

        if self.reported.contains_key(&advertisement.device) {
            return None;
        }
        self.reported.insert(
            advertisement.device.clone(),
            connection_info.serial_number.clone(),
        );

        debug!(
            "Found {} at {}",
            connection_info.serial_number, advertisement.device
        );

        Some(Discovery {
            connection_info,
            device: advertisement.device.clone(),
        })
    }

    /// Resolve a batched report, at most one discovery per device
    pub fn on_batch(&mut self, advertisements: &[Advertisement]) -> Vec<Discovery> {
        advertisements
            .iter()
            .filter_map(|advertisement| self.on_advertisement(advertisement))
            .collect()
    }

    fn build_filters(&self) -> Vec<AdvertisementFilter> {
        let mut generic: Vec<AdvertisementFilter> = Vec::new();
        for candidate in &self.candidates {
            let family = candidate
                .connection_info
                .as_ref()
                .map(|info| descriptor_for(info.protocol_type).generic_filter());

            if let Some(filter) = family {
                if !generic.contains(&filter) {
                    generic.push(filter);
                }
            }
        }

        if self.candidates.len() > self.config.max_filters {
            debug!(
                "{} devices exceed {} filters, using generic filters only",
                self.candidates.len(),
                self.config.max_filters
            );
            return generic;
        }

        self.candidates.iter().cloned().chain(generic).collect()
    }

    /// Install the current filters if scanning is wanted and allowed
    fn restart(&mut self) -> Result<()> {
        if !self.requested || self.filters.is_empty() {
            return self.halt();
        }

        if !(self.permission)() {
            debug!("Scan permission missing, waiting");
            return self.halt();
        }

        self.halt()?;

        let mode = self.scan_mode();
        self.radio.start_scan(&self.filters, mode)?;
        self.scanning = true;
        self.reported.clear();

        info!("Scanning with {} filters ({:?})", self.filters.len(), mode);
        Ok(())
    }

    fn halt(&mut self) -> Result<()> {
        if !self.scanning {
            return Ok(());
        }

        self.scanning = false;
        self.radio.stop_scan()?;
        debug!("Scan stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("filters", &self.filters.len())
            .field("scanning", &self.scanning)
            .field("in_foreground", &self.in_foreground)
            .finish_non_exhaustive()
    }
}
