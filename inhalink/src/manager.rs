//! Session manager
//!
//! Ties discovery to sessions: advertisements from paired devices open a
//! link, each link gets a session driven by its own task, and devices with
//! a live session are left out of the scan filters until that session ends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use inhalink_transport::{GattConnector, event_channel};
use inhalink_types::{Advertisement, ConnectionInfo, DeviceId};

use crate::descriptor::descriptor_for;
use crate::dispenser::SessionContext;
use crate::error::Result;
use crate::scanner::{Discovery, Scanner};

/// Live session as seen by the manager
#[derive(Debug)]
pub struct SessionHandle {
    connection_info: ConnectionInfo,
    close: Option<oneshot::Sender<()>>,
}

impl SessionHandle {
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }

    fn close(&mut self) -> bool {
        match self.close.take() {
            Some(close) => close.send(()).is_ok(),
            None => false,
        }
    }
}

/// Devices with a live session
///
/// Owned by the manager; only the manager adds and removes entries.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<DeviceId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, device: &DeviceId) -> Option<&SessionHandle> {
        self.sessions.get(device)
    }

    /// Whether a session is tracked for `device`
    pub fn contains(&self, device: &DeviceId) -> bool {
        self.sessions.iter().any(|(tracked, handle)| {
            descriptor_for(handle.connection_info.protocol_type).is_same_device(tracked, device)
        })
    }

    /// Whether a session is tracked for the paired device with this serial
    pub fn contains_serial(&self, serial_number: &str) -> bool {
        self.sessions
            .values()
            .any(|handle| handle.connection_info.serial_number == serial_number)
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        self.sessions.keys().cloned().collect()
    }

    fn insert(&mut self, device: DeviceId, handle: SessionHandle) {
        self.sessions.insert(device, handle);
    }

    fn remove(&mut self, device: &DeviceId) -> Option<SessionHandle> {
        self.sessions.remove(device)
    }

    fn close(&mut self, device: &DeviceId) -> bool {
        self.sessions.get_mut(device).is_some_and(SessionHandle::close)
    }

    fn close_all(&mut self) {
        for handle in self.sessions.values_mut() {
            handle.close();
        }
    }
}

struct ManagerState {
    registry: SessionRegistry,
    connection_infos: Vec<ConnectionInfo>,
    running: bool,
    radio_enabled: bool,
}

struct Shared {
    // Lock order: state before scanner
    state: Mutex<ManagerState>,
    scanner: Mutex<Scanner>,
    connector: Arc<dyn GattConnector>,
    context: SessionContext,
    runtime: Handle,
}

impl Shared {
    /// Hand the scanner every paired device that has no session
    fn refresh_scanner(&self) -> Result<()> {
        let state = self.state.lock();

        let wanted = state
            .connection_infos
            .iter()
            .filter(|info| !state.registry.contains_serial(&info.serial_number))
            .cloned()
            .collect();

        self.scanner.lock().set_connection_info(wanted)
    }

    fn session_finished(&self, device: &DeviceId, connection_info: &ConnectionInfo) {
        {
            let mut state = self.state.lock();
            state.registry.remove(device);

            // Keep the cursor the session advanced
            for info in state.connection_infos.iter_mut() {
                if info.serial_number == connection_info.serial_number
                    && info.last_record_id < connection_info.last_record_id
                {
                    info.last_record_id = connection_info.last_record_id;
                }
            }
        }

        debug!("Session for {} ended", device);

        if let Err(e) = self.refresh_scanner() {
            warn!("Failed to resume scanning for {}: {}", device, e);
        }
    }
}

/// Entry point of the library
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use inhalink::{
///     ConnectionInfo, ProtocolType, RecordingConnector, ScannerConfig, Scanner,
///     SessionContext, SessionManager, SessionRegistry, device_event_channel,
/// };
///
/// # fn radio() -> Box<dyn inhalink::ScanRadio> { unimplemented!() }
/// #[tokio::main]
/// async fn main() -> inhalink::Result<()> {
///     let (events, mut updates) = device_event_channel();
///     let scanner = Scanner::new(radio(), ScannerConfig::default(), || true);
///
///     let manager = SessionManager::new(
///         SessionRegistry::new(),
///         scanner,
///         Arc::new(RecordingConnector::new()),
///         SessionContext::new(events),
///         tokio::runtime::Handle::current(),
///     );
///
///     manager.set_connection_info(vec![ConnectionInfo::new(
///         "MDI0042",
///         "0123456789abcdef",
///         ProtocolType::Dispenser,
///     )])?;
///     manager.start()?;
///
///     while let Some(event) = updates.recv().await {
///         println!("{:?}", event);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a manager; sessions run as tasks on `runtime`
    pub fn new(
        registry: SessionRegistry,
        scanner: Scanner,
        connector: Arc<dyn GattConnector>,
        context: SessionContext,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ManagerState {
                    registry,
                    connection_infos: Vec::new(),
                    running: false,
                    radio_enabled: true,
                }),
                scanner: Mutex::new(scanner),
                connector,
                context,
                runtime,
            }),
        }
    }

    /// Replace the set of paired devices
    ///
    /// Entries that fail validation are skipped. Devices with a live session
    /// keep it; removing them from the list does not disconnect them.
    pub fn set_connection_info(&self, connection_infos: Vec<ConnectionInfo>) -> Result<()> {
        let valid: Vec<ConnectionInfo> = connection_infos
            .into_iter()
            .filter(|info| match info.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Skipping {}: {}", info.serial_number, e);
                    false
                }
            })
            .collect();

        info!("Tracking {} devices", valid.len());
        self.shared.state.lock().connection_infos = valid;
        self.shared.refresh_scanner()
    }

    /// Current paired devices with their latest cursors
    pub fn connection_info(&self) -> Vec<ConnectionInfo> {
        self.shared.state.lock().connection_infos.clone()
    }

    /// Start discovery
    pub fn start(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.running = true;

        if !state.radio_enabled {
            debug!("Radio off, scanning deferred");
            return Ok(());
        }

        self.shared.scanner.lock().start()
    }

    /// Stop discovery and close every session
    pub fn stop(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.running = false;
        state.registry.close_all();

        self.shared.scanner.lock().stop()
    }

    pub fn set_in_foreground(&self, in_foreground: bool) -> Result<()> {
        let _state = self.shared.state.lock();
        self.shared.scanner.lock().set_in_foreground(in_foreground)
    }

    pub fn on_permission_changed(&self) -> Result<()> {
        let _state = self.shared.state.lock();
        self.shared.scanner.lock().on_permission_changed()
    }

    /// Radio switched on or off
    ///
    /// Links do not survive the radio going off; their sessions see the
    /// disconnect on their own.
    pub fn on_radio_state_changed(&self, enabled: bool) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.radio_enabled = enabled;
        info!("Radio {}", if enabled { "on" } else { "off" });

        let mut scanner = self.shared.scanner.lock();
        if enabled && state.running {
            scanner.start()
        } else {
            scanner.stop()
        }
    }

    /// Live advertisement from the radio
    pub fn on_advertisement(&self, advertisement: &Advertisement) {
        let discovery = {
            let _state = self.shared.state.lock();
            self.shared.scanner.lock().on_advertisement(advertisement)
        };

        if let Some(discovery) = discovery {
            self.open_session(discovery);
        }
    }

    /// Batched advertisement report from the radio
    pub fn on_batch_advertisements(&self, advertisements: &[Advertisement]) {
        let discoveries = {
            let _state = self.shared.state.lock();
            self.shared.scanner.lock().on_batch(advertisements)
        };

        for discovery in discoveries {
            self.open_session(discovery);
        }
    }

    /// Close the session for `device`, if any
    pub fn disconnect(&self, device: &DeviceId) -> bool {
        self.shared.state.lock().registry.close(device)
    }

    pub fn is_connected(&self, device: &DeviceId) -> bool {
        self.shared.state.lock().registry.contains(device)
    }

    pub fn active_devices(&self) -> Vec<DeviceId> {
        self.shared.state.lock().registry.devices()
    }

    fn open_session(&self, discovery: Discovery) {
        let Discovery {
            connection_info,
            device,
        } = discovery;

        {
            let mut state = self.shared.state.lock();

            if !state.running {
                debug!("Not running, ignoring {}", device);
                return;
            }

            if state.registry.contains(&device)
                || state.registry.contains_serial(&connection_info.serial_number)
            {
                debug!("{} already has a session", device);
                return;
            }

            let (event_tx, event_rx) = event_channel();

            let link = match self.shared.connector.open(&device, event_tx) {
                Ok(link) => link,
                Err(e) => {
                    warn!("Failed to open link to {}: {}", device, e);
                    return;
                }
            };

            let descriptor = descriptor_for(connection_info.protocol_type);
            let session = match descriptor.create_session(
                connection_info.clone(),
                link,
                self.shared.context.clone(),
            ) {
                Ok(session) => session,
                Err(e) => {
                    warn!("Failed to create session for {}: {}", device, e);
                    return;
                }
            };

            let (close_tx, close_rx) = oneshot::channel();
            state.registry.insert(
                device.clone(),
                SessionHandle {
                    connection_info,
                    close: Some(close_tx),
                },
            );

            let shared = Arc::clone(&self.shared);
            self.shared.runtime.spawn(async move {
                let session = session.run(event_rx, close_rx).await;
                shared.session_finished(&device, session.connection_info());
            });
        }

        if let Err(e) = self.shared.refresh_scanner() {
            warn!("Failed to update scan filters: {}", e);
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SessionManager")
            .field("devices", &state.connection_infos.len())
            .field("sessions", &state.registry.len())
            .field("running", &state.running)
            .finish_non_exhaustive()
    }
}
