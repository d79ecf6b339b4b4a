//! Dispenser session
//!
//! One `DispenserSession` owns one GATT link and turns the link's completion
//! events into protocol steps. Every step submits at most one GATT operation
//! and waits for its completion before the next one; `handle` never blocks.
//!
//! ```text
//! CONNECTING -> SERVICE_DISCOVERY -> READ_SERIAL_NUMBER
//!   -> SET_NOTIFY_AUTHENTICATION -> AUTHENTICATION_1 -> AUTHENTICATION_2
//!   -> READING_* -> SET_NOTIFY_DEVICE_STATE -> IDLE
//! IDLE -> SENDING_NONCE -> SENDING_RECORD_REQUEST -> RECEIVING_RECORDS -> IDLE
//! ```

use std::mem;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use inhalink_core::constants::gatt;
use inhalink_core::{
    AuthKey, Challenge, DeviceState, Handshake, InhaleEventRecord, RacpResponse, RecordKeystream,
    RecordRequest, SessionState, auth,
};
use inhalink_transport::{EventReceiver, GattLink, GattStatus, SessionEvent};
use inhalink_types::{ConnectionInfo, DeviceId, DeviceInfo, InhaleEventInfo};

use crate::clock::{DeviceEpochClock, TimeReference};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, DeviceEventSender};

/// Characteristics subscribed after the information reads, in order
const SYNC_NOTIFICATIONS: [Uuid; 3] = [
    gatt::DEVICE_STATE,
    gatt::INHALE_EVENT,
    gatt::RECORD_ACCESS_CONTROL_POINT,
];

/// Everything a session needs besides its device
#[derive(Clone)]
pub struct SessionContext {
    pub config: SessionConfig,
    pub clock: Arc<dyn TimeReference>,
    pub events: DeviceEventSender,
}

impl SessionContext {
    pub fn new(events: DeviceEventSender) -> Self {
        Self {
            config: SessionConfig::default(),
            clock: Arc::new(DeviceEpochClock::default()),
            events,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeReference>) -> Self {
        self.clock = clock;
        self
    }
}

/// Device information read performed after authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfoRead {
    ManufacturerName,
    HardwareRevision,
    SoftwareRevision,
    DeviceState,
}

impl InfoRead {
    fn characteristic(self) -> Uuid {
        match self {
            Self::ManufacturerName => gatt::MANUFACTURER_NAME,
            Self::HardwareRevision => gatt::HARDWARE_REVISION,
            Self::SoftwareRevision => gatt::SOFTWARE_REVISION,
            Self::DeviceState => gatt::DEVICE_STATE,
        }
    }

    fn next(self) -> Option<Self> {
        match self {
            Self::ManufacturerName => Some(Self::HardwareRevision),
            Self::HardwareRevision => Some(Self::SoftwareRevision),
            Self::SoftwareRevision => Some(Self::DeviceState),
            Self::DeviceState => None,
        }
    }

    fn state(self) -> SessionState {
        match self {
            Self::ManufacturerName => SessionState::ReadingManufacturerName,
            Self::HardwareRevision => SessionState::ReadingHardwareRevision,
            Self::SoftwareRevision => SessionState::ReadingSoftwareRevision,
            Self::DeviceState => SessionState::ReadingDeviceState,
        }
    }
}

/// One record transfer
struct Transfer {
    stream: RecordKeystream,
    records: Vec<InhaleEventInfo>,

    /// Device state changed while the transfer was running
    rerun: bool,
}

enum Phase {
    Connecting,
    ServiceDiscovery,
    ReadSerialNumber,
    SetNotifyAuthentication,
    Authentication1 {
        handshake: Handshake,
        challenge_written: bool,
        peer: Option<Challenge>,
    },
    Authentication2 {
        handshake: Handshake,
        peer: Challenge,
    },
    Reading {
        step: InfoRead,
        transfer_owed: bool,
    },
    SetNotifyDeviceState {
        index: usize,
        transfer_owed: bool,
    },
    Idle,
    SendingNonce(Transfer),
    SendingRecordRequest(Transfer),
    ReceivingRecords(Transfer),
    Closed,
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Self::Connecting => SessionState::Connecting,
            Self::ServiceDiscovery => SessionState::ServiceDiscovery,
            Self::ReadSerialNumber => SessionState::ReadSerialNumber,
            Self::SetNotifyAuthentication => SessionState::SetNotifyAuthentication,
            Self::Authentication1 { .. } => SessionState::Authentication1,
            Self::Authentication2 { .. } => SessionState::Authentication2,
            Self::Reading { step, .. } => step.state(),
            Self::SetNotifyDeviceState { .. } => SessionState::SetNotifyDeviceState,
            Self::Idle => SessionState::Idle,
            Self::SendingNonce(_) => SessionState::SendingNonce,
            Self::SendingRecordRequest(_) => SessionState::SendingRecordRequest,
            Self::ReceivingRecords(_) => SessionState::ReceivingRecords,
            Self::Closed => SessionState::Closed,
        }
    }
}

/// Authenticated synchronisation session with one dispenser
pub struct DispenserSession {
    connection_info: ConnectionInfo,
    device_info: DeviceInfo,
    key: AuthKey,
    link: Box<dyn GattLink>,
    context: SessionContext,
    phase: Phase,
    authentication_started: Option<Instant>,
    close_reason: Option<Error>,
}

impl DispenserSession {
    /// Create a session in `CONNECTING`; nothing is submitted until `connect`
    ///
    /// # Errors
    ///
    /// Returns error if the authentication key in `connection_info` cannot
    /// be parsed.
    pub fn new(
        connection_info: ConnectionInfo,
        link: Box<dyn GattLink>,
        context: SessionContext,
    ) -> Result<Self> {
        let key = AuthKey::parse(&connection_info.authentication_key)?;

        Ok(Self {
            device_info: DeviceInfo::new(connection_info.last_record_id),
            connection_info,
            key,
            link,
            context,
            phase: Phase::Connecting,
            authentication_started: None,
            close_reason: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.phase.state()
    }

    pub fn device(&self) -> &DeviceId {
        self.link.device()
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason.is_some()
    }

    /// Why the session closed, `None` while it is open
    pub fn close_reason(&self) -> Option<&Error> {
        self.close_reason.as_ref()
    }

    /// Instant at which an unfinished handshake is abandoned
    pub fn authentication_deadline(&self) -> Option<Instant> {
        if !self.state().is_authenticating() {
            return None;
        }
        self.authentication_started
            .map(|started| started + self.context.config.authentication_timeout)
    }

    /// Submit the link connection
    pub fn connect(&mut self) {
        if !matches!(self.phase, Phase::Connecting) || self.is_closed() {
            return;
        }

        info!(
            "Connecting to {} ({})",
            self.connection_info.serial_number,
            self.link.device()
        );

        if let Err(e) = self.link.connect() {
            self.fail(e.into());
        }
    }

    /// Close on request
    pub fn close(&mut self) {
        self.shutdown(Error::Closed);
    }

    /// Close with `AuthenticationTimeout` if the handshake deadline has passed
    pub fn expire_authentication(&mut self, now: Instant) {
        match self.authentication_deadline() {
            Some(deadline) if now >= deadline => {
                let seconds = self.context.config.authentication_timeout.as_secs();
                self.fail(Error::AuthenticationTimeout { seconds });
            }
            _ => {}
        }
    }

    /// Feed one link event into the session
    ///
    /// Events that are not expected in the current state are ignored. Any
    /// protocol, integrity or link failure closes the session.
    pub fn handle(&mut self, event: SessionEvent) {
        if self.is_closed() {
            trace!(?event, "Session closed, dropping event");
            return;
        }

        if let Err(e) = self.dispatch(event) {
            self.fail(e);
        }
    }

    /// Drive the session from its event queue until it closes
    ///
    /// The session closes when `close` fires or its sender is dropped, when
    /// the handshake deadline passes, or when the link's event queue ends.
    pub async fn run(mut self, mut events: EventReceiver, mut close: oneshot::Receiver<()>) -> Self {
        self.connect();

        while !self.is_closed() {
            let deadline = self.authentication_deadline();

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => self.fail(Error::UnexpectedDisconnect),
                },
                _ = &mut close => self.close(),
                _ = sleep_until(deadline) => self.expire_authentication(Instant::now()),
            }
        }

        self
    }

    fn dispatch(&mut self, event: SessionEvent) -> Result<()> {
        trace!(state = %self.state(), ?event, "Session event");

        if let Some(GattStatus::Failure(status)) = event.status() {
            return Err(Error::OperationFailed {
                state: self.state(),
                status,
            });
        }

        match event {
            SessionEvent::Connected => self.on_connected(),
            SessionEvent::ServicesDiscovered { .. } => self.on_services_discovered(),
            SessionEvent::CharacteristicRead {
                characteristic,
                value,
                ..
            } => self.on_read(characteristic, &value),
            SessionEvent::CharacteristicWritten { characteristic, .. } => {
                self.on_written(characteristic)
            }
            SessionEvent::DescriptorWritten { characteristic, .. } => {
                self.on_subscribed(characteristic)
            }
            SessionEvent::CharacteristicChanged {
                characteristic,
                value,
            } => self.on_changed(characteristic, &value),
            SessionEvent::Disconnected => Err(Error::UnexpectedDisconnect),
        }
    }

    fn on_connected(&mut self) -> Result<()> {
        if !matches!(self.phase, Phase::Connecting) {
            debug!(state = %self.state(), "Ignoring duplicate connection event");
            return Ok(());
        }

        self.link.discover_services()?;
        self.set_phase(Phase::ServiceDiscovery);
        Ok(())
    }

    fn on_services_discovered(&mut self) -> Result<()> {
        if !matches!(self.phase, Phase::ServiceDiscovery) {
            debug!(state = %self.state(), "Ignoring service discovery result");
            return Ok(());
        }

        self.link.read(gatt::SERIAL_NUMBER)?;
        self.set_phase(Phase::ReadSerialNumber);
        Ok(())
    }

    fn on_read(&mut self, characteristic: Uuid, value: &[u8]) -> Result<()> {
        match mem::replace(&mut self.phase, Phase::Closed) {
            Phase::ReadSerialNumber if characteristic == gatt::SERIAL_NUMBER => {
                self.verify_serial_number(value)?;

                self.link.enable_notifications(gatt::AUTHENTICATION)?;
                self.authentication_started = Some(Instant::now());
                self.set_phase(Phase::SetNotifyAuthentication);
                Ok(())
            }
            Phase::Reading {
                step,
                transfer_owed,
            } if characteristic == step.characteristic() => {
                self.on_info_read(step, transfer_owed, value)
            }
            phase => {
                self.ignore(phase, characteristic, "read");
                Ok(())
            }
        }
    }

    fn verify_serial_number(&self, value: &[u8]) -> Result<()> {
        let actual = decode_text(value);

        if actual != self.connection_info.serial_number {
            return Err(Error::SerialNumberMismatch {
                expected: self.connection_info.serial_number.clone(),
                actual,
            });
        }

        debug!("Serial number {} verified", actual);
        Ok(())
    }

    fn on_info_read(&mut self, step: InfoRead, transfer_owed: bool, value: &[u8]) -> Result<()> {
        let transfer_owed = match step {
            InfoRead::ManufacturerName => {
                self.device_info.manufacturer_name = decode_text(value);
                transfer_owed
            }
            InfoRead::HardwareRevision => {
                self.device_info.hardware_revision = decode_text(value);
                transfer_owed
            }
            InfoRead::SoftwareRevision => {
                self.device_info.software_revision = decode_text(value);
                transfer_owed
            }
            InfoRead::DeviceState => {
                let state = DeviceState::decode(value)?;
                self.device_info.doses_taken = state.doses_taken;
                transfer_owed || self.device_info.pending_records() > 0
            }
        };

        match step.next() {
            Some(next) => {
                self.link.read(next.characteristic())?;
                self.set_phase(Phase::Reading {
                    step: next,
                    transfer_owed,
                });
            }
            None => {
                self.link.enable_notifications(SYNC_NOTIFICATIONS[0])?;
                self.set_phase(Phase::SetNotifyDeviceState {
                    index: 0,
                    transfer_owed,
                });
            }
        }

        Ok(())
    }

    fn on_subscribed(&mut self, characteristic: Uuid) -> Result<()> {
        match mem::replace(&mut self.phase, Phase::Closed) {
            Phase::SetNotifyAuthentication if characteristic == gatt::AUTHENTICATION => {
                let handshake = self.begin_handshake()?;
                self.set_phase(Phase::Authentication1 {
                    handshake,
                    challenge_written: false,
                    peer: None,
                });
                Ok(())
            }
            Phase::SetNotifyDeviceState {
                index,
                transfer_owed,
            } if characteristic == SYNC_NOTIFICATIONS[index] => {
                let index = index + 1;

                if let Some(&next) = SYNC_NOTIFICATIONS.get(index) {
                    self.link.enable_notifications(next)?;
                    self.phase = Phase::SetNotifyDeviceState {
                        index,
                        transfer_owed,
                    };
                    return Ok(());
                }

                self.enter_idle(transfer_owed)
            }
            phase => {
                self.ignore(phase, characteristic, "subscription");
                Ok(())
            }
        }
    }

    fn on_written(&mut self, characteristic: Uuid) -> Result<()> {
        match mem::replace(&mut self.phase, Phase::Closed) {
            Phase::Authentication1 {
                handshake,
                peer: Some(peer),
                ..
            } if characteristic == gatt::AUTHENTICATION => self.send_response(handshake, peer),
            Phase::Authentication1 {
                handshake,
                peer: None,
                ..
            } if characteristic == gatt::AUTHENTICATION => {
                self.phase = Phase::Authentication1 {
                    handshake,
                    challenge_written: true,
                    peer: None,
                };
                Ok(())
            }
            Phase::SendingNonce(transfer) if characteristic == gatt::AUTHENTICATION => {
                let request = RecordRequest::after(self.connection_info.last_record_id);
                debug!("Requesting records from id {}", request.min_record_id);

                self.link
                    .write(gatt::RECORD_ACCESS_CONTROL_POINT, &request.encode())?;
                self.set_phase(Phase::SendingRecordRequest(transfer));
                Ok(())
            }
            Phase::SendingRecordRequest(transfer)
                if characteristic == gatt::RECORD_ACCESS_CONTROL_POINT =>
            {
                self.set_phase(Phase::ReceivingRecords(transfer));
                Ok(())
            }
            phase => {
                self.ignore(phase, characteristic, "write");
                Ok(())
            }
        }
    }

    fn on_changed(&mut self, characteristic: Uuid, value: &[u8]) -> Result<()> {
        match characteristic {
            c if c == gatt::AUTHENTICATION => self.on_authentication_value(value),
            c if c == gatt::DEVICE_STATE => self.on_device_state(value),
            c if c == gatt::INHALE_EVENT => self.on_inhale_event(value),
            c if c == gatt::RECORD_ACCESS_CONTROL_POINT => self.on_racp_response(value),
            _ => {
                debug!(%characteristic, "Ignoring notification");
                Ok(())
            }
        }
    }

    fn on_authentication_value(&mut self, value: &[u8]) -> Result<()> {
        match mem::replace(&mut self.phase, Phase::Closed) {
            // The subscription acknowledgement can be lost; a peer challenge
            // proves notifications are enabled.
            Phase::SetNotifyAuthentication => {
                let peer = auth::parse_challenge(value)?;
                debug!("Peer challenge before subscription ack");

                let handshake = self.begin_handshake()?;
                self.set_phase(Phase::Authentication1 {
                    handshake,
                    challenge_written: false,
                    peer: Some(peer),
                });
                Ok(())
            }
            Phase::Authentication1 {
                handshake,
                challenge_written,
                peer: None,
            } => {
                let peer = auth::parse_challenge(value)?;

                if challenge_written {
                    return self.send_response(handshake, peer);
                }

                self.phase = Phase::Authentication1 {
                    handshake,
                    challenge_written,
                    peer: Some(peer),
                };
                Ok(())
            }
            Phase::Authentication2 { handshake, peer } => {
                let response = auth::parse_response(value)?;

                if !handshake.verify(&peer, &response) {
                    return Err(Error::AuthenticationFailed);
                }

                self.on_authenticated()
            }
            phase => {
                self.ignore(phase, gatt::AUTHENTICATION, "notification");
                Ok(())
            }
        }
    }

    fn on_authenticated(&mut self) -> Result<()> {
        info!("Authenticated {}", self.connection_info.serial_number);

        self.authentication_started = None;
        self.emit(DeviceEvent::Connected(self.connection_info.clone()));

        let step = if self.connection_info.is_first_sync() {
            InfoRead::ManufacturerName
        } else {
            InfoRead::DeviceState
        };

        self.link.read(step.characteristic())?;
        self.set_phase(Phase::Reading {
            step,
            transfer_owed: false,
        });
        Ok(())
    }

    fn on_device_state(&mut self, value: &[u8]) -> Result<()> {
        if !self.state().is_authenticated() {
            debug!(state = %self.state(), "Ignoring device state before authentication");
            return Ok(());
        }

        let state = DeviceState::decode(value)?;
        debug!("Device reports {} doses", state.doses_taken);
        self.device_info.doses_taken = state.doses_taken;

        if matches!(self.phase, Phase::Idle) {
            return self.start_transfer();
        }

        match &mut self.phase {
            Phase::Reading { transfer_owed, .. }
            | Phase::SetNotifyDeviceState { transfer_owed, .. } => {
                *transfer_owed = true;
                Ok(())
            }
            Phase::SendingNonce(transfer)
            | Phase::SendingRecordRequest(transfer)
            | Phase::ReceivingRecords(transfer) => {
                transfer.rerun = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_inhale_event(&mut self, value: &[u8]) -> Result<()> {
        let max = self.context.config.max_records_per_transfer;
        let clock = Arc::clone(&self.context.clock);

        let (Phase::SendingRecordRequest(transfer) | Phase::ReceivingRecords(transfer)) =
            &mut self.phase
        else {
            debug!(state = %self.state(), "Ignoring inhale event outside a transfer");
            return Ok(());
        };

        let plain = transfer.stream.apply(value);
        let record = InhaleEventRecord::decode(&plain)?;

        if transfer.records.len() >= max {
            return Err(Error::TooManyRecords { max });
        }

        trace!(uid = record.event_uid, "Inhale event");
        transfer.records.push(event_info(&record, clock.as_ref()));
        Ok(())
    }

    fn on_racp_response(&mut self, value: &[u8]) -> Result<()> {
        match mem::replace(&mut self.phase, Phase::Closed) {
            Phase::SendingRecordRequest(transfer) | Phase::ReceivingRecords(transfer) => {
                let response = RacpResponse::decode(value)?;

                if !response.is_success() {
                    return Err(Error::TransferFailed {
                        status: response.status,
                    });
                }

                self.complete_transfer(transfer)
            }
            phase => {
                self.ignore(phase, gatt::RECORD_ACCESS_CONTROL_POINT, "notification");
                Ok(())
            }
        }
    }

    fn begin_handshake(&mut self) -> Result<Handshake> {
        let handshake = Handshake::start(&self.key);
        self.link
            .write(gatt::AUTHENTICATION, handshake.local_challenge())?;
        Ok(handshake)
    }

    fn send_response(&mut self, handshake: Handshake, peer: Challenge) -> Result<()> {
        let response = handshake.response_to(&peer);
        self.link.write(gatt::AUTHENTICATION, &response)?;
        self.set_phase(Phase::Authentication2 { handshake, peer });
        Ok(())
    }

    fn enter_idle(&mut self, transfer_owed: bool) -> Result<()> {
        self.set_phase(Phase::Idle);

        if transfer_owed {
            return self.start_transfer();
        }

        self.emit_update(Vec::new());
        Ok(())
    }

    fn start_transfer(&mut self) -> Result<()> {
        let nonce = auth::generate_nonce();
        self.link.write(gatt::AUTHENTICATION, &nonce)?;

        self.set_phase(Phase::SendingNonce(Transfer {
            stream: RecordKeystream::new(&self.key, nonce),
            records: Vec::new(),
            rerun: false,
        }));
        Ok(())
    }

    fn complete_transfer(&mut self, transfer: Transfer) -> Result<()> {
        let Transfer { records, rerun, .. } = transfer;

        if let Some(last) = records.iter().map(|r| r.event_uid).max() {
            if last > self.connection_info.last_record_id {
                self.connection_info.last_record_id = last;
                self.device_info.last_record_id = last;
            }
        }

        info!(
            "Received {} records from {} (last id {})",
            records.len(),
            self.connection_info.serial_number,
            self.connection_info.last_record_id
        );

        self.set_phase(Phase::Idle);
        self.emit_update(records);

        if rerun {
            return self.start_transfer();
        }
        Ok(())
    }

    fn emit_update(&self, inhale_events: Vec<InhaleEventInfo>) {
        self.emit(DeviceEvent::Updated {
            connection_info: self.connection_info.clone(),
            device_info: self.device_info.clone(),
            inhale_events,
        });
    }

    fn emit(&self, event: DeviceEvent) {
        if self.context.events.send(event).is_err() {
            debug!("Device event receiver dropped");
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!(
            serial = %self.connection_info.serial_number,
            state = %phase.state(),
            "Session state"
        );
        self.phase = phase;
    }

    fn ignore(&mut self, phase: Phase, characteristic: Uuid, what: &str) {
        debug!(state = %phase.state(), %characteristic, "Ignoring unexpected {}", what);
        self.phase = phase;
    }

    fn fail(&mut self, error: Error) {
        warn!(
            serial = %self.connection_info.serial_number,
            state = %self.state(),
            "Session failed: {}",
            error
        );
        self.shutdown(error);
    }

    fn shutdown(&mut self, reason: Error) {
        if self.is_closed() {
            return;
        }

        if !matches!(reason, Error::UnexpectedDisconnect) {
            if let Err(e) = self.link.disconnect() {
                debug!("Disconnect submission failed: {}", e);
            }
        }

        info!(
            "Disconnected from {}: {}",
            self.connection_info.serial_number, reason
        );

        self.phase = Phase::Closed;
        self.authentication_started = None;
        self.close_reason = Some(reason);
        self.emit(DeviceEvent::Disconnected(self.connection_info.clone()));
    }
}

impl std::fmt::Debug for DispenserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispenserSession")
            .field("device", self.link.device())
            .field("connection_info", &self.connection_info)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn decode_text(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

fn event_info(record: &InhaleEventRecord, clock: &dyn TimeReference) -> InhaleEventInfo {
    InhaleEventInfo {
        event_uid: record.event_uid,
        event_time: clock.resolve_event_time(record.time_offset),
        inhale_start_offset: record.start_offset_ms(),
        inhale_duration: record.duration,
        inhale_peak: record.peak,
        inhale_peak_offset: record.peak_offset,
        inhale_volume: record.volume,
        status: record.status,
    }
}
