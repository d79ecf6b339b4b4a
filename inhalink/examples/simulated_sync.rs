//! Full synchronisation against an in-process dispenser
//!
//! Run with `RUST_LOG=inhalink=debug` to follow the session states.

use std::sync::Arc;

use inhalink::{
    Advertisement, AdvertisementFilter, ConnectionInfo, DeviceEvent, DeviceId, GattConnector,
    GattLink, ProtocolType, ScanMode, ScanRadio, Scanner, ScannerConfig, SessionContext,
    SessionEvent, SessionManager, SessionRegistry, device_event_channel,
};
use inhalink_core::constants::{advertising, gatt};
use inhalink_core::{
    AuthKey, BlockCipher, DeviceState, InhaleEventRecord, RacpResponse, RecordKeystream,
};
use inhalink_transport::{EventSender, GattStatus};
use tracing_subscriber::EnvFilter;

const SERIAL: &str = "MDI0042";
const KEY: &str = "000102030405060708090a0b0c0d0e0f";

/// Dispenser answering every submission on the spot
struct SimulatedDispenser {
    device: DeviceId,
    events: EventSender,
    key: AuthKey,
    challenge: [u8; 8],
    local: Option<Vec<u8>>,
    authenticated: bool,
    stream: Option<RecordKeystream>,
    records: Vec<InhaleEventRecord>,
}

impl SimulatedDispenser {
    fn new(device: DeviceId, events: EventSender) -> anyhow::Result<Self> {
        let records = (1..=3)
            .map(|uid| InhaleEventRecord {
                event_uid: uid,
                time_offset: 780_000_000 + i32::from(uid) * 43_200,
                start_offset: 5,
                duration: 1_800,
                peak: 320,
                peak_offset: 600,
                volume: 2_100,
                status: 0,
            })
            .collect();

        Ok(Self {
            device,
            events,
            key: AuthKey::parse(KEY)?,
            challenge: inhalink_core::auth::generate_challenge(),
            local: None,
            authenticated: false,
            stream: None,
            records,
        })
    }

    fn send(&self, event: SessionEvent) -> inhalink_transport::Result<()> {
        self.events
            .send(event)
            .map_err(|_| inhalink_transport::Error::ConnectionClosed)
    }

    fn pair(&self, first: &[u8], second: &[u8]) -> [u8; 16] {
        let mut block = [0u8; 16];
        block[..8].copy_from_slice(first);
        block[8..].copy_from_slice(second);
        BlockCipher::new(&self.key).encrypt_block(&block)
    }

    fn on_authentication_write(&mut self, value: &[u8]) -> inhalink_transport::Result<()> {
        self.send(SessionEvent::written(gatt::AUTHENTICATION))?;

        match (self.local.clone(), self.authenticated) {
            (None, _) => {
                self.local = Some(value.to_vec());
                self.send(SessionEvent::changed(gatt::AUTHENTICATION, self.challenge.to_vec()))
            }
            (Some(local), false) => {
                if value != self.pair(&local, &self.challenge).as_slice() {
                    return self.send(SessionEvent::Disconnected);
                }
                self.authenticated = true;
                let proof = self.pair(&self.challenge, &local);
                self.send(SessionEvent::changed(gatt::AUTHENTICATION, proof.to_vec()))
            }
            (Some(_), true) => {
                let nonce: [u8; 16] = value
                    .try_into()
                    .map_err(|_| inhalink_transport::Error::Rejected("bad nonce".into()))?;
                self.stream = Some(RecordKeystream::new(&self.key, nonce));
                Ok(())
            }
        }
    }

    fn on_record_request(&mut self, value: &[u8]) -> inhalink_transport::Result<()> {
        self.send(SessionEvent::written(gatt::RECORD_ACCESS_CONTROL_POINT))?;

        let min_record_id = u16::from_le_bytes([value[3], value[4]]);
        let Some(stream) = self.stream.as_mut() else {
            return Err(inhalink_transport::Error::Rejected("no nonce".into()));
        };

        let encrypted: Vec<Vec<u8>> = self
            .records
            .iter()
            .filter(|r| r.event_uid >= min_record_id)
            .map(|r| stream.apply(&r.encode()))
            .collect();

        for record in encrypted {
            self.send(SessionEvent::changed(gatt::INHALE_EVENT, record))?;
        }

        let response = RacpResponse {
            request_opcode: 1,
            status: 1,
        };
        self.send(SessionEvent::changed(
            gatt::RECORD_ACCESS_CONTROL_POINT,
            response.encode(),
        ))
    }
}

impl GattLink for SimulatedDispenser {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn connect(&mut self) -> inhalink_transport::Result<()> {
        self.send(SessionEvent::Connected)
    }

    fn discover_services(&mut self) -> inhalink_transport::Result<()> {
        self.send(SessionEvent::ServicesDiscovered {
            status: GattStatus::Success,
        })
    }

    fn read(&mut self, characteristic: uuid::Uuid) -> inhalink_transport::Result<()> {
        let value = match characteristic {
            c if c == gatt::SERIAL_NUMBER => SERIAL.as_bytes().to_vec(),
            c if c == gatt::MANUFACTURER_NAME => b"Simulated Respiratory".to_vec(),
            c if c == gatt::HARDWARE_REVISION => b"A1".to_vec(),
            c if c == gatt::SOFTWARE_REVISION => b"0.9.0".to_vec(),
            c if c == gatt::DEVICE_STATE => DeviceState {
                doses_taken: self.records.len() as u16,
            }
            .encode()
            .to_vec(),
            _ => return Err(inhalink_transport::Error::Rejected("unknown characteristic".into())),
        };
        self.send(SessionEvent::read(characteristic, value))
    }

    fn write(&mut self, characteristic: uuid::Uuid, value: &[u8]) -> inhalink_transport::Result<()> {
        match characteristic {
            c if c == gatt::AUTHENTICATION => self.on_authentication_write(value),
            c if c == gatt::RECORD_ACCESS_CONTROL_POINT => self.on_record_request(value),
            _ => self.send(SessionEvent::written(characteristic)),
        }
    }

    fn enable_notifications(&mut self, characteristic: uuid::Uuid) -> inhalink_transport::Result<()> {
        self.send(SessionEvent::subscribed(
            characteristic,
            gatt::CLIENT_CHARACTERISTIC_CONFIGURATION,
        ))
    }

    fn disconnect(&mut self) -> inhalink_transport::Result<()> {
        self.send(SessionEvent::Disconnected)
    }
}

struct SimulatedConnector;

impl GattConnector for SimulatedConnector {
    fn open(
        &self,
        device: &DeviceId,
        events: EventSender,
    ) -> inhalink_transport::Result<Box<dyn GattLink>> {
        let link = SimulatedDispenser::new(device.clone(), events)
            .map_err(|e| inhalink_transport::Error::Rejected(e.to_string()))?;
        Ok(Box::new(link))
    }
}

struct LoggingRadio;

impl ScanRadio for LoggingRadio {
    fn start_scan(
        &mut self,
        filters: &[AdvertisementFilter],
        mode: ScanMode,
    ) -> inhalink_transport::Result<()> {
        println!("Radio scanning with {} filters ({:?})", filters.len(), mode);
        Ok(())
    }

    fn stop_scan(&mut self) -> inhalink_transport::Result<()> {
        println!("Radio idle");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (events, mut updates) = device_event_channel();
    let scanner = Scanner::new(Box::new(LoggingRadio), ScannerConfig::default(), || true);

    let manager = SessionManager::new(
        SessionRegistry::new(),
        scanner,
        Arc::new(SimulatedConnector),
        SessionContext::new(events),
        tokio::runtime::Handle::current(),
    );

    manager.set_connection_info(vec![ConnectionInfo::new(SERIAL, KEY, ProtocolType::Dispenser)])?;
    manager.set_in_foreground(true)?;
    manager.start()?;

    let advertisement = Advertisement::new("C0:FF:EE:00:00:42")
        .with_name("MDI")
        .with_service(gatt::DISPENSER_SERVICE)
        .with_manufacturer_data(advertising::MANUFACTURER_ID, SERIAL.as_bytes().to_vec());
    manager.on_advertisement(&advertisement);

    while let Some(event) = updates.recv().await {
        match event {
            DeviceEvent::Connected(info) => println!("Connected to {}", info),
            DeviceEvent::Updated {
                connection_info,
                device_info,
                inhale_events,
            } => {
                println!("{}", device_info);
                for inhalation in &inhale_events {
                    println!("  {}", inhalation);
                }
                println!("Cursor now at {}", connection_info.last_record_id);
                manager.stop()?;
            }
            DeviceEvent::Disconnected(info) => {
                println!("Disconnected from {}", info);
                break;
            }
        }
    }

    Ok(())
}
