mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use inhalink::{
    ConnectionInfo, DeviceEpochClock, DeviceEvent, DeviceEventReceiver, DeviceEventSender,
    DispenserSession, Error, ProtocolType, RecordingLink, SessionConfig, SessionContext,
    SessionEvent, SessionState, device_event_channel, event_channel,
};
use inhalink_core::constants::gatt;
use inhalink_transport::{GattOp, LinkRecorder, OpKind};

use common::*;

struct Harness {
    session: DispenserSession,
    recorder: LinkRecorder,
    events: DeviceEventReceiver,
    device: SimulatedDispenser,
}

impl Harness {
    fn new(last_record_id: u16, device: SimulatedDispenser) -> Self {
        Self::with_config(last_record_id, device, SessionConfig::default())
    }

    fn with_config(last_record_id: u16, device: SimulatedDispenser, config: SessionConfig) -> Self {
        Self::with_context(last_record_id, device, |tx| {
            SessionContext::new(tx).with_config(config)
        })
    }

    fn with_context(
        last_record_id: u16,
        device: SimulatedDispenser,
        context: impl FnOnce(DeviceEventSender) -> SessionContext,
    ) -> Self {
        let info = ConnectionInfo::new(SERIAL, KEY, ProtocolType::Dispenser)
            .with_last_record_id(last_record_id);
        let (link, recorder) = RecordingLink::new("AA:BB:CC:DD:EE:FF");
        let (tx, events) = device_event_channel();
        let context = context(tx);

        Self {
            session: DispenserSession::new(info, Box::new(link), context).unwrap(),
            recorder,
            events,
            device,
        }
    }

    fn feed(&mut self, event: SessionEvent) {
        self.session.handle(event);
    }

    fn next_event(&mut self) -> Option<DeviceEvent> {
        self.events.try_recv().ok()
    }

    /// Up to the authentication subscription
    fn reach_authentication(&mut self) {
        self.session.connect();
        self.feed(SessionEvent::Connected);
        self.feed(discovered());
        let serial = self.device.serial.clone();
        self.feed(SessionEvent::read(gatt::SERIAL_NUMBER, serial.into_bytes()));
        assert_eq!(self.session.state(), SessionState::SetNotifyAuthentication);
    }

    /// Full handshake with the subscription acknowledged
    fn authenticate(&mut self) {
        self.reach_authentication();
        self.feed(subscribed(gatt::AUTHENTICATION));

        let local = writes(&self.recorder, gatt::AUTHENTICATION)[0].clone();
        self.feed(SessionEvent::changed(gatt::AUTHENTICATION, self.device.challenge.to_vec()));
        self.feed(SessionEvent::written(gatt::AUTHENTICATION));
        assert_eq!(self.session.state(), SessionState::Authentication2);

        let proof = self.device.proof(&local);
        self.feed(SessionEvent::changed(gatt::AUTHENTICATION, proof.to_vec()));
        assert!(matches!(self.next_event(), Some(DeviceEvent::Connected(_))));
    }

    /// Answer reads until the session waits in `SET_NOTIFY_DEVICE_STATE`
    fn answer_reads(&mut self) {
        loop {
            match self.recorder.last_op() {
                Some(GattOp::Read(c)) if c == gatt::MANUFACTURER_NAME => {
                    self.feed(SessionEvent::read(c, &b"Acme Respiratory"[..]))
                }
                Some(GattOp::Read(c)) if c == gatt::HARDWARE_REVISION => {
                    self.feed(SessionEvent::read(c, &b"B2"[..]))
                }
                Some(GattOp::Read(c)) if c == gatt::SOFTWARE_REVISION => {
                    self.feed(SessionEvent::read(c, &b"3.1.4"[..]))
                }
                Some(GattOp::Read(c)) if c == gatt::DEVICE_STATE => {
                    let state = self.device.device_state();
                    self.feed(SessionEvent::read(c, state))
                }
                _ => break,
            }
        }
    }

    fn ack_subscriptions(&mut self) {
        for characteristic in [
            gatt::DEVICE_STATE,
            gatt::INHALE_EVENT,
            gatt::RECORD_ACCESS_CONTROL_POINT,
        ] {
            assert_eq!(
                self.recorder.last_op(),
                Some(GattOp::EnableNotifications(characteristic))
            );
            self.feed(subscribed(characteristic));
        }
    }

    /// Nonce and request acknowledged; returns the nonce and request written
    fn start_transfer(&mut self) -> (Vec<u8>, Vec<u8>) {
        assert_eq!(self.session.state(), SessionState::SendingNonce);
        let (_, nonce) = last_write(&self.recorder).unwrap();
        self.feed(SessionEvent::written(gatt::AUTHENTICATION));

        assert_eq!(self.session.state(), SessionState::SendingRecordRequest);
        let (characteristic, request) = last_write(&self.recorder).unwrap();
        assert_eq!(characteristic, gatt::RECORD_ACCESS_CONTROL_POINT);
        self.feed(SessionEvent::written(gatt::RECORD_ACCESS_CONTROL_POINT));

        assert_eq!(self.session.state(), SessionState::ReceivingRecords);
        (nonce, request)
    }

    fn send_records(&mut self, nonce: &[u8], min_record_id: u16) {
        for record in self.device.encrypted_records(nonce, min_record_id) {
            self.feed(SessionEvent::changed(gatt::INHALE_EVENT, record));
        }
    }
}

#[test]
fn test_first_sync_transfers_all_records() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY).with_records(4));

    h.authenticate();
    assert_eq!(h.session.state(), SessionState::ReadingManufacturerName);

    h.answer_reads();
    h.ack_subscriptions();

    let (nonce, request) = h.start_transfer();
    assert_eq!(nonce.len(), 16);
    assert_eq!(request, vec![0x01, 0x03, 0x01, 0x01, 0x00]);

    h.send_records(&nonce, 1);
    h.feed(SessionEvent::changed(gatt::RECORD_ACCESS_CONTROL_POINT, racp(1)));

    assert_eq!(h.session.state(), SessionState::Idle);
    let Some(DeviceEvent::Updated {
        connection_info,
        device_info,
        inhale_events,
    }) = h.next_event()
    else {
        panic!("expected an update");
    };

    assert_eq!(connection_info.last_record_id, 4);
    assert_eq!(device_info.doses_taken, 4);
    assert_eq!(device_info.last_record_id, 4);
    assert_eq!(device_info.manufacturer_name, "Acme Respiratory");
    assert_eq!(device_info.hardware_revision, "B2");
    assert_eq!(device_info.software_revision, "3.1.4");

    let uids: Vec<u16> = inhale_events.iter().map(|e| e.event_uid).collect();
    assert_eq!(uids, vec![1, 2, 3, 4]);

    let first = &inhale_events[0];
    assert_eq!(first.inhale_start_offset, 1_200);
    assert_eq!(first.inhale_duration, 1_500);
    assert_eq!(first.inhale_volume, 2_000);
    assert_eq!(
        first.event_time,
        Utc.with_ymd_and_hms(2000, 1, 2, 0, 0, 0).unwrap()
    );

    assert!(h.next_event().is_none());
}

#[test]
fn test_subsequent_sync_skips_information_reads() {
    let mut h = Harness::new(4, SimulatedDispenser::new(KEY).with_records(4));

    h.authenticate();
    assert_eq!(h.session.state(), SessionState::ReadingDeviceState);
    assert_eq!(h.recorder.count(OpKind::Read), 2);

    h.answer_reads();
    h.ack_subscriptions();

    assert_eq!(h.session.state(), SessionState::Idle);
    let Some(DeviceEvent::Updated { inhale_events, .. }) = h.next_event() else {
        panic!("expected an empty update");
    };
    assert!(inhale_events.is_empty());
}

#[test]
fn test_device_state_change_starts_transfer_from_cursor() {
    let mut h = Harness::new(4, SimulatedDispenser::new(KEY).with_records(4));
    h.authenticate();
    h.answer_reads();
    h.ack_subscriptions();
    let _ = h.next_event();

    h.device = SimulatedDispenser::new(KEY).with_records(6);
    let state = h.device.device_state();
    h.feed(SessionEvent::changed(gatt::DEVICE_STATE, state));

    let (nonce, request) = h.start_transfer();
    assert_eq!(request, vec![0x01, 0x03, 0x01, 0x05, 0x00]);

    h.send_records(&nonce, 5);
    h.feed(SessionEvent::changed(gatt::RECORD_ACCESS_CONTROL_POINT, racp(1)));

    let Some(DeviceEvent::Updated {
        connection_info,
        inhale_events,
        ..
    }) = h.next_event()
    else {
        panic!("expected an update");
    };
    assert_eq!(inhale_events.len(), 2);
    assert_eq!(connection_info.last_record_id, 6);
}

#[test]
fn test_missing_subscription_ack_is_implied_by_peer_challenge() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY));
    h.reach_authentication();

    h.feed(SessionEvent::changed(gatt::AUTHENTICATION, h.device.challenge.to_vec()));
    assert_eq!(h.session.state(), SessionState::Authentication1);
    assert_eq!(writes(&h.recorder, gatt::AUTHENTICATION).len(), 1);

    // A late acknowledgement must not restart the handshake
    h.feed(subscribed(gatt::AUTHENTICATION));
    assert_eq!(writes(&h.recorder, gatt::AUTHENTICATION).len(), 1);

    h.feed(SessionEvent::written(gatt::AUTHENTICATION));
    assert_eq!(h.session.state(), SessionState::Authentication2);

    let written = writes(&h.recorder, gatt::AUTHENTICATION);
    assert_eq!(written.len(), 2);
    assert_eq!(written[1], h.device.expected_response(&written[0]).to_vec());

    let proof = h.device.proof(&written[0]);
    h.feed(SessionEvent::changed(gatt::AUTHENTICATION, proof.to_vec()));
    assert!(h.session.state().is_authenticated());
}

#[test]
fn test_peer_challenge_before_local_write_completes() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY));
    h.reach_authentication();
    h.feed(subscribed(gatt::AUTHENTICATION));

    h.feed(SessionEvent::changed(gatt::AUTHENTICATION, h.device.challenge.to_vec()));
    assert_eq!(h.session.state(), SessionState::Authentication1);
    assert_eq!(writes(&h.recorder, gatt::AUTHENTICATION).len(), 1);

    h.feed(SessionEvent::written(gatt::AUTHENTICATION));
    assert_eq!(h.session.state(), SessionState::Authentication2);
}

#[test]
fn test_local_write_before_peer_challenge() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY));
    h.reach_authentication();
    h.feed(subscribed(gatt::AUTHENTICATION));

    h.feed(SessionEvent::written(gatt::AUTHENTICATION));
    assert_eq!(h.session.state(), SessionState::Authentication1);

    h.feed(SessionEvent::changed(gatt::AUTHENTICATION, h.device.challenge.to_vec()));
    assert_eq!(h.session.state(), SessionState::Authentication2);
    assert_eq!(writes(&h.recorder, gatt::AUTHENTICATION).len(), 2);
}

#[test]
fn test_wrong_proof_fails_authentication() {
    let mut h = Harness::new(0, SimulatedDispenser::new(OTHER_KEY));
    h.reach_authentication();
    h.feed(subscribed(gatt::AUTHENTICATION));

    let local = writes(&h.recorder, gatt::AUTHENTICATION)[0].clone();
    h.feed(SessionEvent::changed(gatt::AUTHENTICATION, h.device.challenge.to_vec()));
    h.feed(SessionEvent::written(gatt::AUTHENTICATION));

    let proof = h.device.proof(&local);
    h.feed(SessionEvent::changed(gatt::AUTHENTICATION, proof.to_vec()));

    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(matches!(h.session.close_reason(), Some(Error::AuthenticationFailed)));
    assert_eq!(h.recorder.last_op(), Some(GattOp::Disconnect));
    assert!(matches!(h.next_event(), Some(DeviceEvent::Disconnected(_))));
    assert!(h.next_event().is_none());
}

#[test]
fn test_malformed_challenge_closes() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY));
    h.reach_authentication();
    h.feed(subscribed(gatt::AUTHENTICATION));

    h.feed(SessionEvent::changed(gatt::AUTHENTICATION, vec![1u8, 2, 3]));

    assert!(matches!(
        h.session.close_reason(),
        Some(Error::Core(inhalink_core::Error::UnexpectedLength { .. }))
    ));
}

#[test]
fn test_records_under_wrong_key_fail_crc() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY).with_records(2));
    h.authenticate();
    h.answer_reads();
    h.ack_subscriptions();
    let (nonce, _) = h.start_transfer();

    let impostor = SimulatedDispenser::new(OTHER_KEY).with_records(2);
    let records = impostor.encrypted_records(&nonce, 1);
    h.feed(SessionEvent::changed(gatt::INHALE_EVENT, records[0].clone()));

    assert_eq!(h.session.state(), SessionState::Closed);
    let reason = h.session.close_reason().unwrap();
    assert!(reason.is_integrity_failure());
    assert!(matches!(
        reason,
        Error::Core(inhalink_core::Error::ChecksumMismatch { .. })
    ));
    assert!(matches!(h.next_event(), Some(DeviceEvent::Disconnected(_))));
}

#[test]
fn test_transfer_failure_status_closes() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY).with_records(1));
    h.authenticate();
    h.answer_reads();
    h.ack_subscriptions();
    h.start_transfer();

    h.feed(SessionEvent::changed(gatt::RECORD_ACCESS_CONTROL_POINT, racp(9)));

    assert!(matches!(
        h.session.close_reason(),
        Some(Error::TransferFailed { status: 9 })
    ));
    assert!(matches!(h.next_event(), Some(DeviceEvent::Disconnected(_))));
    assert!(h.next_event().is_none());
}

#[test]
fn test_response_to_other_request_closes() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY).with_records(1));
    h.authenticate();
    h.answer_reads();
    h.ack_subscriptions();
    h.start_transfer();

    // Success status, but for DELETE_STORED_RECORDS
    h.feed(SessionEvent::changed(
        gatt::RECORD_ACCESS_CONTROL_POINT,
        vec![6u8, 0, 2, 1],
    ));

    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(matches!(
        h.session.close_reason(),
        Some(Error::Core(inhalink_core::Error::UnexpectedOpcode(
            inhalink_core::Opcode::DeleteStoredRecords
        )))
    ));
    assert_eq!(h.session.connection_info().last_record_id, 0);
    assert!(matches!(h.next_event(), Some(DeviceEvent::Disconnected(_))));
    assert!(h.next_event().is_none());
}

#[test]
fn test_record_cap() {
    let config = SessionConfig::default().with_max_records(2);
    let mut h = Harness::with_config(0, SimulatedDispenser::new(KEY).with_records(3), config);
    h.authenticate();
    h.answer_reads();
    h.ack_subscriptions();
    let (nonce, _) = h.start_transfer();

    h.send_records(&nonce, 1);

    assert!(matches!(
        h.session.close_reason(),
        Some(Error::TooManyRecords { max: 2 })
    ));
}

#[test]
fn test_rejected_submission_closes_immediately() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY));
    h.recorder.reject(OpKind::Read);

    h.session.connect();
    h.feed(SessionEvent::Connected);
    h.feed(discovered());

    assert_eq!(h.session.state(), SessionState::Closed);
    assert!(matches!(h.session.close_reason(), Some(Error::Transport(_))));
    assert!(matches!(h.next_event(), Some(DeviceEvent::Disconnected(_))));
}

#[test]
fn test_link_loss_during_transfer_reports_once() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY).with_records(2));
    h.authenticate();
    h.answer_reads();
    h.ack_subscriptions();
    h.start_transfer();

    h.feed(SessionEvent::Disconnected);
    h.feed(SessionEvent::Disconnected);

    assert!(matches!(h.next_event(), Some(DeviceEvent::Disconnected(_))));
    assert!(h.next_event().is_none());
    assert_eq!(h.recorder.count(OpKind::Disconnect), 0);
}

#[test]
fn test_state_change_during_transfer_runs_another() {
    let mut h = Harness::new(0, SimulatedDispenser::new(KEY).with_records(2));
    h.authenticate();
    h.answer_reads();
    h.ack_subscriptions();
    let (nonce, _) = h.start_transfer();

    h.send_records(&nonce, 1);
    h.device = SimulatedDispenser::new(KEY).with_records(3);
    let state = h.device.device_state();
    h.feed(SessionEvent::changed(gatt::DEVICE_STATE, state));
    h.feed(SessionEvent::changed(gatt::RECORD_ACCESS_CONTROL_POINT, racp(1)));

    assert!(matches!(h.next_event(), Some(DeviceEvent::Updated { .. })));

    let (_, request) = h.start_transfer();
    assert_eq!(request, vec![0x01, 0x03, 0x01, 0x03, 0x00]);
}

#[test]
fn test_custom_time_reference() {
    let epoch = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let mut h = Harness::with_context(0, SimulatedDispenser::new(KEY).with_records(1), |tx| {
        SessionContext::new(tx).with_clock(Arc::new(DeviceEpochClock::new(epoch)))
    });

    h.authenticate();
    h.answer_reads();
    h.ack_subscriptions();
    let (nonce, _) = h.start_transfer();
    h.send_records(&nonce, 1);
    h.feed(SessionEvent::changed(gatt::RECORD_ACCESS_CONTROL_POINT, racp(1)));

    let Some(DeviceEvent::Updated { inhale_events, .. }) = h.next_event() else {
        panic!("expected an update");
    };
    assert_eq!(
        inhale_events[0].event_time,
        Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn test_authentication_timeout() {
    let info = ConnectionInfo::new(SERIAL, KEY, ProtocolType::Dispenser);
    let (link, recorder) = RecordingLink::new("AA:BB");
    let (tx, mut events) = device_event_channel();
    let config = SessionConfig::default().with_authentication_timeout(Duration::from_secs(5));
    let session =
        DispenserSession::new(info, Box::new(link), SessionContext::new(tx).with_config(config))
            .unwrap();

    let (link_tx, link_rx) = event_channel();
    let (_close, close_rx) = tokio::sync::oneshot::channel();
    let started = tokio::time::Instant::now();
    let task = tokio::spawn(session.run(link_rx, close_rx));

    link_tx.send(SessionEvent::Connected).unwrap();
    link_tx.send(discovered()).unwrap();
    link_tx
        .send(SessionEvent::read(gatt::SERIAL_NUMBER, &b"MDI0042"[..]))
        .unwrap();

    // The device never answers the subscription
    let session = task.await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(matches!(
        session.close_reason(),
        Some(Error::AuthenticationTimeout { seconds: 5 })
    ));
    assert_eq!(recorder.last_op(), Some(GattOp::Disconnect));
    assert!(matches!(events.recv().await, Some(DeviceEvent::Disconnected(_))));
}

#[tokio::test]
async fn test_close_signal_ends_session() {
    let info = ConnectionInfo::new(SERIAL, KEY, ProtocolType::Dispenser);
    let (link, recorder) = RecordingLink::new("AA:BB");
    let (tx, _events) = device_event_channel();
    let session = DispenserSession::new(info, Box::new(link), SessionContext::new(tx)).unwrap();

    let (_link_tx, link_rx) = event_channel();
    let (close, close_rx) = tokio::sync::oneshot::channel();
    let task = tokio::spawn(session.run(link_rx, close_rx));

    close.send(()).unwrap();
    let session = task.await.unwrap();

    assert!(matches!(session.close_reason(), Some(Error::Closed)));
    assert_eq!(recorder.ops(), vec![GattOp::Connect, GattOp::Disconnect]);
}
