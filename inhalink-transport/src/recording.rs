//! In-memory link that records what a session submits
//!
//! Nothing is sent anywhere: the peer is whoever holds the event sender
//! (a test, a simulator). Submissions can be made to fail to exercise the
//! synchronous failure paths.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use inhalink_types::DeviceId;
use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

use crate::{Error, EventSender, GattConnector, GattLink, Result};

/// Submitted operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattOp {
    Connect,
    DiscoverServices,
    Read(Uuid),
    Write(Uuid, Bytes),
    EnableNotifications(Uuid),
    Disconnect,
}

impl GattOp {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Connect => OpKind::Connect,
            Self::DiscoverServices => OpKind::DiscoverServices,
            Self::Read(_) => OpKind::Read,
            Self::Write(..) => OpKind::Write,
            Self::EnableNotifications(_) => OpKind::EnableNotifications,
            Self::Disconnect => OpKind::Disconnect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Connect,
    DiscoverServices,
    Read,
    Write,
    EnableNotifications,
    Disconnect,
}

#[derive(Debug, Default)]
struct RecorderInner {
    ops: Vec<GattOp>,
    rejected: Vec<OpKind>,
}

/// Shared view of a recording link's history
#[derive(Debug, Clone, Default)]
pub struct LinkRecorder {
    inner: Arc<Mutex<RecorderInner>>,
}

impl LinkRecorder {
    /// Every accepted submission, oldest first
    pub fn ops(&self) -> Vec<GattOp> {
        self.inner.lock().ops.clone()
    }

    pub fn last_op(&self) -> Option<GattOp> {
        self.inner.lock().ops.last().cloned()
    }

    /// Values written to one characteristic, oldest first
    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Bytes> {
        self.inner
            .lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                GattOp::Write(uuid, value) if *uuid == characteristic => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, kind: OpKind) -> usize {
        self.inner.lock().ops.iter().filter(|op| op.kind() == kind).count()
    }

    /// Refuse every later submission of this kind
    pub fn reject(&self, kind: OpKind) {
        self.inner.lock().rejected.push(kind);
    }

    fn submit(&self, op: GattOp) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.rejected.contains(&op.kind()) {
            return Err(Error::Rejected(format!("{:?} refused", op.kind())));
        }

        trace!("Recorded {:?}", op);
        inner.ops.push(op);
        Ok(())
    }
}

/// Link that records submissions instead of performing them
#[derive(Debug)]
pub struct RecordingLink {
    device: DeviceId,
    recorder: LinkRecorder,
}

impl RecordingLink {
    pub fn new(device: impl Into<DeviceId>) -> (Self, LinkRecorder) {
        let recorder = LinkRecorder::default();
        let link = Self {
            device: device.into(),
            recorder: recorder.clone(),
        };
        (link, recorder)
    }
}

impl GattLink for RecordingLink {
    fn device(&self) -> &DeviceId {
        &self.device
    }

    fn connect(&mut self) -> Result<()> {
        self.recorder.submit(GattOp::Connect)
    }

    fn discover_services(&mut self) -> Result<()> {
        self.recorder.submit(GattOp::DiscoverServices)
    }

    fn read(&mut self, characteristic: Uuid) -> Result<()> {
        self.recorder.submit(GattOp::Read(characteristic))
    }

    fn write(&mut self, characteristic: Uuid, value: &[u8]) -> Result<()> {
        self.recorder
            .submit(GattOp::Write(characteristic, Bytes::copy_from_slice(value)))
    }

    fn enable_notifications(&mut self, characteristic: Uuid) -> Result<()> {
        self.recorder.submit(GattOp::EnableNotifications(characteristic))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.recorder.submit(GattOp::Disconnect)
    }
}

/// Opened link: its recorder and the sender a simulated peer answers on
#[derive(Debug, Clone)]
pub struct OpenedLink {
    pub recorder: LinkRecorder,
    pub events: EventSender,
}

/// Connector handing out recording links
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    opened: Arc<Mutex<HashMap<DeviceId, Vec<OpenedLink>>>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent link opened for `device`
    pub fn link(&self, device: &DeviceId) -> Option<OpenedLink> {
        self.opened.lock().get(device).and_then(|links| links.last().cloned())
    }

    /// Number of links ever opened for `device`
    pub fn open_count(&self, device: &DeviceId) -> usize {
        self.opened.lock().get(device).map_or(0, Vec::len)
    }
}

impl GattConnector for RecordingConnector {
    fn open(&self, device: &DeviceId, events: EventSender) -> Result<Box<dyn GattLink>> {
        let (link, recorder) = RecordingLink::new(device.clone());

        self.opened
            .lock()
            .entry(device.clone())
            .or_default()
            .push(OpenedLink { recorder, events });

        Ok(Box::new(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionEvent, event_channel};

    const CHAR: Uuid = Uuid::from_u128(0xABCD);

    #[test]
    fn test_records_submissions() {
        let (mut link, recorder) = RecordingLink::new("AA:BB");

        link.connect().unwrap();
        link.write(CHAR, &[1, 2, 3]).unwrap();
        link.read(CHAR).unwrap();

        assert_eq!(recorder.count(OpKind::Write), 1);
        assert_eq!(recorder.writes_to(CHAR), vec![Bytes::from_static(&[1, 2, 3])]);
        assert_eq!(recorder.last_op(), Some(GattOp::Read(CHAR)));
        assert_eq!(link.device().as_str(), "AA:BB");
    }

    #[test]
    fn test_rejected_submission_is_not_recorded() {
        let (mut link, recorder) = RecordingLink::new("AA:BB");
        recorder.reject(OpKind::Write);

        assert!(matches!(link.write(CHAR, &[0]), Err(Error::Rejected(_))));
        assert!(link.read(CHAR).is_ok());
        assert_eq!(recorder.ops(), vec![GattOp::Read(CHAR)]);
    }

    #[test]
    fn test_connector_exposes_peer_side() {
        let connector = RecordingConnector::new();
        let device = DeviceId::new("AA:BB");
        let (tx, mut rx) = event_channel();

        let mut link = connector.open(&device, tx).unwrap();
        link.connect().unwrap();

        let opened = connector.link(&device).unwrap();
        assert_eq!(opened.recorder.ops(), vec![GattOp::Connect]);

        opened.events.send(SessionEvent::Connected).unwrap();
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Connected);
        assert_eq!(connector.open_count(&device), 1);
    }
}
