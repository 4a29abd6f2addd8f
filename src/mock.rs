//! In-memory stand-ins for the hardware and network capabilities, used by the unit tests.

use std::collections::VecDeque;

use core::net::{Ipv4Addr, SocketAddrV4};

use embassy_time::Instant;
use embedded_hal::digital::{self, ErrorType, OutputPin};

use crate::error::RequestError;
use crate::link::Link;
use crate::packet::QoS;
use crate::transport::{
    ConnectRequest, EventSink, PublishRequest, Socket, SocketState, Transport, TransportClient,
    TransportEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinFault;

impl digital::Error for PinFault {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// An output pin that remembers what was written to it.
#[derive(Debug, Default)]
pub struct MockPin {
    high: bool,
    writes: usize,
    toggles: usize,
    failing: bool,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pin whose every write reports an error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Writes that changed the level.
    pub fn toggles(&self) -> usize {
        self.toggles
    }

    pub fn is_high(&self) -> bool {
        self.high
    }

    fn write(&mut self, high: bool) -> Result<(), PinFault> {
        if self.failing {
            return Err(PinFault);
        }
        self.writes += 1;
        if self.high != high {
            self.toggles += 1;
        }
        self.high = high;
        Ok(())
    }
}

impl ErrorType for MockPin {
    type Error = PinFault;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

#[derive(Debug, Default)]
pub struct MockLink {
    pub attached: bool,
    pub address: Option<Ipv4Addr>,
    pub polls: usize,
}

impl MockLink {
    pub fn attached() -> Self {
        Self {
            attached: true,
            address: Some(Ipv4Addr::new(192, 168, 1, 42)),
            polls: 0,
        }
    }

    pub fn detached() -> Self {
        Self::default()
    }
}

impl Link for MockLink {
    fn poll(&mut self, _now: Instant) {
        self.polls += 1;
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.address.filter(|_| self.attached)
    }
}

/// A connect request as the transport saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedConnect {
    pub broker: SocketAddrV4,
    pub client_id: String,
    pub keep_alive_secs: u16,
    pub will_topic: Option<String>,
    pub will_payload: Vec<u8>,
    pub will_qos: Option<QoS>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl RecordedPublish {
    pub fn payload_str(&self) -> &str {
        core::str::from_utf8(&self.payload).unwrap()
    }
}

/// A client that records requests and replays scripted events on poll.
#[derive(Debug, Default)]
pub struct MockClient {
    pub connect_error: Option<RequestError>,
    pub publish_error: Option<RequestError>,
    pub connects: Vec<RecordedConnect>,
    pub subscriptions: Vec<String>,
    pub published: Vec<RecordedPublish>,
    pub disconnects: usize,
    pub polls: usize,
    pub pending: VecDeque<TransportEvent>,
    next_packet_id: u16,
}

impl MockClient {
    /// Queues an event for the next poll.
    pub fn inject(&mut self, event: TransportEvent) {
        self.pending.push_back(event);
    }

    /// Queues an inbound message split into chunks of `chunk` bytes.
    pub fn inject_message(&mut self, topic: &str, payload: &[u8], chunk: usize) {
        self.inject(TransportEvent::TopicAnnounced {
            topic: heapless::String::try_from(topic).unwrap(),
            total_len: payload.len() as u32,
        });
        let mut parts = payload.chunks(chunk).peekable();
        if parts.peek().is_none() {
            self.inject(TransportEvent::PayloadChunk {
                data: heapless::Vec::new(),
                last: true,
            });
        }
        while let Some(part) = parts.next() {
            self.inject(TransportEvent::PayloadChunk {
                data: heapless::Vec::from_slice(part).unwrap(),
                last: parts.peek().is_none(),
            });
        }
    }

    pub fn published_to(&self, topic: &str) -> Vec<&RecordedPublish> {
        self.published.iter().filter(|p| p.topic == topic).collect()
    }
}

impl TransportClient for MockClient {
    fn connect(&mut self, request: &ConnectRequest<'_>) -> Result<(), RequestError> {
        if let Some(e) = self.connect_error {
            return Err(e);
        }
        self.connects.push(RecordedConnect {
            broker: request.broker,
            client_id: request.client_id.to_string(),
            keep_alive_secs: request.keep_alive_secs,
            will_topic: request.will.map(|w| w.topic.to_string()),
            will_payload: request.will.map(|w| w.payload.to_vec()).unwrap_or_default(),
            will_qos: request.will.map(|w| w.qos),
            username: request.username.map(ToString::to_string),
        });
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<u16, RequestError> {
        self.subscriptions.push(topic.to_string());
        self.next_packet_id += 1;
        Ok(self.next_packet_id)
    }

    fn publish(&mut self, request: &PublishRequest<'_>) -> Result<(), RequestError> {
        if let Some(e) = self.publish_error {
            return Err(e);
        }
        self.published.push(RecordedPublish {
            topic: request.topic.to_string(),
            payload: request.payload.to_vec(),
            qos: request.qos,
            retain: request.retain,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }

    fn poll(&mut self, _now: Instant, events: &mut dyn EventSink) {
        self.polls += 1;
        while let Some(event) = self.pending.pop_front() {
            events.push(event);
        }
    }
}

#[derive(Debug, Default)]
pub struct MockTransport {
    /// Clients handed out so far.
    pub created: usize,
    pub fail_create: bool,
    /// Copied into every client created afterwards.
    pub connect_error: Option<RequestError>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for MockTransport {
    type Client = MockClient;

    fn create_client(&mut self) -> Result<MockClient, RequestError> {
        if self.fail_create {
            return Err(RequestError::Busy);
        }
        self.created += 1;
        Ok(MockClient {
            connect_error: self.connect_error,
            ..MockClient::default()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketFault;

/// A byte pipe standing in for a TCP connection.
#[derive(Debug)]
pub struct MockSocket {
    pub state: SocketState,
    pub opened: Option<SocketAddrV4>,
    pub refuse_open: bool,
    pub fail_io: bool,
    /// Bytes the client wrote.
    pub sent: Vec<u8>,
    /// Bytes waiting to be read by the client.
    pub inbound: VecDeque<u8>,
    /// Caps how much a single `send` takes.
    pub send_window: usize,
    pub closes: usize,
}

impl Default for MockSocket {
    fn default() -> Self {
        Self {
            state: SocketState::Closed,
            opened: None,
            refuse_open: false,
            fail_io: false,
            sent: Vec::new(),
            inbound: VecDeque::new(),
            send_window: usize::MAX,
            closes: 0,
        }
    }
}

impl MockSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes bytes available to the next `recv`.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Takes everything the client has written so far.
    pub fn drain_sent(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.sent)
    }
}

impl Socket for MockSocket {
    type Error = SocketFault;

    fn open(&mut self, remote: SocketAddrV4) -> Result<(), SocketFault> {
        if self.refuse_open {
            return Err(SocketFault);
        }
        self.opened = Some(remote);
        self.state = SocketState::Opening;
        Ok(())
    }

    fn state(&self) -> SocketState {
        self.state
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, SocketFault> {
        if self.fail_io {
            return Err(SocketFault);
        }
        let n = buf.len().min(self.send_window);
        self.sent.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, SocketFault> {
        if self.fail_io {
            return Err(SocketFault);
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&mut self) {
        self.closes += 1;
        self.state = SocketState::Closed;
    }
}

/// Collects transport events in arrival order.
#[derive(Debug, Default)]
pub struct EventLog(pub Vec<TransportEvent>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<TransportEvent> {
        core::mem::take(&mut self.0)
    }
}

impl EventSink for EventLog {
    fn push(&mut self, event: TransportEvent) -> bool {
        self.0.push(event);
        true
    }

    fn room(&self) -> usize {
        usize::MAX
    }
}
