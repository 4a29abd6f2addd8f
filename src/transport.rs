//! # Transport Capability
//!
//! The node talks to the broker through two layers:
//!
//! - [`Transport`] / [`TransportClient`]: a message-oriented client whose requests return
//!   immediately and complete later. Completions and inbound messages surface as
//!   [`TransportEvent`]s pushed into an [`EventSink`] while the client is polled, so they run on
//!   the same thread as the rest of the tick and never concurrently with it.
//! - [`Socket`]: a non-blocking, ordered byte stream (TCP in practice) that the bundled
//!   [`MqttClient`](crate::client::MqttClient) runs on. Any stack that can open a connection and
//!   move bytes without blocking can back it.

use core::net::SocketAddrV4;

use embassy_time::Instant;
use heapless::{String, Vec};

use crate::error::{ConnectReasonCode, RequestError};
use crate::packet::{LastWill, QoS};

/// Maximum length for a single topic string.
pub const MAX_TOPIC_LEN: usize = 128;

/// Largest payload slice carried by one [`TransportEvent::PayloadChunk`].
pub const PAYLOAD_CHUNK_LEN: usize = 32;

/// Connection state of a [`Socket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocketState {
    Closed,
    Opening,
    Open,
}

/// A non-blocking byte stream to the broker.
pub trait Socket {
    /// The error type returned by the socket.
    type Error: core::fmt::Debug;

    /// Starts opening a connection. Completion is observed through [`Socket::state`].
    fn open(&mut self, remote: SocketAddrV4) -> Result<(), Self::Error>;

    fn state(&self) -> SocketState;

    /// Writes as much of `buf` as fits right now and returns the number of bytes taken.
    fn send(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Reads whatever is available without waiting. `Ok(0)` means nothing arrived yet.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    fn close(&mut self);
}

/// Everything needed to open a broker session.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    pub broker: SocketAddrV4,
    pub client_id: &'a str,
    pub keep_alive_secs: u16,
    pub will: Option<LastWill<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

/// A message to publish.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    /// The topic to publish to
    pub topic: &'a str,
    /// The payload bytes
    pub payload: &'a [u8],
    /// Quality of Service level
    pub qos: QoS,
    /// Whether the broker should keep the message for future subscribers
    pub retain: bool,
}

/// Outcome reported by the connection-status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    /// The broker accepted the session.
    Accepted,
    /// The broker answered with a refusal.
    Refused(ConnectReasonCode),
    /// The attempt failed before the broker answered (socket could not open, closed early).
    Failed,
    /// An established session went away.
    Lost,
}

/// Callbacks of the transport, as values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connection(ConnectionStatus),
    /// First half of an inbound message: its topic and total payload length.
    TopicAnnounced {
        topic: String<MAX_TOPIC_LEN>,
        total_len: u32,
    },
    /// Second half of an inbound message, possibly split over several events.
    PayloadChunk {
        data: Vec<u8, PAYLOAD_CHUNK_LEN>,
        last: bool,
    },
    /// A subscription completed. `granted` is `None` when the broker refused it.
    Subscribed { packet_id: u16, granted: Option<QoS> },
    /// A QoS 1 publish was acknowledged.
    Published { packet_id: u16 },
}

/// Object-safe trait for queuing transport events.
///
/// The client calls [`EventSink::push`] from inside [`TransportClient::poll`]; the node drains
/// the queue right after, in the same tick.
///
/// A sink must always accept [`TransportEvent::Connection`]; only the other events are bounded
/// by [`EventSink::room`]. Clients stop producing data events once `room` reaches zero and
/// resume on the next poll.
pub trait EventSink {
    /// Queue an event. Returns `false` if the event had to be dropped.
    fn push(&mut self, event: TransportEvent) -> bool;

    /// How many more non-connection events can be queued right now.
    fn room(&self) -> usize;
}

/// A broker client handle.
pub trait TransportClient {
    /// Issues a connect request. The outcome arrives as [`TransportEvent::Connection`].
    fn connect(&mut self, request: &ConnectRequest<'_>) -> Result<(), RequestError>;

    /// Issues a subscribe request and returns its packet id.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, RequestError>;

    /// Issues a publish request.
    fn publish(&mut self, request: &PublishRequest<'_>) -> Result<(), RequestError>;

    /// Tears the session down, or abandons an attempt in progress.
    fn disconnect(&mut self);

    /// Advances the client: moves bytes, runs protocol timers and reports what happened.
    fn poll(&mut self, now: Instant, events: &mut dyn EventSink);
}

/// Creates broker clients.
pub trait Transport {
    type Client: TransportClient;

    /// Creates the client handle. The node calls this at most once per run and reuses the
    /// handle across reconnects.
    fn create_client(&mut self) -> Result<Self::Client, RequestError>;
}
