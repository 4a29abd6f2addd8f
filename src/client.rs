//! # MQTT Client
//!
//! A poll-driven MQTT 3.1.1 client running on any [`Socket`]. Requests only encode packets into
//! the transmit buffer; [`TransportClient::poll`] moves the bytes, parses whatever the broker
//! sent and reports the results as [`TransportEvent`]s. Nothing in here waits.
//!
//! Inbound `PUBLISH` packets are handed over as a topic announcement followed by payload chunks
//! of at most [`PAYLOAD_CHUNK_LEN`] bytes, the same shape a callback-based network stack would
//! deliver them in. When the event sink runs out of room the rest of a message waits in the
//! receive buffer and is delivered on later polls.

use embassy_time::{Duration, Instant};
use heapless::{String, Vec};

use crate::error::{ConnectReasonCode, MqttError, PacketError, ProtocolError, RequestError};
use crate::packet::{
    self, Connect, Disconnect, EncodePacket, MqttPacket, PingReq, PubAck, Publish, QoS, Subscribe,
};
use crate::transport::{
    ConnectRequest, ConnectionStatus, EventSink, PAYLOAD_CHUNK_LEN, PublishRequest, Socket,
    SocketState, Transport, TransportClient, TransportEvent,
};

/// Requests that may wait for an acknowledgement at the same time.
pub const MAX_INFLIGHT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Session {
    Idle,
    /// CONNECT is queued until the socket is up.
    Opening,
    AwaitingConnAck,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inflight {
    Subscribe(u16),
    Publish(u16),
}

/// MQTT client with `BUF_SIZE` bytes each for the transmit and receive buffers.
///
/// Inbound packets larger than `BUF_SIZE` are skipped.
pub struct MqttClient<S, const BUF_SIZE: usize = 1024> {
    socket: S,
    session: Session,
    keep_alive: Duration,
    tx: [u8; BUF_SIZE],
    tx_len: usize,
    rx: [u8; BUF_SIZE],
    rx_len: usize,
    /// Bytes of an oversized inbound packet still to be thrown away.
    discard: usize,
    /// Payload bytes already delivered from the `PUBLISH` at the head of `rx`, once announced.
    delivered: Option<usize>,
    next_packet_id: u16,
    inflight: Vec<Inflight, MAX_INFLIGHT>,
    last_tx: Instant,
    ping_sent: Option<Instant>,
}

impl<S: Socket, const BUF_SIZE: usize> MqttClient<S, BUF_SIZE> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            session: Session::Idle,
            keep_alive: Duration::from_secs(0),
            tx: [0; BUF_SIZE],
            tx_len: 0,
            rx: [0; BUF_SIZE],
            rx_len: 0,
            discard: 0,
            delivered: None,
            next_packet_id: 0,
            inflight: Vec::new(),
            last_tx: Instant::from_ticks(0),
            ping_sent: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session == Session::Connected
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    /// Next non-zero packet identifier.
    fn next_packet_id(&mut self) -> u16 {
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        if self.next_packet_id == 0 {
            self.next_packet_id = 1;
        }
        self.next_packet_id
    }

    /// Appends an encoded packet to the transmit buffer.
    fn enqueue<P: EncodePacket>(&mut self, packet: &P) -> Result<(), PacketError> {
        let len = packet.encode(&mut self.tx[self.tx_len..])?;
        self.tx_len += len;
        Ok(())
    }

    fn reserve_inflight(&self) -> Result<(), RequestError> {
        if self.inflight.is_full() {
            return Err(RequestError::Busy);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.session = Session::Idle;
        self.tx_len = 0;
        self.rx_len = 0;
        self.discard = 0;
        self.delivered = None;
        self.inflight.clear();
        self.ping_sent = None;
    }

    /// Writes as much of the transmit buffer as the socket takes.
    fn flush(&mut self, now: Instant) -> Result<(), MqttError<S::Error>> {
        while self.tx_len > 0 {
            let n = self
                .socket
                .send(&self.tx[..self.tx_len])
                .map_err(MqttError::Socket)?;
            if n == 0 {
                break;
            }
            self.tx.copy_within(n..self.tx_len, 0);
            self.tx_len -= n;
            self.last_tx = now;
        }
        Ok(())
    }

    fn consume(&mut self, n: usize) {
        self.rx.copy_within(n..self.rx_len, 0);
        self.rx_len -= n;
    }

    fn service(
        &mut self,
        now: Instant,
        events: &mut dyn EventSink,
    ) -> Result<(), MqttError<S::Error>> {
        match (self.session, self.socket.state()) {
            (Session::Idle, _) | (Session::Opening, SocketState::Opening) => return Ok(()),
            (Session::Opening, SocketState::Open) => {
                debug!("socket open, sending CONNECT");
                self.session = Session::AwaitingConnAck;
            }
            (_, SocketState::Closed) => return Err(ProtocolError::ConnectionClosed.into()),
            _ => {}
        }

        self.flush(now)?;
        self.receive(now, events)?;
        if self.session == Session::Connected {
            self.keep_alive(now)?;
        }
        self.flush(now)
    }

    fn receive(
        &mut self,
        now: Instant,
        events: &mut dyn EventSink,
    ) -> Result<(), MqttError<S::Error>> {
        loop {
            self.process_frames(now, events)?;
            if self.rx_len == BUF_SIZE {
                // Full of frames the sink has no room for yet.
                return Ok(());
            }
            let n = self
                .socket
                .recv(&mut self.rx[self.rx_len..])
                .map_err(MqttError::Socket)?;
            if n == 0 {
                return Ok(());
            }
            self.rx_len += n;
        }
    }

    fn process_frames(
        &mut self,
        now: Instant,
        events: &mut dyn EventSink,
    ) -> Result<(), MqttError<S::Error>> {
        loop {
            if self.discard > 0 {
                let n = self.discard.min(self.rx_len);
                self.consume(n);
                self.discard -= n;
                if self.discard > 0 {
                    return Ok(());
                }
            }

            let Some(len) = packet::frame_len(&self.rx[..self.rx_len])? else {
                return Ok(());
            };
            if len > BUF_SIZE {
                warn!("skipping {} byte packet, receive buffer holds {}", len, BUF_SIZE);
                self.discard = len;
                continue;
            }
            if len > self.rx_len {
                return Ok(());
            }
            if !self.handle_frame(len, now, events)? {
                return Ok(());
            }
            self.consume(len);
        }
    }

    /// Acts on the frame at the head of `rx`. Returns `false` if it has to stay there until
    /// the sink has room again.
    fn handle_frame(
        &mut self,
        len: usize,
        now: Instant,
        events: &mut dyn EventSink,
    ) -> Result<bool, MqttError<S::Error>> {
        let packet = packet::decode(&self.rx[..len])?;
        if matches!(packet, MqttPacket::PubAck(_) | MqttPacket::SubAck(_)) && events.room() == 0 {
            return Ok(false);
        }
        match packet {
            MqttPacket::ConnAck(ack) => {
                if self.session != Session::AwaitingConnAck {
                    return Err(ProtocolError::InvalidResponse.into());
                }
                match ConnectReasonCode::from(ack.return_code) {
                    ConnectReasonCode::Success => {
                        self.session = Session::Connected;
                        self.last_tx = now;
                        events.push(TransportEvent::Connection(ConnectionStatus::Accepted));
                    }
                    code => return Err(MqttError::ConnectionRefused(code)),
                }
            }
            MqttPacket::Publish(publish) => {
                if self.session != Session::Connected {
                    return Err(ProtocolError::InvalidResponse.into());
                }
                let delivered = match self.delivered {
                    Some(delivered) => delivered,
                    None => {
                        if events.room() == 0 {
                            return Ok(false);
                        }
                        if let (QoS::AtLeastOnce, Some(packet_id)) =
                            (publish.qos, publish.packet_id)
                        {
                            let ack = PubAck { packet_id };
                            match ack.encode(&mut self.tx[self.tx_len..]) {
                                Ok(n) => self.tx_len += n,
                                Err(_) => warn!("no room to acknowledge publish {}", packet_id),
                            }
                        }
                        if !announce(&publish, events) {
                            return Ok(true);
                        }
                        0
                    }
                };
                self.delivered = deliver(publish.payload, delivered, events);
                return Ok(self.delivered.is_none());
            }
            MqttPacket::PubAck(ack) => {
                if settle(&mut self.inflight, Inflight::Publish(ack.packet_id)) {
                    events.push(TransportEvent::Published {
                        packet_id: ack.packet_id,
                    });
                } else {
                    debug!("unexpected PUBACK {}", ack.packet_id);
                }
            }
            MqttPacket::SubAck(ack) => {
                if settle(&mut self.inflight, Inflight::Subscribe(ack.packet_id)) {
                    events.push(TransportEvent::Subscribed {
                        packet_id: ack.packet_id,
                        granted: ack.granted(),
                    });
                } else {
                    debug!("unexpected SUBACK {}", ack.packet_id);
                }
            }
            MqttPacket::PingResp => self.ping_sent = None,
        }
        Ok(true)
    }

    fn keep_alive(&mut self, now: Instant) -> Result<(), MqttError<S::Error>> {
        if self.keep_alive.as_ticks() == 0 {
            return Ok(());
        }
        if let Some(sent) = self.ping_sent {
            if now.saturating_duration_since(sent) > self.keep_alive {
                return Err(MqttError::Timeout);
            }
            return Ok(());
        }
        if now.saturating_duration_since(self.last_tx) >= self.keep_alive {
            trace!("sending PINGREQ");
            self.enqueue(&PingReq)?;
            self.ping_sent = Some(now);
        }
        Ok(())
    }
}

/// Removes the matching in-flight entry. Returns whether there was one.
fn settle(inflight: &mut Vec<Inflight, MAX_INFLIGHT>, done: Inflight) -> bool {
    match inflight.iter().position(|&entry| entry == done) {
        Some(index) => {
            inflight.swap_remove(index);
            true
        }
        None => false,
    }
}

/// Reports the topic of an inbound publish. Returns `false` if the message cannot be delivered.
fn announce(publish: &Publish<'_>, events: &mut dyn EventSink) -> bool {
    let Ok(topic) = String::try_from(publish.topic) else {
        warn!("topic too long, dropping message on {}", publish.topic);
        return false;
    };
    events.push(TransportEvent::TopicAnnounced {
        topic,
        total_len: publish.payload.len() as u32,
    })
}

/// Pushes payload chunks starting at `offset` while the sink has room.
///
/// Returns the offset to resume from, or `None` once the last chunk is out. An empty payload
/// still produces one empty last chunk.
fn deliver(payload: &[u8], mut offset: usize, events: &mut dyn EventSink) -> Option<usize> {
    while events.room() > 0 {
        let end = (offset + PAYLOAD_CHUNK_LEN).min(payload.len());
        let last = end == payload.len();
        let mut data = Vec::new();
        // At most `PAYLOAD_CHUNK_LEN` bytes, which is the chunk capacity.
        let _ = data.extend_from_slice(&payload[offset..end]);
        events.push(TransportEvent::PayloadChunk { data, last });
        if last {
            return None;
        }
        offset = end;
    }
    Some(offset)
}

impl<S: Socket, const BUF_SIZE: usize> TransportClient for MqttClient<S, BUF_SIZE> {
    fn connect(&mut self, request: &ConnectRequest<'_>) -> Result<(), RequestError> {
        if self.session != Session::Idle {
            return Err(RequestError::Busy);
        }
        self.reset();

        let mut connect = Connect::new(request.client_id, request.keep_alive_secs, true);
        connect.will = request.will;
        connect.username = request.username;
        connect.password = request.password;
        self.enqueue(&connect)?;

        if let Err(e) = self.socket.open(request.broker) {
            warn!("cannot open socket to {}: {:?}", request.broker, e);
            self.reset();
            return Err(RequestError::Socket);
        }
        self.keep_alive = Duration::from_secs(u64::from(request.keep_alive_secs));
        self.session = Session::Opening;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, RequestError> {
        if self.session != Session::Connected {
            return Err(RequestError::NotConnected);
        }
        self.reserve_inflight()?;
        let packet_id = self.next_packet_id();
        self.enqueue(&Subscribe::new(packet_id, topic, qos))?;
        // `reserve_inflight` checked for a free entry.
        let pushed = self.inflight.push(Inflight::Subscribe(packet_id));
        debug_assert!(pushed.is_ok());
        debug!("subscribing to {} (id {})", topic, packet_id);
        Ok(packet_id)
    }

    fn publish(&mut self, request: &PublishRequest<'_>) -> Result<(), RequestError> {
        if self.session != Session::Connected {
            return Err(RequestError::NotConnected);
        }
        let packet_id = match request.qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => {
                self.reserve_inflight()?;
                Some(self.next_packet_id())
            }
            QoS::ExactlyOnce => return Err(RequestError::Unsupported),
        };
        self.enqueue(&Publish {
            topic: request.topic,
            qos: request.qos,
            retain: request.retain,
            dup: false,
            payload: request.payload,
            packet_id,
        })?;
        if let Some(id) = packet_id {
            // `reserve_inflight` checked for a free entry.
            let pushed = self.inflight.push(Inflight::Publish(id));
            debug_assert!(pushed.is_ok());
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.session == Session::Connected {
            // Best effort: a clean DISCONNECT keeps the broker from publishing the will.
            if self.enqueue(&Disconnect).is_ok() {
                let _ = self.flush(self.last_tx);
            }
        }
        if self.session != Session::Idle {
            info!("closing broker session");
            self.socket.close();
        }
        self.reset();
    }

    fn poll(&mut self, now: Instant, events: &mut dyn EventSink) {
        if let Err(e) = self.service(now, events) {
            let status = match (self.session, &e) {
                (Session::Connected, _) => ConnectionStatus::Lost,
                (_, MqttError::ConnectionRefused(code)) => ConnectionStatus::Refused(*code),
                _ => ConnectionStatus::Failed,
            };
            warn!("broker session ended ({:?}): {:?}", status, e);
            self.socket.close();
            self.reset();
            events.push(TransportEvent::Connection(status));
        }
    }
}

/// Hands out one [`MqttClient`] over a socket provided up front.
pub struct SocketTransport<S, const BUF_SIZE: usize = 1024> {
    socket: Option<S>,
}

impl<S, const BUF_SIZE: usize> SocketTransport<S, BUF_SIZE> {
    pub fn new(socket: S) -> Self {
        Self {
            socket: Some(socket),
        }
    }
}

impl<S: Socket, const BUF_SIZE: usize> Transport for SocketTransport<S, BUF_SIZE> {
    type Client = MqttClient<S, BUF_SIZE>;

    fn create_client(&mut self) -> Result<Self::Client, RequestError> {
        self.socket.take().map(MqttClient::new).ok_or(RequestError::Busy)
    }
}
