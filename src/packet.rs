//! # MQTT Packet Structures and Serialization
//!
//! MQTT 3.1.1 control packets and the traits for encoding and decoding them. The node only
//! ever speaks the client side of the protocol, so packets the client sends are encodable and
//! packets the broker sends are decodable.

use heapless::Vec;

use crate::error::{PacketError, ProtocolError};
use crate::util::{Reader, Writer, prefixed_len, read_variable_byte_integer};

/// Protocol level byte for MQTT 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    fn from_bits(bits: u8) -> Result<Self, ProtocolError> {
        match bits {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::MalformedPacket),
        }
    }
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    /// Writes the full packet (fixed header included) and returns its length.
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError>;
}

/// A trait for packets that can be decoded from a complete frame.
pub trait DecodePacket<'a>: Sized {
    fn decode(flags: u8, body: &'a [u8]) -> Result<Self, PacketError>;
}

/// Packets a broker sends to a client.
#[derive(Debug)]
pub enum MqttPacket<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(PubAck),
    SubAck(SubAck),
    PingResp,
}

/// Returns the length of the first frame in `buf`, or `None` if the fixed header is not
/// complete yet.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, PacketError> {
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(read_variable_byte_integer(&buf[1..])?.map(|(len, n)| 1 + n + len))
}

/// Decodes one complete frame as produced by [`frame_len`].
pub fn decode(frame: &[u8]) -> Result<MqttPacket<'_>, PacketError> {
    let Some(&header) = frame.first() else {
        return Err(ProtocolError::MalformedPacket.into());
    };
    let (remaining_len, n) =
        read_variable_byte_integer(&frame[1..])?.ok_or(ProtocolError::MalformedPacket)?;
    let body = frame
        .get(1 + n..1 + n + remaining_len)
        .ok_or(ProtocolError::MalformedPacket)?;

    let packet_type = header >> 4;
    let flags = header & 0x0F;
    let packet = match packet_type {
        2 => MqttPacket::ConnAck(ConnAck::decode(flags, body)?),
        3 => MqttPacket::Publish(Publish::decode(flags, body)?),
        4 => MqttPacket::PubAck(PubAck::decode(flags, body)?),
        9 => MqttPacket::SubAck(SubAck::decode(flags, body)?),
        13 => MqttPacket::PingResp,
        _ => return Err(ProtocolError::InvalidPacketType(packet_type).into()),
    };
    Ok(packet)
}

fn put_fixed_header(w: &mut Writer<'_>, header: u8, remaining_len: usize) -> Result<(), PacketError> {
    w.put_u8(header)?;
    w.put_variable_byte_integer(remaining_len)
}

/// The message a broker publishes on the client's behalf after an unclean disconnect.
#[derive(Debug, Clone, Copy)]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

// --- CONNECT Packet ---
#[derive(Debug)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
    pub will: Option<LastWill<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
            will: None,
            username: None,
            password: None,
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04 | ((will.qos as u8) << 3);
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        flags
    }

    fn remaining_len(&self) -> usize {
        // Protocol name, level, flags and keep-alive.
        let mut len = 10 + prefixed_len(self.client_id.as_bytes());
        if let Some(will) = &self.will {
            len += prefixed_len(will.topic.as_bytes()) + prefixed_len(will.payload);
        }
        if let Some(username) = self.username {
            len += prefixed_len(username.as_bytes());
        }
        if let Some(password) = self.password {
            len += prefixed_len(password);
        }
        len
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let mut w = Writer::new(buf);
        put_fixed_header(&mut w, 0x10, self.remaining_len())?;
        w.put_str("MQTT")?;
        w.put_u8(PROTOCOL_LEVEL)?;
        w.put_u8(self.flags())?;
        w.put_u16(self.keep_alive)?;
        w.put_str(self.client_id)?;
        if let Some(will) = &self.will {
            w.put_str(will.topic)?;
            w.put_prefixed(will.payload)?;
        }
        if let Some(username) = self.username {
            w.put_str(username)?;
        }
        if let Some(password) = self.password {
            w.put_prefixed(password)?;
        }
        Ok(w.position())
    }
}

// --- CONNACK Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl<'a> DecodePacket<'a> for ConnAck {
    fn decode(_flags: u8, body: &'a [u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(body);
        let session_present = (r.u8()? & 0x01) != 0;
        let return_code = r.u8()?;
        Ok(Self {
            session_present,
            return_code,
        })
    }
}

// --- PUBLISH Packet ---
#[derive(Debug)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(flags: u8, body: &'a [u8]) -> Result<Self, PacketError> {
        let qos = QoS::from_bits((flags >> 1) & 0x03)?;
        let mut r = Reader::new(body);
        let topic = r.utf8_str()?;
        let packet_id = if qos != QoS::AtMostOnce {
            Some(r.u16()?)
        } else {
            None
        };
        Ok(Publish {
            topic,
            qos,
            retain: (flags & 0x01) != 0,
            dup: (flags & 0x08) != 0,
            payload: r.rest(),
            packet_id,
        })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let mut header = 0x30 | ((self.qos as u8) << 1);
        if self.retain {
            header |= 0x01;
        }
        if self.dup {
            header |= 0x08;
        }
        // Packet ID only for QoS > 0
        let packet_id = match (self.qos, self.packet_id) {
            (QoS::AtMostOnce, _) => None,
            (_, Some(id)) => Some(id),
            (_, None) => return Err(ProtocolError::MalformedPacket.into()),
        };
        let remaining_len = prefixed_len(self.topic.as_bytes())
            + packet_id.map_or(0, |_| 2)
            + self.payload.len();

        let mut w = Writer::new(buf);
        put_fixed_header(&mut w, header, remaining_len)?;
        w.put_str(self.topic)?;
        if let Some(id) = packet_id {
            w.put_u16(id)?;
        }
        w.put_bytes(self.payload)?;
        Ok(w.position())
    }
}

// --- PUBACK Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    pub packet_id: u16,
}

impl<'a> DecodePacket<'a> for PubAck {
    fn decode(_flags: u8, body: &'a [u8]) -> Result<Self, PacketError> {
        let packet_id = Reader::new(body).u16()?;
        Ok(PubAck { packet_id })
    }
}

impl EncodePacket for PubAck {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let mut w = Writer::new(buf);
        put_fixed_header(&mut w, 0x40, 2)?;
        w.put_u16(self.packet_id)?;
        Ok(w.position())
    }
}

// --- SUBSCRIBE Packet ---
#[derive(Debug)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topic: &'a str,
    pub qos: QoS,
}

impl<'a> Subscribe<'a> {
    /// Creates a new Subscribe packet with a single topic filter.
    pub fn new(packet_id: u16, topic: &'a str, qos: QoS) -> Self {
        Self {
            packet_id,
            topic,
            qos,
        }
    }
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let remaining_len = 2 + prefixed_len(self.topic.as_bytes()) + 1;
        let mut w = Writer::new(buf);
        // SUBSCRIBE carries reserved flag bits 0b0010
        put_fixed_header(&mut w, 0x82, remaining_len)?;
        w.put_u16(self.packet_id)?;
        w.put_str(self.topic)?;
        w.put_u8(self.qos as u8)?;
        Ok(w.position())
    }
}

// --- SUBACK Packet ---
#[derive(Debug)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<u8, 8>,
}

impl SubAck {
    /// QoS granted for the first topic filter, or `None` if the broker refused it.
    pub fn granted(&self) -> Option<QoS> {
        self.return_codes
            .first()
            .and_then(|&code| QoS::from_bits(code).ok())
    }
}

impl<'a> DecodePacket<'a> for SubAck {
    fn decode(_flags: u8, body: &'a [u8]) -> Result<Self, PacketError> {
        let mut r = Reader::new(body);
        let packet_id = r.u16()?;
        let mut return_codes = Vec::new();
        for &code in r.rest() {
            return_codes
                .push(code)
                .map_err(|_| ProtocolError::MalformedPacket)?;
        }
        Ok(SubAck {
            packet_id,
            return_codes,
        })
    }
}

// --- PINGREQ Packet ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let mut w = Writer::new(buf);
        put_fixed_header(&mut w, 0xC0, 0)?;
        Ok(w.position())
    }
}

// --- DISCONNECT Packet ---
#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let mut w = Writer::new(buf);
        put_fixed_header(&mut w, 0xE0, 0)?;
        Ok(w.position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_carries_last_will() {
        let mut connect = Connect::new("pico", 60, true);
        connect.will = Some(LastWill {
            topic: "s",
            payload: b"off",
            qos: QoS::AtLeastOnce,
            retain: true,
        });

        let mut buf = [0u8; 64];
        let len = connect.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..len],
            &[
                0x10, 24, // fixed header
                0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x2E, 0x00, 60, // variable header
                0x00, 0x04, b'p', b'i', b'c', b'o', // client id
                0x00, 0x01, b's', 0x00, 0x03, b'o', b'f', b'f', // will
            ]
        );
    }

    #[test]
    fn connect_sets_credential_flags() {
        let mut connect = Connect::new("id", 30, true);
        connect.username = Some("user");
        connect.password = Some(b"pw");

        let mut buf = [0u8; 64];
        let len = connect.encode(&mut buf).unwrap();
        assert_eq!(buf[9], 0xC2);
        assert_eq!(&buf[len - 10..len], b"\x00\x04user\x00\x02pw");
    }

    #[test]
    fn connect_into_short_buffer_fails_cleanly() {
        let connect = Connect::new("a-rather-long-client-identifier", 60, true);
        let mut buf = [0u8; 16];
        assert_eq!(connect.encode(&mut buf), Err(PacketError::BufferTooSmall));
    }

    #[test]
    fn publish_qos1_retained() {
        let publish = Publish {
            topic: "a/b",
            qos: QoS::AtLeastOnce,
            retain: true,
            dup: false,
            payload: b"online",
            packet_id: Some(7),
        };
        let mut buf = [0u8; 32];
        let len = publish.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..len],
            b"\x33\x0d\x00\x03a/b\x00\x07online".as_slice()
        );
    }

    #[test]
    fn publish_qos1_requires_packet_id() {
        let publish = Publish {
            topic: "t",
            qos: QoS::AtLeastOnce,
            retain: false,
            dup: false,
            payload: b"",
            packet_id: None,
        };
        let mut buf = [0u8; 16];
        assert!(publish.encode(&mut buf).is_err());
    }

    #[test]
    fn decodes_inbound_publish() {
        let frame = b"\x32\x0e\x00\x08pico/led\x00\x05ON";
        assert_eq!(frame_len(frame).unwrap(), Some(frame.len()));

        match decode(frame).unwrap() {
            MqttPacket::Publish(p) => {
                assert_eq!(p.topic, "pico/led");
                assert_eq!(p.qos, QoS::AtLeastOnce);
                assert_eq!(p.packet_id, Some(5));
                assert_eq!(p.payload, b"ON");
                assert!(!p.retain);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn decodes_connack_and_suback() {
        match decode(&[0x20, 0x02, 0x00, 0x05]).unwrap() {
            MqttPacket::ConnAck(ack) => assert_eq!(ack.return_code, 5),
            other => panic!("unexpected packet {:?}", other),
        }
        match decode(&[0x90, 0x03, 0x00, 0x02, 0x80]).unwrap() {
            MqttPacket::SubAck(ack) => {
                assert_eq!(ack.packet_id, 2);
                assert_eq!(ack.granted(), None);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn partial_header_is_not_a_frame() {
        assert_eq!(frame_len(&[0x30]), Ok(None));
        assert_eq!(frame_len(&[0x30, 0x80]), Ok(None));
        assert_eq!(frame_len(&[0x30, 0x80, 0x01]), Ok(Some(131)));
    }

    #[test]
    fn rejects_client_only_packet_types() {
        assert_eq!(
            decode(&[0xC0, 0x00]).unwrap_err(),
            PacketError::Protocol(ProtocolError::InvalidPacketType(12))
        );
    }

    #[test]
    fn truncated_publish_is_malformed() {
        assert!(decode(&[0x30, 0x04, 0x00, 0x09, b'a', b'b']).is_err());
    }
}
