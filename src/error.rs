//! # Error Types
//!
//! Errors are layered the same way the node is: the packet codec reports [`PacketError`], the
//! MQTT client wraps codec and socket failures in [`MqttError`], and everything that issues a
//! request towards the broker gets a flat [`RequestError`] back. None of them cross a component
//! boundary; callers turn them into a state transition or a no-op.

use core::fmt;

/// Failure while encoding or decoding an MQTT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError {
    /// The destination buffer cannot hold the encoded packet.
    BufferTooSmall,
    /// The bytes do not form a valid packet.
    Protocol(ProtocolError),
}

impl From<ProtocolError> for PacketError {
    fn from(err: ProtocolError) -> Self {
        PacketError::Protocol(err)
    }
}

/// The error enum of the MQTT client.
///
/// It is generic over the socket error type `E`, so the concrete network stack error is kept
/// intact for diagnostics.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<E> {
    /// The underlying socket failed.
    Socket(E),
    /// A packet could not be encoded or decoded.
    Packet(PacketError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The client is not currently connected to the broker.
    NotConnected,
    /// The broker stopped answering keep-alive pings.
    Timeout,
}

impl<E> From<PacketError> for MqttError<E> {
    fn from(err: PacketError) -> Self {
        MqttError::Packet(err)
    }
}

impl<E> From<ProtocolError> for MqttError<E> {
    fn from(err: ProtocolError) -> Self {
        MqttError::Packet(PacketError::Protocol(err))
    }
}

/// Synchronous outcome of issuing a request to the transport.
///
/// The request itself completes later through a transport event; this only says whether it
/// could be queued at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// The broker address is not a valid IPv4 literal.
    InvalidAddress,
    /// No broker session is established.
    NotConnected,
    /// The transport is already handling a conflicting request or has no free slot.
    Busy,
    /// The outgoing buffer has no room for the packet.
    BufferFull,
    /// The socket rejected the operation.
    Socket,
    /// The request needs a protocol feature this client does not implement.
    Unsupported,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RequestError::InvalidAddress => "invalid broker address",
            RequestError::NotConnected => "not connected",
            RequestError::Busy => "transport busy",
            RequestError::BufferFull => "output buffer full",
            RequestError::Socket => "socket error",
            RequestError::Unsupported => "unsupported request",
        };
        f.write_str(msg)
    }
}

impl From<PacketError> for RequestError {
    fn from(err: PacketError) -> Self {
        match err {
            PacketError::BufferTooSmall => RequestError::BufferFull,
            // Encoders only report protocol errors for fields too long to frame.
            PacketError::Protocol(_) => RequestError::BufferFull,
        }
    }
}

/// Represents the return codes of a connection acknowledgement (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success = 0,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion = 1,
    /// The client identifier is not valid.
    IdentifierRejected = 2,
    /// The broker is unavailable.
    ServerUnavailable = 3,
    /// The username or password is not valid.
    BadUserNameOrPassword = 4,
    /// The client is not authorized to connect.
    NotAuthorized = 5,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The payload of a message exceeds the maximum allowable size.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
}
