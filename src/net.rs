//! # `embassy-net` Bindings
//!
//! Lets an [`embassy_net::Stack`] serve as the node's [`Link`] and a [`TcpSocket`] as the
//! broker [`Socket`]. The stack's runner task has to be spawned separately; it does the
//! actual interface polling.
//!
//! The socket's async operations are driven with [`poll_once`], so a call either completes
//! immediately or reports that nothing could be done yet.

use core::net::{Ipv4Addr, SocketAddrV4};
use core::task::Poll;

use embassy_futures::poll_once;
use embassy_net::tcp::{self, State, TcpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack};
use embassy_time::Instant;

use crate::link::Link;
use crate::transport::{Socket, SocketState};

impl Link for Stack<'_> {
    fn poll(&mut self, _now: Instant) {}

    fn is_attached(&self) -> bool {
        self.is_link_up() && self.is_config_up()
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.config_v4().map(|config| config.address.address())
    }
}

/// Errors of the `embassy-net` TCP socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    Connect(tcp::ConnectError),
    Io(tcp::Error),
}

impl Socket for TcpSocket<'_> {
    type Error = NetError;

    fn open(&mut self, remote: SocketAddrV4) -> Result<(), NetError> {
        let endpoint = IpEndpoint::new(IpAddress::Ipv4(*remote.ip()), remote.port());
        match poll_once(self.connect(endpoint)) {
            Poll::Ready(Err(e)) => Err(NetError::Connect(e)),
            // Still handshaking; progress shows up in `state`.
            Poll::Ready(Ok(())) | Poll::Pending => Ok(()),
        }
    }

    fn state(&self) -> SocketState {
        match TcpSocket::state(self) {
            State::Established => SocketState::Open,
            State::SynSent | State::SynReceived => SocketState::Opening,
            _ => SocketState::Closed,
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, NetError> {
        if !self.can_send() {
            return Ok(0);
        }
        match poll_once(self.write(buf)) {
            Poll::Ready(result) => result.map_err(NetError::Io),
            Poll::Pending => Ok(0),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        if !self.can_recv() {
            return Ok(0);
        }
        match poll_once(self.read(buf)) {
            Poll::Ready(result) => result.map_err(NetError::Io),
            Poll::Pending => Ok(0),
        }
    }

    fn close(&mut self) {
        // `open` needs the socket back in `Closed`, which a graceful close only reaches later.
        self.abort();
    }
}
