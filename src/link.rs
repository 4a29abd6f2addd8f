//! # Link Capability
//!
//! The layer below the broker connection: radio association, DHCP and friends. The node only
//! needs to know whether the link is usable and to give the stack a chance to run.

use core::net::Ipv4Addr;

use embassy_time::Instant;

pub trait Link {
    /// Drains pending network work. Must return after a bounded amount of protocol processing.
    fn poll(&mut self, now: Instant);

    /// Whether the link is attached and configured.
    fn is_attached(&self) -> bool;

    /// The IPv4 address assigned to this node, if any.
    fn address(&self) -> Option<Ipv4Addr>;
}
