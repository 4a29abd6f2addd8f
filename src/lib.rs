//! # MQTT Control Node for Embedded Boards
//!
//! `myrtio-node` is the firmware core of a small networked device: it keeps an MQTT session to a
//! broker alive, drives a single digital output from remote commands and reports liveness with a
//! periodic heartbeat. It is `no_std`, allocation-free and built on the
//! [Embassy](https://embassy.dev/) time and sync primitives.
//!
//! ## Core Features
//!
//! - **Cooperative loop:** [`Node::tick`] never blocks. Connect attempts, acknowledgements and
//!   inbound messages all complete through events drained on the next tick.
//! - **Self-healing connectivity:** attempts are spaced by a retry interval, a silent broker is
//!   abandoned after a watchdog timeout and a lost session or link falls back to retrying.
//! - **Presence:** `online` is published (retained) once connected; `offline` is registered as
//!   the last will.
//! - **Command surface:** `ON`, `OFF`, `BLINK FAST` and `BLINK SLOW` on the actuator topic,
//!   `RESET` on the counter topic. Payloads must match exactly.
//! - **Capability traits:** the network link ([`Link`]), the broker transport ([`Transport`])
//!   and the output pin (`embedded_hal::digital::OutputPin`) are all injected, so the same node
//!   runs on hardware and in host tests.
//!
//! ## Architecture
//!
//! ```text
//!   Link ──▶ Node::tick ──▶ Connectivity ──▶ TransportClient ──▶ Socket
//!                 │              ▲                  │
//!                 │              └──── Inbox ◀──────┘  (TransportEvent)
//!                 ├──▶ Router ──▶ ActuatorMode / HeartbeatCounter
//!                 ├──▶ Actuator::render ──▶ OutputPin
//!                 └──▶ heartbeat publish
//! ```
//!
//! The bundled [`MqttClient`] implements the transport over any non-blocking [`Socket`]. With
//! the `embassy-net` feature, `embassy_net::Stack` works as a [`Link`] and
//! `embassy_net::tcp::TcpSocket` as a [`Socket`].
//!
//! ```ignore
//! static CONFIG: Config = Config::from_build_env();
//!
//! let socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
//! let transport: SocketTransport<_> = SocketTransport::new(socket);
//! let mut node = Node::new(CONFIG, stack, transport, led);
//! run(&mut node, &SystemClock, &mut Delay).await
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through the `log` facade by default. The `esp32-log` feature prints to the
//! ESP32 console instead, and disabling both removes all logging code.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod actuator;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod heartbeat;
pub mod inbox;
pub mod link;
#[cfg(feature = "embassy-net")]
pub mod net;
pub mod node;
pub mod packet;
pub mod router;
pub mod transport;
pub mod util;

#[cfg(test)]
mod mock;

// Re-export key types for easier access at the crate root.
pub use actuator::{Actuator, ActuatorMode};
pub use client::{MqttClient, SocketTransport};
pub use config::{Config, Topics};
pub use connectivity::ConnectivityState;
pub use error::RequestError;
pub use link::Link;
pub use node::{Clock, Node, SystemClock, run};
pub use packet::QoS;
pub use transport::{Socket, Transport, TransportClient, TransportEvent};
