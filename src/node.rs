//! # Node
//!
//! Ties the capabilities together and runs the cooperative loop. Every tick performs, in order:
//!
//! 1. **poll**: give the link and the broker client a chance to run, then drain the events they
//!    produced into the router and the connectivity state machine;
//! 2. **advance**: time-gated connectivity work (retry gate, connect watchdog);
//! 3. **render**: drive the actuator output for the current mode;
//! 4. **heartbeat**: publish `alive <n>` when connected and due.
//!
//! Nothing in a tick blocks. The loop yields for a millisecond between ticks.

use embassy_time::Instant;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

use crate::actuator::{Actuator, ActuatorMode, Signal};
use crate::config::Config;
use crate::connectivity::{Connectivity, ConnectivityState, Transition};
use crate::heartbeat::{Heartbeat, HeartbeatCounter};
use crate::inbox::Inbox;
use crate::link::Link;
use crate::packet::QoS;
use crate::router::Router;
use crate::transport::{PublishRequest, Transport, TransportEvent};

/// Pause between two ticks.
pub const IDLE_YIELD_MS: u32 = 1;

/// Source of the monotonic time fed to [`Node::tick`].
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub struct Node<L, T: Transport, P> {
    config: Config,
    link: L,
    transport: T,
    inbox: Inbox,
    connectivity: Connectivity<T::Client>,
    router: Router,
    mode: ActuatorMode,
    actuator: Actuator<P>,
    counter: HeartbeatCounter,
    heartbeat: Heartbeat,
    link_attached: bool,
}

impl<L, T, P> Node<L, T, P>
where
    L: Link,
    T: Transport,
    P: OutputPin,
{
    pub fn new(config: Config, link: L, transport: T, pin: P) -> Self {
        info!(
            "node {} starting, broker {}:{}",
            config.client_id, config.broker, config.port
        );
        Self {
            heartbeat: Heartbeat::new(config.heartbeat_interval),
            config,
            link,
            transport,
            inbox: Inbox::new(),
            connectivity: Connectivity::new(),
            router: Router::new(),
            mode: ActuatorMode::Off,
            actuator: Actuator::new(pin),
            counter: HeartbeatCounter::new(),
            link_attached: false,
        }
    }

    /// Runs one iteration of the loop at time `now`.
    pub fn tick(&mut self, now: Instant) {
        self.poll(now);
        self.connectivity
            .advance(&mut self.transport, &self.link, &self.config, now);
        self.actuator.render(self.mode, now);
        self.emit_heartbeat(now);
    }

    pub fn state(&self) -> ConnectivityState {
        self.connectivity.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity.is_connected()
    }

    pub fn mode(&self) -> ActuatorMode {
        self.mode
    }

    pub fn counter(&self) -> HeartbeatCounter {
        self.counter
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn actuator(&self) -> &Actuator<P> {
        &self.actuator
    }

    fn poll(&mut self, now: Instant) {
        self.link.poll(now);
        self.track_link(now);
        self.connectivity.poll_client(now, &mut self.inbox);
        while let Some(event) = self.inbox.pop() {
            self.handle_event(event, now);
        }
    }

    fn track_link(&mut self, now: Instant) {
        let attached = self.link.is_attached();
        if attached == self.link_attached {
            return;
        }
        self.link_attached = attached;

        if attached {
            match self.link.address() {
                Some(address) => info!("link up, address {}", address),
                None => info!("link up"),
            }
            self.actuator.signal(Signal::LINK_UP, now);
        } else {
            warn!("link down");
            self.connectivity.on_link_lost(now);
        }
    }

    fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Connection(status) => {
                let transition = self
                    .connectivity
                    .on_connection_status(status, &self.config, now);
                if transition == Transition::Connected {
                    self.actuator.signal(Signal::CONNECTED, now);
                }
            }
            TransportEvent::TopicAnnounced { topic, total_len } => {
                self.router.on_topic(&topic, total_len, &self.config.topics);
            }
            TransportEvent::PayloadChunk { data, last } => {
                self.router
                    .on_chunk(&data, last, &mut self.mode, &mut self.counter);
            }
            TransportEvent::Subscribed { packet_id, granted } => match granted {
                Some(qos) => debug!("subscription {} granted at {:?}", packet_id, qos),
                None => warn!("subscription {} refused by broker", packet_id),
            },
            TransportEvent::Published { packet_id } => {
                trace!("publish {} acknowledged", packet_id)
            }
        }
    }

    fn emit_heartbeat(&mut self, now: Instant) {
        if !self.connectivity.is_connected() || !self.heartbeat.is_due(now) {
            return;
        }
        let payload = self.counter.payload();
        let request = PublishRequest {
            topic: self.config.topics.heartbeat,
            payload: payload.as_bytes(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };
        match self.connectivity.publish(&request) {
            Ok(()) => {
                debug!("heartbeat: {}", payload.as_str());
                self.counter.increment();
                self.heartbeat.mark(now);
            }
            // Retried on the next tick.
            Err(e) => debug!("heartbeat deferred: {}", e),
        }
    }
}

/// Runs the node forever.
pub async fn run<L, T, P, C, D>(node: &mut Node<L, T, P>, clock: &C, delay: &mut D) -> !
where
    L: Link,
    T: Transport,
    P: OutputPin,
    C: Clock,
    D: DelayNs,
{
    loop {
        node.tick(clock.now());
        delay.delay_ms(IDLE_YIELD_MS).await;
    }
}
