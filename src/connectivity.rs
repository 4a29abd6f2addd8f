//! # Connectivity State Machine
//!
//! Owns the broker client and walks it through
//!
//! ```text
//!             retry interval elapsed             Accepted
//! LinkReady ─────────────────────────▶ BrokerConnecting ─────────▶ BrokerConnected
//!     ▲  │                                 │                          │
//!     │  │ malformed broker address        │ Refused / Failed /       │ Lost /
//!     │  ▼                                 │ watchdog expired         │ link down
//!     │ Error                              │                          │
//!     └────────────────────────────────────┴──────────────────────────┘
//! ```
//!
//! Connect attempts are spaced by the retry interval measured from the previous *attempt*, so a
//! transport that never answers still gets backed off. At most one attempt is outstanding.

use embassy_time::Instant;

use crate::config::Config;
use crate::error::RequestError;
use crate::link::Link;
use crate::packet::{LastWill, QoS};
use crate::transport::{
    ConnectRequest, ConnectionStatus, EventSink, PublishRequest, Transport, TransportClient,
};

/// Presence payload published once the session is up.
pub const ONLINE_PAYLOAD: &[u8] = b"online";
/// Presence payload left with the broker as last will.
pub const OFFLINE_PAYLOAD: &[u8] = b"offline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectivityState {
    LinkReady,
    BrokerConnecting,
    BrokerConnected,
    /// Unrecoverable within this run.
    Error,
}

/// What a connection-status event did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    Connected,
    Disconnected,
    Unchanged,
}

pub struct Connectivity<C> {
    client: Option<C>,
    state: ConnectivityState,
    last_retry: Instant,
    connecting_since: Instant,
}

impl<C> Default for Connectivity<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Connectivity<C> {
    pub const fn new() -> Self {
        Self {
            client: None,
            state: ConnectivityState::LinkReady,
            last_retry: Instant::from_ticks(0),
            connecting_since: Instant::from_ticks(0),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Derived from the state, so it can never disagree with it.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectivityState::BrokerConnected
    }

    /// Time of the latest connect attempt or failure.
    pub fn last_retry(&self) -> Instant {
        self.last_retry
    }

    pub fn client(&self) -> Option<&C> {
        self.client.as_ref()
    }

    pub fn client_mut(&mut self) -> Option<&mut C> {
        self.client.as_mut()
    }
}

impl<C: TransportClient> Connectivity<C> {
    /// Time-gated step, run once per tick.
    pub fn advance<T, L>(&mut self, transport: &mut T, link: &L, config: &Config, now: Instant)
    where
        T: Transport<Client = C>,
        L: Link,
    {
        match self.state {
            ConnectivityState::LinkReady => {
                if link.is_attached()
                    && now.saturating_duration_since(self.last_retry) > config.retry_interval
                {
                    self.try_connect(transport, config, now);
                }
            }
            ConnectivityState::BrokerConnecting => {
                if let Some(timeout) = config.connect_timeout
                    && now.saturating_duration_since(self.connecting_since) > timeout
                {
                    warn!(
                        "broker did not answer within {} ms, abandoning attempt",
                        timeout.as_millis()
                    );
                    if let Some(client) = self.client.as_mut() {
                        client.disconnect();
                    }
                    self.fall_back(now);
                }
            }
            ConnectivityState::BrokerConnected | ConnectivityState::Error => {}
        }
    }

    /// Issues a connect request. A no-op unless the state is `LinkReady`.
    pub fn try_connect<T>(&mut self, transport: &mut T, config: &Config, now: Instant)
    where
        T: Transport<Client = C>,
    {
        if self.state != ConnectivityState::LinkReady {
            return;
        }

        let broker = match config.broker_address() {
            Ok(broker) => broker,
            Err(e) => {
                error!("{}: {:?}", e, config.broker);
                self.state = ConnectivityState::Error;
                return;
            }
        };
        self.last_retry = now;

        if self.client.is_none() {
            match transport.create_client() {
                Ok(client) => self.client = Some(client),
                Err(e) => {
                    warn!("could not create broker client: {}", e);
                    return;
                }
            }
        }
        let Some(client) = self.client.as_mut() else {
            return;
        };

        let request = ConnectRequest {
            broker,
            client_id: config.client_id,
            keep_alive_secs: config.keep_alive_secs,
            will: Some(LastWill {
                topic: config.topics.will,
                payload: OFFLINE_PAYLOAD,
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            username: config.username,
            password: config.password.map(str::as_bytes),
        };

        info!("connecting to {} as {}", broker, config.client_id);
        match client.connect(&request) {
            Ok(()) => {
                self.state = ConnectivityState::BrokerConnecting;
                self.connecting_since = now;
            }
            Err(e) => warn!("connect request failed: {}", e),
        }
    }

    /// Applies the transport's connection-status callback.
    pub fn on_connection_status(
        &mut self,
        status: ConnectionStatus,
        config: &Config,
        now: Instant,
    ) -> Transition {
        match (self.state, status) {
            (ConnectivityState::BrokerConnecting, ConnectionStatus::Accepted) => {
                info!("broker connected");
                self.state = ConnectivityState::BrokerConnected;
                self.start_session(config);
                Transition::Connected
            }
            (
                ConnectivityState::BrokerConnecting | ConnectivityState::BrokerConnected,
                ConnectionStatus::Refused(_) | ConnectionStatus::Failed | ConnectionStatus::Lost,
            ) => {
                warn!("broker connection down: {:?}", status);
                self.fall_back(now);
                Transition::Disconnected
            }
            (state, status) => {
                debug!("ignoring {:?} while {:?}", status, state);
                Transition::Unchanged
            }
        }
    }

    /// The link went away underneath an attempt or a session.
    pub fn on_link_lost(&mut self, now: Instant) {
        if matches!(
            self.state,
            ConnectivityState::BrokerConnecting | ConnectivityState::BrokerConnected
        ) {
            if let Some(client) = self.client.as_mut() {
                client.disconnect();
            }
            self.fall_back(now);
        }
    }

    /// Publishes through the session, if there is one.
    pub fn publish(&mut self, request: &PublishRequest<'_>) -> Result<(), RequestError> {
        match self.client.as_mut() {
            Some(client) if self.state == ConnectivityState::BrokerConnected => {
                client.publish(request)
            }
            _ => Err(RequestError::NotConnected),
        }
    }

    /// Lets the client move bytes and report events.
    pub fn poll_client(&mut self, now: Instant, events: &mut dyn EventSink) {
        if let Some(client) = self.client.as_mut() {
            client.poll(now, events);
        }
    }

    fn fall_back(&mut self, now: Instant) {
        self.state = ConnectivityState::LinkReady;
        self.last_retry = now;
    }

    /// Subscriptions and presence announcement, once per accepted session.
    fn start_session(&mut self, config: &Config) {
        let Some(client) = self.client.as_mut() else {
            return;
        };
        for topic in [config.topics.actuator, config.topics.counter] {
            if let Err(e) = client.subscribe(topic, QoS::AtMostOnce) {
                warn!("subscribe to {} failed: {}", topic, e);
            }
        }
        let presence = PublishRequest {
            topic: config.topics.status,
            payload: ONLINE_PAYLOAD,
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        if let Err(e) = client.publish(&presence) {
            warn!("presence publish failed: {}", e);
        }
    }
}
