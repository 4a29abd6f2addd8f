//! Node configuration.
//!
//! Loaded once at startup and never mutated afterwards. Credentials and the broker address are
//! usually baked in at compile time, see [`Config::from_build_env`].

use core::net::{Ipv4Addr, SocketAddrV4};

use embassy_time::Duration;

use crate::error::RequestError;

/// Wire topics. Part of the compatibility surface with whatever drives the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Topics {
    /// Presence topic: `online` after connecting.
    pub status: &'static str,
    /// Last-will topic: the broker publishes `offline` here after an unclean disconnect.
    pub will: &'static str,
    /// Actuator commands: `ON`, `OFF`, `BLINK FAST`, `BLINK SLOW`.
    pub actuator: &'static str,
    /// Counter commands: `RESET`.
    pub counter: &'static str,
    /// Periodic `alive <n>` reports.
    pub heartbeat: &'static str,
}

impl Topics {
    pub const DEFAULT: Topics = Topics {
        status: "pico/status",
        will: "pico/status",
        actuator: "pico/led",
        counter: "pico/count",
        heartbeat: "pico/heartbeat",
    };
}

impl Default for Topics {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Broker IPv4 address in dotted-decimal form.
    pub broker: &'static str,
    pub port: u16,
    pub client_id: &'static str,
    pub keep_alive_secs: u16,
    pub username: Option<&'static str>,
    pub password: Option<&'static str>,
    /// Minimum spacing between two connect attempts.
    pub retry_interval: Duration,
    pub heartbeat_interval: Duration,
    /// How long a connect attempt may stay unanswered before it is abandoned.
    /// `None` waits forever.
    pub connect_timeout: Option<Duration>,
    pub topics: Topics,
}

impl Config {
    pub const DEFAULT_PORT: u16 = 1883;
    pub const DEFAULT_CLIENT_ID: &'static str = "pico_w_template";
    pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 60;
    pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(5000);
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10_000);
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    pub const fn new(broker: &'static str) -> Self {
        Self {
            broker,
            port: Self::DEFAULT_PORT,
            client_id: Self::DEFAULT_CLIENT_ID,
            keep_alive_secs: Self::DEFAULT_KEEP_ALIVE_SECS,
            username: None,
            password: None,
            retry_interval: Self::DEFAULT_RETRY_INTERVAL,
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: Some(Self::DEFAULT_CONNECT_TIMEOUT),
            topics: Topics::DEFAULT,
        }
    }

    /// Builds the configuration from variables captured at compile time:
    /// `MYRTIO_BROKER`, `MYRTIO_CLIENT_ID`, `MYRTIO_USERNAME` and `MYRTIO_PASSWORD`.
    pub const fn from_build_env() -> Self {
        let broker = match option_env!("MYRTIO_BROKER") {
            Some(broker) => broker,
            None => "192.168.1.1",
        };
        let mut config = Self::new(broker);
        if let Some(client_id) = option_env!("MYRTIO_CLIENT_ID") {
            config.client_id = client_id;
        }
        config.username = option_env!("MYRTIO_USERNAME");
        config.password = option_env!("MYRTIO_PASSWORD");
        config
    }

    /// The broker endpoint. Host names are not resolved, only IPv4 literals are accepted.
    pub fn broker_address(&self) -> Result<SocketAddrV4, RequestError> {
        let ip: Ipv4Addr = self
            .broker
            .parse()
            .map_err(|_| RequestError::InvalidAddress)?;
        Ok(SocketAddrV4::new(ip, self.port))
    }

    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub const fn with_client_id(mut self, client_id: &'static str) -> Self {
        self.client_id = client_id;
        self
    }

    pub const fn with_keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub const fn with_credentials(mut self, username: &'static str, password: &'static str) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub const fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub const fn with_topics(mut self, topics: Topics) -> Self {
        self.topics = topics;
        self
    }
}
