//! # Message Router
//!
//! Inbound messages arrive in two phases: the transport first announces the topic, then hands
//! over the payload in one or more chunks. The router keeps the topic classified at the
//! announcement, reassembles the payload, and only acts once the last chunk is in.

use heapless::Vec;

use crate::actuator::ActuatorMode;
use crate::config::Topics;
use crate::heartbeat::HeartbeatCounter;

/// Longest payload that can still be a command. Anything longer is ignored unread.
pub const MAX_COMMAND_LEN: usize = 32;

/// Subjects the node understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Topic {
    /// Anything unrecognised, including topics added after this firmware shipped.
    #[default]
    None,
    Actuator,
    Counter,
}

impl Topic {
    /// Maps a wire topic onto a subject. Exact, case-sensitive comparison.
    pub fn classify(topic: &str, topics: &Topics) -> Topic {
        if topic == topics.actuator {
            Topic::Actuator
        } else if topic == topics.counter {
            Topic::Counter
        } else {
            Topic::None
        }
    }
}

/// A recognised control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    SetMode(ActuatorMode),
    ResetCounter,
}

impl Command {
    pub fn parse(topic: Topic, payload: &[u8]) -> Option<Command> {
        match topic {
            Topic::None => None,
            Topic::Actuator => ActuatorMode::from_command(payload).map(Command::SetMode),
            Topic::Counter => (payload == b"RESET").then_some(Command::ResetCounter),
        }
    }

    pub fn apply(self, mode: &mut ActuatorMode, counter: &mut HeartbeatCounter) {
        match self {
            Command::SetMode(next) => {
                *mode = next;
                info!("actuator mode -> {}", next.as_str());
            }
            Command::ResetCounter => {
                counter.reset();
                info!("heartbeat counter reset");
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Router {
    current: Topic,
    payload: Vec<u8, MAX_COMMAND_LEN>,
    oversized: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// First phase: a message on `topic` carrying `total_len` payload bytes is starting.
    pub fn on_topic(&mut self, topic: &str, total_len: u32, topics: &Topics) {
        self.current = Topic::classify(topic, topics);
        self.payload.clear();
        self.oversized = total_len as usize > MAX_COMMAND_LEN;
        debug!("rx topic {} ({} bytes) -> {:?}", topic, total_len, self.current);
    }

    /// Second phase: a slice of the payload. On the last chunk the whole message is
    /// dispatched and the recognised command, if any, is returned.
    pub fn on_chunk(
        &mut self,
        data: &[u8],
        last: bool,
        mode: &mut ActuatorMode,
        counter: &mut HeartbeatCounter,
    ) -> Option<Command> {
        if self.current != Topic::None
            && !self.oversized
            && self.payload.extend_from_slice(data).is_err()
        {
            self.oversized = true;
        }
        if !last {
            return None;
        }

        let topic = core::mem::take(&mut self.current);
        if topic == Topic::None {
            return None;
        }
        if self.oversized {
            debug!("payload on {:?} too long for a command, ignored", topic);
            return None;
        }
        Self::dispatch(topic, &self.payload, mode, counter)
    }

    /// Acts on one complete message.
    pub fn dispatch(
        topic: Topic,
        payload: &[u8],
        mode: &mut ActuatorMode,
        counter: &mut HeartbeatCounter,
    ) -> Option<Command> {
        let command = Command::parse(topic, payload);
        match command {
            Some(command) => command.apply(mode, counter),
            None => debug!(
                "ignoring payload {:?} on {:?}",
                core::str::from_utf8(payload).unwrap_or("<binary>"),
                topic
            ),
        }
        command
    }
}
