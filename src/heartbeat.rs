//! Periodic liveness reports.

use core::fmt::Write;

use embassy_time::{Duration, Instant};
use heapless::String;

/// Capacity of a formatted heartbeat payload, enough for `alive 4294967295`.
pub const HEARTBEAT_PAYLOAD_LEN: usize = 24;

/// Number of heartbeats sent since boot or since the last `RESET`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeartbeatCounter(u32);

impl HeartbeatCounter {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Text carried by the heartbeat message.
    pub fn payload(&self) -> String<HEARTBEAT_PAYLOAD_LEN> {
        let mut payload = String::new();
        // Cannot overflow: the longest u32 fits with room to spare.
        let _ = write!(payload, "alive {}", self.0);
        payload
    }
}

/// Emission timer for heartbeats.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    interval: Duration,
    last: Instant,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::from_ticks(0),
        }
    }

    /// Whether more than one interval has passed since the last emission.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last) > self.interval
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = now;
    }
}
