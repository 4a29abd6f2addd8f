//! # Actuator State Machine
//!
//! A single digital output (the on-board LED on a Pico W) driven by a small mode enum. The
//! renderer runs once per tick, never waits, and decides from timestamps alone whether the
//! output has to change.

use embassy_time::{Duration, Instant};
use embedded_hal::digital::{OutputPin, PinState};

/// Half-period of [`ActuatorMode::BlinkFast`].
pub const BLINK_FAST_PERIOD: Duration = Duration::from_millis(100);
/// Half-period of [`ActuatorMode::BlinkSlow`].
pub const BLINK_SLOW_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActuatorMode {
    #[default]
    Off,
    On,
    BlinkFast,
    BlinkSlow,
}

impl ActuatorMode {
    /// Parses a control payload. Matching is exact and case-sensitive.
    pub fn from_command(payload: &[u8]) -> Option<Self> {
        match payload {
            b"ON" => Some(ActuatorMode::On),
            b"OFF" => Some(ActuatorMode::Off),
            b"BLINK FAST" => Some(ActuatorMode::BlinkFast),
            b"BLINK SLOW" => Some(ActuatorMode::BlinkSlow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorMode::Off => "OFF",
            ActuatorMode::On => "ON",
            ActuatorMode::BlinkFast => "BLINK FAST",
            ActuatorMode::BlinkSlow => "BLINK SLOW",
        }
    }
}

/// A one-shot blink pattern shown on top of the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub pulses: u8,
    /// Length of each on and each off phase.
    pub period: Duration,
}

impl Signal {
    /// Shown once the link comes up.
    pub const LINK_UP: Signal = Signal {
        pulses: 1,
        period: Duration::from_millis(200),
    };
    /// Shown once the broker accepts the session.
    pub const CONNECTED: Signal = Signal {
        pulses: 2,
        period: Duration::from_millis(100),
    };
}

pub struct Actuator<P> {
    pin: P,
    level: bool,
    last_toggle: Instant,
    signal: Option<(Signal, Instant)>,
}

impl<P: OutputPin> Actuator<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            level: false,
            last_toggle: Instant::from_ticks(0),
            signal: None,
        }
    }

    /// Starts a one-shot pattern. It overrides the mode until it has played out.
    pub fn signal(&mut self, signal: Signal, now: Instant) {
        self.signal = Some((signal, now));
    }

    pub fn is_signalling(&self) -> bool {
        self.signal.is_some()
    }

    /// Drives the output for `mode` at time `now`.
    pub fn render(&mut self, mode: ActuatorMode, now: Instant) {
        if let Some((signal, started)) = self.signal {
            let period = signal.period.as_ticks().max(1);
            let phase = now.saturating_duration_since(started).as_ticks() / period;
            if phase < 2 * u64::from(signal.pulses) {
                self.drive(phase % 2 == 0);
                return;
            }
            self.signal = None;
        }

        match mode {
            ActuatorMode::Off => self.drive(false),
            ActuatorMode::On => self.drive(true),
            ActuatorMode::BlinkFast => self.blink(BLINK_FAST_PERIOD, now),
            ActuatorMode::BlinkSlow => self.blink(BLINK_SLOW_PERIOD, now),
        }
    }

    /// Current output level.
    pub fn level(&self) -> bool {
        self.level
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }

    fn blink(&mut self, period: Duration, now: Instant) {
        if now.saturating_duration_since(self.last_toggle) > period {
            self.drive(!self.level);
            self.last_toggle = now;
        }
    }

    fn drive(&mut self, high: bool) {
        self.level = high;
        if let Err(e) = self.pin.set_state(PinState::from(high)) {
            warn!("actuator pin write failed: {:?}", e);
        }
    }
}
