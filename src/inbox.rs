//! Event inbox between the transport and the node.

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use crate::transport::{ConnectionStatus, EventSink, TransportEvent};

/// Number of transport events that can wait for the next drain.
pub const INBOX_DEPTH: usize = 16;

pub type EventChannel = Channel<NoopRawMutex, TransportEvent, INBOX_DEPTH>;

/// Queue of transport events filled during the poll step and drained right after it.
///
/// Everything runs on the tick's thread, so the channel needs no real locking.
///
/// Connection status bypasses the channel and sits in its own slot, so a burst of messages can
/// never push it out. It is handed out after the queued events, since a client reports at most
/// one status per poll and nothing follows a lost session.
pub struct Inbox {
    channel: EventChannel,
    status: Option<ConnectionStatus>,
}

impl Inbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            status: None,
        }
    }

    /// Take the oldest pending event.
    pub fn pop(&mut self) -> Option<TransportEvent> {
        self.channel
            .try_receive()
            .ok()
            .or_else(|| self.status.take().map(TransportEvent::Connection))
    }

    pub fn len(&self) -> usize {
        self.channel.len() + usize::from(self.status.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty() && self.status.is_none()
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for Inbox {
    fn push(&mut self, event: TransportEvent) -> bool {
        if let TransportEvent::Connection(status) = event {
            if let Some(previous) = self.status.replace(status) {
                debug!("connection status {:?} superseded by {:?}", previous, status);
            }
            return true;
        }
        if self.channel.try_send(event).is_err() {
            warn!("inbox full, dropping transport event");
            return false;
        }
        true
    }

    fn room(&self) -> usize {
        INBOX_DEPTH - self.channel.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_come_out_in_arrival_order() {
        let mut inbox = Inbox::new();
        assert!(inbox.push(TransportEvent::Published { packet_id: 1 }));
        assert!(inbox.push(TransportEvent::Published { packet_id: 2 }));
        assert_eq!(inbox.len(), 2);

        assert_eq!(inbox.pop(), Some(TransportEvent::Published { packet_id: 1 }));
        assert_eq!(inbox.pop(), Some(TransportEvent::Published { packet_id: 2 }));
        assert_eq!(inbox.pop(), None);
    }

    #[test]
    fn overflow_drops_newest() {
        let mut inbox = Inbox::new();
        for id in 0..INBOX_DEPTH as u16 {
            assert!(inbox.push(TransportEvent::Published { packet_id: id }));
        }
        assert_eq!(inbox.room(), 0);
        assert!(!inbox.push(TransportEvent::Published { packet_id: 99 }));
        assert_eq!(inbox.pop(), Some(TransportEvent::Published { packet_id: 0 }));
        assert_eq!(inbox.room(), 1);
    }

    #[test]
    fn connection_status_survives_a_full_queue() {
        let mut inbox = Inbox::new();
        for id in 0..INBOX_DEPTH as u16 {
            inbox.push(TransportEvent::Published { packet_id: id });
        }
        assert!(inbox.push(TransportEvent::Connection(ConnectionStatus::Lost)));
        assert_eq!(inbox.len(), INBOX_DEPTH + 1);

        for id in 0..INBOX_DEPTH as u16 {
            assert_eq!(inbox.pop(), Some(TransportEvent::Published { packet_id: id }));
        }
        assert_eq!(
            inbox.pop(),
            Some(TransportEvent::Connection(ConnectionStatus::Lost))
        );
        assert!(inbox.is_empty());
    }

    #[test]
    fn latest_connection_status_wins() {
        let mut inbox = Inbox::new();
        inbox.push(TransportEvent::Connection(ConnectionStatus::Accepted));
        inbox.push(TransportEvent::Connection(ConnectionStatus::Lost));
        assert_eq!(
            inbox.pop(),
            Some(TransportEvent::Connection(ConnectionStatus::Lost))
        );
        assert_eq!(inbox.pop(), None);
    }
}
