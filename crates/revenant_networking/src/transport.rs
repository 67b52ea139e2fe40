//! # Transport Seam
//!
//! The replication layer never talks to a network. It pushes
//! [`OutboundEvent`]s onto an [`OutboundQueue`]; whatever transport the
//! application uses drains the queue and calls back with [`InboundEvent`]s.
//!
//! The transport must deliver events from one sender in the order they were
//! raised, and replay cached events to peers that join later.

use revenant_shared::OwnerId;

/// What the transport's message cache does with an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Caching {
    /// Deliver only.
    DoNotCache,
    /// Deliver and keep for peers joining later.
    AddToCache,
    /// Remove every cached event matching the payload's fields. Not delivered.
    RemoveFromCache,
}

/// Who receives an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Receivers {
    /// Every peer except the sender.
    Others,
    /// Every peer including the sender.
    All,
}

/// An event for the transport to raise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundEvent {
    /// Event code.
    pub code: u8,
    /// Encoded body.
    pub payload: Vec<u8>,
    /// Cache directive.
    pub caching: Caching,
    /// Receiver group.
    pub receivers: Receivers,
}

/// An event delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    /// Event code.
    pub code: u8,
    /// Encoded body.
    pub payload: Vec<u8>,
    /// Peer that raised it.
    pub sender: OwnerId,
}

/// Sink for outbound events.
pub trait Transport {
    /// Raises one event. Fire-and-forget.
    fn raise(&mut self, event: OutboundEvent);
}

/// FIFO of events waiting for the transport.
///
/// Backed by an unbounded crossbeam channel, so a transport on another
/// thread can hold a [`OutboundQueue::receiver`] and drain it directly.
#[derive(Debug)]
pub struct OutboundQueue {
    sender: crossbeam_channel::Sender<OutboundEvent>,
    receiver: crossbeam_channel::Receiver<OutboundEvent>,
}

impl OutboundQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Appends an event.
    pub fn push(&self, event: OutboundEvent) {
        // The queue owns a receiver, so the channel is never disconnected.
        let _ = self.sender.send(event);
    }

    /// Number of queued events.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Takes every queued event, oldest first.
    pub fn drain(&self) -> Vec<OutboundEvent> {
        self.receiver.try_iter().collect()
    }

    /// Discards every queued event.
    pub fn clear(&self) {
        for _ in self.receiver.try_iter() {}
    }

    /// Gets a clone of the receiver for another thread.
    #[must_use]
    pub fn receiver(&self) -> crossbeam_channel::Receiver<OutboundEvent> {
        self.receiver.clone()
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(byte: u8) -> OutboundEvent {
        OutboundEvent {
            code: 199,
            payload: vec![byte],
            caching: Caching::DoNotCache,
            receivers: Receivers::Others,
        }
    }

    #[test]
    fn test_queue_is_fifo() {
        let queue = OutboundQueue::new();
        queue.push(event(1));
        queue.push(event(2));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained, vec![event(1), event(2)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_receiver_drains_from_another_thread() {
        let queue = OutboundQueue::new();
        let receiver = queue.receiver();
        queue.push(event(7));

        let handle = std::thread::spawn(move || receiver.try_recv().ok());
        assert_eq!(handle.join().unwrap(), Some(event(7)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let queue = OutboundQueue::default();
        queue.push(event(1));
        queue.clear();
        assert!(queue.drain().is_empty());
    }
}
