//! # Loopback Room
//!
//! An in-memory stand-in for a relay server with a message cache. Every
//! peer has a FIFO inbox; cached events are replayed to peers that join
//! later. Used by the multi-peer tests and by headless tools.

use std::collections::{BTreeMap, VecDeque};

use revenant_shared::OwnerId;

use crate::protocol::FieldBag;
use crate::transport::{Caching, InboundEvent, OutboundEvent, Receivers, Transport};

#[derive(Clone, Debug)]
struct CachedEvent {
    sender: OwnerId,
    code: u8,
    payload: Vec<u8>,
}

/// A room of peers exchanging events in memory.
#[derive(Debug, Default)]
pub struct LoopbackRoom {
    inboxes: BTreeMap<OwnerId, VecDeque<InboundEvent>>,
    cache: Vec<CachedEvent>,
}

impl LoopbackRoom {
    /// Creates an empty room.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer and queues every cached event for it, oldest first.
    ///
    /// Joining twice does nothing.
    pub fn join(&mut self, peer: OwnerId) {
        if self.inboxes.contains_key(&peer) {
            tracing::warn!("Peer {} joined twice", peer);
            return;
        }
        let inbox: VecDeque<InboundEvent> = self
            .cache
            .iter()
            .map(|cached| InboundEvent {
                code: cached.code,
                payload: cached.payload.clone(),
                sender: cached.sender,
            })
            .collect();
        tracing::info!("Peer {} joined, replaying {} cached events", peer, inbox.len());
        self.inboxes.insert(peer, inbox);
    }

    /// Removes a peer, its undelivered events and everything it cached.
    pub fn leave(&mut self, peer: OwnerId) {
        if self.inboxes.remove(&peer).is_none() {
            return;
        }
        let before = self.cache.len();
        self.cache.retain(|cached| cached.sender != peer);
        tracing::info!("Peer {} left, {} cached events dropped", peer, before - self.cache.len());
    }

    /// Whether `peer` is in the room.
    #[must_use]
    pub fn is_member(&self, peer: OwnerId) -> bool {
        self.inboxes.contains_key(&peer)
    }

    /// Peers in the room, in id order.
    pub fn peers(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.inboxes.keys().copied()
    }

    /// Number of events held in the cache.
    #[inline]
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of events waiting for `peer`.
    #[must_use]
    pub fn pending(&self, peer: OwnerId) -> usize {
        self.inboxes.get(&peer).map_or(0, VecDeque::len)
    }

    /// Takes every event waiting for `peer`, oldest first.
    pub fn drain_inbox(&mut self, peer: OwnerId) -> Vec<InboundEvent> {
        self.inboxes
            .get_mut(&peer)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// Raises an event on behalf of `sender`.
    pub fn raise(&mut self, sender: OwnerId, event: OutboundEvent) {
        if !self.is_member(sender) {
            tracing::warn!("Dropping event {} from non-member {}", event.code, sender);
            return;
        }

        match event.caching {
            Caching::RemoveFromCache => {
                self.remove_cached(event.code, &event.payload);
                return;
            }
            Caching::AddToCache => self.cache.push(CachedEvent {
                sender,
                code: event.code,
                payload: event.payload.clone(),
            }),
            Caching::DoNotCache => {}
        }

        for (&peer, inbox) in &mut self.inboxes {
            if peer == sender && event.receivers == Receivers::Others {
                continue;
            }
            inbox.push_back(InboundEvent {
                code: event.code,
                payload: event.payload.clone(),
                sender,
            });
        }
    }

    /// A [`Transport`] raising events as `peer`.
    pub fn link(&mut self, peer: OwnerId) -> PeerLink<'_> {
        PeerLink { room: self, peer }
    }

    fn remove_cached(&mut self, code: u8, filter: &[u8]) {
        let filter = match FieldBag::parse(filter) {
            Ok(filter) => filter,
            Err(err) => {
                tracing::warn!("Ignoring malformed cache filter: {}", err);
                return;
            }
        };
        let before = self.cache.len();
        self.cache.retain(|cached| {
            cached.code != code
                || !FieldBag::parse(&cached.payload).is_ok_and(|fields| fields.contains_all(&filter))
        });
        tracing::debug!("Cache filter removed {} events", before - self.cache.len());
    }
}

/// One peer's view of a [`LoopbackRoom`].
#[derive(Debug)]
pub struct PeerLink<'a> {
    room: &'a mut LoopbackRoom,
    peer: OwnerId,
}

impl Transport for PeerLink<'_> {
    fn raise(&mut self, event: OutboundEvent) {
        self.room.raise(self.peer, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WireWriter;

    const A: OwnerId = OwnerId(1);
    const B: OwnerId = OwnerId(2);
    const C: OwnerId = OwnerId(3);

    fn keyed(token: u32, caching: Caching) -> OutboundEvent {
        let mut writer = WireWriter::new();
        assert!(writer.write_field(1, |w| w.write_u32(token)));
        OutboundEvent {
            code: 199,
            payload: writer.into_bytes(),
            caching,
            receivers: Receivers::Others,
        }
    }

    #[test]
    fn test_others_excludes_sender() {
        let mut room = LoopbackRoom::new();
        room.join(A);
        room.join(B);
        room.raise(A, keyed(1, Caching::DoNotCache));

        assert_eq!(room.pending(A), 0);
        let events = room.drain_inbox(B);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sender, A);
    }

    #[test]
    fn test_late_joiner_gets_cached_events_in_order() {
        let mut room = LoopbackRoom::new();
        room.join(A);
        room.raise(A, keyed(1, Caching::AddToCache));
        room.raise(A, keyed(2, Caching::DoNotCache));
        room.raise(A, keyed(3, Caching::AddToCache));

        room.join(B);
        let replayed = room.drain_inbox(B);
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].payload, keyed(1, Caching::AddToCache).payload);
        assert_eq!(replayed[1].payload, keyed(3, Caching::AddToCache).payload);
    }

    #[test]
    fn test_remove_from_cache_matches_fields() {
        let mut room = LoopbackRoom::new();
        room.join(A);
        room.join(B);
        room.raise(A, keyed(1, Caching::AddToCache));
        room.raise(A, keyed(2, Caching::AddToCache));
        room.drain_inbox(B);

        room.raise(B, keyed(1, Caching::RemoveFromCache));
        assert_eq!(room.cached_len(), 1);
        // Removal directives are not delivered.
        assert_eq!(room.pending(A), 0);

        room.join(C);
        assert_eq!(room.drain_inbox(C)[0].payload, keyed(2, Caching::AddToCache).payload);
    }

    #[test]
    fn test_leave_drops_cached_events() {
        let mut room = LoopbackRoom::new();
        room.join(A);
        room.join(B);
        room.raise(A, keyed(1, Caching::AddToCache));
        room.raise(B, keyed(2, Caching::AddToCache));

        room.leave(A);
        assert!(!room.is_member(A));
        assert_eq!(room.cached_len(), 1);
        assert_eq!(room.peers().collect::<Vec<_>>(), vec![B]);
    }

    #[test]
    fn test_non_member_events_are_dropped() {
        let mut room = LoopbackRoom::new();
        room.join(B);
        room.raise(A, keyed(1, Caching::AddToCache));
        assert_eq!(room.cached_len(), 0);
        assert_eq!(room.pending(B), 0);
    }

    #[test]
    fn test_link_raises_as_peer() {
        let mut room = LoopbackRoom::new();
        room.join(A);
        room.join(B);
        room.link(B).raise(keyed(5, Caching::DoNotCache));
        assert_eq!(room.drain_inbox(A)[0].sender, B);
    }
}
