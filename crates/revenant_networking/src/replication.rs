//! # Replication Manager
//!
//! Turns creations and destructions into transport events and keeps one
//! cached entry per live replicated token.
//!
//! ## Event Flow
//!
//! ```text
//! create:  cache entry ──► Create*  (AddToCache, Others)
//! destroy: drop entry  ──► filter   (RemoveFromCache)
//!                      ──► Destroy  (DoNotCache, Others)
//! ```
//!
//! Entries for remote creations are kept too, so any peer may destroy any
//! replicated entity and still clear its cached create from the room.

use std::collections::HashMap;

use revenant_core::Relation;
use revenant_shared::{InstantiationRecord, OwnerId, TokenId, REPLICATION_EVENT_CODE};

use crate::error::{ReplicationError, ReplicationResult, WireResult};
use crate::protocol::events::cache_filter;
use crate::protocol::ReplicationEvent;
use crate::transport::{Caching, InboundEvent, OutboundEvent, OutboundQueue, Receivers};

#[derive(Clone, Debug)]
struct CachedEntry {
    sequence: u64,
    record: InstantiationRecord,
    relation: Relation,
}

/// Replication cache plus the outbound queue it feeds.
#[derive(Debug, Default)]
pub struct ReplicationManager {
    cache: HashMap<TokenId, CachedEntry>,
    next_sequence: u64,
    outbound: OutboundQueue,
}

impl ReplicationManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing is cached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Whether `token` has a cached entry.
    #[must_use]
    pub fn is_cached(&self, token: TokenId) -> bool {
        self.cache.contains_key(&token)
    }

    /// The cached record of `token`.
    #[must_use]
    pub fn cached_record(&self, token: TokenId) -> Option<&InstantiationRecord> {
        self.cache.get(&token).map(|entry| &entry.record)
    }

    /// The queue the transport drains.
    #[must_use]
    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    /// Takes every queued outbound event, oldest first.
    pub fn drain_outbound(&self) -> Vec<OutboundEvent> {
        self.outbound.drain()
    }

    /// Caches `record` and queues its create for every other peer.
    ///
    /// Nothing is cached or queued if the record does not encode.
    ///
    /// # Errors
    ///
    /// The encoding error.
    pub fn broadcast_create(&mut self, record: &InstantiationRecord, relation: Relation) -> WireResult<()> {
        let event = ReplicationEvent::Create {
            record: record.clone(),
            relation,
        };
        let payload = event.encode()?;

        self.insert(record.clone(), relation);
        self.outbound.push(OutboundEvent {
            code: REPLICATION_EVENT_CODE,
            payload,
            caching: Caching::AddToCache,
            receivers: Receivers::Others,
        });
        tracing::debug!("Broadcast {:?} of token {}", event.method(), record.token);
        Ok(())
    }

    /// Drops the cached entry of `token` and queues its destroy.
    ///
    /// A token with no cached entry is an anomaly; it is logged and the
    /// destroy is still queued.
    ///
    /// # Errors
    ///
    /// The encoding error. Nothing changes in that case.
    pub fn broadcast_destroy(&mut self, token: TokenId) -> WireResult<()> {
        let destroy = ReplicationEvent::Destroy { token }.encode()?;
        let filter = cache_filter(token)?;

        if self.cache.remove(&token).is_some() {
            self.outbound.push(OutboundEvent {
                code: REPLICATION_EVENT_CODE,
                payload: filter,
                caching: Caching::RemoveFromCache,
                receivers: Receivers::Others,
            });
        } else {
            tracing::warn!("Destroy of token {} has no cached create, cache left as is", token);
        }

        self.outbound.push(OutboundEvent {
            code: REPLICATION_EVENT_CODE,
            payload: destroy,
            caching: Caching::DoNotCache,
            receivers: Receivers::Others,
        });
        tracing::debug!("Broadcast destroy of token {}", token);
        Ok(())
    }

    /// Caches a create applied from another peer. Nothing is queued.
    pub fn record_remote(&mut self, record: InstantiationRecord, relation: Relation) {
        self.insert(record, relation);
    }

    /// Drops the cached entry of `token` without queueing anything.
    pub fn forget(&mut self, token: TokenId) -> bool {
        self.cache.remove(&token).is_some()
    }

    /// Drops every cached entry owned by `owner`. Returns how many.
    pub fn forget_owner(&mut self, owner: OwnerId) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.record.owner != owner);
        before - self.cache.len()
    }

    /// Decodes an inbound replication event.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::UnexpectedEventCode`] for other codes, or the
    /// decoding error.
    pub fn decode_inbound(&self, event: &InboundEvent) -> ReplicationResult<ReplicationEvent> {
        if event.code != REPLICATION_EVENT_CODE {
            return Err(ReplicationError::UnexpectedEventCode(event.code));
        }
        Ok(ReplicationEvent::decode(&event.payload)?)
    }

    /// Re-encodes every cached create, in the order they were cached.
    ///
    /// Every peer holds the same entries, so a transport without a message
    /// cache can have any one peer replay these to a newcomer.
    ///
    /// # Errors
    ///
    /// The first encoding error.
    pub fn cached_events(&self) -> WireResult<Vec<Vec<u8>>> {
        let mut entries: Vec<&CachedEntry> = self.cache.values().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
            .into_iter()
            .map(|entry| {
                ReplicationEvent::Create {
                    record: entry.record.clone(),
                    relation: entry.relation,
                }
                .encode()
            })
            .collect()
    }

    /// Drops every cached entry and queued event.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.outbound.clear();
        self.next_sequence = 0;
    }

    fn insert(&mut self, record: InstantiationRecord, relation: Relation) {
        let token = record.token;
        let entry = CachedEntry {
            sequence: self.next_sequence,
            record,
            relation,
        };
        self.next_sequence += 1;
        if self.cache.insert(token, entry).is_some() {
            tracing::warn!("Replaced cached create of token {}", token);
        }
    }
}
