//! # Replicated Pool Session
//!
//! The entry point applications use. A [`Session`] owns the pool state, the
//! replication manager, the entity host and the prototype source for one
//! connection to one room.
//!
//! ## Threading
//!
//! A `Session` is driven from one thread: local calls and
//! [`Session::handle_event`] interleave but never overlap. Embeddings that
//! must touch it from several threads use [`SharedSession`], which holds the
//! whole allocate, lease and register path under one lock.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use revenant_core::{
    EntityHandle, EntityHost, LocalCreate, PoolError, PoolState, PoolToken, PoolingConfig, PrototypeSource, Relation,
    Release,
};
use revenant_shared::{Category, OwnerId, Placement, TokenId, Value};

use crate::error::ReplicationResult;
use crate::protocol::ReplicationEvent;
use crate::replication::ReplicationManager;
use crate::transport::{InboundEvent, OutboundEvent, Transport};

/// Source of this peer's identity.
pub trait IdentitySource {
    /// Numeric id of the local peer.
    fn current_owner_id(&self) -> OwnerId;
}

impl IdentitySource for OwnerId {
    fn current_owner_id(&self) -> OwnerId {
        *self
    }
}

/// What applying an inbound event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// A remote create was leased locally.
    Created(EntityHandle),
    /// A remote destroy released this entity.
    Destroyed(EntityHandle),
    /// Nothing to do: a duplicate create or an already removed token.
    Ignored,
}

/// Pool state, replication and collaborators of one peer.
pub struct Session<H, P> {
    state: PoolState,
    replication: ReplicationManager,
    host: H,
    prototypes: P,
}

impl<H: EntityHost, P: PrototypeSource> Session<H, P> {
    /// Starts a session for the local peer and preloads configured pools.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or a preloaded prototype that does not resolve.
    pub fn start(config: PoolingConfig, identity: &impl IdentitySource, host: H, prototypes: P) -> ReplicationResult<Self> {
        let owner = identity.current_owner_id();
        let state = PoolState::new(config, owner)?;
        let mut session = Self {
            state,
            replication: ReplicationManager::new(),
            host,
            prototypes,
        };
        session.state.preload(&session.prototypes, &mut session.host)?;
        tracing::info!(
            "Session started for owner {} with {} preloaded pools",
            owner,
            session.state.directory().len()
        );
        Ok(session)
    }

    /// Identity of this peer.
    #[inline]
    #[must_use]
    pub fn local_owner(&self) -> OwnerId {
        self.state.local_owner()
    }

    /// Pool state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &PoolState {
        &self.state
    }

    /// Replication cache and outbound queue.
    #[inline]
    #[must_use]
    pub fn replication(&self) -> &ReplicationManager {
        &self.replication
    }

    /// The entity host.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The entity host, mutably.
    #[inline]
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The prototype source.
    #[inline]
    #[must_use]
    pub fn prototypes(&self) -> &P {
        &self.prototypes
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Creates an entity that never leaves this peer.
    ///
    /// # Errors
    ///
    /// Allocation or lease errors.
    pub fn local_instantiate(&mut self, prototype: &str, placement: Placement, payload: Vec<Value>) -> ReplicationResult<EntityHandle> {
        self.instantiate(LocalCreate::new(prototype, placement, Category::Local).with_payload(payload))
    }

    /// Creates an entity replicated through create and destroy events.
    ///
    /// # Errors
    ///
    /// Allocation, lease or encoding errors.
    pub fn rpc_instantiate(&mut self, prototype: &str, placement: Placement, payload: Vec<Value>) -> ReplicationResult<EntityHandle> {
        self.instantiate(LocalCreate::new(prototype, placement, Category::ReplicatedRpc).with_payload(payload))
    }

    /// Creates a replicated entity under the entity holding `parent`.
    ///
    /// # Errors
    ///
    /// [`PoolError::RelationTargetMissing`] before anything is allocated,
    /// otherwise as [`Session::rpc_instantiate`].
    pub fn rpc_instantiate_as_child(
        &mut self,
        parent: TokenId,
        prototype: &str,
        placement: Placement,
        payload: Vec<Value>,
    ) -> ReplicationResult<EntityHandle> {
        self.instantiate(
            LocalCreate::new(prototype, placement, Category::ReplicatedRpc)
                .with_payload(payload)
                .with_relation(Relation::ChildOf(parent)),
        )
    }

    /// Creates a replicated entity next to the entity holding `sibling`.
    ///
    /// # Errors
    ///
    /// As [`Session::rpc_instantiate_as_child`].
    pub fn rpc_instantiate_as_sibling(
        &mut self,
        sibling: TokenId,
        prototype: &str,
        placement: Placement,
        payload: Vec<Value>,
    ) -> ReplicationResult<EntityHandle> {
        self.instantiate(
            LocalCreate::new(prototype, placement, Category::ReplicatedRpc)
                .with_payload(payload)
                .with_relation(Relation::SiblingOf(sibling)),
        )
    }

    /// Creates a replicated entity with networked sub-component ids.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoSubComponents`] if the prototype declares none,
    /// otherwise as [`Session::rpc_instantiate`].
    pub fn view_instantiate(&mut self, prototype: &str, placement: Placement, payload: Vec<Value>) -> ReplicationResult<EntityHandle> {
        self.instantiate(LocalCreate::new(prototype, placement, Category::ReplicatedView).with_payload(payload))
    }

    /// Creates an entity owned by this peer and broadcasts it if replicated.
    ///
    /// If the broadcast cannot be encoded the lease is undone.
    ///
    /// # Errors
    ///
    /// Allocation, lease or encoding errors.
    pub fn instantiate(&mut self, request: LocalCreate) -> ReplicationResult<EntityHandle> {
        let relation = request.relation;
        let (entity, record) = self.state.create_local(&self.prototypes, &mut self.host, request)?;

        if record.category.is_replicated() {
            if let Err(err) = self.replication.broadcast_create(&record, relation) {
                tracing::warn!("Could not broadcast token {}, undoing lease: {}", record.token, err);
                if let Err(release_err) = self.state.release(&mut self.host, entity) {
                    tracing::error!("Rollback of token {} failed: {}", record.token, release_err);
                }
                return Err(err.into());
            }
        }

        tracing::debug!("Instantiated {} as token {} ({})", record.prototype, record.token, record.category);
        Ok(entity)
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// Releases a managed entity, broadcasting its destroy if replicated.
    ///
    /// A destroy that cannot be broadcast is logged; the local release
    /// still happens.
    ///
    /// # Errors
    ///
    /// [`PoolError::UnknownEntity`] if the entity is not managed.
    pub fn delete(&mut self, entity: EntityHandle) -> ReplicationResult<Release> {
        let token = self
            .state
            .registry()
            .token(entity)
            .ok_or(PoolError::UnknownEntity(entity))?;
        let (id, category) = (token.token(), token.category());

        if category.is_replicated() {
            if let Err(err) = self.replication.broadcast_destroy(id) {
                tracing::warn!("Could not broadcast destroy of token {}: {}", id, err);
            }
        }

        let release = self.state.release(&mut self.host, entity)?;
        tracing::debug!("Deleted token {}", id);
        Ok(release)
    }

    /// Deletes every managed entity, broadcasting as [`Session::delete`]
    /// does. Returns how many were deleted.
    pub fn clean_up(&mut self) -> usize {
        let entities = self.state.registry().all();
        let mut deleted = 0;
        for entity in entities {
            match self.delete(entity) {
                Ok(_) => deleted += 1,
                Err(err) => tracing::warn!("Clean-up skipped {:?}: {}", entity, err),
            }
        }
        tracing::info!("Clean-up deleted {} entities", deleted);
        deleted
    }

    /// Releases everything owned by a departed peer, without broadcasting.
    pub fn on_peer_left(&mut self, owner: OwnerId) -> usize {
        let released = self.state.release_owner(&mut self.host, owner);
        let forgotten = self.replication.forget_owner(owner);
        tracing::info!(
            "Peer {} left: {} entities released, {} cache entries dropped",
            owner,
            released,
            forgotten
        );
        released
    }

    /// Destroys every entity and clears pools, registry and cache.
    pub fn teardown(&mut self) -> usize {
        let destroyed = self.state.teardown(&mut self.host);
        self.replication.clear();
        destroyed
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Entity holding `token`.
    #[must_use]
    pub fn find(&self, token: TokenId) -> Option<EntityHandle> {
        self.state.registry().find(token)
    }

    /// Pool token of a managed entity.
    #[must_use]
    pub fn token_of(&self, entity: EntityHandle) -> Option<&PoolToken> {
        self.state.registry().token(entity)
    }

    /// This peer's player controller.
    #[must_use]
    pub fn my_player_controller(&self) -> Option<EntityHandle> {
        self.state.registry().controller_of(self.local_owner())
    }

    /// Entities of `prototype` owned by this peer.
    #[must_use]
    pub fn my_objects_of_type(&self, prototype: &str) -> Vec<EntityHandle> {
        self.owner_objects_of_type(self.local_owner(), prototype)
    }

    /// Entities of `prototype` owned by `owner`.
    #[must_use]
    pub fn owner_objects_of_type(&self, owner: OwnerId, prototype: &str) -> Vec<EntityHandle> {
        self.state.registry().owner_objects_of_type(owner, prototype)
    }

    /// Every managed entity.
    #[must_use]
    pub fn all_objects(&self) -> Vec<EntityHandle> {
        self.state.registry().all()
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Applies one event delivered by the transport.
    ///
    /// Remote creates go through the same lease path as local ones and are
    /// never re-broadcast. A create for a registered token and a destroy for
    /// an absent one are ignored.
    ///
    /// # Errors
    ///
    /// Decoding errors, [`PoolError::RelationTargetMissing`], or lease
    /// errors.
    pub fn handle_event(&mut self, event: &InboundEvent) -> ReplicationResult<RemoteOutcome> {
        match self.replication.decode_inbound(event)? {
            ReplicationEvent::Create { mut record, relation } => {
                if self.state.registry().contains_token(record.token) {
                    tracing::warn!("Duplicate create of token {} from {}, ignored", record.token, event.sender);
                    return Ok(RemoteOutcome::Ignored);
                }
                let entity = self
                    .state
                    .instantiate(&self.prototypes, &mut self.host, &mut record, relation)?;
                tracing::debug!("Remote create of token {} from {}", record.token, event.sender);
                self.replication.record_remote(record, relation);
                Ok(RemoteOutcome::Created(entity))
            }
            ReplicationEvent::Destroy { token } => {
                self.replication.forget(token);
                let Some(entity) = self.state.registry().find(token) else {
                    tracing::debug!("Remote destroy of absent token {} from {}, ignored", token, event.sender);
                    return Ok(RemoteOutcome::Ignored);
                };
                self.state.release(&mut self.host, entity)?;
                tracing::debug!("Remote destroy of token {} from {}", token, event.sender);
                Ok(RemoteOutcome::Destroyed(entity))
            }
        }
    }

    /// Takes every queued outbound event, oldest first.
    pub fn drain_outbound(&self) -> Vec<OutboundEvent> {
        self.replication.drain_outbound()
    }

    /// Hands every queued outbound event to `transport`. Returns how many.
    pub fn flush(&self, transport: &mut impl Transport) -> usize {
        let events = self.drain_outbound();
        let count = events.len();
        for event in events {
            transport.raise(event);
        }
        count
    }
}

impl<H, P> std::fmt::Debug for Session<H, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("owner", &self.state.local_owner())
            .field("managed", &self.state.registry().len())
            .field("cached", &self.replication.len())
            .finish_non_exhaustive()
    }
}

/// A [`Session`] behind a lock, for embeddings with several threads.
pub struct SharedSession<H, P> {
    inner: Arc<Mutex<Session<H, P>>>,
}

impl<H, P> SharedSession<H, P> {
    /// Wraps a session.
    #[must_use]
    pub fn new(session: Session<H, P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Locks the session.
    pub fn lock(&self) -> MutexGuard<'_, Session<H, P>> {
        self.inner.lock()
    }

    /// Runs `f` with the session locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session<H, P>) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

impl<H, P> Clone for SharedSession<H, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplicationError;
    use crate::transport::Caching;
    use revenant_core::host::memory::{MemoryHost, MemoryPrototypes};
    use revenant_core::Prototype;
    use revenant_shared::Vec3;

    type TestSession = Session<MemoryHost, MemoryPrototypes>;

    fn session(owner: u32) -> TestSession {
        let prototypes = MemoryPrototypes::new()
            .with(Prototype::new("Projectiles/Orb"))
            .with(Prototype::new("Players/Avatar").player_controller())
            .with(Prototype::new("Turrets/Turret").with_sub_components(2));
        Session::start(PoolingConfig::default(), &OwnerId(owner), MemoryHost::new(), prototypes).unwrap()
    }

    #[test]
    fn test_local_instantiate_is_not_broadcast() {
        let mut session = session(7);
        let orb = session
            .local_instantiate("Projectiles/Orb", Placement::NEUTRAL, Vec::new())
            .unwrap();

        assert_eq!(session.find(TokenId(70_000)), Some(orb));
        assert!(session.drain_outbound().is_empty());

        session.delete(orb).unwrap();
        assert!(session.drain_outbound().is_empty());
        assert!(session.all_objects().is_empty());
    }

    #[test]
    fn test_rpc_instantiate_then_delete() {
        let mut session = session(7);
        let orb = session
            .rpc_instantiate("Projectiles/Orb", Placement::at(Vec3::new(1.0, 0.0, 0.0)), vec![Value::Int(3)])
            .unwrap();
        let queued = session.drain_outbound();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].caching, Caching::AddToCache);
        assert!(session.replication().is_cached(TokenId(70_000)));

        session.delete(orb).unwrap();
        let queued: Vec<Caching> = session.drain_outbound().iter().map(|e| e.caching).collect();
        assert_eq!(queued, vec![Caching::RemoveFromCache, Caching::DoNotCache]);
        assert!(session.replication().is_empty());
    }

    #[test]
    fn test_missing_relation_target_leaves_no_state() {
        let mut session = session(7);
        let err = session
            .rpc_instantiate_as_child(TokenId(5), "Projectiles/Orb", Placement::NEUTRAL, Vec::new())
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Pool(PoolError::RelationTargetMissing(TokenId(5)))));
        assert!(session.drain_outbound().is_empty());

        session.rpc_instantiate("Projectiles/Orb", Placement::NEUTRAL, Vec::new()).unwrap();
        assert_eq!(session.token_of(session.find(TokenId(70_000)).unwrap()).unwrap().owner(), OwnerId(7));
    }

    #[test]
    fn test_view_instantiate_assigns_sub_components() {
        let mut session = session(3);
        let turret = session
            .view_instantiate("Turrets/Turret", Placement::NEUTRAL, Vec::new())
            .unwrap();
        assert_eq!(session.host().sub_components(turret).len(), 2);

        let err = session
            .view_instantiate("Projectiles/Orb", Placement::NEUTRAL, Vec::new())
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Pool(PoolError::NoSubComponents(_))));
    }

    #[test]
    fn test_queries() {
        let mut session = session(2);
        let avatar = session
            .rpc_instantiate("Players/Avatar", Placement::NEUTRAL, Vec::new())
            .unwrap();
        let orb = session
            .rpc_instantiate("Projectiles/Orb", Placement::NEUTRAL, Vec::new())
            .unwrap();

        assert_eq!(session.my_player_controller(), Some(avatar));
        assert_eq!(session.my_objects_of_type("Projectiles/Orb"), vec![orb]);
        assert!(session.owner_objects_of_type(OwnerId(9), "Projectiles/Orb").is_empty());
        assert_eq!(session.all_objects().len(), 2);
    }

    #[test]
    fn test_clean_up_and_teardown() {
        let mut session = session(1);
        for _ in 0..3 {
            session.rpc_instantiate("Projectiles/Orb", Placement::NEUTRAL, Vec::new()).unwrap();
        }
        session.drain_outbound();

        assert_eq!(session.clean_up(), 3);
        assert!(session.all_objects().is_empty());
        assert_eq!(session.drain_outbound().len(), 6);

        assert_eq!(session.teardown(), 3);
        assert_eq!(session.host().live().count(), 0);
    }

    #[test]
    fn test_shared_session_serializes_creation() {
        let shared = SharedSession::new(session(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        shared
                            .with(|s| s.rpc_instantiate("Projectiles/Orb", Placement::NEUTRAL, Vec::new()))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let session = shared.lock();
        assert_eq!(session.all_objects().len(), 100);
        assert!(session.state().registry().is_consistent());
        assert_eq!(session.replication().len(), 100);
    }
}
