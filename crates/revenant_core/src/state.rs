//! # Pool State
//!
//! Everything one pooling session mutates: registry, allocators and pools.
//! Created at session start and torn down at session end, so independent
//! sessions never share state.
//!
//! The host and prototype source are passed into each call rather than
//! owned, which keeps this type free of generics.

use revenant_shared::{Category, InstantiationRecord, OwnerId, Placement, TokenId, Value};

use crate::config::PoolingConfig;
use crate::directory::{PoolDirectory, Relation};
use crate::error::{ConfigResult, PoolError, PoolResult};
use crate::host::{EntityHandle, EntityHost, PrototypeSource};
use crate::ids::{SubComponentIdAllocator, TokenAllocator};
use crate::pool::{LeaseContext, Release};
use crate::registry::ManagedObjectRegistry;

/// Mutable state of one pooling session.
#[derive(Debug)]
pub struct PoolState {
    config: PoolingConfig,
    local_owner: OwnerId,
    registry: ManagedObjectRegistry,
    tokens: TokenAllocator,
    sub_components: SubComponentIdAllocator,
    directory: PoolDirectory,
}

impl PoolState {
    /// Creates empty state for the peer `local_owner`.
    ///
    /// # Errors
    ///
    /// Returns the configuration's validation error.
    pub fn new(config: PoolingConfig, local_owner: OwnerId) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            local_owner,
            registry: ManagedObjectRegistry::new(),
            tokens: TokenAllocator::new(config.token_capacity),
            sub_components: SubComponentIdAllocator::new(config.sub_component_capacity),
            directory: PoolDirectory::new(config.default_max_pool_size),
            config,
        })
    }

    /// Configuration this state was built from.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PoolingConfig {
        &self.config
    }

    /// Identity of this peer.
    #[inline]
    #[must_use]
    pub const fn local_owner(&self) -> OwnerId {
        self.local_owner
    }

    /// The session registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ManagedObjectRegistry {
        &self.registry
    }

    /// The session's pools.
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &PoolDirectory {
        &self.directory
    }

    /// The token allocator.
    #[inline]
    #[must_use]
    pub fn tokens(&self) -> &TokenAllocator {
        &self.tokens
    }

    /// The sub-component id allocator.
    #[inline]
    #[must_use]
    pub fn sub_components(&self) -> &SubComponentIdAllocator {
        &self.sub_components
    }

    fn context<'a>(&'a mut self, host: &'a mut dyn EntityHost) -> (LeaseContext<'a>, &'a mut PoolDirectory) {
        let ctx = LeaseContext {
            host,
            registry: &mut self.registry,
            sub_components: &mut self.sub_components,
            local_owner: self.local_owner,
            auto_name: self.config.auto_name_objects,
        };
        (ctx, &mut self.directory)
    }

    /// Creates the configured pools and fills their free lists.
    ///
    /// # Errors
    ///
    /// [`PoolError::ProtoNotFound`] for the first prototype that does not
    /// resolve; pools created before it are kept.
    pub fn preload(&mut self, prototypes: &dyn PrototypeSource, host: &mut dyn EntityHost) -> PoolResult<()> {
        for pool in &self.config.pools {
            self.directory.create_pool(
                prototypes,
                host,
                &pool.prototype,
                pool.category,
                pool.max_size,
                pool.preload,
            )?;
        }
        Ok(())
    }

    /// Allocates a token for `owner` that no live entity holds.
    ///
    /// # Errors
    ///
    /// See [`TokenAllocator::allocate`].
    pub fn allocate_token(&mut self, owner: OwnerId) -> PoolResult<TokenId> {
        let registry = &self.registry;
        self.tokens.allocate(owner, |token| registry.contains_token(token))
    }

    /// Leases an entity for a fully populated record.
    ///
    /// Used for remote creations, whose owner and token come from the wire.
    ///
    /// # Errors
    ///
    /// See [`PoolDirectory::lease`].
    pub fn instantiate(
        &mut self,
        prototypes: &dyn PrototypeSource,
        host: &mut dyn EntityHost,
        record: &mut InstantiationRecord,
        relation: Relation,
    ) -> PoolResult<EntityHandle> {
        let (mut ctx, directory) = self.context(host);
        directory.lease(&mut ctx, prototypes, record, relation)
    }

    /// Creates an entity owned by this peer.
    ///
    /// The relation target is checked before a token is allocated. Returns
    /// the entity and the record as leased, ready for broadcast.
    ///
    /// # Errors
    ///
    /// [`PoolError::RelationTargetMissing`], allocation errors, or lease
    /// errors.
    pub fn create_local(
        &mut self,
        prototypes: &dyn PrototypeSource,
        host: &mut dyn EntityHost,
        request: LocalCreate,
    ) -> PoolResult<(EntityHandle, InstantiationRecord)> {
        if let Some(target) = request.relation.target() {
            if !self.registry.contains_token(target) {
                return Err(PoolError::RelationTargetMissing(target));
            }
        }

        let mut record = InstantiationRecord::new(request.prototype, request.placement, request.category)
            .with_payload(request.payload);
        record.owner = self.local_owner;
        record.token = self.allocate_token(self.local_owner)?;

        let entity = self.instantiate(prototypes, host, &mut record, request.relation)?;
        Ok((entity, record))
    }

    /// Releases a leased entity.
    ///
    /// # Errors
    ///
    /// [`PoolError::UnknownEntity`] if the entity is not managed.
    pub fn release(&mut self, host: &mut dyn EntityHost, entity: EntityHandle) -> PoolResult<Release> {
        let (mut ctx, directory) = self.context(host);
        directory.release(&mut ctx, entity)
    }

    /// Releases every entity owned by `owner`. Returns how many were released.
    pub fn release_owner(&mut self, host: &mut dyn EntityHost, owner: OwnerId) -> usize {
        let entities = self.registry.by_owner(owner).to_vec();
        let mut released = 0;
        for entity in entities {
            match self.release(host, entity) {
                Ok(_) => released += 1,
                Err(err) => tracing::warn!("Could not release {:?} of owner {}: {}", entity, owner, err),
            }
        }
        released
    }

    /// Destroys every entity and clears all indices and allocators.
    pub fn teardown(&mut self, host: &mut dyn EntityHost) -> usize {
        let destroyed = self.directory.teardown(host);
        self.registry.clear();
        self.sub_components.clear();
        self.tokens.reset();
        tracing::info!("Pool state torn down, {} entities destroyed", destroyed);
        destroyed
    }
}

/// A creation request from this peer.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalCreate {
    /// Prototype path.
    pub prototype: String,
    /// Where the entity appears.
    pub placement: Placement,
    /// Replication mode.
    pub category: Category,
    /// Opaque application data.
    pub payload: Vec<Value>,
    /// Scene attachment.
    pub relation: Relation,
}

impl LocalCreate {
    /// A root-level request with no payload.
    #[must_use]
    pub fn new(prototype: impl Into<String>, placement: Placement, category: Category) -> Self {
        Self {
            prototype: prototype.into(),
            placement,
            category,
            payload: Vec::new(),
            relation: Relation::Root,
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the scene attachment.
    #[must_use]
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = relation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreloadedPool;
    use crate::host::memory::{MemoryHost, MemoryPrototypes};
    use crate::host::Prototype;
    use revenant_shared::Vec3;

    fn prototypes() -> MemoryPrototypes {
        MemoryPrototypes::new()
            .with(Prototype::new("Projectiles/Orb"))
            .with(Prototype::new("Players/Avatar").player_controller())
    }

    fn orb() -> LocalCreate {
        LocalCreate::new("Projectiles/Orb", Placement::at(Vec3::new(0.0, 1.0, 0.0)), Category::Local)
    }

    #[test]
    fn test_owner_seven_scenario() {
        let protos = prototypes();
        let mut host = MemoryHost::new();
        let mut state = PoolState::new(PoolingConfig::default(), OwnerId(7)).unwrap();

        let (first, r1) = state.create_local(&protos, &mut host, orb()).unwrap();
        let (_, r2) = state.create_local(&protos, &mut host, orb()).unwrap();
        assert_eq!(r1.token, TokenId(70_000));
        assert_eq!(r2.token, TokenId(70_001));

        state.release(&mut host, first).unwrap();
        let (third, r3) = state.create_local(&protos, &mut host, orb()).unwrap();

        assert_eq!(third, first);
        assert_eq!(r3.token, TokenId(70_002));
        let token = state.registry().token(third).unwrap();
        assert!(!token.first_lease());
        assert_eq!(state.registry().len(), 2);
        assert!(state.registry().contains_token(TokenId(70_001)));
    }

    #[test]
    fn test_tokens_unique_under_churn() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        use std::collections::HashSet;

        let protos = prototypes();
        let mut host = MemoryHost::new();
        let config = PoolingConfig {
            token_capacity: 64,
            default_max_pool_size: 8,
            ..PoolingConfig::default()
        };
        let mut state = PoolState::new(config, OwnerId(2)).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut live: Vec<EntityHandle> = Vec::new();

        for _ in 0..1_000 {
            if live.len() < 60 && rng.gen_bool(0.55) {
                let (entity, _) = state.create_local(&protos, &mut host, orb()).unwrap();
                live.push(entity);
            } else if !live.is_empty() {
                let victim = live.swap_remove(rng.gen_range(0..live.len()));
                state.release(&mut host, victim).unwrap();
            }

            let tokens: HashSet<TokenId> = live
                .iter()
                .map(|e| state.registry().token(*e).unwrap().token())
                .collect();
            assert_eq!(tokens.len(), live.len());
            assert!(state.registry().is_consistent());
        }
    }

    #[test]
    fn test_exhaustion_fails_only_the_request() {
        let protos = prototypes();
        let mut host = MemoryHost::new();
        let config = PoolingConfig {
            token_capacity: 2,
            ..PoolingConfig::default()
        };
        let mut state = PoolState::new(config, OwnerId(1)).unwrap();
        state.create_local(&protos, &mut host, orb()).unwrap();
        state.create_local(&protos, &mut host, orb()).unwrap();

        let err = state.create_local(&protos, &mut host, orb()).unwrap_err();
        assert_eq!(err, PoolError::AllocationExhausted { owner: OwnerId(1), capacity: 2 });
        assert_eq!(state.registry().len(), 2);
    }

    #[test]
    fn test_missing_relation_allocates_nothing() {
        let protos = prototypes();
        let mut host = MemoryHost::new();
        let mut state = PoolState::new(PoolingConfig::default(), OwnerId(1)).unwrap();

        let request = orb().with_relation(Relation::ChildOf(TokenId(5)));
        let err = state.create_local(&protos, &mut host, request).unwrap_err();
        assert_eq!(err, PoolError::RelationTargetMissing(TokenId(5)));

        // The counter did not move.
        let (_, record) = state.create_local(&protos, &mut host, orb()).unwrap();
        assert_eq!(record.token, TokenId(10_000));
    }

    #[test]
    fn test_second_player_controller_is_fatal() {
        let protos = prototypes();
        let mut host = MemoryHost::new();
        let mut state = PoolState::new(PoolingConfig::default(), OwnerId(1)).unwrap();
        let avatar = LocalCreate::new("Players/Avatar", Placement::NEUTRAL, Category::Local);

        let (first, _) = state.create_local(&protos, &mut host, avatar.clone()).unwrap();
        assert_eq!(state.registry().controller_of(OwnerId(1)), Some(first));

        let err = state.create_local(&protos, &mut host, avatar).unwrap_err();
        assert!(matches!(err, PoolError::DuplicateController { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_preload_and_teardown() {
        let protos = prototypes();
        let mut host = MemoryHost::new();
        let config = PoolingConfig {
            pools: vec![PreloadedPool {
                prototype: "Projectiles/Orb".into(),
                category: Category::Local,
                max_size: 4,
                preload: 3,
            }],
            ..PoolingConfig::default()
        };
        let mut state = PoolState::new(config, OwnerId(1)).unwrap();
        state.preload(&protos, &mut host).unwrap();
        assert_eq!(host.alive_count(), 3);

        let (orb_entity, _) = state.create_local(&protos, &mut host, orb()).unwrap();
        assert!(!state.registry().token(orb_entity).unwrap().first_lease());

        assert_eq!(state.teardown(&mut host), 3);
        assert_eq!(host.alive_count(), 0);
        assert!(state.registry().is_empty());
        assert!(state.directory().is_empty());
    }

    #[test]
    fn test_release_owner() {
        let protos = prototypes();
        let mut host = MemoryHost::new();
        let mut state = PoolState::new(PoolingConfig::default(), OwnerId(1)).unwrap();

        for token in 0..3 {
            let mut record = InstantiationRecord::new("Projectiles/Orb", Placement::NEUTRAL, Category::ReplicatedRpc);
            record.owner = OwnerId(4);
            record.token = TokenId(40_000 + token);
            state.instantiate(&protos, &mut host, &mut record, Relation::Root).unwrap();
        }
        state.create_local(&protos, &mut host, orb()).unwrap();

        assert_eq!(state.release_owner(&mut host, OwnerId(4)), 3);
        assert!(state.registry().by_owner(OwnerId(4)).is_empty());
        assert_eq!(state.registry().len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PoolingConfig {
            token_capacity: 0,
            ..PoolingConfig::default()
        };
        assert!(PoolState::new(config, OwnerId(1)).is_err());
    }
}
