//! # Pool Directory
//!
//! Maps (prototype, category) to its [`ObjectPool`], creating pools lazily
//! on first use with the session's default capacity.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use revenant_shared::{Category, InstantiationRecord, TokenId};

use crate::error::{PoolError, PoolResult};
use crate::host::{EntityHandle, EntityHost, PrototypeKey, PrototypeSource};
use crate::pool::{LeaseContext, ObjectPool, PoolStats, Release};

/// Where a new entity is attached in the scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Scene root.
    #[default]
    Root,
    /// Under the entity holding this token.
    ChildOf(TokenId),
    /// Under the parent of the entity holding this token.
    SiblingOf(TokenId),
}

impl Relation {
    /// Token of the relation target, if any.
    #[must_use]
    pub const fn target(self) -> Option<TokenId> {
        match self {
            Self::Root => None,
            Self::ChildOf(token) | Self::SiblingOf(token) => Some(token),
        }
    }
}

/// Every pool of a session.
#[derive(Debug)]
pub struct PoolDirectory {
    pools: HashMap<(PrototypeKey, Category), ObjectPool>,
    default_max_size: usize,
}

impl PoolDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new(default_max_size: usize) -> Self {
        Self {
            pools: HashMap::new(),
            default_max_size,
        }
    }

    /// Number of pools.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pool exists yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Looks up an existing pool.
    #[must_use]
    pub fn pool(&self, prototype: &str, category: Category) -> Option<&ObjectPool> {
        self.pools.get(&(PrototypeKey::from(prototype), category))
    }

    /// Iterates over every pool.
    pub fn pools(&self) -> impl Iterator<Item = &ObjectPool> + '_ {
        self.pools.values()
    }

    /// Counters of one pool.
    #[must_use]
    pub fn stats(&self, prototype: &str, category: Category) -> Option<PoolStats> {
        self.pool(prototype, category).map(ObjectPool::stats)
    }

    /// Creates a pool with an explicit capacity and preloads it.
    ///
    /// An existing pool is returned unchanged.
    ///
    /// # Errors
    ///
    /// [`PoolError::ProtoNotFound`] if the prototype does not resolve.
    pub fn create_pool(
        &mut self,
        prototypes: &dyn PrototypeSource,
        host: &mut dyn EntityHost,
        path: &str,
        category: Category,
        max_size: usize,
        preload: usize,
    ) -> PoolResult<&mut ObjectPool> {
        match self.pools.entry((PrototypeKey::from(path), category)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let prototype = prototypes
                    .resolve(path)
                    .ok_or_else(|| PoolError::ProtoNotFound(path.to_string()))?;
                let mut pool = ObjectPool::new(prototype, category, max_size);
                let loaded = pool.preload(host, preload);
                tracing::info!("Created pool {}.{} (max {}, preloaded {})", path, category, max_size, loaded);
                Ok(entry.insert(pool))
            }
        }
    }

    /// Returns the pool for (prototype, category), creating it on first use.
    ///
    /// # Errors
    ///
    /// [`PoolError::ProtoNotFound`] if the pool is new and the prototype does
    /// not resolve.
    pub fn get_or_create(
        &mut self,
        prototypes: &dyn PrototypeSource,
        host: &mut dyn EntityHost,
        path: &str,
        category: Category,
    ) -> PoolResult<&mut ObjectPool> {
        let max_size = self.default_max_size;
        self.create_pool(prototypes, host, path, category, max_size, 0)
    }

    /// Leases an entity for `record` and attaches it according to `relation`.
    ///
    /// The relation target is resolved first, so a missing target leaves no
    /// trace.
    ///
    /// # Errors
    ///
    /// [`PoolError::RelationTargetMissing`], [`PoolError::ProtoNotFound`], or
    /// whatever the pool's lease returns.
    pub fn lease(
        &mut self,
        ctx: &mut LeaseContext<'_>,
        prototypes: &dyn PrototypeSource,
        record: &mut InstantiationRecord,
        relation: Relation,
    ) -> PoolResult<EntityHandle> {
        let parent = match relation {
            Relation::Root => None,
            Relation::ChildOf(token) => Some(
                ctx.registry
                    .find(token)
                    .ok_or(PoolError::RelationTargetMissing(token))?,
            ),
            Relation::SiblingOf(token) => {
                let sibling = ctx
                    .registry
                    .find(token)
                    .ok_or(PoolError::RelationTargetMissing(token))?;
                ctx.host.parent(sibling)
            }
        };

        let pool = self.get_or_create(prototypes, ctx.host, &record.prototype, record.category)?;
        let entity = pool.lease(ctx, record)?;
        if parent.is_some() {
            ctx.host.reparent(entity, parent);
        }
        Ok(entity)
    }

    /// Releases a leased entity back to its pool.
    ///
    /// # Errors
    ///
    /// [`PoolError::UnknownEntity`] if the entity is not registered or its
    /// pool no longer exists.
    pub fn release(&mut self, ctx: &mut LeaseContext<'_>, entity: EntityHandle) -> PoolResult<Release> {
        let token = ctx.registry.token(entity).ok_or(PoolError::UnknownEntity(entity))?;
        let key = (token.prototype().clone(), token.category());
        let pool = self.pools.get_mut(&key).ok_or(PoolError::UnknownEntity(entity))?;
        pool.release(ctx, entity)
    }

    /// Destroys every pooled and leased entity and forgets all pools.
    pub fn teardown(&mut self, host: &mut dyn EntityHost) -> usize {
        let mut destroyed = 0;
        for pool in self.pools.values_mut() {
            destroyed += pool.drain(host);
        }
        self.pools.clear();
        destroyed
    }
}
