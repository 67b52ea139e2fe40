//! # Object Pool
//!
//! One pool per (prototype, category). Entities move between two disjoint
//! sets:
//!
//! ```text
//!            lease (pop)                 release (retain)
//!   free ──────────────────► leased ──────────────────► free
//!     ▲                        │
//!     │ materialize            │ release (over capacity)
//!   (host)                     ▼
//!                           destroyed
//! ```
//!
//! A release retains the entity only while `leased + free` stays within
//! `max_size`; anything beyond is evicted and destroyed.

pub mod hooks;

use std::collections::HashSet;

use revenant_shared::{basename, Category, InstantiationRecord, OwnerId, Placement};

use crate::error::{PoolError, PoolResult};
use crate::host::{EntityHandle, EntityHost, PoolNotification, Prototype};
use crate::ids::SubComponentIdAllocator;
use crate::registry::ManagedObjectRegistry;
use crate::token::PoolToken;

pub use hooks::{ActivationHooks, SubComponentHooks};

/// Session state a pool needs while leasing or releasing.
pub struct LeaseContext<'a> {
    /// Scene owner.
    pub host: &'a mut dyn EntityHost,
    /// Session registry.
    pub registry: &'a mut ManagedObjectRegistry,
    /// Session sub-component id allocator.
    pub sub_components: &'a mut SubComponentIdAllocator,
    /// Identity of this peer.
    pub local_owner: OwnerId,
    /// Name leased entities after prototype, owner and token.
    pub auto_name: bool,
}

/// Outcome of a release.
#[derive(Clone, Debug, PartialEq)]
pub enum Release {
    /// Returned to the free list.
    Pooled(PoolToken),
    /// Destroyed; the token is marked unusable.
    Evicted(PoolToken),
}

impl Release {
    /// Token the entity held.
    #[must_use]
    pub fn token(&self) -> &PoolToken {
        match self {
            Self::Pooled(token) | Self::Evicted(token) => token,
        }
    }

    /// Whether the entity was destroyed.
    #[must_use]
    pub const fn is_evicted(&self) -> bool {
        matches!(self, Self::Evicted(_))
    }
}

/// Counters for one pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Leases that materialized a new entity.
    pub fresh: u64,
    /// Leases served from the free list.
    pub reused: u64,
    /// Releases that kept the entity.
    pub pooled: u64,
    /// Releases that destroyed the entity.
    pub evicted: u64,
    /// Entities materialized by preloading.
    pub preloaded: u64,
}

/// Pool of reusable entities for one prototype and category.
#[derive(Debug)]
pub struct ObjectPool {
    prototype: Prototype,
    category: Category,
    max_size: usize,
    free: Vec<EntityHandle>,
    leased: HashSet<EntityHandle>,
    hooks: Option<Box<dyn ActivationHooks>>,
    stats: PoolStats,
}

impl ObjectPool {
    /// Creates an empty pool with the category's default hooks.
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(prototype: Prototype, category: Category, max_size: usize) -> Self {
        assert!(max_size > 0, "Pool capacity must be greater than zero");
        Self {
            prototype,
            category,
            max_size,
            free: Vec::new(),
            leased: HashSet::new(),
            hooks: hooks::for_category(category),
            stats: PoolStats::default(),
        }
    }

    /// Replaces the activation hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Option<Box<dyn ActivationHooks>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Prototype served by this pool.
    #[inline]
    #[must_use]
    pub fn prototype(&self) -> &Prototype {
        &self.prototype
    }

    /// Category of this pool.
    #[inline]
    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    /// Capacity.
    #[inline]
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Entities currently in the world.
    #[inline]
    #[must_use]
    pub fn leased_count(&self) -> usize {
        self.leased.len()
    }

    /// Inactive entities ready for reuse.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Whether `entity` is leased from this pool.
    #[inline]
    #[must_use]
    pub fn is_leased(&self, entity: EntityHandle) -> bool {
        self.leased.contains(&entity)
    }

    /// Counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Materializes up to `count` inactive entities into the free list,
    /// stopping at capacity. Returns how many were added.
    pub fn preload(&mut self, host: &mut dyn EntityHost, count: usize) -> usize {
        let room = self.max_size.saturating_sub(self.leased.len() + self.free.len());
        let count = count.min(room);
        for _ in 0..count {
            let entity = host.materialize(&self.prototype);
            host.activate(entity, false);
            self.free.push(entity);
        }
        self.stats.preloaded += count as u64;
        count
    }

    /// Leases an entity for `record`.
    ///
    /// `record.owner` and `record.token` must already be assigned. Hooks may
    /// fill in `record.sub_component_ids`.
    ///
    /// # Errors
    ///
    /// Registry conflicts ([`PoolError::DuplicateToken`],
    /// [`PoolError::DuplicateController`]) are detected before any entity is
    /// touched. Hook failures return the entity to the pool.
    pub fn lease(&mut self, ctx: &mut LeaseContext<'_>, record: &mut InstantiationRecord) -> PoolResult<EntityHandle> {
        let player_controller = self.prototype.is_player_controller();
        ctx.registry
            .check_insert(record.token, record.owner, player_controller)?;

        let (entity, first_lease) = match self.free.pop() {
            Some(entity) => (entity, false),
            None => (ctx.host.materialize(&self.prototype), true),
        };

        if let Some(hooks) = self.hooks.as_mut() {
            if let Err(err) = hooks.pre_activate(ctx, entity, &self.prototype, record) {
                self.reclaim(ctx.host, entity);
                return Err(err);
            }
        }

        ctx.host.reparent(entity, None);
        ctx.host.set_placement(entity, record.placement);
        ctx.host.reset_kinetics(entity);

        let token = PoolToken {
            token: record.token,
            owner: record.owner,
            category: self.category,
            prototype: self.prototype.key().clone(),
            first_lease,
            usable: true,
            player_controller,
            sub_component_ids: record.sub_component_ids.clone(),
            payload: record.payload.clone(),
        };

        if ctx.auto_name {
            let name = format!("{}.{}.{}", basename(self.prototype.key()), record.owner, record.token);
            ctx.host.rename(entity, &name);
        }

        if let Err(err) = ctx.registry.add(entity, token) {
            self.reclaim(ctx.host, entity);
            return Err(err);
        }
        self.leased.insert(entity);

        ctx.host.activate(entity, self.prototype.default_active());
        ctx.host.notify(entity, PoolNotification::Leased { first_lease });

        if first_lease {
            self.stats.fresh += 1;
        } else {
            self.stats.reused += 1;
        }
        tracing::debug!(
            "Leased {:?} from {}.{} as token {} (fresh: {})",
            entity,
            self.prototype.key(),
            self.category,
            record.token,
            first_lease
        );
        Ok(entity)
    }

    /// Returns a leased entity to the pool, or evicts it when over capacity.
    ///
    /// # Errors
    ///
    /// [`PoolError::UnknownEntity`] if the entity is not leased from this
    /// pool, [`PoolError::UnknownToken`] if the registry lost track of it.
    pub fn release(&mut self, ctx: &mut LeaseContext<'_>, entity: EntityHandle) -> PoolResult<Release> {
        if !self.leased.contains(&entity) {
            return Err(PoolError::UnknownEntity(entity));
        }
        let mut token = ctx.registry.remove(entity)?;
        self.leased.remove(&entity);

        let retain = self.leased.len() + self.free.len() < self.max_size;
        ctx.host.notify(entity, PoolNotification::Released { evicted: !retain });

        if let Some(hooks) = self.hooks.as_mut() {
            hooks.pre_deactivate(ctx, entity, &token);
        }
        ctx.host.activate(entity, false);

        if retain {
            ctx.host.reparent(entity, None);
            ctx.host.set_placement(entity, Placement::NEUTRAL);
            self.free.push(entity);
            self.stats.pooled += 1;
            tracing::debug!("Pooled {:?} (token {})", entity, token.token);
            Ok(Release::Pooled(token))
        } else {
            token.usable = false;
            ctx.host.destroy_irrecoverably(entity);
            self.stats.evicted += 1;
            tracing::debug!("Evicted {:?} (token {}) from full pool {}", entity, token.token, self.prototype.key());
            Ok(Release::Evicted(token))
        }
    }

    /// Destroys every entity this pool tracks, leased or free.
    ///
    /// Leased entities must be dropped from the registry by the caller.
    pub fn drain(&mut self, host: &mut dyn EntityHost) -> usize {
        let count = self.leased.len() + self.free.len();
        for entity in self.leased.drain().chain(self.free.drain(..)) {
            host.destroy_irrecoverably(entity);
        }
        count
    }

    /// Puts an entity that failed to lease back where it belongs.
    fn reclaim(&mut self, host: &mut dyn EntityHost, entity: EntityHandle) {
        host.activate(entity, false);
        if self.leased.len() + self.free.len() < self.max_size {
            self.free.push(entity);
        } else {
            host.destroy_irrecoverably(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;
    use revenant_shared::{OwnerId, SubComponentId, TokenId, Value, Vec3};

    struct Fixture {
        host: MemoryHost,
        registry: ManagedObjectRegistry,
        sub_components: SubComponentIdAllocator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                host: MemoryHost::new(),
                registry: ManagedObjectRegistry::new(),
                sub_components: SubComponentIdAllocator::new(100),
            }
        }

        fn ctx(&mut self) -> LeaseContext<'_> {
            LeaseContext {
                host: &mut self.host,
                registry: &mut self.registry,
                sub_components: &mut self.sub_components,
                local_owner: OwnerId(7),
                auto_name: true,
            }
        }
    }

    fn record(token: u32) -> InstantiationRecord {
        let mut record = InstantiationRecord::new(
            "Projectiles/Orb",
            Placement::at(Vec3::new(1.0, 2.0, 3.0)),
            Category::Local,
        );
        record.owner = OwnerId(7);
        record.token = TokenId(token);
        record
    }

    #[test]
    fn test_reuse_reports_first_lease_once() {
        let mut fx = Fixture::new();
        let mut pool = ObjectPool::new(Prototype::new("Projectiles/Orb"), Category::Local, 4);

        let first = pool.lease(&mut fx.ctx(), &mut record(70_000)).unwrap();
        assert!(fx.registry.token(first).unwrap().first_lease());
        assert!(fx.host.is_active(first));
        assert_eq!(fx.host.name(first), Some("Orb.7.70000"));

        let released = pool.release(&mut fx.ctx(), first).unwrap();
        assert!(!released.is_evicted());
        assert!(!fx.host.is_active(first));
        assert_eq!(fx.host.placement(first), Some(Placement::NEUTRAL));
        assert!(fx.registry.is_empty());

        let again = pool.lease(&mut fx.ctx(), &mut record(70_002)).unwrap();
        assert_eq!(again, first);
        assert!(!fx.registry.token(again).unwrap().first_lease());
        assert_eq!(fx.host.materialized_count(), 1);
        assert_eq!(
            fx.host.notifications(again),
            &[
                PoolNotification::Leased { first_lease: true },
                PoolNotification::Released { evicted: false },
                PoolNotification::Leased { first_lease: false },
            ]
        );
        assert_eq!(pool.stats().fresh, 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_lease_applies_placement_and_clears_motion() {
        let mut fx = Fixture::new();
        let mut pool = ObjectPool::new(Prototype::new("Projectiles/Orb"), Category::Local, 4);

        let orb = pool.lease(&mut fx.ctx(), &mut record(1)).unwrap();
        fx.host.set_velocity(orb, Vec3::new(9.0, 9.0, 9.0));
        pool.release(&mut fx.ctx(), orb).unwrap();

        let orb = pool.lease(&mut fx.ctx(), &mut record(2)).unwrap();
        assert_eq!(fx.host.velocity(orb), Some(Vec3::ZERO));
        assert_eq!(fx.host.placement(orb).unwrap().position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_capacity_bound_evicts_excess() {
        let mut fx = Fixture::new();
        let mut pool = ObjectPool::new(Prototype::new("Projectiles/Orb"), Category::Local, 2);

        let leased: Vec<_> = (0..3)
            .map(|t| pool.lease(&mut fx.ctx(), &mut record(t)).unwrap())
            .collect();
        assert_eq!(pool.leased_count(), 3);

        let outcomes: Vec<_> = leased
            .iter()
            .map(|e| pool.release(&mut fx.ctx(), *e).unwrap())
            .collect();

        assert!(outcomes[0].is_evicted());
        assert!(!outcomes[0].token().usable());
        assert!(!outcomes[1].is_evicted());
        assert!(!outcomes[2].is_evicted());
        assert_eq!(pool.free_count(), 2);
        assert!(!fx.host.is_alive(leased[0]));
        assert_eq!(pool.stats().evicted, 1);

        // The evicted entity never comes back.
        for t in 10..12 {
            let e = pool.lease(&mut fx.ctx(), &mut record(t)).unwrap();
            assert_ne!(e, leased[0]);
        }
    }

    #[test]
    fn test_release_of_foreign_entity() {
        let mut fx = Fixture::new();
        let mut pool = ObjectPool::new(Prototype::new("Projectiles/Orb"), Category::Local, 2);
        let stranger = fx.host.materialize(&Prototype::new("Bat"));
        assert_eq!(
            pool.release(&mut fx.ctx(), stranger).unwrap_err(),
            PoolError::UnknownEntity(stranger)
        );
    }

    #[test]
    fn test_duplicate_token_touches_nothing() {
        let mut fx = Fixture::new();
        let mut pool = ObjectPool::new(Prototype::new("Projectiles/Orb"), Category::Local, 4);
        pool.lease(&mut fx.ctx(), &mut record(5)).unwrap();

        let err = pool.lease(&mut fx.ctx(), &mut record(5)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(fx.host.alive_count(), 1);
        assert_eq!(pool.leased_count(), 1);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_preload_respects_capacity() {
        let mut fx = Fixture::new();
        let mut pool = ObjectPool::new(Prototype::new("Projectiles/Orb"), Category::Local, 3);
        assert_eq!(pool.preload(&mut fx.host, 5), 3);
        assert_eq!(pool.free_count(), 3);

        let orb = pool.lease(&mut fx.ctx(), &mut record(1)).unwrap();
        assert!(!fx.registry.token(orb).unwrap().first_lease());
        assert_eq!(fx.host.materialized_count(), 3);
    }

    #[test]
    fn test_view_pool_allocates_sub_components_for_local_owner() {
        let mut fx = Fixture::new();
        let proto = Prototype::new("Players/Avatar").with_sub_components(2);
        let mut pool = ObjectPool::new(proto, Category::ReplicatedView, 4);

        let mut rec = record(70_000);
        rec.category = Category::ReplicatedView;
        let avatar = pool.lease(&mut fx.ctx(), &mut rec).unwrap();

        let ids = vec![SubComponentId(700), SubComponentId(701)];
        assert_eq!(rec.sub_component_ids.as_deref(), Some(ids.as_slice()));
        assert_eq!(fx.host.sub_components(avatar), ids.as_slice());
        assert_eq!(fx.sub_components.in_use(), 2);

        pool.release(&mut fx.ctx(), avatar).unwrap();
        assert!(fx.host.sub_components(avatar).is_empty());
        assert_eq!(fx.sub_components.in_use(), 0);
    }

    #[test]
    fn test_view_pool_binds_remote_ids() {
        let mut fx = Fixture::new();
        let proto = Prototype::new("Players/Avatar").with_sub_components(1);
        let mut pool = ObjectPool::new(proto, Category::ReplicatedView, 4);

        let mut rec = record(30_000);
        rec.owner = OwnerId(3);
        rec.sub_component_ids = Some(vec![SubComponentId(3_000)]);
        let avatar = pool.lease(&mut fx.ctx(), &mut rec).unwrap();
        assert_eq!(fx.host.sub_components(avatar), &[SubComponentId(3_000)]);
        assert_eq!(fx.sub_components.in_use(), 0);

        // More ids than slots binds nothing.
        let mut rec = record(30_001);
        rec.owner = OwnerId(3);
        rec.sub_component_ids = Some(vec![SubComponentId(3_001), SubComponentId(3_002)]);
        let other = pool.lease(&mut fx.ctx(), &mut rec).unwrap();
        assert!(fx.host.sub_components(other).is_empty());
    }

    #[test]
    fn test_view_pool_requires_sub_components() {
        let mut fx = Fixture::new();
        let mut pool = ObjectPool::new(Prototype::new("Projectiles/Orb"), Category::ReplicatedView, 4);

        let err = pool.lease(&mut fx.ctx(), &mut record(1)).unwrap_err();
        assert_eq!(err, PoolError::NoSubComponents("Projectiles/Orb".into()));
        assert!(fx.registry.is_empty());
        // The materialized entity is kept for later, inactive.
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.leased_count(), 0);
    }

    #[test]
    fn test_token_keeps_payload() {
        let mut fx = Fixture::new();
        let mut pool = ObjectPool::new(Prototype::new("Projectiles/Orb"), Category::Local, 4);
        let mut rec = record(1).with_payload(vec![Value::Int(3), Value::Str("fire".into())]);
        let orb = pool.lease(&mut fx.ctx(), &mut rec).unwrap();
        assert_eq!(fx.registry.token(orb).unwrap().payload(), rec.payload.as_slice());
    }

    #[test]
    fn test_drain_destroys_everything() {
        let mut fx = Fixture::new();
        let mut pool = ObjectPool::new(Prototype::new("Projectiles/Orb"), Category::Local, 4);
        pool.preload(&mut fx.host, 2);
        pool.lease(&mut fx.ctx(), &mut record(1)).unwrap();
        pool.lease(&mut fx.ctx(), &mut record(2)).unwrap();
        pool.lease(&mut fx.ctx(), &mut record(3)).unwrap();

        assert_eq!(pool.drain(&mut fx.host), 3);
        assert_eq!(fx.host.alive_count(), 0);
    }
}
