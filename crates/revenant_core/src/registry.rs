//! # Managed Object Registry
//!
//! Index over every leased entity of every pool in a session:
//!
//! | index | cardinality |
//! |---|---|
//! | token id → entity | 1:1 |
//! | prototype → entities | 1:many |
//! | owner → entities | 1:many |
//! | owner → player controller | 1:0-or-1 |
//!
//! All four are updated together in [`ManagedObjectRegistry::add`] and
//! [`ManagedObjectRegistry::remove`]; nothing else writes them.

use std::collections::HashMap;

use revenant_shared::{OwnerId, TokenId};

use crate::error::{PoolError, PoolResult};
use crate::host::{EntityHandle, PrototypeKey};
use crate::token::PoolToken;

/// Registry of live leased entities.
#[derive(Debug, Default)]
pub struct ManagedObjectRegistry {
    tokens: HashMap<EntityHandle, PoolToken>,
    by_token: HashMap<TokenId, EntityHandle>,
    by_prototype: HashMap<PrototypeKey, Vec<EntityHandle>>,
    by_owner: HashMap<OwnerId, Vec<EntityHandle>>,
    controllers: HashMap<OwnerId, EntityHandle>,
}

impl ManagedObjectRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Checks that an entity with this metadata could be added.
    ///
    /// # Errors
    ///
    /// [`PoolError::DuplicateToken`] or [`PoolError::DuplicateController`].
    pub fn check_insert(&self, token: TokenId, owner: OwnerId, player_controller: bool) -> PoolResult<()> {
        if let Some(&existing) = self.by_token.get(&token) {
            return Err(PoolError::DuplicateToken { token, existing });
        }
        if player_controller {
            if let Some(&existing) = self.controllers.get(&owner) {
                return Err(PoolError::DuplicateController { owner, existing });
            }
        }
        Ok(())
    }

    /// Indexes a leased entity.
    ///
    /// # Errors
    ///
    /// [`PoolError::DuplicateToken`] if the token id is live, or
    /// [`PoolError::DuplicateController`] if the owner already has a player
    /// controller. Both are fatal; the registry is left unchanged.
    pub fn add(&mut self, entity: EntityHandle, token: PoolToken) -> PoolResult<()> {
        if let Err(err) = self.check_insert(token.token, token.owner, token.player_controller) {
            tracing::error!("Registry rejected {:?}: {}", entity, err);
            return Err(err);
        }

        self.by_token.insert(token.token, entity);
        self.by_prototype
            .entry(token.prototype.clone())
            .or_default()
            .push(entity);
        self.by_owner.entry(token.owner).or_default().push(entity);
        if token.player_controller {
            self.controllers.insert(token.owner, entity);
        }
        self.tokens.insert(entity, token);
        Ok(())
    }

    /// Removes an entity from every index and returns its token.
    ///
    /// # Errors
    ///
    /// [`PoolError::UnknownToken`] if the entity is not registered.
    pub fn remove(&mut self, entity: EntityHandle) -> PoolResult<PoolToken> {
        let Some(token) = self.tokens.remove(&entity) else {
            tracing::error!("Registry has no token for {:?}", entity);
            return Err(PoolError::UnknownToken(entity));
        };

        self.by_token.remove(&token.token);
        detach(&mut self.by_prototype, &token.prototype, entity);
        detach(&mut self.by_owner, &token.owner, entity);
        if self.controllers.get(&token.owner) == Some(&entity) {
            self.controllers.remove(&token.owner);
        }
        Ok(token)
    }

    /// Entity holding `token`.
    #[inline]
    #[must_use]
    pub fn find(&self, token: TokenId) -> Option<EntityHandle> {
        self.by_token.get(&token).copied()
    }

    /// Whether `token` is held by a live entity.
    #[inline]
    #[must_use]
    pub fn contains_token(&self, token: TokenId) -> bool {
        self.by_token.contains_key(&token)
    }

    /// Metadata of a registered entity.
    #[inline]
    #[must_use]
    pub fn token(&self, entity: EntityHandle) -> Option<&PoolToken> {
        self.tokens.get(&entity)
    }

    /// Metadata of the entity holding `token`.
    #[must_use]
    pub fn token_by_id(&self, token: TokenId) -> Option<&PoolToken> {
        self.find(token).and_then(|entity| self.tokens.get(&entity))
    }

    /// Entities of one prototype, in lease order.
    #[must_use]
    pub fn by_prototype(&self, prototype: &str) -> &[EntityHandle] {
        self.by_prototype.get(prototype).map_or(&[], Vec::as_slice)
    }

    /// Entities of one owner, in lease order.
    #[must_use]
    pub fn by_owner(&self, owner: OwnerId) -> &[EntityHandle] {
        self.by_owner.get(&owner).map_or(&[], Vec::as_slice)
    }

    /// Player controller of `owner`.
    #[inline]
    #[must_use]
    pub fn controller_of(&self, owner: OwnerId) -> Option<EntityHandle> {
        self.controllers.get(&owner).copied()
    }

    /// Entities of `owner` leased from `prototype`.
    #[must_use]
    pub fn owner_objects_of_type(&self, owner: OwnerId, prototype: &str) -> Vec<EntityHandle> {
        self.by_owner(owner)
            .iter()
            .copied()
            .filter(|entity| self.tokens.get(entity).is_some_and(|t| &*t.prototype == prototype))
            .collect()
    }

    /// Every registered entity, ordered by token id.
    #[must_use]
    pub fn all(&self) -> Vec<EntityHandle> {
        let mut tokens: Vec<_> = self.by_token.iter().collect();
        tokens.sort_unstable_by_key(|(token, _)| **token);
        tokens.into_iter().map(|(_, entity)| *entity).collect()
    }

    /// Drops every index.
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.by_token.clear();
        self.by_prototype.clear();
        self.by_owner.clear();
        self.controllers.clear();
    }

    /// Whether all four indices describe the same set of entities.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let prototype_total: usize = self.by_prototype.values().map(Vec::len).sum();
        let owner_total: usize = self.by_owner.values().map(Vec::len).sum();
        if self.by_token.len() != self.tokens.len()
            || prototype_total != self.tokens.len()
            || owner_total != self.tokens.len()
        {
            return false;
        }

        let indexed = self.tokens.iter().all(|(entity, token)| {
            self.by_token.get(&token.token) == Some(entity)
                && self.by_prototype(&token.prototype).contains(entity)
                && self.by_owner(token.owner).contains(entity)
                && (!token.player_controller || self.controllers.get(&token.owner) == Some(entity))
        });
        let controllers = self.controllers.iter().all(|(owner, entity)| {
            self.tokens
                .get(entity)
                .is_some_and(|t| t.player_controller && t.owner == *owner)
        });
        indexed && controllers
    }
}

fn detach<K: std::hash::Hash + Eq>(index: &mut HashMap<K, Vec<EntityHandle>>, key: &K, entity: EntityHandle) {
    if let Some(entities) = index.get_mut(key) {
        entities.retain(|e| *e != entity);
        if entities.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use revenant_shared::Category;

    fn token(id: u32, owner: u32, prototype: &str) -> PoolToken {
        PoolToken {
            token: TokenId(id),
            owner: OwnerId(owner),
            category: Category::Local,
            prototype: prototype.into(),
            first_lease: true,
            usable: true,
            player_controller: false,
            sub_component_ids: None,
            payload: Vec::new(),
        }
    }

    #[test]
    fn test_add_indexes_everything() {
        let mut registry = ManagedObjectRegistry::new();
        let a = EntityHandle::new(0, 0);
        let b = EntityHandle::new(1, 0);
        registry.add(a, token(70_000, 7, "Orb")).unwrap();
        registry.add(b, token(70_001, 7, "Bat")).unwrap();

        assert_eq!(registry.find(TokenId(70_000)), Some(a));
        assert_eq!(registry.by_prototype("Orb"), &[a]);
        assert_eq!(registry.by_owner(OwnerId(7)), &[a, b]);
        assert_eq!(registry.owner_objects_of_type(OwnerId(7), "Bat"), vec![b]);
        assert_eq!(registry.all(), vec![a, b]);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_duplicate_token_is_rejected() {
        let mut registry = ManagedObjectRegistry::new();
        let a = EntityHandle::new(0, 0);
        registry.add(a, token(5, 0, "Orb")).unwrap();

        let err = registry.add(EntityHandle::new(1, 0), token(5, 0, "Orb")).unwrap_err();
        assert_eq!(err, PoolError::DuplicateToken { token: TokenId(5), existing: a });
        assert_eq!(registry.len(), 1);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_single_controller_per_owner() {
        let mut registry = ManagedObjectRegistry::new();
        let a = EntityHandle::new(0, 0);
        let mut first = token(1, 3, "Avatar");
        first.player_controller = true;
        registry.add(a, first).unwrap();
        assert_eq!(registry.controller_of(OwnerId(3)), Some(a));

        let mut second = token(2, 3, "Avatar");
        second.player_controller = true;
        let err = registry.add(EntityHandle::new(1, 0), second).unwrap_err();
        assert_eq!(err, PoolError::DuplicateController { owner: OwnerId(3), existing: a });

        registry.remove(a).unwrap();
        assert_eq!(registry.controller_of(OwnerId(3)), None);
    }

    #[test]
    fn test_remove_unknown() {
        let mut registry = ManagedObjectRegistry::new();
        let ghost = EntityHandle::new(9, 2);
        assert_eq!(registry.remove(ghost).unwrap_err(), PoolError::UnknownToken(ghost));
    }

    #[test]
    fn test_random_churn_stays_consistent() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let mut registry = ManagedObjectRegistry::new();
        let mut live: Vec<EntityHandle> = Vec::new();
        let prototypes = ["Orb", "Bat", "Avatar"];

        for step in 0..2_000u32 {
            if live.is_empty() || rng.gen_bool(0.6) {
                let entity = EntityHandle::new(step, 0);
                let owner = rng.gen_range(0..4);
                let proto = prototypes[rng.gen_range(0..prototypes.len())];
                registry.add(entity, token(step, owner, proto)).unwrap();
                live.push(entity);
            } else {
                let victim = live.swap_remove(rng.gen_range(0..live.len()));
                registry.remove(victim).unwrap();
            }
            assert!(registry.is_consistent(), "inconsistent after step {step}");
        }
        assert_eq!(registry.len(), live.len());
    }
}
