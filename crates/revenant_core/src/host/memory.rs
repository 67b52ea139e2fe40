//! # In-Memory Host
//!
//! A headless scene: entity slots with generation counters and a free list
//! of slot indices, plus enough per-entity state (placement, parent,
//! activation, velocity, name, sub-component ids, notifications) to observe
//! everything the pool does.

use std::collections::HashMap;

use revenant_shared::{OwnerId, Placement, SubComponentId, Vec3};

use super::{EntityHandle, EntityHost, PoolNotification, Prototype, PrototypeKey, PrototypeSource};

/// Observable state of one live entity.
#[derive(Clone, Debug)]
pub struct EntityState {
    /// Prototype it was materialized from.
    pub prototype: PrototypeKey,
    /// Activation flag.
    pub active: bool,
    /// Current placement.
    pub placement: Placement,
    /// Parent entity, `None` at the scene root.
    pub parent: Option<EntityHandle>,
    /// Linear velocity, zeroed by [`EntityHost::reset_kinetics`].
    pub velocity: Vec3,
    /// Display name.
    pub name: String,
    /// Bound networked sub-component ids.
    pub sub_components: Vec<SubComponentId>,
    /// Owner the sub-components were bound for.
    pub sub_component_owner: Option<OwnerId>,
    /// Every notification received, oldest first.
    pub notifications: Vec<PoolNotification>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    state: Option<EntityState>,
}

/// Entity host backed by plain vectors.
///
/// Destroyed slots are recycled with a bumped generation, so stale handles
/// are detected rather than silently aliasing.
///
/// # Example
///
/// ```rust
/// use revenant_core::host::memory::MemoryHost;
/// use revenant_core::host::{EntityHost, Prototype};
///
/// let mut host = MemoryHost::new();
/// let orb = host.materialize(&Prototype::new("Orb"));
/// assert!(host.is_alive(orb));
/// assert!(!host.is_active(orb));
///
/// host.destroy_irrecoverably(orb);
/// assert!(!host.is_alive(orb));
/// ```
#[derive(Debug, Default)]
pub struct MemoryHost {
    slots: Vec<Slot>,
    free_indices: Vec<u32>,
    alive_count: usize,
    materialized: u64,
    destroyed: u64,
}

impl MemoryHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Total entities ever materialized.
    #[inline]
    #[must_use]
    pub const fn materialized_count(&self) -> u64 {
        self.materialized
    }

    /// Total entities destroyed.
    #[inline]
    #[must_use]
    pub const fn destroyed_count(&self) -> u64 {
        self.destroyed
    }

    /// Returns the state of a live entity.
    #[must_use]
    pub fn state(&self, entity: EntityHandle) -> Option<&EntityState> {
        let slot = self.slots.get(entity.index() as usize)?;
        if slot.generation != entity.generation() {
            return None;
        }
        slot.state.as_ref()
    }

    fn state_mut(&mut self, entity: EntityHandle) -> Option<&mut EntityState> {
        let slot = self.slots.get_mut(entity.index() as usize)?;
        if slot.generation != entity.generation() {
            return None;
        }
        slot.state.as_mut()
    }

    /// Whether the handle refers to a live entity.
    #[must_use]
    pub fn is_alive(&self, entity: EntityHandle) -> bool {
        self.state(entity).is_some()
    }

    /// Whether the entity is live and active.
    #[must_use]
    pub fn is_active(&self, entity: EntityHandle) -> bool {
        self.state(entity).is_some_and(|s| s.active)
    }

    /// Placement of a live entity.
    #[must_use]
    pub fn placement(&self, entity: EntityHandle) -> Option<Placement> {
        self.state(entity).map(|s| s.placement)
    }

    /// Name of a live entity.
    #[must_use]
    pub fn name(&self, entity: EntityHandle) -> Option<&str> {
        self.state(entity).map(|s| s.name.as_str())
    }

    /// Prototype of a live entity.
    #[must_use]
    pub fn prototype_of(&self, entity: EntityHandle) -> Option<&PrototypeKey> {
        self.state(entity).map(|s| &s.prototype)
    }

    /// Velocity of a live entity.
    #[must_use]
    pub fn velocity(&self, entity: EntityHandle) -> Option<Vec3> {
        self.state(entity).map(|s| s.velocity)
    }

    /// Gives an entity some motion; the pool must clear it on reuse.
    pub fn set_velocity(&mut self, entity: EntityHandle, velocity: Vec3) {
        if let Some(state) = self.state_mut(entity) {
            state.velocity = velocity;
        }
    }

    /// Sub-component ids bound to a live entity.
    #[must_use]
    pub fn sub_components(&self, entity: EntityHandle) -> &[SubComponentId] {
        self.state(entity).map_or(&[], |s| s.sub_components.as_slice())
    }

    /// Notifications received by a live entity.
    #[must_use]
    pub fn notifications(&self, entity: EntityHandle) -> &[PoolNotification] {
        self.state(entity).map_or(&[], |s| s.notifications.as_slice())
    }

    /// Live children of `parent`.
    #[must_use]
    pub fn children(&self, parent: EntityHandle) -> Vec<EntityHandle> {
        self.live()
            .filter(|(_, s)| s.parent == Some(parent))
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Iterates live entities in slot order.
    pub fn live(&self) -> impl Iterator<Item = (EntityHandle, &EntityState)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            #[allow(clippy::cast_possible_truncation)]
            let handle = EntityHandle::new(index as u32, slot.generation);
            slot.state.as_ref().map(|state| (handle, state))
        })
    }
}

impl EntityHost for MemoryHost {
    fn materialize(&mut self, prototype: &Prototype) -> EntityHandle {
        let state = EntityState {
            prototype: prototype.key().clone(),
            active: false,
            placement: Placement::NEUTRAL,
            parent: None,
            velocity: Vec3::ZERO,
            name: prototype.key().to_string(),
            sub_components: Vec::new(),
            sub_component_owner: None,
            notifications: Vec::new(),
        };

        let handle = if let Some(index) = self.free_indices.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.state = Some(state);
            EntityHandle::new(index, slot.generation)
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                state: Some(state),
            });
            EntityHandle::new(index, 0)
        };

        self.alive_count += 1;
        self.materialized += 1;
        handle
    }

    fn activate(&mut self, entity: EntityHandle, active: bool) {
        if let Some(state) = self.state_mut(entity) {
            state.active = active;
        }
    }

    fn set_placement(&mut self, entity: EntityHandle, placement: Placement) {
        if let Some(state) = self.state_mut(entity) {
            state.placement = placement;
        }
    }

    fn destroy_irrecoverably(&mut self, entity: EntityHandle) {
        if self.state(entity).is_none() {
            return;
        }
        for child in self.children(entity) {
            self.reparent(child, None);
        }
        self.slots[entity.index() as usize].state = None;
        self.free_indices.push(entity.index());
        self.alive_count -= 1;
        self.destroyed += 1;
    }

    fn reparent(&mut self, entity: EntityHandle, parent: Option<EntityHandle>) {
        let parent = parent.filter(|p| self.is_alive(*p));
        if let Some(state) = self.state_mut(entity) {
            state.parent = parent;
        }
    }

    fn parent(&self, entity: EntityHandle) -> Option<EntityHandle> {
        self.state(entity).and_then(|s| s.parent)
    }

    fn reset_kinetics(&mut self, entity: EntityHandle) {
        self.set_velocity(entity, Vec3::ZERO);
    }

    fn rename(&mut self, entity: EntityHandle, name: &str) {
        if let Some(state) = self.state_mut(entity) {
            name.clone_into(&mut state.name);
        }
    }

    fn bind_sub_components(&mut self, entity: EntityHandle, owner: OwnerId, ids: &[SubComponentId]) {
        if let Some(state) = self.state_mut(entity) {
            state.sub_components = ids.to_vec();
            state.sub_component_owner = Some(owner);
        }
    }

    fn unbind_sub_components(&mut self, entity: EntityHandle) {
        if let Some(state) = self.state_mut(entity) {
            state.sub_components.clear();
            state.sub_component_owner = None;
        }
    }

    fn notify(&mut self, entity: EntityHandle, notification: PoolNotification) {
        if let Some(state) = self.state_mut(entity) {
            state.notifications.push(notification);
        }
    }
}

/// Prototype catalogue backed by a map.
#[derive(Clone, Debug, Default)]
pub struct MemoryPrototypes {
    prototypes: HashMap<String, Prototype>,
}

impl MemoryPrototypes {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a prototype, replacing any with the same path.
    pub fn register(&mut self, prototype: Prototype) {
        self.prototypes.insert(prototype.key().to_string(), prototype);
    }

    /// Builder form of [`MemoryPrototypes::register`].
    #[must_use]
    pub fn with(mut self, prototype: Prototype) -> Self {
        self.register(prototype);
        self
    }
}

impl PrototypeSource for MemoryPrototypes {
    fn resolve(&self, path: &str) -> Option<Prototype> {
        self.prototypes.get(path).cloned()
    }
}
