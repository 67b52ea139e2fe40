//! # Host Collaborators
//!
//! The pool never owns scene state. Everything it does to an entity goes
//! through two seams:
//!
//! - [`PrototypeSource`] resolves a prototype path to a [`Prototype`]
//! - [`EntityHost`] materializes, places, activates, parents and destroys
//!
//! A deterministic in-memory implementation of both lives in [`memory`]; it
//! backs the tests and is usable as a headless host.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use revenant_shared::{OwnerId, Placement, SubComponentId};

/// Handle to an entity owned by the host.
///
/// Lower 32 bits are a slot index, upper 32 bits a generation counter, so a
/// handle to a destroyed entity never aliases a newer one in the same slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityHandle(u64);

impl EntityHandle {
    /// Creates a handle from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Generation of the slot when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Packed representation.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Rebuilds a handle from [`EntityHandle::to_raw`].
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

/// Interned prototype path.
pub type PrototypeKey = Arc<str>;

/// A resolved template from which entities are materialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prototype {
    key: PrototypeKey,
    default_active: bool,
    player_controller: bool,
    sub_component_slots: usize,
}

impl Prototype {
    /// An active-by-default prototype with no special roles.
    #[must_use]
    pub fn new(key: impl Into<PrototypeKey>) -> Self {
        Self {
            key: key.into(),
            default_active: true,
            player_controller: false,
            sub_component_slots: 0,
        }
    }

    /// Leased entities stay inactive until the application enables them.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.default_active = false;
        self
    }

    /// Entities of this prototype are their owner's player controller.
    #[must_use]
    pub fn player_controller(mut self) -> Self {
        self.player_controller = true;
        self
    }

    /// Declares networked sub-component slots.
    #[must_use]
    pub fn with_sub_components(mut self, slots: usize) -> Self {
        self.sub_component_slots = slots;
        self
    }

    /// Prototype path.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &PrototypeKey {
        &self.key
    }

    /// Activation state applied after a lease.
    #[inline]
    #[must_use]
    pub const fn default_active(&self) -> bool {
        self.default_active
    }

    /// Whether entities of this prototype are player controllers.
    #[inline]
    #[must_use]
    pub const fn is_player_controller(&self) -> bool {
        self.player_controller
    }

    /// Number of networked sub-components on each entity.
    #[inline]
    #[must_use]
    pub const fn sub_component_slots(&self) -> usize {
        self.sub_component_slots
    }
}

/// Resolves prototype paths. `None` means the asset does not exist.
pub trait PrototypeSource {
    /// Looks up a prototype by path.
    fn resolve(&self, path: &str) -> Option<Prototype>;
}

/// Sent to the host so entity logic can react to pooled reuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolNotification {
    /// The entity was leased.
    Leased {
        /// Freshly materialized rather than reused.
        first_lease: bool,
    },
    /// The entity was released.
    Released {
        /// Destroyed instead of returned to the free list.
        evicted: bool,
    },
}

/// The scene-graph owner of entities.
///
/// Calls arrive on the session thread only. Handles passed in were returned
/// by [`EntityHost::materialize`] and not yet destroyed.
pub trait EntityHost {
    /// Creates a new, inactive entity from `prototype`.
    fn materialize(&mut self, prototype: &Prototype) -> EntityHandle;

    /// Enables or disables the entity.
    fn activate(&mut self, entity: EntityHandle, active: bool);

    /// Moves the entity.
    fn set_placement(&mut self, entity: EntityHandle, placement: Placement);

    /// Destroys the entity. The handle is dead afterwards.
    fn destroy_irrecoverably(&mut self, entity: EntityHandle);

    /// Attaches the entity under `parent`, or to the scene root for `None`.
    fn reparent(&mut self, entity: EntityHandle, parent: Option<EntityHandle>);

    /// Current parent of the entity.
    fn parent(&self, entity: EntityHandle) -> Option<EntityHandle>;

    /// Zeroes velocities and other owned kinetic state.
    fn reset_kinetics(&mut self, _entity: EntityHandle) {}

    /// Sets a display name.
    fn rename(&mut self, _entity: EntityHandle, _name: &str) {}

    /// Assigns networked sub-component ids, in slot order.
    fn bind_sub_components(&mut self, _entity: EntityHandle, _owner: OwnerId, _ids: &[SubComponentId]) {}

    /// Clears networked sub-component ids.
    fn unbind_sub_components(&mut self, _entity: EntityHandle) {}

    /// Delivers a lifecycle notification.
    fn notify(&mut self, _entity: EntityHandle, _notification: PoolNotification) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_packing() {
        let handle = EntityHandle::new(12345, 67890);
        assert_eq!(handle.index(), 12345);
        assert_eq!(handle.generation(), 67890);
        assert_eq!(EntityHandle::from_raw(handle.to_raw()), handle);
        assert_eq!(format!("{handle:?}"), "Entity(12345v67890)");
    }

    #[test]
    fn test_prototype_builder() {
        let proto = Prototype::new("Players/Avatar")
            .inactive()
            .player_controller()
            .with_sub_components(2);
        assert_eq!(&**proto.key(), "Players/Avatar");
        assert!(!proto.default_active());
        assert!(proto.is_player_controller());
        assert_eq!(proto.sub_component_slots(), 2);

        let plain = Prototype::new("Orb");
        assert!(plain.default_active());
        assert!(!plain.is_player_controller());
    }
}
