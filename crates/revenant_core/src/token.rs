//! Pool metadata attached to a leased entity.

use revenant_shared::{Category, OwnerId, SubComponentId, TokenId, Value};

use crate::host::PrototypeKey;

/// Metadata of one leased entity.
///
/// Built by the pool on lease and owned by the registry while the entity is
/// live. Only the pool mutates it.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolToken {
    pub(crate) token: TokenId,
    pub(crate) owner: OwnerId,
    pub(crate) category: Category,
    pub(crate) prototype: PrototypeKey,
    pub(crate) first_lease: bool,
    pub(crate) usable: bool,
    pub(crate) player_controller: bool,
    pub(crate) sub_component_ids: Option<Vec<SubComponentId>>,
    pub(crate) payload: Vec<Value>,
}

impl PoolToken {
    /// Token id.
    #[inline]
    #[must_use]
    pub const fn token(&self) -> TokenId {
        self.token
    }

    /// Owning peer.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Replication mode.
    #[inline]
    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    /// Prototype path.
    #[inline]
    #[must_use]
    pub fn prototype(&self) -> &PrototypeKey {
        &self.prototype
    }

    /// True only when this lease materialized a fresh entity.
    #[inline]
    #[must_use]
    pub const fn first_lease(&self) -> bool {
        self.first_lease
    }

    /// False once the entity has been evicted.
    #[inline]
    #[must_use]
    pub const fn usable(&self) -> bool {
        self.usable
    }

    /// Whether the entity is its owner's player controller.
    #[inline]
    #[must_use]
    pub const fn is_player_controller(&self) -> bool {
        self.player_controller
    }

    /// Networked sub-component ids bound at lease time.
    #[must_use]
    pub fn sub_component_ids(&self) -> Option<&[SubComponentId]> {
        self.sub_component_ids.as_deref()
    }

    /// Application payload of the instantiation.
    #[must_use]
    pub fn payload(&self) -> &[Value] {
        &self.payload
    }

    /// Whether `local` owns this entity.
    #[inline]
    #[must_use]
    pub fn is_mine(&self, local: OwnerId) -> bool {
        self.owner == local
    }
}
