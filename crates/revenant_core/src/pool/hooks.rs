//! Per-category activation strategies.
//!
//! The three categories share one pool implementation. A category that
//! needs extra work around activation plugs in an [`ActivationHooks`];
//! today that is only [`SubComponentHooks`] for `ReplicatedView`.

use std::fmt;

use revenant_shared::{Category, InstantiationRecord};

use super::LeaseContext;
use crate::error::{PoolError, PoolResult};
use crate::host::{EntityHandle, Prototype};
use crate::token::PoolToken;

/// Work done right before an entity is activated or deactivated.
pub trait ActivationHooks: fmt::Debug + Send {
    /// Runs after the entity is taken from the free list or materialized,
    /// before it is placed, registered or activated. May rewrite the record.
    ///
    /// # Errors
    ///
    /// Any error aborts the lease; the entity goes back to the pool.
    fn pre_activate(
        &mut self,
        ctx: &mut LeaseContext<'_>,
        entity: EntityHandle,
        prototype: &Prototype,
        record: &mut InstantiationRecord,
    ) -> PoolResult<()>;

    /// Runs after the entity is unregistered, before it is deactivated.
    fn pre_deactivate(&mut self, ctx: &mut LeaseContext<'_>, entity: EntityHandle, token: &PoolToken);
}

/// Hooks for a category, if it needs any.
#[must_use]
pub fn for_category(category: Category) -> Option<Box<dyn ActivationHooks>> {
    match category {
        Category::ReplicatedView => Some(Box::new(SubComponentHooks)),
        Category::Local | Category::ReplicatedRpc => None,
    }
}

/// Assigns networked sub-component ids.
///
/// - ids in the record (remote creation) are bound as given
/// - no ids and a local owner: one id per slot is allocated and written
///   back into the record so the broadcast carries them
/// - no ids and a remote owner: nothing is bound
#[derive(Debug, Default)]
pub struct SubComponentHooks;

impl ActivationHooks for SubComponentHooks {
    fn pre_activate(
        &mut self,
        ctx: &mut LeaseContext<'_>,
        entity: EntityHandle,
        prototype: &Prototype,
        record: &mut InstantiationRecord,
    ) -> PoolResult<()> {
        let slots = prototype.sub_component_slots();
        if slots == 0 {
            tracing::error!("{} is leased as ReplicatedView but has no sub-components", record.prototype);
            return Err(PoolError::NoSubComponents(record.prototype.clone()));
        }

        match &record.sub_component_ids {
            Some(ids) if ids.len() != slots => {
                tracing::warn!(
                    "Received {} sub-component ids for {} which has {} slots, binding none",
                    ids.len(),
                    record.prototype,
                    slots
                );
            }
            Some(ids) => ctx.host.bind_sub_components(entity, record.owner, ids),
            None if record.owner == ctx.local_owner => {
                let ids = ctx.sub_components.allocate(record.owner, slots)?;
                ctx.host.bind_sub_components(entity, record.owner, &ids);
                record.sub_component_ids = Some(ids);
            }
            None => {}
        }
        Ok(())
    }

    fn pre_deactivate(&mut self, ctx: &mut LeaseContext<'_>, entity: EntityHandle, token: &PoolToken) {
        ctx.host.unbind_sub_components(entity);
        if token.owner == ctx.local_owner {
            if let Some(ids) = &token.sub_component_ids {
                ctx.sub_components.release_all(ids);
            }
        }
    }
}
