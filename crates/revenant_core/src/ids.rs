//! # Identifier Allocation
//!
//! Token ids are partitioned into disjoint contiguous ranges by owner:
//!
//! ```text
//! owner 0: [0,      C)
//! owner 1: [C,     2C)
//! owner 7: [7C,    8C)      C = capacity (10000 by default)
//! ```
//!
//! Peers allocate for themselves without coordinating, and two owners can
//! never produce the same id. Within a range a rotating counter proposes
//! candidates; the first one that is not live wins.

use std::collections::{HashMap, HashSet};

use revenant_shared::{OwnerId, SubComponentId, TokenId};

use crate::error::{PoolError, PoolResult};

/// Computes the first id of an owner's range, if the whole range fits in `u32`.
fn range_base(owner: OwnerId, capacity: u32) -> Option<u32> {
    let base = owner.0.checked_mul(capacity)?;
    base.checked_add(capacity - 1)?;
    Some(base)
}

/// Owner-scoped token allocator.
///
/// Probes at most `capacity` candidates per call, so allocation fails with
/// [`PoolError::AllocationExhausted`] instead of spinning when every id in
/// the owner's range is live.
///
/// # Example
///
/// ```rust
/// use revenant_core::TokenAllocator;
/// use revenant_shared::{OwnerId, TokenId};
///
/// let mut tokens = TokenAllocator::new(10_000);
/// let first = tokens.allocate(OwnerId(7), |_| false).unwrap();
/// assert_eq!(first, TokenId(70_000));
/// ```
#[derive(Clone, Debug)]
pub struct TokenAllocator {
    /// Ids per owner.
    capacity: u32,
    /// Rotating counter shared by all owners allocated through this instance.
    counter: u32,
}

impl TokenAllocator {
    /// Creates an allocator with the given per-owner capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        Self { capacity, counter: 0 }
    }

    /// Returns the per-owner capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Allocates a token for `owner`.
    ///
    /// `is_live` reports whether a candidate is already held by a live
    /// entity; the registry's by-token index is the usual answer.
    ///
    /// # Errors
    ///
    /// - [`PoolError::OwnerOutOfRange`] if the owner's range overflows `u32`
    /// - [`PoolError::AllocationExhausted`] if every probe hits a live token
    pub fn allocate(
        &mut self,
        owner: OwnerId,
        is_live: impl Fn(TokenId) -> bool,
    ) -> PoolResult<TokenId> {
        let base = range_base(owner, self.capacity).ok_or(PoolError::OwnerOutOfRange(owner))?;

        for _ in 0..self.capacity {
            let candidate = TokenId(base + self.counter);
            self.counter = (self.counter + 1) % self.capacity;
            if !is_live(candidate) {
                return Ok(candidate);
            }
        }

        tracing::warn!(
            "Owner {} has {} live tokens, refusing to allocate more",
            owner,
            self.capacity
        );
        Err(PoolError::AllocationExhausted {
            owner,
            capacity: self.capacity,
        })
    }

    /// Returns the owner whose range contains `token`.
    #[inline]
    #[must_use]
    pub const fn owner_of(&self, token: TokenId) -> OwnerId {
        OwnerId(token.0 / self.capacity)
    }

    /// Restarts the rotating counter.
    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

/// Owner-scoped allocator for networked sub-component ids.
///
/// Same range layout as tokens, but this allocator tracks the ids in use
/// itself since sub-components are not indexed by the registry.
#[derive(Clone, Debug)]
pub struct SubComponentIdAllocator {
    /// Ids per owner.
    capacity: u32,
    /// Next candidate offset per owner.
    counters: HashMap<OwnerId, u32>,
    /// Ids currently bound to a leased entity.
    in_use: HashSet<SubComponentId>,
}

impl SubComponentIdAllocator {
    /// Creates an allocator with the given per-owner capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        Self {
            capacity,
            counters: HashMap::new(),
            in_use: HashSet::new(),
        }
    }

    /// Number of ids currently in use.
    #[inline]
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }

    /// Whether `id` is currently allocated.
    #[inline]
    #[must_use]
    pub fn is_in_use(&self, id: SubComponentId) -> bool {
        self.in_use.contains(&id)
    }

    /// Allocates `count` ids for `owner`. All or nothing.
    ///
    /// # Errors
    ///
    /// - [`PoolError::OwnerOutOfRange`] if the owner's range overflows `u32`
    /// - [`PoolError::SubComponentsExhausted`] if the range runs out
    pub fn allocate(&mut self, owner: OwnerId, count: usize) -> PoolResult<Vec<SubComponentId>> {
        let base = range_base(owner, self.capacity).ok_or(PoolError::OwnerOutOfRange(owner))?;
        let mut allocated = Vec::with_capacity(count);

        while allocated.len() < count {
            match self.probe(owner, base) {
                Some(id) => {
                    self.in_use.insert(id);
                    allocated.push(id);
                }
                None => {
                    self.release_all(&allocated);
                    return Err(PoolError::SubComponentsExhausted(owner));
                }
            }
        }

        Ok(allocated)
    }

    fn probe(&mut self, owner: OwnerId, base: u32) -> Option<SubComponentId> {
        let counter = self.counters.entry(owner).or_insert(0);
        for _ in 0..self.capacity {
            let candidate = SubComponentId(base + *counter);
            *counter = (*counter + 1) % self.capacity;
            if !self.in_use.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Returns ids to the allocator. Unknown ids are ignored.
    pub fn release_all(&mut self, ids: &[SubComponentId]) {
        for id in ids {
            self.in_use.remove(id);
        }
    }

    /// Forgets every allocation.
    pub fn clear(&mut self) {
        self.counters.clear();
        self.in_use.clear();
    }
}
