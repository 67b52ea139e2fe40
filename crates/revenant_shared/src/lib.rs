//! # REVENANT Shared
//!
//! Value types every peer must agree on.
//!
//! ## CRITICAL RULE
//!
//! Discriminants and field keys defined here are part of the wire format.
//! Add new variants and keys, never renumber existing ones.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod math;
pub mod protocol;

pub use math::{Placement, Quaternion, Vec3};
pub use protocol::{
    basename, Category, InstantiationRecord, OwnerId, SubComponentId, TokenId, Value,
    REPLICATION_EVENT_CODE,
};
