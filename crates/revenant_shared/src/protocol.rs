//! Identifiers and records shared by every peer.
//!
//! An [`InstantiationRecord`] is the only thing a peer needs to reproduce a
//! creation locally. Both sides must agree on these definitions.

use std::fmt;

use crate::math::Placement;
use serde::{Deserialize, Serialize};

/// Event code used for every replication event on the transport.
pub const REPLICATION_EVENT_CODE: u8 = 199;

/// Numeric identity of a peer.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one leased entity, unique among live entities.
///
/// Allocated in owner-scoped ranges: `owner * capacity + n`.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub u32);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a networked sub-component of an entity.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubComponentId(pub u32);

impl fmt::Display for SubComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replication mode of an entity.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Never leaves this peer.
    Local = 1,
    /// Replicated, with networked sub-component ids assigned per lease.
    ReplicatedView = 2,
    /// Replicated through generic create/destroy events only.
    ReplicatedRpc = 3,
}

impl Category {
    /// All categories, in discriminant order.
    pub const ALL: [Self; 3] = [Self::Local, Self::ReplicatedView, Self::ReplicatedRpc];

    /// Converts from the wire discriminant.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Local),
            2 => Some(Self::ReplicatedView),
            3 => Some(Self::ReplicatedRpc),
            _ => None,
        }
    }

    /// Whether creations in this category are broadcast to other peers.
    #[must_use]
    pub const fn is_replicated(self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "Local",
            Self::ReplicatedView => "ReplicatedView",
            Self::ReplicatedRpc => "ReplicatedRpc",
        };
        f.write_str(name)
    }
}

/// One opaque payload value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    Nil,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Float
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Vector
    Vec3(crate::math::Vec3),
    /// Rotation
    Quaternion(crate::math::Quaternion),
    /// Nested list
    List(Vec<Value>),
}

/// Everything needed to create one entity, locally or on a remote peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstantiationRecord {
    /// Prototype path, e.g. `"Projectiles/Orb"`.
    pub prototype: String,
    /// Where the entity appears.
    pub placement: Placement,
    /// Replication mode.
    pub category: Category,
    /// Peer that owns the entity.
    pub owner: OwnerId,
    /// Token the entity is registered under.
    pub token: TokenId,
    /// Networked sub-component ids, for categories that use them.
    pub sub_component_ids: Option<Vec<SubComponentId>>,
    /// Opaque application data.
    pub payload: Vec<Value>,
}

impl InstantiationRecord {
    /// Creates a record with no owner, token or payload yet.
    #[must_use]
    pub fn new(prototype: impl Into<String>, placement: Placement, category: Category) -> Self {
        Self {
            prototype: prototype.into(),
            placement,
            category,
            owner: OwnerId::default(),
            token: TokenId::default(),
            sub_component_ids: None,
            payload: Vec::new(),
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Last path segment of the prototype, used for entity names.
    #[must_use]
    pub fn prototype_basename(&self) -> &str {
        basename(&self.prototype)
    }
}

/// Last `/`-separated segment of a prototype path.
#[must_use]
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
