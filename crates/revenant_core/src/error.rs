//! # Pool Error Types
//!
//! All errors that can occur while allocating, leasing or releasing entities.

use revenant_shared::{OwnerId, TokenId};
use thiserror::Error;

use crate::host::EntityHandle;

/// How a [`PoolError`] should be handled by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// A broken invariant. Not retried; expected to abort during development.
    Fatal,
    /// Out of identifiers. The specific request fails, nothing else is touched.
    Exhausted,
    /// A referenced prototype or entity does not exist. The request is aborted.
    MissingReference,
}

/// Errors that can occur in the pooling system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Every token in the owner's range is live.
    #[error("allocation exhausted: owner {owner} has {capacity} live tokens")]
    AllocationExhausted {
        /// Owner whose range is full.
        owner: OwnerId,
        /// Size of the owner's range.
        capacity: u32,
    },

    /// The owner's token range does not fit the identifier space.
    #[error("owner {0} is outside the identifier space")]
    OwnerOutOfRange(OwnerId),

    /// The prototype path could not be resolved.
    #[error("prototype not found: {0}")]
    ProtoNotFound(String),

    /// A token id was registered twice.
    #[error("duplicate token {token}: already registered to {existing:?}")]
    DuplicateToken {
        /// The token being added.
        token: TokenId,
        /// The entity already holding it.
        existing: EntityHandle,
    },

    /// An entity was removed from the registry without being in it.
    #[error("unknown token for entity {0:?}")]
    UnknownToken(EntityHandle),

    /// A second player controller was registered for one owner.
    #[error("owner {owner} already has player controller {existing:?}")]
    DuplicateController {
        /// Owner with two controllers.
        owner: OwnerId,
        /// The controller already registered.
        existing: EntityHandle,
    },

    /// The entity is not leased from any pool.
    #[error("entity {0:?} is not managed by any pool")]
    UnknownEntity(EntityHandle),

    /// The parent or sibling named by a relative creation is not registered.
    #[error("relation target {0} is not registered")]
    RelationTargetMissing(TokenId),

    /// A sub-component category was used with a prototype that has none.
    #[error("prototype {0} has no networked sub-components")]
    NoSubComponents(String),

    /// The owner's sub-component id range is full.
    #[error("sub-component ids exhausted for owner {0}")]
    SubComponentsExhausted(OwnerId),
}

impl PoolError {
    /// Classifies this error.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::AllocationExhausted { .. } | Self::SubComponentsExhausted(_) => Severity::Exhausted,
            Self::ProtoNotFound(_)
            | Self::UnknownEntity(_)
            | Self::RelationTargetMissing(_) => Severity::MissingReference,
            Self::OwnerOutOfRange(_)
            | Self::DuplicateToken { .. }
            | Self::UnknownToken(_)
            | Self::DuplicateController { .. }
            | Self::NoSubComponents(_) => Severity::Fatal,
        }
    }

    /// Returns true for broken-invariant errors.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.severity(), Severity::Fatal)
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A value is out of range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_taxonomy() {
        let exhausted = PoolError::AllocationExhausted { owner: OwnerId(7), capacity: 10 };
        assert_eq!(exhausted.severity(), Severity::Exhausted);
        assert!(!exhausted.is_fatal());

        assert_eq!(
            PoolError::ProtoNotFound("Orb".into()).severity(),
            Severity::MissingReference
        );
        assert_eq!(
            PoolError::RelationTargetMissing(TokenId(3)).severity(),
            Severity::MissingReference
        );

        let duplicate = PoolError::DuplicateToken {
            token: TokenId(1),
            existing: EntityHandle::new(0, 0),
        };
        assert!(duplicate.is_fatal());
        assert!(PoolError::NoSubComponents("Orb".into()).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = PoolError::AllocationExhausted { owner: OwnerId(7), capacity: 10000 };
        assert_eq!(err.to_string(), "allocation exhausted: owner 7 has 10000 live tokens");
        assert_eq!(
            PoolError::ProtoNotFound("Enemies/Orb".into()).to_string(),
            "prototype not found: Enemies/Orb"
        );
    }
}
