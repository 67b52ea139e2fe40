//! # Replication Error Types

use revenant_core::{ConfigError, PoolError};
use thiserror::Error;

/// Errors raised while encoding or decoding replication events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ended inside a field.
    #[error("truncated event")]
    Truncated,

    /// The method discriminant is not known to this peer.
    #[error("unknown method: {0}")]
    UnknownMethod(u8),

    /// The category discriminant is not known to this peer.
    #[error("unknown category: {0}")]
    UnknownCategory(u8),

    /// A required field is absent.
    #[error("missing field {key}")]
    MissingField {
        /// Key of the field.
        key: u8,
    },

    /// A field is present but its contents are invalid.
    #[error("malformed field {key}: {reason}")]
    Malformed {
        /// Key of the field.
        key: u8,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The encoded event exceeds the size limit.
    #[error("event of {size} bytes exceeds the {max} byte limit")]
    Oversized {
        /// Encoded size.
        size: usize,
        /// Limit.
        max: usize,
    },
}

/// Result type for wire encoding and decoding.
pub type WireResult<T> = Result<T, WireError>;

/// Errors surfaced by a replication session.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// A pool operation failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// An event could not be encoded or decoded.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The session configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An inbound event carried a code this session does not handle.
    #[error("unexpected event code {0}")]
    UnexpectedEventCode(u8),
}

impl ReplicationError {
    /// Returns true for broken-invariant errors.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Pool(err) => err.is_fatal(),
            Self::Wire(WireError::UnknownCategory(_)) | Self::Config(_) => true,
            Self::Wire(_) | Self::UnexpectedEventCode(_) => false,
        }
    }
}

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use revenant_shared::{OwnerId, TokenId};

    #[test]
    fn test_fatality_follows_pool_taxonomy() {
        let exhausted: ReplicationError = PoolError::AllocationExhausted { owner: OwnerId(1), capacity: 4 }.into();
        assert!(!exhausted.is_fatal());

        let missing: ReplicationError = PoolError::RelationTargetMissing(TokenId(3)).into();
        assert!(!missing.is_fatal());

        let category: ReplicationError = WireError::UnknownCategory(9).into();
        assert!(category.is_fatal());
        assert!(!ReplicationError::from(WireError::Truncated).is_fatal());
    }

    #[test]
    fn test_messages() {
        assert_eq!(WireError::MissingField { key: 6 }.to_string(), "missing field 6");
        assert_eq!(
            ReplicationError::from(PoolError::ProtoNotFound("Orb".into())).to_string(),
            "prototype not found: Orb"
        );
    }
}
