//! # REVENANT Core
//!
//! Pooled, owner-tagged entities for a replicated world:
//! - owner-scoped token allocation with no cross-peer coordination
//! - per-prototype pools that reuse entities or evict them past capacity
//! - a registry indexing every leased entity by token, prototype and owner
//!
//! ## Architecture Rules
//!
//! 1. **Single-threaded** - one thread owns a [`PoolState`]; nothing here locks
//! 2. **Injected collaborators** - the scene lives behind [`EntityHost`]
//! 3. **No ambient state** - every session builds and tears down its own state
//!
//! ## Example
//!
//! ```rust
//! use revenant_core::host::memory::{MemoryHost, MemoryPrototypes};
//! use revenant_core::{LocalCreate, PoolState, PoolingConfig, Prototype};
//! use revenant_shared::{Category, OwnerId, Placement, TokenId};
//!
//! let prototypes = MemoryPrototypes::new().with(Prototype::new("Projectiles/Orb"));
//! let mut host = MemoryHost::new();
//! let mut state = PoolState::new(PoolingConfig::default(), OwnerId(7)).unwrap();
//!
//! let request = LocalCreate::new("Projectiles/Orb", Placement::NEUTRAL, Category::Local);
//! let (orb, record) = state.create_local(&prototypes, &mut host, request).unwrap();
//! assert_eq!(record.token, TokenId(70_000));
//! assert_eq!(state.registry().find(TokenId(70_000)), Some(orb));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod directory;
pub mod error;
pub mod host;
pub mod ids;
pub mod pool;
pub mod registry;
pub mod state;
pub mod token;

pub use config::{PoolingConfig, PreloadedPool};
pub use directory::{PoolDirectory, Relation};
pub use error::{ConfigError, ConfigResult, PoolError, PoolResult, Severity};
pub use host::{EntityHandle, EntityHost, PoolNotification, Prototype, PrototypeKey, PrototypeSource};
pub use ids::{SubComponentIdAllocator, TokenAllocator};
pub use pool::{ActivationHooks, LeaseContext, ObjectPool, PoolStats, Release, SubComponentHooks};
pub use registry::ManagedObjectRegistry;
pub use state::{LocalCreate, PoolState};
pub use token::PoolToken;
