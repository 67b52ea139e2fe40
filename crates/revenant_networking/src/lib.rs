//! # REVENANT Networking
//!
//! Replication of pooled entities across the peers of one room.
//!
//! ## Architecture
//!
//! - **Protocol**: keyed, forward-compatible encoding of create and destroy
//! - **Replication**: one cached entry per live replicated token
//! - **Transport seam**: a typed outbound queue and an inbound handler, no sockets
//! - **Session**: the facade applications call, wrapping pool state and collaborators
//!
//! ## Event Flow
//!
//! ```text
//! PEER A                         ROOM                          PEER B
//!   |                              |                              |
//!   |-- Create (AddToCache) ------>|----------------------------->| lease
//!   |                              | cache                        |
//!   |-- filter (RemoveFromCache) ->| uncache                      |
//!   |-- Destroy ------------------>|----------------------------->| release
//! ```
//!
//! A peer joining after the create receives it from the room's cache and
//! leases the same token through the same pool path.
//!
//! ## Example
//!
//! ```rust
//! use revenant_core::host::memory::{MemoryHost, MemoryPrototypes};
//! use revenant_core::{PoolingConfig, Prototype};
//! use revenant_networking::{LoopbackRoom, Session};
//! use revenant_shared::{OwnerId, Placement, TokenId};
//!
//! let prototypes = || MemoryPrototypes::new().with(Prototype::new("Orb"));
//! let mut room = LoopbackRoom::new();
//! room.join(OwnerId(1));
//!
//! let mut a = Session::start(PoolingConfig::default(), &OwnerId(1), MemoryHost::new(), prototypes()).unwrap();
//! a.rpc_instantiate("Orb", Placement::NEUTRAL, Vec::new()).unwrap();
//! a.flush(&mut room.link(OwnerId(1)));
//!
//! room.join(OwnerId(2));
//! let mut b = Session::start(PoolingConfig::default(), &OwnerId(2), MemoryHost::new(), prototypes()).unwrap();
//! for event in room.drain_inbox(OwnerId(2)) {
//!     b.handle_event(&event).unwrap();
//! }
//! assert!(b.find(TokenId(10_000)).is_some());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod protocol;
pub mod replication;
pub mod room;
pub mod session;
pub mod transport;

pub use error::{ReplicationError, ReplicationResult, WireError, WireResult};
pub use protocol::{Method, ReplicationEvent, MAX_EVENT_SIZE};
pub use replication::ReplicationManager;
pub use room::{LoopbackRoom, PeerLink};
pub use session::{IdentitySource, RemoteOutcome, Session, SharedSession};
pub use transport::{Caching, InboundEvent, OutboundEvent, OutboundQueue, Receivers, Transport};
