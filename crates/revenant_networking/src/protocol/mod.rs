//! # Replication Protocol
//!
//! Every replication event travels under one event code,
//! [`revenant_shared::REPLICATION_EVENT_CODE`]. The body is a keyed
//! property bag; see [`serialization`] for the field layout.
//!
//! ## Envelope keys
//!
//! | key | field | present for |
//! |---|---|---|
//! | 0 | method | all |
//! | 1 | token id | all |
//! | 2 | relation target token | child / sibling creates |
//! | 3 | instantiation record | creates |
//!
//! ## Record keys
//!
//! | key | field |
//! |---|---|
//! | 1 | prototype path |
//! | 2 | position |
//! | 3 | rotation |
//! | 4 | reserved, never written |
//! | 5 | owner |
//! | 6 | token |
//! | 7 | sub-component ids |
//! | 8 | category |
//! | 9 | payload |

pub mod events;
pub mod serialization;

pub use events::{Method, ReplicationEvent};
pub use serialization::{FieldBag, WireReader, WireWriter, MAX_EVENT_SIZE};

/// Envelope field keys.
pub mod envelope_keys {
    /// Method discriminant.
    pub const METHOD: u8 = 0;
    /// Token the event is about.
    pub const TOKEN: u8 = 1;
    /// Parent or sibling token of a relative create.
    pub const RELATION: u8 = 2;
    /// Nested instantiation record.
    pub const RECORD: u8 = 3;
}

/// Instantiation record field keys.
pub mod record_keys {
    /// Prototype path, UTF-8.
    pub const PROTOTYPE: u8 = 1;
    /// Position, three f32.
    pub const POSITION: u8 = 2;
    /// Rotation, four f32.
    pub const ROTATION: u8 = 3;
    /// Owner id.
    pub const OWNER: u8 = 5;
    /// Token id.
    pub const TOKEN: u8 = 6;
    /// Sub-component ids, count then ids.
    pub const SUB_COMPONENTS: u8 = 7;
    /// Category discriminant.
    pub const CATEGORY: u8 = 8;
    /// Tagged payload values.
    pub const PAYLOAD: u8 = 9;
}
