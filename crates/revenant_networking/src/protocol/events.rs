//! # Replication Events
//!
//! Creation and destruction as they appear on the wire.

use revenant_core::Relation;
use revenant_shared::{Category, InstantiationRecord, OwnerId, Placement, Quaternion, SubComponentId, TokenId, Value, Vec3};

use super::serialization::{decode_pod, decode_u32, decode_u8, FieldBag, WireReader, WireWriter, MAX_EVENT_SIZE};
use super::{envelope_keys, record_keys};
use crate::error::{WireError, WireResult};

/// Nested payload lists deeper than this are rejected.
pub const MAX_VALUE_DEPTH: usize = 32;

/// Method discriminant of a replication event.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// Create at the scene root.
    Create = 1,
    /// Destroy a token.
    Destroy = 2,
    /// Create under the relation target.
    CreateAsChild = 3,
    /// Create next to the relation target.
    CreateAsSibling = 4,
}

impl Method {
    /// Converts from the wire discriminant.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Create),
            2 => Some(Self::Destroy),
            3 => Some(Self::CreateAsChild),
            4 => Some(Self::CreateAsSibling),
            _ => None,
        }
    }
}

/// A replication event.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplicationEvent {
    /// An entity was created by its owner.
    Create {
        /// Everything needed to create it again.
        record: InstantiationRecord,
        /// Where it is attached.
        relation: Relation,
    },
    /// An entity was destroyed.
    Destroy {
        /// Token it held.
        token: TokenId,
    },
}

impl ReplicationEvent {
    /// Wire method of this event.
    #[must_use]
    pub const fn method(&self) -> Method {
        match self {
            Self::Create { relation: Relation::Root, .. } => Method::Create,
            Self::Create { relation: Relation::ChildOf(_), .. } => Method::CreateAsChild,
            Self::Create { relation: Relation::SiblingOf(_), .. } => Method::CreateAsSibling,
            Self::Destroy { .. } => Method::Destroy,
        }
    }

    /// Token the event is about.
    #[must_use]
    pub const fn token(&self) -> TokenId {
        match self {
            Self::Create { record, .. } => record.token,
            Self::Destroy { token } => *token,
        }
    }

    /// Encodes the event.
    ///
    /// # Errors
    ///
    /// [`WireError::Oversized`] if the event does not fit [`MAX_EVENT_SIZE`].
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let mut writer = WireWriter::new();
        let token = self.token();
        let mut ok = writer.write_field(envelope_keys::METHOD, |w| w.write_u8(self.method() as u8))
            && writer.write_field(envelope_keys::TOKEN, |w| w.write_u32(token.0));

        if let Self::Create { record, relation } = self {
            if let Some(target) = relation.target() {
                ok = ok && writer.write_field(envelope_keys::RELATION, |w| w.write_u32(target.0));
            }
            ok = ok && writer.write_field(envelope_keys::RECORD, |w| write_record(w, record));
        }

        if ok {
            Ok(writer.into_bytes())
        } else {
            Err(WireError::Oversized {
                size: writer.len(),
                max: MAX_EVENT_SIZE,
            })
        }
    }

    /// Decodes an event, skipping fields this peer does not know.
    ///
    /// # Errors
    ///
    /// Any [`WireError`] describing the first problem found.
    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let bag = FieldBag::parse(bytes)?;
        let raw = decode_u8(envelope_keys::METHOD, bag.require(envelope_keys::METHOD)?)?;
        let method = Method::from_u8(raw).ok_or(WireError::UnknownMethod(raw))?;
        let token = TokenId(decode_u32(envelope_keys::TOKEN, bag.require(envelope_keys::TOKEN)?)?);

        let relation = match method {
            Method::Destroy => return Ok(Self::Destroy { token }),
            Method::Create => Relation::Root,
            Method::CreateAsChild => Relation::ChildOf(relation_target(&bag)?),
            Method::CreateAsSibling => Relation::SiblingOf(relation_target(&bag)?),
        };
        let record = read_record(bag.require(envelope_keys::RECORD)?, token)?;
        Ok(Self::Create { record, relation })
    }
}

/// Encodes the filter that matches the cached create of `token`.
///
/// # Errors
///
/// Never fails in practice; the signature matches [`ReplicationEvent::encode`].
pub fn cache_filter(token: TokenId) -> WireResult<Vec<u8>> {
    let mut writer = WireWriter::new();
    if writer.write_field(envelope_keys::TOKEN, |w| w.write_u32(token.0)) {
        Ok(writer.into_bytes())
    } else {
        Err(WireError::Oversized {
            size: writer.len(),
            max: MAX_EVENT_SIZE,
        })
    }
}

fn relation_target(bag: &FieldBag<'_>) -> WireResult<TokenId> {
    let body = bag.require(envelope_keys::RELATION)?;
    Ok(TokenId(decode_u32(envelope_keys::RELATION, body)?))
}

fn write_record(w: &mut WireWriter, record: &InstantiationRecord) -> bool {
    let ok = w.write_field(record_keys::PROTOTYPE, |w| w.write_bytes(record.prototype.as_bytes()))
        && w.write_field(record_keys::POSITION, |w| w.write_pod(&record.placement.position))
        && w.write_field(record_keys::ROTATION, |w| w.write_pod(&record.placement.rotation))
        && w.write_field(record_keys::OWNER, |w| w.write_u32(record.owner.0))
        && w.write_field(record_keys::TOKEN, |w| w.write_u32(record.token.0))
        && w.write_field(record_keys::CATEGORY, |w| w.write_u8(record.category as u8));
    if !ok {
        return false;
    }

    if let Some(ids) = &record.sub_component_ids {
        let Ok(count) = u32::try_from(ids.len()) else {
            return false;
        };
        let written = w.write_field(record_keys::SUB_COMPONENTS, |w| {
            w.write_u32(count) && ids.iter().all(|id| w.write_u32(id.0))
        });
        if !written {
            return false;
        }
    }

    record.payload.is_empty() || w.write_field(record_keys::PAYLOAD, |w| write_values(w, &record.payload))
}

fn read_record(bytes: &[u8], envelope_token: TokenId) -> WireResult<InstantiationRecord> {
    let bag = FieldBag::parse(bytes)?;

    let prototype = std::str::from_utf8(bag.require(record_keys::PROTOTYPE)?)
        .map_err(|_| WireError::Malformed {
            key: record_keys::PROTOTYPE,
            reason: "invalid UTF-8",
        })?
        .to_string();

    let raw_category = decode_u8(record_keys::CATEGORY, bag.require(record_keys::CATEGORY)?)?;
    let category = Category::from_u8(raw_category).ok_or(WireError::UnknownCategory(raw_category))?;

    let position = match bag.get(record_keys::POSITION) {
        Some(body) => decode_pod::<Vec3>(record_keys::POSITION, body)?,
        None => Vec3::ZERO,
    };
    let rotation = match bag.get(record_keys::ROTATION) {
        Some(body) => decode_pod::<Quaternion>(record_keys::ROTATION, body)?,
        None => Quaternion::IDENTITY,
    };
    let owner = OwnerId(decode_u32(record_keys::OWNER, bag.require(record_keys::OWNER)?)?);
    let token = match bag.get(record_keys::TOKEN) {
        Some(body) => TokenId(decode_u32(record_keys::TOKEN, body)?),
        None => envelope_token,
    };
    let sub_component_ids = bag
        .get(record_keys::SUB_COMPONENTS)
        .map(read_sub_components)
        .transpose()?;
    let payload = match bag.get(record_keys::PAYLOAD) {
        Some(body) => read_values(body)?,
        None => Vec::new(),
    };

    Ok(InstantiationRecord {
        prototype,
        placement: Placement::new(position, rotation),
        category,
        owner,
        token,
        sub_component_ids,
        payload,
    })
}

fn read_sub_components(body: &[u8]) -> WireResult<Vec<SubComponentId>> {
    let malformed = WireError::Malformed {
        key: record_keys::SUB_COMPONENTS,
        reason: "count does not match contents",
    };
    let mut reader = WireReader::new(body);
    let count = reader.read_u32().ok_or_else(|| malformed.clone())? as usize;
    if reader.remaining() != count.saturating_mul(4) {
        return Err(malformed);
    }
    let mut ids = Vec::with_capacity(count);
    while let Some(id) = reader.read_u32() {
        ids.push(SubComponentId(id));
    }
    Ok(ids)
}

mod tag {
    pub const NIL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const INT: u8 = 2;
    pub const FLOAT: u8 = 3;
    pub const STR: u8 = 4;
    pub const BYTES: u8 = 5;
    pub const VEC3: u8 = 6;
    pub const QUATERNION: u8 = 7;
    pub const LIST: u8 = 8;
}

fn write_values(w: &mut WireWriter, values: &[Value]) -> bool {
    let Ok(count) = u32::try_from(values.len()) else {
        return false;
    };
    w.write_u32(count) && values.iter().all(|value| write_value(w, value))
}

fn write_value(w: &mut WireWriter, value: &Value) -> bool {
    match value {
        Value::Nil => w.write_u8(tag::NIL),
        Value::Bool(b) => w.write_u8(tag::BOOL) && w.write_u8(u8::from(*b)),
        Value::Int(i) => w.write_u8(tag::INT) && w.write_bytes(&i.to_le_bytes()),
        Value::Float(f) => w.write_u8(tag::FLOAT) && w.write_u64(f.to_bits()),
        Value::Str(s) => w.write_u8(tag::STR) && w.write_len_prefixed(s.as_bytes()),
        Value::Bytes(b) => w.write_u8(tag::BYTES) && w.write_len_prefixed(b),
        Value::Vec3(v) => w.write_u8(tag::VEC3) && w.write_pod(v),
        Value::Quaternion(q) => w.write_u8(tag::QUATERNION) && w.write_pod(q),
        Value::List(items) => w.write_u8(tag::LIST) && write_values(w, items),
    }
}

fn payload_error(reason: &'static str) -> WireError {
    WireError::Malformed {
        key: record_keys::PAYLOAD,
        reason,
    }
}

fn read_values(body: &[u8]) -> WireResult<Vec<Value>> {
    let mut reader = WireReader::new(body);
    let values = read_list(&mut reader, 0)?;
    if reader.remaining() != 0 {
        return Err(payload_error("trailing bytes"));
    }
    Ok(values)
}

fn read_list(reader: &mut WireReader<'_>, depth: usize) -> WireResult<Vec<Value>> {
    if depth > MAX_VALUE_DEPTH {
        return Err(payload_error("nested too deeply"));
    }
    let count = reader.read_u32().ok_or_else(|| payload_error("truncated"))? as usize;
    // Each value is at least one byte.
    if count > reader.remaining() {
        return Err(payload_error("count exceeds contents"));
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_value(reader, depth)?);
    }
    Ok(values)
}

fn read_value(reader: &mut WireReader<'_>, depth: usize) -> WireResult<Value> {
    let truncated = || payload_error("truncated");
    let value = match reader.read_u8().ok_or_else(truncated)? {
        tag::NIL => Value::Nil,
        tag::BOOL => Value::Bool(reader.read_u8().ok_or_else(truncated)? != 0),
        tag::INT => Value::Int(reader.read_u64().ok_or_else(truncated)? as i64),
        tag::FLOAT => Value::Float(f64::from_bits(reader.read_u64().ok_or_else(truncated)?)),
        tag::STR => {
            let bytes = reader.read_len_prefixed().ok_or_else(truncated)?;
            let text = std::str::from_utf8(bytes).map_err(|_| payload_error("invalid UTF-8"))?;
            Value::Str(text.to_string())
        }
        tag::BYTES => Value::Bytes(reader.read_len_prefixed().ok_or_else(truncated)?.to_vec()),
        tag::VEC3 => Value::Vec3(reader.read_pod().ok_or_else(truncated)?),
        tag::QUATERNION => Value::Quaternion(reader.read_pod().ok_or_else(truncated)?),
        tag::LIST => Value::List(read_list(reader, depth + 1)?),
        _ => return Err(payload_error("unknown value tag")),
    };
    Ok(value)
}
