//! Object identity across the wire.
//!
//! A value slot with a wrapping [`ValueFormatPolicy`] is written as a
//! sub-item with the following fields:
//!
//! | Field | Wire type | Content |
//! |---|---|---|
//! | 1 | varint | key of an already written object (nothing else follows) |
//! | 2 | varint | key of a new object |
//! | 3 | varint | key of an already announced type |
//! | 4 | varint | key of a new type, its name follows in field 8 |
//! | 8 | bytes | type name |
//! | 10 | sub-item | payload of the new object |
//!
//! Keys start at 1. The root of an operation is implicitly key 1 and is
//! written as a plain message. Type tokens precede the object key and only
//! appear when the runtime type differs from the declared one.

use std::io::Write;

use crate::error::{ErrorKind, Result};
use crate::policy::ValueFormatPolicy;
use crate::reader::{ProtoReader, ReadToken};
use crate::schema::{Construction, TypeIndex, TypeModel};
use crate::value::{Object, ObjectGraph, ObjectId};
use crate::wire_type::WireType;
use crate::writer::{ProtoWriter, SubItemToken};
use crate::{FastHashMap, FastHashSet};

pub const FIELD_EXISTING_KEY: u32 = 1;
pub const FIELD_NEW_KEY: u32 = 2;
pub const FIELD_EXISTING_TYPE_KEY: u32 = 3;
pub const FIELD_NEW_TYPE_KEY: u32 = 4;
pub const FIELD_TYPE_NAME: u32 = 8;
pub const FIELD_PAYLOAD: u32 = 10;

/// Key of the root object of an operation.
pub const ROOT_KEY: u32 = 1;

/// Outcome of [`WriteTracker::write_start_root`].
#[must_use]
#[derive(Debug)]
pub enum WriteStart {
    /// Only a back-reference was written; the payload must be skipped.
    BackReference(u32),
    /// A new object; write its payload, then call
    /// [`WriteTracker::write_end_root`].
    Payload(WrapperToken),
}

/// Open wrapper and payload sub-items of one object.
#[must_use = "the wrapper must be closed with write_end_root"]
#[derive(Debug)]
pub struct WrapperToken {
    wrapper: SubItemToken,
    payload: SubItemToken,
    key: u32,
}

impl WrapperToken {
    /// Assigned object key (0 without identity tracking).
    pub fn key(&self) -> u32 {
        self.key
    }
}

/// Write side: identity → key.
#[derive(Debug, Default)]
pub struct WriteTracker {
    keys: FastHashMap<ObjectId, u32>,
    last_key: u32,
    type_keys: FastHashMap<TypeIndex, u32>,
}

impl WriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the root object as [`ROOT_KEY`].
    pub fn register_root(&mut self, root: ObjectId) {
        self.keys.insert(root, ROOT_KEY);
        self.last_key = self.last_key.max(ROOT_KEY);
    }

    pub fn key_of(&self, id: ObjectId) -> Option<u32> {
        self.keys.get(&id).copied()
    }

    /// Number of keys assigned so far.
    pub fn assigned(&self) -> u32 {
        self.last_key
    }

    /// Opens the wrapper of `id` after its field header has been written.
    ///
    /// `type_token` carries the runtime type and its name when it differs
    /// from the declared type of the slot.
    pub fn write_start_root<W: Write>(
        &mut self,
        w: &mut ProtoWriter<W>,
        id: ObjectId,
        type_token: Option<(TypeIndex, &str)>,
        policy: ValueFormatPolicy,
        payload_wire_type: WireType,
    ) -> Result<WriteStart> {
        let wrapper = w.start_sub_item()?;
        if policy.tracks_identity()
            && let Some(key) = self.key_of(id)
        {
            w.write_field_header(FIELD_EXISTING_KEY, WireType::Varint)?;
            w.write_varint(u64::from(key));
            w.end_sub_item(wrapper)?;
            return Ok(WriteStart::BackReference(key));
        }

        if let Some((ty, name)) = type_token {
            match self.type_keys.get(&ty) {
                Some(&type_key) => {
                    w.write_field_header(FIELD_EXISTING_TYPE_KEY, WireType::Varint)?;
                    w.write_varint(u64::from(type_key));
                }
                None => {
                    let type_key = self.type_keys.len() as u32 + 1;
                    self.type_keys.insert(ty, type_key);
                    w.write_field_header(FIELD_NEW_TYPE_KEY, WireType::Varint)?;
                    w.write_varint(u64::from(type_key));
                    w.write_field_header(FIELD_TYPE_NAME, WireType::LengthDelimited)?;
                    w.write_string(name);
                }
            }
        }

        let key = if policy.tracks_identity() {
            self.last_key += 1;
            let key = self.last_key;
            self.keys.insert(id, key);
            w.write_field_header(FIELD_NEW_KEY, WireType::Varint)?;
            w.write_varint(u64::from(key));
            key
        } else {
            0
        };

        w.write_field_header(FIELD_PAYLOAD, payload_wire_type)?;
        let payload = w.start_sub_item()?;
        Ok(WriteStart::Payload(WrapperToken { wrapper, payload, key }))
    }

    /// Closes payload and wrapper.
    pub fn write_end_root<W: Write>(&mut self, w: &mut ProtoWriter<W>, token: WrapperToken) -> Result<()> {
        w.end_sub_item(token.payload)?;
        w.end_sub_item(token.wrapper)
    }
}

/// Outcome of [`ReadTracker::read_start_root`].
#[must_use]
#[derive(Debug)]
pub enum ReadStart {
    /// A back-reference to an object that is already known (possibly still
    /// reserved). Nothing more to read.
    Existing(ObjectId),
    /// A new object; read its payload if present, then call
    /// [`ReadTracker::read_end_root`].
    New(NewObject),
}

/// State of a wrapper whose object is being read.
#[must_use = "the wrapper must be closed with read_end_root"]
#[derive(Debug)]
pub struct NewObject {
    id: ObjectId,
    key: u32,
    wrapper: ReadToken,
    payload: Option<ReadToken>,
}

impl NewObject {
    /// Slot of the new object (reserved for deferred construction).
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Assigned key (0 without identity tracking).
    pub fn key(&self) -> u32 {
        self.key
    }

    /// The open payload region, if the wrapper has one.
    pub fn take_payload(&mut self) -> Option<ReadToken> {
        self.payload.take()
    }
}

/// Read side: key → object slot.
#[derive(Debug, Default)]
pub struct ReadTracker {
    objects: FastHashMap<u32, ObjectId>,
    /// Keys, deren Slot beim Registrieren reserviert war.
    reserved: FastHashSet<u32>,
    type_keys: FastHashMap<u32, TypeIndex>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the root object as [`ROOT_KEY`].
    pub fn register_root(&mut self, root: ObjectId, graph: &ObjectGraph) {
        self.register(ROOT_KEY, root, graph);
    }

    fn register(&mut self, key: u32, id: ObjectId, graph: &ObjectGraph) {
        self.objects.insert(key, id);
        if graph.is_reserved(id) {
            log::debug!("object key {key} bound to reserved slot #{}", id.index());
            self.reserved.insert(key);
        }
    }

    pub fn resolve(&self, key: u32) -> Option<ObjectId> {
        self.objects.get(&key).copied()
    }

    /// Opens the wrapper announced by the last field header and reads its
    /// markers up to the payload.
    ///
    /// A new object is allocated and registered before its payload is read.
    /// Deferred types, and every slot with [`ValueFormatPolicy::LateReference`],
    /// get a reserved slot instead that the caller fills once the payload is
    /// complete.
    pub fn read_start_root(
        &mut self,
        r: &mut ProtoReader<'_>,
        graph: &mut ObjectGraph,
        model: &TypeModel,
        declared: TypeIndex,
        policy: ValueFormatPolicy,
    ) -> Result<ReadStart> {
        let wrapper = r.start_sub_item()?;
        let mut ty = declared;
        let mut new_key = None;
        let mut pending_type_key = None;
        let mut named_type = None;
        let mut payload = None;

        loop {
            match r.read_field_header()? {
                0 => break,
                FIELD_EXISTING_KEY => {
                    r.expect_wire_type(WireType::Varint)?;
                    let key = read_key(r)?;
                    let id = self.resolve(key).ok_or_else(|| r.fail(ErrorKind::UnknownObjectKey(key)))?;
                    skip_rest(r)?;
                    r.end_sub_item(wrapper)?;
                    return Ok(ReadStart::Existing(id));
                }
                FIELD_NEW_KEY => {
                    r.expect_wire_type(WireType::Varint)?;
                    new_key = Some(read_key(r)?);
                }
                FIELD_EXISTING_TYPE_KEY => {
                    r.expect_wire_type(WireType::Varint)?;
                    let key = read_key(r)?;
                    ty = *self.type_keys.get(&key).ok_or_else(|| r.fail(ErrorKind::UnknownTypeKey(key)))?;
                }
                FIELD_NEW_TYPE_KEY => {
                    r.expect_wire_type(WireType::Varint)?;
                    pending_type_key = Some(read_key(r)?);
                }
                FIELD_TYPE_NAME => {
                    r.expect_wire_type(WireType::LengthDelimited)?;
                    let name = r.read_string()?;
                    let found = model
                        .type_by_name(name)
                        .ok_or_else(|| r.fail(ErrorKind::UnknownTypeName(name.to_owned())))?;
                    named_type = Some(found);
                    ty = found;
                }
                FIELD_PAYLOAD => {
                    payload = Some(r.start_sub_item()?);
                    break;
                }
                other => {
                    log::trace!("skipping unknown wrapper field {other}");
                    r.skip_field()?;
                }
            }
        }

        if let Some(type_key) = pending_type_key {
            let Some(named) = named_type else {
                return Err(r.fail(ErrorKind::UnknownTypeKey(type_key)));
            };
            if self.type_keys.insert(type_key, named).is_some() {
                return Err(r.fail(ErrorKind::UnknownTypeKey(type_key)));
            }
        }

        let deferred =
            model.type_spec(ty).map_err(|e| e.or_context(r.context()))?.construction() == Construction::Deferred;
        let id = if deferred || policy.reserves_slot() {
            graph.reserve(ty)
        } else {
            graph.insert(Object::new(ty))
        };

        let key = match new_key {
            Some(key) => {
                if self.objects.contains_key(&key) {
                    return Err(r.fail(ErrorKind::DuplicateObjectKey(key)));
                }
                self.register(key, id, graph);
                key
            }
            None => 0,
        };

        Ok(ReadStart::New(NewObject { id, key, wrapper, payload }))
    }

    /// Closes the wrapper of a new object.
    ///
    /// The payload region must have been closed and a reserved slot filled.
    pub fn read_end_root(&mut self, r: &mut ProtoReader<'_>, graph: &ObjectGraph, state: NewObject) -> Result<()> {
        let NewObject { id, key, wrapper, payload } = state;
        if let Some(payload) = payload {
            r.end_sub_item(payload)?;
        }
        if graph.is_reserved(id) {
            return Err(r.fail(ErrorKind::UnresolvedReservedKey(key)));
        }
        if key != 0 && self.reserved.remove(&key) {
            log::debug!("reserved object key {key} resolved");
        }
        skip_rest(r)?;
        r.end_sub_item(wrapper)
    }

    /// Fails if any reserved key is still bound to an unfilled slot.
    pub fn verify_resolved(&self, r: &ProtoReader<'_>, graph: &ObjectGraph) -> Result<()> {
        let open = self
            .reserved
            .iter()
            .copied()
            .filter(|key| self.resolve(*key).is_some_and(|id| graph.is_reserved(id)))
            .min();
        match open {
            Some(key) => Err(r.fail(ErrorKind::UnresolvedReservedKey(key))),
            None => Ok(()),
        }
    }
}

fn read_key(r: &mut ProtoReader<'_>) -> Result<u32> {
    let raw = r.read_varint()?;
    match u32::try_from(raw) {
        Ok(key) if key != 0 => Ok(key),
        _ => Err(r.fail(ErrorKind::InvalidObjectKey(raw))),
    }
}

fn skip_rest(r: &mut ProtoReader<'_>) -> Result<()> {
    while r.read_field_header()? != 0 {
        r.skip_field()?;
    }
    Ok(())
}
