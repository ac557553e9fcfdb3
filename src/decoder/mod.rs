//! Bytes → object graph.
//!
//! [`deserialize`] builds a fresh graph from a root type, [`merge`] reads into
//! an existing object. Repeated fields append by default; fields marked
//! `overwrite` are cleared at their first occurrence within one payload.
//! Multi-dimensional arrays always replace.
//!
//! # Beispiel
//!
//! ```
//! use graphbuf::decoder::deserialize;
//! use graphbuf::options::CodecOptions;
//! use graphbuf::schema::{FieldSpec, ItemKind, TypeModel, TypeSpec};
//! use graphbuf::value::Value;
//!
//! let mut builder = TypeModel::builder();
//! let ty = builder.add_type(TypeSpec::new("Test1").with_field(FieldSpec::new(1, "a", ItemKind::Int32)));
//! let model = builder.build().unwrap();
//!
//! let (graph, root) = deserialize(&model, ty, &[0x08, 0x96, 0x01], &CodecOptions::default()).unwrap();
//! assert_eq!(graph.field(root, 1), Some(&Value::I32(150)));
//! ```

mod value;

use crate::FastHashSet;
use crate::error::{Error, ErrorKind, Result};
use crate::options::{CodecOptions, Profile};
use crate::reader::ProtoReader;
use crate::reference::{ReadStart, ReadTracker};
use crate::repeated::{self, ReadLayout};
use crate::schema::{CollectionKind, Construction, FieldSpec, ItemKind, Repetition, TypeIndex, TypeModel};
use crate::value::{Array, Fields, Object, ObjectGraph, ObjectId, Sequence, Value};

/// Reads a message of type `root_type` into a new graph.
pub fn deserialize(
    model: &TypeModel,
    root_type: TypeIndex,
    bytes: &[u8],
    options: &CodecOptions,
) -> Result<(ObjectGraph, ObjectId)> {
    let mut graph = ObjectGraph::new();
    let root = match model.type_spec(root_type)?.construction() {
        Construction::Default => graph.insert(Object::new(root_type)),
        Construction::Deferred => graph.reserve(root_type),
    };
    read_root(model, &mut graph, root, bytes, options)?;
    Ok((graph, root))
}

/// Reads a message into the existing object `target`.
pub fn merge(
    model: &TypeModel,
    graph: &mut ObjectGraph,
    target: ObjectId,
    bytes: &[u8],
    options: &CodecOptions,
) -> Result<()> {
    if graph.get(target).is_none() {
        return Err(Error::new(ErrorKind::DanglingObject(target.raw())));
    }
    read_root(model, graph, target, bytes, options)
}

fn read_root(
    model: &TypeModel,
    graph: &mut ObjectGraph,
    root: ObjectId,
    bytes: &[u8],
    options: &CodecOptions,
) -> Result<()> {
    let mut r = ProtoReader::new(bytes, options);
    let mut decoder = Decoder::new(model, graph, options);
    decoder.tracker.register_root(root, decoder.graph);
    decoder.read_body(&mut r, root)?;
    decoder.tracker.verify_resolved(&r, decoder.graph)
}

// ============================================================================
// Decoder
// ============================================================================

/// State of one deserialize operation.
struct Decoder<'a> {
    model: &'a TypeModel,
    graph: &'a mut ObjectGraph,
    profile: Profile,
    max_length: u64,
    tracker: ReadTracker,
}

impl<'a> Decoder<'a> {
    fn new(model: &'a TypeModel, graph: &'a mut ObjectGraph, options: &CodecOptions) -> Self {
        Self {
            model,
            graph,
            profile: options.profile(),
            max_length: options.max_array_length(),
            tracker: ReadTracker::new(),
        }
    }

    /// Allocates an object of type `ty`, reserved if it is built after its payload.
    fn allocate(&mut self, ty: TypeIndex) -> Result<ObjectId> {
        Ok(match self.model.type_spec(ty)?.construction() {
            Construction::Default => self.graph.insert(Object::new(ty)),
            Construction::Deferred => self.graph.reserve(ty),
        })
    }

    /// Reads fields up to the end of the current region into `id`.
    ///
    /// A reserved slot is filled once the region is complete; until then every
    /// back-reference to it holds the reserved id.
    fn read_body(&mut self, r: &mut ProtoReader<'_>, id: ObjectId) -> Result<()> {
        let Some(ty) = self.graph.type_of(id) else {
            return Err(r.fail(ErrorKind::DanglingObject(id.raw())));
        };
        if self.graph.is_reserved(id) {
            let mut fields = Fields::default();
            self.read_fields(r, ty, &mut fields)?;
            self.graph.fill(id, Object::from_fields(ty, fields));
        } else {
            let mut fields = self.graph.take_fields(id).unwrap_or_default();
            let result = self.read_fields(r, ty, &mut fields);
            self.graph.restore_fields(id, fields);
            result?;
        }
        Ok(())
    }

    fn read_fields(&mut self, r: &mut ProtoReader<'_>, ty: TypeIndex, fields: &mut Fields) -> Result<()> {
        let model = self.model;
        let spec = model.type_spec(ty).map_err(|e| e.or_context(r.context()))?;
        let mut cleared = FastHashSet::default();
        loop {
            let number = r.read_field_header()?;
            if number == 0 {
                return Ok(());
            }
            match spec.field(number) {
                Some(field) => {
                    self.read_field(r, field, fields, &mut cleared).map_err(|e| e.or_context(r.context()))?;
                }
                None => {
                    log::trace!("skipping unknown field {number} of '{}'", spec.name());
                    r.skip_field()?;
                }
            }
        }
    }

    fn read_field(
        &mut self,
        r: &mut ProtoReader<'_>,
        field: &FieldSpec,
        fields: &mut Fields,
        cleared: &mut FastHashSet<u32>,
    ) -> Result<()> {
        let number = field.number();
        match field.repetition() {
            Repetition::Single => {
                let value = match field.item() {
                    ItemKind::Message(declared) => {
                        // Compact-Nachrichten werden beim erneuten Auftreten gemergt
                        let existing = if field.policy().uses_wrapper() {
                            None
                        } else {
                            fields
                                .get(&number)
                                .and_then(Value::as_object)
                                .filter(|id| self.graph.get(*id).is_some())
                        };
                        self.read_message(r, field, declared, existing)?
                    }
                    kind => {
                        r.expect_wire_type(kind.wire_type())?;
                        self.read_scalar(r, kind)?
                    }
                };
                fields.insert(number, value);
            }
            Repetition::Sequence(declared) => {
                let reset = field.overwrite() && cleared.insert(number);
                let mut seq = match fields.shift_remove(&number) {
                    Some(Value::Sequence(seq)) if !reset => seq,
                    _ => Sequence::new(declared),
                };
                let layout = self.layout(field);
                let meta = repeated::read_sequence(r, &layout, &mut seq.items, |r| self.read_item(r, field))?;
                if let Some(code) = meta.subtype {
                    seq.kind = CollectionKind::from_code(code).map_err(|k| r.fail(k))?;
                }
                fields.insert(number, Value::Sequence(seq));
            }
            Repetition::Array { rank } => {
                let layout = self.layout(field);
                let (dims, items) = repeated::read_array(r, &layout, rank, |r| self.read_item(r, field))?;
                fields.insert(number, Value::Array(Array::new(dims, items)));
            }
        }
        Ok(())
    }

    fn layout(&self, field: &FieldSpec) -> ReadLayout {
        ReadLayout {
            profile: self.profile,
            item_wire_type: field.item_wire_type(),
            sub_items: field.item().is_message(),
            max_length: self.max_length,
        }
    }

    fn read_item(&mut self, r: &mut ProtoReader<'_>, field: &FieldSpec) -> Result<Value> {
        match field.item() {
            ItemKind::Message(declared) => self.read_message(r, field, declared, None),
            kind => self.read_scalar(r, kind),
        }
    }

    /// Reads a message slot whose header was just read.
    fn read_message(
        &mut self,
        r: &mut ProtoReader<'_>,
        field: &FieldSpec,
        declared: TypeIndex,
        existing: Option<ObjectId>,
    ) -> Result<Value> {
        let policy = field.policy();
        if !policy.uses_wrapper() {
            let id = match existing {
                Some(id) => id,
                None => self.allocate(declared)?,
            };
            let token = r.start_sub_item()?;
            self.read_body(r, id)?;
            r.end_sub_item(token)?;
            return Ok(Value::Object(id));
        }

        let id = match self.tracker.read_start_root(r, self.graph, self.model, declared, policy)? {
            ReadStart::Existing(id) => id,
            ReadStart::New(mut state) => {
                let id = state.id();
                match state.take_payload() {
                    Some(payload) => {
                        self.read_body(r, id)?;
                        r.end_sub_item(payload)?;
                    }
                    None => {
                        if let Some(ty) = self.graph.type_of(id) {
                            // leerer Payload
                            self.graph.fill(id, Object::new(ty));
                        }
                    }
                }
                self.tracker.read_end_root(r, self.graph, state)?;
                id
            }
        };
        Ok(Value::Object(id))
    }
}
