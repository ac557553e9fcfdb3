//! Object graph → bytes.
//!
//! Walks the graph from a root object and routes every field through the
//! value format chosen in the [`TypeModel`]: compact slots go straight to the
//! wire, wrapping slots through the reference tracker, repeated fields
//! through the repeated-value codec.
//!
//! # Beispiel
//!
//! ```
//! use graphbuf::encoder::serialize;
//! use graphbuf::options::CodecOptions;
//! use graphbuf::schema::{FieldSpec, ItemKind, TypeModel, TypeSpec};
//! use graphbuf::value::{Object, ObjectGraph, Value};
//!
//! let mut builder = TypeModel::builder();
//! let ty = builder.add_type(TypeSpec::new("Test1").with_field(FieldSpec::new(1, "a", ItemKind::Int32)));
//! let model = builder.build().unwrap();
//!
//! let mut graph = ObjectGraph::new();
//! let root = graph.insert(Object::new(ty).with(1, Value::I32(150)));
//!
//! let bytes = serialize(&model, &graph, root, &CodecOptions::default()).unwrap();
//! assert_eq!(bytes, [0x08, 0x96, 0x01]);
//! ```

mod value;

use std::io::Write;

use crate::error::{Error, ErrorKind, Result};
use crate::options::{CodecOptions, Profile};
use crate::reference::{WriteStart, WriteTracker};
use crate::repeated::{self, SequenceFrame};
use crate::schema::{FieldSpec, ItemKind, Repetition, TypeIndex, TypeModel};
use crate::value::{Object, ObjectGraph, ObjectId, Value};
use crate::writer::ProtoWriter;

/// Serializes the graph reachable from `root` into a byte vector.
pub fn serialize(
    model: &TypeModel,
    graph: &ObjectGraph,
    root: ObjectId,
    options: &CodecOptions,
) -> Result<Vec<u8>> {
    let mut w = ProtoWriter::new(options);
    Encoder::new(model, graph, options).write_root(&mut w, root)?;
    w.into_vec()
}

/// Serializes into a non-seekable sink.
///
/// Length-prefixed frames are buffered until they close; with
/// [`CodecOptions::forward_only`] they fail with `BufferingRequired` instead,
/// so only group-framed fields can be streamed.
pub fn serialize_to<W: Write>(
    model: &TypeModel,
    graph: &ObjectGraph,
    root: ObjectId,
    options: &CodecOptions,
    sink: W,
) -> Result<()> {
    let mut w = ProtoWriter::streaming(sink, options);
    Encoder::new(model, graph, options).write_root(&mut w, root)?;
    w.finish()?;
    Ok(())
}

// ============================================================================
// Encoder
// ============================================================================

/// State of one serialize operation.
struct Encoder<'a> {
    model: &'a TypeModel,
    graph: &'a ObjectGraph,
    profile: Profile,
    tracker: WriteTracker,
}

impl<'a> Encoder<'a> {
    fn new(model: &'a TypeModel, graph: &'a ObjectGraph, options: &CodecOptions) -> Self {
        Self { model, graph, profile: options.profile(), tracker: WriteTracker::new() }
    }

    fn object<W: Write>(&self, w: &ProtoWriter<W>, id: ObjectId) -> Result<&'a Object> {
        self.graph.get(id).ok_or_else(|| w.fail(ErrorKind::DanglingObject(id.raw())))
    }

    fn write_root<W: Write>(&mut self, w: &mut ProtoWriter<W>, root: ObjectId) -> Result<()> {
        let object = self.object(w, root)?;
        self.tracker.register_root(root);
        self.write_fields(w, object)
    }

    /// Writes the fields of `object` in field-number order.
    fn write_fields<W: Write>(&mut self, w: &mut ProtoWriter<W>, object: &Object) -> Result<()> {
        let model = self.model;
        let spec = model.type_spec(object.type_index()).map_err(|e| e.or_context(w.context()))?;
        for field in spec.fields() {
            if let Some(value) = object.get(field.number()) {
                self.write_field(w, field, value).map_err(|e| e.or_context(w.context()))?;
            }
        }
        if log::log_enabled!(log::Level::Trace) {
            for &number in object.fields().keys() {
                if spec.field(number).is_none() {
                    log::trace!("field {number} has no definition in '{}', not written", spec.name());
                }
            }
        }
        Ok(())
    }

    fn write_field<W: Write>(&mut self, w: &mut ProtoWriter<W>, field: &FieldSpec, value: &Value) -> Result<()> {
        match field.repetition() {
            Repetition::Single => match field.item() {
                ItemKind::Message(declared) => {
                    let id = expect_object(w, value)?;
                    w.write_field_header(field.number(), field.sub_item_wire_type())?;
                    self.write_message(w, field, declared, id)
                }
                kind => {
                    w.write_field_header(field.number(), kind.wire_type())?;
                    self.write_scalar(w, kind, value)
                }
            },
            Repetition::Sequence(declared) => {
                let Value::Sequence(seq) = value else {
                    return Err(mismatch(w, "Sequence", value));
                };
                let subtype = (seq.kind != declared).then(|| seq.kind.code());
                let frame = self.frame(field).with_subtype(subtype);
                repeated::write_sequence(w, &frame, &seq.items, |w, item| self.write_item(w, field, item))
            }
            Repetition::Array { rank } => {
                let Value::Array(array) = value else {
                    return Err(mismatch(w, "Array", value));
                };
                let frame = self.frame(field);
                repeated::write_array(w, &frame, rank, &array.dims, &array.items, |w, item| {
                    self.write_item(w, field, item)
                })
            }
        }
    }

    fn frame(&self, field: &FieldSpec) -> SequenceFrame {
        SequenceFrame::new(field.number(), field.item_wire_type())
            .with_packed(field.packed())
            .with_profile(self.profile)
            .with_wrapper(field.sub_item_wire_type())
    }

    /// Writes one collection item; its header is already on the wire.
    fn write_item<W: Write>(&mut self, w: &mut ProtoWriter<W>, field: &FieldSpec, item: &Value) -> Result<()> {
        match field.item() {
            ItemKind::Message(declared) => {
                let id = expect_object(w, item)?;
                self.write_message(w, field, declared, id)
            }
            kind => self.write_scalar(w, kind, item),
        }
    }

    /// Writes a message slot whose header is already on the wire.
    fn write_message<W: Write>(
        &mut self,
        w: &mut ProtoWriter<W>,
        field: &FieldSpec,
        declared: TypeIndex,
        id: ObjectId,
    ) -> Result<()> {
        let object = self.object(w, id)?;
        let runtime = object.type_index();
        let policy = field.policy();

        if !policy.uses_wrapper() {
            if runtime != declared {
                return Err(w.fail(ErrorKind::DynamicTypeRequiresWrapper));
            }
            let token = w.start_sub_item()?;
            self.write_fields(w, object)?;
            return w.end_sub_item(token);
        }

        let model = self.model;
        let type_token = if runtime != declared {
            Some((runtime, model.type_spec(runtime)?.name()))
        } else {
            None
        };
        match self.tracker.write_start_root(w, id, type_token, policy, field.sub_item_wire_type())? {
            WriteStart::BackReference(_) => Ok(()),
            WriteStart::Payload(token) => {
                self.write_fields(w, object)?;
                self.tracker.write_end_root(w, token)
            }
        }
    }
}

fn expect_object<W: Write>(w: &ProtoWriter<W>, value: &Value) -> Result<ObjectId> {
    value.as_object().ok_or_else(|| mismatch(w, "Object", value))
}

fn mismatch<W: Write>(w: &ProtoWriter<W>, expected: &'static str, found: &Value) -> Error {
    w.fail(ErrorKind::ValueKindMismatch { expected, found: found.kind_name() })
}
