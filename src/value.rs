//! Dynamic values and the object-graph arena.
//!
//! Objects live in an [`ObjectGraph`] and refer to each other by [`ObjectId`],
//! so shared and cyclic references are plain ids. A slot can be reserved
//! before its object exists and filled later; every id handed out for the
//! reserved slot then points at the final object.

use crate::FastIndexMap;
use crate::schema::{CollectionKind, TypeIndex};

/// Handle of an object inside its [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn raw(self) -> u32 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// A one-dimensional collection value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence {
    pub kind: CollectionKind,
    pub items: Vec<Value>,
}

impl Sequence {
    pub fn new(kind: CollectionKind) -> Self {
        Self { kind, items: Vec::new() }
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self { kind: CollectionKind::List, items }
    }
}

/// A rectangular multi-dimensional array, flattened row-major.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Array {
    /// Length per dimension, major to minor.
    pub dims: Vec<u64>,
    pub items: Vec<Value>,
}

impl Array {
    pub fn new(dims: Vec<u64>, items: Vec<Value>) -> Self {
        Self { dims, items }
    }

    /// Product of all dimension lengths, `None` on overflow.
    pub fn element_count(&self) -> Option<u64> {
        element_count(&self.dims)
    }
}

pub(crate) fn element_count(dims: &[u64]) -> Option<u64> {
    if dims.contains(&0) {
        return Some(0);
    }
    dims.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d))
}

/// A field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Raw (unmapped) enum value.
    Enum(i64),
    Object(ObjectId),
    Sequence(Sequence),
    Array(Array),
}

impl Value {
    /// Name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::I32(_) => "I32",
            Self::I64(_) => "I64",
            Self::U32(_) => "U32",
            Self::U64(_) => "U64",
            Self::F32(_) => "F32",
            Self::F64(_) => "F64",
            Self::String(_) => "String",
            Self::Bytes(_) => "Bytes",
            Self::Enum(_) => "Enum",
            Self::Object(_) => "Object",
            Self::Sequence(_) => "Sequence",
            Self::Array(_) => "Array",
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Self::Sequence(seq) => Some(seq),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

/// Field storage of an object, keyed by field number.
pub type Fields = FastIndexMap<u32, Value>;

/// A message instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    type_index: TypeIndex,
    fields: Fields,
}

impl Object {
    pub fn new(type_index: TypeIndex) -> Self {
        Self { type_index, fields: Fields::default() }
    }

    pub(crate) fn from_fields(type_index: TypeIndex, fields: Fields) -> Self {
        Self { type_index, fields }
    }

    /// Setzt ein Feld (Fluent API).
    pub fn with(mut self, field: u32, value: impl Into<Value>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    pub fn get(&self, field: u32) -> Option<&Value> {
        self.fields.get(&field)
    }

    pub fn set(&mut self, field: u32, value: impl Into<Value>) {
        self.fields.insert(field, value.into());
    }

    pub fn remove(&mut self, field: u32) -> Option<Value> {
        self.fields.shift_remove(&field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Filled(Object),
    Reserved(TypeIndex),
}

/// Arena of objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectGraph {
    slots: Vec<Slot>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ObjectId {
        ObjectId(self.slots.len() as u32)
    }

    /// Adds an object and returns its id.
    pub fn insert(&mut self, object: Object) -> ObjectId {
        let id = self.next_id();
        self.slots.push(Slot::Filled(object));
        id
    }

    /// Reserves a slot for an object of type `ty` that does not exist yet.
    pub fn reserve(&mut self, ty: TypeIndex) -> ObjectId {
        let id = self.next_id();
        self.slots.push(Slot::Reserved(ty));
        id
    }

    /// Fills a reserved slot. Returns `false` if `id` is not reserved.
    pub fn fill(&mut self, id: ObjectId, object: Object) -> bool {
        match self.slots.get_mut(id.index()) {
            Some(slot @ Slot::Reserved(_)) => {
                *slot = Slot::Filled(object);
                true
            }
            _ => false,
        }
    }

    pub fn is_reserved(&self, id: ObjectId) -> bool {
        matches!(self.slots.get(id.index()), Some(Slot::Reserved(_)))
    }

    /// `None` for unknown ids and reserved slots.
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        match self.slots.get(id.index()) {
            Some(Slot::Filled(object)) => Some(object),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Filled(object)) => Some(object),
            _ => None,
        }
    }

    /// Type of a filled or reserved slot.
    pub fn type_of(&self, id: ObjectId) -> Option<TypeIndex> {
        match self.slots.get(id.index())? {
            Slot::Filled(object) => Some(object.type_index),
            Slot::Reserved(ty) => Some(*ty),
        }
    }

    /// Shorthand for `get(id)?.get(field)`.
    pub fn field(&self, id: ObjectId, field: u32) -> Option<&Value> {
        self.get(id)?.get(field)
    }

    /// Moves the fields of a filled object out; the object keeps its slot.
    pub(crate) fn take_fields(&mut self, id: ObjectId) -> Option<Fields> {
        self.get_mut(id).map(|object| std::mem::take(&mut object.fields))
    }

    pub(crate) fn restore_fields(&mut self, id: ObjectId, fields: Fields) {
        if let Some(object) = self.get_mut(id) {
            object.fields = fields;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Filled objects with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Filled(object) => Some((ObjectId(i as u32), object)),
            Slot::Reserved(_) => None,
        })
    }
}
