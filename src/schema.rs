//! Type model handed to the codec by the schema provider.
//!
//! Field discovery is not part of this crate: callers describe their message
//! types with [`TypeModelBuilder`], and [`TypeModelBuilder::build`] validates
//! the description once. The resulting [`TypeModel`] is immutable and can be
//! shared between threads.
//!
//! # Beispiel
//!
//! ```
//! use graphbuf::schema::{FieldSpec, ItemKind, TypeModel};
//! use graphbuf::policy::ValueFormatPolicy;
//!
//! let mut builder = TypeModel::builder();
//! let node = builder.declare_type("Node");
//! builder.add_field(node, FieldSpec::new(1, "value", ItemKind::Int32));
//! builder.add_field(
//!     node,
//!     FieldSpec::new(2, "next", ItemKind::Message(node)).with_policy(ValueFormatPolicy::Reference),
//! );
//! let model = builder.build().unwrap();
//! assert_eq!(model.type_by_name("Node"), Some(node));
//! ```

use crate::FastHashMap;
use crate::enum_map::EnumMap;
use crate::error::{Error, ErrorKind, Result};
use crate::policy::{self, ValueFormatPolicy};
use crate::wire_type::{MAX_FIELD_NUMBER, WireType};

/// Largest supported rank of a multi-dimensional array.
pub const MAX_ARRAY_RANK: u8 = 32;

/// Index of a message type inside its [`TypeModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(pub u32);

/// Index of an enum inside its [`TypeModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumIndex(pub u32);

/// What a single slot (or a single collection element) holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Float,
    Double,
    String,
    Bytes,
    Enum(EnumIndex),
    Message(TypeIndex),
}

impl ItemKind {
    /// Wire type of one item. Messages are length-delimited unless the field
    /// asks for group framing.
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Bool
            | Self::Int32
            | Self::Int64
            | Self::UInt32
            | Self::UInt64
            | Self::SInt32
            | Self::SInt64
            | Self::Enum(_) => WireType::Varint,
            Self::Fixed32 | Self::SFixed32 | Self::Float => WireType::Fixed32,
            Self::Fixed64 | Self::SFixed64 | Self::Double => WireType::Fixed64,
            Self::String | Self::Bytes | Self::Message(_) => WireType::LengthDelimited,
        }
    }

    #[inline]
    pub fn is_packable(&self) -> bool {
        self.wire_type().is_packable()
    }

    #[inline]
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message(_))
    }

    /// Name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::SInt32 => "SInt32",
            Self::SInt64 => "SInt64",
            Self::Fixed32 => "Fixed32",
            Self::Fixed64 => "Fixed64",
            Self::SFixed32 => "SFixed32",
            Self::SFixed64 => "SFixed64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::Bytes => "Bytes",
            Self::Enum(_) => "Enum",
            Self::Message(_) => "Message",
        }
    }
}

/// Concrete collection strategy of a one-dimensional sequence.
///
/// The wire code is the subtype discriminator of the extended frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollectionKind {
    Array,
    #[default]
    List,
    Set,
    Deque,
}

impl CollectionKind {
    /// Subtype discriminator on the wire.
    pub fn code(self) -> u64 {
        match self {
            Self::Array => 1,
            Self::List => 2,
            Self::Set => 3,
            Self::Deque => 4,
        }
    }

    pub fn from_code(code: u64) -> core::result::Result<Self, ErrorKind> {
        match code {
            1 => Ok(Self::Array),
            2 => Ok(Self::List),
            3 => Ok(Self::Set),
            4 => Ok(Self::Deque),
            other => Err(ErrorKind::UnknownSubtype(other)),
        }
    }
}

/// Shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Repetition {
    /// At most one value.
    #[default]
    Single,
    /// A one-dimensional sequence with its declared collection kind.
    Sequence(CollectionKind),
    /// A rectangular array of `rank` dimensions, stored row-major.
    Array { rank: u8 },
}

/// Whether a type can be allocated before its payload is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Construction {
    /// Allocated and registered before its fields are read.
    #[default]
    Default,
    /// Only materialized once its payload is complete (tuples, immutable
    /// collections).
    Deferred,
}

/// Configuration of one field, as handed over by the schema provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub(crate) number: u32,
    pub(crate) name: String,
    pub(crate) item: ItemKind,
    pub(crate) repetition: Repetition,
    pub(crate) policy: ValueFormatPolicy,
    pub(crate) packed: bool,
    pub(crate) overwrite: bool,
    pub(crate) group: bool,
}

impl FieldSpec {
    /// A single, compact, length-delimited field.
    pub fn new(number: u32, name: impl Into<String>, item: ItemKind) -> Self {
        Self {
            number,
            name: name.into(),
            item,
            repetition: Repetition::Single,
            policy: ValueFormatPolicy::Compact,
            packed: false,
            overwrite: false,
            group: false,
        }
    }

    // --- Getter ---

    pub fn number(&self) -> u32 { self.number }
    pub fn name(&self) -> &str { &self.name }
    pub fn item(&self) -> ItemKind { self.item }
    pub fn repetition(&self) -> Repetition { self.repetition }
    /// Resolved value format (after [`TypeModelBuilder::build`]).
    pub fn policy(&self) -> ValueFormatPolicy { self.policy }
    pub fn packed(&self) -> bool { self.packed }
    /// Merging clears existing collection contents instead of appending.
    pub fn overwrite(&self) -> bool { self.overwrite }
    /// Sub-items use start/end-group framing instead of a length prefix.
    pub fn group(&self) -> bool { self.group }

    /// Wire type of a sub-item header for this field.
    pub fn sub_item_wire_type(&self) -> WireType {
        if self.group { WireType::StartGroup } else { WireType::LengthDelimited }
    }

    /// Wire type of one unpacked item.
    pub fn item_wire_type(&self) -> WireType {
        if self.item.is_message() { self.sub_item_wire_type() } else { self.item.wire_type() }
    }

    // --- Builder-Setter (Fluent API) ---

    /// Macht das Feld zur Sequenz.
    pub fn with_sequence(mut self, kind: CollectionKind) -> Self { self.repetition = Repetition::Sequence(kind); self }
    /// Macht das Feld zum mehrdimensionalen Array.
    pub fn with_array_rank(mut self, rank: u8) -> Self { self.repetition = Repetition::Array { rank }; self }
    /// Setzt die Value-Format-Policy.
    pub fn with_policy(mut self, policy: ValueFormatPolicy) -> Self { self.policy = policy; self }
    /// Aktiviert packed encoding.
    pub fn with_packed(mut self) -> Self { self.packed = true; self }
    /// Aktiviert Overwrite beim Mergen.
    pub fn with_overwrite(mut self) -> Self { self.overwrite = true; self }
    /// Aktiviert Group-Framing.
    pub fn with_group(mut self) -> Self { self.group = true; self }
}

/// One message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    name: String,
    construction: Construction,
    /// Nach Feldnummer sortiert (nach `build`).
    fields: Vec<FieldSpec>,
    by_number: FastHashMap<u32, usize>,
}

impl TypeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            construction: Construction::Default,
            fields: Vec::new(),
            by_number: FastHashMap::default(),
        }
    }

    /// Setzt den Konstruktionsmodus (Fluent API).
    pub fn with_construction(mut self, construction: Construction) -> Self {
        self.construction = construction;
        self
    }

    /// Fügt ein Feld hinzu (Fluent API).
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn construction(&self) -> Construction {
        self.construction
    }

    /// Fields in ascending field-number order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a field by number.
    pub fn field(&self, number: u32) -> Option<&FieldSpec> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }
}

/// Collects types and enums and validates them into a [`TypeModel`].
#[derive(Debug, Default)]
pub struct TypeModelBuilder {
    types: Vec<TypeSpec>,
    enums: Vec<EnumMap>,
    /// Fehler aus `add_field` mit ungültigem Typindex, gemeldet in `build`.
    dangling: Vec<TypeIndex>,
}

impl TypeModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a complete type.
    pub fn add_type(&mut self, spec: TypeSpec) -> TypeIndex {
        let index = TypeIndex(self.types.len() as u32);
        self.types.push(spec);
        index
    }

    /// Adds an empty type whose fields follow via [`add_field`](Self::add_field).
    /// Needed for self-referencing types.
    pub fn declare_type(&mut self, name: impl Into<String>) -> TypeIndex {
        self.add_type(TypeSpec::new(name))
    }

    pub fn set_construction(&mut self, ty: TypeIndex, construction: Construction) -> &mut Self {
        match self.types.get_mut(ty.0 as usize) {
            Some(spec) => spec.construction = construction,
            None => self.dangling.push(ty),
        }
        self
    }

    pub fn add_field(&mut self, ty: TypeIndex, field: FieldSpec) -> &mut Self {
        match self.types.get_mut(ty.0 as usize) {
            Some(spec) => spec.fields.push(field),
            None => self.dangling.push(ty),
        }
        self
    }

    pub fn add_enum(&mut self, map: EnumMap) -> EnumIndex {
        let index = EnumIndex(self.enums.len() as u32);
        self.enums.push(map);
        index
    }

    /// Validates the collected description and resolves field policies.
    pub fn build(self) -> Result<TypeModel> {
        let Self { mut types, enums, dangling } = self;
        if let Some(ty) = dangling.first() {
            return Err(Error::invalid_model(format!("type index {} does not exist", ty.0)));
        }

        for map in &enums {
            if !map.is_bijective() {
                return Err(Error::invalid_model(format!(
                    "enum '{}' maps two values onto one wire value",
                    map.name()
                )));
            }
        }

        let mut by_name = FastHashMap::default();
        for (i, spec) in types.iter().enumerate() {
            if by_name.insert(spec.name.clone(), TypeIndex(i as u32)).is_some() {
                return Err(Error::invalid_model(format!("type name '{}' is not unique", spec.name)));
            }
        }

        let constructions: Vec<Construction> = types.iter().map(|t| t.construction).collect();
        for spec in &mut types {
            spec.fields.sort_by_key(|f| f.number);
            spec.by_number.clear();
            for (i, field) in spec.fields.iter_mut().enumerate() {
                validate_field(&spec.name, field, &constructions, enums.len())?;
                if spec.by_number.insert(field.number, i).is_some() {
                    return Err(Error::invalid_model(format!(
                        "field number {} used twice in '{}'",
                        field.number, spec.name
                    )));
                }
            }
        }

        Ok(TypeModel { types, enums, by_name })
    }
}

fn validate_field(
    owner: &str,
    field: &mut FieldSpec,
    constructions: &[Construction],
    enum_count: usize,
) -> Result<()> {
    if field.number == 0 || field.number > MAX_FIELD_NUMBER {
        return Err(Error::invalid_model(format!(
            "field number {} of '{owner}.{}' is out of range",
            field.number, field.name
        )));
    }
    let construction = match field.item {
        ItemKind::Message(ty) => match constructions.get(ty.0 as usize) {
            Some(&c) => Some(c),
            None => {
                return Err(Error::invalid_model(format!(
                    "'{owner}.{}' refers to unknown type index {}",
                    field.name, ty.0
                )));
            }
        },
        ItemKind::Enum(e) if e.0 as usize >= enum_count => {
            return Err(Error::invalid_model(format!(
                "'{owner}.{}' refers to unknown enum index {}",
                field.name, e.0
            )));
        }
        _ => None,
    };
    if field.packed {
        if !field.item.is_packable() {
            return Err(Error::new(ErrorKind::NotPackable(field.item.wire_type())));
        }
        if field.repetition == Repetition::Single {
            return Err(Error::invalid_model(format!(
                "packed field '{owner}.{}' is not repeated",
                field.name
            )));
        }
    }
    if let Repetition::Array { rank } = field.repetition
        && (rank == 0 || rank > MAX_ARRAY_RANK)
    {
        return Err(Error::invalid_model(format!(
            "array rank {rank} of '{owner}.{}' outside 1..={MAX_ARRAY_RANK}",
            field.name
        )));
    }
    field.policy = policy::resolve(field.policy, &field.item, construction).map_err(Error::new)?;
    Ok(())
}

/// Validated, immutable description of all message types and enums.
#[derive(Debug, Clone)]
pub struct TypeModel {
    types: Vec<TypeSpec>,
    enums: Vec<EnumMap>,
    by_name: FastHashMap<String, TypeIndex>,
}

impl TypeModel {
    pub fn builder() -> TypeModelBuilder {
        TypeModelBuilder::new()
    }

    /// Looks up a type; `None` for an index from another model.
    pub fn get_type(&self, ty: TypeIndex) -> Option<&TypeSpec> {
        self.types.get(ty.0 as usize)
    }

    pub(crate) fn type_spec(&self, ty: TypeIndex) -> Result<&TypeSpec> {
        self.get_type(ty)
            .ok_or_else(|| Error::invalid_model(format!("type index {} does not exist", ty.0)))
    }

    pub fn get_enum(&self, index: EnumIndex) -> Option<&EnumMap> {
        self.enums.get(index.0 as usize)
    }

    pub(crate) fn enum_map(&self, index: EnumIndex) -> Result<&EnumMap> {
        self.get_enum(index)
            .ok_or_else(|| Error::invalid_model(format!("enum index {} does not exist", index.0)))
    }

    /// Resolves a type name (used by type tokens).
    pub fn type_by_name(&self, name: &str) -> Option<TypeIndex> {
        self.by_name.get(name).copied()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}
