//! graphbuf – Protocol-Buffers-kompatibler Codec für Objektgraphen
//!
//! Plain messages are byte-compatible with protobuf. Per field, a
//! [`ValueFormatPolicy`] can opt into object identity (shared and cyclic
//! references), late-set construction and runtime type tokens; the
//! [`Profile::Extended`] profile adds framed collections with declared
//! lengths and multi-dimensional arrays.
//!
//! # Beispiel
//!
//! ```
//! use graphbuf::{CodecOptions, FieldSpec, ItemKind, Object, ObjectGraph, TypeModel, TypeSpec, Value, ValueFormatPolicy};
//! use graphbuf::{deserialize, serialize};
//!
//! let mut builder = TypeModel::builder();
//! let inner = builder.add_type(TypeSpec::new("Inner").with_field(FieldSpec::new(1, "a", ItemKind::Int32)));
//! let outer = builder.add_type(
//!     TypeSpec::new("Outer")
//!         .with_field(FieldSpec::new(1, "x", ItemKind::Message(inner)).with_policy(ValueFormatPolicy::Reference))
//!         .with_field(FieldSpec::new(2, "y", ItemKind::Message(inner)).with_policy(ValueFormatPolicy::Reference)),
//! );
//! let model = builder.build().unwrap();
//!
//! // Encode
//! let mut graph = ObjectGraph::new();
//! let shared = graph.insert(Object::new(inner).with(1, Value::I32(150)));
//! let root = graph.insert(Object::new(outer).with(1, shared).with(2, shared));
//! let bytes = serialize(&model, &graph, root, &CodecOptions::default()).unwrap();
//!
//! // Decode
//! let (decoded, root) = deserialize(&model, outer, &bytes, &CodecOptions::default()).unwrap();
//! assert_eq!(decoded.field(root, 1), decoded.field(root, 2));
//! ```

pub mod decoder;
pub mod encoder;
pub mod enum_map;
pub mod error;
pub mod options;
pub mod policy;
pub mod reader;
pub mod reference;
pub mod repeated;
pub mod schema;
pub mod value;
pub mod varint;
pub mod wire_type;
pub mod writer;

pub use error::{Error, ErrorCategory, ErrorKind, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent, für interne Datenstrukturen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// HashSet mit ahash.
pub(crate) type FastHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Options
pub use options::{CodecOptions, Profile};

// Public API: Encoder/Decoder
pub use decoder::{deserialize, merge};
pub use encoder::{serialize, serialize_to};

// Public API: Model
pub use enum_map::EnumMap;
pub use policy::ValueFormatPolicy;
pub use schema::{
    CollectionKind, Construction, EnumIndex, FieldSpec, ItemKind, Repetition, TypeIndex, TypeModel,
    TypeModelBuilder, TypeSpec,
};

// Public API: Values
pub use value::{Array, Fields, Object, ObjectGraph, ObjectId, Sequence, Value};

// Public API: Wire
pub use reader::ProtoReader;
pub use wire_type::WireType;
pub use writer::ProtoWriter;
