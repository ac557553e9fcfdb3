//! Byte-Vektoren aus der Protocol-Buffers-Dokumentation.
//!
//! Nachrichten ohne Referenz-Policy müssen bytegenau mit protobuf
//! übereinstimmen, in beide Richtungen.

use graphbuf::{
    CodecOptions, CollectionKind, Construction, FieldSpec, ItemKind, Object, ObjectGraph, Sequence, TypeIndex,
    TypeModel, TypeSpec, Value, ValueFormatPolicy, deserialize, serialize,
};

include!("common/models.rs");

fn roundtrip_bytes(model: &TypeModel, ty: TypeIndex, bytes: &[u8]) -> Vec<u8> {
    let opts = CodecOptions::default();
    let (graph, root) = deserialize(model, ty, bytes, &opts).unwrap();
    serialize(model, &graph, root, &opts).unwrap()
}

#[test]
fn test1_varint_150() {
    let (model, ty) = test1_model();
    let mut graph = ObjectGraph::new();
    let root = graph.insert(Object::new(ty).with(1, Value::I32(150)));
    let bytes = serialize(&model, &graph, root, &CodecOptions::default()).unwrap();
    assert_eq!(bytes, [0x08, 0x96, 0x01]);
    assert_eq!(roundtrip_bytes(&model, ty, &bytes), bytes);
}

#[test]
fn test2_string() {
    let mut b = TypeModel::builder();
    let ty = b.add_type(TypeSpec::new("Test2").with_field(FieldSpec::new(2, "b", ItemKind::String)));
    let model = b.build().unwrap();

    let bytes = [0x12, 0x07, 0x74, 0x65, 0x73, 0x74, 0x69, 0x6e, 0x67];
    let (graph, root) = deserialize(&model, ty, &bytes, &CodecOptions::default()).unwrap();
    assert_eq!(graph.field(root, 2), Some(&Value::from("testing")));
    assert_eq!(roundtrip_bytes(&model, ty, &bytes), bytes);
}

#[test]
fn test3_embedded() {
    let mut b = TypeModel::builder();
    let t1 = b.add_type(TypeSpec::new("Test1").with_field(FieldSpec::new(1, "a", ItemKind::Int32)));
    let t3 = b.add_type(TypeSpec::new("Test3").with_field(FieldSpec::new(3, "c", ItemKind::Message(t1))));
    let model = b.build().unwrap();

    let bytes = [0x1A, 0x03, 0x08, 0x96, 0x01];
    assert_eq!(roundtrip_bytes(&model, t3, &bytes), bytes);
}

#[test]
fn test4_packed() {
    let field = FieldSpec::new(4, "d", ItemKind::Int32).with_sequence(CollectionKind::List).with_packed();
    let (model, ty) = repeated_model(field);

    let bytes = [0x22, 0x06, 0x03, 0x8E, 0x02, 0x9E, 0xA7, 0x05];
    let (graph, root) = deserialize(&model, ty, &bytes, &CodecOptions::default()).unwrap();
    let expected = Sequence::list(vec![Value::I32(3), Value::I32(270), Value::I32(86942)]);
    assert_eq!(graph.field(root, 4), Some(&Value::Sequence(expected)));
    assert_eq!(roundtrip_bytes(&model, ty, &bytes), bytes);
}

/// Unbekannte Felder gehen beim erneuten Schreiben verloren, der Rest bleibt gleich.
#[test]
fn unknown_fields_do_not_survive() {
    let (model, ty) = test1_model();
    let bytes = [0x10, 0x05, 0x08, 0x96, 0x01];
    assert_eq!(roundtrip_bytes(&model, ty, &bytes), [0x08, 0x96, 0x01]);
}

/// Ohne Referenz-Policy ist die Konstruktionsart unsichtbar.
#[test]
fn deferred_construction_is_wire_neutral() {
    let mut b = TypeModel::builder();
    let ty = b.add_type(
        TypeSpec::new("Test1")
            .with_construction(Construction::Deferred)
            .with_field(FieldSpec::new(1, "a", ItemKind::Int32)),
    );
    let model = b.build().unwrap();
    assert_eq!(roundtrip_bytes(&model, ty, &[0x08, 0x96, 0x01]), [0x08, 0x96, 0x01]);
}

/// `Compact` ist die Voreinstellung und schreibt keinen Wrapper.
#[test]
fn compact_is_default_policy() {
    let field = FieldSpec::new(1, "a", ItemKind::Int32);
    assert_eq!(field.policy(), ValueFormatPolicy::Compact);
}
