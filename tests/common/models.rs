// Gemeinsame Typmodelle für die Integrationstests.
//
// Wird per `include!` eingebunden. Benötigte Imports:
//   use graphbuf::{CollectionKind, Construction, FieldSpec, ItemKind, TypeIndex, TypeModel, TypeSpec, ValueFormatPolicy};

/// `message Test1 { int32 a = 1; }`
#[allow(dead_code)]
fn test1_model() -> (TypeModel, TypeIndex) {
    let mut b = TypeModel::builder();
    let ty = b.add_type(TypeSpec::new("Test1").with_field(FieldSpec::new(1, "a", ItemKind::Int32)));
    (b.build().unwrap(), ty)
}

/// Baum mit Kindern (Sequenz) und Rückverweis auf den Elternknoten.
///
/// Feld 1: Wert, Feld 2: Kinder, Feld 3: Elternknoten.
#[allow(dead_code)]
fn tree_model(construction: Construction) -> (TypeModel, TypeIndex) {
    let mut b = TypeModel::builder();
    let tree = b.declare_type("Tree");
    b.set_construction(tree, construction)
        .add_field(tree, FieldSpec::new(1, "value", ItemKind::Int32))
        .add_field(
            tree,
            FieldSpec::new(2, "children", ItemKind::Message(tree))
                .with_sequence(CollectionKind::List)
                .with_policy(ValueFormatPolicy::Reference),
        )
        .add_field(
            tree,
            FieldSpec::new(3, "parent", ItemKind::Message(tree)).with_policy(ValueFormatPolicy::Reference),
        );
    (b.build().unwrap(), tree)
}

/// `message Test4 { repeated <item> d = 4; }`
#[allow(dead_code)]
fn repeated_model(field: FieldSpec) -> (TypeModel, TypeIndex) {
    let mut b = TypeModel::builder();
    let ty = b.add_type(TypeSpec::new("Test4").with_field(field));
    (b.build().unwrap(), ty)
}
