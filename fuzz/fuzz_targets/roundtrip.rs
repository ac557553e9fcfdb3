#![no_main]
use graphbuf::{CodecOptions, FieldSpec, ItemKind, TypeModel, TypeSpec, ValueFormatPolicy};
use libfuzzer_sys::fuzz_target;

// Was erfolgreich gelesen wurde, muss sich schreiben und identisch wieder lesen lassen.
fuzz_target!(|data: &[u8]| {
    let mut b = TypeModel::builder();
    let leaf = b.add_type(TypeSpec::new("Leaf").with_field(FieldSpec::new(1, "a", ItemKind::Int64)));
    let root = b.add_type(
        TypeSpec::new("Root")
            .with_field(FieldSpec::new(1, "x", ItemKind::Message(leaf)).with_policy(ValueFormatPolicy::Reference))
            .with_field(FieldSpec::new(2, "y", ItemKind::Message(leaf)).with_policy(ValueFormatPolicy::Reference))
            .with_field(FieldSpec::new(3, "s", ItemKind::Bytes)),
    );
    let Ok(model) = b.build() else {
        return;
    };
    let opts = CodecOptions::default();
    let Ok((graph, id)) = graphbuf::deserialize(&model, root, data, &opts) else {
        return;
    };
    let Ok(bytes) = graphbuf::serialize(&model, &graph, id, &opts) else {
        return;
    };
    let (again, again_id) = graphbuf::deserialize(&model, root, &bytes, &opts).expect("re-read");
    let rewritten = graphbuf::serialize(&model, &again, again_id, &opts).expect("re-write");
    assert_eq!(bytes, rewritten);
});
