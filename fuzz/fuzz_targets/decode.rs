#![no_main]
use graphbuf::{CodecOptions, CollectionKind, FieldSpec, ItemKind, Profile, TypeModel, ValueFormatPolicy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&flags, data)) = data.split_first() else {
        return;
    };
    let mut b = TypeModel::builder();
    let node = b.declare_type("Node");
    b.add_field(node, FieldSpec::new(1, "value", ItemKind::SInt64))
        .add_field(node, FieldSpec::new(2, "name", ItemKind::String))
        .add_field(
            node,
            FieldSpec::new(3, "children", ItemKind::Message(node))
                .with_sequence(CollectionKind::List)
                .with_policy(ValueFormatPolicy::Reference),
        )
        .add_field(node, FieldSpec::new(4, "grid", ItemKind::Int32).with_array_rank(2).with_packed())
        .add_field(node, FieldSpec::new(5, "next", ItemKind::Message(node)));
    let Ok(model) = b.build() else {
        return;
    };
    let profile = if flags & 1 == 0 { Profile::Compatible } else { Profile::Extended };
    let opts = CodecOptions::default().with_profile(profile).with_max_array_length(1 << 16).with_max_depth(64);
    let _ = graphbuf::deserialize(&model, node, data, &opts);
});
