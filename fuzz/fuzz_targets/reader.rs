#![no_main]
use graphbuf::{CodecOptions, ProtoReader};
use libfuzzer_sys::fuzz_target;

fn walk(r: &mut ProtoReader<'_>) -> graphbuf::Result<()> {
    while r.read_field_header()? != 0 {
        r.skip_field()?;
    }
    Ok(())
}

fuzz_target!(|data: &[u8]| {
    let opts = CodecOptions::default().with_max_depth(64);
    let mut r = ProtoReader::new(data, &opts);
    let _ = walk(&mut r);
});
