fn main() {
    // Every `bytes` field decodes straight into `bytes::Bytes` instead of
    // the default `Vec<u8>`: values routinely get sliced, cloned into a
    // `Stream`'s cache, or handed back to a caller without modification, so
    // this avoids a copy at every hop.
    prost_build::Config::new()
        .bytes(["."])
        .compile_protos(&["proto/rpclink.proto"], &["proto/"])
        .expect("failed to compile rpclink.proto");
}
