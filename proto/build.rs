fn main() {
    prost_build::compile_protos(&["proto/tracekit.proto"], &["proto/"])
        .expect("compiling tracekit.proto");
}
