//! Generated Protobuf types. Regenerated by `build.rs` from `proto/tracekit.proto` on every
//! build; never hand-edit.
#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/tracekit.wire.rs"));
