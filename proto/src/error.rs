use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracekit_codec::CodecError;

/// The *Serialisation* error taxonomy: covers both the sensor-value file store (C2) and the
/// binary serialiser (C6). Abort the current serialise/upload attempt on any of these; the
/// data already on disk is left intact.
#[derive(Debug, Error)]
pub enum SerialisationError {
    #[error("diff overflow: {minuend} - {subtrahend}")]
    DiffOverflow { minuend: i128, subtrahend: i128 },
    #[error("sum overflow: {a} + {b}")]
    SumOverflow { a: i128, b: i128 },
    #[error("compression failed: {0}")]
    CompressionFailed(String),
    #[error("cannot append an empty batch")]
    EmptyBatch,
    #[error("field {field} is not serialisable: {cause}")]
    NonSerialisable { field: &'static str, cause: String },
    #[error("decoding protobuf: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unsupported wire format version {0}")]
    UnsupportedVersion(u16),
    #[error("truncated legacy payload: expected at least {expected} bytes, got {got}")]
    TruncatedLegacyPayload { expected: usize, got: usize },
}

impl From<CodecError> for SerialisationError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::DiffOverflow { minuend, subtrahend } => {
                SerialisationError::DiffOverflow { minuend, subtrahend }
            }
            CodecError::SumOverflow { a, b } => SerialisationError::SumOverflow { a, b },
        }
    }
}
