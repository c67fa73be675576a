use thiserror::Error;

/// Errors raised by [`crate::diff::DiffValue`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("diff overflow: {minuend} - {subtrahend}")]
    DiffOverflow { minuend: i128, subtrahend: i128 },
    #[error("sum overflow: {a} + {b}")]
    SumOverflow { a: i128, b: i128 },
}
