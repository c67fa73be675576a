//! Stateful differential (delta) encoding over fixed-width integers.
//!
//! A [`DiffValue`] remembers the previous value passed through it and yields the signed
//! difference on `diff`, or reconstructs the original on `undiff`. Both directions detect
//! overflow rather than wrapping, since a wrapped value would silently desynchronise the
//! encoder and decoder.

use crate::error::CodecError;

/// Minimal surface a type needs to participate in diff encoding: checked subtraction and
/// addition, plus a cheap conversion to `i128` for error reporting.
pub trait DiffInt: Copy + Eq + Into<i128> {
    fn checked_diff(self, other: Self) -> Option<Self>;
    fn checked_undiff(self, delta: Self) -> Option<Self>;
    fn zero() -> Self;
}

macro_rules! impl_diff_int {
    ($($t:ty),+) => {
        $(
            impl DiffInt for $t {
                fn checked_diff(self, other: Self) -> Option<Self> {
                    self.checked_sub(other)
                }
                fn checked_undiff(self, delta: Self) -> Option<Self> {
                    self.checked_add(delta)
                }
                fn zero() -> Self {
                    0
                }
            }
        )+
    };
}

impl_diff_int!(i16, i32, i64, u16, u32, u64);

/// Carries the running `previous` value for one logical field of a record stream.
///
/// A fresh `DiffValue` starts at zero, matching the wire contract: the first value of any
/// diff-encoded sequence is emitted as-is (difference from zero).
#[derive(Debug, Clone, Copy)]
pub struct DiffValue<T: DiffInt> {
    previous: T,
}

impl<T: DiffInt> Default for DiffValue<T> {
    fn default() -> Self {
        DiffValue { previous: T::zero() }
    }
}

impl<T: DiffInt> DiffValue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `v - previous`, then sets `previous = v`.
    pub fn diff(&mut self, v: T) -> Result<T, CodecError> {
        let d = v.checked_diff(self.previous).ok_or(CodecError::DiffOverflow {
            minuend: v.into(),
            subtrahend: self.previous.into(),
        })?;
        self.previous = v;
        Ok(d)
    }

    /// Returns `previous + v`, then sets `previous` to the result.
    pub fn undiff(&mut self, v: T) -> Result<T, CodecError> {
        let sum = self.previous.checked_undiff(v).ok_or(CodecError::SumOverflow {
            a: self.previous.into(),
            b: v.into(),
        })?;
        self.previous = sum;
        Ok(sum)
    }

    /// Applies [`Self::diff`] to a whole sequence, stopping at the first overflow.
    pub fn diff_all(&mut self, values: &[T]) -> Result<Vec<T>, CodecError> {
        values.iter().map(|&v| self.diff(v)).collect()
    }

    /// Applies [`Self::undiff`] to a whole sequence, stopping at the first overflow.
    pub fn undiff_all(&mut self, deltas: &[T]) -> Result<Vec<T>, CodecError> {
        deltas.iter().map(|&d| self.undiff(d)).collect()
    }
}
