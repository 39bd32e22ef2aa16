//! BSONColumn decode and pack errors. Every decode variant is fatal to the current decode —
//! the iterator yields the error once and then ends rather than attempting to resynchronize.
//! [`BsonColumnError::SlotOverflow`] is the one encode-side variant, surfaced from packing
//! rather than decoding.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BsonColumnError {
    #[error("unrecognised control byte: {0:#04x}")]
    UnknownControlByte(u8),

    #[error("scale index {0} is outside the valid set")]
    InvalidScaleIndex(u8),

    #[error("truncated Simple-8b block: expected {expected} bytes, found {found}")]
    TruncatedBlock { expected: usize, found: usize },

    #[error("truncated literal element")]
    TruncatedLiteral,

    #[error("interleaved mode exited with {0} decoder state(s) still carrying unconsumed input")]
    InterleavedStateLeftOver(usize),

    #[error("delta applied to a type that does not accept deltas: {0}")]
    NonDeltaableType(&'static str),

    #[error("end-of-object control byte encountered outside interleaved mode")]
    UnexpectedEndOfObject,

    #[error("interleaved reference object is malformed: {0}")]
    MalformedReferenceObject(String),

    #[error("value {0} exceeds the widest Simple-8b slot capacity and cannot be packed")]
    SlotOverflow(u64),
}
