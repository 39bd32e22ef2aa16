//! The one-byte control tags that precede every element or block group in a column.
//!
//! `0x00` is reserved exclusively for end-of-column so a literal's control byte may never
//! collide with it; block control bytes carry their scale selection in the high nibble and
//! `block_count - 1` in the low nibble, so one control byte can introduce up to 16 consecutive
//! Simple-8b words before a new control byte is required.

use crate::error::BsonColumnError;
use crate::zigzag::MEMORY_AS_INTEGER;

pub const MAX_BLOCKS_PER_CONTROL: usize = 16;

const TAG_END_OF_COLUMN: u8 = 0x00;
const TAG_LITERAL: u8 = 0x01;
const TAG_INTERLEAVED_START_OBJECT: u8 = 0x02;
const TAG_INTERLEAVED_START_ARRAY: u8 = 0x03;
const TAG_INTERLEAVED_START_LEGACY: u8 = 0x04;
const TAG_END_OF_OBJECT: u8 = 0x05;
/// Introduces a run-length-prefixed Simple-8b segment: a `u32` count of genuine logical
/// values, followed by one or more [`ControlByte::Block`] tags and their words. Needed because
/// a bare block-count nibble can't distinguish a selector's trailing zero padding from real
/// data on the final word of a segment — see `writer::flush_slots`'s doc comment.
const TAG_SEGMENT: u8 = 0xFF;
const HIGH_NIBBLE_MEMORY_AS_INTEGER: u8 = 0x8;
const HIGH_NIBBLE_SCALE_BASE: u8 = 0x9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlByte {
    EndOfColumn,
    Literal,
    InterleavedStartObject,
    InterleavedStartArray,
    /// Legacy interleaved-start marker. Decoders must still accept it for old data, but
    /// encoders never emit it now that the object/array-rooted variants distinguish root kind.
    InterleavedStartLegacy,
    EndOfObject,
    Segment,
    Block { scale: Option<u8>, block_count: usize },
}

impl ControlByte {
    pub fn to_byte(self) -> u8 {
        match self {
            ControlByte::EndOfColumn => TAG_END_OF_COLUMN,
            ControlByte::Literal => TAG_LITERAL,
            ControlByte::InterleavedStartObject => TAG_INTERLEAVED_START_OBJECT,
            ControlByte::InterleavedStartArray => TAG_INTERLEAVED_START_ARRAY,
            ControlByte::InterleavedStartLegacy => TAG_INTERLEAVED_START_LEGACY,
            ControlByte::EndOfObject => TAG_END_OF_OBJECT,
            ControlByte::Segment => TAG_SEGMENT,
            ControlByte::Block { scale, block_count } => {
                debug_assert!(block_count >= 1 && block_count <= MAX_BLOCKS_PER_CONTROL);
                let high = match scale {
                    None => HIGH_NIBBLE_MEMORY_AS_INTEGER,
                    Some(idx) => HIGH_NIBBLE_SCALE_BASE + idx,
                };
                (high << 4) | ((block_count - 1) as u8)
            }
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, BsonColumnError> {
        match byte {
            TAG_END_OF_COLUMN => Ok(ControlByte::EndOfColumn),
            TAG_LITERAL => Ok(ControlByte::Literal),
            TAG_INTERLEAVED_START_OBJECT => Ok(ControlByte::InterleavedStartObject),
            TAG_INTERLEAVED_START_ARRAY => Ok(ControlByte::InterleavedStartArray),
            TAG_INTERLEAVED_START_LEGACY => Ok(ControlByte::InterleavedStartLegacy),
            TAG_END_OF_OBJECT => Ok(ControlByte::EndOfObject),
            TAG_SEGMENT => Ok(ControlByte::Segment),
            _ => {
                let high = byte >> 4;
                let block_count = (byte & 0x0F) as usize + 1;
                let scale = if high == HIGH_NIBBLE_MEMORY_AS_INTEGER {
                    None
                } else if (HIGH_NIBBLE_SCALE_BASE..HIGH_NIBBLE_SCALE_BASE + 5).contains(&high) {
                    Some(high - HIGH_NIBBLE_SCALE_BASE)
                } else {
                    return Err(BsonColumnError::UnknownControlByte(byte));
                };
                Ok(ControlByte::Block { scale, block_count })
            }
        }
    }
}

pub fn scale_index_is_valid(idx: u8) -> bool {
    (idx as usize) < 5 || idx == MEMORY_AS_INTEGER
}
