//! Simple-8b packed-integer words: each 8-byte block carries a 4-bit selector (stored in the
//! low nibble) describing how many fixed-width unsigned values are packed into the remaining
//! 60 bits, plus the values themselves. Uses the classic Simple-8b selector table (Anh &
//! Moffat).

use crate::error::BsonColumnError;

/// `(bits_per_value, values_per_word)`, ordered by decreasing `values_per_word` so a greedy
/// encoder can always try the most space-efficient selector first. Selectors 0 and 1 pack zero
/// bits per value — they exist purely to represent long runs of an all-zero delta (the "run of
/// equal values" case) at maximal density.
const SELECTORS: [(u32, u32); 16] = [
    (0, 240),
    (0, 120),
    (1, 60),
    (2, 30),
    (3, 20),
    (4, 15),
    (5, 12),
    (6, 10),
    (7, 8),
    (8, 7),
    (10, 6),
    (12, 5),
    (15, 4),
    (20, 3),
    (30, 2),
    (60, 1),
];

fn max_value(bits: u32) -> u64 {
    if bits == 0 {
        0
    } else if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// The widest magnitude a single Simple-8b slot can ever carry. A caller whose zig-zagged
/// delta exceeds this must fall back to a literal element instead of attempting to pack it.
/// `MAX_SLOT_VALUE` itself is reserved as the writer's missing-value sentinel (see
/// `writer::MISSING_SLOT`), so genuine deltas must stay strictly below it.
pub const MAX_SLOT_VALUE: u64 = (1u64 << 60) - 1;

/// Greedily packs a prefix of `values` into one 8-byte word, returning the word and how many
/// input values it consumed. Always makes progress: the width-60/count-1 selector accepts any
/// value up to [`MAX_SLOT_VALUE`]. Returns [`BsonColumnError::SlotOverflow`] instead of
/// panicking if `values[0]` still exceeds that ceiling — every caller in this crate is expected
/// to guarantee slots stay within it, so this is reachable only if that invariant is ever
/// violated by a future change.
pub fn pack_one(values: &[u64]) -> Result<(u64, usize), BsonColumnError> {
    debug_assert!(!values.is_empty());
    for (selector, &(bits, count)) in SELECTORS.iter().enumerate() {
        let take = (count as usize).min(values.len());
        if take == 0 {
            continue;
        }
        let cap = max_value(bits);
        if values[..take].iter().all(|&v| v <= cap) {
            let mut word = selector as u64;
            let mut offset = 4u32;
            for &v in &values[..take] {
                if bits > 0 {
                    word |= v << offset;
                }
                offset += bits;
            }
            return Ok((word, take));
        }
    }
    Err(BsonColumnError::SlotOverflow(values[0]))
}

/// Unpacks one 8-byte word, returning exactly `values_per_word` values for the selector it
/// encodes. Callers discard any trailing values beyond the number of real elements remaining
/// in the run being decoded (they are padding, always zero).
pub fn unpack_one(word: u64) -> Result<Vec<u64>, BsonColumnError> {
    let selector = (word & 0xF) as usize;
    let (bits, count) = SELECTORS
        .get(selector)
        .copied()
        .ok_or(BsonColumnError::UnknownControlByte(selector as u8))?;
    let mut out = Vec::with_capacity(count as usize);
    let mask = if bits == 0 { 0 } else { max_value(bits) };
    let mut offset = 4u32;
    for _ in 0..count {
        let v = if bits == 0 { 0 } else { (word >> offset) & mask };
        out.push(v);
        offset += bits;
    }
    Ok(out)
}

/// Packs the full `values` slice into a sequence of 8-byte words, returned as raw little-endian
/// bytes.
pub fn pack_all(values: &[u64]) -> Result<Vec<[u8; 8]>, BsonColumnError> {
    let mut words = Vec::new();
    let mut rest = values;
    while !rest.is_empty() {
        let (word, consumed) = pack_one(rest)?;
        words.push(word.to_le_bytes());
        rest = &rest[consumed..];
    }
    Ok(words)
}
