//! `Simple8bTypeUtil`-equivalent primitives: the domain transforms that turn a typed BSON
//! value into an integer suitable for delta encoding, and back.
//!
//! Carried over bit-for-bit in meaning from `simple8b_type_util.h`: zig-zag folds a signed
//! delta into the unsigned domain Simple-8b packs, ObjectId and Decimal128 move into a wide
//! integer domain before folding, and doubles move through a fixed scale table (falling back
//! to reinterpreting the mantissa bits as an integer when no scale represents the value
//! exactly).

use meridian_core::{Decimal128, ObjectId};

/// The five fixed scale factors doubles are tried against, in encoding preference order.
/// Index 4 (×10^8) is tried first since it is exact for the widest range of real-world
/// measurements with up to eight decimal digits; callers fall back toward index 0 and then
/// to memory-as-integer mode as exactness fails.
pub const SCALE_TABLE: [f64; 5] = [1.0, 10.0, 100.0, 10_000.0, 100_000_000.0];

/// Sentinel scale "index" used when no entry in [`SCALE_TABLE`] represents a double exactly;
/// the double's bit pattern is delta-encoded as an i64 instead of a scaled integer.
pub const MEMORY_AS_INTEGER: u8 = 5;

pub fn zigzag_encode_i64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

pub fn zigzag_decode_i64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

pub fn zigzag_encode_i128(n: i128) -> u128 {
    ((n << 1) ^ (n >> 127)) as u128
}

pub fn zigzag_decode_i128(n: u128) -> i128 {
    ((n >> 1) as i128) ^ -((n & 1) as i128)
}

/// Splits a zig-zagged 128-bit magnitude into two 60-bit-packable Simple-8b slots. The high
/// half carries the top 64 bits, the low half the bottom 64 bits; decode reassembles them with
/// [`join_u128`].
pub fn split_u128(n: u128) -> (u64, u64) {
    ((n >> 64) as u64, n as u64)
}

pub fn join_u128(hi: u64, lo: u64) -> u128 {
    ((hi as u128) << 64) | (lo as u128)
}

/// ObjectId reduces to a 96-bit unsigned magnitude (zero-extended into i128) rather than a
/// 64-bit domain: a 12-byte id does not fit losslessly into 64 bits, so deltas here use the
/// same wider integer domain Decimal128 uses.
pub fn object_id_to_i128(id: &ObjectId) -> i128 {
    let mut buf = [0u8; 16];
    buf[4..16].copy_from_slice(id.as_bytes());
    i128::from_be_bytes(buf)
}

pub fn i128_to_object_id(n: i128) -> ObjectId {
    let buf = n.to_be_bytes();
    let mut bytes = [0u8; 12];
    bytes.copy_from_slice(&buf[4..16]);
    ObjectId::from_bytes(bytes)
}

pub fn decimal128_to_i128(d: Decimal128) -> i128 {
    d.0 as i128
}

pub fn i128_to_decimal128(n: i128) -> Decimal128 {
    Decimal128(n as u128)
}

/// Tries each scale in [`SCALE_TABLE`], widest multiplier first, returning the first index
/// that reproduces `value` exactly when divided back out. Returns `None` (memory-as-integer)
/// when no scale is exact or the scaled magnitude would not fit a 60-bit Simple-8b payload.
pub fn best_scale_for(value: f64) -> Option<u8> {
    if !value.is_finite() {
        return None;
    }
    for (idx, &factor) in SCALE_TABLE.iter().enumerate().rev() {
        let scaled = value * factor;
        if scaled.abs() >= (1i64 << 60) as f64 {
            continue;
        }
        let rounded = scaled.round();
        if rounded / factor == value {
            return Some(idx as u8);
        }
    }
    None
}

pub fn scale_factor(index: u8) -> Option<f64> {
    SCALE_TABLE.get(index as usize).copied()
}

/// Reinterprets a double's bits as a signed integer for memory-as-integer delta mode.
pub fn double_to_bits_i64(value: f64) -> i64 {
    value.to_bits() as i64
}

pub fn bits_i64_to_double(bits: i64) -> f64 {
    f64::from_bits(bits as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_i64_roundtrip() {
        for n in [0i64, 1, -1, 2, -2, i64::MAX, i64::MIN, 12345, -98765] {
            assert_eq!(zigzag_decode_i64(zigzag_encode_i64(n)), n);
        }
    }

    #[test]
    fn zigzag_i128_roundtrip() {
        for n in [0i128, 1, -1, i128::MAX, i128::MIN, 1 << 100, -(1 << 100)] {
            assert_eq!(zigzag_decode_i128(zigzag_encode_i128(n)), n);
        }
    }

    #[test]
    fn object_id_roundtrip() {
        let id = ObjectId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        let n = object_id_to_i128(&id);
        assert_eq!(i128_to_object_id(n), id);
    }

    #[test]
    fn scale_selection_picks_widest_exact_scale() {
        assert_eq!(best_scale_for(1.5), Some(4));
        assert_eq!(best_scale_for(0.1), Some(4));
        assert_eq!(best_scale_for(1.0 / 3.0), None);
    }

    #[test]
    fn u128_split_join_roundtrip() {
        let n: u128 = 0x0123_4567_89ab_cdef_fedc_ba98_7654_3210;
        let (hi, lo) = split_u128(n);
        assert_eq!(join_u128(hi, lo), n);
    }
}
