//! Per-run delta state shared by the encoder and decoder: both sides advance the same state
//! machine from the same sequence of raw (pre-zigzag) deltas, so keeping the transition logic
//! in one place keeps them from drifting apart.

use meridian_core::BsonType;

use crate::simple8b::MAX_SLOT_VALUE;
use crate::zigzag::{
    best_scale_for, bits_i64_to_double, decimal128_to_i128, double_to_bits_i64, i128_to_decimal128,
    i128_to_object_id, join_u128, object_id_to_i128, scale_factor, split_u128, zigzag_decode_i128,
    zigzag_decode_i64, zigzag_encode_i128, zigzag_encode_i64,
};

/// The four delta disciplines a run can use, keyed by the BSON type that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Int32, Int64, Boolean: a plain signed delta against the previous value.
    Int,
    /// DateTime: delta-of-delta against the previous value and previous delta.
    DateTime,
    /// Double: scaled-integer delta, or memory-as-integer bit delta when no scale is exact.
    Double,
    /// ObjectId, Decimal128: a 128-bit signed delta split across two Simple-8b slots.
    Wide128,
}

/// Which concrete wide type a [`RunKind::Wide128`] run is reconstructing values as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideRepr {
    ObjectId,
    Decimal128,
}

impl RunKind {
    pub fn for_type(ty: BsonType) -> Option<RunKind> {
        match ty {
            BsonType::Int32 | BsonType::Int64 | BsonType::Boolean => Some(RunKind::Int),
            BsonType::DateTime => Some(RunKind::DateTime),
            BsonType::Double => Some(RunKind::Double),
            BsonType::ObjectId | BsonType::Decimal128 => Some(RunKind::Wide128),
            BsonType::String | BsonType::Binary | BsonType::Document | BsonType::Array => None,
        }
    }

    pub fn slots_per_value(self) -> usize {
        match self {
            RunKind::Wide128 => 2,
            _ => 1,
        }
    }
}

pub fn int_delta_slot(last: i64, cur: i64) -> Option<u64> {
    let delta = cur.wrapping_sub(last);
    let slot = zigzag_encode_i64(delta);
    (slot < MAX_SLOT_VALUE).then_some(slot)
}

pub fn int_delta_apply(last: i64, slot: u64) -> i64 {
    last.wrapping_add(zigzag_decode_i64(slot))
}

/// `(new_delta, slot)` for a delta-of-delta step, or `None` if the encoded value overflows a
/// Simple-8b slot.
pub fn dod_slot(last_value: i64, last_delta: i64, cur: i64) -> Option<(i64, u64)> {
    let new_delta = cur.wrapping_sub(last_value);
    let dod = new_delta.wrapping_sub(last_delta);
    let slot = zigzag_encode_i64(dod);
    (slot < MAX_SLOT_VALUE).then_some((new_delta, slot))
}

pub fn dod_apply(last_value: i64, last_delta: i64, slot: u64) -> (i64, i64) {
    let dod = zigzag_decode_i64(slot);
    let new_delta = last_delta.wrapping_add(dod);
    (last_value.wrapping_add(new_delta), new_delta)
}

pub fn wide_delta_slots(last: i128, cur: i128) -> Option<(u64, u64)> {
    let delta = cur.wrapping_sub(last);
    let zz = zigzag_encode_i128(delta);
    let (hi, lo) = split_u128(zz);
    (hi < MAX_SLOT_VALUE && lo < MAX_SLOT_VALUE).then_some((hi, lo))
}

pub fn wide_delta_apply(last: i128, hi: u64, lo: u64) -> i128 {
    let zz = join_u128(hi, lo);
    last.wrapping_add(zigzag_decode_i128(zz))
}

pub fn object_id_last(id: &meridian_core::ObjectId) -> i128 {
    object_id_to_i128(id)
}

pub use i128_to_decimal128 as wide_to_decimal128;
pub use i128_to_object_id as wide_to_object_id;
pub use decimal128_to_i128 as decimal128_last;

/// Picks an exact scale for both `last` and `cur`, widest multiplier first, or `None` if every
/// scale fails for either value.
pub fn double_shared_scale(last: f64, cur: f64) -> Option<u8> {
    for idx in (0u8..5).rev() {
        let factor = scale_factor(idx).unwrap();
        if exact_at_scale(last, factor) && exact_at_scale(cur, factor) {
            return Some(idx);
        }
    }
    None
}

fn exact_at_scale(value: f64, factor: f64) -> bool {
    if !value.is_finite() {
        return false;
    }
    let scaled = value * factor;
    if scaled.abs() >= (1i64 << 60) as f64 {
        return false;
    }
    (scaled.round() / factor) == value
}

pub fn double_scaled_slot(last: f64, cur: f64, scale: u8) -> Option<(i64, u64)> {
    let factor = scale_factor(scale)?;
    if !exact_at_scale(cur, factor) {
        return None;
    }
    let last_scaled = (last * factor).round() as i64;
    let cur_scaled = (cur * factor).round() as i64;
    let delta = cur_scaled.wrapping_sub(last_scaled);
    let slot = zigzag_encode_i64(delta);
    (slot < MAX_SLOT_VALUE).then_some((cur_scaled, slot))
}

pub fn double_mem_as_int_slot(last: f64, cur: f64) -> Option<(i64, u64)> {
    let last_bits = double_to_bits_i64(last);
    let cur_bits = double_to_bits_i64(cur);
    let delta = cur_bits.wrapping_sub(last_bits);
    let slot = zigzag_encode_i64(delta);
    (slot < MAX_SLOT_VALUE).then_some((cur_bits, slot))
}

pub fn double_scaled_apply(last_scaled: i64, slot: u64, scale: u8) -> (f64, i64) {
    let factor = scale_factor(scale).expect("valid scale index");
    let delta = zigzag_decode_i64(slot);
    let new_scaled = last_scaled.wrapping_add(delta);
    (new_scaled as f64 / factor, new_scaled)
}

pub fn double_mem_as_int_apply(last_bits: i64, slot: u64) -> (f64, i64) {
    let delta = zigzag_decode_i64(slot);
    let new_bits = last_bits.wrapping_add(delta);
    (bits_i64_to_double(new_bits), new_bits)
}

pub fn best_scale_hint(value: f64) -> Option<u8> {
    best_scale_for(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_delta_roundtrips() {
        let slot = int_delta_slot(100, 142).unwrap();
        assert_eq!(int_delta_apply(100, slot), 142);
    }

    #[test]
    fn dod_roundtrips_constant_step() {
        let (d1, s1) = dod_slot(1000, 0, 1010).unwrap();
        let (v1, _) = dod_apply(1000, 0, s1);
        assert_eq!(v1, 1010);
        let (_, s2) = dod_slot(1010, d1, 1020).unwrap();
        let (v2, d2) = dod_apply(1010, d1, s2);
        assert_eq!(v2, 1020);
        assert_eq!(d2, 10);
    }

    #[test]
    fn wide_delta_roundtrips() {
        let last = 12345i128;
        let cur = 12345i128 + 77;
        let (hi, lo) = wide_delta_slots(last, cur).unwrap();
        assert_eq!(wide_delta_apply(last, hi, lo), cur);
    }

    #[test]
    fn double_scaled_roundtrips() {
        let scale = double_shared_scale(1.0, 1.25).unwrap();
        let (last_scaled, _) = double_scaled_slot(1.0, 1.0, scale).unwrap();
        let (_, slot) = double_scaled_slot(1.0, 1.25, scale).unwrap();
        let (value, _) = double_scaled_apply(last_scaled, slot, scale);
        assert_eq!(value, 1.25);
    }
}
