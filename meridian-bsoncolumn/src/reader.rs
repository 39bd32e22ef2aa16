//! Forward-only, lazy decoder: each [`Iterator::next`] call produces exactly one logical
//! value (`None` meaning the field was absent at that position) or a fatal
//! [`BsonColumnError`], after which the iterator yields no further items.

use std::collections::VecDeque;

use meridian_core::BsonValue;

use crate::control::ControlByte;
use crate::error::BsonColumnError;
use crate::interleaved::decode_interleaved;
use crate::literal::decode_literal;
use crate::run::{
    dod_apply, double_mem_as_int_apply, double_scaled_apply, int_delta_apply, object_id_last,
    wide_delta_apply, wide_to_decimal128, wide_to_object_id, RunKind, WideRepr,
};
use crate::simple8b::unpack_one;
use crate::writer::MISSING_SLOT;
use crate::zigzag::{decimal128_to_i128, double_to_bits_i64, scale_factor, MEMORY_AS_INTEGER};

struct DecodeRun {
    kind: RunKind,
    last_int: i64,
    last_dt_value: i64,
    last_dt_delta: i64,
    last_double: f64,
    last_double_scaled: i64,
    last_wide: i128,
    wide_repr: WideRepr,
}

pub struct BsonColumnReader<'a> {
    buf: &'a [u8],
    pos: usize,
    run: Option<DecodeRun>,
    remaining_in_segment: usize,
    current_scale: u8,
    /// `true` from the moment a `Segment` control byte is read until the first non-missing
    /// value in it is decoded. A double segment's scale can differ from the previous one (see
    /// `writer::BsonColumnWriter::continue_double`), so the first real value of each segment
    /// must re-seed `last_double_scaled` from the run's last materialised double rather than
    /// carrying over the previous segment's scaled representation.
    segment_fresh: bool,
    pending_slots: VecDeque<u64>,
    pending_rows: VecDeque<BsonValue>,
    done: bool,
}

impl<'a> BsonColumnReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            run: None,
            remaining_in_segment: 0,
            current_scale: 0,
            segment_fresh: false,
            pending_slots: VecDeque::new(),
            pending_rows: VecDeque::new(),
            done: false,
        }
    }

    fn read_byte(&mut self) -> Result<u8, BsonColumnError> {
        let b = *self.buf.get(self.pos).ok_or(BsonColumnError::TruncatedLiteral)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u32(&mut self) -> Result<u32, BsonColumnError> {
        if self.pos + 4 > self.buf.len() {
            return Err(BsonColumnError::TruncatedLiteral);
        }
        let bytes: [u8; 4] = self.buf[self.pos..self.pos + 4].try_into().unwrap();
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_word(&mut self) -> Result<u64, BsonColumnError> {
        if self.pos + 8 > self.buf.len() {
            return Err(BsonColumnError::TruncatedBlock {
                expected: 8,
                found: self.buf.len() - self.pos,
            });
        }
        let bytes: [u8; 8] = self.buf[self.pos..self.pos + 8].try_into().unwrap();
        self.pos += 8;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Ensures `pending_slots` has at least one more slot available for the active run,
    /// reading and unpacking another Block control byte's words if necessary.
    fn fill_slots(&mut self) -> Result<(), BsonColumnError> {
        if !self.pending_slots.is_empty() {
            return Ok(());
        }
        let tag = ControlByte::from_byte(self.read_byte()?)?;
        match tag {
            ControlByte::Block { scale, block_count } => {
                self.current_scale = scale.unwrap_or(MEMORY_AS_INTEGER);
                for _ in 0..block_count {
                    let word = self.read_word()?;
                    for slot in unpack_one(word)? {
                        self.pending_slots.push_back(slot);
                    }
                }
                Ok(())
            }
            other => Err(BsonColumnError::UnknownControlByte(other.to_byte())),
        }
    }

    fn next_value_from_segment(&mut self) -> Result<Option<BsonValue>, BsonColumnError> {
        let run = self.run.as_mut().expect("segment requires an active run");
        let spv = run.kind.slots_per_value();
        let mut slots = Vec::with_capacity(spv);
        for _ in 0..spv {
            self.fill_slots()?;
            slots.push(self.pending_slots.pop_front().expect("fill_slots guarantees availability"));
        }
        self.remaining_in_segment -= 1;
        if self.remaining_in_segment == 0 {
            // Any leftover slots belong to the final word's selector padding; discard them.
            self.pending_slots.clear();
        }

        if slots.iter().all(|&s| s == MISSING_SLOT) {
            return Ok(None);
        }

        let scale = self.current_scale;
        let value = match run.kind {
            RunKind::Int => {
                run.last_int = int_delta_apply(run.last_int, slots[0]);
                BsonValue::Int64(run.last_int)
            }
            RunKind::DateTime => {
                let (value, delta) = dod_apply(run.last_dt_value, run.last_dt_delta, slots[0]);
                run.last_dt_value = value;
                run.last_dt_delta = delta;
                BsonValue::DateTime(meridian_core::UtcMillis(value))
            }
            RunKind::Double => {
                // The writer computes the first delta of every scale group relative to the
                // group's own baseline (the run's last materialised double), not whatever
                // scaled representation the previous group happened to leave behind — the
                // scale can change between groups. Re-seed once, on that first real value.
                if self.segment_fresh {
                    run.last_double_scaled = if scale == MEMORY_AS_INTEGER {
                        double_to_bits_i64(run.last_double)
                    } else {
                        let factor = scale_factor(scale).ok_or(BsonColumnError::InvalidScaleIndex(scale))?;
                        (run.last_double * factor).round() as i64
                    };
                }
                let (value, rep) = if scale == MEMORY_AS_INTEGER {
                    double_mem_as_int_apply(run.last_double_scaled, slots[0])
                } else {
                    double_scaled_apply(run.last_double_scaled, slots[0], scale)
                };
                run.last_double = value;
                run.last_double_scaled = rep;
                BsonValue::Double(value)
            }
            RunKind::Wide128 => {
                let value = wide_delta_apply(run.last_wide, slots[0], slots[1]);
                run.last_wide = value;
                match run.wide_repr {
                    WideRepr::ObjectId => BsonValue::ObjectId(wide_to_object_id(value)),
                    WideRepr::Decimal128 => BsonValue::Decimal128(wide_to_decimal128(value)),
                }
            }
        };
        self.segment_fresh = false;
        Ok(Some(value))
    }

    fn start_run_from_literal(&mut self, value: &BsonValue) {
        self.run = match RunKind::for_type(value.bson_type()) {
            None => None,
            Some(kind) => Some(match (kind, value) {
                (RunKind::Int, BsonValue::Int32(v)) => DecodeRun::int(*v as i64),
                (RunKind::Int, BsonValue::Int64(v)) => DecodeRun::int(*v),
                (RunKind::Int, BsonValue::Boolean(v)) => DecodeRun::int(*v as i64),
                (RunKind::DateTime, BsonValue::DateTime(v)) => DecodeRun::datetime(v.0),
                (RunKind::Double, BsonValue::Double(v)) => DecodeRun::double(*v),
                (RunKind::Wide128, BsonValue::ObjectId(v)) => {
                    DecodeRun::wide(object_id_last(v), WideRepr::ObjectId)
                }
                (RunKind::Wide128, BsonValue::Decimal128(v)) => {
                    DecodeRun::wide(decimal128_to_i128(*v), WideRepr::Decimal128)
                }
                _ => unreachable!("RunKind::for_type matches the value's own type"),
            }),
        };
    }
}

impl<'a> Iterator for BsonColumnReader<'a> {
    type Item = Result<Option<BsonValue>, BsonColumnError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(row) = self.pending_rows.pop_front() {
            return Some(Ok(Some(row)));
        }
        if self.remaining_in_segment > 0 {
            return Some(self.next_value_from_segment().map_err(|e| {
                self.done = true;
                e
            }));
        }

        let tag = match self.read_byte() {
            Ok(b) => b,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        match ControlByte::from_byte(tag) {
            Ok(ControlByte::EndOfColumn) => {
                self.done = true;
                None
            }
            Ok(ControlByte::Literal) => match decode_literal(self.buf, &mut self.pos) {
                Ok(value) => {
                    self.start_run_from_literal(&value);
                    Some(Ok(Some(value)))
                }
                Err(e) => {
                    self.done = true;
                    Some(Err(e))
                }
            },
            Ok(ControlByte::Segment) => {
                if self.run.is_none() {
                    self.done = true;
                    return Some(Err(BsonColumnError::UnknownControlByte(tag)));
                }
                match self.read_u32() {
                    Ok(count) => {
                        self.remaining_in_segment = count as usize;
                        self.pending_slots.clear();
                        self.segment_fresh = true;
                        if count == 0 {
                            self.next()
                        } else {
                            Some(self.next_value_from_segment().map_err(|e| {
                                self.done = true;
                                e
                            }))
                        }
                    }
                    Err(e) => {
                        self.done = true;
                        Some(Err(e))
                    }
                }
            }
            Ok(root @ (ControlByte::InterleavedStartObject
            | ControlByte::InterleavedStartArray
            | ControlByte::InterleavedStartLegacy)) => {
                let _ = root;
                match decode_interleaved(self.buf, &mut self.pos) {
                    Ok(rows) => {
                        self.run = None;
                        self.pending_rows = rows.into_iter().map(BsonValue::Document).collect();
                        self.next()
                    }
                    Err(e) => {
                        self.done = true;
                        Some(Err(e))
                    }
                }
            }
            Ok(ControlByte::EndOfObject) => {
                self.done = true;
                Some(Err(BsonColumnError::UnexpectedEndOfObject))
            }
            Ok(ControlByte::Block { .. }) => {
                self.done = true;
                Some(Err(BsonColumnError::UnknownControlByte(tag)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl DecodeRun {
    fn int(last: i64) -> Self {
        DecodeRun {
            kind: RunKind::Int,
            last_int: last,
            last_dt_value: 0,
            last_dt_delta: 0,
            last_double: 0.0,
            last_double_scaled: 0,
            last_wide: 0,
            wide_repr: WideRepr::Decimal128,
        }
    }

    fn datetime(last: i64) -> Self {
        DecodeRun {
            kind: RunKind::DateTime,
            last_int: 0,
            last_dt_value: last,
            last_dt_delta: 0,
            last_double: 0.0,
            last_double_scaled: 0,
            last_wide: 0,
            wide_repr: WideRepr::Decimal128,
        }
    }

    fn double(last: f64) -> Self {
        DecodeRun {
            kind: RunKind::Double,
            last_int: 0,
            last_dt_value: 0,
            last_dt_delta: 0,
            last_double: last,
            last_double_scaled: 0,
            last_wide: 0,
            wide_repr: WideRepr::Decimal128,
        }
    }

    fn wide(last: i128, wide_repr: WideRepr) -> Self {
        DecodeRun {
            kind: RunKind::Wide128,
            last_int: 0,
            last_dt_value: 0,
            last_dt_delta: 0,
            last_double: 0.0,
            last_double_scaled: 0,
            last_wide: last,
            wide_repr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BsonColumnWriter;

    fn round_trip(values: Vec<Option<BsonValue>>) -> Vec<Option<BsonValue>> {
        let mut writer = BsonColumnWriter::new();
        for v in &values {
            writer.append(v.clone()).unwrap();
        }
        let encoded = writer.finish().unwrap();
        BsonColumnReader::new(&encoded).collect::<Result<Vec<_>, _>>().unwrap()
    }

    #[test]
    fn double_run_reseeds_scaled_baseline_at_each_segment() {
        let values = vec![Some(BsonValue::Double(1.5)), Some(BsonValue::Double(1.25))];
        assert_eq!(round_trip(values.clone()), values);
    }

    #[test]
    fn double_run_with_leading_missing_value_still_reseeds_correctly() {
        let values = vec![
            Some(BsonValue::Double(1.5)),
            None,
            Some(BsonValue::Double(1.25)),
        ];
        assert_eq!(round_trip(values.clone()), values);
    }

    #[test]
    fn missing_values_interleaved_in_a_run_do_not_panic_the_writer() {
        let values = vec![
            Some(BsonValue::Int64(100)),
            None,
            Some(BsonValue::Int64(107)),
            None,
        ];
        assert_eq!(round_trip(values.clone()), values);
    }
}
