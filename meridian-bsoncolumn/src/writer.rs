//! Encodes a sequence of optional [`BsonValue`]s (`None` meaning "field absent at this
//! position") into a BSONColumn byte stream.
//!
//! A run of same-type deltaable values is accumulated as raw Simple-8b slots and only
//! materialised into control byte + block bytes when the run ends, the delta scheme stops
//! being able to represent a value exactly, or [`BsonColumnWriter::finish`] is called. Missing
//! values are packed into the active run as a reserved sentinel slot rather than breaking it.

use meridian_core::BsonValue;

use crate::control::{ControlByte, MAX_BLOCKS_PER_CONTROL};
use crate::literal::encode_literal;
use crate::run::{
    dod_slot, double_mem_as_int_slot, double_scaled_slot, double_shared_scale, int_delta_slot,
    object_id_last, wide_delta_slots, RunKind,
};
use crate::simple8b::{pack_all, MAX_SLOT_VALUE};
use crate::zigzag::decimal128_to_i128;
use crate::BsonColumnError;

/// Reserved raw delta input marking "value absent at this position". Every genuine delta this
/// encoder produces is held strictly below [`MAX_SLOT_VALUE`] (see `run.rs`'s slot-encoding
/// guards), so the ceiling value itself is free to serve as the sentinel: a missing slot always
/// gets packed into the widest (width-60) selector alongside real values without ever
/// colliding with one.
pub(crate) const MISSING_SLOT: u64 = MAX_SLOT_VALUE;

#[derive(Clone, Copy)]
enum DoubleScale {
    Scaled(u8),
    MemAsInt,
}

struct Run {
    kind: RunKind,
    last_int: i64,
    last_dt_value: i64,
    last_dt_delta: i64,
    last_double: f64,
    last_double_scaled: i64,
    double_scale: Option<DoubleScale>,
    last_wide: i128,
}

pub struct BsonColumnWriter {
    out: Vec<u8>,
    run: Option<Run>,
    slots: Vec<u64>,
    slot_scale: Option<u8>,
}

impl BsonColumnWriter {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            run: None,
            slots: Vec::new(),
            slot_scale: None,
        }
    }

    pub fn append(&mut self, value: Option<BsonValue>) -> Result<(), BsonColumnError> {
        match value {
            None => {
                self.append_missing();
                Ok(())
            }
            Some(v) => self.append_value(v),
        }
    }

    fn append_missing(&mut self) {
        if self.run.is_none() {
            // No active run to attach the sentinel to; open a harmless Int run at baseline 0
            // purely so a leading run of missing values has somewhere to live.
            self.run = Some(Run {
                kind: RunKind::Int,
                last_int: 0,
                last_dt_value: 0,
                last_dt_delta: 0,
                last_double: 0.0,
                last_double_scaled: 0,
                double_scale: None,
                last_wide: 0,
            });
            self.slot_scale = Some(0);
        }
        let slots_per_value = self.run.as_ref().expect("just opened above").kind.slots_per_value();
        for _ in 0..slots_per_value {
            self.slots.push(MISSING_SLOT);
        }
    }

    fn append_value(&mut self, value: BsonValue) -> Result<(), BsonColumnError> {
        let ty = value.bson_type();
        let kind = RunKind::for_type(ty);

        let Some(kind) = kind else {
            self.end_run()?;
            self.emit_literal(&value);
            return Ok(());
        };

        let continuing = self
            .run
            .as_ref()
            .map(|r| r.kind == kind)
            .unwrap_or(false);

        if !continuing {
            self.end_run()?;
            self.emit_literal(&value);
            self.open_run(kind, &value);
            return Ok(());
        }

        if !self.try_continue_run(&value)? {
            self.end_run()?;
            self.emit_literal(&value);
            self.open_run(kind, &value);
        }
        Ok(())
    }

    fn open_run(&mut self, kind: RunKind, value: &BsonValue) {
        let run = match (kind, value) {
            (RunKind::Int, BsonValue::Int32(v)) => Run::int(*v as i64),
            (RunKind::Int, BsonValue::Int64(v)) => Run::int(*v),
            (RunKind::Int, BsonValue::Boolean(v)) => Run::int(*v as i64),
            (RunKind::DateTime, BsonValue::DateTime(v)) => Run::datetime(v.0),
            (RunKind::Double, BsonValue::Double(v)) => Run::double(*v),
            (RunKind::Wide128, BsonValue::ObjectId(v)) => Run::wide(object_id_last(v)),
            (RunKind::Wide128, BsonValue::Decimal128(v)) => Run::wide(decimal128_to_i128(*v)),
            _ => unreachable!("RunKind::for_type and this match must stay in sync"),
        };
        self.run = Some(run);
        self.slot_scale = None;
    }

    /// Attempts to extend the active run with `value`. Returns `Ok(false)` (leaving the run
    /// untouched for the caller to close out) if the delta cannot be represented.
    fn try_continue_run(&mut self, value: &BsonValue) -> Result<bool, BsonColumnError> {
        let run = self.run.as_mut().expect("continuing requires an open run");
        match (run.kind, value) {
            (RunKind::Int, BsonValue::Int32(v)) => Ok(Self::continue_int(run, *v as i64, &mut self.slots, &mut self.slot_scale)),
            (RunKind::Int, BsonValue::Int64(v)) => Ok(Self::continue_int(run, *v, &mut self.slots, &mut self.slot_scale)),
            (RunKind::Int, BsonValue::Boolean(v)) => Ok(Self::continue_int(run, *v as i64, &mut self.slots, &mut self.slot_scale)),
            (RunKind::DateTime, BsonValue::DateTime(v)) => {
                Ok(Self::continue_datetime(run, v.0, &mut self.slots, &mut self.slot_scale))
            }
            (RunKind::Double, BsonValue::Double(v)) => {
                Self::continue_double(run, *v, &mut self.out, &mut self.slots, &mut self.slot_scale)
            }
            (RunKind::Wide128, BsonValue::ObjectId(v)) => {
                Ok(Self::continue_wide(run, object_id_last(v), &mut self.slots, &mut self.slot_scale))
            }
            (RunKind::Wide128, BsonValue::Decimal128(v)) => {
                Ok(Self::continue_wide(run, decimal128_to_i128(*v), &mut self.slots, &mut self.slot_scale))
            }
            _ => Ok(false),
        }
    }

    fn continue_int(run: &mut Run, cur: i64, slots: &mut Vec<u64>, slot_scale: &mut Option<u8>) -> bool {
        match int_delta_slot(run.last_int, cur) {
            Some(slot) => {
                slots.push(slot);
                *slot_scale = Some(0);
                run.last_int = cur;
                true
            }
            None => false,
        }
    }

    fn continue_datetime(run: &mut Run, cur: i64, slots: &mut Vec<u64>, slot_scale: &mut Option<u8>) -> bool {
        match dod_slot(run.last_dt_value, run.last_dt_delta, cur) {
            Some((new_delta, slot)) => {
                slots.push(slot);
                *slot_scale = Some(0);
                run.last_dt_value = cur;
                run.last_dt_delta = new_delta;
                true
            }
            None => false,
        }
    }

    fn continue_wide(run: &mut Run, cur: i128, slots: &mut Vec<u64>, slot_scale: &mut Option<u8>) -> bool {
        match wide_delta_slots(run.last_wide, cur) {
            Some((hi, lo)) => {
                slots.push(hi);
                slots.push(lo);
                *slot_scale = Some(0);
                run.last_wide = cur;
                true
            }
            None => false,
        }
    }

    /// Doubles are the one kind whose group scale can change mid-run: if `cur` cannot be
    /// represented exactly under the currently open group's scale, the pending group is
    /// flushed and a fresh scale is chosen relative to the run's last value.
    fn continue_double(
        run: &mut Run,
        cur: f64,
        out: &mut Vec<u8>,
        slots: &mut Vec<u64>,
        slot_scale: &mut Option<u8>,
    ) -> Result<bool, BsonColumnError> {
        if let Some(mode) = run.double_scale {
            let attempt = match mode {
                DoubleScale::Scaled(idx) => double_scaled_slot(run.last_double, cur, idx)
                    .map(|(scaled, slot)| (scaled, slot, DoubleScale::Scaled(idx))),
                DoubleScale::MemAsInt => double_mem_as_int_slot(run.last_double, cur)
                    .map(|(bits, slot)| (bits, slot, DoubleScale::MemAsInt)),
            };
            if let Some((new_rep, slot, _)) = attempt {
                slots.push(slot);
                run.last_double = cur;
                run.last_double_scaled = new_rep;
                *slot_scale = Some(match mode {
                    DoubleScale::Scaled(idx) => idx,
                    DoubleScale::MemAsInt => crate::zigzag::MEMORY_AS_INTEGER,
                });
                return Ok(true);
            }
            // Current group can't represent `cur`; flush it and fall through to pick a new
            // scale relative to the run's (unchanged) last value.
            flush_slots(out, slots, slot_scale.expect("an open group always has a scale"), 1)?;
            *slot_scale = None;
            run.double_scale = None;
        }

        if let Some(idx) = double_shared_scale(run.last_double, cur) {
            let (new_scaled, slot) =
                double_scaled_slot(run.last_double, cur, idx).expect("just validated exact at idx");
            run.double_scale = Some(DoubleScale::Scaled(idx));
            run.last_double_scaled = new_scaled;
            slots.push(slot);
            *slot_scale = Some(idx);
            run.last_double = cur;
            return Ok(true);
        }

        if let Some((new_bits, slot)) = double_mem_as_int_slot(run.last_double, cur) {
            run.double_scale = Some(DoubleScale::MemAsInt);
            run.last_double_scaled = new_bits;
            slots.push(slot);
            *slot_scale = Some(crate::zigzag::MEMORY_AS_INTEGER);
            run.last_double = cur;
            return Ok(true);
        }

        Ok(false)
    }

    fn end_run(&mut self) -> Result<(), BsonColumnError> {
        if let (Some(scale), Some(run)) = (self.slot_scale, self.run.as_ref()) {
            if !self.slots.is_empty() {
                let spv = run.kind.slots_per_value();
                flush_slots(&mut self.out, &mut self.slots, scale, spv)?;
            }
        }
        self.run = None;
        self.slot_scale = None;
        Ok(())
    }

    fn emit_literal(&mut self, value: &BsonValue) {
        self.out.push(ControlByte::Literal.to_byte());
        encode_literal(&mut self.out, value);
    }

    pub fn finish(mut self) -> Result<Vec<u8>, BsonColumnError> {
        self.end_run()?;
        self.out.push(ControlByte::EndOfColumn.to_byte());
        Ok(self.out)
    }
}

impl Default for BsonColumnWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Run {
    fn int(last: i64) -> Self {
        Run {
            kind: RunKind::Int,
            last_int: last,
            last_dt_value: 0,
            last_dt_delta: 0,
            last_double: 0.0,
            last_double_scaled: 0,
            double_scale: None,
            last_wide: 0,
        }
    }

    fn datetime(last: i64) -> Self {
        Run {
            kind: RunKind::DateTime,
            last_int: 0,
            last_dt_value: last,
            last_dt_delta: 0,
            last_double: 0.0,
            last_double_scaled: 0,
            double_scale: None,
            last_wide: 0,
        }
    }

    fn double(last: f64) -> Self {
        Run {
            kind: RunKind::Double,
            last_int: 0,
            last_dt_value: 0,
            last_dt_delta: 0,
            last_double: last,
            last_double_scaled: 0,
            double_scale: None,
            last_wide: 0,
        }
    }

    fn wide(last: i128) -> Self {
        Run {
            kind: RunKind::Wide128,
            last_int: 0,
            last_dt_value: 0,
            last_dt_delta: 0,
            last_double: 0.0,
            last_double_scaled: 0,
            double_scale: None,
            last_wide: last,
        }
    }
}

/// Packs `slots` into as many 16-word control-byte groups as needed and clears the buffer.
///
/// Simple-8b's final word in a segment may carry zero-padding when the slot count isn't a
/// clean multiple of the chosen selector's width; a plain block-count nibble can't tell real
/// trailing values from that padding. This implementation resolves the ambiguity by prefixing
/// every flushed segment with an explicit little-endian `u32` count of genuine logical values
/// it carries — a deliberate, documented deviation from a block-count-only wire shape.
fn flush_slots(out: &mut Vec<u8>, slots: &mut Vec<u64>, scale: u8, slots_per_value: usize) -> Result<(), BsonColumnError> {
    debug_assert!(!slots.is_empty());
    debug_assert_eq!(slots.len() % slots_per_value, 0);
    let value_count = (slots.len() / slots_per_value) as u32;
    out.push(ControlByte::Segment.to_byte());
    out.extend_from_slice(&value_count.to_le_bytes());
    let words = pack_all(slots)?;
    for chunk in words.chunks(MAX_BLOCKS_PER_CONTROL) {
        let scale_field = if scale == crate::zigzag::MEMORY_AS_INTEGER {
            None
        } else {
            Some(scale)
        };
        out.push(
            ControlByte::Block {
                scale: scale_field,
                block_count: chunk.len(),
            }
            .to_byte(),
        );
        for word in chunk {
            out.extend_from_slice(word);
        }
    }
    slots.clear();
    Ok(())
}

