//! Raw (non-delta) encoding of a single [`BsonValue`], used for the first element of every
//! run, for non-deltaable types (string, binary, sub-object, sub-array), and for the
//! interleaved-mode reference object.

use meridian_core::{BsonValue, Decimal128, Document, ObjectId, UtcMillis};

use crate::error::BsonColumnError;

const TAG_INT32: u8 = 1;
const TAG_INT64: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_BOOLEAN: u8 = 4;
const TAG_DATETIME: u8 = 5;
const TAG_OBJECT_ID: u8 = 6;
const TAG_STRING: u8 = 7;
const TAG_BINARY: u8 = 8;
const TAG_DECIMAL128: u8 = 9;
const TAG_DOCUMENT: u8 = 10;
const TAG_ARRAY: u8 = 11;

pub fn encode_literal(out: &mut Vec<u8>, value: &BsonValue) {
    match value {
        BsonValue::Int32(v) => {
            out.push(TAG_INT32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        BsonValue::Int64(v) => {
            out.push(TAG_INT64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        BsonValue::Double(v) => {
            out.push(TAG_DOUBLE);
            out.extend_from_slice(&v.to_le_bytes());
        }
        BsonValue::Boolean(v) => {
            out.push(TAG_BOOLEAN);
            out.push(if *v { 1 } else { 0 });
        }
        BsonValue::DateTime(v) => {
            out.push(TAG_DATETIME);
            out.extend_from_slice(&v.0.to_le_bytes());
        }
        BsonValue::ObjectId(v) => {
            out.push(TAG_OBJECT_ID);
            out.extend_from_slice(v.as_bytes());
        }
        BsonValue::String(v) => {
            out.push(TAG_STRING);
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v.as_bytes());
        }
        BsonValue::Binary(v) => {
            out.push(TAG_BINARY);
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v);
        }
        BsonValue::Decimal128(v) => {
            out.push(TAG_DECIMAL128);
            out.extend_from_slice(&v.0.to_le_bytes());
        }
        BsonValue::Document(doc) => {
            out.push(TAG_DOCUMENT);
            out.extend_from_slice(&(doc.len() as u32).to_le_bytes());
            for (name, v) in doc.iter() {
                out.extend_from_slice(&(name.len() as u32).to_le_bytes());
                out.extend_from_slice(name.as_bytes());
                encode_literal(out, v);
            }
        }
        BsonValue::Array(items) => {
            out.push(TAG_ARRAY);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_literal(out, item);
            }
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], BsonColumnError> {
        if self.pos + n > self.buf.len() {
            return Err(BsonColumnError::TruncatedLiteral);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, BsonColumnError> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> Result<u32, BsonColumnError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }
}

pub fn decode_literal(buf: &[u8], pos: &mut usize) -> Result<BsonValue, BsonColumnError> {
    let mut cursor = Cursor { buf, pos: *pos };
    let value = decode_literal_inner(&mut cursor)?;
    *pos = cursor.pos;
    Ok(value)
}

fn decode_literal_inner(cursor: &mut Cursor<'_>) -> Result<BsonValue, BsonColumnError> {
    let tag = cursor.take_u8()?;
    let value = match tag {
        TAG_INT32 => BsonValue::Int32(i32::from_le_bytes(cursor.take(4)?.try_into().unwrap())),
        TAG_INT64 => BsonValue::Int64(i64::from_le_bytes(cursor.take(8)?.try_into().unwrap())),
        TAG_DOUBLE => BsonValue::Double(f64::from_le_bytes(cursor.take(8)?.try_into().unwrap())),
        TAG_BOOLEAN => BsonValue::Boolean(cursor.take_u8()? != 0),
        TAG_DATETIME => BsonValue::DateTime(UtcMillis(i64::from_le_bytes(
            cursor.take(8)?.try_into().unwrap(),
        ))),
        TAG_OBJECT_ID => {
            let bytes: [u8; 12] = cursor.take(12)?.try_into().unwrap();
            BsonValue::ObjectId(ObjectId::from_bytes(bytes))
        }
        TAG_STRING => {
            let len = cursor.take_u32()? as usize;
            let bytes = cursor.take(len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|_| BsonColumnError::TruncatedLiteral)?
                .to_string();
            BsonValue::String(s)
        }
        TAG_BINARY => {
            let len = cursor.take_u32()? as usize;
            BsonValue::Binary(cursor.take(len)?.to_vec())
        }
        TAG_DECIMAL128 => {
            let bytes: [u8; 16] = cursor.take(16)?.try_into().unwrap();
            BsonValue::Decimal128(Decimal128(u128::from_le_bytes(bytes)))
        }
        TAG_DOCUMENT => {
            let count = cursor.take_u32()? as usize;
            let mut doc = Document::with_capacity(count);
            for _ in 0..count {
                let name_len = cursor.take_u32()? as usize;
                let name_bytes = cursor.take(name_len)?;
                let name = std::str::from_utf8(name_bytes)
                    .map_err(|_| BsonColumnError::TruncatedLiteral)?
                    .to_string();
                let value = decode_literal_inner(cursor)?;
                doc.push(name, value);
            }
            BsonValue::Document(doc)
        }
        TAG_ARRAY => {
            let count = cursor.take_u32()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_literal_inner(cursor)?);
            }
            BsonValue::Array(items)
        }
        other => return Err(BsonColumnError::UnknownControlByte(other)),
    };
    Ok(value)
}
