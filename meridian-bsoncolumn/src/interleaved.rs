//! Interleaved sub-object decomposition: encodes a run of structurally similar sub-documents
//! by splitting each field into its own independent delta column instead of re-emitting each
//! sub-document as a whole literal.
//!
//! A reference object (the first document, field order canonical) opens the block; each field
//! in that order then gets its own length-prefixed, fully self-contained BSONColumn byte
//! stream (built and read with the same [`crate::writer::BsonColumnWriter`] /
//! [`crate::reader::BsonColumnReader`] used at the top level), and an end-of-object tag closes
//! it. This keeps each field's values adjacent for delta purposes without needing a single
//! byte-interleaved traversal across fields, at the cost of one reference object's worth of
//! framing overhead — a scope simplification over splicing field updates byte-for-byte.

use meridian_core::{BsonValue, Document};

use crate::control::ControlByte;
use crate::error::BsonColumnError;
use crate::literal::{decode_literal, encode_literal};
use crate::reader::BsonColumnReader;
use crate::writer::BsonColumnWriter;

pub fn encode_interleaved(out: &mut Vec<u8>, root: ControlByte, docs: &[Document]) -> Result<(), BsonColumnError> {
    out.push(root.to_byte());
    let reference = docs.first().cloned().unwrap_or_default();
    let field_names: Vec<String> = reference.iter().map(|(name, _)| name.clone()).collect();
    encode_literal(out, &BsonValue::Document(reference));
    out.extend_from_slice(&(field_names.len() as u32).to_le_bytes());
    for name in &field_names {
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(name.as_bytes());

        let mut field_writer = BsonColumnWriter::new();
        for doc in docs {
            field_writer.append(doc.get(name).cloned())?;
        }
        let field_bytes = field_writer.finish()?;
        out.extend_from_slice(&(field_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&field_bytes);
    }
    out.push(ControlByte::EndOfObject.to_byte());
    Ok(())
}

/// Decodes an interleaved block whose start tag has already been consumed by the caller.
/// Returns the reconstructed sub-documents in original row order.
pub fn decode_interleaved(buf: &[u8], pos: &mut usize) -> Result<Vec<Document>, BsonColumnError> {
    let reference = decode_literal(buf, pos)?;
    let reference_fields: Vec<String> = match &reference {
        BsonValue::Document(doc) => doc.iter().map(|(name, _)| name.clone()).collect(),
        _ => {
            return Err(BsonColumnError::MalformedReferenceObject(
                "interleaved reference element is not a document".to_string(),
            ))
        }
    };

    let field_count = read_u32(buf, pos)? as usize;
    let mut columns: Vec<(String, Vec<Option<BsonValue>>)> = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let name_len = read_u32(buf, pos)? as usize;
        let name = read_str(buf, pos, name_len)?;
        let len = read_u32(buf, pos)? as usize;
        if *pos + len > buf.len() {
            return Err(BsonColumnError::TruncatedLiteral);
        }
        let sub_bytes = &buf[*pos..*pos + len];
        *pos += len;

        let values = BsonColumnReader::new(sub_bytes).collect::<Result<Vec<_>, _>>()?;
        columns.push((name, values));
    }

    if field_count != reference_fields.len()
        || columns.iter().map(|(n, _)| n.clone()).ne(reference_fields.into_iter())
    {
        return Err(BsonColumnError::MalformedReferenceObject(
            "declared field list does not match the reference object's fields".to_string(),
        ));
    }

    if *pos >= buf.len() {
        return Err(BsonColumnError::TruncatedLiteral);
    }
    let end_tag = buf[*pos];
    *pos += 1;
    if ControlByte::from_byte(end_tag)? != ControlByte::EndOfObject {
        return Err(BsonColumnError::UnexpectedEndOfObject);
    }

    let row_count = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
    let mut rows = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let mut doc = Document::new();
        for (name, values) in &columns {
            if let Some(Some(value)) = values.get(i) {
                doc.push(name.clone(), value.clone());
            }
        }
        rows.push(doc);
    }
    Ok(rows)
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, BsonColumnError> {
    if *pos + 4 > buf.len() {
        return Err(BsonColumnError::TruncatedLiteral);
    }
    let bytes: [u8; 4] = buf[*pos..*pos + 4].try_into().unwrap();
    *pos += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn read_str(buf: &[u8], pos: &mut usize, len: usize) -> Result<String, BsonColumnError> {
    if *pos + len > buf.len() {
        return Err(BsonColumnError::TruncatedLiteral);
    }
    let s = std::str::from_utf8(&buf[*pos..*pos + len])
        .map_err(|_| BsonColumnError::TruncatedLiteral)?
        .to_string();
    *pos += len;
    Ok(s)
}
