//! # BSONColumn Codec
//!
//! A columnar binary format for a sequence of typed document elements: delta and
//! delta-of-delta compression, Simple-8b packed integer blocks, and interleaved sub-object
//! decomposition behind a compact, bit-exact control byte layout.
//!
//! [`writer::BsonColumnWriter`] accumulates `Option<BsonValue>`s (`None` meaning "missing at
//! this position") and produces a self-describing byte stream with [`writer::BsonColumnWriter::finish`].
//! [`reader::BsonColumnReader`] is a forward-only, non-restartable [`Iterator`] over that
//! stream, yielding `Result<Option<BsonValue>, error::BsonColumnError>` per logical value.
//! [`interleaved`] handles the sub-object decomposition mode both sides delegate to when they
//! encounter an interleaved-start control byte.

pub mod control;
pub mod error;
pub mod interleaved;
pub mod literal;
pub mod reader;
pub mod run;
pub mod simple8b;
pub mod writer;
pub mod zigzag;

pub use control::ControlByte;
pub use error::BsonColumnError;
pub use reader::BsonColumnReader;
pub use writer::BsonColumnWriter;

use interleaved::encode_interleaved;
use meridian_core::Document;

/// Encodes a sequence of scalar values with [`BsonColumnWriter`] and returns the finished
/// byte stream. Convenience wrapper over the writer for callers that have the whole sequence
/// in hand up front rather than streaming it incrementally.
pub fn encode(values: &[Option<meridian_core::BsonValue>]) -> Result<Vec<u8>, BsonColumnError> {
    let mut writer = BsonColumnWriter::new();
    for value in values {
        writer.append(value.clone())?;
    }
    writer.finish()
}

/// Decodes a byte stream produced by [`encode`] or [`BsonColumnWriter::finish`] back into a
/// vector of scalar values, failing on the first decode error.
pub fn decode(buf: &[u8]) -> Result<Vec<Option<meridian_core::BsonValue>>, BsonColumnError> {
    BsonColumnReader::new(buf).collect()
}

/// Encodes a run of structurally similar sub-documents in interleaved mode: the first document
/// in `docs` establishes the reference field layout, and every scalar field is streamed as an
/// independent column. `root` selects whether the block is object- or array-rooted.
pub fn encode_interleaved_documents(root: ControlByte, docs: &[Document]) -> Result<Vec<u8>, BsonColumnError> {
    let mut out = Vec::new();
    encode_interleaved(&mut out, root, docs)?;
    out.push(ControlByte::EndOfColumn.to_byte());
    Ok(out)
}

/// Decodes a byte stream produced by [`encode_interleaved_documents`] back into the original
/// row order.
pub fn decode_interleaved_documents(buf: &[u8]) -> Result<Vec<Document>, BsonColumnError> {
    let rows: Vec<_> = BsonColumnReader::new(buf)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|v| match v {
            Some(meridian_core::BsonValue::Document(doc)) => Ok(doc),
            _ => Err(BsonColumnError::MalformedReferenceObject(
                "expected a decoded document row".to_string(),
            )),
        })
        .collect::<Result<_, _>>()?;
    Ok(rows)
}
