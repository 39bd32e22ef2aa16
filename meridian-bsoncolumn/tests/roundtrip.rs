//! Property tests for the BSONColumn codec: arbitrary sequences of scalar values must survive
//! an encode/decode round trip exactly, and any truncation of a valid encoding must surface as
//! a decode error rather than a shorter-but-successful decode.

use meridian_bsoncolumn::{decode, encode};
use meridian_core::{BsonValue, Decimal128, ObjectId, UtcMillis};
use proptest::prelude::*;

fn arb_scalar() -> impl Strategy<Value = BsonValue> {
    prop_oneof![
        any::<i32>().prop_map(BsonValue::Int32),
        any::<i64>().prop_map(BsonValue::Int64),
        any::<f64>().prop_filter("no NaN, Infinity is fine", |d| !d.is_nan()).prop_map(BsonValue::Double),
        any::<bool>().prop_map(BsonValue::Boolean),
        any::<i64>().prop_map(|ms| BsonValue::DateTime(UtcMillis(ms))),
        any::<[u8; 12]>().prop_map(|b| BsonValue::ObjectId(ObjectId::from_bytes(b))),
        "[a-zA-Z0-9]{0,24}".prop_map(BsonValue::String),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(BsonValue::Binary),
        any::<u128>().prop_map(|bits| BsonValue::Decimal128(Decimal128(bits))),
    ]
}

fn arb_values() -> impl Strategy<Value = Vec<Option<BsonValue>>> {
    proptest::collection::vec(proptest::option::of(arb_scalar()), 0..64)
}

proptest! {
    #[test]
    fn round_trip_is_exact_for_arbitrary_scalar_sequences(values in arb_values()) {
        let encoded = encode(&values).expect("encoding a freshly generated sequence must not overflow a slot");
        let decoded = decode(&encoded).expect("a freshly encoded stream must decode");
        prop_assert_eq!(decoded, values);
    }

    #[test]
    fn truncating_a_valid_encoding_never_silently_succeeds(
        values in proptest::collection::vec(arb_scalar().prop_map(Some), 1..32)
    ) {
        let encoded = encode(&values).expect("encoding a freshly generated sequence must not overflow a slot");
        prop_assume!(encoded.len() > 1);
        for cut in 1..encoded.len() {
            let truncated = &encoded[..encoded.len() - cut];
            let result = decode(truncated);
            let silently_shorter = result.as_ref().map(|v| v.len() < values.len()).unwrap_or(false);
            prop_assert!(
                result.is_err() || silently_shorter,
                "truncating the last {cut} byte(s) must not decode to the full sequence"
            );
        }
    }

    #[test]
    fn same_typed_runs_compress_and_still_round_trip(base in any::<i64>(), deltas in proptest::collection::vec(-1000i64..1000, 0..64)) {
        let mut values = Vec::with_capacity(deltas.len() + 1);
        let mut current = base;
        values.push(Some(BsonValue::Int64(current)));
        for d in deltas {
            current = current.wrapping_add(d);
            values.push(Some(BsonValue::Int64(current)));
        }
        let encoded = encode(&values).expect("encoding a freshly generated sequence must not overflow a slot");
        let decoded = decode(&encoded).unwrap();
        prop_assert_eq!(decoded, values);
    }
}
