//! Scalar value generators.

use crate::model::{Value, ValueType};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

/// Start of the range random timestamps are drawn from (2020-01-01T00:00:00Z)
const TIMESTAMP_BASE: i64 = 1_577_836_800;

/// Width of the timestamp range, about five years
const TIMESTAMP_SPAN_SECS: i64 = 5 * 365 * 24 * 60 * 60;

const BLOB_LEN: usize = 16;

/// Generate a random UUID v4 using the provided RNG.
pub fn generate_uuid<R: Rng>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// Text is the field name followed by a random UUID, e.g. `Label3f2c...`
pub fn generate_text<R: Rng>(rng: &mut R, field: &str) -> String {
    format!("{}{}", field, generate_uuid(rng))
}

pub fn generate_real<R: Rng>(rng: &mut R) -> f64 {
    rng.gen_range(1.0..1000.0)
}

pub fn generate_blob<R: Rng>(rng: &mut R) -> Vec<u8> {
    let mut bytes = vec![0u8; BLOB_LEN];
    rng.fill(bytes.as_mut_slice());
    bytes
}

/// Generate a timestamp in whole seconds within the fixed range
pub fn generate_timestamp<R: Rng>(rng: &mut R) -> DateTime<Utc> {
    let offset = rng.gen_range(0..TIMESTAMP_SPAN_SECS);
    DateTime::from_timestamp(TIMESTAMP_BASE, 0).unwrap_or_default() + Duration::seconds(offset)
}

/// Generate a scalar of the requested type
///
/// Integers come from `next_integer` so that generated keys never collide.
pub fn generate_scalar<R: Rng>(
    rng: &mut R,
    field: &str,
    value_type: ValueType,
    next_integer: &mut i64,
) -> Value {
    match value_type {
        ValueType::Bool => Value::Bool(rng.gen_bool(0.5)),
        ValueType::Integer => {
            *next_integer += rng.gen_range(1..=16);
            Value::Integer(*next_integer)
        }
        ValueType::Real => Value::Real(generate_real(rng)),
        ValueType::Text => Value::Text(generate_text(rng, field)),
        ValueType::Blob => Value::Blob(generate_blob(rng)),
        ValueType::Uuid => Value::Uuid(generate_uuid(rng)),
        ValueType::Timestamp => Value::Timestamp(generate_timestamp(rng)),
        ValueType::Date => Value::Date(generate_timestamp(rng).date_naive()),
    }
}
