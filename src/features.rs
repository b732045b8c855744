#[cfg(feature = "chrono")]
use chrono::{DateTime, TimeZone, Utc};
#[cfg(feature = "serde_json")]
use serde_json::{Map, Number, Value};

#[allow(unused_imports)]
use crate::*;

// --- DateTime<Utc> ---
#[cfg(feature = "chrono")]
impl From<DateTime<Utc>> for AmqpValue {
    fn from(value: DateTime<Utc>) -> Self {
        AmqpValue::Timestamp(value.timestamp_millis())
    }
}

#[cfg(feature = "chrono")]
impl TryFrom<AmqpValue> for DateTime<Utc> {
    type Error = AmqpCodecError;

    fn try_from(value: AmqpValue) -> Result<Self> {
        match value {
            AmqpValue::Timestamp(millis) => Utc.timestamp_millis_opt(millis).single().ok_or_else(
                || AmqpCodecError::Encoding(format!("Timestamp {} is out of range", millis)),
            ),
            other => Err(AmqpCodecError::UnexpectedValue {
                expected: "timestamp",
                actual: other.type_name(),
            }),
        }
    }
}

// --- serde_json::Value ---
/// A lossy view for logs and diagnostics. Binary becomes an array of numbers, decimals their raw
/// bytes, described values an object with `descriptor` and `value`, and map keys their JSON text
/// unless they already are strings or symbols.
#[cfg(feature = "serde_json")]
impl From<&AmqpValue> for Value {
    fn from(value: &AmqpValue) -> Self {
        match value {
            AmqpValue::Null => Value::Null,
            AmqpValue::Boolean(v) => Value::Bool(*v),
            AmqpValue::Ubyte(v) => Value::from(*v),
            AmqpValue::Ushort(v) => Value::from(*v),
            AmqpValue::Uint(v) => Value::from(*v),
            AmqpValue::Ulong(v) => Value::from(*v),
            AmqpValue::Byte(v) => Value::from(*v),
            AmqpValue::Short(v) => Value::from(*v),
            AmqpValue::Int(v) => Value::from(*v),
            AmqpValue::Long(v) => Value::from(*v),
            AmqpValue::Float(v) => Number::from_f64(*v as f64).map_or(Value::Null, Value::Number),
            AmqpValue::Double(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
            AmqpValue::Decimal32(v) => Value::from(v.to_vec()),
            AmqpValue::Decimal64(v) => Value::from(v.to_vec()),
            AmqpValue::Decimal128(v) => Value::from(v.to_vec()),
            AmqpValue::Char(v) => Value::String(v.to_string()),
            AmqpValue::Timestamp(v) => Value::from(*v),
            AmqpValue::Uuid(v) => Value::String(v.to_string()),
            AmqpValue::Binary(v) => Value::from(v.to_vec()),
            AmqpValue::String(v) => Value::String(v.clone()),
            AmqpValue::Symbol(v) => Value::String(v.as_str().to_string()),
            AmqpValue::List(v) => Value::Array(v.iter().map(Value::from).collect()),
            AmqpValue::Map(v) => {
                let mut map = Map::with_capacity(v.len());
                for (key, value) in v {
                    let key = match key {
                        AmqpValue::String(s) => s.clone(),
                        AmqpValue::Symbol(s) => s.as_str().to_string(),
                        other => Value::from(other).to_string(),
                    };
                    map.insert(key, Value::from(value));
                }
                Value::Object(map)
            }
            AmqpValue::Described(d) => {
                let mut map = Map::with_capacity(2);
                map.insert("descriptor".to_string(), Value::from(&d.descriptor));
                map.insert("value".to_string(), Value::from(&d.value));
                Value::Object(map)
            }
        }
    }
}

#[cfg(feature = "serde_json")]
impl From<AmqpValue> for Value {
    fn from(value: AmqpValue) -> Self {
        Value::from(&value)
    }
}
