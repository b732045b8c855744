//! The typed side of the codec: logical AMQP values before encoding and after decoding.

use crate::*;
use indexmap::IndexMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::discriminant;
use uuid::Uuid;

/// An AMQP map. Entries keep wire order; inserting an existing key overwrites its value in place.
pub type AmqpMap = IndexMap<AmqpValue, AmqpValue>;

/// A value of the AMQP 1.0 type system.
///
/// Floating point values compare and hash by bit pattern so that any value can be used as a map
/// key.
#[derive(Debug, Clone)]
pub enum AmqpValue {
    Null,
    Boolean(bool),
    Ubyte(u8),
    Ushort(u16),
    Uint(u32),
    Ulong(u64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// IEEE 754 decimal32, kept as raw big-endian bytes.
    Decimal32([u8; 4]),
    /// IEEE 754 decimal64, kept as raw big-endian bytes.
    Decimal64([u8; 8]),
    /// IEEE 754 decimal128, kept as raw big-endian bytes.
    Decimal128([u8; 16]),
    Char(char),
    /// Milliseconds since the unix epoch.
    Timestamp(i64),
    Uuid(Uuid),
    Binary(Bytes),
    String(String),
    Symbol(Symbol),
    List(Vec<AmqpValue>),
    Map(AmqpMap),
    Described(Box<Described>),
}

impl AmqpValue {
    /// Returns the AMQP name of the value's type. This is useful for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AmqpValue::Null => "null",
            AmqpValue::Boolean(_) => "boolean",
            AmqpValue::Ubyte(_) => "ubyte",
            AmqpValue::Ushort(_) => "ushort",
            AmqpValue::Uint(_) => "uint",
            AmqpValue::Ulong(_) => "ulong",
            AmqpValue::Byte(_) => "byte",
            AmqpValue::Short(_) => "short",
            AmqpValue::Int(_) => "int",
            AmqpValue::Long(_) => "long",
            AmqpValue::Float(_) => "float",
            AmqpValue::Double(_) => "double",
            AmqpValue::Decimal32(_) => "decimal32",
            AmqpValue::Decimal64(_) => "decimal64",
            AmqpValue::Decimal128(_) => "decimal128",
            AmqpValue::Char(_) => "char",
            AmqpValue::Timestamp(_) => "timestamp",
            AmqpValue::Uuid(_) => "uuid",
            AmqpValue::Binary(_) => "binary",
            AmqpValue::String(_) => "string",
            AmqpValue::Symbol(_) => "symbol",
            AmqpValue::List(_) => "list",
            AmqpValue::Map(_) => "map",
            AmqpValue::Described(_) => "described",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AmqpValue::Null)
    }

    /// Whether two values would share an array constructor: same type, and for described values
    /// the same descriptor over the same inner type.
    pub fn same_type(&self, other: &AmqpValue) -> bool {
        match (self, other) {
            (AmqpValue::Described(a), AmqpValue::Described(b)) => {
                a.descriptor == b.descriptor && a.value.same_type(&b.value)
            }
            (a, b) => discriminant(a) == discriminant(b),
        }
    }

    /// Wraps this value with a descriptor.
    pub fn described(descriptor: impl Into<AmqpValue>, value: impl Into<AmqpValue>) -> Self {
        AmqpValue::Described(Box::new(Described::new(descriptor, value)))
    }
}

impl PartialEq for AmqpValue {
    fn eq(&self, other: &Self) -> bool {
        use AmqpValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Ubyte(a), Ubyte(b)) => a == b,
            (Ushort(a), Ushort(b)) => a == b,
            (Uint(a), Uint(b)) => a == b,
            (Ulong(a), Ulong(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Decimal32(a), Decimal32(b)) => a == b,
            (Decimal64(a), Decimal64(b)) => a == b,
            (Decimal128(a), Decimal128(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (Uuid(a), Uuid(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Symbol(a), Symbol(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Described(a), Described(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AmqpValue {}

impl Hash for AmqpValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use AmqpValue::*;
        discriminant(self).hash(state);
        match self {
            Null => {}
            Boolean(v) => v.hash(state),
            Ubyte(v) => v.hash(state),
            Ushort(v) => v.hash(state),
            Uint(v) => v.hash(state),
            Ulong(v) => v.hash(state),
            Byte(v) => v.hash(state),
            Short(v) => v.hash(state),
            Int(v) => v.hash(state),
            Long(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Double(v) => v.to_bits().hash(state),
            Decimal32(v) => v.hash(state),
            Decimal64(v) => v.hash(state),
            Decimal128(v) => v.hash(state),
            Char(v) => v.hash(state),
            Timestamp(v) => v.hash(state),
            Uuid(v) => v.hash(state),
            Binary(v) => v.hash(state),
            String(v) => v.hash(state),
            Symbol(v) => v.hash(state),
            List(v) => v.hash(state),
            // map equality ignores entry order
            Map(v) => v.len().hash(state),
            Described(v) => v.hash(state),
        }
    }
}

/// An AMQP symbol: an ASCII string from a constrained domain, such as a descriptor name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(value: impl Into<String>) -> Self {
        Symbol(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol(value.to_string())
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Symbol(value)
    }
}

/// A value annotated with a descriptor, typically a `ulong` code or a symbolic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Described {
    pub descriptor: AmqpValue,
    pub value: AmqpValue,
}

impl Described {
    pub fn new(descriptor: impl Into<AmqpValue>, value: impl Into<AmqpValue>) -> Self {
        Described {
            descriptor: descriptor.into(),
            value: value.into(),
        }
    }
}

impl From<Infallible> for AmqpCodecError {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

// --- conversions into AmqpValue ---

macro_rules! impl_value_conversions {
    ($($ty:ty => $variant:ident, $name:literal;)+) => {
        $(
            impl From<$ty> for AmqpValue {
                fn from(value: $ty) -> Self {
                    AmqpValue::$variant(value)
                }
            }

            impl TryFrom<AmqpValue> for $ty {
                type Error = AmqpCodecError;

                fn try_from(value: AmqpValue) -> Result<Self> {
                    match value {
                        AmqpValue::$variant(v) => Ok(v),
                        other => Err(AmqpCodecError::UnexpectedValue {
                            expected: $name,
                            actual: other.type_name(),
                        }),
                    }
                }
            }
        )+
    };
}

impl_value_conversions! {
    bool => Boolean, "boolean";
    u8 => Ubyte, "ubyte";
    u16 => Ushort, "ushort";
    u32 => Uint, "uint";
    u64 => Ulong, "ulong";
    i8 => Byte, "byte";
    i16 => Short, "short";
    i32 => Int, "int";
    i64 => Long, "long";
    f32 => Float, "float";
    f64 => Double, "double";
    char => Char, "char";
    Uuid => Uuid, "uuid";
    Bytes => Binary, "binary";
    String => String, "string";
    Symbol => Symbol, "symbol";
    Vec<AmqpValue> => List, "list";
    AmqpMap => Map, "map";
}

impl From<&str> for AmqpValue {
    fn from(value: &str) -> Self {
        AmqpValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for AmqpValue {
    fn from(value: Vec<u8>) -> Self {
        AmqpValue::Binary(Bytes::from(value))
    }
}

impl From<&[u8]> for AmqpValue {
    fn from(value: &[u8]) -> Self {
        AmqpValue::Binary(Bytes::copy_from_slice(value))
    }
}

impl TryFrom<AmqpValue> for Vec<u8> {
    type Error = AmqpCodecError;

    fn try_from(value: AmqpValue) -> Result<Self> {
        Bytes::try_from(value).map(|b| b.to_vec())
    }
}

impl From<Described> for AmqpValue {
    fn from(value: Described) -> Self {
        AmqpValue::Described(Box::new(value))
    }
}

impl TryFrom<AmqpValue> for Described {
    type Error = AmqpCodecError;

    fn try_from(value: AmqpValue) -> Result<Self> {
        match value {
            AmqpValue::Described(d) => Ok(*d),
            other => Err(AmqpCodecError::UnexpectedValue {
                expected: "described",
                actual: other.type_name(),
            }),
        }
    }
}

impl<T: Into<AmqpValue>> From<Option<T>> for AmqpValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => AmqpValue::Null,
        }
    }
}

impl FromIterator<AmqpValue> for AmqpValue {
    fn from_iter<I: IntoIterator<Item = AmqpValue>>(iter: I) -> Self {
        AmqpValue::List(iter.into_iter().collect())
    }
}

impl FromIterator<(AmqpValue, AmqpValue)> for AmqpValue {
    fn from_iter<I: IntoIterator<Item = (AmqpValue, AmqpValue)>>(iter: I) -> Self {
        AmqpValue::Map(iter.into_iter().collect())
    }
}
