//! # amqp-codec
//!
//! A byte-exact encoder and decoder for the AMQP 1.0 type system.
//!
//! - Every encoded value starts with a one byte format code; its high nibble selects one of five
//!   categories (described, fixed, variable, compound, array) and the width of the size/count
//!   header that follows.
//! - The [`Encoder`] always picks the narrowest valid encoding (`vbin8` vs `vbin32`, `smalluint`
//!   vs `uint`, `list8` vs `list32`, ...) and decides when a list qualifies for the compact array
//!   encoding, where all elements share one constructor.
//! - Encoded values are held as immutable [`EncodedBuffer`]s, which can be built from a typed
//!   value, read from a stream, or sliced out of a buffer already in memory.
//! - Decoding goes through the [`AmqpMarshaller`] trait; [`ValueMarshaller`] produces
//!   [`AmqpValue`]s.
//!
//! ## Configuration
//!
//! Encoding behaviour is controlled by an explicit [`EncoderConfig`]:
//!
//! - `use_8bit_list_encodings`: allow `list8`/`array8`; when false (the default) lists always use
//!   the 32-bit width.
//! - `no_array_encoding`: never use the array encoding for lists.
//!
//! ## Derive
//!
//! `#[derive(AmqpDescribed)]` maps a struct with named fields onto a described list, the shape
//! used for AMQP performatives and message sections.
//!
//! ## Feature Flags
//!
//! - `chrono`: converts AMQP timestamps to and from `chrono::DateTime<Utc>`.
//! - `serde_json`: converts `AmqpValue` into `serde_json::Value` for inspection.

pub mod buffer;
pub mod decoder;
pub mod encoder;
pub mod encoding;
mod features;
pub mod format;
pub mod value;

pub use amqp_codec_derive::AmqpDescribed;
use bytes::{Buf, BufMut, Bytes, BytesMut};
pub use buffer::{
    ArrayBuffer, CompoundBuffer, DescribedBuffer, EncodedBuffer, FixedBuffer, VariableBuffer,
};
pub use decoder::{AmqpMarshaller, ListDecoder, MapDecoder, ValueMarshaller};
pub use encoder::{Encoder, EncoderConfig};
pub use encoding::*;
pub use format::*;
pub use value::{AmqpMap, AmqpValue, Described, Symbol};

/// Errors that can occur during encoding or decoding operations.
#[derive(Debug, thiserror::Error)]
pub enum AmqpCodecError {
    /// The format code does not belong to any category, or is not a defined code.
    #[error("Invalid format code: 0x{0:02x}")]
    InvalidFormatCode(u8),
    /// The value could not be encoded or the wire data is malformed.
    #[error("Encoding error: {0}")]
    Encoding(String),
    /// A format code or value did not match the type that was requested.
    #[error("Unexpected type: expected {expected}, got format code 0x{code:02x}")]
    UnexpectedType { expected: &'static str, code: u8 },
    /// A decoded value was not of the type it was converted into.
    #[error("Unexpected value: expected {expected}, got {actual}")]
    UnexpectedValue {
        expected: &'static str,
        actual: &'static str,
    },
    /// The buffer did not contain enough data to complete the operation.
    #[error("Insufficient data in buffer")]
    InsufficientData,
    /// A size or count does not fit the 32-bit wire field.
    #[error("Length {0} exceeds maximum {max}", max = u32::MAX)]
    Length(usize),
    /// The underlying stream failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AmqpCodecError {
    /// Create an encoding error
    #[inline]
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create an unexpected type error
    #[inline]
    pub fn unexpected(expected: &'static str, code: u8) -> Self {
        Self::UnexpectedType { expected, code }
    }
}

/// The result type used throughout this crate for encode/decode operations.
pub type Result<T> = std::result::Result<T, AmqpCodecError>;

/// Convenience function to encode a value with the default configuration.
///
/// # Example
/// ```rust
/// use amqp_codec::{encode, decode, AmqpValue};
///
/// let value = AmqpValue::from("hello");
/// let mut buf = encode(&value).unwrap();
/// assert_eq!(&buf[..2], &[0xa1, 5]);
/// let decoded = decode(&mut buf).unwrap();
/// assert_eq!(value, decoded);
/// ```
pub fn encode(value: &AmqpValue) -> Result<Bytes> {
    let encoder = Encoder::default();
    let mut writer = BytesMut::with_capacity(encoder.encoded_size(value)?);
    encoder.encode(value, &mut writer)?;
    Ok(writer.freeze())
}

/// Convenience function to decode one value from the front of `reader`, advancing it past the
/// consumed bytes.
pub fn decode(reader: &mut Bytes) -> Result<AmqpValue> {
    let buffer = EncodedBuffer::from_bytes(reader, 0)?;
    reader.advance(buffer.encoded_size());
    ValueMarshaller.decode_type(&buffer)
}

/// Convenience function to write a value to a stream with the default configuration.
///
/// Returns the number of bytes written.
pub fn write<W: std::io::Write>(value: &AmqpValue, writer: &mut W) -> Result<usize> {
    Encoder::default().write(value, writer)
}

/// Convenience function to read one value from a stream.
pub fn read<R: std::io::Read>(reader: &mut R) -> Result<AmqpValue> {
    let buffer = EncodedBuffer::unmarshal(reader)?;
    ValueMarshaller.decode_type(&buffer)
}
