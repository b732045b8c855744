//! Turning encoded buffers back into values.
//!
//! Decoding is split in two: [`EncodedBuffer`] knows the layout of the bytes, an
//! [`AmqpMarshaller`] knows what to build from them. [`ListDecoder`] and [`MapDecoder`] walk the
//! constituents of compound values and hand each one to the marshaller.

use crate::*;
use indexmap::IndexMap;
use std::hash::Hash;
use std::io::Read;
use tracing::debug;
use uuid::Uuid;

/// Builds a typed value from one encoded buffer.
pub trait AmqpMarshaller {
    type Output;

    fn decode_type(&self, buffer: &EncodedBuffer) -> Result<Self::Output>;
}

/// Decodes any buffer into an [`AmqpValue`]. Arrays decode as lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueMarshaller;

impl AmqpMarshaller for ValueMarshaller {
    type Output = AmqpValue;

    fn decode_type(&self, buffer: &EncodedBuffer) -> Result<AmqpValue> {
        self.decode_value(buffer).map_err(|e| {
            debug!(format_code = buffer.format_code(), error = %e, "failed to decode value");
            e
        })
    }
}

impl ValueMarshaller {
    /// Decodes `buffer` and converts the result into `T`.
    ///
    /// # Errors
    /// Fails with `UnexpectedValue` when the decoded value is of another type.
    pub fn decode_as<T>(&self, buffer: &EncodedBuffer) -> Result<T>
    where
        T: TryFrom<AmqpValue, Error = AmqpCodecError>,
    {
        T::try_from(self.decode_type(buffer)?)
    }

    fn decode_value(&self, buffer: &EncodedBuffer) -> Result<AmqpValue> {
        match buffer {
            EncodedBuffer::Described(b) => Ok(AmqpValue::described(
                self.decode_type(b.descriptor())?,
                self.decode_type(b.described())?,
            )),
            EncodedBuffer::Fixed(b) => decode_fixed(b.format_code(), b.data()),
            EncodedBuffer::Variable(b) => decode_variable(b.format_code(), b.data()),
            EncodedBuffer::Compound(b) if b.is_map() => {
                MapDecoder::decode(b.constituents(), self).map(AmqpValue::Map)
            }
            EncodedBuffer::Compound(b) => {
                ListDecoder::decode(b.constituents(), self).map(AmqpValue::List)
            }
            EncodedBuffer::Array(b) => {
                ListDecoder::decode(b.constituents(), self).map(AmqpValue::List)
            }
        }
    }
}

/// Decodes the data bytes of a fixed-width value. `data` is exactly as long as the code's width.
fn decode_fixed(format_code: u8, mut data: &[u8]) -> Result<AmqpValue> {
    let value = match format_code {
        FORMAT_NULL => AmqpValue::Null,
        FORMAT_TRUE => AmqpValue::Boolean(true),
        FORMAT_FALSE => AmqpValue::Boolean(false),
        FORMAT_UINT0 => AmqpValue::Uint(0),
        FORMAT_ULONG0 => AmqpValue::Ulong(0),
        FORMAT_LIST0 => AmqpValue::List(Vec::new()),
        FORMAT_BOOLEAN => match data.get_u8() {
            0x00 => AmqpValue::Boolean(false),
            0x01 => AmqpValue::Boolean(true),
            other => {
                return Err(AmqpCodecError::Encoding(format!(
                    "Invalid boolean byte 0x{:02x}",
                    other
                )))
            }
        },
        FORMAT_UBYTE => AmqpValue::Ubyte(data.get_u8()),
        FORMAT_BYTE => AmqpValue::Byte(data.get_i8()),
        FORMAT_SMALLUINT => AmqpValue::Uint(data.get_u8() as u32),
        FORMAT_SMALLULONG => AmqpValue::Ulong(data.get_u8() as u64),
        FORMAT_SMALLINT => AmqpValue::Int(data.get_i8() as i32),
        FORMAT_SMALLLONG => AmqpValue::Long(data.get_i8() as i64),
        FORMAT_USHORT => AmqpValue::Ushort(data.get_u16()),
        FORMAT_SHORT => AmqpValue::Short(data.get_i16()),
        FORMAT_UINT => AmqpValue::Uint(data.get_u32()),
        FORMAT_INT => AmqpValue::Int(data.get_i32()),
        FORMAT_FLOAT => AmqpValue::Float(data.get_f32()),
        FORMAT_CHAR => {
            let code_point = data.get_u32();
            let c = char::from_u32(code_point).ok_or_else(|| {
                AmqpCodecError::Encoding(format!("Invalid char code point 0x{:x}", code_point))
            })?;
            AmqpValue::Char(c)
        }
        FORMAT_DECIMAL32 => {
            let mut v = [0u8; 4];
            data.copy_to_slice(&mut v);
            AmqpValue::Decimal32(v)
        }
        FORMAT_ULONG => AmqpValue::Ulong(data.get_u64()),
        FORMAT_LONG => AmqpValue::Long(data.get_i64()),
        FORMAT_DOUBLE => AmqpValue::Double(data.get_f64()),
        FORMAT_TIMESTAMP => AmqpValue::Timestamp(data.get_i64()),
        FORMAT_DECIMAL64 => {
            let mut v = [0u8; 8];
            data.copy_to_slice(&mut v);
            AmqpValue::Decimal64(v)
        }
        FORMAT_DECIMAL128 => {
            let mut v = [0u8; 16];
            data.copy_to_slice(&mut v);
            AmqpValue::Decimal128(v)
        }
        FORMAT_UUID => {
            let mut v = [0u8; 16];
            data.copy_to_slice(&mut v);
            AmqpValue::Uuid(Uuid::from_bytes(v))
        }
        other => return Err(AmqpCodecError::InvalidFormatCode(other)),
    };
    Ok(value)
}

fn decode_variable(format_code: u8, data: Bytes) -> Result<AmqpValue> {
    match format_code {
        FORMAT_VBIN8 | FORMAT_VBIN32 => Ok(AmqpValue::Binary(data)),
        FORMAT_STR8_UTF8 | FORMAT_STR32_UTF8 => String::from_utf8(data.to_vec())
            .map(AmqpValue::String)
            .map_err(|e| AmqpCodecError::Encoding(format!("Invalid UTF-8 in string: {}", e))),
        FORMAT_SYM8 | FORMAT_SYM32 => {
            if !data.is_ascii() {
                return Err(AmqpCodecError::encoding("Symbol contains non-ASCII bytes"));
            }
            let symbol = std::str::from_utf8(&data)
                .map_err(|e| AmqpCodecError::Encoding(format!("Invalid symbol: {}", e)))?;
            Ok(AmqpValue::Symbol(Symbol::new(symbol)))
        }
        other => Err(AmqpCodecError::InvalidFormatCode(other)),
    }
}

/// Decodes the constituents of a list or array in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListDecoder;

impl ListDecoder {
    pub fn decode<M: AmqpMarshaller>(
        constituents: &[EncodedBuffer],
        marshaller: &M,
    ) -> Result<Vec<M::Output>> {
        constituents
            .iter()
            .map(|c| marshaller.decode_type(c))
            .collect()
    }

    /// Reads `count` self-describing constituents from a stream positioned after a list header.
    ///
    /// `size` is the declared number of data bytes after the count field.
    ///
    /// # Errors
    /// Fails when the constituents do not use exactly `size` bytes.
    pub fn unmarshal<R: Read, M: AmqpMarshaller>(
        count: usize,
        size: usize,
        reader: &mut R,
        marshaller: &M,
    ) -> Result<Vec<M::Output>> {
        let (buffers, consumed) = read_constituents(count, reader)?;
        check_consumed("List", size, consumed)?;
        Self::decode(&buffers, marshaller)
    }
}

/// Decodes the constituents of a map as alternating keys and values.
///
/// A key that appears twice keeps its first position and takes the last value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapDecoder;

impl MapDecoder {
    /// # Errors
    /// An odd number of constituents is an `Encoding` error.
    pub fn decode<M>(
        constituents: &[EncodedBuffer],
        marshaller: &M,
    ) -> Result<IndexMap<M::Output, M::Output>>
    where
        M: AmqpMarshaller,
        M::Output: Hash + Eq,
    {
        check_even(constituents.len())?;
        let mut map = IndexMap::with_capacity(constituents.len() / 2);
        for pair in constituents.chunks_exact(2) {
            let key = marshaller.decode_type(&pair[0])?;
            let value = marshaller.decode_type(&pair[1])?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Reads `count` constituents from a stream positioned after a map header.
    ///
    /// The count is checked before anything is read.
    pub fn unmarshal<R, M>(
        count: usize,
        size: usize,
        reader: &mut R,
        marshaller: &M,
    ) -> Result<IndexMap<M::Output, M::Output>>
    where
        R: Read,
        M: AmqpMarshaller,
        M::Output: Hash + Eq,
    {
        check_even(count)?;
        let (buffers, consumed) = read_constituents(count, reader)?;
        check_consumed("Map", size, consumed)?;
        Self::decode(&buffers, marshaller)
    }
}

fn read_constituents<R: Read>(count: usize, reader: &mut R) -> Result<(Vec<EncodedBuffer>, usize)> {
    let mut buffers = Vec::new();
    let mut consumed = 0;
    for _ in 0..count {
        let buffer = EncodedBuffer::unmarshal(reader)?;
        consumed += buffer.encoded_size();
        buffers.push(buffer);
    }
    Ok((buffers, consumed))
}

fn check_even(count: usize) -> Result<()> {
    if count % 2 != 0 {
        return Err(AmqpCodecError::Encoding(format!(
            "Map must have an even number of constituents, got {}",
            count
        )));
    }
    Ok(())
}

fn check_consumed(kind: &str, size: usize, consumed: usize) -> Result<()> {
    if size != consumed {
        return Err(AmqpCodecError::Encoding(format!(
            "{} declares {} data bytes but its constituents use {}",
            kind, size, consumed
        )));
    }
    Ok(())
}
