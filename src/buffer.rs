//! Encoded AMQP values held as immutable byte buffers.
//!
//! An [`EncodedBuffer`] owns the complete encoding of one value, starting with its format code.
//! It is built in one of three ways and never changes afterwards:
//!
//! - [`EncodedBuffer::from_encoded`] serializes a typed value for the first time,
//! - [`EncodedBuffer::unmarshal`] reads one value from a stream,
//! - [`EncodedBuffer::from_bytes`] / [`EncodedBuffer::from_bytes_after_code`] slice one value out
//!   of a buffer already in memory.
//!
//! Compound and array buffers split their payload into constituents when they are built.

use crate::*;
use std::io::{Read, Write};
use tracing::trace;

/// Upper bound for the initial allocation while reading a declared size from a stream.
const MAX_PREALLOCATION: usize = 64 * 1024;

/// An encoded value, classified by the category of its format code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedBuffer {
    Described(DescribedBuffer),
    Fixed(FixedBuffer),
    Variable(VariableBuffer),
    Compound(CompoundBuffer),
    Array(ArrayBuffer),
}

/// A value with a fixed number of data bytes (0, 1, 2, 4, 8 or 16).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedBuffer {
    bytes: Bytes,
    sub_category: FormatSubCategory,
}

/// A size-prefixed value: binary, string or symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableBuffer {
    bytes: Bytes,
    sub_category: FormatSubCategory,
    data_size: usize,
}

/// A size- and count-prefixed sequence of self-describing constituents: a list or a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundBuffer {
    bytes: Bytes,
    sub_category: FormatSubCategory,
    data_size: usize,
    data_count: usize,
    constituents: Vec<EncodedBuffer>,
}

/// A size- and count-prefixed sequence of element bodies sharing one element constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayBuffer {
    bytes: Bytes,
    sub_category: FormatSubCategory,
    data_size: usize,
    data_count: usize,
    element_constructor: Constructor,
    constituents: Vec<EncodedBuffer>,
}

/// A descriptor followed by the described value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribedBuffer {
    bytes: Bytes,
    descriptor: Box<EncodedBuffer>,
    described: Box<EncodedBuffer>,
}

impl EncodedBuffer {
    /// Serializes `value` with the narrowest encoding the encoder selects for it.
    pub fn from_encoded(value: &AmqpValue, encoder: &Encoder) -> Result<Self> {
        let constructor = encoder.constructor(value)?;
        Self::from_encoded_with(value, &constructor, encoder)
    }

    /// Serializes `value` under a given constructor, e.g. the shared constructor of an array.
    pub fn from_encoded_with(
        value: &AmqpValue,
        constructor: &Constructor,
        encoder: &Encoder,
    ) -> Result<Self> {
        match constructor {
            Constructor::Described { .. } => {
                DescribedBuffer::from_encoded(value, constructor, encoder).map(Self::Described)
            }
            Constructor::Primitive(code) => {
                match FormatSubCategory::from_format_code(*code)?.category() {
                    FormatCategory::Compound => {
                        CompoundBuffer::from_encoded(value, *code, encoder).map(Self::Compound)
                    }
                    FormatCategory::Array => {
                        ArrayBuffer::from_encoded(value, *code, encoder).map(Self::Array)
                    }
                    FormatCategory::Fixed | FormatCategory::Variable => {
                        let mut writer =
                            BytesMut::with_capacity(encoder.encoded_size_with(value, constructor)?);
                        constructor.encode(&mut writer);
                        encoder.encode_body(value, constructor, &mut writer)?;
                        Self::from_bytes(&writer.freeze(), 0)
                    }
                    FormatCategory::Described => Err(AmqpCodecError::encoding(
                        "A described constructor needs a descriptor",
                    )),
                }
            }
        }
    }

    /// Reads exactly one encoded value from a stream.
    ///
    /// # Errors
    /// A stream that ends inside the value yields `Io` with `UnexpectedEof`.
    pub fn unmarshal<R: Read>(reader: &mut R) -> Result<Self> {
        Self::unmarshal_nested(reader, 0)
    }

    fn unmarshal_nested<R: Read>(reader: &mut R, depth: usize) -> Result<Self> {
        let mut code = [0u8; 1];
        reader.read_exact(&mut code)?;
        Self::unmarshal_after_code_nested(code[0], reader, depth)
    }

    /// Reads the remainder of an encoded value whose format code the caller already consumed.
    ///
    /// # Errors
    /// Values nested deeper than [`MAX_NESTING_DEPTH`] are rejected with `Encoding`.
    pub fn unmarshal_after_code<R: Read>(format_code: u8, reader: &mut R) -> Result<Self> {
        Self::unmarshal_after_code_nested(format_code, reader, 0)
    }

    fn unmarshal_after_code_nested<R: Read>(
        format_code: u8,
        reader: &mut R,
        depth: usize,
    ) -> Result<Self> {
        check_depth(depth)?;
        let sub_category = FormatSubCategory::from_format_code(format_code)?;
        match sub_category.category() {
            FormatCategory::Described => {
                let descriptor = Self::unmarshal_nested(reader, depth + 1)?;
                let described = Self::unmarshal_nested(reader, depth + 1)?;
                Ok(Self::Described(DescribedBuffer::new(descriptor, described)))
            }
            FormatCategory::Fixed => {
                let mut bytes = vec![0u8; 1 + sub_category.width()];
                bytes[0] = format_code;
                reader.read_exact(&mut bytes[1..])?;
                Ok(Self::Fixed(FixedBuffer::new(Bytes::from(bytes), sub_category)))
            }
            FormatCategory::Variable | FormatCategory::Compound | FormatCategory::Array => {
                let width = sub_category.width();
                let mut header = [0u8; 4];
                reader.read_exact(&mut header[..width])?;
                let size = read_width(&header, width)?;
                trace!(format_code, size, "unmarshalling sized value");

                let mut bytes = Vec::with_capacity(1 + width + size.min(MAX_PREALLOCATION));
                bytes.push(format_code);
                bytes.extend_from_slice(&header[..width]);
                let read = reader.by_ref().take(size as u64).read_to_end(&mut bytes)?;
                if read != size {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("Expected {} bytes of data, stream ended after {}", size, read),
                    )
                    .into());
                }
                Self::from_bytes_nested(&Bytes::from(bytes), 0, depth)
            }
        }
    }

    /// Slices the value starting at `offset` (its format code) out of `source`.
    ///
    /// The returned buffer shares memory with `source`.
    ///
    /// # Errors
    /// Returns `InsufficientData` if `source` ends inside the value, and `Encoding` for values
    /// nested deeper than [`MAX_NESTING_DEPTH`].
    pub fn from_bytes(source: &Bytes, offset: usize) -> Result<Self> {
        Self::from_bytes_nested(source, offset, 0)
    }

    pub(crate) fn from_bytes_nested(source: &Bytes, offset: usize, depth: usize) -> Result<Self> {
        check_depth(depth)?;
        let format_code = *source
            .get(offset)
            .ok_or(AmqpCodecError::InsufficientData)?;
        let sub_category = FormatSubCategory::from_format_code(format_code)?;
        let width = sub_category.width();
        match sub_category.category() {
            FormatCategory::Described => {
                let descriptor = Self::from_bytes_nested(source, offset + 1, depth + 1)?;
                let described = Self::from_bytes_nested(
                    source,
                    offset + 1 + descriptor.encoded_size(),
                    depth + 1,
                )?;
                let end = offset + 1 + descriptor.encoded_size() + described.encoded_size();
                Ok(Self::Described(DescribedBuffer {
                    bytes: source.slice(offset..end),
                    descriptor: Box::new(descriptor),
                    described: Box::new(described),
                }))
            }
            FormatCategory::Fixed => {
                let bytes = slice_checked(source, offset, 1 + width)?;
                Ok(Self::Fixed(FixedBuffer::new(bytes, sub_category)))
            }
            FormatCategory::Variable => {
                let size = read_width(source.get(offset + 1..).unwrap_or_default(), width)?;
                let bytes = slice_checked(source, offset, 1 + width + size)?;
                Ok(Self::Variable(VariableBuffer {
                    bytes,
                    sub_category,
                    data_size: size,
                }))
            }
            FormatCategory::Compound => {
                let size = read_width(source.get(offset + 1..).unwrap_or_default(), width)?;
                let bytes = slice_checked(source, offset, 1 + width + size)?;
                CompoundBuffer::parse(bytes, sub_category, depth).map(Self::Compound)
            }
            FormatCategory::Array => {
                let size = read_width(source.get(offset + 1..).unwrap_or_default(), width)?;
                let bytes = slice_checked(source, offset, 1 + width + size)?;
                ArrayBuffer::parse(bytes, sub_category, depth).map(Self::Array)
            }
        }
    }

    /// Slices a value whose format code was already consumed by the caller; `offset` points at
    /// the first byte after the code.
    ///
    /// When the code immediately precedes `offset` in `source` the value is sliced in place,
    /// otherwise (e.g. for array elements, which share one constructor) the code and the
    /// remaining bytes are copied into a fresh buffer.
    pub fn from_bytes_after_code(format_code: u8, source: &Bytes, offset: usize) -> Result<Self> {
        if offset > source.len() {
            return Err(AmqpCodecError::InsufficientData);
        }
        if offset >= 1 && source[offset - 1] == format_code {
            return Self::from_bytes(source, offset - 1);
        }
        let mut joined = BytesMut::with_capacity(1 + source.len() - offset);
        joined.put_u8(format_code);
        joined.put_slice(&source[offset..]);
        let joined = joined.freeze();
        let buffer = Self::from_bytes(&joined, 0)?;
        // keep only the bytes of this value, not the copied tail
        Self::from_bytes(&Bytes::copy_from_slice(buffer.as_bytes()), 0)
    }

    /// The complete encoding, starting with the format code.
    pub fn as_bytes(&self) -> &Bytes {
        match self {
            EncodedBuffer::Described(b) => &b.bytes,
            EncodedBuffer::Fixed(b) => &b.bytes,
            EncodedBuffer::Variable(b) => &b.bytes,
            EncodedBuffer::Compound(b) => &b.bytes,
            EncodedBuffer::Array(b) => &b.bytes,
        }
    }

    pub fn format_code(&self) -> u8 {
        self.as_bytes()[0]
    }

    /// The sub-category of the value's own format code. For described values this is
    /// [`FormatSubCategory::Described`].
    pub fn sub_category(&self) -> FormatSubCategory {
        match self {
            EncodedBuffer::Described(_) => FormatSubCategory::Described,
            EncodedBuffer::Fixed(b) => b.sub_category,
            EncodedBuffer::Variable(b) => b.sub_category,
            EncodedBuffer::Compound(b) => b.sub_category,
            EncodedBuffer::Array(b) => b.sub_category,
        }
    }

    pub fn category(&self) -> FormatCategory {
        self.sub_category().category()
    }

    /// Total number of bytes, including the format code.
    pub fn encoded_size(&self) -> usize {
        self.as_bytes().len()
    }

    /// Bytes taken by the constructor: the format code, or for described values the `0x00`
    /// code, the descriptor and the constructor of the described value.
    pub fn constructor_length(&self) -> usize {
        match self {
            EncodedBuffer::Described(b) => {
                1 + b.descriptor.encoded_size() + b.described.constructor_length()
            }
            _ => 1,
        }
    }

    /// Offset of the payload from the start of the encoding, past any size and count fields.
    pub fn data_offset(&self) -> usize {
        match self {
            EncodedBuffer::Described(b) => 1 + b.descriptor.encoded_size() + b.described.data_offset(),
            other => 1 + other.sub_category().header_length(),
        }
    }

    /// Payload length: the fixed width, the declared size of a variable value, or the bytes
    /// following the count field of a compound or array value.
    pub fn data_size(&self) -> usize {
        match self {
            EncodedBuffer::Described(b) => b.described.data_size(),
            EncodedBuffer::Fixed(b) => b.sub_category.width(),
            EncodedBuffer::Variable(b) => b.data_size,
            EncodedBuffer::Compound(b) => b.data_size,
            EncodedBuffer::Array(b) => b.data_size,
        }
    }

    /// Number of constituents of a compound or array value.
    ///
    /// # Errors
    /// Fixed and variable values carry no count.
    pub fn data_count(&self) -> Result<usize> {
        match self {
            EncodedBuffer::Described(b) => b.described.data_count(),
            EncodedBuffer::Compound(b) => Ok(b.data_count),
            EncodedBuffer::Array(b) => Ok(b.data_count),
            other => Err(AmqpCodecError::Encoding(format!(
                "Format code 0x{:02x} does not encode a count",
                other.format_code()
            ))),
        }
    }

    /// The payload bytes, past the constructor and any size and count fields.
    pub fn data(&self) -> Bytes {
        self.as_bytes().slice(self.data_offset()..)
    }

    /// The decoded constituents of a compound or array value.
    pub fn constituents(&self) -> Result<&[EncodedBuffer]> {
        match self {
            EncodedBuffer::Compound(b) => Ok(b.constituents()),
            EncodedBuffer::Array(b) => Ok(b.constituents()),
            other => Err(AmqpCodecError::Encoding(format!(
                "Format code 0x{:02x} has no constituents",
                other.format_code()
            ))),
        }
    }

    /// Writes the complete encoding. Returns the number of bytes written.
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<usize> {
        writer.write_all(self.as_bytes())?;
        Ok(self.encoded_size())
    }

    /// Writes only the constructor.
    pub fn marshal_constructor<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let len = self.constructor_length();
        writer.write_all(&self.as_bytes()[..len])?;
        Ok(len)
    }

    /// Writes everything after the constructor; this is the element body inside an array.
    pub fn marshal_data<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let bytes = &self.as_bytes()[self.constructor_length()..];
        writer.write_all(bytes)?;
        Ok(bytes.len())
    }

    pub fn is_described(&self) -> bool {
        matches!(self, EncodedBuffer::Described(_))
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, EncodedBuffer::Fixed(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, EncodedBuffer::Variable(_))
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, EncodedBuffer::Compound(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, EncodedBuffer::Array(_))
    }

    pub fn as_described(&self) -> Result<&DescribedBuffer> {
        match self {
            EncodedBuffer::Described(b) => Ok(b),
            other => Err(other.narrowing_error("described")),
        }
    }

    pub fn as_fixed(&self) -> Result<&FixedBuffer> {
        match self {
            EncodedBuffer::Fixed(b) => Ok(b),
            other => Err(other.narrowing_error("fixed")),
        }
    }

    pub fn as_variable(&self) -> Result<&VariableBuffer> {
        match self {
            EncodedBuffer::Variable(b) => Ok(b),
            other => Err(other.narrowing_error("variable")),
        }
    }

    pub fn as_compound(&self) -> Result<&CompoundBuffer> {
        match self {
            EncodedBuffer::Compound(b) => Ok(b),
            other => Err(other.narrowing_error("compound")),
        }
    }

    pub fn as_array(&self) -> Result<&ArrayBuffer> {
        match self {
            EncodedBuffer::Array(b) => Ok(b),
            other => Err(other.narrowing_error("array")),
        }
    }

    fn narrowing_error(&self, wanted: &str) -> AmqpCodecError {
        AmqpCodecError::Encoding(format!(
            "Format code 0x{:02x} is not a {} encoding",
            self.format_code(),
            wanted
        ))
    }
}

/// Returns `len` bytes of `source` starting at `offset`, sharing its memory.
#[inline]
fn slice_checked(source: &Bytes, offset: usize, len: usize) -> Result<Bytes> {
    let end = offset
        .checked_add(len)
        .ok_or(AmqpCodecError::InsufficientData)?;
    if end > source.len() {
        return Err(AmqpCodecError::InsufficientData);
    }
    Ok(source.slice(offset..end))
}

/// Computes the size and count fields of a compound or array header.
///
/// Returns `(data_size, data_count)` where the data size excludes the count field.
fn parse_header(bytes: &[u8], width: usize) -> Result<(usize, usize)> {
    let size = read_width(&bytes[1..], width)?;
    if size < width {
        return Err(AmqpCodecError::Encoding(format!(
            "Size {} cannot hold a {} byte count field",
            size, width
        )));
    }
    let count = read_width(&bytes[1 + width..], width)?;
    Ok((size - width, count))
}

impl FixedBuffer {
    fn new(bytes: Bytes, sub_category: FormatSubCategory) -> Self {
        FixedBuffer {
            bytes,
            sub_category,
        }
    }

    pub fn format_code(&self) -> u8 {
        self.bytes[0]
    }

    /// The data bytes following the format code.
    pub fn data(&self) -> &[u8] {
        &self.bytes[1..]
    }
}

impl VariableBuffer {
    pub fn format_code(&self) -> u8 {
        self.bytes[0]
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// The payload following the size field.
    pub fn data(&self) -> Bytes {
        self.bytes.slice(1 + self.sub_category.width()..)
    }
}

impl CompoundBuffer {
    /// Builds a compound buffer for a list or map value.
    ///
    /// The size and count are computed first, the header is written at the width of the format
    /// code, and the encoder fills in the payload.
    pub fn from_encoded(value: &AmqpValue, format_code: u8, encoder: &Encoder) -> Result<Self> {
        let sub_category = FormatSubCategory::from_format_code(format_code)?;
        let width = sub_category.width();
        let data_size = encoder.compute_data_size(value, format_code)?;
        let data_count = encoder.compute_data_count(value, format_code)?;

        let mut writer = BytesMut::with_capacity(1 + 2 * width + data_size);
        writer.put_u8(format_code);
        write_width(&mut writer, width + data_size, width)?;
        write_width(&mut writer, data_count, width)?;
        let written = match (format_code, value) {
            (FORMAT_LIST8 | FORMAT_LIST32, AmqpValue::List(list)) => {
                encoder.encode_list(list, &mut writer)?
            }
            (FORMAT_MAP8 | FORMAT_MAP32, AmqpValue::Map(map)) => {
                encoder.encode_map(map, &mut writer)?
            }
            (code, other) => {
                return Err(AmqpCodecError::Encoding(format!(
                    "Cannot encode {} as compound format code 0x{:02x}",
                    other.type_name(),
                    code
                )))
            }
        };
        debug_assert_eq!(written, data_size);
        Self::parse(writer.freeze(), sub_category, 0)
    }

    /// Parses a complete compound encoding at `depth`; `bytes` must span exactly one value.
    fn parse(bytes: Bytes, sub_category: FormatSubCategory, depth: usize) -> Result<Self> {
        let width = sub_category.width();
        let (data_size, data_count) = parse_header(&bytes, width)?;
        let data_offset = 1 + 2 * width;

        let mut constituents = Vec::with_capacity(data_count.min(bytes.len()));
        let mut offset = data_offset;
        for _ in 0..data_count {
            if offset >= bytes.len() {
                return Err(AmqpCodecError::Encoding(format!(
                    "Compound declares {} constituents but its data ends after {}",
                    data_count,
                    constituents.len()
                )));
            }
            let constituent = EncodedBuffer::from_bytes_nested(&bytes, offset, depth + 1)?;
            offset += constituent.encoded_size();
            constituents.push(constituent);
        }
        if offset != data_offset + data_size {
            return Err(AmqpCodecError::Encoding(format!(
                "Compound declares {} data bytes but its constituents use {}",
                data_size,
                offset - data_offset
            )));
        }
        trace!(
            format_code = bytes[0],
            data_size,
            data_count,
            "parsed compound buffer"
        );
        Ok(CompoundBuffer {
            bytes,
            sub_category,
            data_size,
            data_count,
            constituents,
        })
    }

    pub fn format_code(&self) -> u8 {
        self.bytes[0]
    }

    pub fn width(&self) -> usize {
        self.sub_category.width()
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn data_count(&self) -> usize {
        self.data_count
    }

    pub fn constituents(&self) -> &[EncodedBuffer] {
        &self.constituents
    }

    pub fn is_map(&self) -> bool {
        matches!(self.format_code(), FORMAT_MAP8 | FORMAT_MAP32)
    }
}

impl ArrayBuffer {
    /// Builds an array buffer for a list value whose elements share one constructor.
    pub fn from_encoded(value: &AmqpValue, format_code: u8, encoder: &Encoder) -> Result<Self> {
        let list = match value {
            AmqpValue::List(list) => list,
            other => {
                return Err(AmqpCodecError::Encoding(format!(
                    "Cannot encode {} as an array",
                    other.type_name()
                )))
            }
        };
        let sub_category = FormatSubCategory::from_format_code(format_code)?;
        let width = sub_category.width();
        let constructor = encoder.array_constructor(list)?;
        let data_size = encoder.compute_data_size(value, format_code)?;

        let mut writer = BytesMut::with_capacity(1 + 2 * width + data_size);
        writer.put_u8(format_code);
        write_width(&mut writer, width + data_size, width)?;
        write_width(&mut writer, list.len(), width)?;
        let written = encoder.encode_array(list, &constructor, &mut writer)?;
        debug_assert_eq!(written, data_size);
        Self::parse(writer.freeze(), sub_category, 0)
    }

    /// Parses a complete array encoding at `depth`; `bytes` must span exactly one value.
    ///
    /// Each element body is re-joined with the shared constructor so that every constituent is
    /// a standalone, self-describing buffer.
    ///
    /// # Errors
    /// The count must fit the data: one byte or more per element, or at most
    /// [`MAX_EMPTY_ELEMENT_COUNT`] elements when the shared constructor leaves no body.
    fn parse(bytes: Bytes, sub_category: FormatSubCategory, depth: usize) -> Result<Self> {
        let width = sub_category.width();
        let (data_size, data_count) = parse_header(&bytes, width)?;
        let data_offset = 1 + 2 * width;
        let end = data_offset + data_size;

        let (element_constructor, constructor_len) =
            Constructor::decode_nested(&bytes[data_offset..end], depth + 1)?;
        let element_sub_category =
            FormatSubCategory::from_format_code(element_constructor.format_code())?;
        let body_bytes = data_size - constructor_len;
        let empty_bodies = element_sub_category.category() == FormatCategory::Fixed
            && element_sub_category.width() == 0;
        if empty_bodies && data_count > MAX_EMPTY_ELEMENT_COUNT {
            return Err(AmqpCodecError::Encoding(format!(
                "Array declares {} elements without a body, more than the limit of {}",
                data_count, MAX_EMPTY_ELEMENT_COUNT
            )));
        }
        if !empty_bodies && data_count > body_bytes {
            return Err(AmqpCodecError::Encoding(format!(
                "Array declares {} elements but holds only {} bytes of element data",
                data_count, body_bytes
            )));
        }

        let mut constituents = Vec::with_capacity(data_count.min(bytes.len()));
        let mut offset = data_offset + constructor_len;
        for _ in 0..data_count {
            let body_len = element_body_len(&bytes[offset..end], element_sub_category)?;
            let mut element =
                BytesMut::with_capacity(element_constructor.encoded_len() + body_len);
            element_constructor.encode(&mut element);
            element.put_slice(&bytes[offset..offset + body_len]);
            constituents.push(EncodedBuffer::from_bytes_nested(&element.freeze(), 0, depth + 1)?);
            offset += body_len;
        }
        if offset != end {
            return Err(AmqpCodecError::Encoding(format!(
                "Array declares {} data bytes but its elements use {}",
                data_size,
                offset - data_offset
            )));
        }
        trace!(
            format_code = bytes[0],
            element_format_code = element_constructor.format_code(),
            data_count,
            "parsed array buffer"
        );
        Ok(ArrayBuffer {
            bytes,
            sub_category,
            data_size,
            data_count,
            element_constructor,
            constituents,
        })
    }

    pub fn format_code(&self) -> u8 {
        self.bytes[0]
    }

    pub fn width(&self) -> usize {
        self.sub_category.width()
    }

    /// Bytes following the count field: the element constructor and all element bodies.
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn data_count(&self) -> usize {
        self.data_count
    }

    /// The constructor shared by all elements.
    pub fn element_constructor(&self) -> &Constructor {
        &self.element_constructor
    }

    pub fn element_constructor_length(&self) -> usize {
        self.element_constructor.encoded_len()
    }

    /// The elements, each materialized with the shared constructor in front.
    pub fn constituents(&self) -> &[EncodedBuffer] {
        &self.constituents
    }
}

/// Length of one element body inside an array, given the category of the shared constructor.
fn element_body_len(buf: &[u8], sub_category: FormatSubCategory) -> Result<usize> {
    let width = sub_category.width();
    let len = match sub_category.category() {
        FormatCategory::Fixed => width,
        FormatCategory::Variable | FormatCategory::Compound | FormatCategory::Array => {
            width + read_width(buf, width)?
        }
        FormatCategory::Described => {
            return Err(AmqpCodecError::encoding(
                "Array element constructor ends in a described code",
            ))
        }
    };
    if len > buf.len() {
        return Err(AmqpCodecError::InsufficientData);
    }
    Ok(len)
}

impl DescribedBuffer {
    fn new(descriptor: EncodedBuffer, described: EncodedBuffer) -> Self {
        let mut bytes =
            BytesMut::with_capacity(1 + descriptor.encoded_size() + described.encoded_size());
        bytes.put_u8(FORMAT_DESCRIBED);
        bytes.put_slice(descriptor.as_bytes());
        bytes.put_slice(described.as_bytes());
        DescribedBuffer {
            bytes: bytes.freeze(),
            descriptor: Box::new(descriptor),
            described: Box::new(described),
        }
    }

    /// Builds a described buffer under a described constructor: the descriptor comes from the
    /// constructor, the value is encoded under the inner constructor.
    pub fn from_encoded(
        value: &AmqpValue,
        constructor: &Constructor,
        encoder: &Encoder,
    ) -> Result<Self> {
        let (descriptor, inner) = match constructor {
            Constructor::Described { descriptor, inner } => (descriptor, inner),
            Constructor::Primitive(code) => {
                return Err(AmqpCodecError::Encoding(format!(
                    "Format code 0x{:02x} is not a described constructor",
                    code
                )))
            }
        };
        let described = match value {
            AmqpValue::Described(d) => &d.value,
            other => {
                return Err(AmqpCodecError::Encoding(format!(
                    "Cannot encode {} under a described constructor",
                    other.type_name()
                )))
            }
        };
        let descriptor = EncodedBuffer::from_bytes(descriptor, 0)?;
        let described = EncodedBuffer::from_encoded_with(described, inner, encoder)?;
        Ok(Self::new(descriptor, described))
    }

    pub fn descriptor(&self) -> &EncodedBuffer {
        &self.descriptor
    }

    pub fn described(&self) -> &EncodedBuffer {
        &self.described
    }
}
