use crate::*;

/// AMQP 1.0 format codes.
///
/// The format code is the first byte of every encoded value. Its high nibble selects the
/// [`FormatCategory`] and the width of any size/count header; the low nibble selects the type
/// within that category.
///
/// - Codes are part of the wire format and never change.
/// - All multi-byte fields that follow a code are big-endian.

///< Described type constructor: descriptor and value follow
pub const FORMAT_DESCRIBED: u8 = 0x00;
pub const FORMAT_NULL: u8 = 0x40;
pub const FORMAT_TRUE: u8 = 0x41;
pub const FORMAT_FALSE: u8 = 0x42;
///< The uint value 0, no data bytes
pub const FORMAT_UINT0: u8 = 0x43;
///< The ulong value 0, no data bytes
pub const FORMAT_ULONG0: u8 = 0x44;
///< The empty list, no data bytes
pub const FORMAT_LIST0: u8 = 0x45;
pub const FORMAT_UBYTE: u8 = 0x50;
pub const FORMAT_BYTE: u8 = 0x51;
pub const FORMAT_SMALLUINT: u8 = 0x52;
pub const FORMAT_SMALLULONG: u8 = 0x53;
pub const FORMAT_SMALLINT: u8 = 0x54;
pub const FORMAT_SMALLLONG: u8 = 0x55;
///< Boolean with a one byte body (0x00 false, 0x01 true)
pub const FORMAT_BOOLEAN: u8 = 0x56;
pub const FORMAT_USHORT: u8 = 0x60;
pub const FORMAT_SHORT: u8 = 0x61;
pub const FORMAT_UINT: u8 = 0x70;
pub const FORMAT_INT: u8 = 0x71;
pub const FORMAT_FLOAT: u8 = 0x72;
///< UTF-32BE code point
pub const FORMAT_CHAR: u8 = 0x73;
pub const FORMAT_DECIMAL32: u8 = 0x74;
pub const FORMAT_ULONG: u8 = 0x80;
pub const FORMAT_LONG: u8 = 0x81;
pub const FORMAT_DOUBLE: u8 = 0x82;
///< Milliseconds since the unix epoch, signed 64-bit
pub const FORMAT_TIMESTAMP: u8 = 0x83;
pub const FORMAT_DECIMAL64: u8 = 0x84;
pub const FORMAT_DECIMAL128: u8 = 0x94;
pub const FORMAT_UUID: u8 = 0x98;
pub const FORMAT_VBIN8: u8 = 0xa0;
pub const FORMAT_STR8_UTF8: u8 = 0xa1;
pub const FORMAT_SYM8: u8 = 0xa3;
pub const FORMAT_VBIN32: u8 = 0xb0;
pub const FORMAT_STR32_UTF8: u8 = 0xb1;
pub const FORMAT_SYM32: u8 = 0xb3;
pub const FORMAT_LIST8: u8 = 0xc0;
pub const FORMAT_MAP8: u8 = 0xc1;
pub const FORMAT_LIST32: u8 = 0xd0;
pub const FORMAT_MAP32: u8 = 0xd1;
pub const FORMAT_ARRAY8: u8 = 0xe0;
pub const FORMAT_ARRAY32: u8 = 0xf0;

/// Deepest nesting of described, compound and array values accepted when encoding or decoding.
///
/// The outermost value is at depth 0. Each descriptor, described value, list or map entry and
/// array element sits one level below its parent.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Largest element count accepted for an array whose elements have no body
/// (`null`, `true`, `false`, `uint0`, `ulong0`, `list0`, or one of these behind a descriptor).
///
/// Such elements occupy no bytes after the shared constructor, so the count field is the only
/// thing bounding them.
pub const MAX_EMPTY_ELEMENT_COUNT: usize = 64 * 1024;

/// Fails once `depth` is past [`MAX_NESTING_DEPTH`].
#[inline]
pub(crate) fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(AmqpCodecError::Encoding(format!(
            "Values nested deeper than {} levels",
            MAX_NESTING_DEPTH
        )));
    }
    Ok(())
}

/// The header shape of an encoded value, selected by the high nibble of its format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatCategory {
    /// `0x0_`: a descriptor followed by the described value.
    Described,
    /// `0x4_`..`0x9_`: a fixed number of data bytes.
    Fixed,
    /// `0xA_`, `0xB_`: a size field followed by that many bytes.
    Variable,
    /// `0xC_`, `0xD_`: size and count fields followed by self-describing constituents.
    Compound,
    /// `0xE_`, `0xF_`: size and count fields, one shared constructor, then element bodies.
    Array,
}

impl FormatCategory {
    /// Whether values of this category carry a size field after the format code.
    pub fn encodes_size(&self) -> bool {
        matches!(
            self,
            FormatCategory::Variable | FormatCategory::Compound | FormatCategory::Array
        )
    }

    /// Whether values of this category carry a count field after the size field.
    pub fn encodes_count(&self) -> bool {
        matches!(self, FormatCategory::Compound | FormatCategory::Array)
    }
}

/// A [`FormatCategory`] refined with its width.
///
/// For fixed codes the width is the number of data bytes. For variable, compound and array codes
/// it is the byte width of the size and count fields (1 or 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatSubCategory {
    Described,
    Fixed0,
    Fixed1,
    Fixed2,
    Fixed4,
    Fixed8,
    Fixed16,
    Variable1,
    Variable4,
    Compound1,
    Compound4,
    Array1,
    Array4,
}

/// Indexed by the high nibble of a format code. Nibbles 0x1..=0x3 are not assigned.
const SUB_CATEGORIES: [Option<FormatSubCategory>; 16] = [
    Some(FormatSubCategory::Described),
    None,
    None,
    None,
    Some(FormatSubCategory::Fixed0),
    Some(FormatSubCategory::Fixed1),
    Some(FormatSubCategory::Fixed2),
    Some(FormatSubCategory::Fixed4),
    Some(FormatSubCategory::Fixed8),
    Some(FormatSubCategory::Fixed16),
    Some(FormatSubCategory::Variable1),
    Some(FormatSubCategory::Variable4),
    Some(FormatSubCategory::Compound1),
    Some(FormatSubCategory::Compound4),
    Some(FormatSubCategory::Array1),
    Some(FormatSubCategory::Array4),
];

impl FormatSubCategory {
    /// Classifies a format code by table lookup on its high nibble.
    ///
    /// # Errors
    /// Returns `InvalidFormatCode` if the nibble has no assigned sub-category.
    #[inline]
    pub fn from_format_code(format_code: u8) -> Result<Self> {
        SUB_CATEGORIES[(format_code >> 4) as usize]
            .ok_or(AmqpCodecError::InvalidFormatCode(format_code))
    }

    pub fn category(&self) -> FormatCategory {
        match self {
            FormatSubCategory::Described => FormatCategory::Described,
            FormatSubCategory::Fixed0
            | FormatSubCategory::Fixed1
            | FormatSubCategory::Fixed2
            | FormatSubCategory::Fixed4
            | FormatSubCategory::Fixed8
            | FormatSubCategory::Fixed16 => FormatCategory::Fixed,
            FormatSubCategory::Variable1 | FormatSubCategory::Variable4 => {
                FormatCategory::Variable
            }
            FormatSubCategory::Compound1 | FormatSubCategory::Compound4 => {
                FormatCategory::Compound
            }
            FormatSubCategory::Array1 | FormatSubCategory::Array4 => FormatCategory::Array,
        }
    }

    /// The data width for fixed codes, the size/count field width otherwise.
    /// Described constructors have no width of their own.
    pub fn width(&self) -> usize {
        match self {
            FormatSubCategory::Described | FormatSubCategory::Fixed0 => 0,
            FormatSubCategory::Fixed1
            | FormatSubCategory::Variable1
            | FormatSubCategory::Compound1
            | FormatSubCategory::Array1 => 1,
            FormatSubCategory::Fixed2 => 2,
            FormatSubCategory::Fixed4
            | FormatSubCategory::Variable4
            | FormatSubCategory::Compound4
            | FormatSubCategory::Array4 => 4,
            FormatSubCategory::Fixed8 => 8,
            FormatSubCategory::Fixed16 => 16,
        }
    }

    /// Length of the header that follows the format code: the size field, plus the count field
    /// for compound and array codes.
    pub fn header_length(&self) -> usize {
        let category = self.category();
        let mut len = 0;
        if category.encodes_size() {
            len += self.width();
        }
        if category.encodes_count() {
            len += self.width();
        }
        len
    }
}

/// Returns the category of a format code.
///
/// # Errors
/// Returns `InvalidFormatCode` if the high nibble is not assigned.
#[inline]
pub fn get_category(format_code: u8) -> Result<FormatCategory> {
    FormatSubCategory::from_format_code(format_code).map(|sub| sub.category())
}

/// Reads an unsigned size or count field of the given width (1 or 4) from the start of `buf`.
///
/// One byte fields are read as unsigned (0..=255), four byte fields as big-endian `u32`.
#[inline]
pub fn read_width(buf: &[u8], width: usize) -> Result<usize> {
    if buf.len() < width {
        return Err(AmqpCodecError::InsufficientData);
    }
    match width {
        1 => Ok((0xff & buf[0]) as usize),
        4 => Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize),
        other => Err(AmqpCodecError::Encoding(format!(
            "Unsupported header width {}",
            other
        ))),
    }
}

/// Writes an unsigned size or count field of the given width (1 or 4).
///
/// # Errors
/// Returns `Length` if `value` does not fit the field.
#[inline]
pub fn write_width(writer: &mut BytesMut, value: usize, width: usize) -> Result<()> {
    match width {
        1 => {
            let v = u8::try_from(value).map_err(|_| AmqpCodecError::Length(value))?;
            writer.put_u8(v);
        }
        4 => {
            let v = u32::try_from(value).map_err(|_| AmqpCodecError::Length(value))?;
            writer.put_u32(v);
        }
        other => {
            return Err(AmqpCodecError::Encoding(format!(
                "Unsupported header width {}",
                other
            )))
        }
    }
    Ok(())
}
