use crate::*;

/// Declares a closed set of wire representations for one logical type.
///
/// Each variant maps to exactly one format code. `from_format_code` is the inverse and rejects
/// codes belonging to other types.
macro_rules! wire_encoding {
    ($(#[$meta:meta])* $name:ident, $expected:literal, { $($(#[$vmeta:meta])* $variant:ident => $code:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// The format code written for this encoding.
            pub fn format_code(&self) -> u8 {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            /// Maps a format code back to an encoding of this type.
            ///
            /// # Errors
            /// Returns `UnexpectedType` if the code encodes some other type.
            pub fn from_format_code(code: u8) -> Result<Self> {
                match code {
                    $(c if c == $code => Ok($name::$variant),)+
                    other => Err(AmqpCodecError::unexpected($expected, other)),
                }
            }
        }
    };
}

wire_encoding!(
    /// A boolean is written as a bare format code; the 0x56 form only appears inside arrays.
    BooleanEncoding, "boolean", {
        True => FORMAT_TRUE,
        False => FORMAT_FALSE,
        Boolean => FORMAT_BOOLEAN,
    }
);

wire_encoding!(BinaryEncoding, "binary", {
    Vbin8 => FORMAT_VBIN8,
    Vbin32 => FORMAT_VBIN32,
});

wire_encoding!(StringEncoding, "string", {
    Str8Utf8 => FORMAT_STR8_UTF8,
    Str32Utf8 => FORMAT_STR32_UTF8,
});

wire_encoding!(SymbolEncoding, "symbol", {
    Sym8 => FORMAT_SYM8,
    Sym32 => FORMAT_SYM32,
});

wire_encoding!(
    /// List encodings, including the array forms a homogeneous list may use.
    ListEncoding, "list", {
        List8 => FORMAT_LIST8,
        List32 => FORMAT_LIST32,
        Array8 => FORMAT_ARRAY8,
        Array32 => FORMAT_ARRAY32,
        /// Decode only
        List0 => FORMAT_LIST0,
    }
);

wire_encoding!(MapEncoding, "map", {
    Map8 => FORMAT_MAP8,
    Map32 => FORMAT_MAP32,
});

wire_encoding!(UintEncoding, "uint", {
    Uint => FORMAT_UINT,
    Smalluint => FORMAT_SMALLUINT,
    /// Decode only
    Uint0 => FORMAT_UINT0,
});

wire_encoding!(UlongEncoding, "ulong", {
    Ulong => FORMAT_ULONG,
    Smallulong => FORMAT_SMALLULONG,
    /// Decode only
    Ulong0 => FORMAT_ULONG0,
});

wire_encoding!(LongEncoding, "long", {
    Long => FORMAT_LONG,
    Smalllong => FORMAT_SMALLLONG,
});

wire_encoding!(IntEncoding, "int", {
    Int => FORMAT_INT,
    Smallint => FORMAT_SMALLINT,
});

impl ListEncoding {
    pub fn is_array(&self) -> bool {
        matches!(self, ListEncoding::Array8 | ListEncoding::Array32)
    }

    /// Width of the size and count fields.
    pub fn width(&self) -> usize {
        match self {
            ListEncoding::List8 | ListEncoding::Array8 => 1,
            ListEncoding::List32 | ListEncoding::Array32 => 4,
            ListEncoding::List0 => 0,
        }
    }
}

impl MapEncoding {
    /// Width of the size and count fields.
    pub fn width(&self) -> usize {
        match self {
            MapEncoding::Map8 => 1,
            MapEncoding::Map32 => 4,
        }
    }
}

impl BinaryEncoding {
    pub fn width(&self) -> usize {
        match self {
            BinaryEncoding::Vbin8 => 1,
            BinaryEncoding::Vbin32 => 4,
        }
    }
}

impl StringEncoding {
    pub fn width(&self) -> usize {
        match self {
            StringEncoding::Str8Utf8 => 1,
            StringEncoding::Str32Utf8 => 4,
        }
    }
}

impl SymbolEncoding {
    pub fn width(&self) -> usize {
        match self {
            SymbolEncoding::Sym8 => 1,
            SymbolEncoding::Sym32 => 4,
        }
    }
}

/// The constructor written in front of a value's data.
///
/// Standalone values have their own constructor; the elements of an array share the array's
/// single constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constructor {
    /// A single format code.
    Primitive(u8),
    /// `0x00`, the complete encoding of the descriptor, then the constructor of the value.
    Described {
        descriptor: Bytes,
        inner: Box<Constructor>,
    },
}

impl Constructor {
    /// The format code that determines how the data following this constructor is laid out.
    pub fn format_code(&self) -> u8 {
        match self {
            Constructor::Primitive(code) => *code,
            Constructor::Described { inner, .. } => inner.format_code(),
        }
    }

    /// Number of bytes this constructor occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match self {
            Constructor::Primitive(_) => 1,
            Constructor::Described { descriptor, inner } => {
                1 + descriptor.len() + inner.encoded_len()
            }
        }
    }

    pub fn encode(&self, writer: &mut BytesMut) {
        match self {
            Constructor::Primitive(code) => writer.put_u8(*code),
            Constructor::Described { descriptor, inner } => {
                writer.put_u8(FORMAT_DESCRIBED);
                writer.put_slice(descriptor);
                inner.encode(writer);
            }
        }
    }

    /// Reads a constructor from the front of `buf`.
    ///
    /// Returns the constructor and the number of bytes it occupies.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        Self::decode_nested(buf, 0)
    }

    /// Reads a constructor for a value at `depth`; a described constructor puts its descriptor
    /// and its inner constructor one level deeper.
    pub(crate) fn decode_nested(buf: &[u8], depth: usize) -> Result<(Self, usize)> {
        check_depth(depth)?;
        let code = *buf.first().ok_or(AmqpCodecError::InsufficientData)?;
        if code != FORMAT_DESCRIBED {
            FormatSubCategory::from_format_code(code)?;
            return Ok((Constructor::Primitive(code), 1));
        }
        let source = Bytes::copy_from_slice(&buf[1..]);
        let descriptor = EncodedBuffer::from_bytes_nested(&source, 0, depth + 1)?;
        let descriptor_len = descriptor.encoded_size();
        let (inner, inner_len) = Constructor::decode_nested(&buf[1 + descriptor_len..], depth + 1)?;
        Ok((
            Constructor::Described {
                descriptor: descriptor.as_bytes().clone(),
                inner: Box::new(inner),
            },
            1 + descriptor_len + inner_len,
        ))
    }
}
