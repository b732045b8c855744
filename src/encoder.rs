//! Encoding selection, sizing and serialization.
//!
//! The [`Encoder`] picks the narrowest wire encoding for each value, computes exact encoded sizes,
//! and writes values either into a pre-sized [`BytesMut`] (`encode_*`) or to a
//! [`std::io::Write`] stream (`write_*`).

use crate::*;
use std::io::Write;
use tracing::trace;

/// Largest payload of an 8-bit variable-width value (`vbin8`, `str8-utf8`, `sym8`).
const MAX_VARIABLE8_SIZE: usize = 255;
/// Largest payload of an 8-bit compound or array value: the size field also covers the count byte.
const MAX_COMPOUND8_DATA_SIZE: usize = 254;
/// Largest count an 8-bit count field can hold.
const MAX_COMPOUND8_COUNT: usize = 255;
/// Largest value written with `smalluint` / `smallulong`.
const MAX_SMALL_UNSIGNED: u64 = 255;
/// Largest value written with `smallint` / `smalllong`; their body is a signed byte.
const MAX_SMALL_SIGNED: i64 = 127;

/// Switches that alter encoding choices. Both default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Allow `list8` / `array8` for small lists. When false every list uses the 32-bit width.
    pub use_8bit_list_encodings: bool,
    /// Never use the array encoding for lists, even when all elements share one type.
    pub no_array_encoding: bool,
}

impl EncoderConfig {
    pub const USE_8BIT_LIST_ENCODINGS_ENV: &'static str = "AMQP_CODEC_USE_8BIT_LIST_ENCODINGS";
    pub const NO_ARRAY_ENCODING_ENV: &'static str = "AMQP_CODEC_NO_ARRAY_ENCODING";

    /// Reads both switches from the environment. `true`, `1` and `yes` (any case) enable a
    /// switch; anything else, or an unset variable, leaves it off.
    pub fn from_env() -> Self {
        EncoderConfig {
            use_8bit_list_encodings: env_flag(Self::USE_8BIT_LIST_ENCODINGS_ENV),
            no_array_encoding: env_flag(Self::NO_ARRAY_ENCODING_ENV),
        }
    }

    pub fn with_8bit_list_encodings(mut self, enabled: bool) -> Self {
        self.use_8bit_list_encodings = enabled;
        self
    }

    pub fn with_array_encoding(mut self, enabled: bool) -> Self {
        self.no_array_encoding = !enabled;
        self
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Chooses encodings for values and serializes them.
///
/// The encoder holds no state besides its configuration; one instance can be shared freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    config: EncoderConfig,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Self {
        Encoder { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    // --- width selection ---

    pub fn choose_boolean_encoding(value: bool) -> BooleanEncoding {
        if value {
            BooleanEncoding::True
        } else {
            BooleanEncoding::False
        }
    }

    pub fn choose_binary_encoding(value: &[u8]) -> BinaryEncoding {
        if value.len() > MAX_VARIABLE8_SIZE {
            BinaryEncoding::Vbin32
        } else {
            BinaryEncoding::Vbin8
        }
    }

    /// Chooses by UTF-8 byte length, which is never smaller than the character count.
    pub fn choose_string_encoding(value: &str) -> StringEncoding {
        if value.len() > MAX_VARIABLE8_SIZE {
            StringEncoding::Str32Utf8
        } else {
            StringEncoding::Str8Utf8
        }
    }

    /// # Errors
    /// Symbols are ASCII on the wire; any other character is an encoding error.
    pub fn choose_symbol_encoding(value: &Symbol) -> Result<SymbolEncoding> {
        check_ascii(value)?;
        if value.as_str().len() > MAX_VARIABLE8_SIZE {
            Ok(SymbolEncoding::Sym32)
        } else {
            Ok(SymbolEncoding::Sym8)
        }
    }

    pub fn choose_uint_encoding(value: u32) -> UintEncoding {
        if u64::from(value) <= MAX_SMALL_UNSIGNED {
            UintEncoding::Smalluint
        } else {
            UintEncoding::Uint
        }
    }

    pub fn choose_ulong_encoding(value: u64) -> UlongEncoding {
        if value <= MAX_SMALL_UNSIGNED {
            UlongEncoding::Smallulong
        } else {
            UlongEncoding::Ulong
        }
    }

    /// Compact for 0..=127. Negative values take the full width; 128..=255 does too, because the
    /// `smallint` body is a signed byte.
    pub fn choose_int_encoding(value: i32) -> IntEncoding {
        if (0..=MAX_SMALL_SIGNED).contains(&i64::from(value)) {
            IntEncoding::Smallint
        } else {
            IntEncoding::Int
        }
    }

    /// Compact for 0..=127, like [`choose_int_encoding`](Self::choose_int_encoding).
    pub fn choose_long_encoding(value: i64) -> LongEncoding {
        if (0..=MAX_SMALL_SIGNED).contains(&value) {
            LongEncoding::Smalllong
        } else {
            LongEncoding::Long
        }
    }

    /// A list may use the array encoding when it has more than one element and every element has
    /// the same type. Null is a type of its own: a list of nulls qualifies, a mix does not.
    pub fn is_array_eligible(list: &[AmqpValue]) -> bool {
        match list.first() {
            Some(first) if list.len() > 1 => list.iter().all(|e| e.same_type(first)),
            _ => false,
        }
    }

    pub fn choose_list_encoding(&self, list: &[AmqpValue]) -> Result<ListEncoding> {
        let elements = self.plan_list(list, 1)?;
        Ok(self.list_encoding(list, &elements))
    }

    /// Picks `map32` as soon as the running size of the entries passes the 8-bit limit.
    pub fn choose_map_encoding(&self, map: &AmqpMap) -> Result<MapEncoding> {
        let (_, data_size) = self.plan_entries(map, 1)?;
        Ok(map_encoding(map, data_size))
    }

    fn list_encoding(&self, list: &[AmqpValue], elements: &ListPlan<'_>) -> ListEncoding {
        let encoding = match &elements.array {
            Some((_, array_size))
                if !self.config.no_array_encoding && Self::is_array_eligible(list) =>
            {
                if self.fits_list8(*array_size, list.len()) {
                    ListEncoding::Array8
                } else {
                    ListEncoding::Array32
                }
            }
            _ => {
                if self.fits_list8(elements.data_size, list.len()) {
                    ListEncoding::List8
                } else {
                    ListEncoding::List32
                }
            }
        };
        trace!(count = list.len(), ?encoding, "chose list encoding");
        encoding
    }

    fn fits_list8(&self, data_size: usize, count: usize) -> bool {
        self.config.use_8bit_list_encodings
            && data_size <= MAX_COMPOUND8_DATA_SIZE
            && count <= MAX_COMPOUND8_COUNT
    }

    /// The format code chosen for a standalone value.
    pub fn format_code(&self, value: &AmqpValue) -> Result<u8> {
        Ok(match value {
            AmqpValue::Null => FORMAT_NULL,
            AmqpValue::Boolean(v) => Self::choose_boolean_encoding(*v).format_code(),
            AmqpValue::Ubyte(_) => FORMAT_UBYTE,
            AmqpValue::Ushort(_) => FORMAT_USHORT,
            AmqpValue::Uint(v) => Self::choose_uint_encoding(*v).format_code(),
            AmqpValue::Ulong(v) => Self::choose_ulong_encoding(*v).format_code(),
            AmqpValue::Byte(_) => FORMAT_BYTE,
            AmqpValue::Short(_) => FORMAT_SHORT,
            AmqpValue::Int(v) => Self::choose_int_encoding(*v).format_code(),
            AmqpValue::Long(v) => Self::choose_long_encoding(*v).format_code(),
            AmqpValue::Float(_) => FORMAT_FLOAT,
            AmqpValue::Double(_) => FORMAT_DOUBLE,
            AmqpValue::Decimal32(_) => FORMAT_DECIMAL32,
            AmqpValue::Decimal64(_) => FORMAT_DECIMAL64,
            AmqpValue::Decimal128(_) => FORMAT_DECIMAL128,
            AmqpValue::Char(_) => FORMAT_CHAR,
            AmqpValue::Timestamp(_) => FORMAT_TIMESTAMP,
            AmqpValue::Uuid(_) => FORMAT_UUID,
            AmqpValue::Binary(v) => Self::choose_binary_encoding(v).format_code(),
            AmqpValue::String(v) => Self::choose_string_encoding(v).format_code(),
            AmqpValue::Symbol(v) => Self::choose_symbol_encoding(v)?.format_code(),
            AmqpValue::List(v) => self.choose_list_encoding(v)?.format_code(),
            AmqpValue::Map(v) => self.choose_map_encoding(v)?.format_code(),
            AmqpValue::Described(_) => FORMAT_DESCRIBED,
        })
    }

    /// The constructor chosen for a standalone value.
    pub fn constructor(&self, value: &AmqpValue) -> Result<Constructor> {
        Ok(self.plan(value, 0)?.constructor)
    }

    /// The single constructor shared by all elements of an array: the widest encoding any
    /// element needs.
    ///
    /// # Errors
    /// The list must be non-empty and all elements must share one type.
    pub fn array_constructor(&self, elements: &[AmqpValue]) -> Result<Constructor> {
        let elements = self.plan_list(elements, 1)?;
        Ok(self.array_parts(&elements)?.0.clone())
    }

    fn shared_constructor(&self, elements: &[&Plan<'_>]) -> Result<Constructor> {
        let first = *elements.first().ok_or_else(|| {
            AmqpCodecError::encoding("An array constructor needs at least one element")
        })?;
        if let Some(other) = elements.iter().find(|e| !e.value.same_type(first.value)) {
            return Err(AmqpCodecError::Encoding(format!(
                "Array elements must share one type, found {} and {}",
                first.value.type_name(),
                other.value.type_name()
            )));
        }
        let values = elements.iter().map(|e| e.value);

        let code = match first.value {
            AmqpValue::Described(_) => {
                let descriptor = match &first.constructor {
                    Constructor::Described { descriptor, .. } => descriptor.clone(),
                    Constructor::Primitive(code) => return Err(mismatch(first.value, *code)),
                };
                let inner: Vec<&Plan<'_>> =
                    elements.iter().filter_map(|e| e.children.first()).collect();
                return Ok(Constructor::Described {
                    descriptor,
                    inner: Box::new(self.shared_constructor(&inner)?),
                });
            }
            // true and false have no body; inside an array they need the one byte form
            AmqpValue::Boolean(_) => FORMAT_BOOLEAN,
            AmqpValue::Uint(_) => {
                let wide = values.clone().any(|e| {
                    matches!(e, AmqpValue::Uint(v) if Self::choose_uint_encoding(*v) == UintEncoding::Uint)
                });
                if wide {
                    FORMAT_UINT
                } else {
                    FORMAT_SMALLUINT
                }
            }
            AmqpValue::Ulong(_) => {
                let wide = values.clone().any(|e| {
                    matches!(e, AmqpValue::Ulong(v) if Self::choose_ulong_encoding(*v) == UlongEncoding::Ulong)
                });
                if wide {
                    FORMAT_ULONG
                } else {
                    FORMAT_SMALLULONG
                }
            }
            AmqpValue::Int(_) => {
                let wide = values.clone().any(|e| {
                    matches!(e, AmqpValue::Int(v) if Self::choose_int_encoding(*v) == IntEncoding::Int)
                });
                if wide {
                    FORMAT_INT
                } else {
                    FORMAT_SMALLINT
                }
            }
            AmqpValue::Long(_) => {
                let wide = values.clone().any(|e| {
                    matches!(e, AmqpValue::Long(v) if Self::choose_long_encoding(*v) == LongEncoding::Long)
                });
                if wide {
                    FORMAT_LONG
                } else {
                    FORMAT_SMALLLONG
                }
            }
            // variable-width elements: the widest payload decides
            AmqpValue::Binary(_) | AmqpValue::String(_) | AmqpValue::Symbol(_) => {
                let wide = elements.iter().any(|e| e.data_size > MAX_VARIABLE8_SIZE);
                match (first.value, wide) {
                    (AmqpValue::Binary(_), false) => FORMAT_VBIN8,
                    (AmqpValue::Binary(_), true) => FORMAT_VBIN32,
                    (AmqpValue::String(_), false) => FORMAT_STR8_UTF8,
                    (AmqpValue::String(_), true) => FORMAT_STR32_UTF8,
                    (_, false) => FORMAT_SYM8,
                    (_, true) => FORMAT_SYM32,
                }
            }
            // nested lists inside an array always use the generic list encoding
            AmqpValue::List(_) => {
                let wide = elements.iter().any(|e| match e.value {
                    AmqpValue::List(v) => !self.fits_list8(e.data_size, v.len()),
                    _ => false,
                });
                if wide {
                    FORMAT_LIST32
                } else {
                    FORMAT_LIST8
                }
            }
            AmqpValue::Map(_) => {
                if elements.iter().any(|e| e.data_size > MAX_COMPOUND8_DATA_SIZE) {
                    FORMAT_MAP32
                } else {
                    FORMAT_MAP8
                }
            }
            _ => return Ok(first.constructor.clone()),
        };
        Ok(Constructor::Primitive(code))
    }

    // --- planning ---

    /// Works out the encoding of `value` and of everything below it in one pass.
    ///
    /// Every sizing and writing entry point starts from a plan, so each node is sized once no
    /// matter how deeply it is nested.
    fn plan<'a>(&self, value: &'a AmqpValue, depth: usize) -> Result<Plan<'a>> {
        check_depth(depth)?;
        let (constructor, data_size, children, array) = match value {
            AmqpValue::List(list) => {
                let elements = self.plan_list(list, depth + 1)?;
                let encoding = self.list_encoding(list, &elements);
                (
                    Constructor::Primitive(encoding.format_code()),
                    elements.data_size,
                    elements.plans,
                    elements.array,
                )
            }
            AmqpValue::Map(map) => {
                let (children, data_size) = self.plan_entries(map, depth + 1)?;
                let code = map_encoding(map, data_size).format_code();
                (Constructor::Primitive(code), data_size, children, None)
            }
            AmqpValue::Described(d) => {
                let descriptor = self.plan(&d.descriptor, depth + 1)?;
                let mut writer = BytesMut::with_capacity(descriptor.encoded_size);
                self.write_plan(&descriptor, &mut writer)?;
                let inner = self.plan(&d.value, depth + 1)?;
                let constructor = Constructor::Described {
                    descriptor: writer.freeze(),
                    inner: Box::new(inner.constructor.clone()),
                };
                (constructor, 0, vec![inner], None)
            }
            other => {
                let payload = match other {
                    AmqpValue::Binary(v) => v.len(),
                    AmqpValue::String(v) => v.len(),
                    AmqpValue::Symbol(v) => v.as_str().len(),
                    _ => 0,
                };
                let code = self.format_code(other)?;
                (Constructor::Primitive(code), payload, Vec::new(), None)
            }
        };
        let mut plan = Plan {
            value,
            constructor,
            encoded_size: 0,
            data_size,
            children,
            array,
        };
        let body_size = self.plan_body_size(&plan, &plan.constructor)?;
        plan.encoded_size = plan.constructor.encoded_len() + body_size;
        Ok(plan)
    }

    /// Plans the elements of a list at `depth`, along with its array layout when the elements
    /// can share a constructor.
    fn plan_list<'a>(&self, list: &'a [AmqpValue], depth: usize) -> Result<ListPlan<'a>> {
        let plans = list
            .iter()
            .map(|e| self.plan(e, depth))
            .collect::<Result<Vec<_>>>()?;
        let data_size = plans.iter().map(|p| p.encoded_size).sum::<usize>();
        let refs: Vec<&Plan<'a>> = plans.iter().collect();
        // an error here only means the list cannot be an array; `array_parts` reports it
        let array = match self.shared_constructor(&refs) {
            Ok(constructor) => {
                let mut size = constructor.encoded_len();
                for plan in &plans {
                    size += self.plan_body_size(plan, &constructor)?;
                }
                Some((constructor, size))
            }
            Err(_) => None,
        };
        Ok(ListPlan {
            plans,
            data_size,
            array,
        })
    }

    /// Plans keys and values alternately at `depth`. Returns the plans and their total size.
    fn plan_entries<'a>(&self, map: &'a AmqpMap, depth: usize) -> Result<(Vec<Plan<'a>>, usize)> {
        let mut plans = Vec::with_capacity(2 * map.len());
        for (key, value) in map {
            plans.push(self.plan(key, depth)?);
            plans.push(self.plan(value, depth)?);
        }
        let data_size = plans.iter().map(|p| p.encoded_size).sum::<usize>();
        Ok((plans, data_size))
    }

    fn array_parts<'p>(&self, elements: &'p ListPlan<'_>) -> Result<&'p (Constructor, usize)> {
        match &elements.array {
            Some(parts) => Ok(parts),
            None => Err(self.no_shared_constructor(&elements.plans)),
        }
    }

    /// Why a list without array parts cannot be written as an array.
    fn no_shared_constructor(&self, plans: &[Plan<'_>]) -> AmqpCodecError {
        let refs: Vec<&Plan<'_>> = plans.iter().collect();
        self.shared_constructor(&refs)
            .err()
            .unwrap_or_else(|| AmqpCodecError::encoding("List cannot use the array encoding"))
    }

    /// Payload size of a planned value under a format code.
    fn plan_data_size(&self, plan: &Plan<'_>, format_code: u8) -> Result<usize> {
        match (format_code, plan.value) {
            (FORMAT_LIST8 | FORMAT_LIST32, AmqpValue::List(_))
            | (FORMAT_MAP8 | FORMAT_MAP32, AmqpValue::Map(_))
            | (FORMAT_VBIN8 | FORMAT_VBIN32, AmqpValue::Binary(_))
            | (FORMAT_STR8_UTF8 | FORMAT_STR32_UTF8, AmqpValue::String(_))
            | (FORMAT_SYM8 | FORMAT_SYM32, AmqpValue::Symbol(_)) => Ok(plan.data_size),
            (FORMAT_ARRAY8 | FORMAT_ARRAY32, AmqpValue::List(_)) => match &plan.array {
                Some((_, size)) => Ok(*size),
                None => Err(self.no_shared_constructor(&plan.children)),
            },
            (code, value) => {
                let sub_category = FormatSubCategory::from_format_code(code)?;
                if sub_category.category() == FormatCategory::Fixed {
                    Ok(sub_category.width())
                } else {
                    Err(mismatch(value, code))
                }
            }
        }
    }

    /// Bytes following `constructor` for a planned value: any size and count fields plus the
    /// payload.
    fn plan_body_size(&self, plan: &Plan<'_>, constructor: &Constructor) -> Result<usize> {
        match constructor {
            Constructor::Described { inner, .. } => match (plan.value, plan.children.first()) {
                (AmqpValue::Described(_), Some(described)) => self.plan_body_size(described, inner),
                (other, _) => Err(mismatch(other, FORMAT_DESCRIBED)),
            },
            Constructor::Primitive(code) => {
                let sub_category = FormatSubCategory::from_format_code(*code)?;
                match sub_category.category() {
                    FormatCategory::Fixed => Ok(sub_category.width()),
                    FormatCategory::Variable | FormatCategory::Compound | FormatCategory::Array => {
                        Ok(sub_category.header_length() + self.plan_data_size(plan, *code)?)
                    }
                    FormatCategory::Described => Err(mismatch(plan.value, *code)),
                }
            }
        }
    }

    // --- sizing ---

    /// Total encoded size of a standalone value, including its constructor.
    pub fn encoded_size(&self, value: &AmqpValue) -> Result<usize> {
        Ok(self.plan(value, 0)?.encoded_size)
    }

    /// Total encoded size of a value under a given constructor.
    pub fn encoded_size_with(&self, value: &AmqpValue, constructor: &Constructor) -> Result<usize> {
        let plan = self.plan(value, 0)?;
        Ok(constructor.encoded_len() + self.plan_body_size(&plan, constructor)?)
    }

    pub fn encoded_size_of_list(&self, list: &[AmqpValue], encoding: ListEncoding) -> Result<usize> {
        match encoding {
            ListEncoding::List0 if list.is_empty() => Ok(1),
            ListEncoding::List0 => Err(AmqpCodecError::encoding(
                "list0 cannot hold any elements",
            )),
            ListEncoding::List8 | ListEncoding::List32 => {
                Ok(1 + 2 * encoding.width() + self.plan_list(list, 1)?.data_size)
            }
            ListEncoding::Array8 | ListEncoding::Array32 => {
                self.encoded_size_of_array(list, encoding)
            }
        }
    }

    pub fn encoded_size_of_array(&self, list: &[AmqpValue], encoding: ListEncoding) -> Result<usize> {
        if !encoding.is_array() {
            return Err(AmqpCodecError::unexpected("array", encoding.format_code()));
        }
        let elements = self.plan_list(list, 1)?;
        Ok(1 + 2 * encoding.width() + self.array_parts(&elements)?.1)
    }

    pub fn encoded_size_of_map(&self, map: &AmqpMap, encoding: MapEncoding) -> Result<usize> {
        Ok(1 + 2 * encoding.width() + self.plan_entries(map, 1)?.1)
    }

    /// Payload size of a value under a format code. For compound and array codes this is the
    /// size after the count field; for variable codes the size after the size field.
    pub fn compute_data_size(&self, value: &AmqpValue, format_code: u8) -> Result<usize> {
        let plan = self.plan(value, 0)?;
        self.plan_data_size(&plan, format_code)
    }

    /// Number of constituents of a list or map under a compound or array format code.
    pub fn compute_data_count(&self, value: &AmqpValue, format_code: u8) -> Result<usize> {
        match (format_code, value) {
            (
                FORMAT_LIST8 | FORMAT_LIST32 | FORMAT_ARRAY8 | FORMAT_ARRAY32,
                AmqpValue::List(list),
            ) => Ok(list.len()),
            (FORMAT_MAP8 | FORMAT_MAP32, AmqpValue::Map(map)) => Ok(2 * map.len()),
            (code, value) => Err(mismatch(value, code)),
        }
    }

    // --- buffer mode ---

    /// Appends the narrowest encoding of `value` to `writer`.
    pub fn encode(&self, value: &AmqpValue, writer: &mut BytesMut) -> Result<()> {
        let plan = self.plan(value, 0)?;
        self.write_plan(&plan, writer)
    }

    /// Appends everything that follows `constructor` for `value`.
    pub fn encode_body(
        &self,
        value: &AmqpValue,
        constructor: &Constructor,
        writer: &mut BytesMut,
    ) -> Result<()> {
        let plan = self.plan(value, 0)?;
        self.write_plan_body(&plan, constructor, writer)
    }

    /// Appends each element with its own constructor. Returns the number of bytes appended.
    pub fn encode_list(&self, list: &[AmqpValue], writer: &mut BytesMut) -> Result<usize> {
        let start = writer.len();
        for plan in &self.plan_list(list, 1)?.plans {
            self.write_plan(plan, writer)?;
        }
        Ok(writer.len() - start)
    }

    /// Appends the shared constructor once, then the body of each element. Returns the number of
    /// bytes appended.
    pub fn encode_array(
        &self,
        list: &[AmqpValue],
        constructor: &Constructor,
        writer: &mut BytesMut,
    ) -> Result<usize> {
        let start = writer.len();
        constructor.encode(writer);
        for plan in &self.plan_list(list, 1)?.plans {
            self.write_plan_body(plan, constructor, writer)?;
        }
        Ok(writer.len() - start)
    }

    /// Appends keys and values alternately, in map order. Returns the number of bytes appended.
    pub fn encode_map(&self, map: &AmqpMap, writer: &mut BytesMut) -> Result<usize> {
        let start = writer.len();
        for plan in &self.plan_entries(map, 1)?.0 {
            self.write_plan(plan, writer)?;
        }
        Ok(writer.len() - start)
    }

    fn write_plan(&self, plan: &Plan<'_>, writer: &mut BytesMut) -> Result<()> {
        plan.constructor.encode(writer);
        self.write_plan_body(plan, &plan.constructor, writer)
    }

    fn write_plan_body(
        &self,
        plan: &Plan<'_>,
        constructor: &Constructor,
        writer: &mut BytesMut,
    ) -> Result<()> {
        let code = match constructor {
            Constructor::Described { inner, .. } => {
                return match (plan.value, plan.children.first()) {
                    (AmqpValue::Described(_), Some(described)) => {
                        self.write_plan_body(described, inner, writer)
                    }
                    (other, _) => Err(mismatch(other, FORMAT_DESCRIBED)),
                }
            }
            Constructor::Primitive(code) => *code,
        };
        match (code, plan.value) {
            (FORMAT_LIST8 | FORMAT_LIST32, AmqpValue::List(list)) => {
                let width = if code == FORMAT_LIST8 { 1 } else { 4 };
                write_width(writer, width + plan.data_size, width)?;
                write_width(writer, list.len(), width)?;
                for element in &plan.children {
                    self.write_plan(element, writer)?;
                }
            }
            (FORMAT_ARRAY8 | FORMAT_ARRAY32, AmqpValue::List(list)) => {
                let width = if code == FORMAT_ARRAY8 { 1 } else { 4 };
                let data_size = self.plan_data_size(plan, code)?;
                let shared = match &plan.array {
                    Some((shared, _)) => shared,
                    None => return Err(mismatch(plan.value, code)),
                };
                write_width(writer, width + data_size, width)?;
                write_width(writer, list.len(), width)?;
                shared.encode(writer);
                for element in &plan.children {
                    self.write_plan_body(element, shared, writer)?;
                }
            }
            (FORMAT_MAP8 | FORMAT_MAP32, AmqpValue::Map(map)) => {
                let width = if code == FORMAT_MAP8 { 1 } else { 4 };
                write_width(writer, width + plan.data_size, width)?;
                write_width(writer, 2 * map.len(), width)?;
                for constituent in &plan.children {
                    self.write_plan(constituent, writer)?;
                }
            }
            (code, value) => encode_primitive_body(code, value, writer)?,
        }
        Ok(())
    }

    // --- stream mode ---

    /// Writes the narrowest encoding of `value`. Returns the number of bytes written.
    pub fn write<W: Write>(&self, value: &AmqpValue, writer: &mut W) -> Result<usize> {
        match value {
            AmqpValue::List(list) => self.write_list(list, self.choose_list_encoding(list)?, writer),
            AmqpValue::Map(map) => self.write_map(map, self.choose_map_encoding(map)?, writer),
            other => EncodedBuffer::from_encoded(other, self)?.marshal(writer),
        }
    }

    /// Writes a list with the given encoding; array encodings are delegated to
    /// [`write_array`](Self::write_array).
    pub fn write_list<W: Write>(
        &self,
        list: &[AmqpValue],
        encoding: ListEncoding,
        writer: &mut W,
    ) -> Result<usize> {
        match encoding {
            ListEncoding::Array8 | ListEncoding::Array32 => {
                return self.write_array(list, encoding, writer)
            }
            ListEncoding::List0 if list.is_empty() => {
                writer.write_all(&[FORMAT_LIST0])?;
                return Ok(1);
            }
            ListEncoding::List0 => {
                return Err(AmqpCodecError::encoding("list0 cannot hold any elements"))
            }
            ListEncoding::List8 | ListEncoding::List32 => {}
        }
        let elements = list
            .iter()
            .map(|e| EncodedBuffer::from_encoded(e, self))
            .collect::<Result<Vec<_>>>()?;
        let data_size = elements.iter().map(EncodedBuffer::encoded_size).sum::<usize>();
        let mut written = write_header(
            encoding.format_code(),
            encoding.width(),
            data_size,
            elements.len(),
            writer,
        )?;
        for element in &elements {
            written += element.marshal(writer)?;
        }
        Ok(written)
    }

    /// Writes a list as an array: the first element is marshalled whole, so its constructor
    /// becomes the shared one, and every following element contributes only its body.
    pub fn write_array<W: Write>(
        &self,
        list: &[AmqpValue],
        encoding: ListEncoding,
        writer: &mut W,
    ) -> Result<usize> {
        if !encoding.is_array() {
            return Err(AmqpCodecError::unexpected("array", encoding.format_code()));
        }
        let constructor = self.array_constructor(list)?;
        let elements = list
            .iter()
            .map(|e| EncodedBuffer::from_encoded_with(e, &constructor, self))
            .collect::<Result<Vec<_>>>()?;
        let data_size = constructor.encoded_len()
            + elements
                .iter()
                .map(|e| e.encoded_size() - e.constructor_length())
                .sum::<usize>();
        let mut written = write_header(
            encoding.format_code(),
            encoding.width(),
            data_size,
            elements.len(),
            writer,
        )?;
        let mut elements = elements.iter();
        if let Some(first) = elements.next() {
            written += first.marshal(writer)?;
        }
        for element in elements {
            written += element.marshal_data(writer)?;
        }
        Ok(written)
    }

    pub fn write_map<W: Write>(
        &self,
        map: &AmqpMap,
        encoding: MapEncoding,
        writer: &mut W,
    ) -> Result<usize> {
        let mut constituents = Vec::with_capacity(2 * map.len());
        for (key, value) in map {
            constituents.push(EncodedBuffer::from_encoded(key, self)?);
            constituents.push(EncodedBuffer::from_encoded(value, self)?);
        }
        let data_size = constituents.iter().map(EncodedBuffer::encoded_size).sum::<usize>();
        let mut written = write_header(
            encoding.format_code(),
            encoding.width(),
            data_size,
            constituents.len(),
            writer,
        )?;
        for constituent in &constituents {
            written += constituent.marshal(writer)?;
        }
        Ok(written)
    }
}

/// Writes a compound or array header: format code, size field, count field.
fn write_header<W: Write>(
    format_code: u8,
    width: usize,
    data_size: usize,
    count: usize,
    writer: &mut W,
) -> Result<usize> {
    let mut header = BytesMut::with_capacity(1 + 2 * width);
    header.put_u8(format_code);
    write_width(&mut header, width + data_size, width)?;
    write_width(&mut header, count, width)?;
    writer.write_all(&header)?;
    Ok(header.len())
}

/// A value with its encoding worked out.
struct Plan<'a> {
    value: &'a AmqpValue,
    /// The constructor the value is written with standalone.
    constructor: Constructor,
    /// Size under `constructor`, including the constructor itself.
    encoded_size: usize,
    /// Payload after any size and count fields under the generic encoding of the value: the
    /// element bytes of a list, the entry bytes of a map, the payload of a variable value.
    data_size: usize,
    /// Elements of a list, keys and values of a map, or the value behind a descriptor.
    children: Vec<Plan<'a>>,
    /// Shared constructor and array data size, for lists whose elements can share one.
    array: Option<(Constructor, usize)>,
}

struct ListPlan<'a> {
    plans: Vec<Plan<'a>>,
    data_size: usize,
    array: Option<(Constructor, usize)>,
}

fn map_encoding(map: &AmqpMap, data_size: usize) -> MapEncoding {
    if data_size > MAX_COMPOUND8_DATA_SIZE {
        trace!(entries = map.len(), "chose map32");
        MapEncoding::Map32
    } else {
        MapEncoding::Map8
    }
}

/// Appends the body of a value that is neither a list nor a map.
fn encode_primitive_body(code: u8, value: &AmqpValue, writer: &mut BytesMut) -> Result<()> {
    match (code, value) {
        (FORMAT_NULL, AmqpValue::Null)
        | (FORMAT_TRUE, AmqpValue::Boolean(true))
        | (FORMAT_FALSE, AmqpValue::Boolean(false))
        | (FORMAT_UINT0, AmqpValue::Uint(0))
        | (FORMAT_ULONG0, AmqpValue::Ulong(0)) => {}
        (FORMAT_LIST0, AmqpValue::List(list)) if list.is_empty() => {}
        (FORMAT_BOOLEAN, AmqpValue::Boolean(v)) => writer.put_u8(*v as u8),
        (FORMAT_UBYTE, AmqpValue::Ubyte(v)) => writer.put_u8(*v),
        (FORMAT_BYTE, AmqpValue::Byte(v)) => writer.put_i8(*v),
        (FORMAT_SMALLUINT, AmqpValue::Uint(v)) => writer.put_u8(narrow(*v, code)?),
        (FORMAT_SMALLULONG, AmqpValue::Ulong(v)) => writer.put_u8(narrow(*v, code)?),
        (FORMAT_SMALLINT, AmqpValue::Int(v)) => writer.put_i8(narrow(*v, code)?),
        (FORMAT_SMALLLONG, AmqpValue::Long(v)) => writer.put_i8(narrow(*v, code)?),
        (FORMAT_USHORT, AmqpValue::Ushort(v)) => writer.put_u16(*v),
        (FORMAT_SHORT, AmqpValue::Short(v)) => writer.put_i16(*v),
        (FORMAT_UINT, AmqpValue::Uint(v)) => writer.put_u32(*v),
        (FORMAT_INT, AmqpValue::Int(v)) => writer.put_i32(*v),
        (FORMAT_FLOAT, AmqpValue::Float(v)) => writer.put_f32(*v),
        (FORMAT_CHAR, AmqpValue::Char(v)) => writer.put_u32(*v as u32),
        (FORMAT_DECIMAL32, AmqpValue::Decimal32(v)) => writer.put_slice(v),
        (FORMAT_ULONG, AmqpValue::Ulong(v)) => writer.put_u64(*v),
        (FORMAT_LONG, AmqpValue::Long(v)) => writer.put_i64(*v),
        (FORMAT_DOUBLE, AmqpValue::Double(v)) => writer.put_f64(*v),
        (FORMAT_TIMESTAMP, AmqpValue::Timestamp(v)) => writer.put_i64(*v),
        (FORMAT_DECIMAL64, AmqpValue::Decimal64(v)) => writer.put_slice(v),
        (FORMAT_DECIMAL128, AmqpValue::Decimal128(v)) => writer.put_slice(v),
        (FORMAT_UUID, AmqpValue::Uuid(v)) => writer.put_slice(v.as_bytes()),
        (FORMAT_VBIN8 | FORMAT_VBIN32, AmqpValue::Binary(v)) => {
            write_width(writer, v.len(), variable_width(code))?;
            writer.put_slice(v);
        }
        (FORMAT_STR8_UTF8 | FORMAT_STR32_UTF8, AmqpValue::String(v)) => {
            write_width(writer, v.len(), variable_width(code))?;
            writer.put_slice(v.as_bytes());
        }
        (FORMAT_SYM8 | FORMAT_SYM32, AmqpValue::Symbol(v)) => {
            check_ascii(v)?;
            write_width(writer, v.as_str().len(), variable_width(code))?;
            writer.put_slice(v.as_str().as_bytes());
        }
        (code, value) => return Err(mismatch(value, code)),
    }
    Ok(())
}

fn variable_width(code: u8) -> usize {
    if code & 0xf0 == 0xa0 {
        1
    } else {
        4
    }
}

fn check_ascii(value: &Symbol) -> Result<()> {
    if value.as_str().is_ascii() {
        Ok(())
    } else {
        Err(AmqpCodecError::Encoding(format!(
            "Symbol {:?} contains non-ASCII characters",
            value.as_str()
        )))
    }
}

/// Narrows a value into a one byte body, failing instead of truncating.
fn narrow<T, U>(value: T, code: u8) -> Result<U>
where
    T: Copy + std::fmt::Display,
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| {
        AmqpCodecError::Encoding(format!(
            "Value {} does not fit format code 0x{:02x}",
            value, code
        ))
    })
}

fn mismatch(value: &AmqpValue, code: u8) -> AmqpCodecError {
    AmqpCodecError::Encoding(format!(
        "Cannot encode {} with format code 0x{:02x}",
        value.type_name(),
        code
    ))
}
