use amqp_codec::*;
use bytes::BytesMut;

#[test]
fn test_category_of_defined_codes() {
    let cases = [
        (FORMAT_DESCRIBED, FormatCategory::Described),
        (FORMAT_NULL, FormatCategory::Fixed),
        (FORMAT_TRUE, FormatCategory::Fixed),
        (FORMAT_LIST0, FormatCategory::Fixed),
        (FORMAT_SMALLUINT, FormatCategory::Fixed),
        (FORMAT_BOOLEAN, FormatCategory::Fixed),
        (FORMAT_USHORT, FormatCategory::Fixed),
        (FORMAT_UINT, FormatCategory::Fixed),
        (FORMAT_CHAR, FormatCategory::Fixed),
        (FORMAT_ULONG, FormatCategory::Fixed),
        (FORMAT_TIMESTAMP, FormatCategory::Fixed),
        (FORMAT_DECIMAL128, FormatCategory::Fixed),
        (FORMAT_UUID, FormatCategory::Fixed),
        (FORMAT_VBIN8, FormatCategory::Variable),
        (FORMAT_STR8_UTF8, FormatCategory::Variable),
        (FORMAT_SYM8, FormatCategory::Variable),
        (FORMAT_VBIN32, FormatCategory::Variable),
        (FORMAT_STR32_UTF8, FormatCategory::Variable),
        (FORMAT_SYM32, FormatCategory::Variable),
        (FORMAT_LIST8, FormatCategory::Compound),
        (FORMAT_MAP8, FormatCategory::Compound),
        (FORMAT_LIST32, FormatCategory::Compound),
        (FORMAT_MAP32, FormatCategory::Compound),
        (FORMAT_ARRAY8, FormatCategory::Array),
        (FORMAT_ARRAY32, FormatCategory::Array),
    ];
    for (code, category) in cases {
        assert_eq!(get_category(code).unwrap(), category, "code 0x{:02x}", code);
    }
}

#[test]
fn test_unassigned_nibbles_are_invalid() {
    for code in [0x10u8, 0x1f, 0x20, 0x2a, 0x30, 0x3f] {
        match get_category(code) {
            Err(AmqpCodecError::InvalidFormatCode(c)) => assert_eq!(c, code),
            other => panic!("expected InvalidFormatCode for 0x{:02x}, got {:?}", code, other),
        }
    }
}

#[test]
fn test_sub_category_widths() {
    let cases = [
        (0x00u8, FormatSubCategory::Described, 0),
        (0x40, FormatSubCategory::Fixed0, 0),
        (0x50, FormatSubCategory::Fixed1, 1),
        (0x60, FormatSubCategory::Fixed2, 2),
        (0x70, FormatSubCategory::Fixed4, 4),
        (0x80, FormatSubCategory::Fixed8, 8),
        (0x98, FormatSubCategory::Fixed16, 16),
        (0xa1, FormatSubCategory::Variable1, 1),
        (0xb1, FormatSubCategory::Variable4, 4),
        (0xc0, FormatSubCategory::Compound1, 1),
        (0xd0, FormatSubCategory::Compound4, 4),
        (0xe0, FormatSubCategory::Array1, 1),
        (0xf0, FormatSubCategory::Array4, 4),
    ];
    for (code, sub_category, width) in cases {
        let actual = FormatSubCategory::from_format_code(code).unwrap();
        assert_eq!(actual, sub_category);
        assert_eq!(actual.width(), width);
    }
}

#[test]
fn test_header_length() {
    let header = |code| FormatSubCategory::from_format_code(code).unwrap().header_length();
    assert_eq!(header(FORMAT_NULL), 0);
    assert_eq!(header(FORMAT_UINT), 0);
    assert_eq!(header(FORMAT_VBIN8), 1);
    assert_eq!(header(FORMAT_VBIN32), 4);
    assert_eq!(header(FORMAT_LIST8), 2);
    assert_eq!(header(FORMAT_MAP32), 8);
    assert_eq!(header(FORMAT_ARRAY32), 8);
}

#[test]
fn test_category_flags() {
    assert!(!FormatCategory::Fixed.encodes_size());
    assert!(!FormatCategory::Described.encodes_size());
    assert!(FormatCategory::Variable.encodes_size());
    assert!(!FormatCategory::Variable.encodes_count());
    assert!(FormatCategory::Compound.encodes_count());
    assert!(FormatCategory::Array.encodes_count());
}

#[test]
fn test_read_width() {
    assert_eq!(read_width(&[0xff], 1).unwrap(), 255);
    assert_eq!(read_width(&[0x00, 0x00, 0x01, 0x00], 4).unwrap(), 256);
    assert_eq!(read_width(&[0xff, 0xff, 0xff, 0xff], 4).unwrap(), u32::MAX as usize);
    assert!(matches!(
        read_width(&[0x00, 0x01], 4),
        Err(AmqpCodecError::InsufficientData)
    ));
}

#[test]
fn test_write_width() {
    let mut writer = BytesMut::new();
    write_width(&mut writer, 255, 1).unwrap();
    write_width(&mut writer, 256, 4).unwrap();
    assert_eq!(&writer[..], &[0xff, 0x00, 0x00, 0x01, 0x00]);

    assert!(matches!(
        write_width(&mut writer, 256, 1),
        Err(AmqpCodecError::Length(256))
    ));
}
