use amqp_codec::*;
use bytes::Bytes;
use std::io::{Cursor, ErrorKind};

/// `[uint 1, "a"]` as list8.
const LIST8: [u8; 8] = [0xc0, 0x06, 0x02, 0x52, 0x01, 0xa1, 0x01, 0x61];

/// `[uint 1, "a"]` as list32.
const LIST32: [u8; 14] = [
    0xd0, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x02, 0x52, 0x01, 0xa1, 0x01, 0x61,
];

fn check_list(buffer: &EncodedBuffer, width: usize) {
    assert!(buffer.is_compound());
    assert_eq!(buffer.data_size(), 5);
    assert_eq!(buffer.data_count().unwrap(), 2);
    assert_eq!(buffer.data_offset(), 1 + 2 * width);
    assert_eq!(buffer.encoded_size(), 1 + 2 * width + 5);
    assert_eq!(buffer.constructor_length(), 1);

    let constituents = buffer.constituents().unwrap();
    assert_eq!(constituents.len(), 2);
    assert_eq!(constituents[0].as_bytes().as_ref(), &[0x52, 0x01]);
    assert_eq!(constituents[1].as_bytes().as_ref(), &[0xa1, 0x01, 0x61]);
    assert_eq!(buffer.data().as_ref(), &[0x52, 0x01, 0xa1, 0x01, 0x61]);
}

#[test]
fn test_list8_from_bytes() {
    let source = Bytes::from_static(&LIST8);
    let buffer = EncodedBuffer::from_bytes(&source, 0).unwrap();
    check_list(&buffer, 1);
    assert_eq!(buffer.as_compound().unwrap().width(), 1);
}

#[test]
fn test_list32_from_bytes() {
    let source = Bytes::from_static(&LIST32);
    let buffer = EncodedBuffer::from_bytes(&source, 0).unwrap();
    check_list(&buffer, 4);
    assert_eq!(buffer.as_compound().unwrap().width(), 4);
}

#[test]
fn test_from_bytes_at_offset() {
    let mut source = vec![0xff, 0xff];
    source.extend_from_slice(&LIST8);
    source.push(0x40);
    let source = Bytes::from(source);
    let buffer = EncodedBuffer::from_bytes(&source, 2).unwrap();
    check_list(&buffer, 1);
}

#[test]
fn test_list8_from_stream() {
    let mut reader = Cursor::new([&LIST8[..], &[0x40]].concat());
    let buffer = EncodedBuffer::unmarshal(&mut reader).unwrap();
    check_list(&buffer, 1);
    assert_eq!(reader.position(), LIST8.len() as u64);
}

#[test]
fn test_list32_from_stream() {
    let mut reader = Cursor::new(LIST32.to_vec());
    let buffer = EncodedBuffer::unmarshal(&mut reader).unwrap();
    check_list(&buffer, 4);
}

#[test]
fn test_unmarshal_after_code() {
    let mut reader = Cursor::new(LIST32[1..].to_vec());
    let buffer = EncodedBuffer::unmarshal_after_code(FORMAT_LIST32, &mut reader).unwrap();
    assert_eq!(buffer.as_bytes().as_ref(), &LIST32[..]);
}

#[test]
fn test_truncated_stream() {
    let mut reader = Cursor::new(LIST32[..10].to_vec());
    match EncodedBuffer::unmarshal(&mut reader) {
        Err(AmqpCodecError::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
        other => panic!("expected UnexpectedEof, got {:?}", other),
    }

    let mut reader = Cursor::new(vec![FORMAT_UINT, 0x00, 0x01]);
    match EncodedBuffer::unmarshal(&mut reader) {
        Err(AmqpCodecError::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
        other => panic!("expected UnexpectedEof, got {:?}", other),
    }
}

#[test]
fn test_truncated_bytes() {
    let source = Bytes::copy_from_slice(&LIST32[..10]);
    assert!(matches!(
        EncodedBuffer::from_bytes(&source, 0),
        Err(AmqpCodecError::InsufficientData)
    ));
    let source = Bytes::new();
    assert!(matches!(
        EncodedBuffer::from_bytes(&source, 0),
        Err(AmqpCodecError::InsufficientData)
    ));
}

#[test]
fn test_inconsistent_compound_header() {
    // declares two constituents in four data bytes but the second one runs past the end
    let source = Bytes::from_static(&[0xc0, 0x05, 0x02, 0x52, 0x01, 0xa1, 0x01]);
    assert!(EncodedBuffer::from_bytes(&source, 0).is_err());

    // declares one constituent but the data holds two
    let source = Bytes::from_static(&[0xc0, 0x05, 0x01, 0x52, 0x01, 0x52, 0x02]);
    assert!(matches!(
        EncodedBuffer::from_bytes(&source, 0),
        Err(AmqpCodecError::Encoding(_))
    ));
}

#[test]
fn test_array8_from_bytes() {
    let source = Bytes::from_static(&[0xe0, 0x05, 0x03, 0x52, 0x01, 0x02, 0x03]);
    let buffer = EncodedBuffer::from_bytes(&source, 0).unwrap();
    assert!(buffer.is_array());
    assert_eq!(buffer.data_count().unwrap(), 3);
    assert_eq!(buffer.data_size(), 4);

    let array = buffer.as_array().unwrap();
    assert_eq!(array.element_constructor(), &Constructor::Primitive(FORMAT_SMALLUINT));
    assert_eq!(array.element_constructor_length(), 1);
    let elements: Vec<&[u8]> = array
        .constituents()
        .iter()
        .map(|c| c.as_bytes().as_ref())
        .collect();
    assert_eq!(elements, vec![&[0x52, 0x01][..], &[0x52, 0x02], &[0x52, 0x03]]);
}

#[test]
fn test_array32_with_widened_constructor() {
    let value = AmqpValue::List(vec![AmqpValue::Uint(1), AmqpValue::Uint(300)]);
    let buffer = EncodedBuffer::from_encoded(&value, &Encoder::default()).unwrap();
    assert_eq!(
        buffer.as_bytes().as_ref(),
        &[
            0xf0, 0x00, 0x00, 0x00, 0x0d, 0x00, 0x00, 0x00, 0x02, 0x70, 0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x01, 0x2c
        ]
    );
    let constituents = buffer.constituents().unwrap();
    assert_eq!(constituents[0].as_bytes().as_ref(), &[0x70, 0x00, 0x00, 0x00, 0x01]);
    assert_eq!(constituents[1].as_bytes().as_ref(), &[0x70, 0x00, 0x00, 0x01, 0x2c]);

    let reparsed = EncodedBuffer::from_bytes(buffer.as_bytes(), 0).unwrap();
    assert_eq!(reparsed, buffer);
}

#[test]
fn test_from_bytes_after_code() {
    let source = Bytes::from_static(&[0xa1, 0x03, b'a', b'b', b'c', 0x40]);
    let buffer = EncodedBuffer::from_bytes_after_code(FORMAT_STR8_UTF8, &source, 1).unwrap();
    assert_eq!(buffer.as_bytes().as_ref(), &source[..5]);

    let detached = Bytes::from_static(&[0x03, b'a', b'b', b'c', 0x40]);
    let buffer = EncodedBuffer::from_bytes_after_code(FORMAT_STR8_UTF8, &detached, 0).unwrap();
    assert_eq!(buffer.as_bytes().as_ref(), &[0xa1, 0x03, b'a', b'b', b'c']);
    assert_eq!(buffer.as_variable().unwrap().data().as_ref(), b"abc");
}

#[test]
fn test_described_from_bytes() {
    let source = Bytes::from_static(&[0x00, 0x53, 0x10, 0x45]);
    let buffer = EncodedBuffer::from_bytes(&source, 0).unwrap();
    assert!(buffer.is_described());
    assert_eq!(buffer.sub_category(), FormatSubCategory::Described);
    assert_eq!(buffer.constructor_length(), 4);
    assert_eq!(buffer.data_offset(), 4);
    assert_eq!(buffer.data_size(), 0);

    let described = buffer.as_described().unwrap();
    assert_eq!(described.descriptor().as_bytes().as_ref(), &[0x53, 0x10]);
    assert_eq!(described.described().format_code(), FORMAT_LIST0);
}

#[test]
fn test_described_from_stream() {
    let mut reader = Cursor::new(vec![0x00, 0xa3, 0x01, b'x', 0x52, 0x07]);
    let buffer = EncodedBuffer::unmarshal(&mut reader).unwrap();
    assert_eq!(buffer.encoded_size(), 6);
    assert_eq!(buffer.constructor_length(), 5);
    assert_eq!(buffer.as_described().unwrap().described().as_bytes().as_ref(), &[0x52, 0x07]);
}

#[test]
fn test_fixed_and_variable_have_no_count() {
    let source = Bytes::from_static(&[0x52, 0x07]);
    let buffer = EncodedBuffer::from_bytes(&source, 0).unwrap();
    assert!(buffer.data_count().is_err());
    assert!(buffer.constituents().is_err());
    assert!(buffer.as_compound().is_err());
    assert_eq!(buffer.as_fixed().unwrap().data(), &[0x07]);

    let source = Bytes::from_static(&[0xa0, 0x01, 0x07]);
    let buffer = EncodedBuffer::from_bytes(&source, 0).unwrap();
    assert!(buffer.data_count().is_err());
    assert_eq!(buffer.data_size(), 1);
}

#[test]
fn test_marshal_parts() {
    let source = Bytes::from_static(&[0x00, 0x53, 0x10, 0x52, 0x07]);
    let buffer = EncodedBuffer::from_bytes(&source, 0).unwrap();

    let mut constructor = Vec::new();
    assert_eq!(buffer.marshal_constructor(&mut constructor).unwrap(), 4);
    assert_eq!(constructor, vec![0x00, 0x53, 0x10, 0x52]);

    let mut data = Vec::new();
    assert_eq!(buffer.marshal_data(&mut data).unwrap(), 1);
    assert_eq!(data, vec![0x07]);

    let mut all = Vec::new();
    assert_eq!(buffer.marshal(&mut all).unwrap(), 5);
    assert_eq!(all, source.to_vec());
}

#[test]
fn test_from_encoded_matches_encode() {
    let encoder = Encoder::new(EncoderConfig::default().with_8bit_list_encodings(true));
    let value = AmqpValue::List(vec![AmqpValue::Uint(1), AmqpValue::from("a")]);
    let buffer = EncodedBuffer::from_encoded(&value, &encoder).unwrap();
    assert_eq!(buffer.as_bytes().as_ref(), &LIST8[..]);

    let mut writer = bytes::BytesMut::new();
    encoder.encode(&value, &mut writer).unwrap();
    assert_eq!(&writer[..], &LIST8[..]);
}

/// `levels` list8 values, each holding the next, around a single null.
fn nested_list8(levels: usize) -> Vec<u8> {
    let mut bytes = vec![FORMAT_NULL];
    for _ in 0..levels {
        let mut outer = vec![FORMAT_LIST8, (bytes.len() + 1) as u8, 0x01];
        outer.extend_from_slice(&bytes);
        bytes = outer;
    }
    bytes
}

#[test]
fn test_nesting_depth_limit() {
    let source = Bytes::from(nested_list8(MAX_NESTING_DEPTH));
    let mut buffer = EncodedBuffer::from_bytes(&source, 0).unwrap();
    for _ in 0..MAX_NESTING_DEPTH {
        buffer = buffer.constituents().unwrap()[0].clone();
    }
    assert_eq!(buffer.format_code(), FORMAT_NULL);

    let source = Bytes::from(nested_list8(MAX_NESTING_DEPTH + 1));
    assert!(matches!(
        EncodedBuffer::from_bytes(&source, 0),
        Err(AmqpCodecError::Encoding(_))
    ));
    let mut reader = Cursor::new(source.to_vec());
    assert!(matches!(
        EncodedBuffer::unmarshal(&mut reader),
        Err(AmqpCodecError::Encoding(_))
    ));
}

#[test]
fn test_long_described_chain_is_rejected() {
    let mut bytes = vec![FORMAT_DESCRIBED; 200_000];
    bytes.extend_from_slice(&[FORMAT_NULL, FORMAT_NULL]);

    let source = Bytes::from(bytes.clone());
    assert!(matches!(
        EncodedBuffer::from_bytes(&source, 0),
        Err(AmqpCodecError::Encoding(_))
    ));
    assert!(matches!(
        EncodedBuffer::unmarshal(&mut Cursor::new(bytes)),
        Err(AmqpCodecError::Encoding(_))
    ));

    // the same chain as an array element constructor
    let mut array = vec![FORMAT_ARRAY32];
    array.extend_from_slice(&(4u32 + 200_000 + 2).to_be_bytes());
    array.extend_from_slice(&2u32.to_be_bytes());
    array.extend(std::iter::repeat(FORMAT_DESCRIBED).take(200_000));
    array.extend_from_slice(&[FORMAT_NULL, FORMAT_NULL]);
    assert!(matches!(
        EncodedBuffer::from_bytes(&Bytes::from(array), 0),
        Err(AmqpCodecError::Encoding(_))
    ));
}

#[test]
fn test_array_of_empty_elements() {
    let source = Bytes::from_static(&[0xe0, 0x02, 0x03, 0x40]);
    let buffer = EncodedBuffer::from_bytes(&source, 0).unwrap();
    let constituents = buffer.constituents().unwrap();
    assert_eq!(constituents.len(), 3);
    assert!(constituents
        .iter()
        .all(|c| c.as_bytes().as_ref() == &[FORMAT_NULL]));

    let mut bytes = vec![0xf0, 0x00, 0x00, 0x00, 0x05];
    bytes.extend_from_slice(&(MAX_EMPTY_ELEMENT_COUNT as u32).to_be_bytes());
    bytes.push(FORMAT_TRUE);
    let buffer = EncodedBuffer::from_bytes(&Bytes::from(bytes), 0).unwrap();
    assert_eq!(buffer.constituents().unwrap().len(), MAX_EMPTY_ELEMENT_COUNT);
}

#[test]
fn test_array_count_beyond_data() {
    for count in [MAX_EMPTY_ELEMENT_COUNT as u32 + 1, 20_000_000, u32::MAX] {
        let mut bytes = vec![0xf0, 0x00, 0x00, 0x00, 0x05];
        bytes.extend_from_slice(&count.to_be_bytes());
        bytes.push(FORMAT_NULL);
        assert!(matches!(
            EncodedBuffer::from_bytes(&Bytes::from(bytes), 0),
            Err(AmqpCodecError::Encoding(_))
        ));
    }

    // a described wrapper around a bodyless constructor
    let mut bytes = vec![0xf0, 0x00, 0x00, 0x00, 0x08];
    bytes.extend_from_slice(&u32::MAX.to_be_bytes());
    bytes.extend_from_slice(&[FORMAT_DESCRIBED, FORMAT_SMALLULONG, 0x09, FORMAT_NULL]);
    assert!(matches!(
        EncodedBuffer::from_bytes(&Bytes::from(bytes), 0),
        Err(AmqpCodecError::Encoding(_))
    ));

    // smalluint elements take a byte each, two bytes cannot hold five
    let source = Bytes::from_static(&[0xe0, 0x04, 0x05, 0x52, 0x01, 0x02]);
    assert!(matches!(
        EncodedBuffer::from_bytes(&source, 0),
        Err(AmqpCodecError::Encoding(_))
    ));
}
