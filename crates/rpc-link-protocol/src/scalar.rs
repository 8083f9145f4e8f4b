//! Raw wire encoding for scalar types.
//!
//! The wire rides on ordinary protobuf scalar conventions (varint for
//! integers, IEEE-754 little-endian for floats, length-delimited for
//! strings/bytes) but a raw value is not wrapped in a one-field message: no
//! field tag is ever written, so there is nothing to strip on decode.

use bytes::{Buf, BufMut, Bytes, BytesMut};

#[derive(Debug, thiserror::Error)]
pub enum ScalarError {
    #[error("truncated scalar payload: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("malformed varint in scalar payload")]
    MalformedVarint,
    #[error("trailing bytes after decoding scalar")]
    TrailingBytes,
}

pub fn encode_bool(value: bool) -> Bytes {
    Bytes::from_static(if value { &[0x01] } else { &[0x00] })
}

pub fn decode_bool(buf: &[u8]) -> Result<bool, ScalarError> {
    match buf {
        [0x00] => Ok(false),
        [0x01] => Ok(true),
        [] => Err(ScalarError::Truncated { expected: 1, actual: 0 }),
        _ => Err(ScalarError::TrailingBytes),
    }
}

pub fn encode_uint64(value: u64) -> Bytes {
    let mut out = BytesMut::with_capacity(10);
    put_varint(value, &mut out);
    out.freeze()
}

pub fn decode_uint64(buf: &[u8]) -> Result<u64, ScalarError> {
    let (value, consumed) = get_varint(buf)?;
    if consumed != buf.len() {
        return Err(ScalarError::TrailingBytes);
    }
    Ok(value)
}

pub fn encode_uint32(value: u32) -> Bytes {
    encode_uint64(u64::from(value))
}

pub fn decode_uint32(buf: &[u8]) -> Result<u32, ScalarError> {
    Ok(decode_uint64(buf)? as u32)
}

/// Protobuf `sint32`: zigzag varint, so small negatives stay small on the wire.
pub fn encode_sint32(value: i32) -> Bytes {
    let zigzag = ((value << 1) ^ (value >> 31)) as u32;
    encode_uint32(zigzag)
}

pub fn decode_sint32(buf: &[u8]) -> Result<i32, ScalarError> {
    let zigzag = decode_uint32(buf)?;
    Ok(((zigzag >> 1) as i32) ^ -((zigzag & 1) as i32))
}

/// Protobuf plain `int32` (used for enumerations): varint, sign-extended to
/// 64 bits for negative values, not zigzag-encoded.
pub fn encode_enum(value: i32) -> Bytes {
    encode_uint64(value as i64 as u64)
}

pub fn decode_enum(buf: &[u8]) -> Result<i32, ScalarError> {
    let raw = decode_uint64(buf)? as i64;
    Ok(raw as i32)
}

pub fn encode_float(value: f32) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

pub fn decode_float(buf: &[u8]) -> Result<f32, ScalarError> {
    let arr: [u8; 4] = buf
        .try_into()
        .map_err(|_| ScalarError::Truncated { expected: 4, actual: buf.len() })?;
    Ok(f32::from_le_bytes(arr))
}

pub fn encode_double(value: f64) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

pub fn decode_double(buf: &[u8]) -> Result<f64, ScalarError> {
    let arr: [u8; 8] = buf
        .try_into()
        .map_err(|_| ScalarError::Truncated { expected: 8, actual: buf.len() })?;
    Ok(f64::from_le_bytes(arr))
}

/// Length-delimited payload: a varint length followed by that many raw
/// bytes. Used for both `STRING` and `BYTES` declared types.
pub fn encode_length_delimited(value: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(value.len() + 5);
    put_varint(value.len() as u64, &mut out);
    out.extend_from_slice(value);
    out.freeze()
}

pub fn decode_length_delimited(buf: &[u8]) -> Result<Bytes, ScalarError> {
    let (len, consumed) = get_varint(buf)?;
    let len = len as usize;
    let rest = &buf[consumed..];
    if rest.len() < len {
        return Err(ScalarError::Truncated { expected: len, actual: rest.len() });
    }
    if rest.len() != len {
        return Err(ScalarError::TrailingBytes);
    }
    Ok(Bytes::copy_from_slice(rest))
}

fn put_varint(mut value: u64, out: &mut BytesMut) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.put_u8(byte);
            break;
        }
        out.put_u8(byte | 0x80);
    }
}

fn get_varint(buf: &[u8]) -> Result<(u64, usize), ScalarError> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ScalarError::MalformedVarint)
}

/// Convenience: read a length-delimited prefix and return the remaining
/// slice alongside the decoded bytes, for callers consuming a stream of
/// adjacent length-delimited items (e.g. dictionary entries).
pub fn take_length_delimited(buf: &mut Bytes) -> Result<Bytes, ScalarError> {
    let (len, consumed) = get_varint(buf)?;
    let len = len as usize;
    buf.advance(consumed);
    if buf.len() < len {
        return Err(ScalarError::Truncated { expected: len, actual: buf.len() });
    }
    Ok(buf.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_encodes_as_a_single_tag_byte() {
        assert_eq!(&encode_bool(true)[..], &[0x01]);
        assert_eq!(&encode_bool(false)[..], &[0x00]);
        assert!(decode_bool(&[0x01]).unwrap());
        assert!(!decode_bool(&[0x00]).unwrap());
    }

    #[test]
    fn string_encodes_with_a_varint_length_prefix() {
        let encoded = encode_length_delimited(b"hello world");
        assert_eq!(&encoded[..], b"\x0bhello world");
    }

    #[test]
    fn roundtrip_scalars() {
        assert_eq!(decode_uint32(&encode_uint32(42)).unwrap(), 42);
        assert_eq!(decode_uint64(&encode_uint64(u64::MAX)).unwrap(), u64::MAX);
        for v in [-1i32, 0, 1, i32::MIN, i32::MAX] {
            assert_eq!(decode_sint32(&encode_sint32(v)).unwrap(), v);
            assert_eq!(decode_enum(&encode_enum(v)).unwrap(), v);
        }
        assert_eq!(decode_float(&encode_float(1.5)).unwrap(), 1.5);
        assert_eq!(decode_double(&encode_double(2.25)).unwrap(), 2.25);
        let bytes = decode_length_delimited(&encode_length_delimited(b"abc")).unwrap();
        assert_eq!(&bytes[..], b"abc");
    }

    #[test]
    fn truncated_length_delimited_is_an_error() {
        let mut encoded = BytesMut::new();
        put_varint(10, &mut encoded);
        encoded.extend_from_slice(b"short");
        assert!(matches!(
            decode_length_delimited(&encoded),
            Err(ScalarError::Truncated { .. })
        ));
    }
}
