//! Length-prefixed message framing: a varint size prefix followed by that
//! many bytes of a single protobuf message.
//!
//! Varint encoding follows the standard protobuf convention: seven bits of
//! payload per byte, little-endian, with the high bit set on every byte but
//! the last.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Messages larger than this are rejected as a protocol error rather than
/// buffered indefinitely.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FramerError {
    #[error("message of {size} bytes exceeds the maximum of {max} bytes")]
    MessageTooLarge { size: u64, max: usize },
    #[error("varint prefix is malformed or exceeds 64 bits")]
    MalformedVarint,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Appends the varint-encoded length of `payload` to `out`, followed by
/// `payload` itself.
pub fn frame(payload: &[u8], out: &mut BytesMut) {
    encode_varint(payload.len() as u64, out);
    out.extend_from_slice(payload);
}

/// Result of attempting to pull one frame out of a buffer.
pub enum Extracted {
    /// A full message was present; `consumed` bytes (prefix + payload) were
    /// used from the front of the buffer.
    Complete { message: Bytes, consumed: usize },
    /// The prefix or payload was not fully buffered yet. No bytes were
    /// consumed.
    Incomplete,
}

/// Attempts to decode one length-prefixed message from the front of `buf`
/// without mutating it. Returns `Incomplete` if either the varint prefix or
/// the payload is not fully present yet.
pub fn extract(buf: &[u8], max_message_size: usize) -> Result<Extracted, FramerError> {
    let Some((len, prefix_len)) = decode_varint(buf)? else {
        return Ok(Extracted::Incomplete);
    };
    if len as usize > max_message_size {
        return Err(FramerError::MessageTooLarge {
            size: len,
            max: max_message_size,
        });
    }
    let total = prefix_len + len as usize;
    if buf.len() < total {
        return Ok(Extracted::Incomplete);
    }
    let message = Bytes::copy_from_slice(&buf[prefix_len..total]);
    Ok(Extracted::Complete {
        message,
        consumed: total,
    })
}

/// Encodes `value` as a protobuf-style varint and appends it to `out`.
pub fn encode_varint(mut value: u64, out: &mut BytesMut) {
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

/// Decodes a varint from the front of `buf`. Returns `Ok(None)` if `buf`
/// does not yet contain a complete varint (no terminating byte found within
/// 10 bytes, the max for a 64-bit value).
fn decode_varint(buf: &[u8]) -> Result<Option<(u64, usize)>, FramerError> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= 10 {
        return Err(FramerError::MalformedVarint);
    }
    Ok(None)
}

/// A [`tokio_util::codec`] adapter over [`frame`]/[`extract`], for use with
/// `Framed<TcpStream, Framer>` on both the RPC and stream sockets.
pub struct Framer {
    max_message_size: usize,
}

impl Framer {
    pub fn new(max_message_size: usize) -> Self {
        Framer { max_message_size }
    }
}

impl Default for Framer {
    fn default() -> Self {
        Framer::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Decoder for Framer {
    type Item = Bytes;
    type Error = FramerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FramerError> {
        match extract(src, self.max_message_size)? {
            Extracted::Incomplete => Ok(None),
            Extracted::Complete { message, consumed } => {
                src.advance(consumed);
                Ok(Some(message))
            }
        }
    }
}

impl Encoder<Bytes> for Framer {
    type Error = FramerError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FramerError> {
        frame(&item, dst);
        Ok(())
    }
}


impl std::fmt::Debug for Extracted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Extracted::Complete { consumed, .. } => {
                write!(f, "Complete {{ consumed: {consumed} }}")
            }
            Extracted::Incomplete => write!(f, "Incomplete"),
        }
    }
}
