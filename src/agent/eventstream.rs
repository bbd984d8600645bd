//! Codec for the `application/vnd.amazon.eventstream` framing.
//!
//! Every message on the wire is laid out as
//!
//! ```text
//! [total_len u32][headers_len u32][prelude_crc u32][headers][payload][message_crc u32]
//! ```
//!
//! with all integers big-endian and both checksums CRC-32 (IEEE).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + CRC_LEN;
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;
const MAX_HEADERS_LEN: usize = 128 * 1024;

#[derive(Error, Debug)]
pub enum EventStreamError {
    #[error("I/O error while reading event stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid message length {0}")]
    InvalidLength(usize),

    #[error("invalid headers length {0}")]
    InvalidHeadersLength(usize),

    #[error("prelude checksum mismatch (expected {expected:#010x}, got {actual:#010x})")]
    PreludeChecksum { expected: u32, actual: u32 },

    #[error("message checksum mismatch (expected {expected:#010x}, got {actual:#010x})")]
    MessageChecksum { expected: u32, actual: u32 },

    #[error("malformed header: {0}")]
    Header(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    ByteArray(Bytes),
    String(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(value) => Some(value),
            _ => None,
        }
    }

    fn type_tag(&self) -> u8 {
        match self {
            HeaderValue::Bool(true) => 0,
            HeaderValue::Bool(false) => 1,
            HeaderValue::Byte(_) => 2,
            HeaderValue::Int16(_) => 3,
            HeaderValue::Int32(_) => 4,
            HeaderValue::Int64(_) => 5,
            HeaderValue::ByteArray(_) => 6,
            HeaderValue::String(_) => 7,
            HeaderValue::Timestamp(_) => 8,
            HeaderValue::Uuid(_) => 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: HeaderValue,
}

/// One decoded event-stream message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub headers: Vec<Header>,
    pub payload: Bytes,
}

impl Message {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            headers: Vec::new(),
            payload: payload.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: HeaderValue) -> Self {
        self.headers.push(Header {
            name: name.into(),
            value,
        });
        self
    }

    /// Shorthand for the string-typed headers the agent protocol uses.
    pub fn with_str_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_header(name, HeaderValue::String(value.into()))
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|header| header.name == name)
            .map(|header| &header.value)
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(HeaderValue::as_str)
    }
}

/// Frames a byte stream into [`Message`]s and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventStreamCodec;

impl Decoder for EventStreamCodec {
    type Item = Message;
    type Error = EventStreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, EventStreamError> {
        if src.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total_len = read_u32(&src[0..4]) as usize;
        let headers_len = read_u32(&src[4..8]) as usize;
        let prelude_crc = read_u32(&src[8..12]);

        let actual = crc32fast::hash(&src[0..8]);
        if actual != prelude_crc {
            return Err(EventStreamError::PreludeChecksum {
                expected: prelude_crc,
                actual,
            });
        }
        if !(MIN_MESSAGE_LEN..=MAX_MESSAGE_LEN).contains(&total_len) {
            return Err(EventStreamError::InvalidLength(total_len));
        }
        if headers_len > MAX_HEADERS_LEN || headers_len > total_len - MIN_MESSAGE_LEN {
            return Err(EventStreamError::InvalidHeadersLength(headers_len));
        }

        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total_len).freeze();
        let body_end = total_len - CRC_LEN;
        let message_crc = read_u32(&frame[body_end..]);
        let actual = crc32fast::hash(&frame[..body_end]);
        if actual != message_crc {
            return Err(EventStreamError::MessageChecksum {
                expected: message_crc,
                actual,
            });
        }

        let headers_end = PRELUDE_LEN + headers_len;
        let headers = parse_headers(frame.slice(PRELUDE_LEN..headers_end))?;
        let payload = frame.slice(headers_end..body_end);

        Ok(Some(Message { headers, payload }))
    }
}

impl Encoder<Message> for EventStreamCodec {
    type Error = EventStreamError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), EventStreamError> {
        let mut headers = BytesMut::new();
        for header in &message.headers {
            write_header(header, &mut headers)?;
        }
        if headers.len() > MAX_HEADERS_LEN {
            return Err(EventStreamError::InvalidHeadersLength(headers.len()));
        }

        let total_len = MIN_MESSAGE_LEN + headers.len() + message.payload.len();
        if total_len > MAX_MESSAGE_LEN {
            return Err(EventStreamError::InvalidLength(total_len));
        }

        let start = dst.len();
        dst.reserve(total_len);
        dst.put_u32(total_len as u32);
        dst.put_u32(headers.len() as u32);
        let prelude_crc = crc32fast::hash(&dst[start..start + 8]);
        dst.put_u32(prelude_crc);
        dst.put_slice(&headers);
        dst.put_slice(&message.payload);
        let message_crc = crc32fast::hash(&dst[start..]);
        dst.put_u32(message_crc);
        Ok(())
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn parse_headers(mut buf: Bytes) -> Result<Vec<Header>, EventStreamError> {
    let mut headers = Vec::new();

    while buf.has_remaining() {
        let name_len = buf.get_u8() as usize;
        if name_len == 0 {
            return Err(EventStreamError::Header("empty header name".into()));
        }
        let name_bytes = take(&mut buf, name_len)?;
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| EventStreamError::Header("header name is not UTF-8".into()))?;

        ensure_remaining(&buf, 1)?;
        let value = match buf.get_u8() {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => {
                ensure_remaining(&buf, 1)?;
                HeaderValue::Byte(buf.get_i8())
            }
            3 => {
                ensure_remaining(&buf, 2)?;
                HeaderValue::Int16(buf.get_i16())
            }
            4 => {
                ensure_remaining(&buf, 4)?;
                HeaderValue::Int32(buf.get_i32())
            }
            5 => {
                ensure_remaining(&buf, 8)?;
                HeaderValue::Int64(buf.get_i64())
            }
            6 => {
                ensure_remaining(&buf, 2)?;
                let len = buf.get_u16() as usize;
                HeaderValue::ByteArray(take(&mut buf, len)?)
            }
            7 => {
                ensure_remaining(&buf, 2)?;
                let len = buf.get_u16() as usize;
                let raw = take(&mut buf, len)?;
                let value = String::from_utf8(raw.to_vec()).map_err(|_| {
                    EventStreamError::Header(format!("value of `{name}` is not UTF-8"))
                })?;
                HeaderValue::String(value)
            }
            8 => {
                ensure_remaining(&buf, 8)?;
                HeaderValue::Timestamp(buf.get_i64())
            }
            9 => {
                let raw = take(&mut buf, 16)?;
                let mut uuid = [0u8; 16];
                uuid.copy_from_slice(&raw);
                HeaderValue::Uuid(uuid)
            }
            other => {
                return Err(EventStreamError::Header(format!(
                    "unknown value type {other} for `{name}`"
                )));
            }
        };

        headers.push(Header { name, value });
    }

    Ok(headers)
}

fn ensure_remaining(buf: &Bytes, len: usize) -> Result<(), EventStreamError> {
    if buf.remaining() < len {
        return Err(EventStreamError::Header("header block truncated".into()));
    }
    Ok(())
}

fn take(buf: &mut Bytes, len: usize) -> Result<Bytes, EventStreamError> {
    ensure_remaining(buf, len)?;
    Ok(buf.split_to(len))
}

fn write_header(header: &Header, dst: &mut BytesMut) -> Result<(), EventStreamError> {
    let name = header.name.as_bytes();
    if name.is_empty() || name.len() > u8::MAX as usize {
        return Err(EventStreamError::Header(format!(
            "header name `{}` must be 1-255 bytes",
            header.name
        )));
    }
    dst.put_u8(name.len() as u8);
    dst.put_slice(name);
    dst.put_u8(header.value.type_tag());

    match &header.value {
        HeaderValue::Bool(_) => {}
        HeaderValue::Byte(value) => dst.put_i8(*value),
        HeaderValue::Int16(value) => dst.put_i16(*value),
        HeaderValue::Int32(value) => dst.put_i32(*value),
        HeaderValue::Int64(value) | HeaderValue::Timestamp(value) => dst.put_i64(*value),
        HeaderValue::ByteArray(value) => put_sized(dst, value, &header.name)?,
        HeaderValue::String(value) => put_sized(dst, value.as_bytes(), &header.name)?,
        HeaderValue::Uuid(value) => dst.put_slice(value),
    }
    Ok(())
}

fn put_sized(dst: &mut BytesMut, value: &[u8], name: &str) -> Result<(), EventStreamError> {
    let len = u16::try_from(value.len())
        .map_err(|_| EventStreamError::Header(format!("value of `{name}` is too long")))?;
    dst.put_u16(len);
    dst.put_slice(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(message: Message) -> BytesMut {
        let mut buf = BytesMut::new();
        EventStreamCodec.encode(message, &mut buf).unwrap();
        buf
    }

    fn sample() -> Message {
        Message::new(&b"{\"bytes\":\"aGk=\"}"[..])
            .with_str_header(":message-type", "event")
            .with_str_header(":event-type", "chunk")
            .with_header("flag", HeaderValue::Bool(false))
            .with_header("count", HeaderValue::Int32(-7))
            .with_header("at", HeaderValue::Timestamp(1_700_000_000_000))
            .with_header("id", HeaderValue::Uuid([7; 16]))
    }

    #[test]
    fn decodes_what_it_encodes() {
        let mut buf = encode(sample());
        let decoded = EventStreamCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, sample());
        assert!(buf.is_empty());
        assert_eq!(decoded.header_str(":event-type"), Some("chunk"));
        assert_eq!(decoded.header_str("count"), None);
    }

    #[test]
    fn waits_for_the_rest_of_a_split_message() {
        let full = encode(sample());
        let mut buf = BytesMut::new();
        let mut codec = EventStreamCodec;

        for (i, byte) in full.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < full.len() {
                assert!(decoded.is_none(), "decoded early at byte {i}");
            } else {
                assert_eq!(decoded, Some(sample()));
            }
        }
    }

    #[test]
    fn decodes_back_to_back_messages() {
        let mut buf = encode(sample());
        buf.extend_from_slice(&encode(Message::new(&b"second"[..])));

        let first = EventStreamCodec.decode(&mut buf).unwrap().unwrap();
        let second = EventStreamCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, sample());
        assert_eq!(&second.payload[..], b"second");
        assert!(EventStreamCodec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn rejects_corrupted_payload() {
        let mut buf = encode(sample());
        let payload_byte = buf.len() - CRC_LEN - 1;
        buf[payload_byte] ^= 0xff;

        let err = EventStreamCodec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, EventStreamError::MessageChecksum { .. }));
    }

    #[test]
    fn rejects_corrupted_prelude() {
        let mut buf = encode(sample());
        buf[3] ^= 0x01;

        let err = EventStreamCodec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, EventStreamError::PreludeChecksum { .. }));
    }

    #[test]
    fn rejects_unknown_header_type() {
        let mut headers = BytesMut::new();
        headers.put_u8(1);
        headers.put_slice(b"x");
        headers.put_u8(42);

        let err = parse_headers(headers.freeze()).unwrap_err();
        assert!(matches!(err, EventStreamError::Header(_)));
    }

    #[test]
    fn leftover_bytes_at_eof_are_an_error() {
        let full = encode(sample());
        let mut buf = BytesMut::from(&full[..full.len() - 3]);

        assert!(EventStreamCodec.decode_eof(&mut buf).is_err());
    }
}
