//! RESP value model and serialization.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// A single RESP frame, used both for parsed requests and outgoing replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe string without CRLF, e.g. `+OK`.
    SimpleString(String),
    /// Error reply; the first word is conventionally an error code.
    Error(String),
    /// 64-bit signed integer.
    Integer(i64),
    /// Binary-safe string.
    BulkString(Bytes),
    /// The null bulk string (`$-1`), reported for absent values.
    Null,
    /// Array of frames; requests arrive as arrays of bulk strings.
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        RespValue::Array(items)
    }

    /// The canonical `+OK` reply.
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Wraps an optional value as bulk-or-null, the shape most read
    /// commands reply with.
    pub fn bulk_or_null(data: Option<Bytes>) -> Self {
        match data {
            Some(data) => RespValue::BulkString(data),
            None => RespValue::Null,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Borrows the frame as UTF-8 text when it is a (simple or bulk) string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Appends the wire encoding of this frame to `out`.
    pub fn write_to(&self, out: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => {
                out.put_u8(b'+');
                out.put_slice(s.as_bytes());
                out.put_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                out.put_u8(b'-');
                out.put_slice(s.as_bytes());
                out.put_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                out.put_u8(b':');
                out.put_slice(n.to_string().as_bytes());
                out.put_slice(b"\r\n");
            }
            RespValue::BulkString(data) => {
                out.put_u8(b'$');
                out.put_slice(data.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                out.put_slice(data);
                out.put_slice(b"\r\n");
            }
            RespValue::Null => {
                out.put_slice(b"$-1\r\n");
            }
            RespValue::Array(items) => {
                out.put_u8(b'*');
                out.put_slice(items.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                for item in items {
                    item.write_to(out);
                }
            }
        }
    }

    /// The wire encoding as a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.write_to(&mut out);
        out.freeze()
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_simple_and_error() {
        assert_eq!(&RespValue::ok().encode()[..], b"+OK\r\n");
        assert_eq!(
            &RespValue::error("ERR boom").encode()[..],
            b"-ERR boom\r\n"
        );
    }

    #[test]
    fn encode_integers() {
        assert_eq!(&RespValue::integer(1000).encode()[..], b":1000\r\n");
        assert_eq!(&RespValue::integer(-7).encode()[..], b":-7\r\n");
    }

    #[test]
    fn encode_bulk_and_null() {
        assert_eq!(
            &RespValue::bulk(Bytes::from("hello")).encode()[..],
            b"$5\r\nhello\r\n"
        );
        assert_eq!(&RespValue::Null.encode()[..], b"$-1\r\n");
        assert_eq!(
            RespValue::bulk_or_null(None).encode(),
            RespValue::Null.encode()
        );
    }

    #[test]
    fn encode_nested_array() {
        let frame = RespValue::array(vec![
            RespValue::integer(1),
            RespValue::array(vec![RespValue::bulk(Bytes::from("x"))]),
        ]);
        assert_eq!(&frame.encode()[..], b"*2\r\n:1\r\n*1\r\n$1\r\nx\r\n");
    }

    #[test]
    fn bulk_is_binary_safe() {
        let frame = RespValue::bulk(Bytes::from(&b"a\x00b"[..]));
        assert_eq!(&frame.encode()[..], b"$3\r\na\x00b\r\n");
    }
}
