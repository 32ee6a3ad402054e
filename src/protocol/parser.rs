//! Incremental RESP parser.
//!
//! TCP delivers a byte stream, not frames: a read may hold half a command
//! or several at once. The parser therefore works against whatever bytes
//! the connection has buffered and reports one of three outcomes:
//!
//! - `Ok(Some((frame, consumed)))` — a complete frame; the caller advances
//!   its buffer by `consumed` bytes.
//! - `Ok(None)` — the buffer ends mid-frame; read more and retry.
//! - `Err(_)` — the bytes cannot be valid RESP; the connection is dropped.
//!
//! Inputs that start with no known prefix byte are parsed as inline
//! commands: one line of whitespace-separated words.

use crate::protocol::types::RespValue;
use bytes::Bytes;
use thiserror::Error;

/// Largest accepted bulk string payload (512 MB, matching Redis).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Deepest accepted array nesting; guards the recursive parser's stack.
pub const MAX_DEPTH: usize = 32;

/// Malformed protocol input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid length or integer field: {0}")]
    BadInteger(String),

    #[error("invalid UTF-8 in protocol line")]
    BadUtf8,

    #[error("negative length {0} is not a valid frame length")]
    BadLength(i64),

    #[error("bulk string of {0} bytes exceeds the {MAX_BULK_LEN} byte limit")]
    BulkTooLarge(usize),

    #[error("arrays nested deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("malformed frame: {0}")]
    Malformed(&'static str),
}

/// Attempts to parse one frame from the front of `buf`.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(RespValue, usize)>, ParseError> {
    parse_at(buf, 0)
}

fn parse_at(buf: &[u8], depth: usize) -> Result<Option<(RespValue, usize)>, ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::TooDeep);
    }
    let Some(&prefix) = buf.first() else {
        return Ok(None);
    };

    match prefix {
        b'+' | b'-' => parse_line(buf, prefix),
        b':' => parse_integer(buf),
        b'$' => parse_bulk(buf),
        b'*' => parse_array(buf, depth),
        _ => parse_inline(buf),
    }
}

/// `+...` and `-...`: a single text line.
fn parse_line(buf: &[u8], prefix: u8) -> Result<Option<(RespValue, usize)>, ParseError> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&buf[1..1 + end])
        .map_err(|_| ParseError::BadUtf8)?
        .to_string();
    let consumed = 1 + end + 2;
    let frame = if prefix == b'+' {
        RespValue::SimpleString(text)
    } else {
        RespValue::Error(text)
    };
    Ok(Some((frame, consumed)))
}

fn parse_integer(buf: &[u8]) -> Result<Option<(RespValue, usize)>, ParseError> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let n = read_i64(&buf[1..1 + end])?;
    Ok(Some((RespValue::Integer(n), 1 + end + 2)))
}

/// `$<len>\r\n<data>\r\n`, with `$-1\r\n` as the null bulk string.
fn parse_bulk(buf: &[u8]) -> Result<Option<(RespValue, usize)>, ParseError> {
    let Some(len_end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let declared = read_i64(&buf[1..1 + len_end])?;
    let header = 1 + len_end + 2;

    if declared == -1 {
        return Ok(Some((RespValue::Null, header)));
    }
    if declared < 0 {
        return Err(ParseError::BadLength(declared));
    }
    let len = declared as usize;
    if len > MAX_BULK_LEN {
        return Err(ParseError::BulkTooLarge(len));
    }

    let total = header + len + 2;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[header + len..total] != b"\r\n" {
        return Err(ParseError::Malformed("bulk string missing trailing CRLF"));
    }

    let data = Bytes::copy_from_slice(&buf[header..header + len]);
    Ok(Some((RespValue::BulkString(data), total)))
}

/// `*<count>\r\n<frame>...`, with `*-1\r\n` treated as null.
fn parse_array(buf: &[u8], depth: usize) -> Result<Option<(RespValue, usize)>, ParseError> {
    let Some(count_end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let declared = read_i64(&buf[1..1 + count_end])?;
    let mut consumed = 1 + count_end + 2;

    if declared == -1 {
        return Ok(Some((RespValue::Null, consumed)));
    }
    if declared < 0 {
        return Err(ParseError::BadLength(declared));
    }

    let mut items = Vec::with_capacity(declared as usize);
    for _ in 0..declared {
        match parse_at(&buf[consumed..], depth + 1)? {
            Some((item, used)) => {
                items.push(item);
                consumed += used;
            }
            None => return Ok(None),
        }
    }
    Ok(Some((RespValue::Array(items), consumed)))
}

/// A bare text line, split on whitespace into bulk strings.
fn parse_inline(buf: &[u8]) -> Result<Option<(RespValue, usize)>, ParseError> {
    let Some(end) = find_crlf(buf) else {
        return Ok(None);
    };
    let line = std::str::from_utf8(&buf[..end]).map_err(|_| ParseError::BadUtf8)?;
    let words: Vec<RespValue> = line
        .split_whitespace()
        .map(|word| RespValue::BulkString(Bytes::from(word.to_string())))
        .collect();
    if words.is_empty() {
        return Err(ParseError::Malformed("empty inline command"));
    }
    Ok(Some((RespValue::Array(words), end + 2)))
}

fn read_i64(raw: &[u8]) -> Result<i64, ParseError> {
    let text = std::str::from_utf8(raw).map_err(|_| ParseError::BadUtf8)?;
    text.parse::<i64>()
        .map_err(|_| ParseError::BadInteger(text.to_string()))
}

#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}
