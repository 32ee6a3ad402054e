//! RESP Protocol Module
//!
//! Framing for the Redis Serialization Protocol: the reply value model and
//! an incremental parser. The command layer never writes wire bytes itself;
//! it returns [`RespValue`]s and the connection layer serializes them.
//!
//! Every frame begins with a one-byte type prefix and ends with CRLF:
//!
//! | Prefix | Type          | Example                  |
//! |--------|---------------|--------------------------|
//! | `+`    | Simple string | `+OK\r\n`                |
//! | `-`    | Error         | `-ERR bad thing\r\n`     |
//! | `:`    | Integer       | `:42\r\n`                |
//! | `$`    | Bulk string   | `$5\r\nhello\r\n`        |
//! | `*`    | Array         | `*1\r\n$4\r\nPING\r\n`   |
//!
//! Absent values are the null bulk string `$-1\r\n`. Lines with no known
//! prefix are treated as inline commands (whitespace-separated words), which
//! keeps `telnet` sessions usable.

pub mod parser;
pub mod types;

pub use parser::{parse_frame, ParseError};
pub use types::RespValue;
