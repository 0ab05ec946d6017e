//! Incremental RESP Parser
//!
//! Replies arrive over TCP in arbitrary fragments, so the parser never assumes
//! it holds a whole message. Every call returns one of:
//!
//! - `Ok(Some((value, consumed)))` - a complete value; advance the buffer by `consumed`
//! - `Ok(None)` - the buffer ends mid-message; read more and retry
//! - `Err(ParseError)` - the bytes are not valid RESP
//!
//! The parser keeps no state between calls apart from a nesting guard, so the
//! caller can simply append to its buffer and call `parse` again.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Negative length other than the null marker
    #[error("invalid length: {0}")]
    InvalidLength(i64),

    /// Protocol violation (missing CRLF, excessive nesting)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A bulk string larger than we are willing to buffer
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

type Parsed = Option<(RespValue, usize)>;

/// An incremental RESP parser.
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Parsed> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Parsed> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(read_line(buf)?
                .map(|(line, used)| (RespValue::SimpleString(line.to_string()), used))),
            prefix::ERROR => {
                Ok(read_line(buf)?.map(|(line, used)| (RespValue::Error(line.to_string()), used)))
            }
            prefix::INTEGER => match read_line(buf)? {
                Some((line, used)) => Ok(Some((RespValue::Integer(parse_int(line)?), used))),
                None => Ok(None),
            },
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Parsed> {
        let (line, header) = match read_line(buf)? {
            Some(found) => found,
            None => return Ok(None),
        };

        let length = parse_int(line)?;
        if length == -1 {
            return Ok(Some((RespValue::Null, header)));
        }
        if length < 0 {
            return Err(ParseError::InvalidLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total = header + length + CRLF.len();
        if buf.len() < total {
            return Ok(None);
        }

        if &buf[header + length..total] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header..header + length]);
        Ok(Some((RespValue::BulkString(data), total)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Parsed> {
        let (line, mut consumed) = match read_line(buf)? {
            Some(found) => found,
            None => return Ok(None),
        };

        let count = parse_int(line)?;
        if count == -1 {
            return Ok(Some((RespValue::Null, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidLength(count));
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(1024));

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..]) {
                Ok(Some((value, used))) => {
                    elements.push(value);
                    consumed += used;
                }
                other => {
                    self.depth -= 1;
                    return other;
                }
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Reads the header line after the type prefix.
///
/// Returns the line content (without prefix and CRLF) and the number of bytes
/// the line occupies, prefix and CRLF included.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let line = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((line, 1 + pos + CRLF.len())))
        }
        None => Ok(None),
    }
}

fn parse_int(line: &str) -> ParseResult<i64> {
    line.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))
}

/// Finds the position of the `\r` in the first CRLF of `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single RESP message from bytes with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Parsed> {
    RespParser::new().parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_reply() {
        let (value, consumed) = parse_message(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::ok());
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_error_reply() {
        let (value, consumed) = parse_message(b"-ERR wrong type\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Error("ERR wrong type".to_string()));
        assert_eq!(consumed, 17);
    }

    #[test]
    fn test_parse_integer() {
        let (value, _) = parse_message(b":-42\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(-42));
    }

    #[test]
    fn test_parse_bulk_string() {
        let (value, consumed) = parse_message(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from("hello")));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_parse_null_and_empty_bulk() {
        let (value, consumed) = parse_message(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Null);
        assert_eq!(consumed, 5);

        let (value, consumed) = parse_message(b"$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::new()));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_incomplete_input_needs_more() {
        assert!(parse_message(b"").unwrap().is_none());
        assert!(parse_message(b"+OK").unwrap().is_none());
        assert!(parse_message(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_message(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
    }

    #[test]
    fn test_parse_command_array() {
        let input = b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$4\r\nAriz\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::command(["SET", "user:101", "Ariz"]));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_nested_array() {
        let input = b"*2\r\n:1\r\n*2\r\n:2\r\n:3\r\n";
        let (value, _) = parse_message(input).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::Integer(1),
                RespValue::Array(vec![RespValue::Integer(2), RespValue::Integer(3)]),
            ])
        );
    }

    #[test]
    fn test_pipelined_replies_parse_one_at_a_time() {
        let input = b"+OK\r\n$-1\r\n";
        let mut parser = RespParser::new();
        let (first, used) = parser.parse(input).unwrap().unwrap();
        assert_eq!(first, RespValue::ok());
        let (second, _) = parser.parse(&input[used..]).unwrap().unwrap();
        assert!(second.is_null());
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(
            parse_message(b"@nope\r\n"),
            Err(ParseError::UnknownPrefix(b'@'))
        );
        assert!(matches!(
            parse_message(b":abc\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
        assert!(matches!(
            parse_message(b"$3\r\nabcXY"),
            Err(ParseError::ProtocolError(_))
        ));
        assert_eq!(parse_message(b"$-2\r\n"), Err(ParseError::InvalidLength(-2)));
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let (value, _) = parse_message(b"$5\r\nhel\x00o\r\n").unwrap().unwrap();
        assert_eq!(value.as_bytes(), Some(&b"hel\x00o"[..]));
    }
}
