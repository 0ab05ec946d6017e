//! RESP Data Types
//!
//! Each RESP value starts with a one byte type prefix and ends with CRLF:
//!
//! - `+` Simple String (`+OK\r\n`)
//! - `-` Error (`-ERR wrong type\r\n`)
//! - `:` Integer (`:42\r\n`)
//! - `$` Bulk String (`$5\r\nhello\r\n`, null is `$-1\r\n`)
//! - `*` Array (`*2\r\n$3\r\nGET\r\n$1\r\nk\r\n`)

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single RESP value, either a request we send or a reply we receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status reply such as `OK` or `PONG`.
    SimpleString(String),

    /// Error reply. The server sends these for rejected commands.
    Error(String),

    /// 64-bit signed integer reply.
    Integer(i64),

    /// Binary-safe string. Requests are built entirely out of these.
    BulkString(Bytes),

    /// Null bulk string or null array. `GET` on a missing key and a
    /// `SET ... NX` that did not apply both answer with this.
    Null,

    /// Array of nested values.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Builds a request frame: an array of bulk strings, one per argument.
    ///
    /// # Example
    /// ```
    /// use flashbench::protocol::RespValue;
    /// let set = RespValue::command(["SET", "name", "value"]);
    /// assert_eq!(set.serialize(), b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$5\r\nvalue\r\n");
    /// ```
    pub fn command<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        RespValue::Array(
            parts
                .into_iter()
                .map(|part| RespValue::BulkString(part.into()))
                .collect(),
        )
    }

    /// Creates a bulk string value.
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// The `+OK` status reply.
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Serializes the value to its wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes into an existing buffer, so a connection can reuse one
    /// allocation across requests.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    /// Returns the payload of a bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the text of a simple string or a UTF-8 bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Consumes an array value and returns its elements.
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
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
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => write!(f, "(array of {})", values.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialize() {
        let value = RespValue::command(["GET", "name"]);
        assert_eq!(value.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    }

    #[test]
    fn test_command_with_binary_payload() {
        let payload = Bytes::from_static(b"a\r\nb");
        let value = RespValue::command([
            Bytes::from_static(b"SET"),
            Bytes::from_static(b"k"),
            payload,
        ]);
        assert_eq!(
            value.serialize(),
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$4\r\na\r\nb\r\n"
        );
    }

    #[test]
    fn test_null_serialize() {
        assert_eq!(RespValue::Null.serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_reply_serialize() {
        assert_eq!(RespValue::ok().serialize(), b"+OK\r\n");
        assert_eq!(RespValue::Error("ERR x".into()).serialize(), b"-ERR x\r\n");
        assert_eq!(RespValue::Integer(-7).serialize(), b":-7\r\n");
    }

    #[test]
    fn test_accessors() {
        let bulk = RespValue::bulk_string("hello");
        assert_eq!(bulk.as_bytes(), Some(&b"hello"[..]));
        assert_eq!(bulk.as_str(), Some("hello"));
        assert!(RespValue::Null.is_null());
        assert_eq!(RespValue::ok().as_str(), Some("OK"));
    }
}
