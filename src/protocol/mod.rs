//! RESP Client Codec
//!
//! This module implements the client half of the Redis Serialization Protocol (RESP),
//! which the `resp` backend uses to talk to any Redis-compatible server.
//!
//! ## Overview
//!
//! A client only ever sends one shape of message: an array of bulk strings
//! (`*3\r\n$3\r\nSET\r\n...`). Replies, on the other hand, can be any RESP type,
//! so the parser handles the full set.
//!
//! ## Modules
//!
//! - `types`: The `RespValue` enum and its wire serialization
//! - `parser`: Incremental parser for server replies
//!
//! ## Example
//!
//! ```
//! use flashbench::protocol::{parse_message, RespValue};
//!
//! let request = RespValue::command(["GET", "key-0"]);
//! assert_eq!(request.serialize(), b"*2\r\n$3\r\nGET\r\n$5\r\nkey-0\r\n");
//!
//! let (reply, consumed) = parse_message(b"$5\r\nhello\r\n").unwrap().unwrap();
//! assert_eq!(reply.as_bytes(), Some(&b"hello"[..]));
//! assert_eq!(consumed, 11);
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
