//! Reply Types
//!
//! This module defines the values a command can answer with and how they are
//! rendered on the wire.
//!
//! ## Wire Format
//!
//! Every reply is one or more `\n`-terminated lines:
//!
//! | Reply            | Rendered as                       |
//! |------------------|-----------------------------------|
//! | `Simple("OK")`   | `OK`                              |
//! | `Error(msg)`     | `(error) msg`                     |
//! | `Integer(5)`     | `(integer) 5`                     |
//! | `Boolean(true)`  | `(boolean) true`                  |
//! | `Bulk("a b")`    | `"a b"`                           |
//! | `Nil`            | `(nil)`                           |
//! | `Array([a, b])`  | `(array) 2` then `"a"` and `"b"`  |
//!
//! Bulk strings are quoted with `"` and escape `\`, `"`, `\n`, `\r` and `\t`,
//! which the request tokenizer reads back.

use crate::storage::Value;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The line terminator used by the protocol
pub const LF: u8 = b'\n';

/// A command reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A short status line such as `OK` or `PONG`
    Simple(String),

    /// An error message
    Error(String),

    /// A signed integer
    Integer(i64),

    /// A yes/no answer
    Boolean(bool),

    /// A string value
    Bulk(String),

    /// No value
    Nil,

    /// A list of strings
    Array(Vec<String>),
}

impl Reply {
    /// The `OK` status.
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    /// Creates a new simple status reply.
    pub fn simple(s: impl Into<String>) -> Self {
        Reply::Simple(s.into())
    }

    /// Creates a new error reply.
    ///
    /// # Example
    /// ```
    /// use durakv::protocol::Reply;
    /// let err = Reply::error("unknown command 'fly'");
    /// assert!(err.is_error());
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Returns true if this is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Serializes the reply into wire bytes.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Array(items) => {
                buf.put_slice(format!("(array) {}", items.len()).as_bytes());
                buf.put_u8(LF);
                for item in items {
                    put_quoted(buf, item);
                    buf.put_u8(LF);
                }
            }
            other => {
                buf.put_slice(other.to_string().as_bytes());
                buf.put_u8(LF);
            }
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        match value {
            Value::Integer(n) => Reply::Integer(n),
            Value::String(s) => Reply::Bulk(s),
        }
    }
}

impl From<Option<Value>> for Reply {
    fn from(value: Option<Value>) -> Self {
        value.map(Reply::from).unwrap_or(Reply::Nil)
    }
}

fn put_quoted(buf: &mut BytesMut, s: &str) {
    buf.put_u8(b'"');
    for c in s.chars() {
        match c {
            '"' => buf.put_slice(b"\\\""),
            '\\' => buf.put_slice(b"\\\\"),
            '\n' => buf.put_slice(b"\\n"),
            '\r' => buf.put_slice(b"\\r"),
            '\t' => buf.put_slice(b"\\t"),
            c => {
                let mut utf8 = [0u8; 4];
                buf.put_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
    }
    buf.put_u8(b'"');
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Simple(s) => f.write_str(s),
            Reply::Error(e) => write!(f, "(error) {}", e),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Boolean(b) => write!(f, "(boolean) {}", b),
            Reply::Bulk(s) => {
                let mut buf = BytesMut::with_capacity(s.len() + 2);
                put_quoted(&mut buf, s);
                f.write_str(&String::from_utf8_lossy(&buf))
            }
            Reply::Nil => f.write_str("(nil)"),
            Reply::Array(items) => write!(f, "(array) {}", items.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_scalars() {
        assert_eq!(Reply::ok().serialize(), Bytes::from("OK\n"));
        assert_eq!(
            Reply::error("Key k does not exist").serialize(),
            Bytes::from("(error) Key k does not exist\n")
        );
        assert_eq!(Reply::Integer(-2).serialize(), Bytes::from("(integer) -2\n"));
        assert_eq!(
            Reply::Boolean(false).serialize(),
            Bytes::from("(boolean) false\n")
        );
        assert_eq!(Reply::Nil.serialize(), Bytes::from("(nil)\n"));
    }

    #[test]
    fn test_serialize_bulk_escapes() {
        let reply = Reply::Bulk("say \"hi\"\n".to_string());
        assert_eq!(reply.serialize(), Bytes::from("\"say \\\"hi\\\"\\n\"\n"));

        let reply = Reply::Bulk("héllo".to_string());
        assert_eq!(reply.serialize(), Bytes::from("\"héllo\"\n"));
    }

    #[test]
    fn test_serialize_array() {
        let reply = Reply::Array(vec!["a".to_string(), "b c".to_string()]);
        assert_eq!(reply.serialize(), Bytes::from("(array) 2\n\"a\"\n\"b c\"\n"));

        assert_eq!(Reply::Array(vec![]).serialize(), Bytes::from("(array) 0\n"));
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Reply::from(Value::Integer(3)), Reply::Integer(3));
        assert_eq!(Reply::from(Value::from("x")), Reply::Bulk("x".to_string()));
        assert_eq!(Reply::from(None::<Value>), Reply::Nil);
    }
}
