//! # Reply Model
//!
//! Purpose: Wrap one parsed server reply as an owned, typed, recursive value
//! with fallible accessors.
//!
//! ## Design Principles
//! 1. **Owned Payloads**: Replies deep-copy their bytes at parse time, so a
//!    reply may outlive the read callback that produced it.
//! 2. **No Coercion**: Each getter matches exactly one kind and fails with a
//!    type error otherwise.
//! 3. **Recursive Structure**: Arrays hold child replies, nested arbitrarily.

use crate::error::{RedisError, RedisResult};

/// The six reply kinds of the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Status,
    Error,
    Integer,
    Nil,
    Bulk,
    Array,
}

impl Kind {
    /// Human-readable kind name, used in type-error messages.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Status => "STATUS",
            Kind::Error => "ERROR",
            Kind::Integer => "INTEGER",
            Kind::Nil => "NIL",
            Kind::Bulk => "STRING",
            Kind::Array => "ARRAY",
        }
    }
}

/// One typed unit of server response data.
///
/// An empty `Array` is a valid reply and distinct from `Nil`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// +OK style status line.
    Status(String),
    /// -ERR style error line.
    Error(String),
    /// :123 signed 64-bit integer.
    Integer(i64),
    /// Nil marker ($-1 or *-1).
    Nil,
    /// Bulk byte string, binary-safe.
    Bulk(Vec<u8>),
    /// Ordered list of child replies.
    Array(Vec<Reply>),
}

impl Reply {
    pub fn kind(&self) -> Kind {
        match self {
            Reply::Status(_) => Kind::Status,
            Reply::Error(_) => Kind::Error,
            Reply::Integer(_) => Kind::Integer,
            Reply::Nil => Kind::Nil,
            Reply::Bulk(_) => Kind::Bulk,
            Reply::Array(_) => Kind::Array,
        }
    }

    pub fn is_kind(&self, kind: Kind) -> bool {
        self.kind() == kind
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Bulk payload bytes.
    pub fn get_string(&self) -> RedisResult<&[u8]> {
        match self {
            Reply::Bulk(data) => Ok(data),
            other => Err(other.type_error("get_string", Kind::Bulk)),
        }
    }

    /// Status line text.
    pub fn get_status(&self) -> RedisResult<&str> {
        match self {
            Reply::Status(text) => Ok(text),
            other => Err(other.type_error("get_status", Kind::Status)),
        }
    }

    /// Error line text as returned by the server.
    pub fn get_error(&self) -> RedisResult<&str> {
        match self {
            Reply::Error(text) => Ok(text),
            other => Err(other.type_error("get_error", Kind::Error)),
        }
    }

    pub fn get_int(&self) -> RedisResult<i64> {
        match self {
            Reply::Integer(value) => Ok(*value),
            other => Err(other.type_error("get_int", Kind::Integer)),
        }
    }

    /// Ordered child replies of an array reply.
    pub fn get_array(&self) -> RedisResult<&[Reply]> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(other.type_error("get_array", Kind::Array)),
        }
    }

    /// Consumes an array reply, yielding its children.
    pub fn into_array(self) -> RedisResult<Vec<Reply>> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(other.type_error("into_array", Kind::Array)),
        }
    }

    fn type_error(&self, getter: &str, want: Kind) -> RedisError {
        RedisError::Type(format!(
            "called {}() on a {} reply, expected {}",
            getter,
            self.kind().name(),
            want.name()
        ))
    }

    /// Renders the reply as a human-readable recursive tree.
    pub fn pprint(&self) -> String {
        let mut out = String::new();
        self.pprint_to(&mut out);
        out
    }

    fn pprint_to(&self, out: &mut String) {
        match self {
            Reply::Integer(value) => {
                out.push_str("{ INTEGER: (");
                out.push_str(&value.to_string());
                out.push_str(")}");
            }
            Reply::Bulk(data) => {
                out.push_str("{ STRING: '");
                out.push_str(&String::from_utf8_lossy(data));
                out.push_str("'}");
            }
            Reply::Status(text) => {
                out.push_str("{ STATUS: '");
                out.push_str(text);
                out.push_str("'}");
            }
            Reply::Error(text) => {
                out.push_str("{ ERROR: '");
                out.push_str(text);
                out.push_str("'}");
            }
            Reply::Nil => out.push_str("{ NIL }"),
            Reply::Array(items) => {
                out.push_str("{ ARRAY: [");
                for child in items {
                    out.push_str("\n\t");
                    child.pprint_to(out);
                    out.push(',');
                }
                out.push_str("\n]}");
            }
        }
    }
}
