// Protocol module - RESP reply values produced by command handlers
//
// There is no wire format here; handlers still answer in RESP shapes so the
// interceptor sees exactly what a real server would send back.

use crate::marshal::Value;
use bytes::Bytes;

/// RESP (REdis Serialization Protocol) value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(String),
    /// Error: -ERR unknown command\r\n
    Error(String),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $6\r\nfoobar\r\n (None for null bulk string)
    BulkString(Option<Bytes>),
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n (None for null array)
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        RespValue::Error(msg.into())
    }

    pub fn wrong_type() -> Self {
        RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
    }

    pub fn wrong_args(cmd: &str) -> Self {
        RespValue::Error(format!("ERR wrong number of arguments for '{}' command", cmd))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }
}

/// Raw reply to host value. Null shapes map to `Value::Null`; the interceptor
/// normalizes them afterwards.
impl From<RespValue> for Value {
    fn from(reply: RespValue) -> Self {
        match reply {
            RespValue::SimpleString(s) => Value::from(s),
            RespValue::Error(e) => Value::from(e),
            RespValue::Integer(i) => Value::Int(i),
            RespValue::BulkString(Some(data)) => Value::Str(data),
            RespValue::Array(Some(items)) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            RespValue::BulkString(None) | RespValue::Array(None) => Value::Null,
        }
    }
}
