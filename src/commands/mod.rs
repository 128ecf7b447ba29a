// Commands module - Command handlers over a single keyspace

pub mod dispatcher;
pub mod hash;
pub mod string;
pub mod zset;

pub use dispatcher::dispatch;

use crate::protocol::RespValue;

/// Keys are addressed as UTF-8 strings
pub(crate) fn parse_key(arg: &[u8]) -> Result<String, RespValue> {
    match std::str::from_utf8(arg) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => Err(RespValue::error("ERR invalid key")),
    }
}

pub(crate) fn parse_int(arg: &[u8]) -> Result<i64, RespValue> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| RespValue::error("ERR value is not an integer or out of range"))
}

pub(crate) fn parse_float(arg: &[u8]) -> Result<f64, RespValue> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or_else(|| RespValue::error("ERR value is not a valid float"))
}
