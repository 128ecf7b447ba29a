// cjson / cmsgpack shims for the embedded Lua environment

use super::bridge::LuaBridge;
use crate::marshal::{normalize_nulls, Value};
use bytes::Bytes;
use mlua::prelude::*;

/// Install `cjson` and `cmsgpack` on a bridge.
///
/// Every shim reports failures as errors so the enclosing script aborts,
/// matching what the C modules do inside Redis.
pub fn install(bridge: &LuaBridge) -> LuaResult<()> {
    bridge.define_function("__cjson_encode", |args: Vec<Value>| cjson_encode(first(args)))?;
    bridge.define_function("__cjson_decode", |args: Vec<Value>| cjson_decode(first(args)))?;
    bridge.define_function("__cmsgpack_pack", cmsgpack_pack)?;
    bridge.define_function("__cmsgpack_unpack", |args: Vec<Value>| {
        cmsgpack_unpack(first(args))
    })?;

    bridge.define_global_object(
        "cjson",
        &[("encode", "__cjson_encode"), ("decode", "__cjson_decode")],
    )?;
    bridge.define_global_object(
        "cmsgpack",
        &[("pack", "__cmsgpack_pack"), ("unpack", "__cmsgpack_unpack")],
    )
}

fn first(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or_default()
}

pub fn cjson_encode(value: Value) -> Result<Value, String> {
    check_encodable(&value)?;
    serde_json::to_string(&value)
        .map(Value::from)
        .map_err(|e| format!("Cannot serialise: {}", e))
}

fn check_encodable(value: &Value) -> Result<(), String> {
    match value {
        Value::Float(f) if !f.is_finite() => {
            Err("Cannot serialise number: must not be NaN or Infinity".to_string())
        }
        Value::Str(b) if std::str::from_utf8(b).is_err() => {
            Err("Cannot serialise string: invalid UTF-8".to_string())
        }
        Value::Array(items) => items.iter().try_for_each(check_encodable),
        Value::Map(map) => map.values().try_for_each(check_encodable),
        _ => Ok(()),
    }
}

pub fn cjson_decode(text: Value) -> Result<Value, String> {
    let bytes = match text {
        Value::Str(b) => b,
        other => {
            return Err(format!(
                "bad argument #1 to 'decode' (string expected, got {})",
                other.type_name()
            ))
        }
    };
    serde_json::from_slice::<Value>(&bytes)
        .map(|v| normalize_nulls(&v))
        .map_err(|e| format!("Expected value but found invalid token: {}", e))
}

pub fn cmsgpack_unpack(buffer: Value) -> Result<Value, String> {
    let bytes = match buffer {
        Value::Str(b) => b,
        other => {
            return Err(format!(
                "bad argument #1 to 'unpack' (string expected, got {})",
                other.type_name()
            ))
        }
    };
    rmp_serde::from_slice::<Value>(&bytes)
        .map(|v| normalize_nulls(&v))
        .map_err(|e| format!("cmsgpack.unpack: {}", e))
}

/// Multiple arguments are packed back to back, as cmsgpack does
pub fn cmsgpack_pack(args: Vec<Value>) -> Result<Value, String> {
    let mut out = Vec::new();
    for value in &args {
        rmp_serde::encode::write(&mut out, value).map_err(|e| format!("cmsgpack.pack: {}", e))?;
    }
    Ok(Value::Str(Bytes::from(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bridge() -> LuaBridge {
        let bridge = LuaBridge::new();
        install(&bridge).unwrap();
        bridge
    }

    #[test]
    fn test_cjson_encode_decode_in_lua() {
        let bridge = bridge();
        let out: String = bridge
            .lua()
            .load(r#"local t = cjson.decode('{"id":7,"name":"job"}') return t.name .. ":" .. t.id"#)
            .eval()
            .unwrap();
        assert_eq!(out, "job:7");

        let encoded: String = bridge
            .lua()
            .load(r#"return cjson.encode({1, 2, 3})"#)
            .eval()
            .unwrap();
        assert_eq!(encoded, "[1,2,3]");
    }

    #[test]
    fn test_cjson_decode_nulls_become_nil() {
        let bridge = bridge();
        let (missing, len): (bool, i64) = bridge
            .lua()
            .load(r#"local t = cjson.decode('{"a":null,"b":[1,null,3]}') return t.a == nil, #t.b"#)
            .eval()
            .unwrap();
        assert!(missing);
        assert_eq!(len, 3);
    }

    #[test]
    fn test_cjson_decode_malformed_raises() {
        let bridge = bridge();
        let err = bridge.lua().load("return cjson.decode('{nope')").exec().unwrap_err();
        assert!(err.to_string().contains("invalid token"));
    }

    #[test]
    fn test_cjson_encode_cycle_raises() {
        let bridge = bridge();
        let err = bridge
            .lua()
            .load("local t = {} t.t = t return cjson.encode(t)")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn test_cjson_encode_rejects_non_finite() {
        assert!(cjson_encode(Value::Float(f64::INFINITY)).is_err());
        assert!(bridge().lua().load("return cjson.encode(0/0)").exec().is_err());
    }

    #[test]
    fn test_cmsgpack_unpack_normalizes_nested_nulls() {
        let packed = rmp_serde::to_vec(&json!({"opts": {"delay": null}, "ids": [1, null]})).unwrap();
        let value = cmsgpack_unpack(Value::Str(Bytes::from(packed))).unwrap();

        let map = value.as_map().unwrap();
        assert_eq!(map["opts"].as_map().unwrap()["delay"], Value::Absent);
        assert_eq!(map["ids"], Value::Array(vec![Value::Int(1), Value::Absent]));
    }

    #[test]
    fn test_cmsgpack_pack_unpack_in_lua() {
        let bridge = bridge();
        let out: String = bridge
            .lua()
            .load(r#"local t = cmsgpack.unpack(cmsgpack.pack({name = "x", n = 3})) return t.name .. t.n"#)
            .eval()
            .unwrap();
        assert_eq!(out, "x3");
    }

    #[test]
    fn test_cmsgpack_unpack_rejects_garbage() {
        assert!(cmsgpack_unpack(Value::str([0xc1u8])).is_err());
        assert!(cmsgpack_unpack(Value::Int(1)).is_err());
    }
}
