// Conversions between host values and Lua values

use super::value::Value;
use bytes::Bytes;
use mlua::prelude::*;
use std::collections::BTreeMap;
use std::ffi::c_void;
use thiserror::Error;

/// Largest integer a double represents exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Same nesting limit lua-cjson enforces
const MAX_DEPTH: usize = 1000;

#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("Cannot serialise table: cyclic reference")]
    Cyclic,

    #[error("Cannot serialise, excessive nesting ({0})")]
    TooDeep(usize),

    #[error("Cannot serialise {0}")]
    Unsupported(&'static str),

    #[error("table key must be a number or string")]
    BadKey,

    #[error("Lua error: {0}")]
    Lua(#[from] LuaError),
}

fn is_safe_integer(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER
}

/// Pick the Lua numeric subtype for a host number.
///
/// Integral values go through the integer subtype so `tostring` and `..`
/// render `1`, not `1.0`.
pub fn lua_number(n: f64) -> LuaValue {
    if is_safe_integer(n) {
        LuaValue::Integer(n as i64)
    } else {
        LuaValue::Number(n)
    }
}

/// Push a host value into the VM.
///
/// `Null` and `Absent` both become `nil`. Arrays become 1-indexed tables;
/// an array with holes (or an empty one) gets a `__len` metamethod carrying
/// its real length.
pub fn push_to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
    match value {
        Value::Absent | Value::Null => Ok(LuaValue::Nil),
        Value::Bool(b) => Ok(LuaValue::Boolean(*b)),
        Value::Int(i) => Ok(LuaValue::Integer(*i)),
        Value::Float(f) => Ok(lua_number(*f)),
        Value::Str(b) => Ok(LuaValue::String(lua.create_string(b)?)),
        Value::Array(items) => push_array(lua, items),
        Value::Map(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                if item.is_nullish() {
                    continue;
                }
                table.raw_set(key.as_str(), push_to_lua(lua, item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
    }
}

fn push_array(lua: &Lua, items: &[Value]) -> LuaResult<LuaValue> {
    let table = lua.create_table()?;
    let mut has_holes = false;
    for (i, item) in items.iter().enumerate() {
        if item.is_nullish() {
            has_holes = true;
            continue;
        }
        table.raw_set(i + 1, push_to_lua(lua, item)?)?;
    }
    if has_holes || items.is_empty() {
        attach_length(lua, &table, items.len())?;
    }
    Ok(LuaValue::Table(table))
}

/// Give a table an explicit length so `#t` sees trailing and inner holes
pub fn attach_length(lua: &Lua, table: &LuaTable, len: usize) -> LuaResult<()> {
    let len = len as i64;
    let meta = lua.create_table()?;
    meta.raw_set("__len", lua.create_function(move |_, _: LuaMultiValue| Ok(len))?)?;
    table.set_metatable(Some(meta));
    Ok(())
}

/// Convert a Lua value into a host value.
///
/// Integral numbers come back as `Int`. A table is an array when its keys
/// are exactly `1..=n`, or when it carries an explicit `__len`; otherwise it
/// is a map with stringified keys.
pub fn from_lua(value: LuaValue) -> Result<Value, MarshalError> {
    let mut path = Vec::new();
    convert(value, &mut path)
}

fn convert(value: LuaValue, path: &mut Vec<*const c_void>) -> Result<Value, MarshalError> {
    match value {
        LuaValue::Nil => Ok(Value::Absent),
        LuaValue::Boolean(b) => Ok(Value::Bool(b)),
        LuaValue::Integer(i) => Ok(Value::Int(i)),
        LuaValue::Number(n) if is_safe_integer(n) => Ok(Value::Int(n as i64)),
        LuaValue::Number(n) => Ok(Value::Float(n)),
        LuaValue::String(s) => Ok(Value::Str(Bytes::from(s.as_bytes().to_vec()))),
        LuaValue::Table(table) => convert_table(table, path),
        other => Err(MarshalError::Unsupported(other.type_name())),
    }
}

fn convert_table(table: LuaTable, path: &mut Vec<*const c_void>) -> Result<Value, MarshalError> {
    let ptr = table.to_pointer();
    if path.contains(&ptr) {
        return Err(MarshalError::Cyclic);
    }
    if path.len() >= MAX_DEPTH {
        return Err(MarshalError::TooDeep(path.len() + 1));
    }

    let explicit_len = match table.metatable() {
        Some(meta) if !meta.raw_get::<LuaValue>("__len")?.is_nil() => Some(table.len()?.max(0) as usize),
        _ => None,
    };

    let mut entries = Vec::new();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        entries.push(pair?);
    }

    path.push(ptr);
    let result = if let Some(len) = array_len(&entries, explicit_len) {
        let mut items = vec![Value::Absent; len];
        for (key, item) in entries {
            if let Some(index) = array_index(&key) {
                items[index - 1] = convert(item, path)?;
            }
        }
        Value::Array(items)
    } else {
        let mut map = BTreeMap::new();
        for (key, item) in entries {
            map.insert(key_to_string(&key)?, convert(item, path)?);
        }
        Value::Map(map)
    };
    path.pop();

    Ok(result)
}

fn array_index(key: &LuaValue) -> Option<usize> {
    match key {
        LuaValue::Integer(i) if *i >= 1 => Some(*i as usize),
        LuaValue::Number(n) if is_safe_integer(*n) && *n >= 1.0 => Some(*n as usize),
        _ => None,
    }
}

fn array_len(entries: &[(LuaValue, LuaValue)], explicit_len: Option<usize>) -> Option<usize> {
    let len = match explicit_len {
        Some(len) => len,
        None if entries.is_empty() => return None,
        None => entries.len(),
    };
    entries
        .iter()
        .all(|(key, _)| array_index(key).is_some_and(|i| i <= len))
        .then_some(len)
}

fn key_to_string(key: &LuaValue) -> Result<String, MarshalError> {
    match key {
        LuaValue::String(s) => Ok(String::from_utf8_lossy(&s.as_bytes()).into_owned()),
        LuaValue::Integer(i) => Ok(i.to_string()),
        LuaValue::Number(n) => Ok(n.to_string()),
        _ => Err(MarshalError::BadKey),
    }
}

/// Build a 1-indexed table of Lua strings, as used for `KEYS` and `ARGV`
pub fn string_table(lua: &Lua, items: &[Bytes]) -> LuaResult<LuaTable> {
    let table = lua.create_table()?;
    for (i, item) in items.iter().enumerate() {
        table.raw_set(i + 1, lua.create_string(item)?)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat(lua: &Lua, n: f64) -> String {
        lua.globals().set("n", lua_number(n)).unwrap();
        lua.load(r#"return "k:" .. n"#).eval::<String>().unwrap()
    }

    #[test]
    fn test_integer_fidelity() {
        let lua = Lua::new();
        for n in [0.0, 1.0, 42.0, MAX_SAFE_INTEGER] {
            assert_eq!(concat(&lua, n), format!("k:{}", n as i64));
        }
    }

    #[test]
    fn test_fractional_stays_float() {
        let lua = Lua::new();
        assert_eq!(concat(&lua, 1.5), "k:1.5");
        assert!(matches!(lua_number(1e300), LuaValue::Number(_)));
    }

    #[test]
    fn test_holey_array_keeps_length() {
        let lua = Lua::new();
        let value = Value::Array(vec![Value::Int(1), Value::Null, Value::Int(3), Value::Absent]);
        lua.globals().set("t", push_to_lua(&lua, &value).unwrap()).unwrap();

        let len: i64 = lua.load("return #t").eval().unwrap();
        assert_eq!(len, 4);
        let third: i64 = lua.load("return t[3]").eval().unwrap();
        assert_eq!(third, 3);
    }

    #[test]
    fn test_array_round_trip() {
        let lua = Lua::new();
        let value = Value::Array(vec![Value::str("a"), Value::Absent, Value::Int(2)]);
        let pushed = push_to_lua(&lua, &value).unwrap();
        assert_eq!(from_lua(pushed).unwrap(), value);
    }

    #[test]
    fn test_empty_array_survives() {
        let lua = Lua::new();
        let pushed = push_to_lua(&lua, &Value::Array(vec![])).unwrap();
        assert_eq!(from_lua(pushed).unwrap(), Value::Array(vec![]));

        let plain: LuaValue = lua.load("return {}").eval().unwrap();
        assert_eq!(from_lua(plain).unwrap(), Value::Map(BTreeMap::new()));
    }

    #[test]
    fn test_table_shapes() {
        let lua = Lua::new();
        let seq: LuaValue = lua.load("return {10, 20, 30}").eval().unwrap();
        assert_eq!(
            from_lua(seq).unwrap(),
            Value::Array(vec![Value::Int(10), Value::Int(20), Value::Int(30)])
        );

        let sparse: LuaValue = lua.load("return {[1] = 'a', [3] = 'c'}").eval().unwrap();
        let map = from_lua(sparse).unwrap();
        assert_eq!(map.as_map().unwrap()["3"], Value::str("c"));
    }

    #[test]
    fn test_cycle_detected() {
        let lua = Lua::new();
        let cyclic: LuaValue = lua.load("local t = {} t.self = t return t").eval().unwrap();
        assert!(matches!(from_lua(cyclic), Err(MarshalError::Cyclic)));
    }

    #[test]
    fn test_shared_subtable_is_not_a_cycle() {
        let lua = Lua::new();
        let shared: LuaValue = lua
            .load("local s = {1} return {a = s, b = s}")
            .eval()
            .unwrap();
        assert!(from_lua(shared).is_ok());
    }

    #[test]
    fn test_functions_rejected() {
        let lua = Lua::new();
        let func: LuaValue = lua.load("return function() end").eval().unwrap();
        assert!(matches!(from_lua(func), Err(MarshalError::Unsupported("function"))));
    }
}
