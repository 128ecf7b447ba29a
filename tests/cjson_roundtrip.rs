// Property test: cjson.decode(cjson.encode(v)) == v for null-free values

use mlua::prelude::*;
use proptest::prelude::*;
use redis_lua_mock::marshal::{from_lua, push_to_lua};
use redis_lua_mock::scripting::{modules, LuaBridge};
use redis_lua_mock::Value;
use std::collections::BTreeMap;

const SAFE: i64 = 9_007_199_254_740_991;

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        (-SAFE..=SAFE).prop_map(Value::Int),
        (-1.0e9f64..1.0e9)
            .prop_filter("non-integral", |f| f.fract() != 0.0)
            .prop_map(Value::Float),
        "\\PC{0,12}".prop_map(Value::from),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                .prop_map(|m: BTreeMap<String, Value>| Value::Map(m)),
        ]
    })
}

fn round_trip(bridge: &LuaBridge, input: &Value) -> Value {
    let lua = bridge.lua();
    let pushed = push_to_lua(lua, input).unwrap();
    lua.globals().set("input", pushed).unwrap();
    let output: LuaValue = lua
        .load("return cjson.decode(cjson.encode(input))")
        .eval()
        .unwrap();
    from_lua(output).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_cjson_round_trip(input in value()) {
        let bridge = LuaBridge::new();
        modules::install(&bridge).unwrap();
        prop_assert_eq!(round_trip(&bridge, &input), input);
    }
}

#[test]
fn test_nested_float_survives_exactly() {
    let bridge = LuaBridge::new();
    modules::install(&bridge).unwrap();

    let inner = Value::Map(BTreeMap::from([("a".to_string(), Value::Float(384063775.65889597))]));
    let input = Value::Map(BTreeMap::from([("a".to_string(), inner)]));
    assert_eq!(round_trip(&bridge, &input), input);
}

#[test]
fn test_encode_rejects_invalid_utf8() {
    let bridge = LuaBridge::new();
    modules::install(&bridge).unwrap();
    let (ok, msg): (bool, String) = bridge
        .lua()
        .load("local ok, e = pcall(cjson.encode, {name = '\\xff'}) return ok, tostring(e)")
        .eval()
        .unwrap();
    assert!(!ok);
    assert!(msg.contains("invalid UTF-8"));
}

#[test]
fn test_decode_failure_is_a_lua_error() {
    let bridge = LuaBridge::new();
    modules::install(&bridge).unwrap();
    let (ok, msg): (bool, String) = bridge
        .lua()
        .load("local ok, e = pcall(cjson.decode, '{\"a\":') return ok, tostring(e)")
        .eval()
        .unwrap();
    assert!(!ok);
    assert!(msg.contains("Expected value"));
}
