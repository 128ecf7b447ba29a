// Lua script execution engine
//
// One interpreter per store. Scripts run to completion against the
// interceptor; a failing script is rolled back as a whole.

use super::bridge::LuaBridge;
use super::modules;
use super::script_cache::compute_sha1;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::interceptor::CommandInterceptor;
use crate::marshal::lua::string_table;
use crate::marshal::{from_lua, Value};
use bytes::Bytes;
use mlua::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const LOG_LEVELS: &str =
    "redis.LOG_DEBUG = 0 redis.LOG_VERBOSE = 1 redis.LOG_NOTICE = 2 redis.LOG_WARNING = 3";

pub struct LuaEngine {
    bridge: LuaBridge,
    interceptor: CommandInterceptor,
}

impl LuaEngine {
    pub fn new(interceptor: CommandInterceptor, config: &StoreConfig) -> Result<Self> {
        let bridge = LuaBridge::new();
        if config.lua_memory_limit > 0 {
            bridge.lua().set_memory_limit(config.lua_memory_limit)?;
        }

        modules::install(&bridge)?;
        install_redis_api(&bridge, &interceptor)?;

        info!("Lua engine ready");
        Ok(Self {
            bridge,
            interceptor,
        })
    }

    /// Compile without running, so syntax errors surface at registration
    pub fn compile_check(&self, name: &str, source: &str) -> Result<()> {
        self.bridge
            .lua()
            .load(source)
            .set_name(format!("={}", name))
            .into_function()
            .map(|_| ())
            .map_err(|e| StoreError::Script {
                name: name.to_string(),
                message: root_message(&e),
            })
    }

    /// Run `source` with `KEYS` and `ARGV` installed and convert its result
    /// the way Redis converts script replies.
    pub fn run_script(
        &self,
        name: &str,
        source: &str,
        keys: &[Bytes],
        argv: &[Bytes],
    ) -> Result<Value> {
        let lua = self.bridge.lua();
        let globals = lua.globals();
        globals.set("KEYS", string_table(lua, keys)?)?;
        globals.set("ARGV", string_table(lua, argv)?)?;

        debug!("Running script {} ({} keys, {} args)", name, keys.len(), argv.len());

        self.interceptor.begin_script();
        let outcome = lua
            .load(source)
            .set_name(format!("={}", name))
            .eval::<LuaValue>()
            .map_err(|e| root_message(&e))
            .and_then(|value| from_lua(value).map_err(|e| e.to_string()))
            .and_then(script_reply);

        match outcome {
            Ok(value) => {
                self.interceptor.commit_script();
                Ok(value)
            }
            Err(message) => {
                let restored = self.interceptor.rollback_script();
                warn!("Script {} failed, rolled back {} keys: {}", name, restored, message);
                Err(StoreError::Script {
                    name: name.to_string(),
                    message,
                })
            }
        }
    }
}

fn install_redis_api(bridge: &LuaBridge, interceptor: &CommandInterceptor) -> LuaResult<()> {
    let ic = interceptor.clone();
    bridge.define_function("__redis_call", move |args: Vec<Value>| ic.execute_values(&args))?;

    let ic = interceptor.clone();
    bridge.define_function("__redis_pcall", move |args: Vec<Value>| {
        Ok::<_, String>(match ic.execute_values(&args) {
            Ok(value) => value,
            Err(e) => reply_table("err", e.0),
        })
    })?;

    bridge.define_function("__redis_status_reply", |args: Vec<Value>| {
        text_arg(args, "status_reply").map(|s| reply_table("ok", s))
    })?;
    bridge.define_function("__redis_error_reply", |args: Vec<Value>| {
        text_arg(args, "error_reply").map(|s| reply_table("err", s))
    })?;
    bridge.define_function("__redis_sha1hex", |args: Vec<Value>| {
        text_arg(args, "sha1hex").map(|s| Value::from(compute_sha1(&s)))
    })?;
    bridge.define_function("__redis_log", |args: Vec<Value>| redis_log(args))?;

    bridge.define_global_object(
        "redis",
        &[
            ("call", "__redis_call"),
            ("pcall", "__redis_pcall"),
            ("status_reply", "__redis_status_reply"),
            ("error_reply", "__redis_error_reply"),
            ("sha1hex", "__redis_sha1hex"),
            ("log", "__redis_log"),
        ],
    )?;
    bridge.lua().load(LOG_LEVELS).set_name("=redis").exec()
}

fn reply_table(field: &str, text: String) -> Value {
    Value::Map(BTreeMap::from([(field.to_string(), Value::from(text))]))
}

fn text_arg(args: Vec<Value>, func: &str) -> std::result::Result<String, String> {
    match args.into_iter().next() {
        Some(Value::Str(s)) => Ok(String::from_utf8_lossy(&s).into_owned()),
        Some(Value::Int(n)) => Ok(n.to_string()),
        Some(Value::Float(f)) => Ok(f.to_string()),
        _ => Err(format!("wrong number or type of arguments to redis.{}", func)),
    }
}

/// `redis.log(level, message...)`, routed to tracing
fn redis_log(args: Vec<Value>) -> std::result::Result<Value, String> {
    let mut args = args.into_iter();
    let level = args
        .next()
        .and_then(|v| v.as_int())
        .ok_or_else(|| "First argument must be a number (log level).".to_string())?;

    let message = args
        .map(|v| match v {
            Value::Str(s) => String::from_utf8_lossy(&s).into_owned(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            other => other.type_name().to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");

    match level {
        0 => debug!(target: "redis_lua", "{}", message),
        1 | 2 => info!(target: "redis_lua", "{}", message),
        3 => warn!(target: "redis_lua", "{}", message),
        _ => return Err("Invalid debug level.".to_string()),
    }
    Ok(Value::Absent)
}

/// Convert a script's return value into a reply.
///
/// Numbers are truncated to integers, `true` becomes 1 and `false` becomes
/// nil. `{err = ...}` fails the script; `{ok = ...}` is a status reply.
fn script_reply(value: Value) -> std::result::Result<Value, String> {
    match value {
        Value::Map(mut map) => {
            if let Some(err) = map.remove("err") {
                return Err(reply_text(err));
            }
            if let Some(ok) = map.remove("ok") {
                return Ok(Value::from(reply_text(ok)));
            }
            Ok(reply_value(Value::Map(map)))
        }
        other => Ok(reply_value(other)),
    }
}

fn reply_value(value: Value) -> Value {
    match value {
        Value::Float(f) => Value::Int(f.trunc() as i64),
        Value::Bool(true) => Value::Int(1),
        Value::Bool(false) | Value::Null | Value::Absent => Value::Absent,
        // Only the sequence part of a table survives, up to the first nil
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .take_while(|v| !v.is_nullish())
                .map(reply_value)
                .collect(),
        ),
        Value::Map(mut map) => {
            if let Some(err) = map.remove("err") {
                return Value::from(reply_text(err));
            }
            if let Some(ok) = map.remove("ok") {
                return Value::from(reply_text(ok));
            }
            let mut items = Vec::new();
            while let Some(item) = map.remove(&(items.len() + 1).to_string()) {
                if item.is_nullish() {
                    break;
                }
                items.push(reply_value(item));
            }
            Value::Array(items)
        }
        other => other,
    }
}

fn reply_text(value: Value) -> String {
    match value {
        Value::Str(s) => String::from_utf8_lossy(&s).into_owned(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        other => other.type_name().to_string(),
    }
}

/// The innermost message of a Lua error, without callback wrapping
pub fn root_message(err: &LuaError) -> String {
    match err {
        LuaError::CallbackError { cause, .. } => root_message(cause),
        LuaError::RuntimeError(msg) | LuaError::SyntaxError { message: msg, .. } => msg.clone(),
        LuaError::ExternalError(e) => e.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LuaEngine {
        LuaEngine::new(CommandInterceptor::new(":marker", 16), &StoreConfig::default()).unwrap()
    }

    fn run(engine: &LuaEngine, source: &str, keys: &[&str], argv: &[&str]) -> Result<Value> {
        let to_bytes = |items: &[&str]| -> Vec<Bytes> {
            items.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()
        };
        engine.run_script("test", source, &to_bytes(keys), &to_bytes(argv))
    }

    #[test]
    fn test_keys_and_argv() {
        let engine = engine();
        let result = run(&engine, "return {KEYS[1], ARGV[2], #ARGV}", &["k"], &["a", "b"]).unwrap();
        assert_eq!(
            result,
            Value::Array(vec![Value::str("k"), Value::str("b"), Value::Int(2)])
        );
    }

    #[test]
    fn test_counter_concatenation() {
        let engine = engine();
        let result = run(
            &engine,
            "return 'k:' .. redis.call('INCR', KEYS[1])",
            &["ctr"],
            &[],
        )
        .unwrap();
        assert_eq!(result, Value::str("k:1"));
    }

    #[test]
    fn test_reply_conversion() {
        let engine = engine();
        assert_eq!(run(&engine, "return 3.7", &[], &[]).unwrap(), Value::Int(3));
        assert_eq!(run(&engine, "return true", &[], &[]).unwrap(), Value::Int(1));
        assert_eq!(run(&engine, "return false", &[], &[]).unwrap(), Value::Absent);
        assert_eq!(
            run(&engine, "return redis.status_reply('QUEUED')", &[], &[]).unwrap(),
            Value::str("QUEUED")
        );
        assert_eq!(
            run(&engine, "return {1, 2, nil, 4}", &[], &[]).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_error_reply_fails_script() {
        let engine = engine();
        let err = run(&engine, "return redis.error_reply('bad job')", &[], &[]).unwrap_err();
        assert_eq!(err.to_string(), "ERR Error running script 'test': bad job");
    }

    #[test]
    fn test_failure_rolls_back_writes() {
        let engine = engine();
        let err = run(
            &engine,
            "redis.call('SET', KEYS[1], 'v') return cjson.decode('{oops')",
            &["k"],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Script { .. }));
        assert_eq!(run(&engine, "return redis.call('GET', 'k')", &[], &[]).unwrap(), Value::Absent);
    }

    #[test]
    fn test_pcall_returns_error_table() {
        let engine = engine();
        let result = run(
            &engine,
            "local r = redis.pcall('NOPE') return r.err",
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(result, Value::str("ERR unknown command 'NOPE'"));
    }

    #[test]
    fn test_call_error_message() {
        let engine = engine();
        run(&engine, "redis.call('SET', 's', 'x')", &[], &[]).unwrap();
        let err = run(&engine, "return redis.call('HGET', 's', 'f')", &[], &[]).unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));
    }

    #[test]
    fn test_log_and_sha1hex() {
        let engine = engine();
        run(&engine, "redis.log(redis.LOG_WARNING, 'hello', 1)", &[], &[]).unwrap();
        assert_eq!(
            run(&engine, "return redis.sha1hex('')", &[], &[]).unwrap(),
            Value::str("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
    }

    #[test]
    fn test_compile_check() {
        let engine = engine();
        assert!(engine.compile_check("ok", "return 1").is_ok());
        assert!(engine.compile_check("broken", "return (").is_err());
    }
}
