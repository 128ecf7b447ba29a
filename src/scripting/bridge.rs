// Lua bridge - host functions exposed as Lua globals

use crate::marshal::{from_lua, push_to_lua, Value};
use mlua::prelude::*;
use std::fmt::Display;

/// Wraps one Lua interpreter and the host functions registered on it.
///
/// Each store owns its own bridge, so globals never leak between stores.
pub struct LuaBridge {
    lua: Lua,
}

impl LuaBridge {
    pub fn new() -> Self {
        Self { lua: Lua::new() }
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Register `host_fn` as the Lua global `name`.
    ///
    /// Arguments are converted to host values before the call. An `Err` from
    /// the host function is raised as a Lua runtime error, which aborts the
    /// calling script unless it is inside `pcall`. Exactly one value is
    /// returned to Lua.
    pub fn define_function<F, E>(&self, name: &str, host_fn: F) -> LuaResult<()>
    where
        F: Fn(Vec<Value>) -> Result<Value, E> + Send + 'static,
        E: Display,
    {
        let fn_name = name.to_string();
        let func = self.lua.create_function(move |lua, args: LuaMultiValue| {
            let args = args
                .into_iter()
                .map(from_lua)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| LuaError::RuntimeError(format!("{}: {}", fn_name, e)))?;
            let result = host_fn(args).map_err(|e| LuaError::RuntimeError(e.to_string()))?;
            push_to_lua(lua, &result)
        })?;
        self.lua.globals().set(name, func)
    }

    /// Bind a table under `name` whose fields point at existing globals.
    ///
    /// `methods` maps field name to the global function it references, e.g.
    /// `("encode", "__cjson_encode")`.
    pub fn define_global_object(&self, name: &str, methods: &[(&str, &str)]) -> LuaResult<()> {
        if !is_identifier(name) {
            return Err(LuaError::RuntimeError(format!("invalid Lua identifier '{}'", name)));
        }

        let mut fields = Vec::with_capacity(methods.len());
        for (field, global) in methods {
            if !is_identifier(field) || !is_identifier(global) {
                return Err(LuaError::RuntimeError(format!(
                    "invalid method mapping '{}' -> '{}'",
                    field, global
                )));
            }
            fields.push(format!("{} = {}", field, global));
        }

        let chunk = format!("{} = {{ {} }}", name, fields.join(", "));
        self.lua.load(&chunk).set_name(format!("={}", name)).exec()
    }
}

impl Default for LuaBridge {
    fn default() -> Self {
        Self::new()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
