// Scripting module - embedded Lua, module shims and script registry

pub mod bridge;
pub mod lua_engine;
pub mod modules;
pub mod script_cache;

pub use bridge::LuaBridge;
pub use lua_engine::LuaEngine;
pub use script_cache::{compute_sha1, ScriptDefinition, ScriptRegistry};
