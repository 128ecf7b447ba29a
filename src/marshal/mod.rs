// Marshal module - host <-> Lua value conversion

pub mod lua;
pub mod value;

pub use lua::{from_lua, lua_number, push_to_lua, MarshalError};
pub use value::{normalize_nulls, Value};
