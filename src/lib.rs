// In-process Redis stand-in with Lua scripting and blocking pops

pub mod blocking;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod interceptor;
pub mod marshal;
pub mod protocol;
pub mod pubsub;
pub mod scripting;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use blocking::{BlockingPop, BlockingWaiter, WaiterState};
pub use config::StoreConfig;
pub use connection::{ConnectionEvent, ConnectionStatus};
pub use error::{CommandError, Result, StoreError};
pub use interceptor::{patch_script_source, CommandInterceptor};
pub use marshal::{normalize_nulls, Value};
pub use protocol::RespValue;
pub use pubsub::MarkerNotifier;
pub use scripting::{LuaBridge, ScriptDefinition};
pub use storage::{Keyspace, RedisValue};
pub use store::Store;
