// Storage module - Keyspace and data structures

pub mod db;
pub mod types;

pub use db::Keyspace;
pub use types::{RedisValue, ZSet};
