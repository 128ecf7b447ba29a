// Command dispatcher

use super::{hash, string, zset};
use crate::protocol::RespValue;
use crate::storage::Keyspace;
use bytes::Bytes;

/// Commands this keyspace understands. Anything else is an unknown command.
pub const SUPPORTED_COMMANDS: &[&str] = &[
    "GET", "SET", "DEL", "EXISTS", "INCR", "INCRBY", "DECR", "DECRBY", "FLUSHDB", "FLUSHALL",
    "HSET", "HGET", "HGETALL", "HDEL", "HINCRBY", "ZADD", "ZREM", "ZSCORE", "ZCARD", "ZRANGE",
    "ZPOPMIN", "BZPOPMIN",
];

/// Run one command against the keyspace. `cmd` is matched case-insensitively.
pub fn dispatch(ks: &mut Keyspace, cmd: &str, args: &[Bytes]) -> RespValue {
    match cmd.to_uppercase().as_str() {
        // String commands
        "GET" => string::get(ks, args),
        "SET" => string::set(ks, args),
        "DEL" => string::del(ks, args),
        "EXISTS" => string::exists(ks, args),
        "INCR" => string::incr(ks, args),
        "INCRBY" => string::incrby(ks, args),
        "DECR" => string::decr(ks, args),
        "DECRBY" => string::decrby(ks, args),
        "FLUSHDB" | "FLUSHALL" => string::flushdb(ks),

        // Hash commands
        "HSET" => hash::hset(ks, args),
        "HGET" => hash::hget(ks, args),
        "HGETALL" => hash::hgetall(ks, args),
        "HDEL" => hash::hdel(ks, args),
        "HINCRBY" => hash::hincrby(ks, args),

        // Sorted set commands
        "ZADD" => zset::zadd(ks, args),
        "ZREM" => zset::zrem(ks, args),
        "ZSCORE" => zset::zscore(ks, args),
        "ZCARD" => zset::zcard(ks, args),
        "ZRANGE" => zset::zrange(ks, args),
        "ZPOPMIN" => zset::zpopmin(ks, args),
        "BZPOPMIN" => zset::bzpopmin(ks, args),

        _ => RespValue::Error(format!("ERR unknown command '{}'", cmd)),
    }
}
