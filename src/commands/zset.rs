// Sorted Set (ZSet) command handlers

use super::{parse_float, parse_int, parse_key};
use crate::protocol::RespValue;
use crate::storage::{Keyspace, RedisValue, ZSet};
use bytes::Bytes;

/// Redis renders scores without a trailing ".0"; `f64` Display does the same.
pub fn format_score(score: f64) -> Bytes {
    Bytes::from(score.to_string())
}

/// ZADD key score member [score member ...]
pub fn zadd(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() < 3 || args.len() % 2 == 0 {
        return RespValue::wrong_args("zadd");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    // Validate every score before touching the set
    let mut pairs = Vec::with_capacity((args.len() - 1) / 2);
    for chunk in args[1..].chunks(2) {
        match parse_float(&chunk[0]) {
            Ok(score) => pairs.push((score, chunk[1].clone())),
            Err(e) => return e,
        }
    }

    let mut zset = match ks.get(&key) {
        Some(RedisValue::ZSet(z)) => z.clone(),
        Some(_) => return RespValue::wrong_type(),
        None => ZSet::new(),
    };

    let mut added = 0;
    for (score, member) in pairs {
        if zset.insert(member, score) {
            added += 1;
        }
    }

    ks.set(key, RedisValue::ZSet(zset));
    RespValue::Integer(added)
}

/// ZREM key member [member ...]
pub fn zrem(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() < 2 {
        return RespValue::wrong_args("zrem");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    let mut zset = match ks.get(&key) {
        Some(RedisValue::ZSet(z)) => z.clone(),
        Some(_) => return RespValue::wrong_type(),
        None => return RespValue::Integer(0),
    };

    let mut removed = 0;
    for member in &args[1..] {
        if zset.remove(member) {
            removed += 1;
        }
    }

    if removed > 0 {
        store_or_delete(ks, key, zset);
    }
    RespValue::Integer(removed)
}

/// ZSCORE key member
pub fn zscore(ks: &Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 2 {
        return RespValue::wrong_args("zscore");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    match ks.get(&key) {
        Some(RedisValue::ZSet(zset)) => {
            RespValue::BulkString(zset.score(&args[1]).map(format_score))
        }
        Some(_) => RespValue::wrong_type(),
        None => RespValue::BulkString(None),
    }
}

/// ZCARD key
pub fn zcard(ks: &Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 1 {
        return RespValue::wrong_args("zcard");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    match ks.get(&key) {
        Some(RedisValue::ZSet(zset)) => RespValue::Integer(zset.len() as i64),
        Some(_) => RespValue::wrong_type(),
        None => RespValue::Integer(0),
    }
}

/// ZRANGE key start stop [WITHSCORES]
pub fn zrange(ks: &Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() < 3 || args.len() > 4 {
        return RespValue::wrong_args("zrange");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    let start = match parse_int(&args[1]) {
        Ok(n) => n,
        Err(e) => return e,
    };

    let stop = match parse_int(&args[2]) {
        Ok(n) => n,
        Err(e) => return e,
    };

    let with_scores = match args.get(3) {
        Some(opt) if opt.eq_ignore_ascii_case(b"WITHSCORES") => true,
        Some(_) => return RespValue::error("ERR syntax error"),
        None => false,
    };

    let zset = match ks.get(&key) {
        Some(RedisValue::ZSet(z)) => z,
        Some(_) => return RespValue::wrong_type(),
        None => return RespValue::Array(Some(vec![])),
    };

    let len = zset.len() as i64;

    // Normalize negative indices
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start >= len || start > stop {
        return RespValue::Array(Some(vec![]));
    }

    let mut result = Vec::new();
    for (member, score) in zset
        .iter()
        .skip(start as usize)
        .take((stop - start + 1) as usize)
    {
        result.push(RespValue::BulkString(Some(member.clone())));
        if with_scores {
            result.push(RespValue::BulkString(Some(format_score(score))));
        }
    }
    RespValue::Array(Some(result))
}

/// ZPOPMIN key [count]
pub fn zpopmin(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.is_empty() || args.len() > 2 {
        return RespValue::wrong_args("zpopmin");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    let count = match args.get(1) {
        Some(raw) => match parse_int(raw) {
            Ok(n) if n >= 0 => n as usize,
            Ok(_) => return RespValue::error("ERR value is out of range, must be positive"),
            Err(e) => return e,
        },
        None => 1,
    };

    let mut result = Vec::new();
    for _ in 0..count {
        match pop_min(ks, &key) {
            Ok(Some((member, score))) => {
                result.push(RespValue::BulkString(Some(member)));
                result.push(RespValue::BulkString(Some(format_score(score))));
            }
            Ok(None) => break,
            Err(e) => return e,
        }
    }
    RespValue::Array(Some(result))
}

/// BZPOPMIN key [key ...] timeout
///
/// Non-blocking form: returns the first available entry or a null reply.
/// The store routes top-level calls through its waiting path instead.
pub fn bzpopmin(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() < 2 {
        return RespValue::wrong_args("bzpopmin");
    }

    let (timeout, keys) = match args.split_last() {
        Some(split) => split,
        None => return RespValue::wrong_args("bzpopmin"),
    };

    match parse_float(timeout) {
        Ok(t) if t < 0.0 => return RespValue::error("ERR timeout is negative"),
        Ok(_) => {}
        Err(_) => return RespValue::error("ERR timeout is not a float or out of range"),
    }

    for raw in keys {
        let key = match parse_key(raw) {
            Ok(k) => k,
            Err(e) => return e,
        };
        match pop_min(ks, &key) {
            Ok(Some((member, score))) => {
                return RespValue::Array(Some(vec![
                    RespValue::BulkString(Some(raw.clone())),
                    RespValue::BulkString(Some(member)),
                    RespValue::BulkString(Some(format_score(score))),
                ]));
            }
            Ok(None) => continue,
            Err(e) => return e,
        }
    }
    RespValue::Array(None)
}

/// Pop the lowest-scored entry of `key`, deleting the key once it is empty.
pub fn pop_min(ks: &mut Keyspace, key: &str) -> Result<Option<(Bytes, f64)>, RespValue> {
    let mut zset = match ks.get(key) {
        Some(RedisValue::ZSet(z)) => z.clone(),
        Some(_) => return Err(RespValue::wrong_type()),
        None => return Ok(None),
    };

    let popped = zset.pop_min();
    if popped.is_some() {
        store_or_delete(ks, key.to_string(), zset);
    }
    Ok(popped)
}

fn store_or_delete(ks: &mut Keyspace, key: String, zset: ZSet) {
    if zset.is_empty() {
        ks.delete(&key);
    } else {
        ks.set(key, RedisValue::ZSet(zset));
    }
}
