// Hash command handlers

use super::{parse_int, parse_key};
use crate::protocol::RespValue;
use crate::storage::{Keyspace, RedisValue};
use bytes::Bytes;
use std::collections::HashMap;

/// HSET key field value [field value ...]
pub fn hset(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() < 3 || args.len() % 2 == 0 {
        return RespValue::wrong_args("hset");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    let mut hash = match ks.get(&key) {
        Some(RedisValue::Hash(h)) => h.clone(),
        Some(_) => return RespValue::wrong_type(),
        None => HashMap::new(),
    };

    let mut added = 0;
    for chunk in args[1..].chunks(2) {
        if hash.insert(chunk[0].clone(), chunk[1].clone()).is_none() {
            added += 1;
        }
    }

    ks.set(key, RedisValue::Hash(hash));
    RespValue::Integer(added)
}

/// HGET key field
pub fn hget(ks: &Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 2 {
        return RespValue::wrong_args("hget");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    match ks.get(&key) {
        Some(RedisValue::Hash(hash)) => RespValue::BulkString(hash.get(&args[1]).cloned()),
        Some(_) => RespValue::wrong_type(),
        None => RespValue::BulkString(None),
    }
}

/// HGETALL key
///
/// Fields come back sorted so replies are stable across runs.
pub fn hgetall(ks: &Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 1 {
        return RespValue::wrong_args("hgetall");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    match ks.get(&key) {
        Some(RedisValue::Hash(hash)) => {
            let mut fields: Vec<_> = hash.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));

            let mut result = Vec::with_capacity(fields.len() * 2);
            for (field, value) in fields {
                result.push(RespValue::BulkString(Some(field.clone())));
                result.push(RespValue::BulkString(Some(value.clone())));
            }
            RespValue::Array(Some(result))
        }
        Some(_) => RespValue::wrong_type(),
        None => RespValue::Array(Some(vec![])),
    }
}

/// HDEL key field [field ...]
pub fn hdel(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() < 2 {
        return RespValue::wrong_args("hdel");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    let mut hash = match ks.get(&key) {
        Some(RedisValue::Hash(h)) => h.clone(),
        Some(_) => return RespValue::wrong_type(),
        None => return RespValue::Integer(0),
    };

    let mut deleted = 0;
    for field in &args[1..] {
        if hash.remove(field).is_some() {
            deleted += 1;
        }
    }

    if deleted > 0 {
        if hash.is_empty() {
            ks.delete(&key);
        } else {
            ks.set(key, RedisValue::Hash(hash));
        }
    }
    RespValue::Integer(deleted)
}

/// HINCRBY key field increment
pub fn hincrby(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 3 {
        return RespValue::wrong_args("hincrby");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    let increment = match parse_int(&args[2]) {
        Ok(n) => n,
        Err(e) => return e,
    };

    let mut hash = match ks.get(&key) {
        Some(RedisValue::Hash(h)) => h.clone(),
        Some(_) => return RespValue::wrong_type(),
        None => HashMap::new(),
    };

    let current = match hash.get(&args[1]) {
        Some(value) => match parse_int(value) {
            Ok(n) => n,
            Err(_) => return RespValue::error("ERR hash value is not an integer"),
        },
        None => 0,
    };

    let Some(next) = current.checked_add(increment) else {
        return RespValue::error("ERR increment or decrement would overflow");
    };

    hash.insert(args[1].clone(), Bytes::from(next.to_string()));
    ks.set(key, RedisValue::Hash(hash));
    RespValue::Integer(next)
}
