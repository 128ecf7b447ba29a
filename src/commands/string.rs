// String and keyspace command handlers

use super::{parse_int, parse_key};
use crate::protocol::RespValue;
use crate::storage::{Keyspace, RedisValue};
use bytes::Bytes;

/// GET key
pub fn get(ks: &Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 1 {
        return RespValue::wrong_args("get");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    match ks.get(&key) {
        Some(RedisValue::String(data)) => RespValue::BulkString(Some(data.clone())),
        Some(_) => RespValue::wrong_type(),
        None => RespValue::BulkString(None),
    }
}

/// SET key value [NX|XX] [EX seconds|PX milliseconds|KEEPTTL]
///
/// Expiry options are accepted for call compatibility; keys never expire.
pub fn set(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() < 2 {
        return RespValue::wrong_args("set");
    }

    let key = match parse_key(&args[0]) {
        Ok(k) => k,
        Err(e) => return e,
    };

    let mut nx = false; // Only set if key doesn't exist
    let mut xx = false; // Only set if key exists

    let mut i = 2;
    while i < args.len() {
        let option = String::from_utf8_lossy(&args[i]).to_uppercase();
        match option.as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "KEEPTTL" => {}
            "EX" | "PX" | "EXAT" | "PXAT" => {
                let Some(amount) = args.get(i + 1) else {
                    return RespValue::error("ERR syntax error");
                };
                if let Err(e) = parse_int(amount) {
                    return e;
                }
                i += 1;
            }
            _ => return RespValue::error("ERR syntax error"),
        }
        i += 1;
    }

    if nx && xx {
        return RespValue::error("ERR syntax error");
    }

    let exists = ks.exists(&key);
    if (nx && exists) || (xx && !exists) {
        return RespValue::BulkString(None);
    }

    ks.set(key, RedisValue::String(args[1].clone()));
    RespValue::ok()
}

/// DEL key [key ...]
pub fn del(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.is_empty() {
        return RespValue::wrong_args("del");
    }

    let mut deleted = 0;
    for arg in args {
        let key = match parse_key(arg) {
            Ok(k) => k,
            Err(e) => return e,
        };
        if ks.delete(&key) {
            deleted += 1;
        }
    }
    RespValue::Integer(deleted)
}

/// EXISTS key [key ...]
pub fn exists(ks: &Keyspace, args: &[Bytes]) -> RespValue {
    if args.is_empty() {
        return RespValue::wrong_args("exists");
    }

    let mut count = 0;
    for arg in args {
        match parse_key(arg) {
            Ok(key) if ks.exists(&key) => count += 1,
            Ok(_) => {}
            Err(e) => return e,
        }
    }
    RespValue::Integer(count)
}

/// INCR key
pub fn incr(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 1 {
        return RespValue::wrong_args("incr");
    }
    incr_by(ks, &args[0], 1)
}

/// DECR key
pub fn decr(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 1 {
        return RespValue::wrong_args("decr");
    }
    incr_by(ks, &args[0], -1)
}

/// INCRBY key increment
pub fn incrby(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 2 {
        return RespValue::wrong_args("incrby");
    }
    match parse_int(&args[1]) {
        Ok(n) => incr_by(ks, &args[0], n),
        Err(e) => e,
    }
}

/// DECRBY key decrement
pub fn decrby(ks: &mut Keyspace, args: &[Bytes]) -> RespValue {
    if args.len() != 2 {
        return RespValue::wrong_args("decrby");
    }
    match parse_int(&args[1]) {
        Ok(n) => match n.checked_neg() {
            Some(neg) => incr_by(ks, &args[0], neg),
            None => RespValue::error("ERR decrement would overflow"),
        },
        Err(e) => e,
    }
}

fn incr_by(ks: &mut Keyspace, key: &Bytes, increment: i64) -> RespValue {
    let key = match parse_key(key) {
        Ok(k) => k,
        Err(e) => return e,
    };

    let current = match ks.get(&key) {
        Some(RedisValue::String(bytes)) => match parse_int(bytes) {
            Ok(n) => n,
            Err(e) => return e,
        },
        Some(_) => return RespValue::wrong_type(),
        None => 0,
    };

    let Some(next) = current.checked_add(increment) else {
        return RespValue::error("ERR increment or decrement would overflow");
    };

    ks.set(key, RedisValue::String(Bytes::from(next.to_string())));
    RespValue::Integer(next)
}

/// FLUSHDB / FLUSHALL
pub fn flushdb(ks: &mut Keyspace) -> RespValue {
    ks.clear();
    RespValue::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    #[test]
    fn test_set_get() {
        let mut ks = Keyspace::new();
        assert_eq!(set(&mut ks, &args(&["k", "v"])), RespValue::ok());
        assert_eq!(get(&ks, &args(&["k"])), RespValue::bulk("v"));
        assert_eq!(get(&ks, &args(&["missing"])), RespValue::BulkString(None));
    }

    #[test]
    fn test_set_nx_xx() {
        let mut ks = Keyspace::new();
        assert_eq!(set(&mut ks, &args(&["k", "v", "XX"])), RespValue::BulkString(None));
        assert_eq!(set(&mut ks, &args(&["k", "v", "NX", "PX", "100"])), RespValue::ok());
        assert_eq!(set(&mut ks, &args(&["k", "w", "NX"])), RespValue::BulkString(None));
        assert!(set(&mut ks, &args(&["k", "w", "EX"])).is_error());
    }

    #[test]
    fn test_incr_family() {
        let mut ks = Keyspace::new();
        assert_eq!(incr(&mut ks, &args(&["ctr"])), RespValue::Integer(1));
        assert_eq!(incrby(&mut ks, &args(&["ctr", "41"])), RespValue::Integer(42));
        assert_eq!(decrby(&mut ks, &args(&["ctr", "2"])), RespValue::Integer(40));
        assert_eq!(decr(&mut ks, &args(&["ctr"])), RespValue::Integer(39));
        assert_eq!(get(&ks, &args(&["ctr"])), RespValue::bulk("39"));
    }

    #[test]
    fn test_incr_rejects_non_integer() {
        let mut ks = Keyspace::new();
        set(&mut ks, &args(&["k", "abc"]));
        assert!(incr(&mut ks, &args(&["k"])).is_error());

        set(&mut ks, &args(&["max", &i64::MAX.to_string()]));
        assert!(incr(&mut ks, &args(&["max"])).is_error());
    }

    #[test]
    fn test_del_exists() {
        let mut ks = Keyspace::new();
        set(&mut ks, &args(&["a", "1"]));
        set(&mut ks, &args(&["b", "2"]));
        assert_eq!(exists(&ks, &args(&["a", "b", "c"])), RespValue::Integer(2));
        assert_eq!(del(&mut ks, &args(&["a", "c"])), RespValue::Integer(1));
        assert_eq!(exists(&ks, &args(&["a"])), RespValue::Integer(0));
    }
}
