// Command interceptor - the single entry point for every command a store runs
//
// Host API calls and `redis.call` from scripts both land here. Replies are
// normalized before anyone sees them, and ZADDs to marker keys wake waiters.

use crate::commands::dispatch;
use crate::commands::zset::format_score;
use crate::error::CommandError;
use crate::marshal::{normalize_nulls, Value};
use crate::pubsub::MarkerNotifier;
use crate::storage::Keyspace;
use bytes::Bytes;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Best-effort commands answered with a constant `0`
pub const STUBBED_COMMANDS: &[&str] = &["XTRIM", "PUBLISH"];

/// Commands whose replies are always integers
const COUNTER_COMMANDS: &[&str] = &["INCR", "INCRBY", "DECR", "DECRBY", "HINCRBY"];

/// `if <operand> ~= false then` / `if <operand> ~= nil then`, also as
/// `elseif` and with the comparison in parentheses. An operand is a path,
/// optionally followed by one call with non-nested arguments.
static NULL_GUARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    const OPERAND: &str = r#"[A-Za-z_][\w.:\[\]'"]*(?:\([^()]*\))?"#;
    let pattern = format!(
        r"\b(if|elseif)\s+(?:\(\s*({op})\s*~=\s*(?:false|nil)\s*\)\s*|({op})\s*~=\s*(?:false|nil)\s+)then\b",
        op = OPERAND
    );
    Regex::new(&pattern).expect("null guard regex is valid")
});

/// Rewrite explicit `~= false` / `~= nil` guards into plain truthiness tests.
///
/// Missing values reach scripts as `nil`, and a guard written against
/// `false` would otherwise let `nil` through.
pub fn patch_script_source(source: &str) -> Cow<'_, str> {
    NULL_GUARD_RE.replace_all(source, |caps: &Captures| {
        let operand = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        format!("{} {} then", &caps[1], operand)
    })
}

/// Force counter replies to integers so Lua concatenation renders `k:1`.
pub fn coerce_counter(value: Value) -> Value {
    match value {
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Value::Int(f as i64),
        Value::Str(s) => match std::str::from_utf8(&s).ok().and_then(|s| s.parse::<i64>().ok()) {
            Some(n) => Value::Int(n),
            None => Value::Str(s),
        },
        other => other,
    }
}

struct State {
    keyspace: Keyspace,
    /// Marker keys written by the running script, published on commit
    deferred: Option<Vec<String>>,
}

struct Inner {
    state: Mutex<State>,
    notifier: MarkerNotifier,
    marker_suffix: String,
}

#[derive(Clone)]
pub struct CommandInterceptor {
    inner: Arc<Inner>,
}

impl CommandInterceptor {
    pub fn new(marker_suffix: impl Into<String>, notifier_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    keyspace: Keyspace::new(),
                    deferred: None,
                }),
                notifier: MarkerNotifier::new(notifier_capacity),
                marker_suffix: marker_suffix.into(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notifier(&self) -> &MarkerNotifier {
        &self.inner.notifier
    }

    /// An empty suffix makes every sorted-set key a marker key
    pub fn is_marker_key(&self, key: &[u8]) -> bool {
        key.ends_with(self.inner.marker_suffix.as_bytes())
    }

    /// Run one command; `args[0]` is the command name
    pub fn execute(&self, args: &[Bytes]) -> Result<Value, CommandError> {
        let Some((name, rest)) = args.split_first() else {
            return Err(CommandError::new(
                "ERR Please specify at least one argument for this redis lib call",
            ));
        };
        let name = String::from_utf8_lossy(name);
        let cmd = name.to_uppercase();

        if STUBBED_COMMANDS.contains(&cmd.as_str()) {
            warn!("{} is not supported, answering 0", cmd);
            return Ok(Value::Int(0));
        }

        debug!("Executing {} with {} args", cmd, rest.len());

        let mut publish = None;
        let reply = {
            let mut state = self.state();
            let reply = dispatch(&mut state.keyspace, &name, rest);

            if cmd == "ZADD" && !reply.is_error() {
                if let Some(key) = rest.first().filter(|k| self.is_marker_key(k)) {
                    let key = String::from_utf8_lossy(key).into_owned();
                    match state.deferred.as_mut() {
                        Some(pending) => pending.push(key),
                        None => publish = Some(key),
                    }
                }
            }
            reply
        };

        if let Some(key) = publish {
            let listeners = self.inner.notifier.publish(&key);
            debug!("Marker {} published to {} listeners", key, listeners);
        }

        if let crate::protocol::RespValue::Error(msg) = reply {
            return Err(CommandError(msg));
        }

        let value = normalize_nulls(&Value::from(reply));
        if COUNTER_COMMANDS.contains(&cmd.as_str()) {
            return Ok(coerce_counter(value));
        }
        Ok(value)
    }

    /// Run a command whose arguments come from Lua
    pub fn execute_values(&self, args: &[Value]) -> Result<Value, CommandError> {
        let args = args
            .iter()
            .map(command_arg)
            .collect::<Result<Vec<_>, _>>()?;
        self.execute(&args)
    }

    /// Non-blocking pop through the normal command path
    pub fn pop_min(&self, key: &str) -> Result<Option<(Bytes, f64)>, CommandError> {
        let reply = self.execute(&[Bytes::from_static(b"ZPOPMIN"), Bytes::from(key.to_string())])?;
        let Some([member, score]) = reply.as_array().and_then(|items| items.get(..2)) else {
            return Ok(None);
        };
        let (Some(member), Some(score)) = (member.as_bytes(), score.as_bytes()) else {
            return Err(CommandError::new("ERR unexpected ZPOPMIN reply"));
        };
        let score = std::str::from_utf8(score)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| CommandError::new("ERR unexpected ZPOPMIN reply"))?;
        Ok(Some((member.clone(), score)))
    }

    /// Open the undo journal and start deferring marker notifications
    pub fn begin_script(&self) {
        let mut state = self.state();
        state.keyspace.begin_journal();
        state.deferred = Some(Vec::new());
    }

    /// Keep the script's writes and publish what it deferred
    pub fn commit_script(&self) {
        let pending = {
            let mut state = self.state();
            state.keyspace.commit_journal();
            state.deferred.take().unwrap_or_default()
        };
        for key in pending {
            self.inner.notifier.publish(&key);
        }
    }

    /// Undo the script's writes; returns how many keys were restored
    pub fn rollback_script(&self) -> usize {
        let mut state = self.state();
        state.deferred = None;
        state.keyspace.rollback_journal()
    }

    /// Number of keys currently stored
    pub fn dbsize(&self) -> usize {
        self.state().keyspace.len()
    }
}

fn command_arg(value: &Value) -> Result<Bytes, CommandError> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Int(n) => Ok(Bytes::from(n.to_string())),
        Value::Float(f) => Ok(format_score(*f)),
        _ => Err(CommandError::new(
            "ERR Lua redis lib command arguments must be strings or integers",
        )),
    }
}
