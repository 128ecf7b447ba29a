// Store - the public handle over keyspace, scripting and blocking pops
//
// Commands and scripts run one at a time under the execution lock. The only
// call that suspends is BZPOPMIN, and it never holds the lock while waiting.

use crate::blocking::{BlockingPop, BlockingWaiter};
use crate::config::StoreConfig;
use crate::connection::{ConnectionEvent, ConnectionShim, ConnectionStatus};
use crate::error::{CommandError, Result, StoreError};
use crate::interceptor::CommandInterceptor;
use crate::marshal::Value;
use crate::scripting::{LuaEngine, ScriptDefinition, ScriptRegistry};
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info};

struct StoreInner {
    config: StoreConfig,
    interceptor: CommandInterceptor,
    engine: Mutex<LuaEngine>,
    scripts: ScriptRegistry,
    connection: ConnectionShim,
}

/// In-process Redis stand-in. Cloning shares the same keyspace.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new() -> Result<Self> {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Result<Self> {
        let interceptor =
            CommandInterceptor::new(config.marker_suffix.clone(), config.notifier_capacity);
        let engine = LuaEngine::new(interceptor.clone(), &config)?;

        info!(
            "Store created (marker suffix {:?}, notifier capacity {})",
            config.marker_suffix, config.notifier_capacity
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                scripts: ScriptRegistry::new(config.patch_scripts),
                config,
                interceptor,
                engine: Mutex::new(engine),
                connection: ConnectionShim::new(),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    fn engine(&self) -> MutexGuard<'_, LuaEngine> {
        self.inner
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the execution lock, failing once disconnected
    fn exec<T>(&self, f: impl FnOnce(&LuaEngine) -> Result<T>) -> Result<T> {
        if !self.inner.connection.is_open() {
            return Err(StoreError::ConnectionClosed);
        }
        let engine = self.engine();
        f(&engine)
    }

    fn run(&self, args: &[Bytes]) -> Result<Value> {
        self.exec(|_| Ok(self.inner.interceptor.execute(args)?))
    }

    /// Generic entry point; `args[0]` is the command name.
    ///
    /// Registered script commands are callable by name, and BZPOPMIN takes
    /// the waiting path instead of the non-blocking one scripts see.
    pub async fn command(&self, args: &[Bytes]) -> Result<Value> {
        let Some((name, rest)) = args.split_first() else {
            return Err(CommandError::new("ERR empty command").into());
        };
        let name = String::from_utf8_lossy(name);

        if let Some(definition) = self.inner.scripts.command(&name) {
            return self.run_definition(&definition, rest);
        }

        match name.to_uppercase().as_str() {
            "BZPOPMIN" => {
                let [key, timeout] = rest else {
                    return Err(CommandError::new(
                        "ERR wrong number of arguments for 'bzpopmin' command",
                    )
                    .into());
                };
                let key = String::from_utf8_lossy(key);
                let timeout = std::str::from_utf8(timeout)
                    .ok()
                    .and_then(|t| t.parse::<f64>().ok())
                    .ok_or(StoreError::InvalidTimeout)?;
                Ok(self
                    .bzpopmin(&key, timeout)
                    .await?
                    .map_or(Value::Absent, BlockingPop::into_value))
            }
            "EVAL" | "EVALSHA" => {
                let (script, keys, argv) = split_eval_args(rest)?;
                let script = String::from_utf8_lossy(script);
                if name.eq_ignore_ascii_case("EVAL") {
                    self.eval(&script, keys, argv).await
                } else {
                    self.evalsha(&script, keys, argv).await
                }
            }
            "SCRIPT" => self.script_subcommand(rest),
            _ => self.run(args),
        }
    }

    fn script_subcommand(&self, args: &[Bytes]) -> Result<Value> {
        let Some((sub, rest)) = args.split_first() else {
            return Err(CommandError::new("ERR wrong number of arguments for 'script' command").into());
        };
        match String::from_utf8_lossy(sub).to_uppercase().as_str() {
            "LOAD" if rest.len() == 1 => {
                let sha = self.load_script(&String::from_utf8_lossy(&rest[0]))?;
                Ok(Value::from(sha))
            }
            "EXISTS" => Ok(Value::Array(
                rest.iter()
                    .map(|sha| {
                        let known = self.inner.scripts.exists(&String::from_utf8_lossy(sha));
                        Value::Int(known as i64)
                    })
                    .collect(),
            )),
            "FLUSH" => {
                self.inner.scripts.flush();
                Ok(Value::from("OK"))
            }
            _ => Err(CommandError::new("ERR unknown subcommand or wrong number of arguments for 'script'").into()),
        }
    }

    // ---- typed command API ----

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.run(&[bytes("GET"), bytes(key)]).map(optional_bytes)
    }

    pub async fn set(&self, key: &str, value: impl AsRef<[u8]>) -> Result<()> {
        self.run(&[bytes("SET"), bytes(key), bytes(value)])
            .map(|_| ())
    }

    pub async fn del(&self, keys: &[&str]) -> Result<i64> {
        let mut parts = vec![bytes("DEL")];
        parts.extend(keys.iter().map(bytes));
        self.run(&parts).map(integer)
    }

    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.run(&[bytes("INCR"), bytes(key)]).map(integer)
    }

    pub async fn incrby(&self, key: &str, increment: i64) -> Result<i64> {
        self.run(&[bytes("INCRBY"), bytes(key), bytes(increment.to_string())])
            .map(integer)
    }

    pub async fn zadd(&self, key: &str, score: f64, member: impl AsRef<[u8]>) -> Result<i64> {
        self.run(&[bytes("ZADD"), bytes(key), bytes(score.to_string()), bytes(member)])
            .map(integer)
    }

    pub async fn zpopmin(&self, key: &str) -> Result<Option<(Bytes, f64)>> {
        self.exec(|_| Ok(self.inner.interceptor.pop_min(key)?))
    }

    /// Pop the lowest-scored member of `key`, waiting up to `timeout_secs`
    /// (0 waits forever) for one to arrive. A timeout is `Ok(None)`.
    pub async fn bzpopmin(&self, key: &str, timeout_secs: f64) -> Result<Option<BlockingPop>> {
        if !self.inner.connection.is_open() {
            return Err(StoreError::ConnectionClosed);
        }

        let mut waiter = BlockingWaiter::new(
            key,
            timeout_secs,
            self.inner.interceptor.notifier(),
            self.inner.connection.watch(),
        )?;
        debug!("BZPOPMIN {} timeout {}", key, timeout_secs);

        waiter
            .wait(|key| self.exec(|_| Ok(self.inner.interceptor.pop_min(key)?)))
            .await
    }

    /// Best-effort stub; always 0
    pub async fn xtrim(&self, key: &str, args: &[&str]) -> Result<i64> {
        let mut parts = vec![bytes("XTRIM"), bytes(key)];
        parts.extend(args.iter().map(bytes));
        self.run(&parts).map(integer)
    }

    pub async fn hset(&self, key: &str, field: &str, value: impl AsRef<[u8]>) -> Result<i64> {
        self.run(&[bytes("HSET"), bytes(key), bytes(field), bytes(value)])
            .map(integer)
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        self.run(&[bytes("HGET"), bytes(key), bytes(field)])
            .map(optional_bytes)
    }

    /// Field/value pairs sorted by field
    pub async fn hgetall(&self, key: &str) -> Result<Vec<(Bytes, Bytes)>> {
        let reply = self.run(&[bytes("HGETALL"), bytes(key)])?;
        let items = reply.as_array().unwrap_or_default();
        Ok(items
            .chunks(2)
            .filter_map(|pair| match pair {
                [field, value] => Some((field.as_bytes()?.clone(), value.as_bytes()?.clone())),
                _ => None,
            })
            .collect())
    }

    // ---- scripting ----

    /// Register a named script command. The source is compiled once here to
    /// surface syntax errors, then patched and stored.
    pub fn define_command(&self, definition: ScriptDefinition) -> Result<()> {
        self.engine()
            .compile_check(&definition.name, &definition.source)?;
        let definition = self.inner.scripts.define(definition);
        info!(
            "Defined script command {} ({} keys)",
            definition.name, definition.number_of_keys
        );
        Ok(())
    }

    /// Call a registered command; the first `number_of_keys` args are keys
    pub async fn call_script(&self, name: &str, args: &[Bytes]) -> Result<Value> {
        let definition = self
            .inner
            .scripts
            .command(name)
            .ok_or_else(|| StoreError::UnknownScript(name.to_string()))?;
        self.run_definition(&definition, args)
    }

    fn run_definition(&self, definition: &ScriptDefinition, args: &[Bytes]) -> Result<Value> {
        if args.len() < definition.number_of_keys {
            return Err(StoreError::NotEnoughKeys {
                name: definition.name.clone(),
                expected: definition.number_of_keys,
                got: args.len(),
            });
        }
        let (keys, argv) = args.split_at(definition.number_of_keys);
        self.exec(|engine| engine.run_script(&definition.name, &definition.source, keys, argv))
    }

    pub async fn eval(&self, source: &str, keys: &[Bytes], argv: &[Bytes]) -> Result<Value> {
        let (sha, prepared) = self.inner.scripts.load(source);
        self.exec(|engine| engine.run_script(&format!("f_{}", sha), &prepared, keys, argv))
    }

    /// Cache a script and return its SHA1
    pub fn script_load(&self, source: &str) -> Result<String> {
        self.load_script(source)
    }

    fn load_script(&self, source: &str) -> Result<String> {
        let (sha, prepared) = self.inner.scripts.load(source);
        self.engine().compile_check(&format!("f_{}", sha), &prepared)?;
        Ok(sha)
    }

    pub async fn evalsha(&self, sha: &str, keys: &[Bytes], argv: &[Bytes]) -> Result<Value> {
        let source = self
            .inner
            .scripts
            .get(&sha.to_lowercase())
            .ok_or_else(|| StoreError::UnknownScript(sha.to_string()))?;
        self.exec(|engine| engine.run_script(&format!("f_{}", sha), &source, keys, argv))
    }

    // ---- lifecycle ----

    /// End the connection: status becomes `End`, `Close` and `End` are
    /// emitted and blocked pops fail with `ConnectionClosed`.
    pub fn disconnect(&self) -> bool {
        self.inner.connection.disconnect()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.connection.subscribe()
    }

    /// Live receivers on the marker channel, one per blocked pop
    pub fn marker_listener_count(&self) -> usize {
        self.inner.interceptor.notifier().listener_count()
    }
}

fn split_eval_args(args: &[Bytes]) -> Result<(&Bytes, &[Bytes], &[Bytes])> {
    let [script, numkeys, rest @ ..] = args else {
        return Err(CommandError::new("ERR wrong number of arguments for 'eval' command").into());
    };
    let numkeys = std::str::from_utf8(numkeys)
        .ok()
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| CommandError::new("ERR value is not an integer or out of range"))?;
    if numkeys > rest.len() {
        return Err(CommandError::new(
            "ERR Number of keys can't be greater than number of args",
        )
        .into());
    }
    let (keys, argv) = rest.split_at(numkeys);
    Ok((script, keys, argv))
}

fn bytes(part: impl AsRef<[u8]>) -> Bytes {
    Bytes::copy_from_slice(part.as_ref())
}

fn optional_bytes(value: Value) -> Option<Bytes> {
    value.into_bytes()
}

fn integer(value: Value) -> i64 {
    value.as_int().unwrap_or_default()
}
