// Keyspace implementation

use super::types::RedisValue;
use std::collections::HashMap;

/// The in-memory keyspace of one store.
///
/// While a journal is open every write records the key's prior value once,
/// so a failed script can be undone as a whole.
#[derive(Debug, Default)]
pub struct Keyspace {
    /// Main key-value storage
    data: HashMap<String, RedisValue>,
    /// Prior values of keys touched since `begin_journal`
    journal: Option<HashMap<String, Option<RedisValue>>>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&RedisValue> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: String, value: RedisValue) {
        self.record(&key);
        self.data.insert(key, value);
    }

    pub fn delete(&mut self, key: &str) -> bool {
        if !self.data.contains_key(key) {
            return false;
        }
        self.record(key);
        self.data.remove(key).is_some()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        let keys: Vec<String> = self.data.keys().cloned().collect();
        for key in &keys {
            self.record(key);
        }
        self.data.clear();
    }

    fn record(&mut self, key: &str) {
        if let Some(journal) = &mut self.journal {
            if !journal.contains_key(key) {
                journal.insert(key.to_string(), self.data.get(key).cloned());
            }
        }
    }

    /// Start recording undo information
    pub fn begin_journal(&mut self) {
        self.journal = Some(HashMap::new());
    }

    /// Keep all writes; returns how many keys were touched
    pub fn commit_journal(&mut self) -> usize {
        self.journal.take().map_or(0, |journal| journal.len())
    }

    /// Undo every write since `begin_journal`; returns how many keys were restored
    pub fn rollback_journal(&mut self) -> usize {
        let Some(journal) = self.journal.take() else {
            return 0;
        };
        let restored = journal.len();
        for (key, prior) in journal {
            match prior {
                Some(value) => {
                    self.data.insert(key, value);
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
        restored
    }
}
