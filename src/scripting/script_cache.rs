// Script registry - named command definitions and SHA1-addressed scripts

use crate::interceptor::patch_script_source;
use dashmap::DashMap;
use sha1::{Digest, Sha1};
use std::sync::Arc;

/// Compute SHA1 hash of script content
pub fn compute_sha1(script: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(script.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A named command backed by Lua source.
///
/// The first `number_of_keys` call arguments become `KEYS`, the rest `ARGV`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDefinition {
    pub name: String,
    pub source: String,
    pub number_of_keys: usize,
}

impl ScriptDefinition {
    pub fn new(name: impl Into<String>, source: impl Into<String>, number_of_keys: usize) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            number_of_keys,
        }
    }
}

/// Registered scripts for one store.
///
/// Source text is patched once here, at registration; calls always see the
/// patched text.
pub struct ScriptRegistry {
    commands: DashMap<String, Arc<ScriptDefinition>>,
    scripts: DashMap<String, Arc<str>>,
    patch: bool,
}

impl ScriptRegistry {
    pub fn new(patch: bool) -> Self {
        Self {
            commands: DashMap::new(),
            scripts: DashMap::new(),
            patch,
        }
    }

    fn prepare(&self, source: &str) -> String {
        if self.patch {
            patch_script_source(source).into_owned()
        } else {
            source.to_string()
        }
    }

    /// Register a named command, replacing any previous one with that name
    pub fn define(&self, definition: ScriptDefinition) -> Arc<ScriptDefinition> {
        let prepared = Arc::new(ScriptDefinition {
            source: self.prepare(&definition.source),
            ..definition
        });
        self.commands
            .insert(prepared.name.clone(), Arc::clone(&prepared));
        prepared
    }

    pub fn command(&self, name: &str) -> Option<Arc<ScriptDefinition>> {
        self.commands.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Load a script and return the SHA1 of its original text
    pub fn load(&self, script: &str) -> (String, Arc<str>) {
        let sha1 = compute_sha1(script);
        let prepared: Arc<str> = self
            .scripts
            .entry(sha1.clone())
            .or_insert_with(|| Arc::from(self.prepare(script)))
            .value()
            .clone();
        (sha1, prepared)
    }

    /// Get a script by its SHA1 hash
    pub fn get(&self, sha1: &str) -> Option<Arc<str>> {
        self.scripts.get(sha1).map(|entry| Arc::clone(entry.value()))
    }

    pub fn exists(&self, sha1: &str) -> bool {
        self.scripts.contains_key(sha1)
    }

    /// Flush SHA1-addressed scripts; named commands stay registered
    pub fn flush(&self) {
        self.scripts.clear();
    }
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_computation() {
        let sha1 = compute_sha1("return 'hello'");
        assert_eq!(sha1.len(), 40);
        assert_eq!(compute_sha1(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_define_patches_once() {
        let registry = ScriptRegistry::new(true);
        let def = registry.define(ScriptDefinition::new(
            "moveToActive",
            "local id = redis.call('GET', KEYS[1])\nif id ~= false then return id end",
            1,
        ));

        assert!(def.source.contains("if id then"));
        assert_eq!(registry.command("moveToActive").unwrap(), def);
        assert!(registry.command("missing").is_none());
    }

    #[test]
    fn test_patching_can_be_disabled() {
        let registry = ScriptRegistry::new(false);
        let def = registry.define(ScriptDefinition::new("x", "if a ~= nil then end", 0));
        assert_eq!(def.source, "if a ~= nil then end");
    }

    #[test]
    fn test_load_uses_original_sha() {
        let registry = ScriptRegistry::default();
        let script = "if KEYS[1] ~= false then return 1 end";

        let (sha1, prepared) = registry.load(script);
        assert_eq!(sha1, compute_sha1(script));
        assert_eq!(&*prepared, "if KEYS[1] then return 1 end");
        assert!(registry.exists(&sha1));

        registry.flush();
        assert!(!registry.exists(&sha1));
    }
}
