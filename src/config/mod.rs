// Configuration for a store instance
// Built in code with the builder methods, or loaded from a redis.conf-style
// or JSON file

mod parser;

pub use parser::ConfigParser;

use crate::pubsub::DEFAULT_CAPACITY;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_MARKER_SUFFIX: &str = ":marker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StoreConfig {
    /// Sorted-set keys ending in this suffix wake blocked BZPOPMIN callers
    pub marker_suffix: String,
    /// Capacity of the marker notification channel
    pub notifier_capacity: usize,
    /// Lua heap limit in bytes, 0 for unlimited
    pub lua_memory_limit: usize,
    /// Rewrite `~= false` / `~= nil` guards when scripts are registered
    pub patch_scripts: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            marker_suffix: DEFAULT_MARKER_SUFFIX.to_string(),
            notifier_capacity: DEFAULT_CAPACITY,
            lua_memory_limit: 0,
            patch_scripts: true,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.marker_suffix = suffix.into();
        self
    }

    pub fn notifier_capacity(mut self, capacity: usize) -> Self {
        self.notifier_capacity = capacity;
        self
    }

    pub fn lua_memory_limit(mut self, bytes: usize) -> Self {
        self.lua_memory_limit = bytes;
        self
    }

    pub fn patch_scripts(mut self, enabled: bool) -> Self {
        self.patch_scripts = enabled;
        self
    }

    /// Load configuration from a file; `.json` files are read as JSON
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            let config: Self = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON configuration in {}", path.display()))?;
            if config.notifier_capacity == 0 {
                bail!("notifier-capacity must be greater than 0");
            }
            return Ok(config);
        }
        Self::parse(&content)
    }

    /// Apply directives on top of the defaults
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in ConfigParser::new(content).parse()? {
            config.apply(&key, &value)?;
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "marker-suffix" => self.marker_suffix = value.to_string(),
            "notifier-capacity" => {
                let capacity: usize = value
                    .parse()
                    .with_context(|| format!("invalid notifier-capacity '{}'", value))?;
                if capacity == 0 {
                    bail!("notifier-capacity must be greater than 0");
                }
                self.notifier_capacity = capacity;
            }
            "lua-memory-limit" => self.lua_memory_limit = parse_memory(value)?,
            "patch-scripts" => self.patch_scripts = parse_bool(value)?,
            // Accepted so stock redis.conf snippets load
            "databases" => {}
            _ => bail!("unknown configuration key '{}'", key),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => bail!("invalid boolean '{}'", value),
    }
}

/// Memory sizes the way redis.conf writes them: `1gb`, `512mb`, `64k`, `1024`
fn parse_memory(value: &str) -> Result<usize> {
    let lower = value.to_lowercase();
    let split = lower
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lower.len());
    let (digits, unit) = lower.split_at(split);

    let amount: usize = digits
        .parse()
        .with_context(|| format!("invalid memory size '{}'", value))?;
    let multiplier: usize = match unit {
        "" | "b" => 1,
        "k" => 1000,
        "kb" => 1024,
        "m" => 1000 * 1000,
        "mb" => 1024 * 1024,
        "g" => 1000 * 1000 * 1000,
        "gb" => 1024 * 1024 * 1024,
        _ => bail!("invalid memory unit in '{}'", value),
    };

    amount
        .checked_mul(multiplier)
        .with_context(|| format!("memory size '{}' is too large", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::new();
        assert_eq!(config.marker_suffix, ":marker");
        assert_eq!(config.notifier_capacity, 1024);
        assert_eq!(config.lua_memory_limit, 0);
        assert!(config.patch_scripts);
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new()
            .marker_suffix(":wake")
            .patch_scripts(false)
            .lua_memory_limit(1 << 20);
        assert_eq!(config.marker_suffix, ":wake");
        assert!(!config.patch_scripts);
        assert_eq!(config.lua_memory_limit, 1 << 20);
    }

    #[test]
    fn test_parse_memory_units() {
        assert_eq!(parse_memory("1024").unwrap(), 1024);
        assert_eq!(parse_memory("64kb").unwrap(), 64 * 1024);
        assert_eq!(parse_memory("2MB").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_memory("1g").unwrap(), 1_000_000_000);
        assert!(parse_memory("12parsecs").is_err());
        assert!(parse_memory("mb").is_err());
    }

    #[test]
    fn test_json_shape() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"marker-suffix": ":wake", "lua-memory-limit": 4096}"#).unwrap();
        assert_eq!(config.marker_suffix, ":wake");
        assert_eq!(config.lua_memory_limit, 4096);
        assert_eq!(config.notifier_capacity, 1024);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(StoreConfig::parse("appendonly yes").is_err());
        assert!(StoreConfig::parse("notifier-capacity 0").is_err());
        assert!(StoreConfig::parse("databases 16").is_ok());
    }
}
