//! Configuration lookup.
//!
//! The container only consumes configuration through [`ConfigAdapter`];
//! [`ConfigService`] is the default adapter, a JSON tree addressed with dotted
//! paths plus a map of explicit overrides.

use crate::error::{IocError, Result};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::env;
use std::path::Path;
use std::sync::Arc;

/// Hierarchical configuration source
pub trait ConfigAdapter: Send + Sync {
    fn has_config(&self, key: &str) -> bool {
        self.get_config(key).is_some()
    }

    fn get_config(&self, key: &str) -> Option<Value>;
}

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    tree: Arc<Value>,
    overrides: Arc<DashMap<String, Value>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Self {
        Self {
            tree: Arc::new(value),
            overrides: Arc::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let value = serde_json::from_str(json).map_err(|e| IocError::Config {
            key: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self::from_value(value))
    }

    /// Load `default.json` and then `<env>.json` from `dir`, later files
    /// overriding earlier ones key by key.
    pub fn load(dir: impl AsRef<Path>, env: &str) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(IocError::Config {
                key: String::new(),
                message: format!("configuration directory {} not found", dir.display()),
            });
        }

        let mut tree = Value::Object(Map::new());
        for file in ["default".to_string(), env.to_string()] {
            let path = dir.join(format!("{file}.json"));
            if !path.is_file() {
                tracing::debug!(path = %path.display(), "configuration file not present, skipping");
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|e| IocError::Config {
                key: String::new(),
                message: format!("{}: {e}", path.display()),
            })?;
            let value: Value = serde_json::from_str(&text).map_err(|e| IocError::Config {
                key: String::new(),
                message: format!("{}: {e}", path.display()),
            })?;
            merge(&mut tree, value);
            tracing::debug!(path = %path.display(), "configuration file loaded");
        }
        Ok(Self::from_value(tree))
    }

    /// Apply overrides from the process environment, see [`ConfigService::with_env_overrides`]
    pub fn from_env(self, prefix: &str) -> Self {
        self.with_env_overrides(prefix, env::vars())
    }

    /// Turn `PREFIX__A__B=value` pairs into overrides for `a.b`.
    ///
    /// Values are parsed as JSON when possible and kept as strings otherwise.
    pub fn with_env_overrides(
        self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let marker = format!("{prefix}__");
        for (name, raw) in vars {
            let Some(rest) = name.strip_prefix(&marker) else {
                continue;
            };
            let key = rest
                .split("__")
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(".");
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            self.overrides.insert(key, value);
        }
        self
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.overrides.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.overrides.get(key) {
            return Some(value.clone());
        }
        lookup(&self.tree, key).cloned()
    }
}

impl ConfigAdapter for ConfigService {
    fn get_config(&self, key: &str) -> Option<Value> {
        self.get(key)
    }
}

fn lookup<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return Some(tree);
    }
    key.split('.').try_fold(tree, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
