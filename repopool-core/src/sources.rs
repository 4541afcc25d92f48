//! Configuration providers and the aggregator that merges them.
//!
//! A [`ConfigProvider`] yields one configuration fragment asynchronously. A
//! [`ConfigAggregator`] loads a list of providers and merges their fragments
//! into one value; [`DeepMergeAggregator`] is the default, merging objects
//! recursively with later fragments taking precedence.

use crate::error::{RepoPoolError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Separator between nesting levels in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// A source of one configuration fragment.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> String;

    /// Loads the fragment.
    ///
    /// # Errors
    /// Returns a source fault if the fragment cannot be read or parsed
    async fn load(&self) -> Result<Value>;
}

/// Merges fragments and drives providers.
#[async_trait]
pub trait ConfigAggregator: Send + Sync {
    /// Merges fragments in order; later fragments take precedence.
    fn merge(&self, fragments: Vec<Value>) -> Value;

    /// Loads every provider and merges the results over `base`.
    ///
    /// `on_fragment` is called once per provider with its fragment, as soon
    /// as that fragment arrives.
    ///
    /// # Errors
    /// Returns the first provider error; fragments already seen are dropped
    async fn load(
        &self,
        providers: &[Arc<dyn ConfigProvider>],
        base: Option<Value>,
        on_fragment: &(dyn for<'v> Fn(&'v Value) + Send + Sync),
    ) -> Result<Value>;
}

/// Sequential, recursively merging aggregator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepMergeAggregator;

#[async_trait]
impl ConfigAggregator for DeepMergeAggregator {
    fn merge(&self, fragments: Vec<Value>) -> Value {
        let mut merged = Value::Object(Map::new());
        for fragment in fragments {
            deep_merge(&mut merged, fragment);
        }
        merged
    }

    async fn load(
        &self,
        providers: &[Arc<dyn ConfigProvider>],
        base: Option<Value>,
        on_fragment: &(dyn for<'v> Fn(&'v Value) + Send + Sync),
    ) -> Result<Value> {
        let mut merged = Value::Object(Map::new());
        if let Some(base) = base {
            deep_merge(&mut merged, base);
        }

        for provider in providers {
            let fragment = provider.load().await?;
            debug!(provider = %provider.name(), "Configuration fragment loaded");
            on_fragment(&fragment);
            deep_merge(&mut merged, fragment);
        }

        Ok(merged)
    }
}

/// Merges `overlay` into `target`.
///
/// Objects merge key by key, recursively. Any other overlay value, arrays
/// included, replaces the target value.
pub fn deep_merge(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, overlay) => *target = overlay,
    }
}

/// A fragment held in memory.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    name: String,
    value: Value,
}

impl StaticProvider {
    /// Creates a provider that always yields `value`.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[async_trait]
impl ConfigProvider for StaticProvider {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn load(&self) -> Result<Value> {
        Ok(self.value.clone())
    }
}

/// A fragment read from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    /// Creates a provider reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigProvider for JsonFileProvider {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Value> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RepoPoolError::source_failed(self.name(), "failed to read file", e))?;

        serde_json::from_str(&content)
            .map_err(|e| RepoPoolError::source_failed(self.name(), "file is not valid JSON", e))
    }
}

/// A fragment assembled from environment variables.
///
/// `REPOPOOL__DATABASES__PRIMARY__HOST=db` with prefix `REPOPOOL` yields
/// `{"databases": {"primary": {"host": "db"}}}`. Segments are lowercased.
/// Values that parse as JSON numbers, booleans or null keep that type;
/// everything else is a string.
#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: String,
}

impl EnvProvider {
    /// Creates a provider for variables starting with `prefix__`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Builds the fragment from explicit variables.
    pub fn collect<I, K, V>(&self, vars: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let lead = format!("{}{ENV_SEPARATOR}", self.prefix);
        let mut fragment = Value::Object(Map::new());

        for (key, value) in vars {
            let Some(path) = key.as_ref().strip_prefix(&lead) else {
                continue;
            };
            let segments: Vec<String> = path
                .split(ENV_SEPARATOR)
                .map(str::to_lowercase)
                .collect();
            if segments.iter().any(String::is_empty) {
                continue;
            }

            let leaf = segments
                .iter()
                .rev()
                .fold(parse_env_value(value.as_ref()), |inner, segment| {
                    let mut level = Map::new();
                    level.insert(segment.clone(), inner);
                    Value::Object(level)
                });
            deep_merge(&mut fragment, leaf);
        }

        fragment
    }
}

#[async_trait]
impl ConfigProvider for EnvProvider {
    fn name(&self) -> String {
        format!("env:{}", self.prefix)
    }

    async fn load(&self) -> Result<Value> {
        Ok(self.collect(std::env::vars()))
    }
}

fn parse_env_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    }
}
