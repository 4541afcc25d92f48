//! Shape validation for merged configuration snapshots.
//!
//! A snapshot is a JSON object with two required keys:
//!
//! ```json
//! {
//!   "databases":    { "primary": { "host": "db.internal" } },
//!   "repositories": { "users": "primary" }
//! }
//! ```
//!
//! Validation is atomic: [`validate_snapshot`] either produces a fully typed
//! [`Snapshot`] or reports the first offending key and value. A `Snapshot` can
//! only be built here, so holding one proves every entry passed.
//!
//! Rules, in order (first failure wins):
//! 1. `databases` is present and is a mapping
//! 2. every database entry is a mapping with a non-empty string `host` and
//!    valid pool settings
//! 3. `repositories` is present and is a mapping
//! 4. every repository entry is a non-empty string naming a database of the
//!    same snapshot

use crate::config::DatabaseConfig;
use crate::error::{RepoPoolError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Top-level key holding database blocks.
pub const DATABASES_KEY: &str = "databases";

/// Top-level key holding repository mappings.
pub const REPOSITORIES_KEY: &str = "repositories";

/// Why a snapshot (or one of its entries) was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidConfig {
    /// Human-readable reason
    pub reason: String,
    /// Dotted path of the offending key, e.g. `databases.primary.host`
    pub key: String,
    /// Offending value (`null` when the key is missing)
    pub value: Value,
}

impl InvalidConfig {
    fn new(reason: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            reason: reason.into(),
            key: key.into(),
            value,
        }
    }
}

impl fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at '{}')", self.reason, self.key)
    }
}

impl From<InvalidConfig> for RepoPoolError {
    fn from(invalid: InvalidConfig) -> Self {
        Self::configuration(invalid.reason, invalid.key, invalid.value)
    }
}

/// A fully validated configuration snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    databases: BTreeMap<String, DatabaseConfig>,
    repositories: BTreeMap<String, String>,
}

impl Snapshot {
    /// Validated database configs by name.
    pub const fn databases(&self) -> &BTreeMap<String, DatabaseConfig> {
        &self.databases
    }

    /// Repository name to database name.
    pub const fn repositories(&self) -> &BTreeMap<String, String> {
        &self.repositories
    }
}

/// Outcome of validating a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// Every entry passed
    Valid(Snapshot),
    /// The first rule violation found
    Invalid(InvalidConfig),
}

impl Validation {
    /// Converts an invalid outcome into a configuration fault.
    ///
    /// # Errors
    /// Returns [`RepoPoolError::Configuration`] for [`Validation::Invalid`]
    pub fn into_result(self) -> Result<Snapshot> {
        match self {
            Self::Valid(snapshot) => Ok(snapshot),
            Self::Invalid(invalid) => Err(invalid.into()),
        }
    }

    /// True if the snapshot passed validation.
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Validates a merged configuration candidate.
///
/// Malformed configuration data is reported as [`Validation::Invalid`], never
/// as an error. The input is not modified.
///
/// # Errors
/// Returns a usage fault if `candidate` is not a JSON object at all, which
/// means the caller passed something that was never a configuration.
pub fn validate_snapshot(candidate: &Value) -> Result<Validation> {
    let Some(root) = candidate.as_object() else {
        return Err(RepoPoolError::usage(format!(
            "configuration must be a JSON object, got {}",
            type_name(candidate)
        )));
    };

    Ok(check_snapshot(root).map_or_else(Validation::Invalid, Validation::Valid))
}

fn check_snapshot(root: &Map<String, Value>) -> std::result::Result<Snapshot, InvalidConfig> {
    let databases = required_mapping(root, DATABASES_KEY)?;

    let mut snapshot = Snapshot::default();
    for (name, entry) in databases {
        let config = validate_database_entry(name, entry)?;
        snapshot.databases.insert(name.clone(), config);
    }

    let repositories = required_mapping(root, REPOSITORIES_KEY)?;
    for (name, entry) in repositories {
        let database =
            validate_repository_entry(name, entry, |db| snapshot.databases.contains_key(db))?;
        snapshot.repositories.insert(name.clone(), database);
    }

    Ok(snapshot)
}

fn required_mapping<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> std::result::Result<&'a Map<String, Value>, InvalidConfig> {
    match root.get(key) {
        None => Err(InvalidConfig::new(
            format!("missing required key '{key}'"),
            key,
            Value::Null,
        )),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(InvalidConfig::new(
            format!("'{key}' must be a mapping, got {}", type_name(other)),
            key,
            other.clone(),
        )),
    }
}

/// Validates one entry under `databases` and returns its typed config.
///
/// # Errors
/// Returns the offending key and value when the entry is not a mapping, has
/// no non-empty string `host`, or carries invalid pool settings
pub fn validate_database_entry(
    name: &str,
    entry: &Value,
) -> std::result::Result<DatabaseConfig, InvalidConfig> {
    let key = format!("{DATABASES_KEY}.{name}");

    let Some(fields) = entry.as_object() else {
        return Err(InvalidConfig::new(
            format!("database '{name}' must be a mapping, got {}", type_name(entry)),
            key,
            entry.clone(),
        ));
    };

    match fields.get("host") {
        Some(Value::String(host)) if !host.is_empty() => {}
        other => {
            return Err(InvalidConfig::new(
                format!("database '{name}' requires a non-empty string 'host'"),
                format!("{key}.host"),
                other.cloned().unwrap_or(Value::Null),
            ));
        }
    }

    let config: DatabaseConfig = serde_json::from_value(entry.clone()).map_err(|e| {
        InvalidConfig::new(
            format!("database '{name}' is malformed: {e}"),
            key.clone(),
            redact_entry(fields),
        )
    })?;

    config.check().map_err(|violation| {
        InvalidConfig::new(
            format!("database '{name}': {}", violation.reason),
            format!("{key}.{}", violation.field),
            fields.get(violation.field).cloned().unwrap_or(Value::Null),
        )
    })?;

    Ok(config)
}

/// Validates one entry under `repositories` and returns the database name.
///
/// `has_database` answers whether a database name is known to the caller,
/// either in the same snapshot or in an existing registry.
///
/// # Errors
/// Returns the offending key and value when the entry is not a non-empty
/// string or names an unknown database
pub fn validate_repository_entry<F>(
    name: &str,
    entry: &Value,
    has_database: F,
) -> std::result::Result<String, InvalidConfig>
where
    F: Fn(&str) -> bool,
{
    let key = format!("{REPOSITORIES_KEY}.{name}");

    match entry {
        Value::String(database) if database.is_empty() => Err(InvalidConfig::new(
            format!("repository '{name}' must name a database"),
            key,
            entry.clone(),
        )),
        Value::String(database) if !has_database(database) => Err(InvalidConfig::new(
            format!("repository '{name}' references unknown database '{database}'"),
            key,
            entry.clone(),
        )),
        Value::String(database) => Ok(database.clone()),
        other => Err(InvalidConfig::new(
            format!(
                "repository '{name}' must be a database name string, got {}",
                type_name(other)
            ),
            key,
            other.clone(),
        )),
    }
}

/// Copy of a database block with its password masked, for diagnostics.
fn redact_entry(fields: &Map<String, Value>) -> Value {
    let mut redacted = fields.clone();
    if let Some(password) = redacted.get_mut("password") {
        *password = Value::String("****".to_string());
    }
    Value::Object(redacted)
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}
