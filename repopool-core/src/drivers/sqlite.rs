//! SQLite pools.
//!
//! For SQLite entries `host` is the database file path, or `:memory:` for a
//! private in-memory database per connection.

use super::bool_option;
use crate::config::DatabaseConfig;
use crate::error::{RepoPoolError, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

/// Host value selecting an in-memory database.
pub const MEMORY_HOST: &str = ":memory:";

/// Builds connect options for a database entry.
///
/// Recognised extra keys: `create_if_missing` and `read_only`, both booleans
/// defaulting to `false`.
///
/// # Errors
/// Configuration fault if the in-memory URL is rejected by the driver
pub fn connect_options(name: &str, config: &DatabaseConfig) -> Result<SqliteConnectOptions> {
    let options = if config.host == MEMORY_HOST {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| {
                RepoPoolError::configuration(
                    e.to_string(),
                    format!("databases.{name}.host"),
                    Value::String(config.host.clone()),
                )
            })?
    } else {
        SqliteConnectOptions::new()
            .filename(&config.host)
            .create_if_missing(bool_option(config, "create_if_missing").unwrap_or(false))
    };

    Ok(options.read_only(bool_option(config, "read_only").unwrap_or(false)))
}

/// Opens a lazily connecting pool for a database entry.
///
/// # Errors
/// Configuration fault if the entry cannot be turned into connect options
pub fn open_pool(name: &str, config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = connect_options(name, config)?;

    tracing::debug!(
        database = %name,
        path = %config.host,
        max_connections = config.max_connections,
        "Opening SQLite pool"
    );

    Ok(SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect_lazy_with(options))
}
