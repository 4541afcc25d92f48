//! PostgreSQL pools.

use super::{option_fault, string_option};
use crate::config::DatabaseConfig;
use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::str::FromStr;

/// Application name reported to the server unless overridden.
pub const DEFAULT_APPLICATION_NAME: &str = "repopool";

/// Builds connect options for a database entry.
///
/// Recognised extra keys: `ssl_mode` (`disable`, `prefer`, `require`, ...)
/// and `application_name`.
///
/// # Errors
/// Configuration fault if `ssl_mode` is not a known mode
pub fn connect_options(name: &str, config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let application_name =
        string_option(config, "application_name").unwrap_or(DEFAULT_APPLICATION_NAME);
    let mut options = PgConnectOptions::new_without_pgpass()
        .host(&config.host)
        .application_name(application_name);

    if let Some(port) = config.port {
        options = options.port(port);
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(mode) = string_option(config, "ssl_mode") {
        let mode = PgSslMode::from_str(mode)
            .map_err(|e| option_fault(name, "ssl_mode", config, e.to_string()))?;
        options = options.ssl_mode(mode);
    }

    Ok(options)
}

/// Opens a lazily connecting pool for a database entry.
///
/// # Errors
/// Configuration fault if the entry's extra keys are invalid
pub fn open_pool(name: &str, config: &DatabaseConfig) -> Result<PgPool> {
    let options = connect_options(name, config)?;

    tracing::debug!(
        database = %name,
        target = %config,
        max_connections = config.max_connections,
        "Opening PostgreSQL pool"
    );

    Ok(PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect_lazy_with(options))
}
