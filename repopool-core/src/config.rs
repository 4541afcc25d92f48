//! Typed database configuration.
//!
//! Each entry under the `databases` key of a configuration snapshot
//! deserializes into a [`DatabaseConfig`]. Only `host` is required; every
//! other field has a pool-friendly default.
//!
//! # Security
//! `password` is skipped by `Display` and redacted by `Debug`, so a config can
//! be logged safely.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Upper bound on `max_connections` for a single pool.
pub const MAX_POOL_CONNECTIONS: u32 = 100;

/// Database engine a pool talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// PostgreSQL (`postgres`, `postgresql`, `pg`)
    #[default]
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    /// SQLite (`sqlite`, `sqlite3`); `host` is the file path or `:memory:`
    #[serde(alias = "sqlite3")]
    Sqlite,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Configuration for one database pool.
///
/// # Example
/// ```rust
/// use repopool_core::config::{DatabaseConfig, Driver};
///
/// let config = DatabaseConfig::new("db.internal")
///     .with_port(5432)
///     .with_database("app");
///
/// assert_eq!(config.driver, Driver::Postgres);
/// assert!(config.check().is_ok());
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host address, or the file path for SQLite
    pub host: String,
    /// Database engine
    #[serde(default)]
    pub driver: Driver,
    /// Optional port number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Optional database name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Optional username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional password, never displayed
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of idle connections kept open
    #[serde(default)]
    pub min_connections: u32,
    /// Seconds to wait for a connection before giving up
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds an idle connection is kept
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Seconds before a connection is recycled
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
    /// Unrecognised keys, passed through untouched
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_connect_timeout_secs() -> u64 {
    30
}

const fn default_idle_timeout_secs() -> u64 {
    600
}

const fn default_max_lifetime_secs() -> u64 {
    1800
}

/// A field-level constraint violation found by [`DatabaseConfig::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Name of the offending field
    pub field: &'static str,
    /// Human-readable reason
    pub reason: String,
}

impl DatabaseConfig {
    /// Creates a config for `host` with default pool settings.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            driver: Driver::default(),
            port: None,
            database: None,
            username: None,
            password: None,
            max_connections: default_max_connections(),
            min_connections: 0,
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
            options: Map::new(),
        }
    }

    /// Checks field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns the first violated constraint
    pub fn check(&self) -> std::result::Result<(), FieldViolation> {
        if self.host.is_empty() {
            return Err(violation("host", "host must be a non-empty string"));
        }

        if self.port == Some(0) {
            return Err(violation("port", "port must be greater than 0"));
        }

        if self.max_connections == 0 {
            return Err(violation(
                "max_connections",
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > MAX_POOL_CONNECTIONS {
            return Err(violation(
                "max_connections",
                format!("max_connections should not exceed {MAX_POOL_CONNECTIONS}"),
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(violation(
                "min_connections",
                "min_connections cannot exceed max_connections",
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(violation(
                "connect_timeout_secs",
                "connect_timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Connection acquire timeout.
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Idle timeout, `None` when disabled with 0.
    pub const fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Maximum connection lifetime, `None` when disabled with 0.
    pub const fn max_lifetime(&self) -> Option<Duration> {
        match self.max_lifetime_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Builder method to set the driver.
    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.driver = driver;
        self
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Builder method to set username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Builder method to set password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Builder method to set the pool size.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

fn violation(field: &'static str, reason: impl Into<String>) -> FieldViolation {
    FieldViolation {
        field,
        reason: reason.into(),
    }
}

impl fmt::Display for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}{}",
            self.driver,
            self.host,
            self.port.map_or_else(String::new, |p| format!(":{p}")),
            self.database
                .as_ref()
                .map_or_else(String::new, |db| format!("/{db}"))
        )
        // username and password are never included
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("driver", &self.driver)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .field("options", &self.options)
            .finish()
    }
}
