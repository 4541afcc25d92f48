//! sqlx-backed pool drivers.
//!
//! [`SqlxOpener`] turns a [`DatabaseConfig`] into a lazily connecting sqlx
//! pool for the configured [`Driver`]. Opening never touches the network;
//! connections are established on first acquire.
//!
//! Pools spawn their maintenance tasks on the current Tokio runtime, so
//! [`SqlxOpener::open`] must be called from within one; outside a runtime it
//! returns a usage fault.
//!
//! # Module Structure
//! - `postgres`: PostgreSQL connect options (feature `postgresql`)
//! - `sqlite`: SQLite connect options (feature `sqlite`)

use crate::config::{DatabaseConfig, Driver};
use crate::error::{BoxError, RepoPoolError, Result};
use crate::pool::{ConnectionPool, PoolOpener};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[async_trait]
impl<DB: sqlx::Database> ConnectionPool for sqlx::Pool<DB> {
    type Client = PoolConnection<DB>;

    async fn acquire(&self) -> std::result::Result<PoolConnection<DB>, BoxError> {
        sqlx::Pool::acquire(self).await.map_err(Into::into)
    }
}

/// A pool for whichever driver a database entry asked for.
#[derive(Debug, Clone)]
pub enum DriverPool {
    /// PostgreSQL pool
    #[cfg(feature = "postgresql")]
    Postgres(sqlx::PgPool),
    /// SQLite pool
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::SqlitePool),
}

/// A connection leased from a [`DriverPool`].
#[derive(Debug)]
pub enum DriverConnection {
    /// PostgreSQL connection
    #[cfg(feature = "postgresql")]
    Postgres(PoolConnection<sqlx::Postgres>),
    /// SQLite connection
    #[cfg(feature = "sqlite")]
    Sqlite(PoolConnection<sqlx::Sqlite>),
}

impl DriverPool {
    /// Driver behind this pool.
    pub const fn driver(&self) -> Driver {
        match self {
            #[cfg(feature = "postgresql")]
            Self::Postgres(_) => Driver::Postgres,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => Driver::Sqlite,
        }
    }

    /// Closes the pool, waiting for leased connections to return.
    pub async fn close(&self) {
        match self {
            #[cfg(feature = "postgresql")]
            Self::Postgres(pool) => pool.close().await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}

#[async_trait]
impl ConnectionPool for DriverPool {
    type Client = DriverConnection;

    async fn acquire(&self) -> std::result::Result<DriverConnection, BoxError> {
        match self {
            #[cfg(feature = "postgresql")]
            Self::Postgres(pool) => pool.acquire().await.map(DriverConnection::Postgres),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(pool) => pool.acquire().await.map(DriverConnection::Sqlite),
        }
        .map_err(Into::into)
    }
}

impl DriverConnection {
    /// Driver behind this connection.
    pub const fn driver(&self) -> Driver {
        match self {
            #[cfg(feature = "postgresql")]
            Self::Postgres(_) => Driver::Postgres,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => Driver::Sqlite,
        }
    }

    /// Checks the connection is still alive.
    ///
    /// # Errors
    /// Returns the driver's error if the server does not answer
    pub async fn ping(&mut self) -> std::result::Result<(), BoxError> {
        use sqlx::Connection;

        match self {
            #[cfg(feature = "postgresql")]
            Self::Postgres(conn) => conn.ping().await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.ping().await,
        }
        .map_err(Into::into)
    }
}

/// Opens sqlx pools according to each entry's `driver`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxOpener;

impl PoolOpener for SqlxOpener {
    type Pool = DriverPool;

    fn open(&self, name: &str, config: &DatabaseConfig) -> Result<DriverPool> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(RepoPoolError::usage(format!(
                "database '{name}' must be opened from within a Tokio runtime"
            )));
        }

        match config.driver {
            Driver::Postgres => open_postgres(name, config),
            Driver::Sqlite => open_sqlite(name, config),
        }
    }
}

/// Drivers compiled into this build.
pub fn supported_drivers() -> Vec<Driver> {
    let mut drivers = Vec::new();
    #[cfg(feature = "postgresql")]
    drivers.push(Driver::Postgres);
    #[cfg(feature = "sqlite")]
    drivers.push(Driver::Sqlite);
    drivers
}

#[cfg(feature = "postgresql")]
fn open_postgres(name: &str, config: &DatabaseConfig) -> Result<DriverPool> {
    postgres::open_pool(name, config).map(DriverPool::Postgres)
}

#[cfg(not(feature = "postgresql"))]
fn open_postgres(name: &str, _config: &DatabaseConfig) -> Result<DriverPool> {
    Err(RepoPoolError::unsupported_driver(
        Driver::Postgres.to_string(),
        name,
        "compile with --features postgresql to enable PostgreSQL support",
    ))
}

#[cfg(feature = "sqlite")]
fn open_sqlite(name: &str, config: &DatabaseConfig) -> Result<DriverPool> {
    sqlite::open_pool(name, config).map(DriverPool::Sqlite)
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(name: &str, _config: &DatabaseConfig) -> Result<DriverPool> {
    Err(RepoPoolError::unsupported_driver(
        Driver::Sqlite.to_string(),
        name,
        "compile with --features sqlite to enable SQLite support",
    ))
}

/// Reads a string option from a database entry's extra keys.
#[cfg(feature = "postgresql")]
fn string_option<'a>(config: &'a DatabaseConfig, key: &str) -> Option<&'a str> {
    config.options.get(key).and_then(serde_json::Value::as_str)
}

/// Reads a boolean option from a database entry's extra keys.
#[cfg(feature = "sqlite")]
fn bool_option(config: &DatabaseConfig, key: &str) -> Option<bool> {
    config.options.get(key).and_then(serde_json::Value::as_bool)
}

/// Builds a configuration fault for an extra option.
#[cfg(feature = "postgresql")]
fn option_fault(name: &str, key: &str, config: &DatabaseConfig, reason: String) -> RepoPoolError {
    RepoPoolError::configuration(
        reason,
        format!("databases.{name}.{key}"),
        config
            .options
            .get(key)
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    )
}
