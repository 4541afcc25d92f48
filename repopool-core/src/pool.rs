//! Pool capabilities consumed by the registry and connector.
//!
//! Pooling itself lives behind these traits. A [`PoolOpener`] turns one
//! validated [`DatabaseConfig`] into a pool, synchronously and once per
//! database entry; a [`ConnectionPool`] hands out clients asynchronously.

use crate::config::DatabaseConfig;
use crate::error::{BoxError, Result};
use async_trait::async_trait;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Opens a pool for a database entry.
///
/// Opening must not block on the network: implementations should create a
/// lazily connecting pool and leave connection attempts to `acquire`.
pub trait PoolOpener: Send + Sync + 'static {
    /// Pool type produced by this opener
    type Pool: ConnectionPool;

    /// Opens a fresh pool for the database called `name`.
    ///
    /// # Errors
    /// Returns a configuration fault if the config cannot be turned into a
    /// pool (for example, a driver that is not compiled in)
    fn open(&self, name: &str, config: &DatabaseConfig) -> Result<Self::Pool>;
}

/// Hands out pooled clients.
///
/// Clients return to the pool when dropped.
#[async_trait]
pub trait ConnectionPool: Send + Sync + 'static {
    /// Client handed out by `acquire`
    type Client: Send + 'static;

    /// Acquires a client from the pool.
    ///
    /// # Errors
    /// Returns the driver's error if no client could be acquired
    async fn acquire(&self) -> std::result::Result<Self::Client, BoxError>;
}

/// A client leased from a repository's pool.
///
/// The client goes back to its pool when the lease is released or dropped.
pub struct Lease<C> {
    repository: String,
    client: C,
}

impl<C> Lease<C> {
    pub(crate) fn new(repository: impl Into<String>, client: C) -> Self {
        Self {
            repository: repository.into(),
            client,
        }
    }

    /// Repository this lease was acquired for.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Shared access to the client.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Exclusive access to the client.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Takes the client out of the lease; dropping it releases it.
    pub fn into_client(self) -> C {
        self.client
    }

    /// Returns the client to its pool.
    pub fn release(self) {
        tracing::debug!(repository = %self.repository, "Releasing leased connection");
        drop(self.client);
    }
}

impl<C> Deref for Lease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C> DerefMut for Lease<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.client
    }
}

impl<C> fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}
