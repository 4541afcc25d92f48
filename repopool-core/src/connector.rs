//! The connector: configuration in, pool handles out.
//!
//! A [`Connector`] accumulates configuration fragments (synchronously with
//! [`Connector::add`], or from asynchronous providers with
//! [`Connector::load`]), keeps the resulting [`Registry`] of pools, and hands
//! out pooled clients by repository name.
//!
//! Caller bugs are reported synchronously: every operation that returns a
//! future first returns a `Result`, and usage faults surface there before any
//! future exists. Faults that depend on external data or on the pool surface
//! through the future.
//!
//! # Example
//! ```rust,no_run
//! # use repopool_core::{Connector, DatabaseConfig, PoolOpener, Result};
//! # async fn example<O: PoolOpener>(opener: O) -> Result<()> {
//! use serde_json::json;
//!
//! let connector = Connector::new(opener);
//! connector.add([json!({
//!     "databases": { "primary": { "host": "db.internal" } },
//!     "repositories": { "users": "primary" }
//! })])?;
//!
//! let lease = connector.connect("users")?.await?;
//! lease.release();
//! # Ok(())
//! # }
//! ```

use crate::config::DatabaseConfig;
use crate::error::{RepoPoolError, Result};
use crate::events::{Event, EventBus, EventKind};
use crate::pool::{ConnectionPool, Lease, PoolOpener};
use crate::registry::{Registry, RepositoryEntry};
use crate::sources::{ConfigAggregator, ConfigProvider, DeepMergeAggregator};
use crate::validation::{Snapshot, validate_snapshot};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Client type handed out for an opener's pools.
pub type ClientOf<O> = <<O as PoolOpener>::Pool as ConnectionPool>::Client;

/// Future returned by [`Connector::connect`].
pub type ConnectFuture<O> = BoxFuture<'static, Result<Lease<ClientOf<O>>>>;

/// Future returned by [`Connector::load`].
pub type LoadFuture<O> = BoxFuture<'static, Result<Connector<O>>>;

/// Continuation run with the outcome of a load, before its future settles.
pub type LoadCallback<O> = Box<dyn FnOnce(&Result<Connector<O>>) + Send>;

/// Continuation run with the outcome of an acquire, before its future settles.
pub type ConnectCallback<O> = Box<dyn FnOnce(&Result<Lease<ClientOf<O>>>) + Send>;

/// Optional inputs to [`Connector::load_with`].
pub struct LoadOptions<O: PoolOpener> {
    base: Option<Value>,
    on_complete: Option<LoadCallback<O>>,
}

impl<O: PoolOpener> Default for LoadOptions<O> {
    fn default() -> Self {
        Self {
            base: None,
            on_complete: None,
        }
    }
}

impl<O: PoolOpener> LoadOptions<O> {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Base configuration, merged below every provider's fragment.
    pub fn base(mut self, base: Value) -> Self {
        self.base = Some(base);
        self
    }

    /// Callback invoked exactly once with the load outcome.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Result<Connector<O>>) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

struct Inner<O: PoolOpener> {
    opener: O,
    aggregator: Arc<dyn ConfigAggregator>,
    registry: RwLock<Registry<O::Pool>>,
    events: EventBus,
}

/// Configuration-driven pool registry with repository lookup.
///
/// Cloning is cheap and every clone shares the same registry and listeners,
/// so a connector can be built once at startup and passed to every consumer.
pub struct Connector<O: PoolOpener> {
    inner: Arc<Inner<O>>,
}

impl<O: PoolOpener> Clone for Connector<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: PoolOpener> Connector<O> {
    /// Creates an unconfigured connector using the deep-merge aggregator.
    pub fn new(opener: O) -> Self {
        Self::with_aggregator(opener, Arc::new(DeepMergeAggregator))
    }

    /// Creates an unconfigured connector with a custom aggregator.
    pub fn with_aggregator(opener: O, aggregator: Arc<dyn ConfigAggregator>) -> Self {
        Self {
            inner: Arc::new(Inner {
                opener,
                aggregator,
                registry: RwLock::new(Registry::new()),
                events: EventBus::new(),
            }),
        }
    }

    /// Merges `fragments`, validates the result and applies it.
    ///
    /// Array fragments are flattened one level. An empty call is a no-op.
    ///
    /// # Errors
    /// - usage fault if the merged value is not a mapping
    /// - configuration fault if the snapshot is invalid or a pool cannot be
    ///   opened; the registry is left untouched
    pub fn add<I>(&self, fragments: I) -> Result<&Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let fragments = flatten_fragments(fragments);
        if fragments.is_empty() {
            return Ok(self);
        }

        let merged = self.inner.aggregator.merge(fragments);
        let snapshot = validate_snapshot(&merged)?.into_result()?;
        self.apply(&snapshot)?;
        Ok(self)
    }

    /// Loads configuration from `providers` and applies it.
    ///
    /// # Errors
    /// Returns a usage fault immediately if `providers` is empty. Otherwise
    /// the returned future yields the provider error or configuration fault
    /// that stopped the load, or this connector on success.
    pub fn load(&self, providers: Vec<Arc<dyn ConfigProvider>>) -> Result<LoadFuture<O>> {
        self.load_with(providers, LoadOptions::default())
    }

    /// Like [`Connector::load`], with a base value and a completion callback.
    ///
    /// One [`Event::Config`] is emitted per provider fragment and one
    /// [`Event::Done`] with the merged value after it has been applied.
    ///
    /// # Errors
    /// Returns a usage fault immediately if `providers` is empty
    pub fn load_with(
        &self,
        providers: Vec<Arc<dyn ConfigProvider>>,
        options: LoadOptions<O>,
    ) -> Result<LoadFuture<O>> {
        if providers.is_empty() {
            return Err(RepoPoolError::usage(
                "load requires at least one configuration provider",
            ));
        }

        let connector = self.clone();
        let LoadOptions { base, on_complete } = options;

        Ok(async move {
            let result = connector.run_load(&providers, base).await;
            if let Some(callback) = on_complete {
                callback(&result);
            }
            result
        }
        .boxed())
    }

    async fn run_load(&self, providers: &[Arc<dyn ConfigProvider>], base: Option<Value>) -> Result<Self> {
        let events = &self.inner.events;
        let merged = self
            .inner
            .aggregator
            .load(providers, base, &|fragment| {
                events.emit(&Event::Config(fragment.clone()));
            })
            .await
            .inspect_err(|e| warn!(error = %e, "Configuration load failed"))?;

        if !merged.is_object() {
            return Err(RepoPoolError::configuration(
                "merged configuration must be a mapping",
                "<root>",
                merged,
            ));
        }

        let snapshot = validate_snapshot(&merged)?
            .into_result()
            .inspect_err(|e| warn!(error = %e, "Loaded configuration rejected"))?;
        self.apply(&snapshot)?;

        info!(
            providers = providers.len(),
            databases = snapshot.databases().len(),
            repositories = snapshot.repositories().len(),
            "Configuration loaded"
        );
        events.emit(&Event::Done(merged));
        Ok(self.clone())
    }

    /// Acquires a client from the pool mapped to `repository`.
    ///
    /// # Errors
    /// Returns immediately with a usage fault for an empty name, or a
    /// missing-repository fault for an unmapped one. The future yields
    /// [`RepoPoolError::Acquire`] if the pool fails, or
    /// [`RepoPoolError::DriverFault`] if the pool panics (also emitted as
    /// [`Event::Error`]).
    pub fn connect(&self, repository: &str) -> Result<ConnectFuture<O>> {
        self.start_connect(repository, None)
    }

    /// Like [`Connector::connect`], with a callback run before the future
    /// settles.
    ///
    /// The callback sees acquisition outcomes only: it is invoked exactly
    /// once with the lease or the acquisition error, and not at all for a
    /// driver fault.
    ///
    /// # Errors
    /// Same synchronous faults as [`Connector::connect`]
    pub fn connect_with<F>(&self, repository: &str, callback: F) -> Result<ConnectFuture<O>>
    where
        F: FnOnce(&Result<Lease<ClientOf<O>>>) + Send + 'static,
    {
        self.start_connect(repository, Some(Box::new(callback)))
    }

    fn start_connect(
        &self,
        repository: &str,
        callback: Option<ConnectCallback<O>>,
    ) -> Result<ConnectFuture<O>> {
        let entry = self.lookup(repository)?;
        let connector = self.clone();

        Ok(async move {
            let name = entry.name().to_string();
            let acquired = AssertUnwindSafe(async { entry.pool().acquire().await })
                .catch_unwind()
                .await;

            let outcome = match acquired {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(repository = %name, fault = %message, "Pool driver fault during acquire");
                    connector
                        .inner
                        .events
                        .emit(&Event::Error(Arc::new(RepoPoolError::driver_fault(
                            &name, &message,
                        ))));
                    // The callback is skipped; listeners and the awaiting caller both see it.
                    return Err(RepoPoolError::driver_fault(name, message));
                }
            };

            let result = outcome
                .map(|client| Lease::new(name.clone(), client))
                .map_err(|e| RepoPoolError::acquire_failed(&name, e));

            match &result {
                Ok(_) => debug!(repository = %name, database = %entry.database(), "Connection acquired"),
                Err(e) => warn!(repository = %name, error = %e, "Connection acquire failed"),
            }

            if let Some(callback) = callback {
                callback(&result);
            }
            result
        }
        .boxed())
    }

    /// Returns the pool mapped to `repository`.
    ///
    /// # Errors
    /// Usage fault for an empty name, missing-repository fault for an
    /// unmapped one
    pub fn get_pool(&self, repository: &str) -> Result<Arc<O::Pool>> {
        self.lookup(repository).map(|entry| Arc::clone(entry.pool()))
    }

    /// Registers a listener for one kind of event.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> &Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(kind, Arc::new(listener));
        self
    }

    /// Registers a listener by event name (`config`, `done` or `error`).
    ///
    /// # Errors
    /// Usage fault for an empty or unknown name
    pub fn on_named<F>(&self, name: &str, listener: F) -> Result<&Self>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let kind = name.parse::<EventKind>()?;
        Ok(self.on(kind, listener))
    }

    /// Repository names with their database, sorted by repository.
    pub fn repositories(&self) -> Vec<(String, String)> {
        let mut mapping: Vec<_> = self
            .read_registry()
            .repositories()
            .map(|entry| (entry.name().to_string(), entry.database().to_string()))
            .collect();
        mapping.sort();
        mapping
    }

    /// Database names with their config, sorted by name.
    pub fn databases(&self) -> Vec<(String, DatabaseConfig)> {
        let mut databases: Vec<_> = self
            .read_registry()
            .databases()
            .map(|entry| (entry.name().to_string(), entry.config().clone()))
            .collect();
        databases.sort_by(|a, b| a.0.cmp(&b.0));
        databases
    }

    /// True once any configuration has been applied.
    pub fn is_configured(&self) -> bool {
        !self.read_registry().is_empty()
    }

    /// Runs `f` with read access to the registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&Registry<O::Pool>) -> R) -> R {
        f(&self.read_registry())
    }

    fn lookup(&self, repository: &str) -> Result<RepositoryEntry<O::Pool>> {
        if repository.is_empty() {
            return Err(RepoPoolError::usage(
                "repository name must be a non-empty string",
            ));
        }

        self.read_registry()
            .resolve(repository)
            .cloned()
            .ok_or_else(|| RepoPoolError::missing_repository(repository))
    }

    fn apply(&self, snapshot: &Snapshot) -> Result<()> {
        self.write_registry()
            .apply_snapshot(&self.inner.opener, snapshot)
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry<O::Pool>> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry<O::Pool>> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<O: PoolOpener> fmt::Debug for Connector<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("registry", &*self.read_registry())
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

fn flatten_fragments<I>(fragments: I) -> Vec<Value>
where
    I: IntoIterator<Item = Value>,
{
    let mut flat = Vec::new();
    for fragment in fragments {
        match fragment {
            Value::Array(items) => flat.extend(items),
            other => flat.push(other),
        }
    }
    flat
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "pool panicked while acquiring a connection".to_string())
}
