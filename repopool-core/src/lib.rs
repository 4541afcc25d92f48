//! Configuration-driven database pools with repository lookup.
//!
//! Configuration names a set of databases (connection settings plus pool
//! sizing) and a set of repositories, each mapped to one database. A
//! [`Connector`] validates that configuration, opens one pool per database
//! through a [`PoolOpener`], and hands out pooled clients by repository name.
//!
//! # Architecture
//! - [`validation`] checks a configuration snapshot without side effects
//! - [`registry`] holds the open pools and the repository mapping
//! - [`connector`] ties configuration sources, the registry and events together
//! - [`sources`] loads and merges configuration fragments
//! - `drivers` opens sqlx pools (features `postgresql` and `sqlite`)
//!
//! # Configuration shape
//! ```json
//! {
//!   "databases": {
//!     "primary": { "host": "db.internal", "port": 5432, "max_connections": 20 }
//!   },
//!   "repositories": { "users": "primary", "orders": "primary" }
//! }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod logging;
pub mod pool;
pub mod registry;
pub mod shared;
pub mod sources;
pub mod validation;

#[cfg(any(feature = "postgresql", feature = "sqlite"))]
pub mod drivers;

// Re-export commonly used types
pub use config::{DatabaseConfig, Driver};
pub use connector::{ClientOf, ConnectFuture, Connector, LoadFuture, LoadOptions};
pub use error::{ErrorKind, FaultCategory, RepoPoolError, Result};
pub use events::{Event, EventKind};
pub use logging::{LogFormat, init_logging};
pub use pool::{ConnectionPool, Lease, PoolOpener};
pub use registry::Registry;
pub use shared::{set_shared, shared};
pub use sources::{
    ConfigAggregator, ConfigProvider, DeepMergeAggregator, EnvProvider, JsonFileProvider,
    StaticProvider,
};
pub use validation::{Snapshot, Validation, validate_snapshot};

#[cfg(any(feature = "postgresql", feature = "sqlite"))]
pub use drivers::{DriverConnection, DriverPool, SqlxOpener};
