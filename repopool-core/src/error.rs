//! Error taxonomy for pool and repository management.
//!
//! Faults fall into three categories:
//! - **Usage** faults mean the calling code has a bug (empty names, unknown
//!   event names, an empty provider list, a second shared-slot assignment).
//!   They are always returned synchronously and must not be retried.
//! - **Configuration** faults mean the configuration data is malformed or
//!   inconsistent, including lookups of repositories nobody mapped. They are
//!   recoverable by fixing the configuration.
//! - **Runtime** faults come from configuration sources or the pool layer.
//!
//! Error messages never include passwords or other credentials.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Boxed error produced by pool implementations and configuration sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for repopool operations.
#[derive(Debug, Error)]
pub enum RepoPoolError {
    /// Malformed argument to a public operation
    #[error("Invalid usage: {message}")]
    Usage { message: String },

    /// Malformed or inconsistent configuration
    #[error("Invalid configuration at '{key}': {reason}")]
    Configuration {
        reason: String,
        key: String,
        value: Value,
    },

    /// Well-formed repository name with no mapping
    #[error("Repository '{name}' is not mapped to a database")]
    MissingRepository { name: String },

    /// Configured driver is not compiled into this build
    #[error("Unsupported driver '{driver}' for database '{database}': {hint}")]
    UnsupportedDriver {
        driver: String,
        database: String,
        hint: String,
    },

    /// Pool reported a failure while acquiring a connection
    #[error("Failed to acquire connection for repository '{repository}'")]
    Acquire {
        repository: String,
        #[source]
        source: BoxError,
    },

    /// Pool implementation panicked while acquiring a connection
    #[error("Pool driver fault for repository '{repository}': {message}")]
    DriverFault { repository: String, message: String },

    /// A configuration source failed to produce its fragment
    #[error("Configuration source '{provider}' failed: {context}")]
    Source {
        provider: String,
        context: String,
        #[source]
        source: BoxError,
    },
}

/// Convenience type alias for Results with RepoPoolError
pub type Result<T> = std::result::Result<T, RepoPoolError>;

/// Fixed registry of error kinds, one per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`RepoPoolError::Usage`]
    Usage,
    /// [`RepoPoolError::Configuration`]
    Configuration,
    /// [`RepoPoolError::MissingRepository`]
    MissingRepository,
    /// [`RepoPoolError::UnsupportedDriver`]
    UnsupportedDriver,
    /// [`RepoPoolError::Acquire`]
    Acquire,
    /// [`RepoPoolError::DriverFault`]
    DriverFault,
    /// [`RepoPoolError::Source`]
    Source,
}

/// Broad fault category used to decide how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCategory {
    /// Programming error in the caller
    Usage,
    /// Bad configuration data
    Configuration,
    /// Failure below the configuration layer (sources, pools, drivers)
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Usage => "usage",
            Self::Configuration => "configuration",
            Self::MissingRepository => "missing-repository",
            Self::UnsupportedDriver => "unsupported-driver",
            Self::Acquire => "acquire",
            Self::DriverFault => "driver-fault",
            Self::Source => "source",
        };
        f.write_str(name)
    }
}

impl RepoPoolError {
    /// Creates a usage fault
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Creates a configuration fault pointing at the offending key and value
    pub fn configuration(reason: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self::Configuration {
            reason: reason.into(),
            key: key.into(),
            value,
        }
    }

    /// Creates a missing repository fault
    pub fn missing_repository(name: impl Into<String>) -> Self {
        Self::MissingRepository { name: name.into() }
    }

    /// Creates an unsupported driver fault
    pub fn unsupported_driver(
        driver: impl Into<String>,
        database: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::UnsupportedDriver {
            driver: driver.into(),
            database: database.into(),
            hint: hint.into(),
        }
    }

    /// Wraps a pool acquisition failure
    pub fn acquire_failed(repository: impl Into<String>, source: BoxError) -> Self {
        Self::Acquire {
            repository: repository.into(),
            source,
        }
    }

    /// Creates a driver fault from a caught panic message
    pub fn driver_fault(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DriverFault {
            repository: repository.into(),
            message: message.into(),
        }
    }

    /// Wraps a configuration source failure
    pub fn source_failed<E>(provider: impl Into<String>, context: impl Into<String>, error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Source {
            provider: provider.into(),
            context: context.into(),
            source: error.into(),
        }
    }

    /// Returns the fixed kind of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage { .. } => ErrorKind::Usage,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::MissingRepository { .. } => ErrorKind::MissingRepository,
            Self::UnsupportedDriver { .. } => ErrorKind::UnsupportedDriver,
            Self::Acquire { .. } => ErrorKind::Acquire,
            Self::DriverFault { .. } => ErrorKind::DriverFault,
            Self::Source { .. } => ErrorKind::Source,
        }
    }

    /// Returns the fault category of this error.
    pub const fn category(&self) -> FaultCategory {
        match self {
            Self::Usage { .. } => FaultCategory::Usage,
            Self::Configuration { .. }
            | Self::MissingRepository { .. }
            | Self::UnsupportedDriver { .. } => FaultCategory::Configuration,
            Self::Acquire { .. } | Self::DriverFault { .. } | Self::Source { .. } => {
                FaultCategory::Runtime
            }
        }
    }

    /// True for caller bugs that must be fixed rather than retried.
    pub const fn is_usage_fault(&self) -> bool {
        matches!(self.category(), FaultCategory::Usage)
    }

    /// True for faults caused by configuration data.
    pub const fn is_configuration_fault(&self) -> bool {
        matches!(self.category(), FaultCategory::Configuration)
    }

    /// Offending configuration key, when the fault carries one.
    pub fn offending_key(&self) -> Option<&str> {
        match self {
            Self::Configuration { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Offending configuration value, when the fault carries one.
    pub const fn offending_value(&self) -> Option<&Value> {
        match self {
            Self::Configuration { value, .. } => Some(value),
            _ => None,
        }
    }
}
