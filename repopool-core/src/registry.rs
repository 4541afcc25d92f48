//! Database and repository registry.
//!
//! The registry owns one pool per database entry and maps repository names
//! onto those pools. Entries are added or replaced, never removed, so a
//! repository that resolves once keeps resolving for the registry's lifetime.
//!
//! Every `apply_*` call is atomic: all entries of the call are validated (and
//! all pools opened) before anything is committed, so a failing call leaves
//! the registry exactly as it was.

use crate::config::DatabaseConfig;
use crate::error::{RepoPoolError, Result};
use crate::pool::{ConnectionPool, PoolOpener};
use crate::validation::{Snapshot, validate_database_entry, validate_repository_entry};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A database and the pool opened for it.
pub struct DatabaseEntry<P> {
    name: String,
    config: DatabaseConfig,
    pool: Arc<P>,
}

impl<P> DatabaseEntry<P> {
    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Config the pool was opened with.
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The pool.
    pub const fn pool(&self) -> &Arc<P> {
        &self.pool
    }
}

/// A repository mapped onto a database's pool.
pub struct RepositoryEntry<P> {
    name: String,
    database: String,
    pool: Arc<P>,
}

impl<P> RepositoryEntry<P> {
    /// Repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the database backing this repository.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Pool shared with the database entry.
    pub const fn pool(&self) -> &Arc<P> {
        &self.pool
    }
}

impl<P> Clone for RepositoryEntry<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            database: self.database.clone(),
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<P> fmt::Debug for RepositoryEntry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryEntry")
            .field("name", &self.name)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Maps database names to pools and repository names to databases.
pub struct Registry<P> {
    databases: HashMap<String, DatabaseEntry<P>>,
    repositories: HashMap<String, RepositoryEntry<P>>,
}

impl<P> Default for Registry<P> {
    fn default() -> Self {
        Self {
            databases: HashMap::new(),
            repositories: HashMap::new(),
        }
    }
}

impl<P: ConnectionPool> Registry<P> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and opens a pool for every entry of `databases`.
    ///
    /// Re-supplied names get a freshly opened pool, and repositories bound
    /// to them are rebound to it.
    ///
    /// # Errors
    /// Returns a configuration fault for the first invalid entry, or the
    /// opener's error; nothing is committed in either case
    pub fn apply_databases<O>(
        &mut self,
        opener: &O,
        databases: &Map<String, Value>,
    ) -> Result<Vec<String>>
    where
        O: PoolOpener<Pool = P>,
    {
        let mut staged = Vec::with_capacity(databases.len());
        for (name, entry) in databases {
            staged.push((name.as_str(), validate_database_entry(name, entry)?));
        }

        let opened = open_all(opener, staged)?;
        let names = opened.iter().map(|entry| entry.name.clone()).collect();
        for entry in opened {
            self.commit_database(entry);
        }
        Ok(names)
    }

    /// Validates and maps every entry of `repositories`.
    ///
    /// Each entry must name a database already in the registry.
    ///
    /// # Errors
    /// Returns a configuration fault for the first invalid or dangling
    /// entry; nothing is committed in that case
    pub fn apply_repositories(&mut self, repositories: &Map<String, Value>) -> Result<Vec<String>> {
        let mut staged = Vec::with_capacity(repositories.len());
        for (name, entry) in repositories {
            let database =
                validate_repository_entry(name, entry, |db| self.databases.contains_key(db))?;
            staged.push((name.clone(), database));
        }

        let mut names = Vec::with_capacity(staged.len());
        for (name, database) in staged {
            self.commit_repository(&name, database)?;
            names.push(name);
        }
        Ok(names)
    }

    /// Applies a validated snapshot: databases first, then repositories.
    ///
    /// # Errors
    /// Returns the opener's error if any pool cannot be opened; nothing is
    /// committed in that case
    pub fn apply_snapshot<O>(&mut self, opener: &O, snapshot: &Snapshot) -> Result<()>
    where
        O: PoolOpener<Pool = P>,
    {
        let staged = snapshot
            .databases()
            .iter()
            .map(|(name, config)| (name.as_str(), config.clone()))
            .collect();
        let opened = open_all(opener, staged)?;

        for entry in opened {
            self.commit_database(entry);
        }
        for (name, database) in snapshot.repositories() {
            self.commit_repository(name, database.clone())?;
        }
        Ok(())
    }

    fn commit_database(&mut self, entry: DatabaseEntry<P>) {
        let mut rebound = 0_usize;
        for repository in self.repositories.values_mut() {
            if repository.database == entry.name {
                repository.pool = Arc::clone(&entry.pool);
                rebound = rebound.saturating_add(1);
            }
        }

        let reopened = self.databases.contains_key(&entry.name);
        info!(
            database = %entry.name,
            target = %entry.config,
            reopened,
            rebound,
            "Database pool opened"
        );
        self.databases.insert(entry.name.clone(), entry);
    }

    fn commit_repository(&mut self, name: &str, database: String) -> Result<()> {
        let Some(db) = self.databases.get(&database) else {
            return Err(RepoPoolError::configuration(
                format!("repository '{name}' references unknown database '{database}'"),
                format!("repositories.{name}"),
                Value::String(database),
            ));
        };

        debug!(repository = %name, database = %database, "Repository mapped");
        let entry = RepositoryEntry {
            name: name.to_string(),
            pool: Arc::clone(&db.pool),
            database,
        };
        self.repositories.insert(name.to_string(), entry);
        Ok(())
    }
}

impl<P> Registry<P> {
    /// Looks up a repository by exact, case-sensitive name.
    pub fn resolve(&self, repository: &str) -> Option<&RepositoryEntry<P>> {
        self.repositories.get(repository)
    }

    /// Looks up a database by name.
    pub fn database(&self, name: &str) -> Option<&DatabaseEntry<P>> {
        self.databases.get(name)
    }

    /// All database entries, in no particular order.
    pub fn databases(&self) -> impl Iterator<Item = &DatabaseEntry<P>> {
        self.databases.values()
    }

    /// All repository entries, in no particular order.
    pub fn repositories(&self) -> impl Iterator<Item = &RepositoryEntry<P>> {
        self.repositories.values()
    }

    /// Number of databases.
    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    /// Number of repositories.
    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }

    /// True when nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty() && self.repositories.is_empty()
    }
}

impl<P> fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("databases", &self.databases.keys().collect::<Vec<_>>())
            .field("repositories", &self.repositories.values().collect::<Vec<_>>())
            .finish()
    }
}

fn open_all<O: PoolOpener>(
    opener: &O,
    staged: Vec<(&str, DatabaseConfig)>,
) -> Result<Vec<DatabaseEntry<O::Pool>>> {
    staged
        .into_iter()
        .map(|(name, config)| {
            let pool = opener.open(name, &config)?;
            Ok(DatabaseEntry {
                name: name.to_string(),
                config,
                pool: Arc::new(pool),
            })
        })
        .collect()
}
