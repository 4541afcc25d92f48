//! Library side of the `repopool` command line tool.
//!
//! Everything the binary does is exposed here so it can be tested without
//! spawning a process: argument parsing, provider assembly, and the command
//! handlers, which return the text the binary prints.

#[cfg(not(any(feature = "postgresql", feature = "sqlite")))]
compile_error!("repopool needs at least one driver feature: postgresql or sqlite");

use clap::{Args, Parser, Subcommand};
use repopool_core::drivers::supported_drivers;
use repopool_core::{
    ConfigProvider, Connector, Driver, EnvProvider, Event, EventKind, JsonFileProvider,
    RepoPoolError, Result, SqlxOpener,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Default prefix for configuration environment variables.
pub const DEFAULT_ENV_PREFIX: &str = "REPOPOOL";

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "repopool")]
#[command(about = "Validate pool configuration and test repository connections")]
#[command(version)]
#[command(long_about = "
repopool - configuration-driven database pools

Configuration is merged from JSON files (in the order given) and then from
environment variables, so the environment overrides files.

ENVIRONMENT:
  REPOPOOL__DATABASES__PRIMARY__HOST=db.internal
  REPOPOOL__REPOSITORIES__USERS=primary

EXAMPLES:
  repopool -c pools.json check
  repopool -c base.json -c prod.json connect users
  repopool drivers
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Configuration files, merged in order
    #[arg(short, long = "config", value_name = "FILE")]
    pub configs: Vec<PathBuf>,

    /// Prefix for configuration environment variables
    #[arg(
        long,
        env = "REPOPOOL_ENV_PREFIX",
        default_value = DEFAULT_ENV_PREFIX,
        help = "Prefix for configuration environment variables (PREFIX__SECTION__KEY)"
    )]
    pub env_prefix: String,

    /// Ignore configuration environment variables
    #[arg(long, help = "Do not read configuration from environment variables")]
    pub no_env: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate configuration and list databases and repositories
    Check,
    /// Acquire and ping a connection for a repository
    Connect(ConnectArgs),
    /// List drivers compiled into this build
    Drivers,
}

/// Arguments for `connect`
#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Repository to connect
    #[arg(help = "Repository name as mapped in the configuration")]
    pub repository: String,
}

/// Flags shared by every command
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, help = "Write log lines as JSON")]
    pub json_logs: bool,
}

/// Builds the provider list: files in order, then the environment.
pub fn build_providers(cli: &Cli) -> Vec<Arc<dyn ConfigProvider>> {
    let mut providers: Vec<Arc<dyn ConfigProvider>> = cli
        .configs
        .iter()
        .map(|path| Arc::new(JsonFileProvider::new(path)) as Arc<dyn ConfigProvider>)
        .collect();

    if !cli.no_env {
        providers.push(Arc::new(EnvProvider::new(&cli.env_prefix)));
    }
    providers
}

/// Routes connector events to the log.
pub fn attach_event_logging(connector: &Connector<SqlxOpener>) {
    connector
        .on(EventKind::Config, |event| {
            if let Event::Config(fragment) = event {
                let keys = fragment.as_object().map_or(0, serde_json::Map::len);
                debug!(keys, "Configuration fragment received");
            }
        })
        .on(EventKind::Done, |_| info!("Configuration applied"))
        .on(EventKind::Error, |event| {
            if let Event::Error(fault) = event {
                error!(kind = %fault.kind(), "{}", fault);
            }
        });
}

/// Loads every configured source into a fresh connector.
///
/// # Errors
/// Usage fault if no source is configured; otherwise whatever the load reports
pub async fn load_connector(cli: &Cli) -> Result<Connector<SqlxOpener>> {
    let providers = build_providers(cli);
    if providers.is_empty() {
        return Err(RepoPoolError::usage(
            "no configuration source: pass --config or drop --no-env",
        ));
    }

    let connector = Connector::new(SqlxOpener);
    attach_event_logging(&connector);
    connector.load(providers)?.await
}

/// Runs the parsed command and returns the text to print.
///
/// # Errors
/// Returns configuration, source or acquire faults from the command
pub async fn execute_cli(cli: &Cli) -> Result<String> {
    match &cli.command {
        Command::Check => {
            let connector = load_connector(cli).await?;
            Ok(describe(&connector))
        }
        Command::Connect(args) => {
            let connector = load_connector(cli).await?;
            test_connection(&connector, &args.repository).await
        }
        Command::Drivers => Ok(list_drivers()),
    }
}

/// Summarises the databases and repository mapping of a connector.
///
/// Database targets are printed without credentials.
pub fn describe(connector: &Connector<SqlxOpener>) -> String {
    let databases = connector.databases();
    let repositories = connector.repositories();

    let mut out = format!("Databases ({}):\n", databases.len());
    for (name, config) in &databases {
        out.push_str(&format!(
            "  {name}: {config} (pool {}..={})\n",
            config.min_connections, config.max_connections
        ));
    }
    out.push_str(&format!("Repositories ({}):\n", repositories.len()));
    for (repository, database) in &repositories {
        out.push_str(&format!("  {repository} -> {database}\n"));
    }
    out
}

/// Acquires one connection for `repository`, pings it and releases it.
///
/// # Errors
/// Missing-repository fault for an unmapped name, acquire fault if the
/// database cannot be reached or does not answer the ping
pub async fn test_connection(
    connector: &Connector<SqlxOpener>,
    repository: &str,
) -> Result<String> {
    info!(repository, "Testing repository connection...");

    let mut lease = connector.connect(repository)?.await?;
    let driver = lease.driver();
    lease
        .ping()
        .await
        .map_err(|e| RepoPoolError::acquire_failed(repository, e))?;
    lease.release();

    info!(repository, %driver, "Connection test successful");
    Ok(format!(
        "Connection for repository '{repository}' ({driver}) successful"
    ))
}

/// Lists drivers compiled into this build with an example entry each.
pub fn list_drivers() -> String {
    let mut out = String::from("Supported drivers:\n");
    for driver in supported_drivers() {
        let example = match driver {
            Driver::Postgres => {
                r#"{ "driver": "postgres", "host": "localhost", "port": 5432, "database": "app" }"#
            }
            Driver::Sqlite => r#"{ "driver": "sqlite", "host": "/var/lib/app/data.db" }"#,
        };
        out.push_str(&format!("  {driver}\n    Example: {example}\n"));
    }
    out
}
