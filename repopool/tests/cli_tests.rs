//! CLI parsing and command handler tests.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use clap::Parser;
use repopool::{Cli, Command, build_providers, execute_cli, list_drivers};
use repopool_core::ErrorKind;
use serde_json::json;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Writes a JSON configuration file
fn config_file(value: &serde_json::Value) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(&file, value.to_string()).unwrap();
    file
}

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("repopool").chain(args.iter().copied()))
        .expect("arguments should parse")
}

fn memory_config() -> serde_json::Value {
    json!({
        "databases": { "cache": { "driver": "sqlite", "host": ":memory:" } },
        "repositories": { "sessions": "cache", "tokens": "cache" }
    })
}

mod parsing {
    use super::*;

    #[test]
    fn test_config_flags_keep_order() {
        let cli = parse(&["-c", "a.json", "--config", "b.json", "check"]);
        assert_eq!(
            cli.configs,
            vec![PathBuf::from("a.json"), PathBuf::from("b.json")]
        );
        assert!(matches!(cli.command, Command::Check));
    }

    #[test]
    fn test_connect_requires_repository() {
        assert!(Cli::try_parse_from(["repopool", "connect"]).is_err());

        let cli = parse(&["connect", "users"]);
        match cli.command {
            Command::Connect(args) => assert_eq!(args.repository, "users"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = parse(&["-vv", "--json-logs", "drivers"]);
        assert_eq!(cli.global.verbose, 2);
        assert!(!cli.global.quiet);
        assert!(cli.global.json_logs);
    }

    #[test]
    fn test_env_prefix_flag() {
        let cli = parse(&["--env-prefix", "MYAPP", "check"]);
        assert_eq!(cli.env_prefix, "MYAPP");
    }
}

mod providers {
    use super::*;

    #[test]
    fn test_files_then_environment() {
        let cli = parse(&["-c", "a.json", "-c", "b.json", "--env-prefix", "MYAPP", "check"]);
        let names: Vec<String> = build_providers(&cli).iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a.json", "b.json", "env:MYAPP"]);
    }

    #[test]
    fn test_no_env_drops_environment() {
        let cli = parse(&["-c", "a.json", "--no-env", "check"]);
        assert_eq!(build_providers(&cli).len(), 1);
    }
}

#[tokio::test]
async fn test_no_sources_is_usage_fault() {
    let cli = parse(&["--no-env", "check"]);
    let error = execute_cli(&cli).await.unwrap_err();
    assert!(error.is_usage_fault());
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_check_lists_mapping() {
    let file = config_file(&memory_config());
    let path = file.path().to_str().unwrap();

    let cli = parse(&["-c", path, "--no-env", "check"]);
    let output = execute_cli(&cli).await.unwrap();

    assert!(output.contains("Databases (1):"));
    assert!(output.contains("sessions -> cache"));
    assert!(output.contains("tokens -> cache"));

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "Databases (1):");
    assert_eq!(lines[2], "Repositories (2):");
    assert!(output.ends_with('\n'));
}

#[cfg(feature = "postgresql")]
#[tokio::test]
async fn test_check_never_prints_password() {
    let file = config_file(&json!({
        "databases": {
            "primary": {
                "driver": "postgres",
                "host": "127.0.0.1",
                "port": 1,
                "username": "svc",
                "password": "hunter2"
            }
        },
        "repositories": { "users": "primary" }
    }));
    let path = file.path().to_str().unwrap();

    let cli = parse(&["-c", path, "--no-env", "check"]);
    let output = execute_cli(&cli).await.unwrap();

    assert!(output.contains("users -> primary"));
    assert!(!output.contains("hunter2"));
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_connect_succeeds() {
    let file = config_file(&memory_config());
    let path = file.path().to_str().unwrap();

    let cli = parse(&["-c", path, "--no-env", "connect", "sessions"]);
    let output = execute_cli(&cli).await.unwrap();
    assert!(output.contains("'sessions'"));
    assert!(output.contains("successful"));
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_connect_unknown_repository() {
    let file = config_file(&memory_config());
    let path = file.path().to_str().unwrap();

    let cli = parse(&["-c", path, "--no-env", "connect", "orders"]);
    let error = execute_cli(&cli).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MissingRepository);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_invalid_file_reports_offending_key() {
    let file = config_file(&json!({
        "databases": { "cache": { "driver": "sqlite", "host": ":memory:", "max_connections": 0 } }
    }));
    let path = file.path().to_str().unwrap();

    let cli = parse(&["-c", path, "--no-env", "check"]);
    let error = execute_cli(&cli).await.unwrap_err();
    assert_eq!(
        error.offending_key(),
        Some("databases.cache.max_connections")
    );
}

#[test]
fn test_list_drivers_names_compiled_drivers() {
    let output = list_drivers();
    assert!(output.starts_with("Supported drivers:\n"));
    assert_eq!(
        output.matches("Example: ").count(),
        repopool_core::drivers::supported_drivers().len()
    );
    #[cfg(feature = "sqlite")]
    assert!(output.contains("sqlite"));
    #[cfg(feature = "postgresql")]
    assert!(output.contains("postgres"));
}
