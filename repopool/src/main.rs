//! Command line front end for repopool.
//!
//! Loads pool configuration from JSON files and the environment, then either
//! reports what it found, tests one repository's connection, or lists the
//! compiled-in drivers.

use clap::Parser;
use repopool::{Cli, execute_cli};
use repopool_core::{LogFormat, Result, init_logging};
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.global.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(cli.global.verbose, cli.global.quiet, format)?;

    match execute_cli(&cli).await {
        Ok(output) => {
            print!("{output}");
            Ok(())
        }
        Err(e) => {
            error!(kind = %e.kind(), "{}", e);
            Err(e)
        }
    }
}
