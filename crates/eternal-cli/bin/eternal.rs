//! `eternal` binary entry point.
//!
//! Parses arguments, initializes logging on stderr, runs the command, and
//! prints its JSON output on stdout.

use anyhow::Result;
use eternal_cli::CliConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::from_args();
    let output = eternal_cli::run(config).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
