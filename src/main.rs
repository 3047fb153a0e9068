use std::fs;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use lifeplan::api::{Cli, Command, current_month, run_http_server, run_request_json};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .with_context(|| format!("HTTP server on port {port} failed")),
        Command::Run(args) => {
            let json = fs::read_to_string(&args.input)
                .with_context(|| format!("failed to read {}", args.input.display()))?;
            let output = run_request_json(&json, &args, current_month()).map_err(|e| anyhow!(e))?;
            println!("{output}");
            Ok(())
        }
    }
}
