use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use borehole::cli::{run_receive, run_relay, run_send, Cli, Commands};
use borehole::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Relay {
            listen,
            metrics_listen,
        } => run_relay(&config, listen, metrics_listen).await,
        Commands::Send {
            file,
            relay,
            channel,
            chunk_size,
        } => run_send(&config, &file, relay, channel, chunk_size).await,
        Commands::Receive {
            code,
            relay,
            output,
        } => run_receive(&config, &code, relay, output).await,
    }
}
