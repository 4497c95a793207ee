//! Command-line interface and command entry points.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::File;
use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpListener;
use tracing::info;

use crate::client::{generate_channel_code, RelayConnection};
use crate::config::Config;
use crate::error::Error;
use crate::protocol::Role;
use crate::relay::RelayServer;
use crate::transfer::{TransferDriver, TransferReceiver, MAX_CHUNK_SIZE};

/// How often and how long a receiver retries role selection while the
/// channel's sender slot is still empty.
const ROLE_RETRY_DELAY: Duration = Duration::from_secs(1);
const ROLE_RETRY_ATTEMPTS: usize = 30;

#[derive(Parser, Debug)]
#[command(
    name = "borehole",
    version,
    about = "Self-hosted relay for teleporting files from one place to another"
)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay server
    Relay {
        /// Address for client connections
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,

        /// Address for the metrics endpoint
        #[arg(long, value_name = "ADDR")]
        metrics_listen: Option<String>,
    },

    /// Send a file through the relay
    Send {
        /// File to send
        file: PathBuf,

        /// Relay address
        #[arg(long, value_name = "ADDR")]
        relay: Option<String>,

        /// Channel code (generated if omitted)
        #[arg(long, value_name = "CODE")]
        channel: Option<String>,

        /// Chunk size in bytes
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<usize>,
    },

    /// Receive a file through the relay
    Receive {
        /// Channel code from the sender
        code: String,

        /// Relay address
        #[arg(long, value_name = "ADDR")]
        relay: Option<String>,

        /// Output path [default: received.bin]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

pub async fn run_relay(
    config: &Config,
    listen: Option<String>,
    metrics_listen: Option<String>,
) -> Result<()> {
    let listen = listen.unwrap_or_else(|| config.relay.listen.clone());
    let metrics_listen = metrics_listen.unwrap_or_else(|| config.relay.metrics_listen.clone());

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind relay listener on {listen}"))?;
    let metrics_listener = TcpListener::bind(&metrics_listen)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {metrics_listen}"))?;

    let server = RelayServer::new(config.relay.handshake_timeout());
    let metrics_task = tokio::spawn(Arc::clone(&server).serve_metrics(metrics_listener));

    tokio::select! {
        result = Arc::clone(&server).serve(listener) => {
            result.context("relay listener failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    metrics_task.abort();
    Ok(())
}

pub async fn run_send(
    config: &Config,
    file: &Path,
    relay: Option<String>,
    channel: Option<String>,
    chunk_size: Option<usize>,
) -> Result<()> {
    let relay_addr = relay.unwrap_or_else(|| config.transfer.relay_addr.clone());
    let chunk_size = chunk_size.unwrap_or(config.transfer.chunk_size);
    ensure!(chunk_size > 0, "chunk size must be positive");
    ensure!(
        chunk_size <= MAX_CHUNK_SIZE,
        "chunk size {chunk_size} too large: the encoded chunk would exceed the frame size limit (max {MAX_CHUNK_SIZE})"
    );

    let source = File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let source_len = source.metadata().await?.len();

    let channel = channel.unwrap_or_else(generate_channel_code);
    println!("Channel code: {}", channel.bold());

    let mut conn = RelayConnection::connect(&relay_addr)
        .await
        .with_context(|| format!("Failed to connect to relay at {relay_addr}"))?;
    conn.join(&channel).await?;
    conn.request_role(Role::Sender).await?;

    println!("Waiting for a receiver to join...");
    conn.await_ready().await?;

    let driver = TransferDriver::new(chunk_size);
    let bar = transfer_bar(driver.total_chunks(source_len));
    driver
        .run(BufReader::new(source), source_len, &mut conn, |sent, _| {
            bar.set_position(sent)
        })
        .await?;
    bar.finish();

    println!("{}", "All chunks sent successfully!".green());
    Ok(())
}

pub async fn run_receive(
    config: &Config,
    code: &str,
    relay: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let relay_addr = relay.unwrap_or_else(|| config.transfer.relay_addr.clone());
    let output = output.unwrap_or_else(|| PathBuf::from("received.bin"));

    let mut conn = RelayConnection::connect(&relay_addr)
        .await
        .with_context(|| format!("Failed to connect to relay at {relay_addr}"))?;
    conn.join(code).await?;

    // The sender may not have claimed its slot yet; retry until it does.
    let mut attempts = 0;
    loop {
        conn.request_role(Role::Receiver).await?;
        match conn.await_ready().await {
            Ok(()) => break,
            Err(Error::RoleConflict(message)) if attempts < ROLE_RETRY_ATTEMPTS => {
                attempts += 1;
                info!(%message, attempt = attempts, "retrying role selection");
                tokio::time::sleep(ROLE_RETRY_DELAY).await;
            }
            Err(err) => return Err(err.into()),
        }
    }

    let sink = File::create(&output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut receiver = TransferReceiver::new(BufWriter::new(sink));

    let bar = transfer_bar(0);
    receiver
        .run(&mut conn, |received, total| {
            if bar.length() != Some(total) {
                bar.set_length(total);
            }
            bar.set_position(received);
        })
        .await?;
    bar.finish();

    println!("{}", "All chunks received successfully!".green());
    println!("Saved to {}", output.display());
    Ok(())
}

fn transfer_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:50.cyan/blue} {pos}/{len} chunks [{percent:>3}%]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▋ "),
    );
    bar
}
