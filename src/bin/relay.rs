use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use fire::config::RelayCli;
use fire::receiver::{spawn_console_operator, ReviewQueue, TransferServer};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = RelayCli::parse();
    let config = cli.receiver_config();

    let (reviews, requests) = ReviewQueue::channel(1);
    let server = TransferServer::bind(&config, reviews).await?;
    let operator = spawn_console_operator(requests, config.receive_dir.clone());

    println!("Discoverable on port {}", server.local_addr()?.port());
    println!("Accepted files are offered to {}", config.receive_dir.display());

    // First Ctrl+C stops accepting, a second one exits even with a review pending
    let shutdown = Arc::new(Notify::new());
    let stopping = Arc::new(AtomicBool::new(false));
    let notify = shutdown.clone();
    ctrlc::set_handler(move || {
        if stopping.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        notify.notify_one();
    })
    .context("Failed to install Ctrl+C handler")?;

    server
        .serve(async move { shutdown.notified().await })
        .await?;

    // The router owned the last review queue sender, so the operator loop ends
    match timeout(Duration::from_secs(1), operator).await {
        Ok(_) => info!("Console operator stopped"),
        Err(_) => {
            warn!("Console operator still waiting on input, exiting anyway");
            std::process::exit(0);
        }
    }

    Ok(())
}
