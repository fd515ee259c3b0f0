use clap::Parser;
use dotenv::dotenv;
use fire::config::{Cli, Command, CommonOptions};
use fire::networking::{discovery, TransferClient};
use fire::output::{Audience, Emitter, Record};
use log::{debug, info};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

async fn run_scan(options: &CommonOptions, out: Emitter) -> Result<(), Record> {
    out.emit(Record::info("status", "Scanning..."), Audience::HumanOnly);

    let mut config = options.scan_config();
    config.on_peer_found = Some(Arc::new(move |addr: SocketAddr| {
        out.emit(Record::info("found", format!("Found {}", addr)), Audience::HumanOnly);
    }));

    let peers = discovery::scan(&config)
        .await
        .map_err(|e| Record::error("scan", e))?;

    info!("Discovered {} peer(s)", peers.len());
    let peers: Vec<String> = peers.iter().map(ToString::to_string).collect();
    if peers.is_empty() {
        out.emit(Record::info("status", "No devices found"), Audience::HumanOnly);
    }
    out.emit(Record::info("peers", json!(peers)), Audience::Always);
    Ok(())
}

async fn run_send(
    options: &CommonOptions,
    destination: &str,
    files: &[PathBuf],
    out: Emitter,
) -> Result<(), Record> {
    for file in files {
        out.emit(
            Record::info("status", format!("Reading file {}", file.display())),
            Audience::HumanOnly,
        );
    }

    let client =
        TransferClient::new(options.transfer_config()).map_err(|e| Record::error("send", e))?;

    out.emit(
        Record::info("status", format!("Transferring to {}", destination)),
        Audience::HumanOnly,
    );

    let reply = client
        .send_files(destination, files)
        .await
        .map_err(|e| Record::error("send", e))?;

    out.emit(Record::info("reply", reply), Audience::Always);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if it exists
    dotenv().ok();

    // Initialize logging, quiet by default so it does not mix with command output
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("warn"));

    let cli = Cli::parse();
    let out = Emitter::new(cli.options.output_mode());
    debug!("Parsed command line: {:?}", cli);

    let result = match &cli.command {
        Command::Scan => run_scan(&cli.options, out).await,
        Command::Send { destination, files } => run_send(&cli.options, destination, files, out).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(record) => {
            out.emit(record, Audience::Always);
            ExitCode::FAILURE
        }
    }
}
