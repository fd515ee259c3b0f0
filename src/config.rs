//! Command line and environment configuration for both binaries.
//!
//! Every flag can also be set through an environment variable (a `.env` file is
//! loaded first); flags win over the environment.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::networking::discovery::{DEFAULT_PORT, DEFAULT_PROBE_TIMEOUT};
use crate::networking::file_transfer::DEFAULT_SENDER_NAME;
use crate::networking::{ScanConfig, TransferClientConfig};
use crate::output::OutputMode;
use crate::receiver::{default_receive_dir, ReceiverConfig};

#[derive(Debug, Parser)]
#[command(name = "fire")]
#[command(about = "Fire, the fast and easy to use local network file transfers!")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub options: CommonOptions,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan for local devices
    Scan,
    /// Send files to a destination
    Send {
        /// Destination host, optionally with a port (as printed by scan)
        destination: String,
        /// Files to send
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct CommonOptions {
    /// Port for scan and send
    #[arg(long, env = "FIRE_PORT", default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,

    /// Name to be shown to other users
    #[arg(long, env = "FIRE_NAME", default_value = DEFAULT_SENDER_NAME, global = true)]
    pub name: String,

    /// Only scan this network interface
    #[arg(long = "dev", env = "FIRE_DEVICE", global = true)]
    pub device: Option<String>,

    /// Include this machine's own address in the scan
    #[arg(long = "include", env = "FIRE_INCLUDE_SELF", global = true)]
    pub include_self: bool,

    /// Return results as msgpack (for use by external programs)
    #[arg(long, env = "FIRE_MSGPACK", global = true)]
    pub msgpack: bool,

    /// Seconds to wait for each probe connection
    #[arg(long = "timeout", env = "FIRE_PROBE_TIMEOUT_SECS", default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs(), global = true)]
    pub probe_timeout_secs: u64,

    /// Maximum simultaneous probe connections (unbounded when unset)
    #[arg(long = "max-probes", env = "FIRE_MAX_PROBES", global = true)]
    pub max_probes: Option<usize>,
}

impl CommonOptions {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_flag(self.msgpack)
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            port: self.port,
            probe_timeout: Duration::from_secs(self.probe_timeout_secs.max(1)),
            max_concurrent_probes: self.max_probes,
            include_self: self.include_self,
            device: self.device.clone(),
            on_peer_found: None,
        }
    }

    pub fn transfer_config(&self) -> TransferClientConfig {
        TransferClientConfig {
            port: self.port,
            sender_name: self.name.clone(),
            ..TransferClientConfig::default()
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "fire-relay")]
#[command(about = "Receive files sent with fire, after confirming each transfer")]
pub struct RelayCli {
    /// Port to listen on
    #[arg(long, env = "FIRE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory offered when accepting a transfer
    #[arg(long = "dest", env = "FIRE_RECEIVE_DIR")]
    pub receive_dir: Option<PathBuf>,
}

impl RelayCli {
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            port: self.port,
            receive_dir: self.receive_dir.clone().unwrap_or_else(default_receive_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_before_and_after_action() {
        let cli = Cli::try_parse_from(["fire", "--port", "3000", "scan", "--include"]).unwrap();
        assert!(matches!(cli.command, Command::Scan));
        assert_eq!(cli.options.port, 3000);
        assert!(cli.options.include_self);
    }

    #[test]
    fn test_send_arguments() {
        let cli = Cli::try_parse_from([
            "fire", "send", "192.168.1.4", "a.txt", "b.txt", "--name", "Alice", "--msgpack",
        ])
        .unwrap();

        match cli.command {
            Command::Send { destination, files } => {
                assert_eq!(destination, "192.168.1.4");
                assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.options.transfer_config().sender_name, "Alice");
        assert_eq!(cli.options.output_mode(), OutputMode::MsgPack);
    }

    #[test]
    fn test_send_requires_files() {
        assert!(Cli::try_parse_from(["fire", "send", "192.168.1.4"]).is_err());
    }

    #[test]
    fn test_scan_config_defaults() {
        let cli = Cli::try_parse_from(["fire", "scan", "--dev", "wlan0"]).unwrap();
        let config = cli.options.scan_config();
        assert_eq!(config.device.as_deref(), Some("wlan0"));
        assert_eq!(config.max_concurrent_probes, None);
        assert!(!config.include_self);
    }
}
