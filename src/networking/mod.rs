pub mod address_space;
pub mod discovery;
pub mod interface;
pub mod file_transfer;

// Re-export key components for easier access
pub use address_space::Ipv4Prefix;
pub use discovery::{scan, ScanConfig, PeerCallback};
pub use interface::{InterfacePrefix, InterfaceType};
pub use file_transfer::{TransferClient, TransferClientConfig};
