//! Local network peer discovery and file drop.
//!
//! `networking` scans the local IPv4 subnets for listening peers and sends files
//! to one of them; `receiver` is the other end, admitting one reviewed transfer
//! at a time.

pub mod config;
pub mod error;
pub mod networking;
pub mod output;
pub mod receiver;
