use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to resolve the address space to scan. Aborts the scan.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("failed to list network interfaces: {0}")]
    InterfaceListing(#[source] io::Error),
}

/// Failure while sending files. Fatal to the whole send, nothing is retried.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to open {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid transfer target: {0}")]
    InvalidTarget(String),

    #[error("no files to send")]
    NoFiles,

    #[error("transfer request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Failure inside one receiver session. Logged locally, never sent to the peer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed transfer request: {0}")]
    Protocol(String),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no operator is available to review the transfer")]
    OperatorUnavailable,
}

/// An accept/deny answer that could not be understood. The operator is asked again.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperatorInputError {
    #[error("unrecognized answer {0:?}, expected y or n")]
    UnrecognizedAnswer(String),
}
