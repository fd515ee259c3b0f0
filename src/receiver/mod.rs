//! The `POST /drop` receiver.
//!
//! One session at a time gets past the [`AdmissionGate`]; every other request is
//! answered with "Receiver is busy" straight away. An admitted session is parsed,
//! handed to the operator through the [`ReviewQueue`] and, if accepted, written to
//! disk. The sender only ever sees one of the fixed reply strings.

pub mod admission;
pub mod operator;
pub mod session;

pub use admission::{AdmissionGate, AdmissionGuard, SessionPhase};
pub use operator::{spawn_console_operator, ReviewQueue, ReviewRequest};
use session::persist_files;
pub use session::{
    Decision, FileManifestEntry, TransferOutcome, TransferSession, REPLY_BUSY, REPLY_DENIED,
    REPLY_ERROR, REPLY_SUCCESS,
};

use anyhow::{Context, Result};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::Router;
use log::{debug, error, info};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use crate::error::SessionError;
use crate::networking::discovery::DEFAULT_PORT;
use crate::networking::file_transfer::DROP_PATH;

/// Configuration for the receiver
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Port to listen on, 0 picks a free one
    pub port: u16,
    /// Directory offered to the operator when accepting
    pub receive_dir: PathBuf,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            receive_dir: default_receive_dir(),
        }
    }
}

/// The user's download directory, or the working directory when there is none
pub fn default_receive_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// State shared by all request handlers
#[derive(Debug, Clone)]
pub struct ReceiverState {
    gate: AdmissionGate,
    reviews: ReviewQueue,
}

impl ReceiverState {
    pub fn new(reviews: ReviewQueue) -> Self {
        Self {
            gate: AdmissionGate::new(),
            reviews,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }
}

/// Build the receiver's router
pub fn router(state: ReceiverState) -> Router {
    Router::new()
        .route(DROP_PATH, post(receive_drop))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// Read and discard the rest of a rejected upload
async fn drain(multipart: &mut Multipart) {
    loop {
        match multipart.next_field().await {
            Ok(Some(_field)) => continue,
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped draining rejected upload: {}", e);
                break;
            }
        }
    }
}

async fn receive_drop(
    State(state): State<ReceiverState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> &'static str {
    let Some(guard) = state.gate.try_acquire() else {
        info!("Rejecting incoming transfer, receiver is busy ({})", state.gate.phase());
        if let Ok(mut multipart) = multipart {
            drain(&mut multipart).await;
        }
        return REPLY_BUSY;
    };

    let outcome = match run_session(&state, &guard, multipart).await {
        Ok(outcome) => outcome,
        Err(e) => {
            guard.advance(SessionPhase::Failed);
            error!("Transfer session failed: {}", e);
            TransferOutcome::Failed
        }
    };

    // Dropping the guard returns the receiver to Idle
    drop(guard);
    outcome.reply()
}

async fn run_session(
    state: &ReceiverState,
    guard: &AdmissionGuard,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<TransferOutcome, SessionError> {
    let mut multipart = multipart.map_err(|e| SessionError::Protocol(e.body_text()))?;
    let mut session = TransferSession::from_multipart(&mut multipart).await?;

    info!(
        "Session {}: file transfer incoming from {} ({} file(s), {} bytes)",
        session.id,
        session.sender_name,
        session.files.len(),
        session.total_bytes()
    );

    guard.advance(SessionPhase::Reviewing);
    session.decision = state.reviews.submit(&session).await?;

    match &session.decision {
        Decision::Accepted { destination } => {
            guard.advance(SessionPhase::Writing);
            let written = persist_files(&session.files, destination).await?;
            info!(
                "Session {}: wrote {} file(s) to {}",
                session.id,
                written.len(),
                destination.display()
            );
            Ok(TransferOutcome::Success)
        }
        Decision::Denied => {
            guard.advance(SessionPhase::Denied);
            info!("Session {}: transfer denied", session.id);
            Ok(TransferOutcome::Denied)
        }
        Decision::Pending => Err(SessionError::OperatorUnavailable),
    }
}

/// A bound receiver, ready to serve
pub struct TransferServer {
    listener: TcpListener,
    state: ReceiverState,
}

impl TransferServer {
    /// Bind the receiver on all interfaces
    pub async fn bind(config: &ReceiverConfig, reviews: ReviewQueue) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        Self::bind_addr(addr, reviews).await
    }

    pub async fn bind_addr(addr: SocketAddr, reviews: ReviewQueue) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind receiver to {}", addr))?;

        Ok(Self {
            listener,
            state: ReceiverState::new(reviews),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read receiver address")
    }

    pub fn state(&self) -> &ReceiverState {
        &self.state
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!("Receiver listening on {}{}", addr, DROP_PATH);

        let app = router(self.state);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Receiver stopped with an error")?;

        info!("Receiver on {} shut down", addr);
        Ok(())
    }
}
