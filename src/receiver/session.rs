use axum::body::Bytes;
use axum::extract::Multipart;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{OperatorInputError, SessionError};
use crate::networking::file_transfer::{FILE_FIELD, NAME_FIELD};

pub const REPLY_SUCCESS: &str = "Transfer success";
pub const REPLY_DENIED: &str = "Transfer denied";
pub const REPLY_BUSY: &str = "Receiver is busy";
pub const REPLY_ERROR: &str = "Error occured on server";

/// Name and size of one incoming file, as shown to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifestEntry {
    pub filename: String,
    pub size_bytes: u64,
}

impl fmt::Display for FileManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.filename, self.size_bytes)
    }
}

/// An incoming file held in memory until the operator decides
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub entry: FileManifestEntry,
    pub data: Bytes,
}

/// The operator's answer for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Pending,
    Accepted { destination: PathBuf },
    Denied,
}

/// The accept/deny part of an operator answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Deny,
}

/// Interpret an accept/deny answer. "y" accepts, "n" or nothing denies.
pub fn parse_answer(answer: &str) -> Result<Verdict, OperatorInputError> {
    let trimmed = answer.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "y" => Ok(Verdict::Accept),
        "n" | "" => Ok(Verdict::Deny),
        _ => Err(OperatorInputError::UnrecognizedAnswer(trimmed.to_string())),
    }
}

/// How a session ended, as far as the sender is told
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Denied,
    Failed,
}

impl TransferOutcome {
    pub fn reply(self) -> &'static str {
        match self {
            TransferOutcome::Success => REPLY_SUCCESS,
            TransferOutcome::Denied => REPLY_DENIED,
            TransferOutcome::Failed => REPLY_ERROR,
        }
    }
}

/// One admitted transfer request
#[derive(Debug)]
pub struct TransferSession {
    pub id: Uuid,
    pub sender_name: String,
    pub files: Vec<ReceivedFile>,
    pub decision: Decision,
}

impl TransferSession {
    pub fn manifest(&self) -> Vec<FileManifestEntry> {
        self.files.iter().map(|f| f.entry.clone()).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.entry.size_bytes).sum()
    }

    /// Parse a multipart upload into a session.
    ///
    /// Requires exactly one `name` field and at least one `file` field. Other
    /// fields are skipped.
    pub async fn from_multipart(multipart: &mut Multipart) -> Result<Self, SessionError> {
        let mut sender_name: Option<String> = None;
        let mut files = Vec::new();

        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().map(str::to_owned);
            match field_name.as_deref() {
                Some(NAME_FIELD) => {
                    if sender_name.is_some() {
                        return Err(SessionError::Protocol("duplicate name field".to_string()));
                    }
                    sender_name = Some(field.text().await?);
                }
                Some(FILE_FIELD) => {
                    let filename = confine_filename(field.file_name())?;
                    let data = field.bytes().await?;
                    files.push(ReceivedFile {
                        entry: FileManifestEntry {
                            filename,
                            size_bytes: data.len() as u64,
                        },
                        data,
                    });
                }
                other => debug!("Skipping unexpected multipart field {:?}", other),
            }
        }

        let sender_name =
            sender_name.ok_or_else(|| SessionError::Protocol("missing name field".to_string()))?;
        if files.is_empty() {
            return Err(SessionError::Protocol("no file fields".to_string()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            sender_name,
            files,
            decision: Decision::Pending,
        })
    }
}

/// Reduce a sender supplied filename to its last path component
pub fn confine_filename(raw: Option<&str>) -> Result<String, SessionError> {
    let raw = raw.ok_or_else(|| SessionError::Protocol("file field without filename".to_string()))?;
    // Senders on other platforms may use backslashes
    let normalized = raw.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| SessionError::Protocol(format!("unusable filename {:?}", raw)))
}

/// Write every file under `destination`, stopping at the first failure.
///
/// Files written before a failure are left in place. Returns the written paths.
pub async fn persist_files(
    files: &[ReceivedFile],
    destination: &Path,
) -> Result<Vec<PathBuf>, SessionError> {
    tokio::fs::create_dir_all(destination)
        .await
        .map_err(|source| SessionError::Io {
            path: destination.to_path_buf(),
            source,
        })?;

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = destination.join(&file.entry.filename);
        tokio::fs::write(&path, &file.data)
            .await
            .map_err(|source| SessionError::Io {
                path: path.clone(),
                source,
            })?;

        let hash = Sha256::digest(&file.data);
        info!(
            "Wrote {} ({} bytes, sha256 {:x})",
            path.display(),
            file.entry.size_bytes,
            hash
        );
        written.push(path);
    }

    Ok(written)
}
