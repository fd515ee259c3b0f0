//! Decision boundary between a suspended transfer session and the local operator.
//!
//! The HTTP handler submits a [`ReviewRequest`] and waits on its reply while the
//! server keeps answering other requests. The console operator below answers from
//! stdin; tests answer through the same queue.

use log::{error, info, warn};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::session::{parse_answer, Decision, FileManifestEntry, TransferSession, Verdict};
use crate::error::SessionError;

/// A transfer waiting for the operator to accept or deny it
#[derive(Debug)]
pub struct ReviewRequest {
    pub session_id: Uuid,
    pub sender_name: String,
    pub manifest: Vec<FileManifestEntry>,
    reply: oneshot::Sender<Decision>,
}

impl ReviewRequest {
    /// Accept and save into `destination`. Returns false if the session is gone.
    pub fn accept(self, destination: impl Into<PathBuf>) -> bool {
        let destination = destination.into();
        self.reply.send(Decision::Accepted { destination }).is_ok()
    }

    /// Deny the transfer. Returns false if the session is gone.
    pub fn deny(self) -> bool {
        self.reply.send(Decision::Denied).is_ok()
    }

    pub fn total_bytes(&self) -> u64 {
        self.manifest.iter().map(|e| e.size_bytes).sum()
    }
}

/// Sending half of the review channel, shared by request handlers
#[derive(Debug, Clone)]
pub struct ReviewQueue {
    tx: mpsc::Sender<ReviewRequest>,
}

impl ReviewQueue {
    /// Create a queue and the receiving end the operator reads from
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ReviewRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Present a session to the operator and wait for the decision
    pub async fn submit(&self, session: &TransferSession) -> Result<Decision, SessionError> {
        let (reply, decision) = oneshot::channel();
        let request = ReviewRequest {
            session_id: session.id,
            sender_name: session.sender_name.clone(),
            manifest: session.manifest(),
            reply,
        };

        self.tx
            .send(request)
            .await
            .map_err(|_| SessionError::OperatorUnavailable)?;

        match decision.await {
            Ok(Decision::Pending) | Err(_) => Err(SessionError::OperatorUnavailable),
            Ok(decision) => Ok(decision),
        }
    }
}

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    // End of input reads as an empty answer
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Ask the operator about one transfer on `input`/`output`.
///
/// Unrecognized answers are asked again. After an accept the operator picks a
/// directory, an empty answer selects `default_dir`.
pub fn review_interactively<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    request: &ReviewRequest,
    default_dir: &Path,
) -> io::Result<Decision> {
    writeln!(
        output,
        "File transfer incoming from {} ({} file(s), {} bytes)",
        request.sender_name,
        request.manifest.len(),
        request.total_bytes()
    )?;
    for entry in &request.manifest {
        writeln!(output, "  {}", entry)?;
    }

    let verdict = loop {
        write!(output, "Accept transfer? [y/N]: ")?;
        output.flush()?;
        match parse_answer(&read_answer(input)?) {
            Ok(verdict) => break verdict,
            Err(e) => writeln!(output, "{}", e)?,
        }
    };

    if verdict == Verdict::Deny {
        return Ok(Decision::Denied);
    }

    write!(output, "Save to directory [{}]: ", default_dir.display())?;
    output.flush()?;
    let answer = read_answer(input)?;
    let destination = if answer.is_empty() {
        default_dir.to_path_buf()
    } else {
        PathBuf::from(answer)
    };

    Ok(Decision::Accepted { destination })
}

/// Answer review requests from the terminal until the queue closes
pub fn spawn_console_operator(
    mut requests: mpsc::Receiver<ReviewRequest>,
    default_dir: PathBuf,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Some(request) = requests.blocking_recv() {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut output = io::stdout();

            match review_interactively(&mut input, &mut output, &request, &default_dir) {
                Ok(Decision::Accepted { destination }) => {
                    info!("Session {} accepted, saving to {}", request.session_id, destination.display());
                    if !request.accept(destination) {
                        warn!("Sender went away before the transfer was accepted");
                    }
                }
                Ok(_) => {
                    info!("Session denied");
                    request.deny();
                }
                Err(e) => {
                    // Dropping the request fails the session
                    error!("Failed to read operator answer: {}", e);
                }
            }
        }
        info!("Review queue closed, console operator stopping");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_request() -> (ReviewRequest, oneshot::Receiver<Decision>) {
        let (reply, rx) = oneshot::channel();
        let request = ReviewRequest {
            session_id: Uuid::new_v4(),
            sender_name: "Alice".to_string(),
            manifest: vec![
                FileManifestEntry {
                    filename: "a.txt".to_string(),
                    size_bytes: 5,
                },
                FileManifestEntry {
                    filename: "b.txt".to_string(),
                    size_bytes: 10,
                },
            ],
            reply,
        };
        (request, rx)
    }

    fn review(answers: &str) -> (Decision, String) {
        let (request, _rx) = sample_request();
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let decision =
            review_interactively(&mut input, &mut output, &request, Path::new("/tmp/drop")).unwrap();
        (decision, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_accept_with_default_directory() {
        let (decision, output) = review("Y\n\n");
        assert_eq!(
            decision,
            Decision::Accepted {
                destination: PathBuf::from("/tmp/drop")
            }
        );
        assert!(output.contains("File transfer incoming from Alice (2 file(s), 15 bytes)"));
        assert!(output.contains("a.txt (5 bytes)"));
    }

    #[test]
    fn test_accept_with_chosen_directory() {
        let (decision, _) = review("y\n/srv/inbox\n");
        assert_eq!(
            decision,
            Decision::Accepted {
                destination: PathBuf::from("/srv/inbox")
            }
        );
    }

    #[test]
    fn test_deny_answers() {
        assert_eq!(review("n\n").0, Decision::Denied);
        assert_eq!(review("N\n").0, Decision::Denied);
        assert_eq!(review("\n").0, Decision::Denied);
        // End of input
        assert_eq!(review("").0, Decision::Denied);
    }

    #[test]
    fn test_unrecognized_answer_asks_again() {
        let (decision, output) = review("maybe\nwhat\ny\n\n");
        assert!(matches!(decision, Decision::Accepted { .. }));
        assert_eq!(output.matches("Accept transfer? [y/N]: ").count(), 3);
        assert!(output.contains("unrecognized answer \"maybe\""));
    }

    #[tokio::test]
    async fn test_reply_reaches_session() {
        let (request, rx) = sample_request();
        assert!(request.accept("/tmp/x"));
        assert_eq!(
            rx.await.unwrap(),
            Decision::Accepted {
                destination: PathBuf::from("/tmp/x")
            }
        );

        let (request, rx) = sample_request();
        drop(rx);
        assert!(!request.deny());
    }
}
