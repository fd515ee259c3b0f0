//! User-facing records, written either as plain text or as msgpack for other programs.

use log::error;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};

/// Output format selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    MsgPack,
}

impl OutputMode {
    pub fn from_flag(msgpack: bool) -> Self {
        if msgpack {
            OutputMode::MsgPack
        } else {
            OutputMode::Human
        }
    }
}

/// Which output mode a record is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Always,
    HumanOnly,
    MachineOnly,
}

impl Audience {
    fn admits(self, mode: OutputMode) -> bool {
        match self {
            Audience::Always => true,
            Audience::HumanOnly => mode == OutputMode::Human,
            Audience::MachineOnly => mode == OutputMode::MsgPack,
        }
    }
}

/// One user-facing event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    #[serde(rename_all = "PascalCase")]
    Info { title: String, data: Value },
    #[serde(rename_all = "PascalCase")]
    Error { title: String, error: String },
}

impl Record {
    pub fn info(title: impl Into<String>, data: impl Into<Value>) -> Self {
        Record::Info {
            title: title.into(),
            data: data.into(),
        }
    }

    pub fn error(title: impl Into<String>, cause: impl ToString) -> Self {
        Record::Error {
            title: title.into(),
            error: cause.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Record::Error { .. })
    }
}

/// Destination stream of a rendered record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

fn human_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(human_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Writes records to stdout/stderr in the selected mode
#[derive(Debug, Clone, Copy)]
pub struct Emitter {
    mode: OutputMode,
}

impl Emitter {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Render a record, or `None` when the audience filter suppresses it
    pub fn render(&self, record: &Record, audience: Audience) -> Option<(Stream, Vec<u8>)> {
        if !audience.admits(self.mode) {
            return None;
        }

        let stream = if record.is_error() {
            Stream::Stderr
        } else {
            Stream::Stdout
        };

        let bytes = match self.mode {
            OutputMode::MsgPack => match rmp_serde::to_vec_named(record) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to encode output record: {}", e);
                    return None;
                }
            },
            OutputMode::Human => {
                let text = match record {
                    Record::Info { data, .. } => human_text(data),
                    Record::Error { error, .. } => error.clone(),
                };
                format!("{}\n", text).into_bytes()
            }
        };

        Some((stream, bytes))
    }

    pub fn emit(&self, record: Record, audience: Audience) {
        let Some((stream, bytes)) = self.render(&record, audience) else {
            return;
        };

        let result = match stream {
            Stream::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(&bytes).and_then(|_| out.flush())
            }
            Stream::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(&bytes).and_then(|_| err.flush())
            }
        };

        if let Err(e) = result {
            error!("Failed to write output: {}", e);
        }
    }
}
