//! Error types for every layer of the crate.
//!
//! Nothing here is fatal: each variant maps onto one of the recoverable
//! outcomes the session manager knows how to render (inline rejection,
//! failed turn, system notice).

use thiserror::Error;

/// Failures while turning a file into an [`crate::attachment::Attachment`].
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("File size exceeds the {} MB limit ({} bytes)", .max / (1024 * 1024), .size)]
    TooLarge { size: u64, max: u64 },

    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Attachment payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Could not write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures moving the notes buffer to or from disk.
#[derive(Debug, Error)]
pub enum NotesError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Editor failed: {0}")]
    Editor(String),
}

/// Failures reported by a [`crate::gateway::ModelGateway`].
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Model API error (HTTP {status}): {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed model response: {0}")]
    Malformed(String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("No API key configured. Set GEMINI_API_KEY (or API_KEY) or add api_key to the config file.")]
    MissingApiKey,
}

/// Failures while generating or validating a quiz.
#[derive(Debug, Error)]
pub enum QuizError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Quiz payload is not a valid question list: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Question {index} is invalid: {reason}")]
    InvalidQuestion { index: usize, reason: String },

    #[error("Quiz contains no questions")]
    Empty,
}

/// Reasons a chat submission is refused without touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitRejected {
    #[error("Another request is already in flight")]
    Busy,

    #[error("Type a question or attach a file first")]
    NothingToSend,
}

/// Reasons a quiz generation request is refused without touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuizRejected {
    #[error("Another request is already in flight")]
    Busy,

    #[error("Attach a file before generating a quiz")]
    NoAttachment,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Crate-level error for the binary and other top-level callers.
#[derive(Debug, Error)]
pub enum AnalystError {
    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Notes(#[from] NotesError),

    #[error(transparent)]
    Submit(#[from] SubmitRejected),

    #[error(transparent)]
    QuizRejected(#[from] QuizRejected),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
