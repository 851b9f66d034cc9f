use std::time::Duration;
use thiserror::Error;

/// Failure classes of one classification round trip.
///
/// The transport decides the class once, from the HTTP status or the body;
/// the retry loop only ever matches on the variant.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },
    #[error("classifier server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("classifier returned malformed output: {0}")]
    Malformed(String),
    #[error("classifier request failed: {0}")]
    Fatal(String),
}

impl ClassifierError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, ClassifierError::Fatal(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClassifierError::RateLimited { .. } => "rate_limited",
            ClassifierError::Server { .. } => "server_error",
            ClassifierError::Malformed(_) => "malformed_output",
            ClassifierError::Fatal(_) => "fatal",
        }
    }

    /// Maps a non-success HTTP status to its class.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            429 => ClassifierError::RateLimited { retry_after, message: body },
            408 | 500..=599 => ClassifierError::Server { status, message: body },
            _ => ClassifierError::Fatal(format!("status {}: {}", status, body)),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("clip catalog unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read clip metadata: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid clip metadata: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("failed to read vocabulary: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid vocabulary file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("vocabulary entry {0} has an empty id")]
    EmptyId(usize),
    #[error("duplicate tag id in vocabulary: {0}")]
    Duplicate(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("insertion for {clip_ref} starts at negative offset {offset}")]
    NegativeOffset { clip_ref: String, offset: f64 },
    #[error("insertion for {clip_ref} has non-positive duration {duration}")]
    NonPositiveDuration { clip_ref: String, duration: f64 },
    #[error("insertion for {0} has a non-finite timing value")]
    NonFinite(String),
    #[error("clip reference must not be empty")]
    EmptyClipRef,
}
