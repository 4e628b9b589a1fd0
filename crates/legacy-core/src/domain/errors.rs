//! Errors - error types and their classification.
//!
//! `NotifierError` is what the state machine surfaces to the caller.
//! `PortError` wraps every failure coming out of an adapter (email or storage)
//! and is propagated as-is: nothing inside a single invocation retries.

use thiserror::Error;

/// ErrorKind classifies an error for the caller deciding how to report it.
///
/// - Configuration: fix the configuration and rerun
/// - Defect: a state-machine bug or corrupted record
/// - Infrastructure: email/storage backend failure (next trigger retries)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Defect,
    Infrastructure,
}

/// Validation failure of a `Notification` record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("sequence must contain at least two days, got {0}")]
    SequenceTooShort(usize),

    #[error("sequence must be strictly increasing: day {current} at index {index} follows {previous}")]
    SequenceNotIncreasing {
        index: usize,
        previous: u32,
        current: u32,
    },

    #[error("lastSequenceIndexSent ({index}) must be less than the sequence length ({len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("lastSequenceSentAt must be greater than or equal to startedAt")]
    SentBeforeStart,

    #[error("startedAt must be less than or equal to the current date")]
    StartedInFuture,
}

/// Failure surfaced by an email or storage adapter.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("credentials for email client '{0}' not found")]
    MissingCredentials(String),

    #[error("malformed credentials: {0}")]
    MalformedCredentials(String),

    #[error("HTTP {status}: {context}")]
    Http { status: u16, context: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("unexpected provider response: {0}")]
    Provider(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// NotifierError is the domain error of one `notify()` / `authenticate()` run.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid notification: {0}")]
    InvalidNotification(#[from] NotificationError),

    #[error(transparent)]
    Port(#[from] PortError),
}

impl NotifierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotifierError::Configuration(_) => ErrorKind::Configuration,
            NotifierError::Precondition(_)
            | NotifierError::InvariantViolation(_)
            | NotifierError::InvalidNotification(_) => ErrorKind::Defect,
            NotifierError::Port(_) => ErrorKind::Infrastructure,
        }
    }
}
