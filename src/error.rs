//! Error taxonomy for admin calls.
//!
//! Call-level failures (the request itself failed) and operation-level
//! failures (a long-running operation finished with an error) are kept
//! apart: the former may be retried by the caller, the latter is a final
//! business outcome.

use thiserror::Error;

use crate::operation::{Code, Status};

#[derive(Error, Debug)]
pub enum Error {
    /// The service rejected the call.
    #[error("{code}: {message}")]
    Api { code: Code, message: String },

    /// A long-running operation completed with an error.
    #[error("operation {name} failed: {status}")]
    OperationFailed { name: String, status: Status },

    #[error("invalid resource name: {0}")]
    InvalidName(String),

    /// Rejected locally before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server returned an operation envelope that breaks the
    /// done/result pairing.
    #[error("malformed operation {name}: {reason}")]
    MalformedOperation { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Canonical code for this error, where one applies.
    pub fn code(&self) -> Option<Code> {
        match self {
            Error::Api { code, .. } => Some(*code),
            Error::OperationFailed { status, .. } => Some(status.code()),
            Error::InvalidName(_) | Error::InvalidArgument(_) => Some(Code::InvalidArgument),
            Error::Auth(_) => Some(Code::Unauthenticated),
            Error::Transport(e) if e.is_timeout() => Some(Code::DeadlineExceeded),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(Code::NotFound)
    }

    /// Optimistic-concurrency or duplicate-id conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self.code(), Some(Code::Aborted | Code::AlreadyExists))
    }

    /// True for transient call-level faults. A failed operation is never
    /// retryable here: the caller must re-issue the original request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::OperationFailed { .. } => false,
            Error::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => matches!(
                self.code(),
                Some(Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted)
            ),
        }
    }
}
