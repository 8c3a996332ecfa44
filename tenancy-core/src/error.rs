use std::fmt;

use tenancy_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TenancyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Event source closed: {0}")]
    EventSourceClosed(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used in logs and watcher messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    FailedPrecondition,
    Cancelled,
    DeadlineExceeded,
    Unavailable,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL",
        };
        f.write_str(label)
    }
}

impl TenancyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TenancyError::NotFound(_) => ErrorCode::NotFound,
            TenancyError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            TenancyError::InvalidArgument(_)
            | TenancyError::Serialization(_)
            | TenancyError::Model(_) => ErrorCode::InvalidArgument,
            TenancyError::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            TenancyError::Cancelled(_) => ErrorCode::Cancelled,
            TenancyError::DeadlineExceeded(_) => ErrorCode::DeadlineExceeded,
            TenancyError::Unavailable(_) | TenancyError::EventSourceClosed(_) => {
                ErrorCode::Unavailable
            }
            TenancyError::Io(_) | TenancyError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TenancyError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, TenancyError::AlreadyExists(_))
    }

    /// Errors caused by the scope ending rather than by the operation itself.
    pub fn is_scope_error(&self) -> bool {
        matches!(
            self,
            TenancyError::Cancelled(_) | TenancyError::DeadlineExceeded(_)
        )
    }

    /// Misconfiguration that retrying cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::InvalidArgument | ErrorCode::FailedPrecondition
        )
    }
}

pub type Result<T> = std::result::Result<T, TenancyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_taxonomy() {
        assert!(TenancyError::NotFound("tenant".into()).is_not_found());
        assert!(TenancyError::AlreadyExists("t".into()).is_already_exists());
        assert!(TenancyError::DeadlineExceeded("wait".into()).is_scope_error());
        assert!(TenancyError::InvalidArgument("x".into()).is_permanent());
        assert!(!TenancyError::Unavailable("inventory".into()).is_permanent());
        assert_eq!(
            TenancyError::EventSourceClosed("inventory".into()).code(),
            ErrorCode::Unavailable
        );
    }
}
