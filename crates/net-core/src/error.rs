//! Error types for state reconciliation

use thiserror::Error;

use crate::compare::Mismatch;

/// Stable error classification shared by every entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedDocument,
    VerificationMismatch,
    UnknownCheckpoint,
    AlreadyFinalized,
    CheckpointInProgress,
    RollbackFailed,
    Timeout,
    BackendApplyError,
    LogSinkError,
    InvalidArgument,
    NotSupported,
    Bug,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Main error type for network state operations
#[derive(Debug, Error)]
pub enum NetstateError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Verification failed: {}", format_mismatches(.0))]
    VerificationMismatch(Vec<Mismatch>),

    #[error("Unknown checkpoint: {0}")]
    UnknownCheckpoint(String),

    #[error("Checkpoint {id} is already {status}")]
    AlreadyFinalized { id: String, status: String },

    #[error("Checkpoint {0} is in progress")]
    CheckpointInProgress(String),

    #[error("Rollback of checkpoint {id} failed: {reason}")]
    RollbackFailed { id: String, reason: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Backend failed on '{operation}': {message}")]
    BackendApply { operation: String, message: String },

    #[error("Log sink error: {0}")]
    LogSink(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Bug: {0}")]
    Bug(String),

    /// Wraps a failure with what happened afterwards, keeping its kind.
    #[error("{error} ({note})")]
    Annotated {
        #[source]
        error: Box<NetstateError>,
        note: String,
    },
}

impl NetstateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetstateError::MalformedDocument(_) => ErrorKind::MalformedDocument,
            NetstateError::VerificationMismatch(_) => ErrorKind::VerificationMismatch,
            NetstateError::UnknownCheckpoint(_) => ErrorKind::UnknownCheckpoint,
            NetstateError::AlreadyFinalized { .. } => ErrorKind::AlreadyFinalized,
            NetstateError::CheckpointInProgress(_) => ErrorKind::CheckpointInProgress,
            NetstateError::RollbackFailed { .. } => ErrorKind::RollbackFailed,
            NetstateError::Timeout(_) => ErrorKind::Timeout,
            NetstateError::BackendApply { .. } => ErrorKind::BackendApplyError,
            NetstateError::LogSink(_) => ErrorKind::LogSinkError,
            NetstateError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            NetstateError::NotSupported(_) => ErrorKind::NotSupported,
            NetstateError::Bug(_) => ErrorKind::Bug,
            NetstateError::Annotated { error, .. } => error.kind(),
        }
    }

    pub fn annotate(self, note: impl Into<String>) -> Self {
        NetstateError::Annotated {
            error: Box::new(self),
            note: note.into(),
        }
    }

    pub fn invalid_value(field: impl std::fmt::Display, value: impl std::fmt::Display) -> Self {
        NetstateError::InvalidArgument(format!("invalid value for {}: {}", field, value))
    }

    pub fn missing_field(field: impl std::fmt::Display) -> Self {
        NetstateError::InvalidArgument(format!("missing required field: {}", field))
    }

    /// Error constructor for an error reported by a driver for one operation.
    pub fn from_result(kind: ErrorKind, operation: &str, message: &str) -> Self {
        match kind {
            ErrorKind::BackendApplyError => NetstateError::BackendApply {
                operation: operation.to_string(),
                message: message.to_string(),
            },
            ErrorKind::InvalidArgument => {
                NetstateError::InvalidArgument(format!("{}: {}", operation, message))
            }
            ErrorKind::NotSupported => {
                NetstateError::NotSupported(format!("{}: {}", operation, message))
            }
            ErrorKind::Timeout => NetstateError::Timeout(format!("{}: {}", operation, message)),
            _ => NetstateError::BackendApply {
                operation: operation.to_string(),
                message: format!("{} ({})", message, kind),
            },
        }
    }
}

fn format_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotated_keeps_kind() {
        let err = NetstateError::BackendApply {
            operation: "create interface eth1".to_string(),
            message: "no such device".to_string(),
        }
        .annotate("rollback succeeded");
        assert_eq!(err.kind(), ErrorKind::BackendApplyError);
        assert!(err.to_string().contains("rollback succeeded"));
        assert!(err.to_string().contains("create interface eth1"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::AlreadyFinalized.to_string(), "AlreadyFinalized");
        assert_eq!(ErrorKind::LogSinkError.to_string(), "LogSinkError");
    }
}
