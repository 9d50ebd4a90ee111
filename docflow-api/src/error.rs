//! Request surface error types.

use crate::config::ConfigError;
use docflow_core::CoreError;
use docflow_protocol::{ErrorCode, ProtocolError};
use docflow_storage::StorageError;
use thiserror::Error;

/// Errors surfaced to clients or to the process that hosts the handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("definition too large: {size} bytes (max {max})")]
    DefinitionTooLarge { size: usize, max: usize },

    #[error("timers are disabled")]
    TimersDisabled,
}

impl ApiError {
    /// Converts to protocol error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ApiError::Core(e) => match e.error_code() {
                "INVALID_DEFINITION" => ErrorCode::InvalidDefinition,
                "WORKFLOW_NOT_FOUND" => ErrorCode::WorkflowNotFound,
                "DOCUMENT_NOT_FOUND" => ErrorCode::DocumentNotFound,
                "TERMINAL_STATE" => ErrorCode::TerminalState,
                "INVALID_TRANSITION" => ErrorCode::InvalidTransition,
                "FORBIDDEN" => ErrorCode::Forbidden,
                "STORAGE_ERROR" => ErrorCode::StorageError,
                _ => ErrorCode::InternalError,
            },
            ApiError::Storage(_) => ErrorCode::StorageError,
            ApiError::Protocol(_) => ErrorCode::BadRequest,
            ApiError::Json(_) => ErrorCode::BadRequest,
            ApiError::Config(_) => ErrorCode::InternalError,
            ApiError::InvalidRequest(_) => ErrorCode::BadRequest,
            ApiError::DefinitionTooLarge { .. } => ErrorCode::PayloadTooLarge,
            ApiError::TimersDisabled => ErrorCode::BadRequest,
        }
    }

    /// Returns whether this error is retryable. Storage failures carry
    /// their own verdict; everything else follows the error code.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Core(e @ CoreError::Storage { .. }) => e.is_retryable(),
            ApiError::Storage(e) => e.is_retryable(),
            other => other.error_code().is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_codes() {
        let cases = [
            (
                CoreError::InvalidDefinition {
                    reason: "x".into(),
                },
                ErrorCode::InvalidDefinition,
            ),
            (
                CoreError::DocumentNotFound {
                    document_id: "doc-1".into(),
                },
                ErrorCode::DocumentNotFound,
            ),
            (
                CoreError::TerminalState {
                    document_id: "doc-1".into(),
                    state: "Approved".into(),
                },
                ErrorCode::TerminalState,
            ),
            (
                CoreError::Forbidden {
                    state: "Review".into(),
                    event: "approve".into(),
                    required: vec!["manager".into()],
                },
                ErrorCode::Forbidden,
            ),
            (
                CoreError::Compilation { reason: "x".into() },
                ErrorCode::InternalError,
            ),
            (
                CoreError::InvariantViolation { reason: "x".into() },
                ErrorCode::InternalError,
            ),
            (
                CoreError::Storage {
                    reason: "x".into(),
                    retryable: true,
                },
                ErrorCode::StorageError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).error_code(), code);
        }
    }

    #[test]
    fn test_only_transient_storage_is_retryable() {
        assert!(ApiError::from(CoreError::Storage {
            reason: "x".into(),
            retryable: true,
        })
        .is_retryable());
        let corrupt = ApiError::from(CoreError::Storage {
            reason: "x".into(),
            retryable: false,
        });
        assert_eq!(corrupt.error_code(), ErrorCode::StorageError);
        assert!(!corrupt.is_retryable());
        assert!(!ApiError::Storage(StorageError::Corruption("x".into())).is_retryable());
        assert!(!ApiError::InvalidRequest("x".into()).is_retryable());
        assert!(!ApiError::TimersDisabled.is_retryable());
        assert!(!ApiError::from(CoreError::Compilation { reason: "x".into() }).is_retryable());
    }

    #[test]
    fn test_too_large_status() {
        let err = ApiError::DefinitionTooLarge { size: 10, max: 5 };
        assert_eq!(err.error_code().http_status(), 413);
        assert!(err.to_string().contains("10"));
    }
}
