//! Core error types.

use thiserror::Error;

/// Errors from the workflow engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid workflow definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("workflow compilation failed: {reason}")]
    Compilation { reason: String },

    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    #[error("workflow not found: {workflow_id}")]
    WorkflowNotFound { workflow_id: String },

    #[error("document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("document {document_id} is in terminal state '{state}'")]
    TerminalState { document_id: String, state: String },

    #[error("invalid transition: cannot apply '{event}' in state '{state}'")]
    InvalidTransition { state: String, event: String },

    #[error("forbidden: '{event}' in state '{state}' requires one of {required:?}")]
    Forbidden {
        state: String,
        event: String,
        required: Vec<String>,
    },

    /// `retryable` is false when retrying cannot help, such as a stored
    /// record that no longer parses.
    #[error("storage error: {reason}")]
    Storage { reason: String, retryable: bool },
}

impl CoreError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        CoreError::InvalidDefinition {
            reason: reason.into(),
        }
    }

    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        CoreError::InvariantViolation {
            reason: reason.into(),
        }
    }

    /// Returns whether this error indicates the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage { retryable: true, .. })
    }

    /// Returns an error code suitable for protocol responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidDefinition { .. } => "INVALID_DEFINITION",
            CoreError::Compilation { .. } => "COMPILATION_ERROR",
            CoreError::InvariantViolation { .. } => "INVARIANT_VIOLATION",
            CoreError::WorkflowNotFound { .. } => "WORKFLOW_NOT_FOUND",
            CoreError::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND",
            CoreError::TerminalState { .. } => "TERMINAL_STATE",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::Forbidden { .. } => "FORBIDDEN",
            CoreError::Storage { .. } => "STORAGE_ERROR",
        }
    }
}
