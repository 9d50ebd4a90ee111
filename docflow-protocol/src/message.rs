//! JSON message types for requests and responses.

use crate::error::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    // Liveness and server info
    Ping,
    Info,

    // Workflow definitions
    CreateWorkflow,
    GetWorkflow,

    // Documents
    CreateDocument,
    GetDocument,
    ApplyEvent,
    AvailableEvents,

    // Timers
    PollTimers,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Ping => "PING",
            Operation::Info => "INFO",
            Operation::CreateWorkflow => "CREATE_WORKFLOW",
            Operation::GetWorkflow => "GET_WORKFLOW",
            Operation::CreateDocument => "CREATE_DOCUMENT",
            Operation::GetDocument => "GET_DOCUMENT",
            Operation::ApplyEvent => "APPLY_EVENT",
            Operation::AvailableEvents => "AVAILABLE_EVENTS",
            Operation::PollTimers => "POLL_TIMERS",
        }
    }
}

/// Value of the `type` field that tells the two envelopes apart on a shared
/// line stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
}

/// A client asking docflow to perform one [`Operation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Chosen by the client and echoed in the matching response.
    pub id: String,

    pub op: Operation,

    /// Arguments for `op`, decoded by the handler into the matching
    /// `*Params` type below. Absent reads as `null`.
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: impl Into<String>, op: Operation) -> Self {
        Self {
            kind: MessageKind::Request,
            id: id.into(),
            op,
            params: Value::Object(Default::default()),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Why an operation failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: ErrorCode,

    pub message: String,

    /// Set for transient storage failures only. A document rejected by the
    /// workflow (wrong role, terminal state) fails the same way on retry.
    pub retryable: bool,

    /// Structured context, such as the roles a forbidden transition needs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
}

impl ResponseError {
    /// Error with `retryable` taken from the code. Callers that know more
    /// about the failure may override it.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            retryable: code.is_retryable(),
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Envelope fields a transport may use without parsing the payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Engine clock at the time a successful operation completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<DateTime<Utc>>,

    /// Status an HTTP front end should answer an error with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl ResponseMeta {
    fn is_empty(&self) -> bool {
        self.server_time.is_none() && self.http_status.is_none()
    }
}

/// Answer to one [`Request`]. Exactly one of `result` and `error` is set,
/// matching `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Id of the request being answered; empty when the request line could
    /// not be decoded.
    pub id: String,

    pub status: ResponseStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,

    #[serde(default, skip_serializing_if = "ResponseMeta::is_empty")]
    pub meta: ResponseMeta,
}

impl Response {
    fn answering(id: impl Into<String>, status: ResponseStatus) -> Self {
        Self {
            kind: MessageKind::Response,
            id: id.into(),
            status,
            result: None,
            error: None,
            meta: ResponseMeta::default(),
        }
    }

    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        let mut response = Self::answering(id, ResponseStatus::Ok);
        response.result = Some(result);
        response
    }

    /// Error response; `meta.http_status` follows the error code.
    pub fn error(id: impl Into<String>, error: ResponseError) -> Self {
        let mut response = Self::answering(id, ResponseStatus::Error);
        response.meta.http_status = Some(error.code.http_status());
        response.error = Some(error);
        response
    }

    pub fn with_server_time(mut self, at: DateTime<Utc>) -> Self {
        self.meta.server_time = Some(at);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

// ============================================================================
// Operation-specific parameter types
// ============================================================================

/// Parameters for CREATE_WORKFLOW request.
///
/// `definition` is either the definition object or a string holding its raw
/// JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkflowParams {
    pub definition: Value,
}

/// Result for CREATE_WORKFLOW response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkflowResult {
    pub workflow_id: String,
    pub checksum: String,
}

/// Parameters for GET_WORKFLOW request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetWorkflowParams {
    pub workflow_id: String,
}

/// Result for GET_WORKFLOW response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetWorkflowResult {
    pub definition: Value,
    pub checksum: String,
}

/// Parameters for CREATE_DOCUMENT request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocumentParams {
    pub workflow_id: String,
    #[serde(default)]
    pub data: Value,
}

/// Parameters for GET_DOCUMENT request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDocumentParams {
    pub document_id: String,
}

/// Parameters for APPLY_EVENT request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyEventParams {
    pub document_id: String,
    pub event: String,
    /// Roles held by the actor.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Parameters for AVAILABLE_EVENTS request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableEventsParams {
    pub document_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Result for AVAILABLE_EVENTS response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableEventsResult {
    pub document_id: String,
    pub current: String,
    pub events: Vec<String>,
}

/// Parameters for POLL_TIMERS request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollTimersParams {
    /// Poll as of this time instead of the server clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<DateTime<Utc>>,
}

/// Result for POLL_TIMERS response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollTimersResult {
    /// Intents that came due, earliest first.
    pub timers: Vec<Value>,
    /// Intents still pending.
    pub pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_fire_at: Option<DateTime<Utc>>,
}
