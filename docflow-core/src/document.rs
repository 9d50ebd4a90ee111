//! Documents bound to a workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A document moving through a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Store-assigned identifier (empty until created).
    #[serde(default)]
    pub id: String,

    /// Workflow this document is bound to.
    pub workflow_id: String,

    /// Current state name.
    pub current: String,

    /// Opaque payload supplied at creation.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,

    pub created_at: DateTime<Utc>,

    /// Updated on every mutation.
    pub updated_at: DateTime<Utc>,

    /// SLA deadline of the current state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    /// Next re-approval time, present when the workflow has a policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_reapproval: Option<DateTime<Utc>>,
}

impl Document {
    /// Creates an unsaved document in `initial`.
    pub fn new(
        workflow_id: impl Into<String>,
        initial: impl Into<String>,
        data: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            workflow_id: workflow_id.into(),
            current: initial.into(),
            data,
            created_at: now,
            updated_at: now,
            due_at: None,
            next_reapproval: None,
        }
    }

    /// Moves the document to `to`, clearing the previous SLA deadline.
    pub(crate) fn enter(&mut self, to: impl Into<String>, now: DateTime<Utc>) {
        self.current = to.into();
        self.updated_at = now;
        self.due_at = None;
    }

    /// Returns the document as JSON.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
