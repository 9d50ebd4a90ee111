//! Workflow definition types.
//!
//! Workflow definitions use a JSON DSL:
//!
//! ```json
//! {
//!   "name": "PurchaseOrderApproval",
//!   "states": [
//!     {"name": "Draft", "initial": true},
//!     {"name": "ManagerApproval"},
//!     {"name": "Approved", "terminal": true}
//!   ],
//!   "transitions": [
//!     {"from": "Draft", "to": "ManagerApproval", "event": "submit", "roles": ["author"]},
//!     {"from": "ManagerApproval", "to": "Approved", "event": "approve", "roles": ["manager"]}
//!   ],
//!   "sla": {"ManagerApproval": "72h"},
//!   "reapproval": {"after": "2592h", "toState": "ManagerApproval"}
//! }
//! ```

use crate::error::CoreError;
use crate::roles::RoleSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A state in the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub initial: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub terminal: bool,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: false,
            terminal: false,
        }
    }

    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Reads an explicit `null` as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A role-gated edge between two states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Source state.
    pub from: String,

    /// Target state.
    pub to: String,

    /// Event that triggers this transition.
    pub event: String,

    /// Roles allowed to fire the transition (empty = anyone).
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "RoleSet::is_empty"
    )]
    pub roles: RoleSet,
}

impl Transition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            event: event.into(),
            roles: RoleSet::new(),
        }
    }

    pub fn with_roles<S: Into<String>>(mut self, roles: impl IntoIterator<Item = S>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }
}

/// Workflow-level policy returning idle documents for re-approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapprovalPolicy {
    /// Idle time after which re-approval is due.
    pub after: String,

    /// State the document should be routed back to.
    #[serde(rename = "toState")]
    pub to_state: String,
}

/// Raw workflow definition as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinitionRaw {
    /// Human-readable workflow name.
    #[serde(default)]
    pub name: String,

    /// Declared states, in definition order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub states: Vec<State>,

    /// Declared transitions, in definition order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub transitions: Vec<Transition>,

    /// SLA duration per state name.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub sla: BTreeMap<String, String>,

    /// Optional re-approval policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reapproval: Option<ReapprovalPolicy>,
}

impl WorkflowDefinitionRaw {
    /// Parses a raw definition from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::invalid(format!("invalid json: {}", e)))
    }

    /// Parses a raw definition from a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        Self::deserialize(json).map_err(|e| CoreError::invalid(format!("invalid json: {}", e)))
    }

    /// Returns the state with the given name, if declared.
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    /// Returns true if the given state name is declared.
    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    /// CRC32C of the canonical JSON encoding, as lowercase hex.
    pub fn checksum(&self) -> String {
        let json_bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:08x}", crc32c::crc32c(&json_bytes))
    }
}

/// An accepted workflow definition.
///
/// Produced by [`crate::validator::validate`]; the store assigns `id` on first
/// save. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Store-assigned identifier (empty until first save).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(flatten)]
    pub raw: WorkflowDefinitionRaw,

    /// When the definition was accepted.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn name(&self) -> &str {
        &self.raw.name
    }

    pub fn states(&self) -> &[State] {
        &self.raw.states
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.raw.transitions
    }

    pub fn sla(&self) -> &BTreeMap<String, String> {
        &self.raw.sla
    }

    pub fn reapproval(&self) -> Option<&ReapprovalPolicy> {
        self.raw.reapproval.as_ref()
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.raw.has_state(name)
    }

    /// Checksum of the definition content (id and timestamp excluded).
    pub fn checksum(&self) -> String {
        self.raw.checksum()
    }

    /// Returns the definition as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
