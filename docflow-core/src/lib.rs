//! # docflow-core
//!
//! Workflow engine for docflow.
//!
//! This crate provides:
//! - Workflow definition types and validation
//! - Compilation into a lookup-friendly runtime form
//! - Document creation and role-gated state transitions
//! - SLA deadline and re-approval timestamp computation
//! - The store contract the engine persists through
//! - Timer intents handed to an external dispatcher

pub mod clock;
pub mod compiler;
pub mod definition;
pub mod document;
pub mod duration;
pub mod engine;
pub mod error;
pub mod roles;
pub mod store;
pub mod timer;
pub mod validator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compiler::{compile, CompiledReapproval, CompiledWorkflow};
pub use definition::{
    ReapprovalPolicy, State, Transition, WorkflowDefinition, WorkflowDefinitionRaw,
};
pub use document::Document;
pub use engine::{AvailableEvents, WorkflowEngine};
pub use error::CoreError;
pub use roles::RoleSet;
pub use store::{DocumentCommit, DocumentUpdate, WorkflowStore};
pub use timer::{timer_intents, NoopTimerSink, TimerIntent, TimerKind, TimerQueue, TimerSink};
pub use validator::validate;
