//! # docflow-storage
//!
//! Storage backends for docflow.
//!
//! This crate provides:
//! - An in-memory store with per-document locking
//! - A JSON file store for single-node persistence
//! - Id assignment for workflows and documents

pub mod error;
pub mod file;
pub mod memory;

pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Generates a workflow id.
pub fn new_workflow_id() -> String {
    format!("wf-{}", uuid::Uuid::new_v4())
}

/// Generates a document id.
pub fn new_document_id() -> String {
    format!("doc-{}", uuid::Uuid::new_v4())
}
