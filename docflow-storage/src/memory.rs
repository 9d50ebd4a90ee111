//! In-memory store.

use crate::{new_document_id, new_workflow_id};
use dashmap::DashMap;
use docflow_core::{
    CoreError, Document, DocumentCommit, DocumentUpdate, WorkflowDefinition, WorkflowStore,
};
use parking_lot::RwLock;

/// In-memory store.
///
/// Each document sits behind its own lock, so modifications of one document
/// are serialized while different documents proceed in parallel.
#[derive(Default)]
pub struct MemoryStore {
    workflows: DashMap<String, WorkflowDefinition>,
    documents: DashMap<String, RwLock<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workflow_count(&self) -> usize {
        self.workflows.len()
    }
}

impl WorkflowStore for MemoryStore {
    fn save_workflow(&self, mut definition: WorkflowDefinition) -> Result<String, CoreError> {
        if definition.id.is_empty() {
            definition.id = new_workflow_id();
        }
        let id = definition.id.clone();
        self.workflows.insert(id.clone(), definition);
        Ok(id)
    }

    fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>, CoreError> {
        Ok(self.workflows.get(id).map(|r| r.clone()))
    }

    fn create_document(&self, document: Document) -> Result<String, CoreError> {
        self.create_document_then(document, &mut |_| {})
    }

    fn create_document_then(
        &self,
        mut document: Document,
        committed: &mut DocumentCommit<'_>,
    ) -> Result<String, CoreError> {
        document.id = new_document_id();
        let id = document.id.clone();
        let entry = self
            .documents
            .entry(id.clone())
            .or_insert_with(|| RwLock::new(document));
        committed(&*entry.read());
        Ok(id)
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>, CoreError> {
        Ok(self.documents.get(id).map(|r| r.read().clone()))
    }

    fn update_document(&self, document: Document) -> Result<(), CoreError> {
        let entry = self
            .documents
            .get(&document.id)
            .ok_or_else(|| CoreError::DocumentNotFound {
                document_id: document.id.clone(),
            })?;
        *entry.write() = document;
        Ok(())
    }

    fn modify_document_then(
        &self,
        id: &str,
        apply: &mut DocumentUpdate<'_>,
        committed: &mut DocumentCommit<'_>,
    ) -> Result<Document, CoreError> {
        let entry = self
            .documents
            .get(id)
            .ok_or_else(|| CoreError::DocumentNotFound {
                document_id: id.to_string(),
            })?;

        let mut current = entry.write();
        let mut draft = current.clone();
        apply(&mut draft)?;
        *current = draft.clone();
        committed(&*current);
        Ok(draft)
    }
}
