//! Persistence boundary the engine depends on.

use crate::definition::WorkflowDefinition;
use crate::document::Document;
use crate::error::CoreError;

/// Closure applied to a document under [`WorkflowStore::modify_document`].
pub type DocumentUpdate<'a> = dyn FnMut(&mut Document) -> Result<(), CoreError> + 'a;

/// Closure run with a document's committed content while the store still
/// holds that document's lock.
pub type DocumentCommit<'a> = dyn FnMut(&Document) + 'a;

/// Storage for workflow definitions and documents.
///
/// Backend failures are reported as [`CoreError::Storage`].
pub trait WorkflowStore: Send + Sync {
    /// Persists a definition, assigning an id if it has none, and returns the
    /// id. Saving again under an existing id overwrites.
    fn save_workflow(&self, definition: WorkflowDefinition) -> Result<String, CoreError>;

    fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>, CoreError>;

    /// Persists a new document, assigning its id, and returns the id.
    fn create_document(&self, document: Document) -> Result<String, CoreError>;

    /// Like [`create_document`](Self::create_document), then runs `committed`
    /// with the stored document (id assigned) before anyone else can modify
    /// it.
    ///
    /// The default implementation runs `committed` after `create_document`
    /// returns, which is only safe while the new id is known to no other
    /// caller.
    fn create_document_then(
        &self,
        mut document: Document,
        committed: &mut DocumentCommit<'_>,
    ) -> Result<String, CoreError> {
        document.id = self.create_document(document.clone())?;
        committed(&document);
        Ok(document.id)
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>, CoreError>;

    /// Overwrites an existing document.
    fn update_document(&self, document: Document) -> Result<(), CoreError>;

    /// Read-modify-write of one document.
    ///
    /// `apply` runs against a copy; the copy is stored only if `apply`
    /// succeeds, and the stored result is returned. Returns
    /// `DocumentNotFound` when `id` is unknown.
    fn modify_document(
        &self,
        id: &str,
        apply: &mut DocumentUpdate<'_>,
    ) -> Result<Document, CoreError> {
        self.modify_document_then(id, apply, &mut |_| {})
    }

    /// [`modify_document`](Self::modify_document) that also runs `committed`
    /// after a successful write, before the next modification of the same
    /// document can start. Work that must observe commits in order (such as
    /// rescheduling timers) belongs in `committed`.
    ///
    /// The default implementation is a plain get, apply, update sequence and
    /// is NOT atomic: two concurrent calls may both read the same version.
    /// Stores shared between threads should override it under a per-document
    /// lock.
    fn modify_document_then(
        &self,
        id: &str,
        apply: &mut DocumentUpdate<'_>,
        committed: &mut DocumentCommit<'_>,
    ) -> Result<Document, CoreError> {
        let mut document = self
            .get_document(id)?
            .ok_or_else(|| CoreError::DocumentNotFound {
                document_id: id.to_string(),
            })?;
        apply(&mut document)?;
        self.update_document(document.clone())?;
        committed(&document);
        Ok(document)
    }
}
