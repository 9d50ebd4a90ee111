//! JSON file store.
//!
//! Layout under the data directory:
//!
//! ```text
//! <dir>/workflows/<id>.json
//! <dir>/documents/<id>.json
//! ```
//!
//! Every write goes to a temporary file that is renamed over the target, so
//! a reader sees either the old or the new content.

use crate::error::StorageError;
use crate::{new_document_id, new_workflow_id};
use dashmap::DashMap;
use docflow_core::{
    CoreError, Document, DocumentCommit, DocumentUpdate, WorkflowDefinition, WorkflowStore,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const WORKFLOWS_DIR: &str = "workflows";
const DOCUMENTS_DIR: &str = "documents";

/// File-backed store for single-node deployments.
pub struct FileStore {
    dir: PathBuf,
    /// Per-document locks serializing read-modify-write.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileStore {
    /// Opens or creates a store at the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(WORKFLOWS_DIR))?;
        fs::create_dir_all(dir.join(DOCUMENTS_DIR))?;

        tracing::info!("Opened file store at {}", dir.display());
        Ok(Self {
            dir,
            locks: DashMap::new(),
        })
    }

    fn workflow_path(&self, id: &str) -> Option<PathBuf> {
        is_valid_id(id).then(|| self.dir.join(WORKFLOWS_DIR).join(format!("{}.json", id)))
    }

    fn document_path(&self, id: &str) -> Option<PathBuf> {
        is_valid_id(id).then(|| self.dir.join(DOCUMENTS_DIR).join(format!("{}.json", id)))
    }

    /// Runs `f` holding the lock for document `id`. The lock entry is
    /// dropped again once no other caller holds or waits on it.
    fn with_lock<T>(&self, id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.entry(id.to_string()).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        self.locks.remove_if(id, |_, l| Arc::strong_count(l) == 1);
        result
    }

    fn write_document(&self, document: &Document) -> Result<(), CoreError> {
        let path = self
            .document_path(&document.id)
            .ok_or_else(|| CoreError::DocumentNotFound {
                document_id: document.id.clone(),
            })?;
        Ok(write_json(&path, document)?)
    }

    fn read_document(&self, id: &str) -> Result<Option<Document>, StorageError> {
        match self.document_path(id) {
            Some(path) => read_json(&path),
            None => Ok(None),
        }
    }
}

impl WorkflowStore for FileStore {
    fn save_workflow(&self, mut definition: WorkflowDefinition) -> Result<String, CoreError> {
        if definition.id.is_empty() {
            definition.id = new_workflow_id();
        }
        let path = self
            .workflow_path(&definition.id)
            .ok_or_else(|| CoreError::InvalidDefinition {
                reason: format!("workflow id '{}' cannot be used as a file name", definition.id),
            })?;
        write_json(&path, &definition)?;
        Ok(definition.id)
    }

    fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>, CoreError> {
        match self.workflow_path(id) {
            Some(path) => Ok(read_json(&path)?),
            None => Ok(None),
        }
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
        self.with_lock(&document.id, || -> Result<(), CoreError> {
            self.write_document(&document)?;
            committed(&document);
            Ok(())
        })?;
        Ok(document.id)
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>, CoreError> {
        Ok(self.read_document(id)?)
    }

    fn update_document(&self, document: Document) -> Result<(), CoreError> {
        self.with_lock(&document.id, || -> Result<(), CoreError> {
            if self.read_document(&document.id)?.is_none() {
                return Err(CoreError::DocumentNotFound {
                    document_id: document.id.clone(),
                });
            }
            self.write_document(&document)
        })
    }

    fn modify_document_then(
        &self,
        id: &str,
        apply: &mut DocumentUpdate<'_>,
        committed: &mut DocumentCommit<'_>,
    ) -> Result<Document, CoreError> {
        self.with_lock(id, || -> Result<Document, CoreError> {
            let mut document = self
                .read_document(id)?
                .ok_or_else(|| CoreError::DocumentNotFound {
                    document_id: id.to_string(),
                })?;
            apply(&mut document)?;
            self.write_document(&document)?;
            committed(&document);
            Ok(document)
        })
    }
}

/// Ids become file names, so only a conservative alphabet is accepted.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");

    let mut file = File::create(&tmp_path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| StorageError::Corruption(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use docflow_core::{validate, RoleSet, State, Transition, WorkflowDefinitionRaw, WorkflowEngine};
    use serde_json::json;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn raw() -> WorkflowDefinitionRaw {
        WorkflowDefinitionRaw {
            name: "review".to_string(),
            states: vec![
                State::new("Open").initial(),
                State::new("Closed").terminal(),
            ],
            transitions: vec![Transition::new("Open", "Closed", "close").with_roles(["owner"])],
            sla: [("Open".to_string(), "24h".to_string())].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_workflow_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let def = validate(raw(), now()).unwrap();
        let id = store.save_workflow(def.clone()).unwrap();
        assert!(dir.path().join("workflows").join(format!("{}.json", id)).exists());

        let loaded = store.get_workflow(&id).unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.raw, def.raw);
        assert_eq!(loaded.created_at, def.created_at);
    }

    #[test]
    fn test_unknown_and_unsafe_ids_are_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(store.get_workflow("wf-missing").unwrap().is_none());
        assert!(store.get_document("doc-missing").unwrap().is_none());
        assert!(store.get_document("../secrets").unwrap().is_none());
        assert!(store.get_document("").unwrap().is_none());
    }

    #[test]
    fn test_documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = FileStore::open(dir.path()).unwrap();
            store
                .create_document(Document::new("wf-1", "Open", json!({"k": "v"}), now()))
                .unwrap()
        };

        let store = FileStore::open(dir.path()).unwrap();
        let doc = store.get_document(&id).unwrap().unwrap();
        assert_eq!(doc.current, "Open");
        assert_eq!(doc.data["k"], "v");
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("documents").join("doc-bad.json"), b"{ nope").unwrap();

        let err = store.get_document("doc-bad").unwrap_err();
        assert!(matches!(err, CoreError::Storage { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unsafe_ids_are_rejected_on_write() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut def = validate(raw(), now()).unwrap();
        def.id = "../escape".to_string();
        let err = store.save_workflow(def).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDefinition { .. }));
        assert!(!err.is_retryable());

        let mut doc = Document::new("wf-1", "Open", json!({}), now());
        doc.id = "../escape".to_string();
        assert!(matches!(
            store.update_document(doc),
            Err(CoreError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn test_lock_entries_are_released() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let id = store
            .create_document(Document::new("wf-1", "Open", json!({"n": 0}), now()))
            .unwrap();
        store
            .modify_document(&id, &mut |doc| {
                doc.data["n"] = json!(1);
                Ok(())
            })
            .unwrap();
        let doc = store.get_document(&id).unwrap().unwrap();
        store.update_document(doc).unwrap();
        let _ = store.modify_document("doc-missing", &mut |_| Ok(()));

        assert!(store.locks.is_empty());
    }

    #[test]
    fn test_concurrent_modifications_are_serialized() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let id = store
            .create_document(Document::new("wf-1", "Open", json!({"n": 0}), now()))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        store
                            .modify_document(&id, &mut |doc| {
                                let n = doc.data["n"].as_u64().unwrap_or(0);
                                doc.data["n"] = json!(n + 1);
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_document(&id).unwrap().unwrap().data["n"], 40);
        assert!(store.locks.is_empty());
    }

    #[test]
    fn test_failed_modify_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = store
            .create_document(Document::new("wf-1", "Open", json!({}), now()))
            .unwrap();

        let result = store.modify_document(&id, &mut |doc| {
            doc.current = "Closed".to_string();
            Err(CoreError::Forbidden {
                state: "Open".into(),
                event: "close".into(),
                required: vec!["owner".into()],
            })
        });
        assert!(result.is_err());
        assert_eq!(store.get_document(&id).unwrap().unwrap().current, "Open");
        assert!(!dir
            .path()
            .join("documents")
            .join(format!("{}.json.tmp", id))
            .exists());
    }

    #[test]
    fn test_engine_over_file_store() {
        let dir = TempDir::new().unwrap();
        let engine = WorkflowEngine::new(Arc::new(FileStore::open(dir.path()).unwrap()));

        let wf = engine.create_workflow(raw()).unwrap();
        let doc = engine.create_document(&wf, json!({})).unwrap();
        assert!(doc.due_at.is_some());

        let closed = engine
            .apply_event(&doc.id, "close", &RoleSet::from(&["owner"][..]))
            .unwrap();
        assert_eq!(closed.current, "Closed");
        assert_eq!(closed.due_at, None);

        let reopened = WorkflowEngine::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        assert_eq!(reopened.get_document(&doc.id).unwrap(), closed);
    }
}
