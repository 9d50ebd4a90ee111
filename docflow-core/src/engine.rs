//! Transition engine - coordinates definitions, documents and the store.

use crate::clock::{Clock, SystemClock};
use crate::compiler::{compile, CompiledWorkflow};
use crate::definition::{WorkflowDefinition, WorkflowDefinitionRaw};
use crate::document::Document;
use crate::error::CoreError;
use crate::roles::RoleSet;
use crate::store::WorkflowStore;
use crate::timer::{timer_intents, NoopTimerSink, TimerSink};
use crate::validator::validate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::cell::OnceCell;
use std::sync::Arc;

/// Events an actor may fire on a document right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableEvents {
    pub document_id: String,
    pub current: String,
    pub events: Vec<String>,
}

/// The workflow engine.
///
/// Holds no state of its own beyond its collaborators: definitions are read
/// from the store and recompiled on every call.
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    clock: Arc<dyn Clock>,
    timers: Arc<dyn TimerSink>,
}

impl WorkflowEngine {
    /// Creates an engine over `store` using the system clock and no timer sink.
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            timers: Arc::new(NoopTimerSink),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timer_sink(mut self, timers: Arc<dyn TimerSink>) -> Self {
        self.timers = timers;
        self
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Current time according to the engine's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // =========================================================================
    // Workflow Definitions
    // =========================================================================

    /// Validates, test-compiles and stores a definition. Returns the new id.
    pub fn create_workflow(&self, raw: WorkflowDefinitionRaw) -> Result<String, CoreError> {
        let definition = validate(raw, self.clock.now())?;
        compile(&definition).map_err(|e| self.internal(e))?;

        let name = definition.name().to_string();
        let id = self.store.save_workflow(definition)?;
        tracing::info!("Accepted workflow '{}' as {}", name, id);
        Ok(id)
    }

    /// Parses a JSON definition and creates it.
    pub fn create_workflow_json(&self, bytes: &[u8]) -> Result<String, CoreError> {
        self.create_workflow(WorkflowDefinitionRaw::from_slice(bytes)?)
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowDefinition, CoreError> {
        self.store
            .get_workflow(workflow_id)?
            .ok_or_else(|| CoreError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })
    }

    /// Loads and compiles a stored workflow.
    pub fn compile_workflow(&self, workflow_id: &str) -> Result<CompiledWorkflow, CoreError> {
        let definition = self.get_workflow(workflow_id)?;
        compile(&definition).map_err(|e| self.internal(e))
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Creates a document in the workflow's initial state.
    pub fn create_document(&self, workflow_id: &str, data: Value) -> Result<Document, CoreError> {
        let compiled = self.compile_workflow(workflow_id)?;
        let now = self.clock.now();

        let mut document = Document::new(workflow_id, compiled.initial(), data, now);
        document.due_at = compiled.due_at(compiled.initial(), now)?;
        document.next_reapproval = compiled.next_reapproval(now)?;

        document.id = self.store.create_document_then(document.clone(), &mut |stored| {
            self.timers.replace(&stored.id, timer_intents(stored, &compiled));
        })?;
        tracing::debug!(
            "Created document {} in '{}' (workflow {})",
            document.id,
            document.current,
            workflow_id
        );
        Ok(document)
    }

    pub fn get_document(&self, document_id: &str) -> Result<Document, CoreError> {
        self.store
            .get_document(document_id)?
            .ok_or_else(|| CoreError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    /// Applies `event` on behalf of an actor holding `actor_roles`.
    ///
    /// On success the document moves to the transition's target, its SLA
    /// deadline is recomputed for the new state and its re-approval clock is
    /// reset. On failure the stored document is unchanged.
    pub fn apply_event(
        &self,
        document_id: &str,
        event: &str,
        actor_roles: &RoleSet,
    ) -> Result<Document, CoreError> {
        // Set once `apply` succeeds: the state left and the compiled workflow.
        let applied: OnceCell<(String, CompiledWorkflow)> = OnceCell::new();

        let mut apply = |document: &mut Document| -> Result<(), CoreError> {
            let definition = self.get_workflow(&document.workflow_id)?;
            let compiled = compile(&definition)?;

            if compiled.is_terminal(&document.current) {
                return Err(CoreError::TerminalState {
                    document_id: document.id.clone(),
                    state: document.current.clone(),
                });
            }

            let transition = compiled
                .transition(&document.current, event)
                .ok_or_else(|| CoreError::InvalidTransition {
                    state: document.current.clone(),
                    event: event.to_string(),
                })?;

            if !transition.roles.permits(actor_roles) {
                return Err(CoreError::Forbidden {
                    state: document.current.clone(),
                    event: event.to_string(),
                    required: transition.roles.to_vec(),
                });
            }

            let now = self.clock.now();
            let to = transition.to.clone();
            let from = document.current.clone();
            document.enter(to, now);
            document.due_at = compiled.due_at(&document.current, now)?;
            document.next_reapproval = compiled.next_reapproval(now)?;

            let _ = applied.set((from, compiled));
            Ok(())
        };

        // Runs under the document's lock so intents from racing events reach
        // the sink in commit order.
        let mut committed = |document: &Document| {
            if let Some((_, compiled)) = applied.get() {
                self.timers
                    .replace(&document.id, timer_intents(document, compiled));
            }
        };

        let document = self
            .store
            .modify_document_then(document_id, &mut apply, &mut committed)
            .map_err(|e| self.internal(e))?;

        if let Some((from, _)) = applied.get() {
            tracing::debug!(
                "Applied '{}' to {}: {} -> {}",
                event,
                document.id,
                from,
                document.current
            );
        }
        Ok(document)
    }

    /// Lists the events `actor_roles` could fire on the document now.
    /// Terminal documents accept none.
    pub fn available_events(
        &self,
        document_id: &str,
        actor_roles: &RoleSet,
    ) -> Result<AvailableEvents, CoreError> {
        let document = self.get_document(document_id)?;
        let compiled = self.compile_workflow(&document.workflow_id)?;

        let events = if compiled.is_terminal(&document.current) {
            Vec::new()
        } else {
            compiled
                .transitions_from(&document.current)
                .into_iter()
                .filter(|t| t.roles.permits(actor_roles))
                .map(|t| t.event.clone())
                .collect()
        };

        Ok(AvailableEvents {
            document_id: document.id,
            current: document.current,
            events,
        })
    }

    /// Logs errors that indicate a bug rather than bad input.
    fn internal(&self, err: CoreError) -> CoreError {
        if matches!(
            err,
            CoreError::Compilation { .. } | CoreError::InvariantViolation { .. }
        ) {
            tracing::error!("{}", err);
        }
        err
    }
}
