//! Command handlers.

use crate::config::{Config, StorageBackend};
use crate::error::ApiError;
use docflow_core::{
    CoreError, RoleSet, TimerQueue, WorkflowDefinitionRaw, WorkflowEngine, WorkflowStore,
};
use docflow_protocol::message::*;
use docflow_protocol::PROTOCOL_VERSION;
use docflow_storage::{FileStore, MemoryStore};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

/// Service identity and limits reported by INFO.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub storage_backend: String,
    pub max_definition_bytes: usize,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: "docflow".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage_backend: StorageBackend::Memory.as_str().to_string(),
            max_definition_bytes: 1024 * 1024,
        }
    }
}

/// Command handler.
pub struct CommandHandler {
    engine: Arc<WorkflowEngine>,
    info: ServiceInfo,
    /// Queue drained by POLL_TIMERS; `None` when timers are disabled.
    timers: Option<Arc<TimerQueue>>,
}

impl CommandHandler {
    /// Creates a new command handler with timers disabled.
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            info: ServiceInfo::default(),
            timers: None,
        }
    }

    /// Builds the store, engine and timer queue described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let store: Arc<dyn WorkflowStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::File => Arc::new(FileStore::open(&config.storage.data_dir)?),
        };

        let mut engine = WorkflowEngine::new(store);
        let timers = if config.timers.enabled {
            let queue = Arc::new(TimerQueue::new());
            engine = engine.with_timer_sink(queue.clone());
            Some(queue)
        } else {
            None
        };

        let info = ServiceInfo {
            storage_backend: config.storage.backend.as_str().to_string(),
            max_definition_bytes: config.limits.max_definition_bytes,
            ..Default::default()
        };

        let mut handler = Self::new(Arc::new(engine)).with_info(info);
        handler.timers = timers;
        Ok(handler)
    }

    /// Sets the service info and limits.
    pub fn with_info(mut self, info: ServiceInfo) -> Self {
        self.info = info;
        self
    }

    /// Enables POLL_TIMERS against `queue`. The queue must also be the
    /// engine's timer sink for intents to arrive in it.
    pub fn with_timer_queue(mut self, queue: Arc<TimerQueue>) -> Self {
        self.timers = Some(queue);
        self
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// Handles a request and returns a response.
    pub fn handle(&self, request: &Request) -> Response {
        tracing::debug!("Handling {} (id {})", request.op.as_str(), request.id);

        let result = match request.op {
            Operation::Ping => self.handle_ping(),
            Operation::Info => self.handle_info(),
            Operation::CreateWorkflow => self.handle_create_workflow(&request.params),
            Operation::GetWorkflow => self.handle_get_workflow(&request.params),
            Operation::CreateDocument => self.handle_create_document(&request.params),
            Operation::GetDocument => self.handle_get_document(&request.params),
            Operation::ApplyEvent => self.handle_apply_event(&request.params),
            Operation::AvailableEvents => self.handle_available_events(&request.params),
            Operation::PollTimers => self.handle_poll_timers(&request.params),
        };

        match result {
            Ok(value) => Response::ok(&request.id, value).with_server_time(self.engine.now()),
            Err(e) => {
                let code = e.error_code();
                tracing::debug!("{} failed with {}: {}", request.op.as_str(), code, e);

                let mut error = ResponseError::new(code, e.to_string());
                error.retryable = e.is_retryable();
                if let ApiError::Core(CoreError::Forbidden { required, .. }) = &e {
                    error = error.with_detail("required_roles", required.clone());
                }
                Response::error(&request.id, error)
            }
        }
    }

    fn handle_ping(&self) -> Result<Value, ApiError> {
        Ok(json!({"pong": true}))
    }

    fn handle_info(&self) -> Result<Value, ApiError> {
        Ok(json!({
            "server_name": self.info.name,
            "server_version": self.info.version,
            "protocol_version": PROTOCOL_VERSION,
            "storage_backend": self.info.storage_backend,
            "timers_enabled": self.timers.is_some(),
            "max_definition_bytes": self.info.max_definition_bytes,
        }))
    }

    fn handle_create_workflow(&self, params: &Value) -> Result<Value, ApiError> {
        let p: CreateWorkflowParams = parse_params(params)?;

        let raw = match &p.definition {
            Value::String(text) => {
                self.check_definition_size(text.len())?;
                WorkflowDefinitionRaw::from_slice(text.as_bytes())?
            }
            other => {
                self.check_definition_size(serde_json::to_vec(other)?.len())?;
                WorkflowDefinitionRaw::from_json(other)?
            }
        };

        let checksum = raw.checksum();
        let workflow_id = self.engine.create_workflow(raw)?;

        let result = CreateWorkflowResult {
            workflow_id,
            checksum,
        };
        Ok(serde_json::to_value(result)?)
    }

    fn check_definition_size(&self, size: usize) -> Result<(), ApiError> {
        let max = self.info.max_definition_bytes;
        if size > max {
            return Err(ApiError::DefinitionTooLarge { size, max });
        }
        Ok(())
    }

    fn handle_get_workflow(&self, params: &Value) -> Result<Value, ApiError> {
        let p: GetWorkflowParams = parse_params(params)?;

        let definition = self.engine.get_workflow(&p.workflow_id)?;

        let result = GetWorkflowResult {
            checksum: definition.checksum(),
            definition: definition.to_json(),
        };
        Ok(serde_json::to_value(result)?)
    }

    fn handle_create_document(&self, params: &Value) -> Result<Value, ApiError> {
        let p: CreateDocumentParams = parse_params(params)?;

        let document = self.engine.create_document(&p.workflow_id, p.data)?;
        Ok(document.to_json())
    }

    fn handle_get_document(&self, params: &Value) -> Result<Value, ApiError> {
        let p: GetDocumentParams = parse_params(params)?;

        let document = self.engine.get_document(&p.document_id)?;
        Ok(document.to_json())
    }

    fn handle_apply_event(&self, params: &Value) -> Result<Value, ApiError> {
        let p: ApplyEventParams = parse_params(params)?;

        let roles = RoleSet::from(p.roles);
        let document = self.engine.apply_event(&p.document_id, &p.event, &roles)?;
        Ok(document.to_json())
    }

    fn handle_available_events(&self, params: &Value) -> Result<Value, ApiError> {
        let p: AvailableEventsParams = parse_params(params)?;

        let available = self
            .engine
            .available_events(&p.document_id, &RoleSet::from(p.roles))?;

        let result = AvailableEventsResult {
            document_id: available.document_id,
            current: available.current,
            events: available.events,
        };
        Ok(serde_json::to_value(result)?)
    }

    fn handle_poll_timers(&self, params: &Value) -> Result<Value, ApiError> {
        let queue = self.timers.as_ref().ok_or(ApiError::TimersDisabled)?;
        let p: PollTimersParams = parse_params(params)?;

        let now = p.now.unwrap_or_else(|| self.engine.now());
        let timers = queue
            .pop_due(now)
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        if !timers.is_empty() {
            tracing::info!("Released {} due timer(s) as of {}", timers.len(), now);
        }

        let result = PollTimersResult {
            timers,
            pending: queue.len(),
            next_fire_at: queue.next_fire_at(),
        };
        Ok(serde_json::to_value(result)?)
    }
}

/// Decodes operation params; absent params decode like an empty object.
fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, ApiError> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}
