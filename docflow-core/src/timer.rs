//! Timer intents handed to an external dispatcher.
//!
//! The engine never fires timers itself. After each successful create or
//! apply it derives the document's pending intents from its timestamps and
//! passes them to a [`TimerSink`], replacing whatever was pending before.

use crate::compiler::CompiledWorkflow;
use crate::document::Document;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// The document overstayed the SLA of its current state.
    SlaBreach,
    /// The document is due to be routed back for re-approval.
    Reapproval,
}

/// A request to fire a timer for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerIntent {
    pub document_id: String,
    pub workflow_id: String,
    pub kind: TimerKind,
    pub fire_at: DateTime<Utc>,

    /// State the document was in when the intent was scheduled.
    pub state: String,

    /// Re-approval target state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_state: Option<String>,
}

/// Derives the pending intents for a document.
pub fn timer_intents(document: &Document, compiled: &CompiledWorkflow) -> Vec<TimerIntent> {
    let mut intents = Vec::with_capacity(2);
    if let Some(due_at) = document.due_at {
        intents.push(TimerIntent {
            document_id: document.id.clone(),
            workflow_id: document.workflow_id.clone(),
            kind: TimerKind::SlaBreach,
            fire_at: due_at,
            state: document.current.clone(),
            target_state: None,
        });
    }
    if let (Some(at), Some(policy)) = (document.next_reapproval, compiled.reapproval()) {
        intents.push(TimerIntent {
            document_id: document.id.clone(),
            workflow_id: document.workflow_id.clone(),
            kind: TimerKind::Reapproval,
            fire_at: at,
            state: document.current.clone(),
            target_state: Some(policy.to_state.clone()),
        });
    }
    intents
}

/// Receives timer intents from the engine.
pub trait TimerSink: Send + Sync {
    /// Replaces all pending intents for `document_id`. An empty list cancels
    /// them.
    fn replace(&self, document_id: &str, intents: Vec<TimerIntent>);
}

/// Sink that drops every intent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTimerSink;

impl TimerSink for NoopTimerSink {
    fn replace(&self, _document_id: &str, _intents: Vec<TimerIntent>) {}
}

type TimerKey = (DateTime<Utc>, u64);

#[derive(Debug, Default)]
struct QueueInner {
    by_time: BTreeMap<TimerKey, TimerIntent>,
    by_document: HashMap<String, Vec<TimerKey>>,
    next_seq: u64,
}

impl QueueInner {
    fn remove_document(&mut self, document_id: &str) {
        if let Some(keys) = self.by_document.remove(document_id) {
            for key in keys {
                self.by_time.remove(&key);
            }
        }
    }
}

/// In-memory, time-ordered timer queue.
///
/// Intents with equal fire times pop in insertion order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    inner: Mutex<QueueInner>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every intent due at or before `now`, earliest first.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Vec<TimerIntent> {
        let mut inner = self.inner.lock();
        let mut due = Vec::new();
        while let Some(entry) = inner.by_time.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let (key, intent) = entry.remove_entry();
            if let Some(keys) = inner.by_document.get_mut(&intent.document_id) {
                keys.retain(|k| *k != key);
                if keys.is_empty() {
                    inner.by_document.remove(&intent.document_id);
                }
            }
            due.push(intent);
        }
        due
    }

    /// Fire time of the earliest pending intent.
    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().by_time.keys().next().map(|(at, _)| *at)
    }

    /// Pending intents for one document, earliest first.
    pub fn pending_for(&self, document_id: &str) -> Vec<TimerIntent> {
        let inner = self.inner.lock();
        let mut keys = inner
            .by_document
            .get(document_id)
            .cloned()
            .unwrap_or_default();
        keys.sort();
        keys.iter()
            .filter_map(|k| inner.by_time.get(k).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TimerSink for TimerQueue {
    fn replace(&self, document_id: &str, intents: Vec<TimerIntent>) {
        let mut inner = self.inner.lock();
        inner.remove_document(document_id);

        let mut keys = Vec::with_capacity(intents.len());
        for intent in intents {
            let key = (intent.fire_at, inner.next_seq);
            inner.next_seq += 1;
            inner.by_time.insert(key, intent);
            keys.push(key);
        }
        if !keys.is_empty() {
            inner.by_document.insert(document_id.to_string(), keys);
        }
        tracing::trace!(
            "timer queue: rescheduled {} ({} pending total)",
            document_id,
            inner.by_time.len()
        );
    }
}
