//! Compiles an accepted definition into its runtime lookup form.
//!
//! Compilation is a pure function of the definition. The engine recompiles on
//! every call, so the result is never stored.

use crate::definition::{Transition, WorkflowDefinition};
use crate::duration::parse_duration;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Compiled re-approval policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledReapproval {
    pub after: Duration,
    pub to_state: String,
}

/// Runtime form of a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledWorkflow {
    workflow_id: String,
    initial: String,
    terminals: HashSet<String>,
    /// state -> event -> transition
    transitions: HashMap<String, HashMap<String, Transition>>,
    sla: HashMap<String, Duration>,
    reapproval: Option<CompiledReapproval>,
}

/// Compiles a definition.
///
/// Definitions reaching this point have been validated, so a bad duration or
/// a duplicate transition key is reported as an invariant violation. A missing
/// initial state is a compilation error.
pub fn compile(def: &WorkflowDefinition) -> Result<CompiledWorkflow, CoreError> {
    let mut initial: Option<&str> = None;
    let mut terminals = HashSet::new();
    for state in def.states() {
        if state.initial {
            if let Some(first) = initial {
                return Err(CoreError::invariant(format!(
                    "workflow '{}' has two initial states: '{}' and '{}'",
                    def.name(),
                    first,
                    state.name
                )));
            }
            initial = Some(&state.name);
        }
        if state.terminal {
            terminals.insert(state.name.clone());
        }
    }
    let initial = initial.ok_or_else(|| CoreError::Compilation {
        reason: format!("workflow '{}' has no initial state", def.name()),
    })?;

    let mut transitions: HashMap<String, HashMap<String, Transition>> = HashMap::new();
    for t in def.transitions() {
        let by_event = transitions.entry(t.from.clone()).or_default();
        if by_event.insert(t.event.clone(), t.clone()).is_some() {
            return Err(CoreError::invariant(format!(
                "duplicate transition from '{}' on event '{}'",
                t.from, t.event
            )));
        }
    }

    let mut sla = HashMap::with_capacity(def.sla().len());
    for (state, raw) in def.sla() {
        let duration = parse_duration(raw).map_err(|e| {
            CoreError::invariant(format!("SLA for state '{}' does not parse: {}", state, e))
        })?;
        sla.insert(state.clone(), duration);
    }

    let reapproval = match def.reapproval() {
        Some(policy) => Some(CompiledReapproval {
            after: parse_duration(&policy.after).map_err(|e| {
                CoreError::invariant(format!("reapproval.after does not parse: {}", e))
            })?,
            to_state: policy.to_state.clone(),
        }),
        None => None,
    };

    Ok(CompiledWorkflow {
        workflow_id: def.id.clone(),
        initial: initial.to_string(),
        terminals,
        transitions,
        sla,
        reapproval,
    })
}

impl CompiledWorkflow {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn initial(&self) -> &str {
        &self.initial
    }

    pub fn is_terminal(&self, state: &str) -> bool {
        self.terminals.contains(state)
    }

    /// Looks up the transition fired by `event` in `state`.
    pub fn transition(&self, state: &str, event: &str) -> Option<&Transition> {
        self.transitions.get(state)?.get(event)
    }

    /// Transitions leaving `state`, ordered by event name.
    pub fn transitions_from(&self, state: &str) -> Vec<&Transition> {
        let mut out: Vec<&Transition> = self
            .transitions
            .get(state)
            .map(|by_event| by_event.values().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.event.cmp(&b.event));
        out
    }

    /// Event names accepted in `state`, sorted.
    pub fn events_from(&self, state: &str) -> Vec<&str> {
        self.transitions_from(state)
            .into_iter()
            .map(|t| t.event.as_str())
            .collect()
    }

    pub fn sla_for(&self, state: &str) -> Option<Duration> {
        self.sla.get(state).copied()
    }

    pub fn reapproval(&self) -> Option<&CompiledReapproval> {
        self.reapproval.as_ref()
    }

    /// SLA deadline for a document entering `state` at `now`.
    pub fn due_at(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, CoreError> {
        self.sla_for(state)
            .map(|d| offset(now, d))
            .transpose()
    }

    /// Next re-approval time for a document touched at `now`.
    pub fn next_reapproval(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, CoreError> {
        self.reapproval
            .as_ref()
            .map(|policy| offset(now, policy.after))
            .transpose()
    }
}

fn offset(now: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>, CoreError> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| CoreError::invariant(format!("timestamp overflow adding {:?} to {}", by, now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ReapprovalPolicy, State, WorkflowDefinitionRaw};
    use crate::validator::validate;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn purchase_order() -> WorkflowDefinition {
        let raw = WorkflowDefinitionRaw {
            name: "PurchaseOrderApproval".to_string(),
            states: vec![
                State::new("Draft").initial(),
                State::new("ManagerApproval"),
                State::new("FinanceApproval"),
                State::new("Approved").terminal(),
                State::new("Rejected").terminal(),
            ],
            transitions: vec![
                Transition::new("Draft", "ManagerApproval", "submit").with_roles(["author"]),
                Transition::new("ManagerApproval", "FinanceApproval", "approve")
                    .with_roles(["manager"]),
                Transition::new("ManagerApproval", "Rejected", "reject").with_roles(["manager"]),
                Transition::new("FinanceApproval", "Approved", "approve").with_roles(["finance"]),
                Transition::new("FinanceApproval", "Rejected", "reject").with_roles(["finance"]),
            ],
            sla: [("FinanceApproval".to_string(), "72h".to_string())].into(),
            reapproval: Some(ReapprovalPolicy {
                after: "2592h".to_string(),
                to_state: "ManagerApproval".to_string(),
            }),
        };
        validate(raw, now()).unwrap()
    }

    #[test]
    fn test_compile_indexes() {
        let compiled = compile(&purchase_order()).unwrap();

        assert_eq!(compiled.initial(), "Draft");
        assert!(compiled.is_terminal("Approved"));
        assert!(compiled.is_terminal("Rejected"));
        assert!(!compiled.is_terminal("Draft"));

        let t = compiled.transition("FinanceApproval", "approve").unwrap();
        assert_eq!(t.to, "Approved");
        assert!(compiled.transition("Draft", "approve").is_none());
        assert!(compiled.transition("Nowhere", "submit").is_none());

        assert_eq!(compiled.events_from("ManagerApproval"), vec!["approve", "reject"]);
        assert!(compiled.events_from("Approved").is_empty());

        assert_eq!(
            compiled.sla_for("FinanceApproval"),
            Some(Duration::from_secs(72 * 3600))
        );
        assert_eq!(compiled.sla_for("Draft"), None);
        assert_eq!(compiled.reapproval().unwrap().to_state, "ManagerApproval");
    }

    #[test]
    fn test_compile_is_deterministic() {
        let def = purchase_order();
        assert_eq!(compile(&def).unwrap(), compile(&def).unwrap());
    }

    #[test]
    fn test_deadline_arithmetic() {
        let compiled = compile(&purchase_order()).unwrap();

        assert_eq!(compiled.due_at("Draft", now()).unwrap(), None);
        assert_eq!(
            compiled.due_at("FinanceApproval", now()).unwrap(),
            Some(now() + chrono::Duration::hours(72))
        );
        assert_eq!(
            compiled.next_reapproval(now()).unwrap(),
            Some(now() + chrono::Duration::hours(2592))
        );
    }

    #[test]
    fn test_missing_initial_is_compilation_error() {
        let mut def = purchase_order();
        def.raw.states[0].initial = false;
        assert!(matches!(compile(&def), Err(CoreError::Compilation { .. })));
    }

    #[test]
    fn test_unvalidated_input_is_invariant_violation() {
        let mut def = purchase_order();
        def.raw
            .transitions
            .push(Transition::new("Draft", "Rejected", "submit"));
        assert!(matches!(
            compile(&def),
            Err(CoreError::InvariantViolation { .. })
        ));

        let mut def = purchase_order();
        def.raw.sla.insert("Draft".to_string(), "soon".to_string());
        assert!(matches!(
            compile(&def),
            Err(CoreError::InvariantViolation { .. })
        ));

        let mut def = purchase_order();
        def.raw.states[1].initial = true;
        assert!(matches!(
            compile(&def),
            Err(CoreError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn test_deadline_overflow_is_an_error() {
        let mut def = purchase_order();
        def.raw.sla.insert("Draft".to_string(), "2562047h".to_string());
        let compiled = compile(&def).unwrap();
        let far = DateTime::<Utc>::MAX_UTC;
        assert!(matches!(
            compiled.due_at("Draft", far),
            Err(CoreError::InvariantViolation { .. })
        ));
    }
}
