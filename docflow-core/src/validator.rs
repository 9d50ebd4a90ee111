//! Definition validator: structural and referential checks on a raw
//! workflow definition before it is accepted.

use crate::definition::{WorkflowDefinition, WorkflowDefinitionRaw};
use crate::duration::parse_duration;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Validates a raw definition and stamps its creation time.
///
/// The returned definition carries the raw content unchanged and an empty id;
/// the store assigns the id on first save.
pub fn validate(
    raw: WorkflowDefinitionRaw,
    now: DateTime<Utc>,
) -> Result<WorkflowDefinition, CoreError> {
    validate_has_name_and_states(&raw)?;
    let states = validate_unique_state_names(&raw)?;
    validate_single_initial(&raw)?;
    validate_transitions(&raw, &states)?;
    validate_sla(&raw, &states)?;
    validate_reapproval(&raw, &states)?;

    Ok(WorkflowDefinition {
        id: String::new(),
        raw,
        created_at: now,
    })
}

fn validate_has_name_and_states(raw: &WorkflowDefinitionRaw) -> Result<(), CoreError> {
    if raw.name.is_empty() || raw.states.is_empty() {
        return Err(CoreError::invalid("name/states required"));
    }
    Ok(())
}

fn validate_unique_state_names(raw: &WorkflowDefinitionRaw) -> Result<HashSet<&str>, CoreError> {
    let mut seen = HashSet::new();
    for state in &raw.states {
        if state.name.is_empty() {
            return Err(CoreError::invalid("state without name"));
        }
        if !seen.insert(state.name.as_str()) {
            return Err(CoreError::invalid(format!(
                "duplicated state '{}'",
                state.name
            )));
        }
    }
    Ok(seen)
}

fn validate_single_initial(raw: &WorkflowDefinitionRaw) -> Result<(), CoreError> {
    let initial_count = raw.states.iter().filter(|s| s.initial).count();
    if initial_count != 1 {
        return Err(CoreError::invalid(format!(
            "there must be exactly 1 initial state, found {}",
            initial_count
        )));
    }
    Ok(())
}

fn validate_transitions(
    raw: &WorkflowDefinitionRaw,
    states: &HashSet<&str>,
) -> Result<(), CoreError> {
    let mut keys = HashSet::new();
    for t in &raw.transitions {
        if t.from.is_empty() || t.to.is_empty() || t.event.is_empty() {
            return Err(CoreError::invalid("transition missing from/to/event"));
        }
        if !states.contains(t.from.as_str()) {
            return Err(CoreError::invalid(format!(
                "transition source '{}' not in states list",
                t.from
            )));
        }
        if !states.contains(t.to.as_str()) {
            return Err(CoreError::invalid(format!(
                "transition target '{}' not in states list",
                t.to
            )));
        }
        if !keys.insert((t.from.as_str(), t.event.as_str())) {
            return Err(CoreError::invalid(format!(
                "duplicate transition from '{}' on event '{}'",
                t.from, t.event
            )));
        }
    }
    Ok(())
}

fn validate_sla(raw: &WorkflowDefinitionRaw, states: &HashSet<&str>) -> Result<(), CoreError> {
    for (state, duration) in &raw.sla {
        parse_duration(duration).map_err(|e| {
            CoreError::invalid(format!("invalid SLA duration for state '{}': {}", state, e))
        })?;
        if !states.contains(state.as_str()) {
            tracing::warn!(
                "workflow '{}': SLA entry for undeclared state '{}' will never apply",
                raw.name,
                state
            );
        }
    }
    Ok(())
}

fn validate_reapproval(
    raw: &WorkflowDefinitionRaw,
    states: &HashSet<&str>,
) -> Result<(), CoreError> {
    let Some(policy) = &raw.reapproval else {
        return Ok(());
    };

    if policy.to_state.is_empty() || !states.contains(policy.to_state.as_str()) {
        return Err(CoreError::invalid(format!(
            "reapproval.toState '{}' is not a declared state",
            policy.to_state
        )));
    }
    parse_duration(&policy.after)
        .map_err(|e| CoreError::invalid(format!("invalid reapproval.after duration: {}", e)))?;
    Ok(())
}
