// Start preconditions for a task assignment.
//
// The gates are pure over already-loaded assignments so the read-side
// projection can reuse them without touching the store twice.

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::WorkflowError;
use crate::model::assignment::{AssignmentStatus, TaskAssignment};
use crate::store::{Store, StoreResult};

/// Every dependency must exist and be completed. Unknown ids block too.
pub fn dependency_gate(
    assignment: &TaskAssignment,
    dependencies: &[TaskAssignment],
) -> Result<(), WorkflowError> {
    let blocking: Vec<u64> = assignment
        .dependencies
        .iter()
        .copied()
        .filter(|id| {
            !dependencies
                .iter()
                .any(|d| d.id == *id && d.is_completed())
        })
        .collect();

    if blocking.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::DependenciesNotMet { blocking })
    }
}

/// Same employee, project and day: every sibling with a lower sequence must
/// be completed. Cancelled siblings still block.
pub fn sequence_gate(
    assignment: &TaskAssignment,
    siblings: &[TaskAssignment],
) -> Result<(), WorkflowError> {
    let mut earlier: Vec<&TaskAssignment> = siblings
        .iter()
        .filter(|s| {
            s.id != assignment.id
                && s.employee_id == assignment.employee_id
                && s.project_id == assignment.project_id
                && s.date == assignment.date
                && s.sequence < assignment.sequence
                && !s.is_completed()
        })
        .collect();
    earlier.sort_by_key(|s| (s.sequence, s.id));

    if earlier.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::SequenceViolation {
            blocking: earlier.into_iter().map(|s| s.id).collect(),
        })
    }
}

/// Loads what the gates need: the dependency records and the same-day
/// siblings on the assignment's project.
pub async fn load_gate_inputs(
    store: &dyn Store,
    assignment: &TaskAssignment,
) -> StoreResult<(Vec<TaskAssignment>, Vec<TaskAssignment>)> {
    let dependencies = store.find_assignments(&assignment.dependencies).await?;
    let siblings = store
        .assignments_for_day(assignment.employee_id, assignment.date, Some(assignment.project_id))
        .await?;
    Ok((dependencies, siblings))
}

/// Dependency gate, then sequence gate.
pub async fn check_prerequisites(
    store: &dyn Store,
    assignment: &TaskAssignment,
) -> Result<(), WorkflowError> {
    let (dependencies, siblings) = load_gate_inputs(store, assignment).await?;
    dependency_gate(assignment, &dependencies)?;
    sequence_gate(assignment, &siblings)
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartReadiness {
    pub can_start: bool,
    #[schema(example = "Ready to start")]
    pub reason: String,
}

impl StartReadiness {
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            can_start: false,
            reason: reason.into(),
        }
    }
}

/// Human-readable startability. Location is not considered here.
pub fn readiness(
    assignment: &TaskAssignment,
    dependencies: &[TaskAssignment],
    siblings: &[TaskAssignment],
) -> StartReadiness {
    let status_reason = match assignment.status {
        AssignmentStatus::Queued => None,
        AssignmentStatus::InProgress => Some("Task is already in progress"),
        AssignmentStatus::Completed => Some("Task is already completed"),
        AssignmentStatus::Blocked => Some("Task is blocked by a reported issue"),
        AssignmentStatus::Cancelled => Some("Task has been cancelled"),
    };
    if let Some(reason) = status_reason {
        return StartReadiness::blocked(reason);
    }

    match dependency_gate(assignment, dependencies)
        .and_then(|_| sequence_gate(assignment, siblings))
    {
        Ok(()) => StartReadiness {
            can_start: true,
            reason: "Ready to start".to_string(),
        },
        Err(e) => StartReadiness::blocked(e.to_string()),
    }
}
