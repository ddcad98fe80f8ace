use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde::Serialize;
use serde_json::{Value, json};

use crate::store::StoreError;

/// Coarse classification shared by every failure the workflows surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authorization,
    NotFound,
    PreconditionFailed,
    GateFailed,
    ValidationFailed,
    Infrastructure,
}

#[derive(Debug, Display)]
pub enum WorkflowError {
    // authorization
    #[display(fmt = "{}", _0)]
    Unauthorized(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),

    // not found
    #[display(fmt = "Project {} not found", _0)]
    ProjectNotFound(u64),
    #[display(fmt = "Task assignment {} not found", _0)]
    AssignmentNotFound(u64),
    #[display(fmt = "Attendance record {} not found", _0)]
    AttendanceNotFound(String),
    #[display(fmt = "No active task assignment found for today")]
    NoActiveAssignment,
    #[display(fmt = "No task assignment for project {} today", project_id)]
    NoAssignment { project_id: u64 },

    // attendance preconditions
    #[display(fmt = "Already checked in for this project today")]
    AlreadyCheckedIn,
    #[display(fmt = "Not checked in for this project today")]
    NotCheckedIn,
    #[display(fmt = "Already checked out for this project today")]
    AlreadyCheckedOut,
    #[display(fmt = "Lunch break already started")]
    LunchAlreadyStarted,
    #[display(fmt = "Lunch break has not been started")]
    LunchNotStarted,
    #[display(fmt = "Lunch break already ended")]
    LunchAlreadyEnded,
    #[display(fmt = "Currently on lunch break")]
    OnLunch,
    #[display(fmt = "Overtime already started")]
    OvertimeAlreadyStarted,

    // task preconditions
    #[display(fmt = "Task already started")]
    AlreadyStarted,
    #[display(fmt = "Task already completed")]
    AlreadyCompleted,
    #[display(fmt = "Task has not been started")]
    NotStarted,
    #[display(fmt = "Task is blocked by a reported issue")]
    TaskBlocked,
    #[display(fmt = "Task has been cancelled")]
    TaskCancelled,
    #[display(
        fmt = "Progress cannot decrease (current {}%, requested {}%)",
        current,
        requested
    )]
    ProgressCannotDecrease { current: f64, requested: f64 },
    #[display(fmt = "Record was modified concurrently, reload and retry")]
    ConcurrentUpdate,

    // gates
    #[display(fmt = "Dependencies not completed: {:?}", blocking)]
    DependenciesNotMet { blocking: Vec<u64> },
    #[display(fmt = "Earlier tasks in the sequence must be completed first: {:?}", blocking)]
    SequenceViolation { blocking: Vec<u64> },
    #[display(
        fmt = "Outside project geofence ({:.0} m from site, radius {:.0} m)",
        distance,
        radius
    )]
    OutsideGeofence {
        distance: f64,
        radius: f64,
        allowed_variance: f64,
    },

    // validation
    #[display(fmt = "{}", _0)]
    Validation(String),
    #[display(fmt = "Invalid issue type '{}'", _0)]
    InvalidIssueType(String),
    #[display(fmt = "Invalid priority '{}'", _0)]
    InvalidPriority(String),
    #[display(fmt = "Record would violate invariant: {}", _0)]
    InvariantViolation(String),

    // infrastructure
    #[display(fmt = "Storage unavailable: {}", _0)]
    Storage(StoreError),
}

impl std::error::Error for WorkflowError {}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        WorkflowError::Storage(err)
    }
}

impl WorkflowError {
    /// Maps a lost compare-and-swap onto the precondition the caller was
    /// guarding; any other store failure stays infrastructural.
    pub fn on_conflict(err: StoreError, conflict: WorkflowError) -> Self {
        match err {
            StoreError::Conflict(_) => conflict,
            other => WorkflowError::Storage(other),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use WorkflowError::*;
        match self {
            Unauthorized(_) | Forbidden(_) => ErrorKind::Authorization,
            ProjectNotFound(_)
            | AssignmentNotFound(_)
            | AttendanceNotFound(_)
            | NoActiveAssignment
            | NoAssignment { .. } => ErrorKind::NotFound,
            AlreadyCheckedIn | NotCheckedIn | AlreadyCheckedOut | LunchAlreadyStarted
            | LunchNotStarted | LunchAlreadyEnded | OnLunch | OvertimeAlreadyStarted
            | AlreadyStarted | AlreadyCompleted | NotStarted | TaskBlocked | TaskCancelled
            | ProgressCannotDecrease { .. } | ConcurrentUpdate => ErrorKind::PreconditionFailed,
            DependenciesNotMet { .. } | SequenceViolation { .. } | OutsideGeofence { .. } => {
                ErrorKind::GateFailed
            }
            Validation(_) | InvalidIssueType(_) | InvalidPriority(_) | InvariantViolation(_) => {
                ErrorKind::ValidationFailed
            }
            Storage(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable machine-readable code for the mobile client.
    pub fn code(&self) -> &'static str {
        use WorkflowError::*;
        match self {
            Unauthorized(_) => "UNAUTHORIZED",
            Forbidden(_) => "FORBIDDEN",
            ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            AssignmentNotFound(_) => "ASSIGNMENT_NOT_FOUND",
            AttendanceNotFound(_) => "ATTENDANCE_NOT_FOUND",
            NoActiveAssignment => "NO_ACTIVE_ASSIGNMENT",
            NoAssignment { .. } => "NO_ASSIGNMENT",
            AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            NotCheckedIn => "NOT_CHECKED_IN",
            AlreadyCheckedOut => "ALREADY_CHECKED_OUT",
            LunchAlreadyStarted => "LUNCH_ALREADY_STARTED",
            LunchNotStarted => "LUNCH_NOT_STARTED",
            LunchAlreadyEnded => "LUNCH_ALREADY_ENDED",
            OnLunch => "ON_LUNCH",
            OvertimeAlreadyStarted => "OVERTIME_ALREADY_STARTED",
            AlreadyStarted => "ALREADY_STARTED",
            AlreadyCompleted => "ALREADY_COMPLETED",
            NotStarted => "NOT_STARTED",
            TaskBlocked => "TASK_BLOCKED",
            TaskCancelled => "TASK_CANCELLED",
            ProgressCannotDecrease { .. } => "PROGRESS_CANNOT_DECREASE",
            ConcurrentUpdate => "CONCURRENT_UPDATE",
            DependenciesNotMet { .. } => "DEPENDENCIES_NOT_MET",
            SequenceViolation { .. } => "SEQUENCE_VIOLATION",
            OutsideGeofence { .. } => "OUTSIDE_GEOFENCE",
            Validation(_) => "VALIDATION_FAILED",
            InvalidIssueType(_) => "INVALID_ISSUE_TYPE",
            InvalidPriority(_) => "INVALID_PRIORITY",
            InvariantViolation(_) => "INVARIANT_VIOLATION",
            Storage(_) => "STORAGE_UNAVAILABLE",
        }
    }

    /// Structured detail the client needs to explain a gate or precondition.
    pub fn details(&self) -> Value {
        use WorkflowError::*;
        match self {
            NoAssignment { project_id } => json!({ "projectId": project_id }),
            ProgressCannotDecrease { current, requested } => {
                json!({ "currentProgress": current, "requestedProgress": requested })
            }
            DependenciesNotMet { blocking } => json!({ "blockingAssignmentIds": blocking }),
            SequenceViolation { blocking } => json!({ "blockingAssignmentIds": blocking }),
            OutsideGeofence {
                distance,
                radius,
                allowed_variance,
            } => json!({
                "distance": distance.round(),
                "radius": radius,
                "allowedVariance": allowed_variance,
            }),
            InvalidIssueType(_) => json!({
                "allowed": crate::model::issue::IssueType::allowed_values(),
            }),
            InvalidPriority(_) => json!({
                "allowed": crate::model::issue::IssuePriority::allowed_values(),
            }),
            _ => Value::Null,
        }
    }
}

impl ResponseError for WorkflowError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Authorization => match self {
                WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PreconditionFailed => StatusCode::CONFLICT,
            ErrorKind::GateFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self.kind() {
            ErrorKind::Infrastructure => {
                tracing::error!(error = %self, "Request failed on storage");
                "Internal Server Error".to_string()
            }
            _ => self.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": message,
            "code": self.code(),
            "kind": self.kind(),
            "details": self.details(),
        }))
    }
}
