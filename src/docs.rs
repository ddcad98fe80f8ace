use crate::model::assignment::{AssignmentStatus, DailyTarget, GeofenceValidation, TimeEstimate};
use crate::model::attendance::{ClosedSession, ManualOverride, OverrideField, SessionState};
use crate::model::issue::{IssuePriority, IssueType};
use crate::model::progress::TaskProgressEntry;
use crate::service::LocationInput;
use crate::service::attendance::{
    AttendanceView, ClockInOutcome, ClockOutOutcome, ClockRequest, HistoryOutcome, LunchOutcome,
    OverrideRequest, OvertimeOutcome, ProjectRequest, StatusOutcome, TodayOutcome,
};
use crate::service::gates::StartReadiness;
use crate::service::tasks::{
    CompleteOutcome, CompleteRequest, GeofenceOutcome, GeofenceRequest, IssueOutcome,
    IssueRequest, NextAction, NextTaskHint, ProgressHistoryOutcome, ProgressOutcome,
    ProgressRequest, ProjectSummary, StartTaskOutcome, StartTaskRequest, SupervisorSummary,
    TaskCard, TaskDetailsOutcome, TaskSummary, TasksTodayOutcome,
};
use crate::utils::geofence::{Coordinates, GeofenceCheck, ProjectGeofence};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sitecrew API",
        version = "1.0.0",
        description = r#"
## Construction workforce attendance and task sequencing

Mobile backend for site workers and their supervisors.

### Key features
- **Attendance**
  - Geofenced clock-in/clock-out per project and day, lunch break, overtime
  - Supervisor corrections with an audit trail
- **Tasks**
  - Ordered daily assignments gated by dependencies, sequence and location
  - Progress reports, completion, issue tickets that can block work
- **Geofence**
  - Distance checks against project work zones

### Security
Every endpoint requires a **JWT Bearer** access token. Refresh tokens are
rejected.

### Response format
Success: `{"success": true, "message": "...", "data": {...}}`

Failure: `{"success": false, "error": "...", "code": "...", "kind": "...", "details": {...}}`
"#,
    ),
    paths(
        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::lunch_start,
        crate::api::attendance::lunch_end,
        crate::api::attendance::overtime_start,
        crate::api::attendance::status,
        crate::api::attendance::today,
        crate::api::attendance::history,
        crate::api::attendance::override_entry,

        crate::api::tasks::tasks_today,
        crate::api::tasks::task_details,
        crate::api::tasks::start_task,
        crate::api::tasks::update_progress,
        crate::api::tasks::progress_history,
        crate::api::tasks::complete_task,
        crate::api::tasks::report_issue,

        crate::api::geofence::validate_geofence
    ),
    components(
        schemas(
            Coordinates,
            LocationInput,
            ProjectGeofence,
            GeofenceCheck,
            SessionState,
            OverrideField,
            ManualOverride,
            ClosedSession,
            ClockRequest,
            ProjectRequest,
            OverrideRequest,
            AttendanceView,
            ClockInOutcome,
            ClockOutOutcome,
            LunchOutcome,
            OvertimeOutcome,
            StatusOutcome,
            TodayOutcome,
            HistoryOutcome,
            AssignmentStatus,
            DailyTarget,
            TimeEstimate,
            GeofenceValidation,
            TaskProgressEntry,
            IssueType,
            IssuePriority,
            StartReadiness,
            StartTaskRequest,
            ProgressRequest,
            CompleteRequest,
            IssueRequest,
            GeofenceRequest,
            StartTaskOutcome,
            NextAction,
            ProgressOutcome,
            NextTaskHint,
            CompleteOutcome,
            IssueOutcome,
            GeofenceOutcome,
            ProjectSummary,
            SupervisorSummary,
            TaskCard,
            TaskSummary,
            TasksTodayOutcome,
            TaskDetailsOutcome,
            ProgressHistoryOutcome
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Daily attendance sessions"),
        (name = "Tasks", description = "Task assignment workflow"),
        (name = "Geofence", description = "Project work zone checks"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod docs_tests {
    use super::*;

    #[test]
    fn document_lists_workflow_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/worker/tasks/{id}/start"));
        assert!(doc.paths.paths.contains_key("/api/attendance/clock-in"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
