use crate::api::response;
use crate::auth::auth::AuthUser;
use crate::error::WorkflowError;
use crate::service::tasks::{
    CompleteOutcome, CompleteRequest, IssueOutcome, IssueRequest, ProgressHistoryOutcome,
    ProgressOutcome, ProgressRequest, StartTaskOutcome, StartTaskRequest, TaskDetailsOutcome,
    TaskService, TasksTodayOutcome, TasksTodayQuery,
};
use actix_web::{HttpResponse, web};

/// Today's assignments for the calling worker
#[utoipa::path(
    get,
    path = "/api/worker/tasks/today",
    params(TasksTodayQuery),
    responses(
        (status = 200, description = "Task list with start readiness", body = TasksTodayOutcome),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
pub async fn tasks_today(
    auth: AuthUser,
    service: web::Data<TaskService>,
    query: web::Query<TasksTodayQuery>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.tasks_today(auth.employee_id, &query).await?;
    Ok(response::ok("Today's tasks", outcome))
}

#[utoipa::path(
    get,
    path = "/api/worker/tasks/{id}",
    params(
        ("id" = u64, Path, description = "Task assignment id")
    ),
    responses(
        (status = 200, description = "Assignment details", body = TaskDetailsOutcome),
        (status = 401, description = "Not the assignee"),
        (status = 404, description = "Assignment not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
pub async fn task_details(
    auth: AuthUser,
    service: web::Data<TaskService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service
        .task_details(auth.employee_id, path.into_inner())
        .await?;
    Ok(response::ok("Task details", outcome))
}

/// Start a queued task. Dependencies, sequence and location are checked in
/// that order.
#[utoipa::path(
    post,
    path = "/api/worker/tasks/{id}/start",
    params(
        ("id" = u64, Path, description = "Task assignment id")
    ),
    request_body = StartTaskRequest,
    responses(
        (status = 200, description = "Task started", body = StartTaskOutcome),
        (status = 409, description = "Task is not queued"),
        (status = 422, description = "Gate failed", body = Object, example = json!({
            "success": false,
            "error": "Earlier tasks in the sequence must be completed first: [41]",
            "code": "SEQUENCE_VIOLATION",
            "kind": "gate_failed",
            "details": { "blockingAssignmentIds": [41] }
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
pub async fn start_task(
    auth: AuthUser,
    service: web::Data<TaskService>,
    path: web::Path<u64>,
    body: web::Json<StartTaskRequest>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service
        .start(auth.employee_id, path.into_inner(), &body)
        .await?;
    Ok(response::ok("Task started", outcome))
}

#[utoipa::path(
    post,
    path = "/api/worker/tasks/{id}/progress",
    params(
        ("id" = u64, Path, description = "Task assignment id")
    ),
    request_body = ProgressRequest,
    responses(
        (status = 200, description = "Progress recorded", body = ProgressOutcome),
        (status = 400, description = "Percent outside 0..=100"),
        (status = 409, description = "Task not in progress or progress would decrease")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
pub async fn update_progress(
    auth: AuthUser,
    service: web::Data<TaskService>,
    path: web::Path<u64>,
    body: web::Json<ProgressRequest>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service
        .update_progress(auth.employee_id, path.into_inner(), &body)
        .await?;
    Ok(response::ok("Progress updated", outcome))
}

#[utoipa::path(
    get,
    path = "/api/worker/tasks/{id}/progress",
    params(
        ("id" = u64, Path, description = "Task assignment id")
    ),
    responses(
        (status = 200, description = "Progress ledger, oldest first", body = ProgressHistoryOutcome),
        (status = 404, description = "Assignment not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
pub async fn progress_history(
    auth: AuthUser,
    service: web::Data<TaskService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service
        .progress_history(auth.employee_id, path.into_inner())
        .await?;
    Ok(response::ok("Progress history", outcome))
}

#[utoipa::path(
    post,
    path = "/api/worker/tasks/{id}/complete",
    params(
        ("id" = u64, Path, description = "Task assignment id")
    ),
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Task completed", body = CompleteOutcome),
        (status = 409, description = "Task not in progress")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
pub async fn complete_task(
    auth: AuthUser,
    service: web::Data<TaskService>,
    path: web::Path<u64>,
    body: Option<web::Json<CompleteRequest>>,
) -> Result<HttpResponse, WorkflowError> {
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let outcome = service
        .complete(auth.employee_id, path.into_inner(), &body)
        .await?;
    Ok(response::ok("Task completed", outcome))
}

#[utoipa::path(
    post,
    path = "/api/worker/task/issue",
    request_body = IssueRequest,
    responses(
        (status = 201, description = "Issue recorded", body = IssueOutcome),
        (status = 400, description = "Unknown issue type or priority")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Tasks"
)]
pub async fn report_issue(
    auth: AuthUser,
    service: web::Data<TaskService>,
    body: web::Json<IssueRequest>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.report_issue(auth.employee_id, &body).await?;
    let message = if outcome.assignment_blocked {
        "Issue reported, task blocked"
    } else {
        "Issue reported"
    };
    Ok(response::created(message, outcome))
}
