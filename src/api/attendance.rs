use crate::api::response;
use crate::auth::auth::AuthUser;
use crate::error::WorkflowError;
use crate::service::attendance::{
    AttendanceService, AttendanceView, ClockInOutcome, ClockOutOutcome, ClockRequest,
    HistoryOutcome, HistoryQuery, LunchOutcome, OverrideRequest, OvertimeOutcome,
    ProjectRequest, StatusOutcome, StatusQuery, TodayOutcome,
};
use actix_web::{HttpResponse, web};

/// Clock-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Clocked in", body = ClockInOutcome),
        (status = 400, description = "Invalid coordinates"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project not found or no assignment today"),
        (status = 409, description = "Already checked in", body = Object, example = json!({
            "success": false,
            "error": "Already checked in for this project today",
            "code": "ALREADY_CHECKED_IN",
            "kind": "precondition_failed",
            "details": null
        })),
        (status = 422, description = "Outside a strict-mode geofence"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock_in(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ClockRequest>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.clock_in(auth.employee_id, &body).await?;
    let message = if outcome.reopened {
        "Clocked in again"
    } else {
        "Clocked in successfully"
    };
    Ok(response::ok(message, outcome))
}

/// Clock-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/clock-out",
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Clocked out", body = ClockOutOutcome),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Not checked in or already checked out"),
        (status = 422, description = "Outside a strict-mode geofence"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ClockRequest>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.clock_out(auth.employee_id, &body).await?;
    Ok(response::ok("Clocked out successfully", outcome))
}

#[utoipa::path(
    post,
    path = "/api/attendance/lunch-start",
    request_body = ProjectRequest,
    responses(
        (status = 200, description = "Lunch started", body = LunchOutcome),
        (status = 409, description = "Not checked in, checked out or lunch already taken")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn lunch_start(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ProjectRequest>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.start_lunch(auth.employee_id, &body).await?;
    Ok(response::ok("Lunch break started", outcome))
}

#[utoipa::path(
    post,
    path = "/api/attendance/lunch-end",
    request_body = ProjectRequest,
    responses(
        (status = 200, description = "Lunch ended", body = LunchOutcome),
        (status = 409, description = "Lunch not started or already ended")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn lunch_end(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ProjectRequest>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.end_lunch(auth.employee_id, &body).await?;
    Ok(response::ok("Lunch break ended", outcome))
}

#[utoipa::path(
    post,
    path = "/api/attendance/overtime-start",
    request_body = ProjectRequest,
    responses(
        (status = 200, description = "Overtime started", body = OvertimeOutcome),
        (status = 409, description = "Not checked in or overtime already started")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn overtime_start(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    body: web::Json<ProjectRequest>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.start_overtime(auth.employee_id, &body).await?;
    Ok(response::ok("Overtime started", outcome))
}

#[utoipa::path(
    get,
    path = "/api/attendance/status",
    params(StatusQuery),
    responses(
        (status = 200, description = "Current session state", body = StatusOutcome),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn status(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.status(auth.employee_id, &query).await?;
    Ok(response::ok("Attendance status", outcome))
}

#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's attendance records", body = TodayOutcome),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.today(auth.employee_id).await?;
    Ok(response::ok("Today's attendance", outcome))
}

#[utoipa::path(
    get,
    path = "/api/attendance/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Paginated attendance history", body = HistoryOutcome),
        (status = 400, description = "Invalid date range")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, WorkflowError> {
    let outcome = service.history(auth.employee_id, &query).await?;
    Ok(response::ok("Attendance history", outcome))
}

/// Supervisor correction of one attendance timestamp
#[utoipa::path(
    post,
    path = "/api/attendance/{id}/override",
    params(
        ("id" = String, Path, description = "Attendance record id")
    ),
    request_body = OverrideRequest,
    responses(
        (status = 200, description = "Override applied", body = AttendanceView),
        (status = 400, description = "Missing reason or the change breaks record invariants"),
        (status = 403, description = "Not a supervisor of this project"),
        (status = 404, description = "Attendance record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn override_entry(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<String>,
    body: web::Json<OverrideRequest>,
) -> Result<HttpResponse, WorkflowError> {
    auth.require_supervisor()?;
    let attendance_id = path.into_inner();
    let outcome = service
        .override_entry(auth.employee_id, auth.role, &attendance_id, &body)
        .await?;
    Ok(response::ok("Attendance corrected", outcome))
}
