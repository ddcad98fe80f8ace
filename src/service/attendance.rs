use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use super::ServiceContext;
use crate::error::WorkflowError;
use crate::model::attendance::{
    AttendanceRecord, ClosedSession, ManualOverride, OverrideField, SessionState,
};
use crate::model::location_log::{LocationLog, LocationLogKind};
use crate::model::role::Role;
use crate::store::AttendanceHistoryQuery;
use crate::utils::geofence::{self, Coordinates, LocationFix};
use crate::utils::text::clamp_text;

pub const DEFAULT_HISTORY_PER_PAGE: u32 = 20;
pub const MAX_HISTORY_PER_PAGE: u32 = 100;
const MAX_OVERRIDE_REASON_CHARS: usize = 500;

/* =========================
Requests
========================= */

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockRequest {
    #[schema(example = 12)]
    pub project_id: u64,
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
    /// Reported GPS accuracy in meters.
    #[schema(example = 12.5)]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    #[schema(example = 12)]
    pub project_id: u64,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// Defaults to the most recently active record of the day.
    pub project_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    #[param(value_type = Option<String>, format = "date", example = "2026-03-01")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date", example = "2026-03-31")]
    pub to: Option<NaiveDate>,
    pub project_id: Option<u64>,
    /// Pagination page number (start with 1)
    #[param(example = 1)]
    pub page: Option<u32>,
    /// Items per page, 1 to 100
    #[param(example = 20)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub field: OverrideField,
    /// New value; null clears the field.
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time: Option<DateTime<Utc>>,
    #[schema(example = "Gate scanner offline at 08:00")]
    pub reason: String,
}

/* =========================
Outcomes
========================= */

/// A day's record with its derived state and durations (minutes).
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceView {
    pub id: String,
    pub employee_id: u64,
    pub project_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub status: SessionState,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub lunch_start_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub lunch_end_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub overtime_start_time: Option<DateTime<Utc>>,
    pub work_duration: Option<i64>,
    pub lunch_duration: Option<i64>,
    pub net_work_duration: Option<i64>,
    pub overtime_duration: Option<i64>,
    pub pending_checkout: bool,
    pub inside_geofence_at_checkin: bool,
    pub inside_geofence_at_checkout: bool,
    pub last_location: Option<Coordinates>,
    pub manual_overrides: Vec<ManualOverride>,
    pub previous_sessions: Vec<ClosedSession>,
}

impl AttendanceView {
    pub fn from_record(record: &AttendanceRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id.clone(),
            employee_id: record.employee_id,
            project_id: record.project_id,
            date: record.date,
            status: record.session_state(),
            check_in: record.check_in,
            check_out: record.check_out,
            lunch_start_time: record.lunch_start_time,
            lunch_end_time: record.lunch_end_time,
            overtime_start_time: record.overtime_start_time,
            work_duration: record.work_minutes(now),
            lunch_duration: record.lunch_minutes(now),
            net_work_duration: record.net_work_minutes(now),
            overtime_duration: record.overtime_minutes(now),
            pending_checkout: record.pending_checkout,
            inside_geofence_at_checkin: record.inside_geofence_at_checkin,
            inside_geofence_at_checkout: record.inside_geofence_at_checkout,
            last_location: record.last_location(),
            manual_overrides: record.manual_overrides.clone(),
            previous_sessions: record.previous_sessions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockInOutcome {
    pub attendance_id: String,
    #[schema(value_type = String, format = "date-time")]
    pub check_in_time: DateTime<Utc>,
    pub project_id: u64,
    /// Meters from the site center.
    pub distance: f64,
    /// True when a checked-out day was reopened.
    pub reopened: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockOutOutcome {
    pub attendance_id: String,
    #[schema(value_type = String, format = "date-time")]
    pub check_out_time: DateTime<Utc>,
    pub work_duration: i64,
    pub lunch_duration: i64,
    pub net_work_duration: i64,
    pub overtime_duration: Option<i64>,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LunchOutcome {
    pub attendance_id: String,
    #[schema(value_type = String, format = "date-time")]
    pub lunch_start_time: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub lunch_end_time: Option<DateTime<Utc>>,
    /// Minutes, once the break has ended.
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OvertimeOutcome {
    pub attendance_id: String,
    #[schema(value_type = String, format = "date-time")]
    pub overtime_start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutcome {
    pub status: SessionState,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub project_id: Option<u64>,
    pub attendance: Option<AttendanceView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodayOutcome {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub records: Vec<AttendanceView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryOutcome {
    pub records: Vec<AttendanceView>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

/* =========================
Service
========================= */

#[derive(Clone)]
pub struct AttendanceService {
    ctx: ServiceContext,
}

impl AttendanceService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    fn outside(check: &geofence::GeofenceCheck, fence: &geofence::ProjectGeofence) -> WorkflowError {
        WorkflowError::OutsideGeofence {
            distance: check.distance,
            radius: fence.radius,
            allowed_variance: fence.allowed_variance,
        }
    }

    async fn open_record(
        &self,
        employee_id: u64,
        project_id: u64,
        date: NaiveDate,
    ) -> Result<AttendanceRecord, WorkflowError> {
        self.ctx
            .store
            .find_attendance(employee_id, project_id, date)
            .await?
            .ok_or(WorkflowError::NotCheckedIn)
    }

    pub async fn clock_in(
        &self,
        employee_id: Option<u64>,
        req: &ClockRequest,
    ) -> Result<ClockInOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let fix = LocationFix::parse(req.latitude, req.longitude, req.accuracy)?;
        let project = self.ctx.load_project(req.project_id).await?;
        let now = self.ctx.now();
        let date = self.ctx.work_date(now);

        let assignments = self
            .ctx
            .store
            .assignments_for_day(employee.id, date, Some(project.id))
            .await?;
        if assignments.is_empty() {
            warn!(employee_id = employee.id, project_id = project.id, %date, "Clock-in without assignment");
            return Err(WorkflowError::NoAssignment {
                project_id: project.id,
            });
        }

        // Attendance is held to the plain radius; variance and leniency only
        // apply to task work.
        let check = geofence::validate(&fix.coordinates, &project.geofence);
        if !check.inside_geofence {
            warn!(
                employee_id = employee.id,
                project_id = project.id,
                distance = check.distance,
                radius = project.geofence.radius,
                "Clock-in outside geofence"
            );
            return Err(Self::outside(&check, &project.geofence));
        }

        let existing = self
            .ctx
            .store
            .find_attendance(employee.id, project.id, date)
            .await?;

        let (record, reopened) = match existing {
            Some(mut record) => {
                let reopened = record.check_out.is_some();
                record.clock_in(now, fix.coordinates)?;
                self.ctx
                    .store
                    .update_attendance(&record)
                    .await
                    .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::AlreadyCheckedIn))?;
                (record, reopened)
            }
            None => {
                let mut record = AttendanceRecord::new(
                    uuid::Uuid::new_v4().to_string(),
                    employee.id,
                    project.id,
                    date,
                );
                record.clock_in(now, fix.coordinates)?;
                self.ctx
                    .store
                    .insert_attendance(&record)
                    .await
                    .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::AlreadyCheckedIn))?;
                (record, false)
            }
        };

        self.ctx
            .audit_location(LocationLog::new(
                employee.id,
                project.id,
                fix.coordinates,
                fix.accuracy,
                &check,
                LocationLogKind::CheckIn,
                now,
            ))
            .await;

        info!(
            employee_id = employee.id,
            project_id = project.id,
            attendance_id = %record.id,
            distance = check.distance,
            reopened,
            "Clocked in"
        );

        Ok(ClockInOutcome {
            attendance_id: record.id,
            check_in_time: now,
            project_id: project.id,
            distance: check.distance.round(),
            reopened,
        })
    }

    pub async fn clock_out(
        &self,
        employee_id: Option<u64>,
        req: &ClockRequest,
    ) -> Result<ClockOutOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let fix = LocationFix::parse(req.latitude, req.longitude, req.accuracy)?;
        let project = self.ctx.load_project(req.project_id).await?;
        let now = self.ctx.now();
        let date = self.ctx.work_date(now);

        let mut record = self.open_record(employee.id, project.id, date).await?;
        if record.check_in.is_none() {
            return Err(WorkflowError::NotCheckedIn);
        }
        if record.check_out.is_some() {
            return Err(WorkflowError::AlreadyCheckedOut);
        }

        let check = geofence::validate(&fix.coordinates, &project.geofence);
        if !check.inside_geofence {
            warn!(
                employee_id = employee.id,
                project_id = project.id,
                distance = check.distance,
                "Clock-out outside geofence"
            );
            return Err(Self::outside(&check, &project.geofence));
        }

        record.clock_out(now, fix.coordinates)?;
        self.ctx
            .store
            .update_attendance(&record)
            .await
            .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::AlreadyCheckedOut))?;

        self.ctx
            .audit_location(LocationLog::new(
                employee.id,
                project.id,
                fix.coordinates,
                fix.accuracy,
                &check,
                LocationLogKind::CheckOut,
                now,
            ))
            .await;

        let work_duration = record.work_minutes(now).unwrap_or(0);
        let lunch_duration = record.lunch_minutes(now).unwrap_or(0);
        let net_work_duration = record.net_work_minutes(now).unwrap_or(0);

        info!(
            employee_id = employee.id,
            project_id = project.id,
            attendance_id = %record.id,
            work_duration,
            lunch_duration,
            "Clocked out"
        );

        Ok(ClockOutOutcome {
            attendance_id: record.id.clone(),
            check_out_time: now,
            work_duration,
            lunch_duration,
            net_work_duration,
            overtime_duration: record.overtime_minutes(now),
            distance: check.distance.round(),
        })
    }

    pub async fn start_lunch(
        &self,
        employee_id: Option<u64>,
        req: &ProjectRequest,
    ) -> Result<LunchOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let now = self.ctx.now();
        let mut record = self
            .open_record(employee.id, req.project_id, self.ctx.work_date(now))
            .await?;

        record.start_lunch(now)?;
        self.ctx
            .store
            .update_attendance(&record)
            .await
            .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::LunchAlreadyStarted))?;

        info!(employee_id = employee.id, attendance_id = %record.id, "Lunch started");
        Ok(LunchOutcome {
            attendance_id: record.id,
            lunch_start_time: now,
            lunch_end_time: None,
            duration: None,
        })
    }

    pub async fn end_lunch(
        &self,
        employee_id: Option<u64>,
        req: &ProjectRequest,
    ) -> Result<LunchOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let now = self.ctx.now();
        let mut record = self
            .open_record(employee.id, req.project_id, self.ctx.work_date(now))
            .await?;

        record.end_lunch(now)?;
        self.ctx
            .store
            .update_attendance(&record)
            .await
            .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::LunchAlreadyEnded))?;

        let duration = record.lunch_minutes(now);
        info!(employee_id = employee.id, attendance_id = %record.id, duration, "Lunch ended");

        let lunch_start_time = record.lunch_start_time.unwrap_or(now);
        Ok(LunchOutcome {
            attendance_id: record.id,
            lunch_start_time,
            lunch_end_time: Some(now),
            duration,
        })
    }

    pub async fn start_overtime(
        &self,
        employee_id: Option<u64>,
        req: &ProjectRequest,
    ) -> Result<OvertimeOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let now = self.ctx.now();
        let mut record = self
            .open_record(employee.id, req.project_id, self.ctx.work_date(now))
            .await?;

        record.start_overtime(now)?;
        self.ctx
            .store
            .update_attendance(&record)
            .await
            .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::OvertimeAlreadyStarted))?;

        info!(employee_id = employee.id, attendance_id = %record.id, "Overtime started");
        Ok(OvertimeOutcome {
            attendance_id: record.id,
            overtime_start_time: now,
        })
    }

    pub async fn status(
        &self,
        employee_id: Option<u64>,
        query: &StatusQuery,
    ) -> Result<StatusOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let now = self.ctx.now();
        let date = self.ctx.work_date(now);

        let record = match query.project_id {
            Some(project_id) => {
                self.ctx
                    .store
                    .find_attendance(employee.id, project_id, date)
                    .await?
            }
            None => {
                // newest check-in first; an open session wins over a closed one
                let records = self.ctx.store.attendance_for_day(employee.id, date).await?;
                let open = records.iter().position(AttendanceRecord::is_open);
                records.into_iter().nth(open.unwrap_or(0))
            }
        };

        Ok(match record {
            Some(record) => StatusOutcome {
                status: record.session_state(),
                date,
                project_id: Some(record.project_id),
                attendance: Some(AttendanceView::from_record(&record, now)),
            },
            None => StatusOutcome {
                status: SessionState::NotLoggedIn,
                date,
                project_id: query.project_id,
                attendance: None,
            },
        })
    }

    pub async fn today(&self, employee_id: Option<u64>) -> Result<TodayOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let now = self.ctx.now();
        let date = self.ctx.work_date(now);
        let records = self.ctx.store.attendance_for_day(employee.id, date).await?;

        Ok(TodayOutcome {
            date,
            records: records
                .iter()
                .map(|r| AttendanceView::from_record(r, now))
                .collect(),
        })
    }

    pub async fn history(
        &self,
        employee_id: Option<u64>,
        query: &HistoryQuery,
    ) -> Result<HistoryOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(WorkflowError::Validation(format!(
                    "from ({from}) must not be after to ({to})"
                )));
            }
        }

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_HISTORY_PER_PAGE)
            .clamp(1, MAX_HISTORY_PER_PAGE);

        let (records, total) = self
            .ctx
            .store
            .attendance_history(&AttendanceHistoryQuery {
                employee_id: employee.id,
                project_id: query.project_id,
                from: query.from,
                to: query.to,
                page,
                per_page,
            })
            .await?;

        let now = self.ctx.now();
        Ok(HistoryOutcome {
            records: records
                .iter()
                .map(|r| AttendanceView::from_record(r, now))
                .collect(),
            page,
            per_page,
            total,
            total_pages: (total + per_page as i64 - 1) / per_page as i64,
        })
    }

    /// Supervisor correction of a single timestamp.
    pub async fn override_entry(
        &self,
        actor_id: Option<u64>,
        role: Role,
        attendance_id: &str,
        req: &OverrideRequest,
    ) -> Result<AttendanceView, WorkflowError> {
        let actor = self.ctx.resolve_employee(actor_id).await?;
        if !matches!(role, Role::Supervisor | Role::Admin) {
            warn!(employee_id = actor.id, "Override attempted without supervisor role");
            return Err(WorkflowError::Forbidden(
                "Only supervisors can override attendance".to_string(),
            ));
        }

        let reason = clamp_text("reason", &req.reason, MAX_OVERRIDE_REASON_CHARS);
        if reason.is_empty() {
            return Err(WorkflowError::Validation(
                "An override reason is required".to_string(),
            ));
        }

        let mut record = self
            .ctx
            .store
            .find_attendance_by_id(attendance_id)
            .await?
            .ok_or_else(|| WorkflowError::AttendanceNotFound(attendance_id.to_string()))?;

        if role == Role::Supervisor {
            let project = self.ctx.load_project(record.project_id).await?;
            if project.supervisor_id != Some(actor.id) {
                warn!(
                    supervisor_id = actor.id,
                    project_id = project.id,
                    "Override attempted on a project the supervisor does not run"
                );
                return Err(WorkflowError::Forbidden(
                    "Supervisor is not assigned to this project".to_string(),
                ));
            }
        }

        let now = self.ctx.now();
        record.apply_override(req.field, req.time, reason, actor.id, now)?;
        self.ctx
            .store
            .update_attendance(&record)
            .await
            .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::ConcurrentUpdate))?;

        info!(
            supervisor_id = actor.id,
            attendance_id = %record.id,
            field = %req.field,
            "Attendance overridden"
        );
        Ok(AttendanceView::from_record(&record, now))
    }
}
