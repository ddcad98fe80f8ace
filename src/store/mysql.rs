use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use moka::future::Cache;
use sqlx::types::Json;
use sqlx::{FromRow, MySqlPool};
use tracing::debug;

use super::{AttendanceHistoryQuery, Store, StoreError, StoreResult};
use crate::model::{
    assignment::{AssignmentStatus, DailyTarget, GeofenceValidation, TaskAssignment, TimeEstimate},
    attendance::{AttendanceRecord, ClosedSession, ManualOverride},
    employee::Employee,
    issue::IssueReport,
    location_log::LocationLog,
    notification::Notification,
    progress::TaskProgressEntry,
    project::Project,
    task::Task,
};
use crate::utils::geofence::{Coordinates, ProjectGeofence};

const PROJECT_CACHE_CAPACITY: u64 = 1_000;

/// Maps the MySQL duplicate-key error onto a store conflict.
fn insert_error(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23000") {
            return StoreError::Conflict(what.to_string());
        }
    }
    StoreError::from(err)
}

fn point(latitude: Option<f64>, longitude: Option<f64>) -> Option<Coordinates> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
        _ => None,
    }
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Date(NaiveDate),
}

/* =========================
Row types
========================= */

#[derive(FromRow)]
struct ProjectRow {
    id: u64,
    name: String,
    code: String,
    supervisor_id: Option<u64>,
    latitude: f64,
    longitude: f64,
    radius: f64,
    strict_mode: bool,
    allowed_variance: f64,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            code: row.code,
            supervisor_id: row.supervisor_id,
            geofence: ProjectGeofence {
                center: Coordinates::new(row.latitude, row.longitude),
                radius: row.radius,
                strict_mode: row.strict_mode,
                allowed_variance: row.allowed_variance,
            },
        }
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    id: String,
    employee_id: u64,
    project_id: u64,
    work_date: NaiveDate,
    check_in: Option<DateTime<Utc>>,
    check_out: Option<DateTime<Utc>>,
    lunch_start_time: Option<DateTime<Utc>>,
    lunch_end_time: Option<DateTime<Utc>>,
    overtime_start_time: Option<DateTime<Utc>>,
    inside_geofence_at_checkin: bool,
    inside_geofence_at_checkout: bool,
    last_latitude: Option<f64>,
    last_longitude: Option<f64>,
    pending_checkout: bool,
    manual_overrides: Json<Vec<ManualOverride>>,
    previous_sessions: Json<Vec<ClosedSession>>,
    revision: i64,
}

impl From<AttendanceRow> for AttendanceRecord {
    fn from(row: AttendanceRow) -> Self {
        AttendanceRecord {
            id: row.id,
            employee_id: row.employee_id,
            project_id: row.project_id,
            date: row.work_date,
            check_in: row.check_in,
            check_out: row.check_out,
            lunch_start_time: row.lunch_start_time,
            lunch_end_time: row.lunch_end_time,
            overtime_start_time: row.overtime_start_time,
            inside_geofence_at_checkin: row.inside_geofence_at_checkin,
            inside_geofence_at_checkout: row.inside_geofence_at_checkout,
            last_latitude: row.last_latitude,
            last_longitude: row.last_longitude,
            pending_checkout: row.pending_checkout,
            manual_overrides: row.manual_overrides.0,
            previous_sessions: row.previous_sessions.0,
            revision: row.revision,
        }
    }
}

const ATTENDANCE_COLUMNS: &str = r#"
    id, employee_id, project_id, work_date, check_in, check_out,
    lunch_start_time, lunch_end_time, overtime_start_time,
    inside_geofence_at_checkin, inside_geofence_at_checkout,
    last_latitude, last_longitude, pending_checkout,
    manual_overrides, previous_sessions, revision
"#;

#[derive(FromRow)]
struct AssignmentRow {
    id: u64,
    task_id: u64,
    employee_id: u64,
    project_id: u64,
    supervisor_id: Option<u64>,
    work_date: NaiveDate,
    status: String,
    sequence: i32,
    dependencies: Json<Vec<u64>>,
    progress_percent: f64,
    start_time: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    total_time_spent: Option<i64>,
    daily_target: Option<Json<DailyTarget>>,
    estimated_minutes: i64,
    elapsed_minutes: i64,
    remaining_minutes: i64,
    last_validated: Option<DateTime<Utc>>,
    validation_latitude: Option<f64>,
    validation_longitude: Option<f64>,
    completion_notes: Option<String>,
    actual_quantity: Option<f64>,
    revision: i64,
}

impl TryFrom<AssignmentRow> for TaskAssignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        let status = AssignmentStatus::from_str(&row.status).map_err(|_| {
            StoreError::Corrupt(format!(
                "assignment {} has unknown status '{}'",
                row.id, row.status
            ))
        })?;

        Ok(TaskAssignment {
            id: row.id,
            task_id: row.task_id,
            employee_id: row.employee_id,
            project_id: row.project_id,
            supervisor_id: row.supervisor_id,
            date: row.work_date,
            status,
            sequence: row.sequence,
            dependencies: row.dependencies.0,
            progress_percent: row.progress_percent,
            start_time: row.start_time,
            completed_at: row.completed_at,
            total_time_spent: row.total_time_spent,
            daily_target: row.daily_target.map(|t| t.0),
            time_estimate: TimeEstimate {
                estimated: row.estimated_minutes,
                elapsed: row.elapsed_minutes,
                remaining: row.remaining_minutes,
            },
            geofence_validation: GeofenceValidation {
                last_validated: row.last_validated,
                validation_location: point(row.validation_latitude, row.validation_longitude),
            },
            completion_notes: row.completion_notes,
            actual_quantity: row.actual_quantity,
            revision: row.revision,
        })
    }
}

const ASSIGNMENT_COLUMNS: &str = r#"
    id, task_id, employee_id, project_id, supervisor_id, work_date, status,
    sequence, dependencies, progress_percent, start_time, completed_at,
    total_time_spent, daily_target, estimated_minutes, elapsed_minutes,
    remaining_minutes, last_validated, validation_latitude,
    validation_longitude, completion_notes, actual_quantity, revision
"#;

fn assignments_from_rows(rows: Vec<AssignmentRow>) -> StoreResult<Vec<TaskAssignment>> {
    rows.into_iter().map(TaskAssignment::try_from).collect()
}

#[derive(FromRow)]
struct ProgressRow {
    id: String,
    assignment_id: u64,
    employee_id: u64,
    percent: f64,
    description: String,
    notes: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    completed_quantity: Option<f64>,
    issues: Option<String>,
    submitted_at: DateTime<Utc>,
}

impl From<ProgressRow> for TaskProgressEntry {
    fn from(row: ProgressRow) -> Self {
        TaskProgressEntry {
            id: row.id,
            assignment_id: row.assignment_id,
            employee_id: row.employee_id,
            percent: row.percent,
            description: row.description,
            notes: row.notes,
            location: point(row.latitude, row.longitude),
            completed_quantity: row.completed_quantity,
            issues: row.issues,
            submitted_at: row.submitted_at,
        }
    }
}

/* =========================
Store
========================= */

pub struct MySqlStore {
    pool: MySqlPool,
    projects: Cache<u64, Project>,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool, project_cache_ttl: Duration) -> Self {
        let projects = Cache::builder()
            .max_capacity(PROJECT_CACHE_CAPACITY)
            .time_to_live(project_cache_ttl)
            .build();
        Self { pool, projects }
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn find_employee(&self, id: u64) -> StoreResult<Option<Employee>> {
        let employee = sqlx::query_as::<_, Employee>(
            r#"
            SELECT id, employee_code, first_name, last_name, email, phone, status
            FROM employees
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(employee)
    }

    async fn find_project(&self, id: u64) -> StoreResult<Option<Project>> {
        if let Some(project) = self.projects.get(&id).await {
            return Ok(Some(project));
        }

        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, name, code, supervisor_id, latitude, longitude,
                   radius, strict_mode, allowed_variance
            FROM projects
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let project = row.map(Project::from);
        if let Some(project) = &project {
            debug!(project_id = id, "Caching project geofence");
            self.projects.insert(id, project.clone()).await;
        }
        Ok(project)
    }

    async fn find_task(&self, id: u64) -> StoreResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            "SELECT id, name, description, task_type FROM tasks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn find_attendance(
        &self,
        employee_id: u64,
        project_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
             WHERE employee_id = ? AND project_id = ? AND work_date = ?"
        );
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(employee_id)
            .bind(project_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AttendanceRecord::from))
    }

    async fn find_attendance_by_id(&self, id: &str) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?");
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AttendanceRecord::from))
    }

    async fn attendance_for_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance \
             WHERE employee_id = ? AND work_date = ? \
             ORDER BY check_in DESC"
        );
        let rows = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(employee_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AttendanceRecord::from).collect())
    }

    async fn attendance_history(
        &self,
        query: &AttendanceHistoryQuery,
    ) -> StoreResult<(Vec<AttendanceRecord>, i64)> {
        // -------------------------
        // WHERE clause
        // -------------------------
        let mut where_sql = String::from(" WHERE employee_id = ?");
        let mut args = vec![FilterValue::U64(query.employee_id)];

        if let Some(project_id) = query.project_id {
            where_sql.push_str(" AND project_id = ?");
            args.push(FilterValue::U64(project_id));
        }
        if let Some(from) = query.from {
            where_sql.push_str(" AND work_date >= ?");
            args.push(FilterValue::Date(from));
        }
        if let Some(to) = query.to {
            where_sql.push_str(" AND work_date <= ?");
            args.push(FilterValue::Date(to));
        }

        // -------------------------
        // COUNT query
        // -------------------------
        let count_sql = format!("SELECT COUNT(*) FROM attendance{}", where_sql);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::Date(d) => count_q.bind(*d),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        // -------------------------
        // DATA query
        // -------------------------
        let data_sql = format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance{} \
             ORDER BY work_date DESC, check_in DESC LIMIT ? OFFSET ?",
            where_sql
        );
        debug!(sql = %data_sql, page = query.page, per_page = query.per_page, "Fetching attendance history");

        let mut data_q = sqlx::query_as::<_, AttendanceRow>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(v),
                FilterValue::Date(d) => data_q.bind(d),
            };
        }
        let rows = data_q
            .bind(query.per_page as u64)
            .bind(query.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(AttendanceRecord::from).collect(), total))
    }

    async fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance (
                id, employee_id, project_id, work_date, check_in, check_out,
                lunch_start_time, lunch_end_time, overtime_start_time,
                inside_geofence_at_checkin, inside_geofence_at_checkout,
                last_latitude, last_longitude, pending_checkout,
                manual_overrides, previous_sessions, revision
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.employee_id)
        .bind(record.project_id)
        .bind(record.date)
        .bind(record.check_in)
        .bind(record.check_out)
        .bind(record.lunch_start_time)
        .bind(record.lunch_end_time)
        .bind(record.overtime_start_time)
        .bind(record.inside_geofence_at_checkin)
        .bind(record.inside_geofence_at_checkout)
        .bind(record.last_latitude)
        .bind(record.last_longitude)
        .bind(record.pending_checkout)
        .bind(Json(&record.manual_overrides))
        .bind(Json(&record.previous_sessions))
        .bind(record.revision)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, &format!("attendance {}", record.id)))?;
        Ok(())
    }

    async fn update_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE attendance SET
                check_in = ?, check_out = ?, lunch_start_time = ?,
                lunch_end_time = ?, overtime_start_time = ?,
                inside_geofence_at_checkin = ?, inside_geofence_at_checkout = ?,
                last_latitude = ?, last_longitude = ?, pending_checkout = ?,
                manual_overrides = ?, previous_sessions = ?,
                revision = revision + 1
            WHERE id = ? AND revision = ?
            "#,
        )
        .bind(record.check_in)
        .bind(record.check_out)
        .bind(record.lunch_start_time)
        .bind(record.lunch_end_time)
        .bind(record.overtime_start_time)
        .bind(record.inside_geofence_at_checkin)
        .bind(record.inside_geofence_at_checkout)
        .bind(record.last_latitude)
        .bind(record.last_longitude)
        .bind(record.pending_checkout)
        .bind(Json(&record.manual_overrides))
        .bind(Json(&record.previous_sessions))
        .bind(&record.id)
        .bind(record.revision)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("attendance {}", record.id)));
        }
        Ok(())
    }

    async fn find_assignment(&self, id: u64) -> StoreResult<Option<TaskAssignment>> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE id = ?");
        let row = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskAssignment::try_from).transpose()
    }

    async fn find_assignments(&self, ids: &[u64]) -> StoreResult<Vec<TaskAssignment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, AssignmentRow>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        assignments_from_rows(query.fetch_all(&self.pool).await?)
    }

    async fn assignments_for_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        project_id: Option<u64>,
    ) -> StoreResult<Vec<TaskAssignment>> {
        let mut sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments \
             WHERE employee_id = ? AND work_date = ?"
        );
        if project_id.is_some() {
            sql.push_str(" AND project_id = ?");
        }
        sql.push_str(" ORDER BY sequence ASC, id ASC");

        let mut query = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(employee_id)
            .bind(date);
        if let Some(project_id) = project_id {
            query = query.bind(project_id);
        }
        assignments_from_rows(query.fetch_all(&self.pool).await?)
    }

    async fn update_assignment(
        &self,
        assignment: &TaskAssignment,
        entry: Option<&TaskProgressEntry>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let validation_location = assignment.geofence_validation.validation_location;
        let result = sqlx::query(
            r#"
            UPDATE task_assignments SET
                status = ?, progress_percent = ?, start_time = ?, completed_at = ?,
                total_time_spent = ?, estimated_minutes = ?, elapsed_minutes = ?,
                remaining_minutes = ?, last_validated = ?, validation_latitude = ?,
                validation_longitude = ?, completion_notes = ?, actual_quantity = ?,
                revision = revision + 1
            WHERE id = ? AND revision = ?
            "#,
        )
        .bind(assignment.status.to_string())
        .bind(assignment.progress_percent)
        .bind(assignment.start_time)
        .bind(assignment.completed_at)
        .bind(assignment.total_time_spent)
        .bind(assignment.time_estimate.estimated)
        .bind(assignment.time_estimate.elapsed)
        .bind(assignment.time_estimate.remaining)
        .bind(assignment.geofence_validation.last_validated)
        .bind(validation_location.map(|c| c.latitude))
        .bind(validation_location.map(|c| c.longitude))
        .bind(&assignment.completion_notes)
        .bind(assignment.actual_quantity)
        .bind(assignment.id)
        .bind(assignment.revision)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(format!("assignment {}", assignment.id)));
        }

        if let Some(entry) = entry {
            sqlx::query(
                r#"
                INSERT INTO task_progress (
                    id, assignment_id, employee_id, percent, description, notes,
                    latitude, longitude, completed_quantity, issues, submitted_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.id)
            .bind(entry.assignment_id)
            .bind(entry.employee_id)
            .bind(entry.percent)
            .bind(&entry.description)
            .bind(&entry.notes)
            .bind(entry.location.map(|c| c.latitude))
            .bind(entry.location.map(|c| c.longitude))
            .bind(entry.completed_quantity)
            .bind(&entry.issues)
            .bind(entry.submitted_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn progress_entries(&self, assignment_id: u64) -> StoreResult<Vec<TaskProgressEntry>> {
        let rows = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT id, assignment_id, employee_id, percent, description, notes,
                   latitude, longitude, completed_quantity, issues, submitted_at
            FROM task_progress
            WHERE assignment_id = ?
            ORDER BY submitted_at ASC
            "#,
        )
        .bind(assignment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TaskProgressEntry::from).collect())
    }

    async fn insert_issue(&self, issue: &IssueReport) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO issue_reports (
                id, ticket_number, assignment_id, employee_id, issue_type,
                priority, description, latitude, longitude, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&issue.id)
        .bind(&issue.ticket_number)
        .bind(issue.assignment_id)
        .bind(issue.employee_id)
        .bind(issue.issue_type.to_string())
        .bind(issue.priority.to_string())
        .bind(&issue.description)
        .bind(issue.location.map(|c| c.latitude))
        .bind(issue.location.map(|c| c.longitude))
        .bind(issue.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, &format!("issue {}", issue.id)))?;
        Ok(())
    }

    async fn append_location_log(&self, log: &LocationLog) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO location_logs (
                id, employee_id, project_id, latitude, longitude, accuracy,
                inside_geofence, distance, kind, recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(log.employee_id)
        .bind(log.project_id)
        .bind(log.location.latitude)
        .bind(log.location.longitude)
        .bind(log.accuracy)
        .bind(log.inside_geofence)
        .bind(log.distance)
        .bind(log.kind.to_string())
        .bind(log.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, recipient_id, employee_id, assignment_id, kind, title,
                message, previous_status, new_status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.id)
        .bind(notification.recipient_id)
        .bind(notification.employee_id)
        .bind(notification.assignment_id)
        .bind(notification.kind.to_string())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.previous_status.map(|s| s.to_string()))
        .bind(notification.new_status.map(|s| s.to_string()))
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
