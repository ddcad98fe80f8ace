use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use super::gates::{self, StartReadiness};
use super::{LocationInput, ServiceContext};
use crate::error::WorkflowError;
use crate::model::assignment::{
    AssignmentStatus, DailyTarget, GeofenceValidation, TaskAssignment, TimeEstimate,
};
use crate::model::employee::Employee;
use crate::model::issue::{self, IssuePriority, IssueReport, IssueType};
use crate::model::location_log::{LocationLog, LocationLogKind};
use crate::model::progress::TaskProgressEntry;
use crate::model::project::Project;
use crate::utils::geofence::{self, Coordinates, GeofenceCheck, ProjectGeofence};
use crate::utils::text::{clamp_optional_text, clamp_quantity, clamp_text};

const MAX_DESCRIPTION_CHARS: usize = 1000;
const MAX_NOTES_CHARS: usize = 2000;

/* =========================
Requests
========================= */

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartTaskRequest {
    pub location: LocationInput,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    #[schema(example = 60.0)]
    pub progress_percent: f64,
    #[schema(example = "Grid A-C tied")]
    pub description: String,
    pub notes: Option<String>,
    pub location: Option<LocationInput>,
    #[schema(example = 72.0)]
    pub completed_quantity: Option<f64>,
    pub issues: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[schema(example = "Slab ready for inspection")]
    pub completion_notes: Option<String>,
    pub location: Option<LocationInput>,
    #[schema(example = 118.0)]
    pub actual_quantity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    #[schema(example = 41)]
    pub assignment_id: u64,
    #[schema(example = "safety")]
    pub issue_type: String,
    #[schema(example = "high")]
    pub priority: String,
    #[schema(example = "Scaffold guard rail missing on level 3")]
    pub description: String,
    pub location: Option<LocationInput>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceRequest {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
    #[schema(example = 120.0)]
    pub accuracy: Option<f64>,
    /// Defaults to the project of today's active assignment.
    pub project_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TasksTodayQuery {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
}

/* =========================
Outcomes
========================= */

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartTaskOutcome {
    pub assignment_id: u64,
    pub status: AssignmentStatus,
    #[schema(value_type = String, format = "date-time")]
    pub start_time: DateTime<Utc>,
    pub geofence: GeofenceCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NextAction {
    TaskCompleted,
    ReadyToComplete,
    ContinueWork,
}

impl NextAction {
    pub fn for_progress(percent: f64) -> Self {
        if percent >= 100.0 {
            NextAction::TaskCompleted
        } else if percent >= 90.0 {
            NextAction::ReadyToComplete
        } else {
            NextAction::ContinueWork
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOutcome {
    pub progress_id: String,
    pub assignment_id: u64,
    pub progress_percent: f64,
    pub status: AssignmentStatus,
    pub time_estimate: TimeEstimate,
    pub next_action: NextAction,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NextTaskHint {
    pub assignment_id: u64,
    pub task_id: u64,
    pub sequence: i32,
    pub can_start: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOutcome {
    pub assignment_id: u64,
    pub status: AssignmentStatus,
    #[schema(value_type = String, format = "date-time")]
    pub completed_at: DateTime<Utc>,
    /// Minutes between start and completion.
    pub total_time_spent: i64,
    pub progress_percent: f64,
    pub next_task: Option<NextTaskHint>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueOutcome {
    pub issue_id: String,
    #[schema(example = "ISS-20260302-5F0C6A7E")]
    pub ticket_number: String,
    pub assignment_id: u64,
    pub assignment_status: AssignmentStatus,
    pub assignment_blocked: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceOutcome {
    pub project_id: u64,
    pub inside_geofence: bool,
    pub distance: f64,
    pub is_valid: bool,
    pub can_start_tasks: bool,
    pub accuracy_caveat: bool,
    pub message: String,
    pub geofence: ProjectGeofence,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: u64,
    pub name: String,
    pub code: Option<String>,
    pub geofence: Option<ProjectGeofence>,
}

impl ProjectSummary {
    fn from_project(project: Project) -> Self {
        Self {
            id: project.id,
            name: project.name,
            code: Some(project.code),
            geofence: Some(project.geofence),
        }
    }

    fn placeholder(id: u64) -> Self {
        Self {
            id,
            name: "Unknown project".to_string(),
            code: None,
            geofence: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorSummary {
    pub id: u64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl SupervisorSummary {
    fn from_employee(employee: Employee) -> Self {
        Self {
            id: employee.id,
            name: employee.full_name(),
            phone: employee.phone,
            email: Some(employee.email),
        }
    }

    fn placeholder(id: u64) -> Self {
        Self {
            id,
            name: "Unknown supervisor".to_string(),
            phone: None,
            email: None,
        }
    }
}

/// One assignment as the worker's task list shows it.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskCard {
    pub assignment_id: u64,
    pub task_id: u64,
    pub task_name: String,
    pub task_description: Option<String>,
    pub task_type: Option<String>,
    pub sequence: i32,
    pub status: AssignmentStatus,
    pub dependencies: Vec<u64>,
    pub progress_percent: f64,
    pub daily_target: Option<DailyTarget>,
    pub time_estimate: TimeEstimate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub start_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub completed_at: Option<DateTime<Utc>>,
    pub readiness: StartReadiness,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub total: usize,
    pub queued: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
    pub cancelled: usize,
}

impl TaskSummary {
    fn of(assignments: &[TaskAssignment]) -> Self {
        let mut summary = TaskSummary {
            total: assignments.len(),
            ..TaskSummary::default()
        };
        for a in assignments {
            match a.status {
                AssignmentStatus::Queued => summary.queued += 1,
                AssignmentStatus::InProgress => summary.in_progress += 1,
                AssignmentStatus::Completed => summary.completed += 1,
                AssignmentStatus::Blocked => summary.blocked += 1,
                AssignmentStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TasksTodayOutcome {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub project: Option<ProjectSummary>,
    pub supervisor: Option<SupervisorSummary>,
    /// Present when the request carried a location.
    pub geofence: Option<GeofenceCheck>,
    pub tasks: Vec<TaskCard>,
    pub summary: TaskSummary,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetailsOutcome {
    pub task: TaskCard,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub project: ProjectSummary,
    pub supervisor: Option<SupervisorSummary>,
    pub geofence_validation: GeofenceValidation,
    pub total_time_spent: Option<i64>,
    pub completion_notes: Option<String>,
    pub actual_quantity: Option<f64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressHistoryOutcome {
    pub assignment_id: u64,
    pub progress_percent: f64,
    pub status: AssignmentStatus,
    pub entries: Vec<TaskProgressEntry>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_updated: Option<DateTime<Utc>>,
}

/* =========================
Service
========================= */

#[derive(Clone)]
pub struct TaskService {
    ctx: ServiceContext,
}

fn optional_location(location: Option<&LocationInput>) -> Result<Option<Coordinates>, WorkflowError> {
    location
        .map(|l| Coordinates::validated(l.latitude, l.longitude))
        .transpose()
}

impl TaskService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn owned_assignment(
        &self,
        assignment_id: u64,
        employee_id: u64,
    ) -> Result<TaskAssignment, WorkflowError> {
        let assignment = self
            .ctx
            .store
            .find_assignment(assignment_id)
            .await?
            .ok_or(WorkflowError::AssignmentNotFound(assignment_id))?;
        assignment.ensure_owned_by(employee_id)?;
        Ok(assignment)
    }

    fn notify_status_change(
        &self,
        assignment: &TaskAssignment,
        employee: &Employee,
        previous: AssignmentStatus,
        now: DateTime<Utc>,
    ) {
        if assignment.status != previous {
            self.ctx
                .notifications
                .task_status_changed(assignment, employee, previous, now);
        }
    }

    pub async fn start(
        &self,
        employee_id: Option<u64>,
        assignment_id: u64,
        req: &StartTaskRequest,
    ) -> Result<StartTaskOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let fix = req.location.fix()?;
        let mut assignment = self.owned_assignment(assignment_id, employee.id).await?;
        assignment.ensure_startable()?;

        if let Err(e) = gates::check_prerequisites(self.ctx.store.as_ref(), &assignment).await {
            warn!(assignment_id, employee_id = employee.id, error = %e, "Task start gated");
            return Err(e);
        }

        let project = self.ctx.load_project(assignment.project_id).await?;
        let check = geofence::validate_with_policy(
            &fix,
            &project.geofence,
            self.ctx.settings.accuracy_leniency.as_ref(),
        );
        if !check.is_valid {
            warn!(
                assignment_id,
                employee_id = employee.id,
                distance = check.distance,
                radius = project.geofence.radius,
                "Task start outside geofence"
            );
            return Err(WorkflowError::OutsideGeofence {
                distance: check.distance,
                radius: project.geofence.radius,
                allowed_variance: project.geofence.allowed_variance,
            });
        }

        let now = self.ctx.now();
        let previous = assignment.status;
        assignment.start(now, fix.coordinates)?;
        self.ctx
            .store
            .update_assignment(&assignment, None)
            .await
            .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::AlreadyStarted))?;

        self.ctx
            .audit_location(LocationLog::new(
                employee.id,
                project.id,
                fix.coordinates,
                fix.accuracy,
                &check,
                LocationLogKind::TaskStart,
                now,
            ))
            .await;
        self.notify_status_change(&assignment, &employee, previous, now);

        info!(
            assignment_id,
            employee_id = employee.id,
            distance = check.distance,
            accuracy_caveat = check.accuracy_caveat,
            "Task started"
        );

        Ok(StartTaskOutcome {
            assignment_id,
            status: assignment.status,
            start_time: now,
            geofence: check,
        })
    }

    pub async fn update_progress(
        &self,
        employee_id: Option<u64>,
        assignment_id: u64,
        req: &ProgressRequest,
    ) -> Result<ProgressOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let location = optional_location(req.location.as_ref())?;
        let mut assignment = self.owned_assignment(assignment_id, employee.id).await?;

        let now = self.ctx.now();
        let previous = assignment.status;
        let status_changed = assignment.apply_progress(req.progress_percent, now)?;

        let entry = TaskProgressEntry {
            id: uuid::Uuid::new_v4().to_string(),
            assignment_id,
            employee_id: employee.id,
            percent: req.progress_percent,
            description: clamp_text("description", &req.description, MAX_DESCRIPTION_CHARS),
            notes: clamp_optional_text("notes", req.notes.as_deref(), MAX_NOTES_CHARS),
            location,
            completed_quantity: clamp_quantity("completed_quantity", req.completed_quantity),
            issues: clamp_optional_text("issues", req.issues.as_deref(), MAX_NOTES_CHARS),
            submitted_at: now,
        };

        self.ctx
            .store
            .update_assignment(&assignment, Some(&entry))
            .await
            .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::ConcurrentUpdate))?;

        if status_changed {
            self.notify_status_change(&assignment, &employee, previous, now);
        }

        info!(
            assignment_id,
            employee_id = employee.id,
            percent = req.progress_percent,
            status = %assignment.status,
            "Progress recorded"
        );

        Ok(ProgressOutcome {
            progress_id: entry.id,
            assignment_id,
            progress_percent: assignment.progress_percent,
            status: assignment.status,
            time_estimate: assignment.time_estimate,
            next_action: NextAction::for_progress(assignment.progress_percent),
        })
    }

    pub async fn complete(
        &self,
        employee_id: Option<u64>,
        assignment_id: u64,
        req: &CompleteRequest,
    ) -> Result<CompleteOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let location = optional_location(req.location.as_ref())?;
        let mut assignment = self.owned_assignment(assignment_id, employee.id).await?;

        let now = self.ctx.now();
        let previous = assignment.status;
        let notes = clamp_optional_text(
            "completion_notes",
            req.completion_notes.as_deref(),
            MAX_NOTES_CHARS,
        );
        let quantity = clamp_quantity("actual_quantity", req.actual_quantity);
        let total_time_spent = assignment.complete(now, notes.clone(), quantity)?;

        let entry = TaskProgressEntry {
            id: uuid::Uuid::new_v4().to_string(),
            assignment_id,
            employee_id: employee.id,
            percent: 100.0,
            description: "Task completed".to_string(),
            notes,
            location,
            completed_quantity: quantity,
            issues: None,
            submitted_at: now,
        };

        self.ctx
            .store
            .update_assignment(&assignment, Some(&entry))
            .await
            .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::ConcurrentUpdate))?;

        self.notify_status_change(&assignment, &employee, previous, now);
        info!(
            assignment_id,
            employee_id = employee.id,
            total_time_spent,
            "Task completed"
        );

        let next_task = self.next_task(&assignment).await;
        Ok(CompleteOutcome {
            assignment_id,
            status: assignment.status,
            completed_at: now,
            total_time_spent,
            progress_percent: assignment.progress_percent,
            next_task,
        })
    }

    /// First queued assignment after `done` on the same project and day.
    /// Lookup failures only drop the hint.
    async fn next_task(&self, done: &TaskAssignment) -> Option<NextTaskHint> {
        let siblings = match self
            .ctx
            .store
            .assignments_for_day(done.employee_id, done.date, Some(done.project_id))
            .await
        {
            Ok(siblings) => siblings,
            Err(e) => {
                warn!(assignment_id = done.id, error = %e, "Could not look up next task");
                return None;
            }
        };

        let next = siblings
            .iter()
            .find(|s| s.id != done.id && s.status == AssignmentStatus::Queued)?;

        let readiness = match self.ctx.store.find_assignments(&next.dependencies).await {
            Ok(dependencies) => gates::readiness(next, &dependencies, &siblings),
            Err(e) => {
                warn!(assignment_id = next.id, error = %e, "Could not verify next task dependencies");
                StartReadiness::blocked("Unable to verify dependencies")
            }
        };

        Some(NextTaskHint {
            assignment_id: next.id,
            task_id: next.task_id,
            sequence: next.sequence,
            can_start: readiness.can_start,
            reason: readiness.reason,
        })
    }

    pub async fn report_issue(
        &self,
        employee_id: Option<u64>,
        req: &IssueRequest,
    ) -> Result<IssueOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let issue_type = IssueType::from_str(req.issue_type.trim())
            .map_err(|_| WorkflowError::InvalidIssueType(req.issue_type.clone()))?;
        let priority = IssuePriority::from_str(req.priority.trim())
            .map_err(|_| WorkflowError::InvalidPriority(req.priority.clone()))?;
        let location = optional_location(req.location.as_ref())?;
        let mut assignment = self.owned_assignment(req.assignment_id, employee.id).await?;

        let now = self.ctx.now();
        let id = uuid::Uuid::new_v4().to_string();
        let report = IssueReport {
            ticket_number: issue::ticket_number(&id, now),
            id,
            assignment_id: assignment.id,
            employee_id: employee.id,
            issue_type,
            priority,
            description: clamp_text("description", &req.description, MAX_NOTES_CHARS),
            location,
            created_at: now,
        };
        // the ticket must exist before the assignment is blocked on its account
        self.ctx.store.insert_issue(&report).await?;

        let previous = assignment.status;
        let blocked = priority.blocks_work() && assignment.block();
        if blocked {
            self.ctx
                .store
                .update_assignment(&assignment, None)
                .await
                .map_err(|e| WorkflowError::on_conflict(e, WorkflowError::ConcurrentUpdate))?;
            self.notify_status_change(&assignment, &employee, previous, now);
        }

        info!(
            assignment_id = assignment.id,
            employee_id = employee.id,
            ticket = %report.ticket_number,
            %issue_type,
            %priority,
            blocked,
            "Issue reported"
        );

        Ok(IssueOutcome {
            issue_id: report.id,
            ticket_number: report.ticket_number,
            assignment_id: assignment.id,
            assignment_status: assignment.status,
            assignment_blocked: blocked,
        })
    }

    pub async fn validate_geofence(
        &self,
        employee_id: Option<u64>,
        req: &GeofenceRequest,
    ) -> Result<GeofenceOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let fix = geofence::LocationFix::parse(req.latitude, req.longitude, req.accuracy)?;
        let now = self.ctx.now();

        let project_id = match req.project_id {
            Some(project_id) => project_id,
            None => self.active_project(employee.id, self.ctx.work_date(now)).await?,
        };
        let project = self.ctx.load_project(project_id).await?;

        let check = geofence::validate_with_policy(
            &fix,
            &project.geofence,
            self.ctx.settings.accuracy_leniency.as_ref(),
        );
        self.ctx
            .audit_location(LocationLog::new(
                employee.id,
                project.id,
                fix.coordinates,
                fix.accuracy,
                &check,
                LocationLogKind::GeofenceCheck,
                now,
            ))
            .await;

        debug!(
            employee_id = employee.id,
            project_id,
            distance = check.distance,
            is_valid = check.is_valid,
            "Geofence validated"
        );

        Ok(GeofenceOutcome {
            project_id,
            inside_geofence: check.inside_geofence,
            distance: check.distance.round(),
            is_valid: check.is_valid,
            can_start_tasks: check.is_valid,
            accuracy_caveat: check.accuracy_caveat,
            message: check.message,
            geofence: project.geofence,
        })
    }

    /// Project of the first unfinished assignment today, preferring one
    /// already in progress.
    async fn active_project(&self, employee_id: u64, date: NaiveDate) -> Result<u64, WorkflowError> {
        let assignments = self
            .ctx
            .store
            .assignments_for_day(employee_id, date, None)
            .await?;
        assignments
            .iter()
            .find(|a| a.status == AssignmentStatus::InProgress)
            .or_else(|| {
                assignments
                    .iter()
                    .find(|a| a.status == AssignmentStatus::Queued)
            })
            .map(|a| a.project_id)
            .ok_or(WorkflowError::NoActiveAssignment)
    }

    /* -------------------------
    Read side. Lookups of related records degrade to placeholders.
    ------------------------- */

    async fn project_summary(&self, project_id: u64) -> ProjectSummary {
        match self.ctx.load_project(project_id).await {
            Ok(project) => ProjectSummary::from_project(project),
            Err(e) => {
                warn!(project_id, error = %e, "Project unavailable, using placeholder");
                ProjectSummary::placeholder(project_id)
            }
        }
    }

    async fn supervisor_summary(&self, supervisor_id: Option<u64>) -> Option<SupervisorSummary> {
        let supervisor_id = supervisor_id?;
        match self.ctx.store.find_employee(supervisor_id).await {
            Ok(Some(employee)) => Some(SupervisorSummary::from_employee(employee)),
            Ok(None) => {
                warn!(supervisor_id, "Supervisor record missing, using placeholder");
                Some(SupervisorSummary::placeholder(supervisor_id))
            }
            Err(e) => {
                warn!(supervisor_id, error = %e, "Supervisor lookup failed, using placeholder");
                Some(SupervisorSummary::placeholder(supervisor_id))
            }
        }
    }

    async fn task_card(&self, assignment: &TaskAssignment, siblings: &[TaskAssignment]) -> TaskCard {
        let task = match self.ctx.store.find_task(assignment.task_id).await {
            Ok(task) => task,
            Err(e) => {
                warn!(task_id = assignment.task_id, error = %e, "Task lookup failed");
                None
            }
        };
        let (task_name, task_description, task_type) = match task {
            Some(task) => (task.name, task.description, task.task_type),
            None => {
                warn!(task_id = assignment.task_id, "Task record missing, using placeholder");
                (format!("Task #{}", assignment.task_id), None, None)
            }
        };

        let readiness = match self.ctx.store.find_assignments(&assignment.dependencies).await {
            Ok(dependencies) => gates::readiness(assignment, &dependencies, siblings),
            Err(e) => {
                warn!(assignment_id = assignment.id, error = %e, "Dependency lookup failed");
                StartReadiness::blocked("Unable to verify dependencies")
            }
        };

        TaskCard {
            assignment_id: assignment.id,
            task_id: assignment.task_id,
            task_name,
            task_description,
            task_type,
            sequence: assignment.sequence,
            status: assignment.status,
            dependencies: assignment.dependencies.clone(),
            progress_percent: assignment.progress_percent,
            daily_target: assignment.daily_target.clone(),
            time_estimate: assignment.time_estimate,
            start_time: assignment.start_time,
            completed_at: assignment.completed_at,
            readiness,
        }
    }

    /// Today's task list. All assignments are listed; project, supervisor and
    /// geofence status come from the first one, since a worker is scheduled
    /// on one project per day.
    pub async fn tasks_today(
        &self,
        employee_id: Option<u64>,
        query: &TasksTodayQuery,
    ) -> Result<TasksTodayOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let date = self.ctx.work_date(self.ctx.now());
        let assignments = self
            .ctx
            .store
            .assignments_for_day(employee.id, date, None)
            .await?;

        let Some(first) = assignments.first() else {
            return Ok(TasksTodayOutcome {
                date,
                project: None,
                supervisor: None,
                geofence: None,
                tasks: Vec::new(),
                summary: TaskSummary::default(),
            });
        };

        let project = self.project_summary(first.project_id).await;
        let supervisor = self.supervisor_summary(first.supervisor_id).await;
        let geofence = self.current_geofence_status(query, project.geofence.as_ref());

        let mut tasks = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            tasks.push(self.task_card(assignment, &assignments).await);
        }

        Ok(TasksTodayOutcome {
            date,
            project: Some(project),
            supervisor,
            geofence,
            summary: TaskSummary::of(&assignments),
            tasks,
        })
    }

    fn current_geofence_status(
        &self,
        query: &TasksTodayQuery,
        fence: Option<&ProjectGeofence>,
    ) -> Option<GeofenceCheck> {
        let (latitude, longitude) = (query.latitude?, query.longitude?);
        let fence = fence?;
        match geofence::LocationFix::parse(latitude, longitude, query.accuracy) {
            Ok(fix) => Some(geofence::validate_with_policy(
                &fix,
                fence,
                self.ctx.settings.accuracy_leniency.as_ref(),
            )),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed location on task list request");
                None
            }
        }
    }

    pub async fn task_details(
        &self,
        employee_id: Option<u64>,
        assignment_id: u64,
    ) -> Result<TaskDetailsOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let assignment = self.owned_assignment(assignment_id, employee.id).await?;

        let siblings = match self
            .ctx
            .store
            .assignments_for_day(assignment.employee_id, assignment.date, Some(assignment.project_id))
            .await
        {
            Ok(siblings) => siblings,
            Err(e) => {
                warn!(assignment_id, error = %e, "Sibling lookup failed");
                vec![assignment.clone()]
            }
        };

        let task = self.task_card(&assignment, &siblings).await;
        let project = self.project_summary(assignment.project_id).await;
        let supervisor = self.supervisor_summary(assignment.supervisor_id).await;
        let last_updated = match self.ctx.store.progress_entries(assignment_id).await {
            Ok(entries) => entries.last().map(|e| e.submitted_at),
            Err(e) => {
                warn!(assignment_id, error = %e, "Progress lookup failed");
                None
            }
        };

        Ok(TaskDetailsOutcome {
            task,
            date: assignment.date,
            project,
            supervisor,
            geofence_validation: assignment.geofence_validation,
            total_time_spent: assignment.total_time_spent,
            completion_notes: assignment.completion_notes,
            actual_quantity: assignment.actual_quantity,
            last_updated,
        })
    }

    pub async fn progress_history(
        &self,
        employee_id: Option<u64>,
        assignment_id: u64,
    ) -> Result<ProgressHistoryOutcome, WorkflowError> {
        let employee = self.ctx.resolve_employee(employee_id).await?;
        let assignment = self.owned_assignment(assignment_id, employee.id).await?;
        let entries = self.ctx.store.progress_entries(assignment_id).await?;
        let last_updated = entries.last().map(|e| e.submitted_at);

        Ok(ProgressHistoryOutcome {
            assignment_id,
            progress_percent: assignment.progress_percent,
            status: assignment.status,
            entries,
            last_updated,
        })
    }
}

#[cfg(test)]
mod task_service_tests {
    use super::*;
    use crate::store::Store;
    use crate::error::ErrorKind;
    use crate::model::assignment::fixtures::assignment;
    use crate::service::testing::*;
    use crate::service::WorkflowSettings;
    use crate::utils::geofence::AccuracyLeniency;
    use rstest::rstest;

    fn at(c: Coordinates) -> LocationInput {
        LocationInput {
            latitude: c.latitude,
            longitude: c.longitude,
            accuracy: Some(5.0),
        }
    }

    fn start_here() -> StartTaskRequest {
        StartTaskRequest { location: at(SITE) }
    }

    fn progress(percent: f64) -> ProgressRequest {
        ProgressRequest {
            progress_percent: percent,
            description: "Working".to_string(),
            notes: None,
            location: None,
            completed_quantity: None,
            issues: None,
        }
    }

    fn service(h: &Harness) -> TaskService {
        TaskService::new(h.ctx.clone())
    }

    async fn sequenced_day() -> Harness {
        let h = Harness::new().await;
        h.assign(assignment(1, WORKER, PROJECT, 1)).await;
        h.assign(assignment(2, WORKER, PROJECT, 2)).await;
        h
    }

    #[rstest]
    #[tokio::test]
    async fn start_out_of_sequence_names_blocking_assignment() {
        let h = sequenced_day().await;
        let err = service(&h)
            .start(Some(WORKER), 2, &start_here())
            .await
            .expect_err("sequence");
        assert!(matches!(err, WorkflowError::SequenceViolation { ref blocking } if blocking == &vec![1]));
        let unchanged = h.store.find_assignment(2).await.expect("read").expect("exists");
        assert_eq!(unchanged.status, AssignmentStatus::Queued);
    }

    #[rstest]
    #[tokio::test]
    async fn start_checks_dependencies_before_sequence() {
        let h = Harness::new().await;
        let mut dependent = assignment(3, WORKER, PROJECT, 1);
        dependent.dependencies = vec![77];
        h.assign(dependent).await;

        let err = service(&h)
            .start(Some(WORKER), 3, &start_here())
            .await
            .expect_err("dependency");
        assert_eq!(err.kind(), ErrorKind::GateFailed);
        assert!(matches!(err, WorkflowError::DependenciesNotMet { ref blocking } if blocking == &vec![77]));
    }

    #[rstest]
    #[tokio::test]
    async fn start_succeeds_within_variance_and_notifies() {
        let mut h = sequenced_day().await;
        let out = service(&h)
            .start(
                Some(WORKER),
                1,
                &StartTaskRequest {
                    location: at(north_of_site(105.0)),
                },
            )
            .await
            .expect("start");
        assert_eq!(out.status, AssignmentStatus::InProgress);
        assert!(!out.geofence.inside_geofence);
        assert!(out.geofence.is_valid);

        let stored = h.store.find_assignment(1).await.expect("read").expect("exists");
        assert_eq!(stored.start_time, Some(out.start_time));
        assert!(stored.geofence_validation.validation_location.is_some());

        let sent = h.drain_notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, 90);
        assert_eq!(h.store.location_logs().await[0].kind, LocationLogKind::TaskStart);
    }

    #[rstest]
    #[tokio::test]
    async fn start_outside_fence_reports_distance() {
        let h = sequenced_day().await;
        let err = service(&h)
            .start(
                Some(WORKER),
                1,
                &StartTaskRequest {
                    location: at(north_of_site(111.0)),
                },
            )
            .await
            .expect_err("outside");
        let body = err.details();
        assert_eq!(body["radius"], 100.0);
        assert_eq!(body["allowedVariance"], 10.0);
    }

    #[rstest]
    #[tokio::test]
    async fn start_by_someone_else_is_unauthorized() {
        let h = sequenced_day().await;
        h.store.put_employee(employee(55, "active")).await;
        let err = service(&h)
            .start(Some(55), 1, &start_here())
            .await
            .expect_err("not owner");
        assert!(matches!(err, WorkflowError::Unauthorized(_)));
    }

    #[rstest]
    #[tokio::test]
    async fn full_progress_completes_and_blocks_restart() {
        let mut h = sequenced_day().await;
        let svc = service(&h);
        svc.start(Some(WORKER), 1, &start_here()).await.expect("start");
        h.clock.advance(120);

        let out = svc
            .update_progress(Some(WORKER), 1, &progress(100.0))
            .await
            .expect("progress");
        assert_eq!(out.status, AssignmentStatus::Completed);
        assert_eq!(out.next_action, NextAction::TaskCompleted);

        let stored = h.store.find_assignment(1).await.expect("read").expect("exists");
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.total_time_spent, Some(120));

        let err = svc
            .start(Some(WORKER), 1, &start_here())
            .await
            .expect_err("completed");
        assert!(matches!(err, WorkflowError::AlreadyCompleted));

        // start + completion, no notification for the rejected restart
        assert_eq!(h.drain_notifications().len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn lower_progress_is_rejected_and_not_recorded() {
        let mut h = sequenced_day().await;
        let svc = service(&h);
        svc.start(Some(WORKER), 1, &start_here()).await.expect("start");
        let first = svc
            .update_progress(Some(WORKER), 1, &progress(40.0))
            .await
            .expect("40");
        assert_eq!(first.next_action, NextAction::ContinueWork);
        assert_eq!(first.time_estimate.elapsed, 96);

        let err = svc
            .update_progress(Some(WORKER), 1, &progress(30.0))
            .await
            .expect_err("decrease");
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let stored = h.store.find_assignment(1).await.expect("read").expect("exists");
        assert_eq!(stored.progress_percent, 40.0);
        assert_eq!(h.store.progress_entries(1).await.expect("read").len(), 1);
        // only the start changed status
        assert_eq!(h.drain_notifications().len(), 1);
    }

    #[rstest]
    #[case(95.0, NextAction::ReadyToComplete)]
    #[case(89.9, NextAction::ContinueWork)]
    #[case(100.0, NextAction::TaskCompleted)]
    fn next_action_thresholds(#[case] percent: f64, #[case] expected: NextAction) {
        assert_eq!(NextAction::for_progress(percent), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn progress_on_queued_task_fails() {
        let h = sequenced_day().await;
        let err = service(&h)
            .update_progress(Some(WORKER), 1, &progress(10.0))
            .await
            .expect_err("not started");
        assert!(matches!(err, WorkflowError::NotStarted));
    }

    #[rstest]
    #[tokio::test]
    async fn complete_records_ledger_and_points_at_next_task() {
        let h = sequenced_day().await;
        let svc = service(&h);
        svc.start(Some(WORKER), 1, &start_here()).await.expect("start");
        svc.update_progress(Some(WORKER), 1, &progress(50.0))
            .await
            .expect("50");
        h.clock.advance(90);

        let out = svc
            .complete(
                Some(WORKER),
                1,
                &CompleteRequest {
                    completion_notes: Some("Done".to_string()),
                    location: Some(at(SITE)),
                    actual_quantity: Some(-3.0),
                },
            )
            .await
            .expect("complete");
        assert_eq!(out.progress_percent, 100.0);
        assert_eq!(out.status, AssignmentStatus::Completed);
        assert_eq!(out.total_time_spent, 90);

        let next = out.next_task.expect("next task");
        assert_eq!(next.assignment_id, 2);
        assert!(next.can_start);

        let entries = h.store.progress_entries(1).await.expect("read");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].percent, 100.0);
        assert_eq!(entries[1].completed_quantity, None);

        let history = svc
            .progress_history(Some(WORKER), 1)
            .await
            .expect("history");
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.last_updated, Some(entries[1].submitted_at));

        svc.start(Some(WORKER), 2, &start_here())
            .await
            .expect("second task now starts");
    }

    #[rstest]
    #[tokio::test]
    async fn critical_issue_blocks_running_task() {
        let mut h = sequenced_day().await;
        let svc = service(&h);
        svc.start(Some(WORKER), 1, &start_here()).await.expect("start");
        h.drain_notifications();

        let out = svc
            .report_issue(
                Some(WORKER),
                &IssueRequest {
                    assignment_id: 1,
                    issue_type: "Safety".to_string(),
                    priority: "critical".to_string(),
                    description: "Guard rail missing".to_string(),
                    location: None,
                },
            )
            .await
            .expect("issue");
        assert!(out.assignment_blocked);
        assert_eq!(out.assignment_status, AssignmentStatus::Blocked);
        assert!(out.ticket_number.starts_with("ISS-20260302-"));

        let sent = h.drain_notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].new_status, Some(AssignmentStatus::Blocked));

        let err = svc
            .update_progress(Some(WORKER), 1, &progress(60.0))
            .await
            .expect_err("blocked");
        assert!(matches!(err, WorkflowError::TaskBlocked));
    }

    #[rstest]
    #[tokio::test]
    async fn failed_ticket_leaves_running_task_untouched() {
        let mut h = sequenced_day().await;
        let svc = service(&h);
        svc.start(Some(WORKER), 1, &start_here()).await.expect("start");
        h.drain_notifications();
        h.store.fail_issues();

        let err = svc
            .report_issue(
                Some(WORKER),
                &IssueRequest {
                    assignment_id: 1,
                    issue_type: "safety".to_string(),
                    priority: "critical".to_string(),
                    description: "Scaffold tie loose".to_string(),
                    location: None,
                },
            )
            .await
            .expect_err("ticket insert fails");
        assert_eq!(err.kind(), ErrorKind::Infrastructure);

        let stored = crate::store::Store::find_assignment(h.store.as_ref(), 1)
            .await
            .expect("lookup")
            .expect("assignment");
        assert_eq!(stored.status, AssignmentStatus::InProgress);
        assert!(h.store.issues().await.is_empty());
        assert!(h.drain_notifications().is_empty());
    }

    #[rstest]
    #[case("low")]
    #[case("critical")]
    #[tokio::test]
    async fn issue_on_queued_task_only_records_ticket(#[case] priority: &str) {
        let h = sequenced_day().await;
        let out = service(&h)
            .report_issue(
                Some(WORKER),
                &IssueRequest {
                    assignment_id: 2,
                    issue_type: "material".to_string(),
                    priority: priority.to_string(),
                    description: "Rebar delivery late".to_string(),
                    location: None,
                },
            )
            .await
            .expect("issue");
        assert!(!out.assignment_blocked);
        assert_eq!(out.assignment_status, AssignmentStatus::Queued);
        assert_eq!(h.store.issues().await.len(), 1);
    }

    #[rstest]
    #[case("flood", "high", "INVALID_ISSUE_TYPE")]
    #[case("weather", "urgent", "INVALID_PRIORITY")]
    #[tokio::test]
    async fn unknown_issue_vocabulary_is_rejected(
        #[case] issue_type: &str,
        #[case] priority: &str,
        #[case] code: &str,
    ) {
        let h = sequenced_day().await;
        let err = service(&h)
            .report_issue(
                Some(WORKER),
                &IssueRequest {
                    assignment_id: 1,
                    issue_type: issue_type.to_string(),
                    priority: priority.to_string(),
                    description: "x".to_string(),
                    location: None,
                },
            )
            .await
            .expect_err("invalid");
        assert_eq!(err.code(), code);
        assert!(h.store.issues().await.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn poor_accuracy_is_accepted_with_caveat_when_lenient() {
        let settings = WorkflowSettings {
            accuracy_leniency: Some(AccuracyLeniency::default()),
            ..WorkflowSettings::default()
        };
        let h = Harness::with_settings(settings).await;
        let here = north_of_site(150.0);

        let out = service(&h)
            .validate_geofence(
                Some(WORKER),
                &GeofenceRequest {
                    latitude: here.latitude,
                    longitude: here.longitude,
                    accuracy: Some(120.0),
                    project_id: Some(PROJECT),
                },
            )
            .await
            .expect("validate");
        assert!(out.is_valid);
        assert!(out.can_start_tasks);
        assert!(out.accuracy_caveat);
        assert!(!out.inside_geofence);

        let strict = service(&h)
            .validate_geofence(
                Some(WORKER),
                &GeofenceRequest {
                    latitude: here.latitude,
                    longitude: here.longitude,
                    accuracy: Some(120.0),
                    project_id: Some(STRICT_PROJECT),
                },
            )
            .await
            .expect("validate strict");
        assert!(!strict.is_valid);
        assert_eq!(h.store.location_logs().await.len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn validate_without_project_uses_active_assignment() {
        let h = Harness::new().await;
        let svc = service(&h);
        let req = GeofenceRequest {
            latitude: SITE.latitude,
            longitude: SITE.longitude,
            accuracy: None,
            project_id: None,
        };
        let err = svc
            .validate_geofence(Some(WORKER), &req)
            .await
            .expect_err("nothing assigned");
        assert!(matches!(err, WorkflowError::NoActiveAssignment));

        h.assign(assignment(1, WORKER, STRICT_PROJECT, 1)).await;
        let out = svc.validate_geofence(Some(WORKER), &req).await.expect("validate");
        assert_eq!(out.project_id, STRICT_PROJECT);
        assert!(out.inside_geofence);
    }

    #[rstest]
    #[tokio::test]
    async fn tasks_today_degrades_missing_records() {
        let h = Harness::new().await;
        let mut orphan = assignment(1, WORKER, PROJECT, 1);
        orphan.supervisor_id = Some(4444);
        // no task record for this one
        h.store.put_assignment(orphan).await;
        h.assign(assignment(2, WORKER, PROJECT, 2)).await;

        let out = service(&h)
            .tasks_today(
                Some(WORKER),
                &TasksTodayQuery {
                    latitude: Some(SITE.latitude),
                    longitude: Some(SITE.longitude),
                    accuracy: None,
                },
            )
            .await
            .expect("tasks today");

        assert_eq!(out.tasks.len(), 2);
        assert_eq!(out.tasks[0].task_name, "Task #301");
        assert!(out.tasks[0].readiness.can_start);
        assert!(!out.tasks[1].readiness.can_start);
        let supervisor = out.supervisor.expect("placeholder");
        assert_eq!(supervisor.name, "Unknown supervisor");
        assert!(out.geofence.expect("status").inside_geofence);
        assert_eq!(out.summary.queued, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn tasks_today_survives_missing_project() {
        let h = Harness::new().await;
        h.assign(assignment(1, WORKER, 5050, 1)).await;
        let out = service(&h)
            .tasks_today(Some(WORKER), &TasksTodayQuery::default())
            .await
            .expect("tasks today");
        let project = out.project.expect("placeholder");
        assert_eq!(project.name, "Unknown project");
        assert!(out.geofence.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn task_details_include_last_update() {
        let h = sequenced_day().await;
        let svc = service(&h);
        svc.start(Some(WORKER), 1, &start_here()).await.expect("start");
        h.clock.advance(30);
        svc.update_progress(Some(WORKER), 1, &progress(20.0))
            .await
            .expect("20");

        let details = svc.task_details(Some(WORKER), 1).await.expect("details");
        assert_eq!(details.task.status, AssignmentStatus::InProgress);
        assert_eq!(details.last_updated, Some(h.ctx.now()));
        assert_eq!(details.project.code.as_deref(), Some("PRJ-12"));
        assert_eq!(details.supervisor.expect("supervisor").id, SUPERVISOR);

        let err = svc.task_details(Some(WORKER), 999).await.expect_err("missing");
        assert!(matches!(err, WorkflowError::AssignmentNotFound(999)));
    }
}
