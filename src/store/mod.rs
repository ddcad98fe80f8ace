// Store port: the document store the workflows read and write by key.
//
// Every update is a compare-and-swap on the record's `revision`: the write
// only lands when the stored revision equals the one the caller loaded, and
// the stored revision is bumped by one. A lost race is `StoreError::Conflict`.

use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::Display;

use crate::model::{
    assignment::TaskAssignment, attendance::AttendanceRecord, employee::Employee,
    issue::IssueReport, location_log::LocationLog, notification::Notification,
    progress::TaskProgressEntry, project::Project, task::Task,
};

pub mod memory;
pub mod mysql;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "conflicting write on {}", _0)]
    Conflict(String),
    #[display(fmt = "backend error: {}", _0)]
    Backend(String),
    #[display(fmt = "corrupt record: {}", _0)]
    Corrupt(String),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
pub struct AttendanceHistoryQuery {
    pub employee_id: u64,
    pub project_id: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: u32,
    pub per_page: u32,
}

impl AttendanceHistoryQuery {
    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.per_page as u64
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_employee(&self, id: u64) -> StoreResult<Option<Employee>>;
    async fn find_project(&self, id: u64) -> StoreResult<Option<Project>>;
    async fn find_task(&self, id: u64) -> StoreResult<Option<Task>>;

    async fn find_attendance(
        &self,
        employee_id: u64,
        project_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>>;
    async fn find_attendance_by_id(&self, id: &str) -> StoreResult<Option<AttendanceRecord>>;
    async fn attendance_for_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>>;
    /// Newest first. Returns the page and the total match count.
    async fn attendance_history(
        &self,
        query: &AttendanceHistoryQuery,
    ) -> StoreResult<(Vec<AttendanceRecord>, i64)>;
    /// Conflict when a record for the same (employee, project, date) exists.
    async fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()>;
    async fn update_attendance(&self, record: &AttendanceRecord) -> StoreResult<()>;

    async fn find_assignment(&self, id: u64) -> StoreResult<Option<TaskAssignment>>;
    async fn find_assignments(&self, ids: &[u64]) -> StoreResult<Vec<TaskAssignment>>;
    /// Ordered by sequence, then id.
    async fn assignments_for_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        project_id: Option<u64>,
    ) -> StoreResult<Vec<TaskAssignment>>;
    /// Updates the assignment and, in the same transaction, appends the
    /// progress entry when one is given.
    async fn update_assignment(
        &self,
        assignment: &TaskAssignment,
        entry: Option<&TaskProgressEntry>,
    ) -> StoreResult<()>;
    /// Oldest first.
    async fn progress_entries(&self, assignment_id: u64) -> StoreResult<Vec<TaskProgressEntry>>;

    async fn insert_issue(&self, issue: &IssueReport) -> StoreResult<()>;
    async fn append_location_log(&self, log: &LocationLog) -> StoreResult<()>;
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;
}
