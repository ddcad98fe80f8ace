// In-memory implementation of the Store port.
//
// Used by tests and for running the service locally without MySQL. Holds
// everything behind one RwLock so each compare-and-swap is atomic.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use super::{AttendanceHistoryQuery, Store, StoreError, StoreResult};
use crate::model::{
    assignment::TaskAssignment, attendance::AttendanceRecord, employee::Employee,
    issue::IssueReport, location_log::LocationLog, notification::Notification,
    progress::TaskProgressEntry, project::Project, task::Task,
};

#[derive(Default)]
struct MemoryState {
    employees: HashMap<u64, Employee>,
    projects: HashMap<u64, Project>,
    tasks: HashMap<u64, Task>,
    attendance: HashMap<String, AttendanceRecord>,
    assignments: BTreeMap<u64, TaskAssignment>,
    progress: Vec<TaskProgressEntry>,
    issues: Vec<IssueReport>,
    location_logs: Vec<LocationLog>,
    notifications: Vec<Notification>,
}

/// Reference data a local instance starts with.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub assignments: Vec<TaskAssignment>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    #[cfg(test)]
    fail_location_logs: std::sync::atomic::AtomicBool,
    #[cfg(test)]
    fail_issues: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let mut state = MemoryState::default();
        state.employees = seed.employees.into_iter().map(|e| (e.id, e)).collect();
        state.projects = seed.projects.into_iter().map(|p| (p.id, p)).collect();
        state.tasks = seed.tasks.into_iter().map(|t| (t.id, t)).collect();
        state.assignments = seed.assignments.into_iter().map(|a| (a.id, a)).collect();
        Self {
            state: RwLock::new(state),
            ..Self::default()
        }
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let seed: Seed = serde_json::from_str(&raw)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        info!(
            employees = seed.employees.len(),
            projects = seed.projects.len(),
            assignments = seed.assignments.len(),
            "Loaded in-memory store seed"
        );
        Ok(Self::from_seed(seed))
    }
}

#[cfg(test)]
impl MemoryStore {
    pub async fn put_employee(&self, employee: Employee) {
        self.state.write().await.employees.insert(employee.id, employee);
    }

    pub async fn put_project(&self, project: Project) {
        self.state.write().await.projects.insert(project.id, project);
    }

    pub async fn put_task(&self, task: Task) {
        self.state.write().await.tasks.insert(task.id, task);
    }

    pub async fn put_assignment(&self, assignment: TaskAssignment) {
        self.state
            .write()
            .await
            .assignments
            .insert(assignment.id, assignment);
    }

    pub async fn issues(&self) -> Vec<IssueReport> {
        self.state.read().await.issues.clone()
    }

    pub async fn location_logs(&self) -> Vec<LocationLog> {
        self.state.read().await.location_logs.clone()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    pub async fn attendance_count(&self) -> usize {
        self.state.read().await.attendance.len()
    }

    pub fn fail_location_logs(&self) {
        self.fail_location_logs
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn fail_issues(&self) {
        self.fail_issues
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_employee(&self, id: u64) -> StoreResult<Option<Employee>> {
        Ok(self.state.read().await.employees.get(&id).cloned())
    }

    async fn find_project(&self, id: u64) -> StoreResult<Option<Project>> {
        Ok(self.state.read().await.projects.get(&id).cloned())
    }

    async fn find_task(&self, id: u64) -> StoreResult<Option<Task>> {
        Ok(self.state.read().await.tasks.get(&id).cloned())
    }

    async fn find_attendance(
        &self,
        employee_id: u64,
        project_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let guard = self.state.read().await;
        Ok(guard
            .attendance
            .values()
            .find(|r| r.employee_id == employee_id && r.project_id == project_id && r.date == date)
            .cloned())
    }

    async fn find_attendance_by_id(&self, id: &str) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self.state.read().await.attendance.get(id).cloned())
    }

    async fn attendance_for_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let guard = self.state.read().await;
        let mut records: Vec<_> = guard
            .attendance
            .values()
            .filter(|r| r.employee_id == employee_id && r.date == date)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.check_in.cmp(&a.check_in));
        Ok(records)
    }

    async fn attendance_history(
        &self,
        query: &AttendanceHistoryQuery,
    ) -> StoreResult<(Vec<AttendanceRecord>, i64)> {
        let guard = self.state.read().await;
        let mut matches: Vec<_> = guard
            .attendance
            .values()
            .filter(|r| r.employee_id == query.employee_id)
            .filter(|r| query.project_id.is_none_or(|p| r.project_id == p))
            .filter(|r| query.from.is_none_or(|from| r.date >= from))
            .filter(|r| query.to.is_none_or(|to| r.date <= to))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.date.cmp(&a.date).then(b.check_in.cmp(&a.check_in)));

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.per_page as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let duplicate = guard.attendance.values().any(|r| {
            r.employee_id == record.employee_id
                && r.project_id == record.project_id
                && r.date == record.date
        });
        if duplicate || guard.attendance.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("attendance {}", record.id)));
        }
        guard.attendance.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let stored = guard
            .attendance
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::Conflict(format!("attendance {}", record.id)))?;
        if stored.revision != record.revision {
            return Err(StoreError::Conflict(format!("attendance {}", record.id)));
        }
        *stored = AttendanceRecord {
            revision: record.revision + 1,
            ..record.clone()
        };
        Ok(())
    }

    async fn find_assignment(&self, id: u64) -> StoreResult<Option<TaskAssignment>> {
        Ok(self.state.read().await.assignments.get(&id).cloned())
    }

    async fn find_assignments(&self, ids: &[u64]) -> StoreResult<Vec<TaskAssignment>> {
        let guard = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| guard.assignments.get(id).cloned())
            .collect())
    }

    async fn assignments_for_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        project_id: Option<u64>,
    ) -> StoreResult<Vec<TaskAssignment>> {
        let guard = self.state.read().await;
        let mut found: Vec<_> = guard
            .assignments
            .values()
            .filter(|a| a.employee_id == employee_id && a.date == date)
            .filter(|a| project_id.is_none_or(|p| a.project_id == p))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.sequence, a.id));
        Ok(found)
    }

    async fn update_assignment(
        &self,
        assignment: &TaskAssignment,
        entry: Option<&TaskProgressEntry>,
    ) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let stored = guard
            .assignments
            .get_mut(&assignment.id)
            .ok_or_else(|| StoreError::Conflict(format!("assignment {}", assignment.id)))?;
        if stored.revision != assignment.revision {
            return Err(StoreError::Conflict(format!("assignment {}", assignment.id)));
        }
        *stored = TaskAssignment {
            revision: assignment.revision + 1,
            ..assignment.clone()
        };
        if let Some(entry) = entry {
            guard.progress.push(entry.clone());
        }
        Ok(())
    }

    async fn progress_entries(&self, assignment_id: u64) -> StoreResult<Vec<TaskProgressEntry>> {
        let guard = self.state.read().await;
        let mut entries: Vec<_> = guard
            .progress
            .iter()
            .filter(|e| e.assignment_id == assignment_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.submitted_at);
        Ok(entries)
    }

    async fn insert_issue(&self, issue: &IssueReport) -> StoreResult<()> {
        #[cfg(test)]
        if self.fail_issues.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Backend("issue table unavailable".to_string()));
        }
        self.state.write().await.issues.push(issue.clone());
        Ok(())
    }

    async fn append_location_log(&self, log: &LocationLog) -> StoreResult<()> {
        #[cfg(test)]
        if self
            .fail_location_logs
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(StoreError::Backend("location log unavailable".to_string()));
        }
        self.state.write().await.location_logs.push(log.clone());
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.state
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod memory_store_tests {
    use super::*;
    use crate::model::assignment::fixtures::assignment;
    use rstest::rstest;

    fn record(id: &str) -> AttendanceRecord {
        AttendanceRecord::new(
            id.to_string(),
            7,
            12,
            NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date"),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn second_record_for_same_day_conflicts() {
        let store = MemoryStore::new();
        store.insert_attendance(&record("a")).await.expect("first insert");
        let result = store.insert_attendance(&record("b")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(store.attendance_count().await, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let store = MemoryStore::new();
        store.insert_attendance(&record("a")).await.expect("insert");

        let loaded = store
            .find_attendance_by_id("a")
            .await
            .expect("read")
            .expect("exists");
        store.update_attendance(&loaded).await.expect("first update");

        let result = store.update_attendance(&loaded).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        let stored = store
            .find_attendance_by_id("a")
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(stored.revision, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn assignments_are_ordered_by_sequence() {
        let store = MemoryStore::new();
        store.put_assignment(assignment(3, 7, 12, 3)).await;
        store.put_assignment(assignment(1, 7, 12, 1)).await;
        store.put_assignment(assignment(2, 7, 12, 2)).await;
        store.put_assignment(assignment(4, 8, 12, 1)).await;

        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date");
        let found = store
            .assignments_for_day(7, date, Some(12))
            .await
            .expect("read");
        let ids: Vec<u64> = found.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[rstest]
    #[tokio::test]
    async fn lost_assignment_race_does_not_append_ledger_entry() {
        let store = MemoryStore::new();
        store.put_assignment(assignment(1, 7, 12, 1)).await;
        let loaded = store.find_assignment(1).await.expect("read").expect("exists");
        store.update_assignment(&loaded, None).await.expect("update");

        let entry = TaskProgressEntry {
            id: "p1".to_string(),
            assignment_id: 1,
            employee_id: 7,
            percent: 10.0,
            description: "late write".to_string(),
            notes: None,
            location: None,
            completed_quantity: None,
            issues: None,
            submitted_at: chrono::Utc::now(),
        };
        let result = store.update_assignment(&loaded, Some(&entry)).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert!(store.progress_entries(1).await.expect("read").is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn demo_seed_loads_mixed_case_documents() {
        let seed: Seed =
            serde_json::from_str(include_str!("../../demos/seed.json")).expect("seed parses");
        let store = MemoryStore::from_seed(seed);

        let project = store.find_project(12).await.expect("read").expect("seeded");
        assert_eq!(project.supervisor_id, Some(90));
        assert!(!project.geofence.strict_mode);

        let second = store.find_assignment(42).await.expect("read").expect("seeded");
        assert_eq!(second.dependencies, vec![41]);
        assert_eq!(second.revision, 0);
        assert_eq!(second.progress_percent, 0.0);

        let task = store.find_task(302).await.expect("read").expect("seeded");
        assert_eq!(task.task_type.as_deref(), Some("structural"));
    }
}
