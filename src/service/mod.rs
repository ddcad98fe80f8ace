use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::Deserialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::error::WorkflowError;
use crate::model::{employee::Employee, location_log::LocationLog, project::Project};
use crate::store::Store;
use crate::utils::clock::Clock;
use crate::utils::geofence::{AccuracyLeniency, LocationFix};

pub mod attendance;
pub mod gates;
pub mod notify;
pub mod tasks;

use notify::NotificationDispatch;

/// Site-level knobs shared by both workflows.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    /// Offset used to decide which calendar day a timestamp belongs to.
    pub utc_offset: FixedOffset,
    pub accuracy_leniency: Option<AccuracyLeniency>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            accuracy_leniency: None,
        }
    }
}

/// A reported device position.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocationInput {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
    /// Reported GPS accuracy in meters.
    #[schema(example = 15.0)]
    pub accuracy: Option<f64>,
}

impl LocationInput {
    pub fn fix(&self) -> Result<LocationFix, WorkflowError> {
        LocationFix::parse(self.latitude, self.longitude, self.accuracy)
    }
}

/// Everything a workflow needs from the outside world.
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub notifications: NotificationDispatch,
    pub settings: WorkflowSettings,
}

impl ServiceContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn work_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.settings.utc_offset).date_naive()
    }

    /// The acting employee must exist and be active.
    pub async fn resolve_employee(&self, employee_id: Option<u64>) -> Result<Employee, WorkflowError> {
        let employee_id = employee_id.ok_or_else(|| {
            WorkflowError::Unauthorized("No employee profile linked to this account".to_string())
        })?;

        match self.store.find_employee(employee_id).await? {
            Some(employee) if employee.is_active() => Ok(employee),
            Some(_) => {
                warn!(employee_id, "Inactive employee attempted a workflow action");
                Err(WorkflowError::Unauthorized("Employee is not active".to_string()))
            }
            None => Err(WorkflowError::Unauthorized(format!(
                "Employee {employee_id} not found"
            ))),
        }
    }

    pub async fn load_project(&self, project_id: u64) -> Result<Project, WorkflowError> {
        let project = self
            .store
            .find_project(project_id)
            .await?
            .ok_or(WorkflowError::ProjectNotFound(project_id))?;
        Ok(Project {
            geofence: project.geofence.sanitized(),
            ..project
        })
    }

    /// Audit writes never fail the request.
    pub async fn audit_location(&self, log: LocationLog) {
        if let Err(e) = self.store.append_location_log(&log).await {
            warn!(
                employee_id = log.employee_id,
                project_id = log.project_id,
                kind = %log.kind,
                error = %e,
                "Failed to append location log"
            );
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::model::{assignment::TaskAssignment, task::Task};
    use crate::model::notification::Notification;
    use crate::store::memory::MemoryStore;
    use crate::utils::clock::fixed::FixedClock;
    use crate::utils::geofence::{Coordinates, ProjectGeofence};
    use tokio::sync::mpsc::UnboundedReceiver;

    pub const SITE: Coordinates = Coordinates {
        latitude: 23.8103,
        longitude: 90.4125,
    };
    pub const WORKER: u64 = 7;
    pub const INACTIVE_WORKER: u64 = 8;
    pub const SUPERVISOR: u64 = 90;
    pub const OTHER_SUPERVISOR: u64 = 91;
    /// radius 100, variance 10, lenient
    pub const PROJECT: u64 = 12;
    /// radius 100, variance 10, strict
    pub const STRICT_PROJECT: u64 = 13;

    /// `meters` due north of the site center.
    pub fn north_of_site(meters: f64) -> Coordinates {
        let degrees = meters / crate::utils::geofence::EARTH_RADIUS_M * 180.0 / std::f64::consts::PI;
        Coordinates::new(SITE.latitude + degrees, SITE.longitude)
    }

    pub fn employee(id: u64, status: &str) -> Employee {
        Employee {
            id,
            employee_code: format!("EMP-{id:03}"),
            first_name: "Worker".to_string(),
            last_name: id.to_string(),
            email: format!("worker{id}@company.com"),
            phone: None,
            status: status.to_string(),
        }
    }

    fn project(id: u64, strict_mode: bool) -> Project {
        Project {
            id,
            name: format!("Project {id}"),
            code: format!("PRJ-{id}"),
            supervisor_id: Some(SUPERVISOR),
            geofence: ProjectGeofence {
                center: SITE,
                radius: 100.0,
                strict_mode,
                allowed_variance: 10.0,
            },
        }
    }

    pub struct Harness {
        pub store: Arc<MemoryStore>,
        pub clock: Arc<FixedClock>,
        pub ctx: ServiceContext,
        pub notifications: UnboundedReceiver<Notification>,
    }

    impl Harness {
        /// 2026-03-02 08:00 UTC, site offset zero, leniency off.
        pub async fn new() -> Self {
            Self::with_settings(WorkflowSettings::default()).await
        }

        pub async fn with_settings(settings: WorkflowSettings) -> Self {
            let store = Arc::new(MemoryStore::new());
            store.put_employee(employee(WORKER, "active")).await;
            store.put_employee(employee(INACTIVE_WORKER, "inactive")).await;
            store.put_employee(employee(SUPERVISOR, "active")).await;
            store.put_employee(employee(OTHER_SUPERVISOR, "active")).await;
            store.put_project(project(PROJECT, false)).await;
            store.put_project(project(STRICT_PROJECT, true)).await;

            let clock = Arc::new(FixedClock::at(2026, 3, 2, 8, 0));
            let (notifications, receiver) = NotificationDispatch::channel();
            let ctx = ServiceContext {
                store: store.clone(),
                clock: clock.clone(),
                notifications,
                settings,
            };
            Self {
                store,
                clock,
                ctx,
                notifications: receiver,
            }
        }

        pub async fn assign(&self, assignment: TaskAssignment) {
            self.store
                .put_task(Task {
                    id: assignment.task_id,
                    name: format!("Task {}", assignment.task_id),
                    description: None,
                    task_type: Some("structural".to_string()),
                })
                .await;
            self.store.put_assignment(assignment).await;
        }

        pub fn drain_notifications(&mut self) -> Vec<Notification> {
            let mut sent = Vec::new();
            while let Ok(n) = self.notifications.try_recv() {
                sent.push(n);
            }
            sent
        }
    }
}
