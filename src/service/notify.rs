// Supervisor notifications.
//
// Publishing never blocks or fails the caller: messages go onto an unbounded
// in-process queue and a background worker hands them to a `Notifier`.
// Delivery failures are logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::model::{
    assignment::{AssignmentStatus, TaskAssignment},
    employee::Employee,
    notification::{Notification, NotificationKind},
};
use crate::store::{Store, StoreResult};

#[derive(Clone)]
pub struct NotificationDispatch {
    sender: UnboundedSender<Notification>,
}

impl NotificationDispatch {
    pub fn channel() -> (Self, UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn publish(&self, notification: Notification) {
        let id = notification.id.clone();
        if self.sender.send(notification).is_err() {
            warn!(notification_id = %id, "Notification worker is gone, dropping notification");
        }
    }

    /// Tells the assignment's supervisor that its status moved. Assignments
    /// without a supervisor are skipped.
    pub fn task_status_changed(
        &self,
        assignment: &TaskAssignment,
        employee: &Employee,
        previous: AssignmentStatus,
        now: DateTime<Utc>,
    ) {
        let Some(recipient_id) = assignment.supervisor_id else {
            debug!(assignment_id = assignment.id, "No supervisor on assignment, skipping notification");
            return;
        };

        let title = match assignment.status {
            AssignmentStatus::InProgress => "Task started",
            AssignmentStatus::Completed => "Task completed",
            AssignmentStatus::Blocked => "Task blocked",
            AssignmentStatus::Cancelled => "Task cancelled",
            AssignmentStatus::Queued => "Task re-queued",
        };

        self.publish(Notification {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id,
            employee_id: employee.id,
            assignment_id: Some(assignment.id),
            kind: NotificationKind::TaskStatusChanged,
            title: title.to_string(),
            message: format!(
                "{} moved assignment {} from {} to {}",
                employee.full_name(),
                assignment.id,
                previous,
                assignment.status
            ),
            previous_status: Some(previous),
            new_status: Some(assignment.status),
            created_at: now,
        });
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> StoreResult<()>;
}

/// Persists notifications into the supervisor inbox table.
pub struct StoreNotifier {
    store: Arc<dyn Store>,
}

impl StoreNotifier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn deliver(&self, notification: &Notification) -> StoreResult<()> {
        self.store.insert_notification(notification).await
    }
}

/// Drains the queue until every sender is dropped.
pub async fn run_worker(mut receiver: UnboundedReceiver<Notification>, notifier: Arc<dyn Notifier>) {
    info!("Notification worker started");
    while let Some(notification) = receiver.recv().await {
        match notifier.deliver(&notification).await {
            Ok(()) => debug!(
                notification_id = %notification.id,
                recipient_id = notification.recipient_id,
                "Notification delivered"
            ),
            Err(e) => warn!(
                notification_id = %notification.id,
                error = %e,
                "Notification delivery failed, dropping"
            ),
        }
    }
    info!("Notification worker stopped");
}

#[cfg(test)]
mod notify_tests {
    use super::*;
    use crate::model::assignment::fixtures::assignment;
    use crate::store::memory::MemoryStore;
    use crate::store::StoreError;
    use rstest::{fixture, rstest};

    #[fixture]
    fn worker() -> Employee {
        Employee {
            id: 7,
            employee_code: "EMP-007".to_string(),
            first_name: "Rafiq".to_string(),
            last_name: "Islam".to_string(),
            email: "rafiq.islam@company.com".to_string(),
            phone: None,
            status: "active".to_string(),
        }
    }

    #[rstest]
    fn status_change_is_addressed_to_supervisor(worker: Employee) {
        let (dispatch, mut rx) = NotificationDispatch::channel();
        let mut a = assignment(5, 7, 12, 1);
        a.status = AssignmentStatus::InProgress;

        dispatch.task_status_changed(&a, &worker, AssignmentStatus::Queued, Utc::now());

        let sent = rx.try_recv().expect("notification published");
        assert_eq!(sent.recipient_id, 90);
        assert_eq!(sent.title, "Task started");
        assert_eq!(sent.previous_status, Some(AssignmentStatus::Queued));
        assert_eq!(sent.new_status, Some(AssignmentStatus::InProgress));
        assert!(sent.message.contains("Rafiq Islam"));
    }

    #[rstest]
    fn missing_supervisor_skips_notification(worker: Employee) {
        let (dispatch, mut rx) = NotificationDispatch::channel();
        let mut a = assignment(5, 7, 12, 1);
        a.supervisor_id = None;

        dispatch.task_status_changed(&a, &worker, AssignmentStatus::Queued, Utc::now());
        assert!(rx.try_recv().is_err());
    }

    #[rstest]
    fn publish_without_worker_does_not_panic(worker: Employee) {
        let (dispatch, rx) = NotificationDispatch::channel();
        drop(rx);
        dispatch.task_status_changed(
            &assignment(5, 7, 12, 1),
            &worker,
            AssignmentStatus::Queued,
            Utc::now(),
        );
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn deliver(&self, _: &Notification) -> StoreResult<()> {
            Err(StoreError::Backend("inbox offline".to_string()))
        }
    }

    #[rstest]
    #[tokio::test]
    async fn worker_persists_until_channel_closes(worker: Employee) {
        let store = Arc::new(MemoryStore::new());
        let (dispatch, rx) = NotificationDispatch::channel();
        let mut a = assignment(5, 7, 12, 1);
        a.status = AssignmentStatus::Completed;
        dispatch.task_status_changed(&a, &worker, AssignmentStatus::InProgress, Utc::now());
        drop(dispatch);

        run_worker(rx, Arc::new(StoreNotifier::new(store.clone()))).await;

        let stored = store.notifications().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Task completed");
    }

    #[rstest]
    #[tokio::test]
    async fn worker_swallows_delivery_failures(worker: Employee) {
        let (dispatch, rx) = NotificationDispatch::channel();
        dispatch.task_status_changed(
            &assignment(5, 7, 12, 1),
            &worker,
            AssignmentStatus::Queued,
            Utc::now(),
        );
        drop(dispatch);

        // returns once the queue is drained despite every delivery failing
        run_worker(rx, Arc::new(FailingNotifier)).await;
    }
}
