use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::WorkflowError;
use crate::utils::geofence::Coordinates;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssignmentStatus {
    Queued,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailyTarget {
    #[schema(example = "Tie rebar for grid A-D")]
    pub description: String,
    #[schema(example = 120.0)]
    pub quantity: f64,
    #[schema(example = "m2")]
    pub unit: String,
    /// Expected completion percentage by end of day.
    #[schema(example = 100.0)]
    pub target_completion: f64,
}

/// Minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeEstimate {
    pub estimated: i64,
    pub elapsed: i64,
    pub remaining: i64,
}

impl TimeEstimate {
    /// Elapsed is proportional to progress and never exceeds the estimate.
    pub fn for_progress(estimated: i64, percent: f64) -> Self {
        let estimated = estimated.max(0);
        let elapsed = ((estimated as f64) * percent / 100.0).round() as i64;
        let elapsed = elapsed.clamp(0, estimated);
        Self {
            estimated,
            elapsed,
            remaining: (estimated - elapsed).max(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceValidation {
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_validated: Option<DateTime<Utc>>,
    pub validation_location: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub id: u64,
    pub task_id: u64,
    pub employee_id: u64,
    pub project_id: u64,
    pub supervisor_id: Option<u64>,
    pub date: NaiveDate,
    pub status: AssignmentStatus,
    pub sequence: i32,
    #[serde(default)]
    pub dependencies: Vec<u64>,
    #[serde(default)]
    pub progress_percent: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_time_spent: Option<i64>,
    pub daily_target: Option<DailyTarget>,
    #[serde(default)]
    pub time_estimate: TimeEstimate,
    #[serde(default)]
    pub geofence_validation: GeofenceValidation,
    pub completion_notes: Option<String>,
    pub actual_quantity: Option<f64>,
    #[serde(default)]
    pub revision: i64,
}

impl TaskAssignment {
    pub fn ensure_owned_by(&self, employee_id: u64) -> Result<(), WorkflowError> {
        if self.employee_id == employee_id {
            Ok(())
        } else {
            Err(WorkflowError::Unauthorized(
                "Task assignment does not belong to this employee".to_string(),
            ))
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AssignmentStatus::Completed
    }

    pub fn ensure_startable(&self) -> Result<(), WorkflowError> {
        match self.status {
            AssignmentStatus::Queued => Ok(()),
            AssignmentStatus::InProgress => Err(WorkflowError::AlreadyStarted),
            AssignmentStatus::Completed => Err(WorkflowError::AlreadyCompleted),
            AssignmentStatus::Blocked => Err(WorkflowError::TaskBlocked),
            AssignmentStatus::Cancelled => Err(WorkflowError::TaskCancelled),
        }
    }

    /// Progress and completion both require a started, unblocked task.
    pub fn ensure_in_progress(&self) -> Result<(), WorkflowError> {
        match self.status {
            AssignmentStatus::InProgress => Ok(()),
            AssignmentStatus::Queued => Err(WorkflowError::NotStarted),
            AssignmentStatus::Completed => Err(WorkflowError::AlreadyCompleted),
            AssignmentStatus::Blocked => Err(WorkflowError::TaskBlocked),
            AssignmentStatus::Cancelled => Err(WorkflowError::TaskCancelled),
        }
    }

    /// Gates are the caller's job; this only performs the transition.
    pub fn start(&mut self, now: DateTime<Utc>, at: Coordinates) -> Result<(), WorkflowError> {
        self.ensure_startable()?;
        self.status = AssignmentStatus::InProgress;
        self.start_time = Some(now);
        self.geofence_validation = GeofenceValidation {
            last_validated: Some(now),
            validation_location: Some(at),
        };
        Ok(())
    }

    /// Applies a progress report. Returns true when the status changed.
    pub fn apply_progress(&mut self, percent: f64, now: DateTime<Utc>) -> Result<bool, WorkflowError> {
        self.ensure_in_progress()?;
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(WorkflowError::Validation(format!(
                "progress must be between 0 and 100, got {percent}"
            )));
        }
        if percent < self.progress_percent {
            return Err(WorkflowError::ProgressCannotDecrease {
                current: self.progress_percent,
                requested: percent,
            });
        }

        self.progress_percent = percent;
        self.time_estimate = TimeEstimate::for_progress(self.time_estimate.estimated, percent);

        if percent >= 100.0 {
            self.status = AssignmentStatus::Completed;
            self.completed_at = Some(now);
            self.total_time_spent = self.minutes_since_start(now);
            return Ok(true);
        }
        Ok(false)
    }

    /// Forces completion regardless of reported progress. Returns the total
    /// time spent in minutes.
    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        notes: Option<String>,
        actual_quantity: Option<f64>,
    ) -> Result<i64, WorkflowError> {
        self.ensure_in_progress()?;
        let total = self.minutes_since_start(now).unwrap_or(0);

        self.status = AssignmentStatus::Completed;
        self.completed_at = Some(now);
        self.progress_percent = 100.0;
        self.total_time_spent = Some(total);
        self.time_estimate = TimeEstimate {
            estimated: self.time_estimate.estimated,
            elapsed: total,
            remaining: 0,
        };
        self.completion_notes = notes;
        if actual_quantity.is_some() {
            self.actual_quantity = actual_quantity;
        }
        Ok(total)
    }

    /// in_progress -> blocked. Any other status is left untouched.
    pub fn block(&mut self) -> bool {
        if self.status == AssignmentStatus::InProgress {
            self.status = AssignmentStatus::Blocked;
            true
        } else {
            false
        }
    }

    fn minutes_since_start(&self, now: DateTime<Utc>) -> Option<i64> {
        self.start_time
            .map(|start| (now - start).num_minutes().max(0))
    }
}


#[cfg(test)]
mod assignment_tests {
    use super::fixtures::assignment;
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
            .single()
            .expect("valid time")
    }

    fn started() -> TaskAssignment {
        let mut a = assignment(1, 7, 12, 1);
        a.start(at(8, 0), Coordinates::new(23.81, 90.41))
            .expect("start");
        a
    }

    #[rstest]
    #[case(AssignmentStatus::InProgress, "ALREADY_STARTED")]
    #[case(AssignmentStatus::Completed, "ALREADY_COMPLETED")]
    #[case(AssignmentStatus::Blocked, "TASK_BLOCKED")]
    #[case(AssignmentStatus::Cancelled, "TASK_CANCELLED")]
    fn only_queued_can_start(#[case] status: AssignmentStatus, #[case] code: &str) {
        let mut a = assignment(1, 7, 12, 1);
        a.status = status;
        let err = a
            .start(at(8, 0), Coordinates::new(0.0, 0.0))
            .expect_err("must not start");
        assert_eq!(err.code(), code);
    }

    #[test]
    fn progress_is_monotonic() {
        let mut a = started();
        a.apply_progress(40.0, at(9, 0)).expect("40%");
        let before = a.clone();
        let err = a.apply_progress(30.0, at(9, 30)).expect_err("decrease");
        assert!(matches!(
            err,
            WorkflowError::ProgressCannotDecrease {
                current,
                requested
            } if current == 40.0 && requested == 30.0
        ));
        assert_eq!(a, before);
        a.apply_progress(40.0, at(10, 0)).expect("same value is allowed");
    }

    #[test]
    fn progress_requires_start() {
        let mut a = assignment(1, 7, 12, 1);
        assert!(matches!(
            a.apply_progress(10.0, at(9, 0)),
            Err(WorkflowError::NotStarted)
        ));
    }

    #[test]
    fn progress_scales_time_estimate() {
        let mut a = started();
        a.apply_progress(25.0, at(9, 0)).expect("25%");
        assert_eq!(
            a.time_estimate,
            TimeEstimate {
                estimated: 240,
                elapsed: 60,
                remaining: 180
            }
        );
    }

    #[test]
    fn full_progress_completes() {
        let mut a = started();
        let changed = a.apply_progress(100.0, at(11, 0)).expect("100%");
        assert!(changed);
        assert_eq!(a.status, AssignmentStatus::Completed);
        assert_eq!(a.completed_at, Some(at(11, 0)));
        assert_eq!(a.total_time_spent, Some(180));
        assert_eq!(a.time_estimate.remaining, 0);
        assert!(matches!(
            a.start(at(11, 5), Coordinates::new(0.0, 0.0)),
            Err(WorkflowError::AlreadyCompleted)
        ));
    }

    #[rstest]
    #[case(-1.0)]
    #[case(100.5)]
    #[case(f64::NAN)]
    fn out_of_range_percent_is_rejected(#[case] percent: f64) {
        let mut a = started();
        assert!(matches!(
            a.apply_progress(percent, at(9, 0)),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn complete_forces_full_progress() {
        let mut a = started();
        a.apply_progress(60.0, at(10, 0)).expect("60%");
        let total = a
            .complete(at(12, 30), Some("Slab ready".to_string()), Some(118.0))
            .expect("complete");
        assert_eq!(total, 270);
        assert_eq!(a.progress_percent, 100.0);
        assert_eq!(a.status, AssignmentStatus::Completed);
        assert_eq!(a.actual_quantity, Some(118.0));
        assert!(matches!(
            a.complete(at(13, 0), None, None),
            Err(WorkflowError::AlreadyCompleted)
        ));
    }

    #[test]
    fn only_in_progress_can_block() {
        let mut queued = assignment(1, 7, 12, 1);
        assert!(!queued.block());
        assert_eq!(queued.status, AssignmentStatus::Queued);

        let mut a = started();
        assert!(a.block());
        assert_eq!(a.status, AssignmentStatus::Blocked);
    }

    #[test]
    fn status_round_trips_through_strum() {
        use std::str::FromStr;
        assert_eq!(AssignmentStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            AssignmentStatus::from_str("blocked").ok(),
            Some(AssignmentStatus::Blocked)
        );
    }
}
