use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::WorkflowError;
use crate::utils::geofence::Coordinates;

/// Daily session label. Always derived from the record's timestamps, never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    NotLoggedIn,
    CheckedIn,
    OnLunch,
    CheckedOut,
}

pub fn derive_session(
    check_in: Option<DateTime<Utc>>,
    check_out: Option<DateTime<Utc>>,
    lunch_start: Option<DateTime<Utc>>,
    lunch_end: Option<DateTime<Utc>>,
) -> SessionState {
    match (check_in, check_out) {
        (None, _) => SessionState::NotLoggedIn,
        (Some(_), Some(_)) => SessionState::CheckedOut,
        (Some(_), None) if lunch_start.is_some() && lunch_end.is_none() => SessionState::OnLunch,
        (Some(_), None) => SessionState::CheckedIn,
    }
}

/// Timestamp a supervisor may correct.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverrideField {
    CheckIn,
    CheckOut,
    LunchStart,
    LunchEnd,
    OvertimeStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualOverride {
    pub field: OverrideField,
    pub reason: String,
    pub supervisor_id: u64,
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub previous_value: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub new_value: Option<DateTime<Utc>>,
}

/// A finished session kept when a checked-out day is reopened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClosedSession {
    #[schema(value_type = String, format = "date-time")]
    pub check_in: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub check_out: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub lunch_start_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub lunch_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    #[schema(value_type = Option<String>, format = "date-time")]
    pub overtime_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub employee_id: u64,
    pub project_id: u64,
    pub date: NaiveDate,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub lunch_start_time: Option<DateTime<Utc>>,
    pub lunch_end_time: Option<DateTime<Utc>>,
    pub overtime_start_time: Option<DateTime<Utc>>,
    pub inside_geofence_at_checkin: bool,
    pub inside_geofence_at_checkout: bool,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub pending_checkout: bool,
    pub manual_overrides: Vec<ManualOverride>,
    pub previous_sessions: Vec<ClosedSession>,
    pub revision: i64,
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes().max(0)
}

impl AttendanceRecord {
    pub fn new(id: String, employee_id: u64, project_id: u64, date: NaiveDate) -> Self {
        Self {
            id,
            employee_id,
            project_id,
            date,
            check_in: None,
            check_out: None,
            lunch_start_time: None,
            lunch_end_time: None,
            overtime_start_time: None,
            inside_geofence_at_checkin: false,
            inside_geofence_at_checkout: false,
            last_latitude: None,
            last_longitude: None,
            pending_checkout: false,
            manual_overrides: Vec::new(),
            previous_sessions: Vec::new(),
            revision: 0,
        }
    }

    pub fn session_state(&self) -> SessionState {
        derive_session(
            self.check_in,
            self.check_out,
            self.lunch_start_time,
            self.lunch_end_time,
        )
    }

    pub fn is_open(&self) -> bool {
        self.check_in.is_some() && self.check_out.is_none()
    }

    pub fn on_lunch(&self) -> bool {
        self.lunch_start_time.is_some() && self.lunch_end_time.is_none()
    }

    pub fn last_location(&self) -> Option<Coordinates> {
        match (self.last_latitude, self.last_longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }

    /// Opens the day's session. A record that was already checked out is
    /// reopened and its finished session moved to `previous_sessions`.
    pub fn clock_in(&mut self, now: DateTime<Utc>, at: Coordinates) -> Result<(), WorkflowError> {
        if self.is_open() {
            return Err(WorkflowError::AlreadyCheckedIn);
        }

        if let (Some(check_in), Some(check_out)) = (self.check_in, self.check_out) {
            self.previous_sessions.push(ClosedSession {
                check_in,
                check_out,
                lunch_start_time: self.lunch_start_time,
                lunch_end_time: self.lunch_end_time,
                overtime_start_time: self.overtime_start_time,
            });
            self.check_out = None;
            self.lunch_start_time = None;
            self.lunch_end_time = None;
            self.overtime_start_time = None;
            self.inside_geofence_at_checkout = false;
        }

        self.check_in = Some(now);
        self.pending_checkout = true;
        self.inside_geofence_at_checkin = true;
        self.last_latitude = Some(at.latitude);
        self.last_longitude = Some(at.longitude);
        self.check_invariants()
    }

    /// Closes the session; an unfinished lunch ends at the same instant.
    pub fn clock_out(&mut self, now: DateTime<Utc>, at: Coordinates) -> Result<(), WorkflowError> {
        if self.check_in.is_none() {
            return Err(WorkflowError::NotCheckedIn);
        }
        if self.check_out.is_some() {
            return Err(WorkflowError::AlreadyCheckedOut);
        }

        if self.on_lunch() {
            self.lunch_end_time = Some(now);
        }
        self.check_out = Some(now);
        self.pending_checkout = false;
        self.inside_geofence_at_checkout = true;
        self.last_latitude = Some(at.latitude);
        self.last_longitude = Some(at.longitude);
        self.check_invariants()
    }

    fn ensure_open(&self) -> Result<(), WorkflowError> {
        if self.check_in.is_none() {
            return Err(WorkflowError::NotCheckedIn);
        }
        if self.check_out.is_some() {
            return Err(WorkflowError::AlreadyCheckedOut);
        }
        Ok(())
    }

    pub fn start_lunch(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        if self.lunch_start_time.is_some() {
            return Err(WorkflowError::LunchAlreadyStarted);
        }
        self.lunch_start_time = Some(now);
        self.check_invariants()
    }

    pub fn end_lunch(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        if self.lunch_start_time.is_none() {
            return Err(WorkflowError::LunchNotStarted);
        }
        if self.lunch_end_time.is_some() {
            return Err(WorkflowError::LunchAlreadyEnded);
        }
        self.lunch_end_time = Some(now);
        self.check_invariants()
    }

    pub fn start_overtime(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        if self.on_lunch() {
            return Err(WorkflowError::OnLunch);
        }
        if self.overtime_start_time.is_some() {
            return Err(WorkflowError::OvertimeAlreadyStarted);
        }
        self.overtime_start_time = Some(now);
        self.check_invariants()
    }

    fn field_mut(&mut self, field: OverrideField) -> &mut Option<DateTime<Utc>> {
        match field {
            OverrideField::CheckIn => &mut self.check_in,
            OverrideField::CheckOut => &mut self.check_out,
            OverrideField::LunchStart => &mut self.lunch_start_time,
            OverrideField::LunchEnd => &mut self.lunch_end_time,
            OverrideField::OvertimeStart => &mut self.overtime_start_time,
        }
    }

    /// Supervisor correction. The prior value is kept in `manual_overrides`.
    pub fn apply_override(
        &mut self,
        field: OverrideField,
        value: Option<DateTime<Utc>>,
        reason: String,
        supervisor_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let slot = self.field_mut(field);
        let previous_value = *slot;
        *slot = value;

        self.manual_overrides.push(ManualOverride {
            field,
            reason,
            supervisor_id,
            timestamp: now,
            previous_value,
            new_value: value,
        });
        self.pending_checkout = self.is_open();
        self.check_invariants()
    }

    /// Write-time assertion of the timestamp ordering rules.
    pub fn check_invariants(&self) -> Result<(), WorkflowError> {
        let violation = |msg: &str| Err(WorkflowError::InvariantViolation(msg.to_string()));

        let Some(check_in) = self.check_in else {
            if self.check_out.is_some() {
                return violation("check-out recorded without check-in");
            }
            if self.lunch_start_time.is_some() || self.overtime_start_time.is_some() {
                return violation("lunch or overtime recorded without check-in");
            }
            if self.lunch_end_time.is_some() {
                return violation("lunch end recorded without lunch start");
            }
            return Ok(());
        };

        if let Some(check_out) = self.check_out {
            if check_out < check_in {
                return violation("check-out precedes check-in");
            }
        }

        match (self.lunch_start_time, self.lunch_end_time) {
            (None, Some(_)) => return violation("lunch end recorded without lunch start"),
            (Some(start), end) => {
                if start < check_in {
                    return violation("lunch starts before check-in");
                }
                if let Some(end) = end {
                    if end < start {
                        return violation("lunch end precedes lunch start");
                    }
                }
                if let Some(check_out) = self.check_out {
                    if start > check_out || end.is_some_and(|end| end > check_out) {
                        return violation("lunch extends past check-out");
                    }
                }
            }
            (None, None) => {}
        }

        if let Some(overtime) = self.overtime_start_time {
            if overtime < check_in {
                return violation("overtime starts before check-in");
            }
        }

        Ok(())
    }

    /// Elapsed check-in to check-out (or to `now` while open), in minutes.
    pub fn work_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.check_in
            .map(|check_in| minutes_between(check_in, self.check_out.unwrap_or(now)))
    }

    pub fn lunch_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.lunch_start_time
            .map(|start| minutes_between(start, self.lunch_end_time.unwrap_or(now)))
    }

    pub fn net_work_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.work_minutes(now)
            .map(|work| (work - self.lunch_minutes(now).unwrap_or(0)).max(0))
    }

    pub fn overtime_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.overtime_start_time
            .map(|start| minutes_between(start, self.check_out.unwrap_or(now)))
    }
}

#[cfg(test)]
mod attendance_record_tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
            .single()
            .expect("valid time")
    }

    const SITE: Coordinates = Coordinates {
        latitude: 23.8103,
        longitude: 90.4125,
    };

    #[fixture]
    fn record() -> AttendanceRecord {
        AttendanceRecord::new(
            "att-1".to_string(),
            1,
            12,
            NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date"),
        )
    }

    #[rstest]
    #[case(None, None, None, None, SessionState::NotLoggedIn)]
    #[case(Some(8), None, None, None, SessionState::CheckedIn)]
    #[case(Some(8), None, Some(12), None, SessionState::OnLunch)]
    #[case(Some(8), None, Some(12), Some(13), SessionState::CheckedIn)]
    #[case(Some(8), Some(17), Some(12), None, SessionState::CheckedOut)]
    #[case(Some(8), Some(17), None, None, SessionState::CheckedOut)]
    fn session_is_derived_from_timestamps(
        #[case] check_in: Option<u32>,
        #[case] check_out: Option<u32>,
        #[case] lunch_start: Option<u32>,
        #[case] lunch_end: Option<u32>,
        #[case] expected: SessionState,
    ) {
        let hour = |h: Option<u32>| h.map(|h| at(h, 0));
        assert_eq!(
            derive_session(
                hour(check_in),
                hour(check_out),
                hour(lunch_start),
                hour(lunch_end)
            ),
            expected
        );
    }

    #[rstest]
    fn full_day_durations(mut record: AttendanceRecord) {
        record.clock_in(at(8, 0), SITE).expect("clock in");
        assert!(record.pending_checkout);
        record.start_lunch(at(12, 0)).expect("lunch start");
        assert_eq!(record.session_state(), SessionState::OnLunch);
        record.end_lunch(at(12, 30)).expect("lunch end");
        record.clock_out(at(17, 0), SITE).expect("clock out");

        let now = at(18, 0);
        assert_eq!(record.work_minutes(now), Some(540));
        assert_eq!(record.lunch_minutes(now), Some(30));
        assert_eq!(record.net_work_minutes(now), Some(510));
        assert!(!record.pending_checkout);
        assert_eq!(record.session_state(), SessionState::CheckedOut);
    }

    #[rstest]
    fn second_clock_in_is_rejected(mut record: AttendanceRecord) {
        record.clock_in(at(8, 0), SITE).expect("clock in");
        let before = record.clone();
        assert!(matches!(
            record.clock_in(at(8, 5), SITE),
            Err(WorkflowError::AlreadyCheckedIn)
        ));
        assert_eq!(record, before);
    }

    #[rstest]
    fn clock_in_after_clock_out_reopens_and_keeps_history(mut record: AttendanceRecord) {
        record.clock_in(at(8, 0), SITE).expect("clock in");
        record.start_lunch(at(12, 0)).expect("lunch");
        record.end_lunch(at(12, 30)).expect("lunch end");
        record.clock_out(at(13, 0), SITE).expect("clock out");
        record.clock_in(at(14, 0), SITE).expect("reopen");

        assert_eq!(record.session_state(), SessionState::CheckedIn);
        assert_eq!(record.previous_sessions.len(), 1);
        assert_eq!(record.previous_sessions[0].check_out, at(13, 0));
        assert_eq!(record.lunch_start_time, None);
        // lunch is available again in the new session
        record.start_lunch(at(15, 0)).expect("second lunch");
    }

    #[rstest]
    fn reopen_keeps_overtime_of_closed_session(mut record: AttendanceRecord) {
        record.clock_in(at(8, 0), SITE).expect("clock in");
        record.start_overtime(at(17, 0)).expect("overtime");
        record.clock_out(at(19, 0), SITE).expect("clock out");
        record.clock_in(at(20, 0), SITE).expect("reopen");

        assert_eq!(record.overtime_start_time, None);
        let closed = &record.previous_sessions[0];
        assert_eq!(closed.check_out, at(19, 0));
        assert_eq!(closed.overtime_start_time, Some(at(17, 0)));
    }

    #[rstest]
    fn clock_out_closes_open_lunch(mut record: AttendanceRecord) {
        record.clock_in(at(8, 0), SITE).expect("clock in");
        record.start_lunch(at(12, 0)).expect("lunch");
        record.clock_out(at(12, 45), SITE).expect("clock out");
        assert_eq!(record.lunch_end_time, Some(at(12, 45)));
        assert_eq!(record.lunch_minutes(at(18, 0)), Some(45));
    }

    #[rstest]
    fn clock_out_before_check_in_is_an_invariant_violation(mut record: AttendanceRecord) {
        record.clock_in(at(9, 0), SITE).expect("clock in");
        let result = record.clock_out(at(8, 59), SITE);
        assert!(matches!(result, Err(WorkflowError::InvariantViolation(_))));
    }

    #[rstest]
    fn lunch_guards(mut record: AttendanceRecord) {
        assert!(matches!(
            record.start_lunch(at(12, 0)),
            Err(WorkflowError::NotCheckedIn)
        ));
        record.clock_in(at(8, 0), SITE).expect("clock in");
        assert!(matches!(
            record.end_lunch(at(12, 0)),
            Err(WorkflowError::LunchNotStarted)
        ));
        record.start_lunch(at(12, 0)).expect("lunch");
        assert!(matches!(
            record.start_lunch(at(12, 1)),
            Err(WorkflowError::LunchAlreadyStarted)
        ));
        record.end_lunch(at(12, 30)).expect("lunch end");
        assert!(matches!(
            record.end_lunch(at(12, 31)),
            Err(WorkflowError::LunchAlreadyEnded)
        ));
        record.clock_out(at(17, 0), SITE).expect("clock out");
        assert!(matches!(
            record.start_lunch(at(17, 5)),
            Err(WorkflowError::AlreadyCheckedOut)
        ));
    }

    #[rstest]
    fn overtime_requires_open_session_off_lunch(mut record: AttendanceRecord) {
        record.clock_in(at(8, 0), SITE).expect("clock in");
        record.start_lunch(at(12, 0)).expect("lunch");
        assert!(matches!(
            record.start_overtime(at(12, 10)),
            Err(WorkflowError::OnLunch)
        ));
        record.end_lunch(at(12, 30)).expect("lunch end");
        record.start_overtime(at(17, 0)).expect("overtime");
        assert!(matches!(
            record.start_overtime(at(17, 1)),
            Err(WorkflowError::OvertimeAlreadyStarted)
        ));
        record.clock_out(at(19, 0), SITE).expect("clock out");
        assert_eq!(record.overtime_minutes(at(20, 0)), Some(120));
    }

    #[rstest]
    fn override_records_prior_value(mut record: AttendanceRecord) {
        record.clock_in(at(8, 10), SITE).expect("clock in");
        record
            .apply_override(
                OverrideField::CheckIn,
                Some(at(8, 0)),
                "Gate scanner offline".to_string(),
                90,
                at(9, 0),
            )
            .expect("override");

        assert_eq!(record.check_in, Some(at(8, 0)));
        let entry = &record.manual_overrides[0];
        assert_eq!(entry.previous_value, Some(at(8, 10)));
        assert_eq!(entry.new_value, Some(at(8, 0)));
        assert_eq!(entry.supervisor_id, 90);
    }

    #[rstest]
    fn override_that_breaks_ordering_is_rejected(mut record: AttendanceRecord) {
        record.clock_in(at(8, 0), SITE).expect("clock in");
        record.clock_out(at(17, 0), SITE).expect("clock out");
        let result = record.apply_override(
            OverrideField::CheckOut,
            Some(at(7, 0)),
            "typo".to_string(),
            90,
            at(18, 0),
        );
        assert!(matches!(result, Err(WorkflowError::InvariantViolation(_))));
    }

    #[rstest]
    fn clearing_check_out_reopens_pending_checkout(mut record: AttendanceRecord) {
        record.clock_in(at(8, 0), SITE).expect("clock in");
        record.clock_out(at(9, 0), SITE).expect("clock out");
        record
            .apply_override(
                OverrideField::CheckOut,
                None,
                "Clocked out by mistake".to_string(),
                90,
                at(9, 5),
            )
            .expect("override");
        assert!(record.pending_checkout);
        assert_eq!(record.session_state(), SessionState::CheckedIn);
    }
}
