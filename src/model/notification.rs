use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::assignment::AssignmentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    TaskStatusChanged,
}

/// Message for a supervisor's inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: u64,
    pub employee_id: u64,
    pub assignment_id: Option<u64>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub previous_status: Option<AssignmentStatus>,
    pub new_status: Option<AssignmentStatus>,
    pub created_at: DateTime<Utc>,
}
