use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::utils::geofence::Coordinates;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IssueType {
    Safety,
    Equipment,
    Material,
    Quality,
    Weather,
    Access,
    Other,
}

impl IssueType {
    pub fn allowed_values() -> Vec<String> {
        Self::iter().map(|t| t.to_string()).collect()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IssuePriority {
    Low,
    Medium,
    High,
    Critical,
}

impl IssuePriority {
    pub fn allowed_values() -> Vec<String> {
        Self::iter().map(|p| p.to_string()).collect()
    }

    /// High and critical issues stop work on the assignment.
    pub fn blocks_work(&self) -> bool {
        matches!(self, IssuePriority::High | IssuePriority::Critical)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueReport {
    pub id: String,
    #[schema(example = "ISS-20260302-5F0C6A7E")]
    pub ticket_number: String,
    pub assignment_id: u64,
    pub employee_id: u64,
    pub issue_type: IssueType,
    pub priority: IssuePriority,
    pub description: String,
    pub location: Option<Coordinates>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// `ISS-<date>-<first 8 hex digits of the record id>`.
pub fn ticket_number(id: &str, created_at: DateTime<Utc>) -> String {
    let suffix: String = id
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(8)
        .collect::<String>()
        .to_uppercase();
    format!("ISS-{}-{}", created_at.format("%Y%m%d"), suffix)
}
