use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::geofence::Coordinates;

/// One progress submission. Entries are written once and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgressEntry {
    #[schema(example = "5f0c6a7e-2c1b-4d7e-9a43-1f7c2f8e9b10")]
    pub id: String,
    pub assignment_id: u64,
    pub employee_id: u64,
    #[schema(example = 60.0)]
    pub percent: f64,
    pub description: String,
    pub notes: Option<String>,
    pub location: Option<Coordinates>,
    pub completed_quantity: Option<f64>,
    pub issues: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub submitted_at: DateTime<Utc>,
}
