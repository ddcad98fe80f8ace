use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::utils::geofence::{Coordinates, GeofenceCheck};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LocationLogKind {
    CheckIn,
    CheckOut,
    TaskStart,
    GeofenceCheck,
}

/// Location audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationLog {
    pub id: String,
    pub employee_id: u64,
    pub project_id: u64,
    pub location: Coordinates,
    pub accuracy: Option<f64>,
    pub inside_geofence: bool,
    pub distance: f64,
    pub kind: LocationLogKind,
    pub recorded_at: DateTime<Utc>,
}

impl LocationLog {
    pub fn new(
        employee_id: u64,
        project_id: u64,
        location: Coordinates,
        accuracy: Option<f64>,
        check: &GeofenceCheck,
        kind: LocationLogKind,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            employee_id,
            project_id,
            location,
            accuracy,
            inside_geofence: check.inside_geofence,
            distance: check.distance,
            kind,
            recorded_at,
        }
    }
}
