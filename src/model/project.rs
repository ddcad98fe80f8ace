use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::geofence::ProjectGeofence;

/// Read-only view of a project, owned by the project collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[schema(example = 12)]
    pub id: u64,
    #[schema(example = "Gulshan Tower Block B")]
    pub name: String,
    #[schema(example = "PRJ-2026-014")]
    pub code: String,
    pub supervisor_id: Option<u64>,
    pub geofence: ProjectGeofence,
}
