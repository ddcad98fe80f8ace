use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Task catalogue entry an assignment points at.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Task {
    #[schema(example = 301)]
    pub id: u64,
    #[schema(example = "Rebar tying, level 3 slab")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "structural")]
    pub task_type: Option<String>,
}
