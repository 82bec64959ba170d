use axum::{Json, extract::State};

use crate::api::state::DashboardState;
use crate::registry::ComponentInfo;

/// GET /api/components
pub async fn list_components(State(state): State<DashboardState>) -> Json<Vec<ComponentInfo>> {
    Json(state.registry.list().await)
}
