use axum::{Json, extract::State};

use crate::api::{state::DashboardState, types::DashboardStatus};

/// GET /api/status
pub async fn get_status(State(state): State<DashboardState>) -> Json<DashboardStatus> {
    Json(state.status().await)
}
