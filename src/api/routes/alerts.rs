use axum::{Json, extract::State};

use crate::alerts::AlertsView;
use crate::api::state::DashboardState;

/// GET /api/alerts
///
/// Active alerts (oldest first) plus the transition history
pub async fn list_alerts(State(state): State<DashboardState>) -> Json<AlertsView> {
    Json(state.alerts.view().await)
}
