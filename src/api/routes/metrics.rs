//! Per-category metric summaries

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::debug;

use crate::api::{
    error::{ApiError, ApiResult},
    state::DashboardState,
    types::MetricsResponse,
};

/// GET /api/metrics/:category
///
/// Returns a summary of every series in the category, or 404 if nothing has
/// been recorded under it.
pub async fn get_category(
    State(state): State<DashboardState>,
    Path(category): Path<String>,
) -> ApiResult<Json<MetricsResponse>> {
    let Some(metrics) = state.metrics.category(&category).await else {
        debug!("metrics requested for unknown category {category}");
        return Err(ApiError::NotFound(format!("unknown metric category: {category}")));
    };

    Ok(Json(MetricsResponse { category, metrics }))
}
