use axum::{extract::State, response::Json};

use crate::{auth::Principal, services::dashboard::DashboardView, ApiResponse, ApiResult, AppState};

/// The caller's role-scoped dashboard
pub async fn dashboard(State(state): State<AppState>, principal: Principal) -> ApiResult<DashboardView> {
    let view = state.services.dashboard.build_for(&principal).await?;
    Ok(Json(ApiResponse::success(view)))
}
