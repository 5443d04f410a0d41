use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    entities::food,
    errors::ServiceError,
    services::catalog::FoodInput,
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};

/// List food items, optionally filtered by a search term
pub async fn list_foods(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<food::Model>> {
    let page = state
        .services
        .catalog
        .search_paged(
            query.search.as_deref(),
            query.page,
            state.config.page_size(query.limit),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

pub async fn get_food(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<food::Model> {
    let food = state.services.catalog.get_food(id).await?;
    Ok(Json(ApiResponse::success(food)))
}

/// Create a food item
pub async fn create_food(
    State(state): State<AppState>,
    Json(request): Json<FoodInput>,
) -> Result<(StatusCode, Json<ApiResponse<food::Model>>), ServiceError> {
    let food = state.services.catalog.create_food(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(food, "Food item created")),
    ))
}

/// Replace a food item
pub async fn update_food(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<FoodInput>,
) -> ApiResult<food::Model> {
    let food = state.services.catalog.update_food(id, request).await?;
    Ok(Json(ApiResponse::with_message(food, "Food item updated")))
}

/// Delete a food item that no order references
pub async fn delete_food(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    state.services.catalog.delete_food(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
