use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};

use crate::{
    entities::customer,
    errors::ServiceError,
    services::customers::{CustomerInput, CustomerWithOrders},
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};

/// List or search customers
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<customer::Model>> {
    let page = state
        .services
        .customers
        .search(
            query.search.as_deref(),
            query.page,
            state.config.page_size(query.limit),
        )
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// A customer with its orders
pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<CustomerWithOrders> {
    let customer = state.services.customers.get_with_orders(id).await?;
    Ok(Json(ApiResponse::success(customer)))
}

pub async fn create_customer(
    State(state): State<AppState>,
    Json(request): Json<CustomerInput>,
) -> Result<(StatusCode, Json<ApiResponse<customer::Model>>), ServiceError> {
    let customer = state.services.customers.create_customer(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(customer, "Customer created")),
    ))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<CustomerInput>,
) -> ApiResult<customer::Model> {
    let customer = state.services.customers.update_customer(id, request).await?;
    Ok(Json(ApiResponse::with_message(customer, "Customer updated")))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Value> {
    let detached = state.services.customers.delete_customer(id).await?;
    Ok(Json(ApiResponse::with_message(
        json!({ "customer_id": id, "detached_orders": detached }),
        "Customer deleted",
    )))
}
