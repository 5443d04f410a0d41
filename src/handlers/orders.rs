use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{ensure_order_access, resolve_order_owner, Principal},
    entities::{order, order_line, OrderStatus},
    errors::ServiceError,
    services::orders::{NewOrder, OrderDetails},
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Defaults to the caller. Only staff may name someone else.
    pub owner_id: Option<Uuid>,
    pub customer_id: Option<i32>,
    pub delivery_address: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddLineRequest {
    pub food_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
}

fn default_page() -> u64 {
    1
}

#[derive(Debug, Serialize)]
pub struct DeletedOrder {
    pub order_id: i32,
    pub lines_removed: u64,
}

/// Open a new empty order
pub async fn create_order(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<order::Model>>), ServiceError> {
    let owner_id = resolve_order_owner(&principal, request.owner_id)?;

    let order = state
        .services
        .orders
        .create_order(NewOrder {
            owner_id,
            customer_id: request.customer_id,
            delivery_address: request.delivery_address,
            contact_number: request.contact_number,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(order, "Order created")),
    ))
}

/// Orders owned by the caller
pub async fn list_my_orders(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let page = state
        .services
        .orders
        .list_orders_for_owner(principal.id, query.page, state.config.page_size(query.limit))
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// All orders, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let page = state
        .services
        .orders
        .list_orders(query.status, query.page, state.config.page_size(query.limit))
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// One order with its lines
pub async fn get_order(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> ApiResult<OrderDetails> {
    let details = state.services.orders.get_order_details(id).await?;
    ensure_order_access(&principal, &details.order)?;
    Ok(Json(ApiResponse::success(details)))
}

/// Add a line to an order
pub async fn add_line(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Json(request): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<ApiResponse<order_line::Model>>), ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    ensure_order_access(&principal, &order)?;

    let line = state
        .services
        .orders
        .add_line(order.id, request.food_id, request.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(line))))
}

/// Remove a line; answers with the updated order
pub async fn remove_line(
    State(state): State<AppState>,
    principal: Principal,
    Path(line_id): Path<i32>,
) -> ApiResult<order::Model> {
    let (_, order) = state.services.orders.get_line(line_id).await?;
    ensure_order_access(&principal, &order)?;

    let order = state.services.orders.remove_line(line_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<order::Model> {
    let order = state
        .services
        .orders
        .update_status(id, request.status)
        .await?;
    Ok(Json(ApiResponse::with_message(order, "Order status updated")))
}

/// Delete an order and its lines
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<DeletedOrder> {
    let lines_removed = state.services.orders.delete_order(id).await?;
    Ok(Json(ApiResponse::with_message(
        DeletedOrder {
            order_id: id,
            lines_removed,
        },
        "Order deleted",
    )))
}
