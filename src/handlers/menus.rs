use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::Principal,
    entities::{menu, menu_grant},
    errors::ServiceError,
    services::menus::{MenuInput, MenuNode},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteMenuQuery {
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Deserialize)]
pub struct GrantMenuRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DeletedMenus {
    pub deleted: Vec<i32>,
}

/// Menus visible to the caller, flat and ordered
pub async fn my_menus(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<menu::Model>> {
    let menus = state.services.menus.resolve_menus_for(principal.id).await?;
    Ok(Json(ApiResponse::success(menus)))
}

/// Menus visible to the caller, nested by parent
pub async fn my_menu_tree(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<MenuNode>> {
    let tree = state
        .services
        .menus
        .resolve_menu_tree_for(principal.id)
        .await?;
    Ok(Json(ApiResponse::success(tree)))
}

pub async fn list_menus(State(state): State<AppState>) -> ApiResult<Vec<menu::Model>> {
    let menus = state.services.menus.list_menus().await?;
    Ok(Json(ApiResponse::success(menus)))
}

pub async fn create_menu(
    State(state): State<AppState>,
    Json(request): Json<MenuInput>,
) -> Result<(StatusCode, Json<ApiResponse<menu::Model>>), ServiceError> {
    let menu = state.services.menus.create_menu(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(menu))))
}

pub async fn update_menu(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<MenuInput>,
) -> ApiResult<menu::Model> {
    let menu = state.services.menus.update_menu(id, request).await?;
    Ok(Json(ApiResponse::success(menu)))
}

/// Delete a menu; `?cascade=true` removes its subtree as well
pub async fn delete_menu(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<DeleteMenuQuery>,
) -> ApiResult<DeletedMenus> {
    let deleted = state.services.menus.delete_menu(id, query.cascade).await?;
    Ok(Json(ApiResponse::success(DeletedMenus { deleted })))
}

pub async fn grant_menu(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Json(request): Json<GrantMenuRequest>,
) -> Result<(StatusCode, Json<ApiResponse<menu_grant::Model>>), ServiceError> {
    let grant = state
        .services
        .menus
        .grant_menu(request.user_id, id, Some(principal.email))
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(grant))))
}

pub async fn revoke_menu(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(i32, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    state.services.menus.revoke_menu(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
