use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{user, user_role, Principal, Role, RoleSet},
    errors::ServiceError,
    services::accounts::NewAccount,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LinkCustomerRequest {
    pub customer_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub account: user::Model,
    pub display_name: String,
    pub roles: RoleSet,
}

/// Provision an account for a principal known to the identity provider
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<NewAccount>,
) -> Result<(StatusCode, Json<ApiResponse<user::Model>>), ServiceError> {
    let account = state.services.accounts.create_account(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(account))))
}

pub async fn get_account(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<AccountView> {
    let accounts = &state.services.accounts;
    let account = accounts.get_account(id).await?;
    let roles = accounts.roles_for(id).await?;
    Ok(Json(ApiResponse::success(AccountView {
        display_name: account.display_name(),
        account,
        roles,
    })))
}

pub async fn assign_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignRoleRequest>,
) -> ApiResult<user_role::Model> {
    let assignment = state
        .services
        .accounts
        .assign_role(id, request.role, Some(principal.email))
        .await?;
    Ok(Json(ApiResponse::success(assignment)))
}

pub async fn revoke_role(
    State(state): State<AppState>,
    Path((id, role)): Path<(Uuid, String)>,
) -> Result<StatusCode, ServiceError> {
    let role: Role = role
        .parse()
        .map_err(|_| ServiceError::invalid_field("role", format!("Unknown role: {}", role)))?;

    if state.services.accounts.revoke_role(id, role).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound(format!(
            "Account {} does not hold the {} role",
            id, role
        )))
    }
}

pub async fn link_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<LinkCustomerRequest>,
) -> ApiResult<user::Model> {
    let account = state
        .services
        .accounts
        .link_customer(id, request.customer_id)
        .await?;
    Ok(Json(ApiResponse::success(account)))
}
