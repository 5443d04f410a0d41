/*!
 * # Authentication and Authorization Module
 *
 * Identity itself (registration, passwords, sessions) belongs to an external
 * provider. This module is the boundary to it:
 *
 * - Bearer JWTs are validated and mapped to a [`Principal`]
 * - The principal's roles are always re-read from `user_roles`, so revoking a
 *   role takes effect on the next request
 * - Router layers gate route groups by role before any handler runs
 */

use crate::config::AppConfig;
use crate::db::DbPool;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

// Entity modules
pub mod user;
pub mod user_role;

// Feature modules
mod policy;
mod rbac;

// Re-exports
pub use policy::*;
pub use rbac::*;

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // Subject (account ID)
    pub email: Option<String>, // Account email
    pub jti: String,           // JWT ID
    pub iat: i64,              // Issued at time
    pub exp: i64,              // Expiration time
    pub nbf: i64,              // Not valid before time
    pub iss: String,           // Issuer
    pub aud: String,           // Audience
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub roles: RoleSet,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Staff, Manager or Admin.
    pub fn is_privileged(&self) -> bool {
        self.roles.is_privileged()
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub token_expiration: Duration,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: cfg.jwt_audience.clone(),
            jwt_issuer: cfg.jwt_issuer.clone(),
            token_expiration: Duration::from_secs(cfg.jwt_expiration_secs),
        }
    }
}

/// Validates bearer tokens and resolves them to principals.
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    pub db: Arc<DbPool>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DbPool>) -> Self {
        Self { config, db }
    }

    /// Mints an access token for an account. Used by operator tooling and
    /// tests; production tokens come from the identity provider.
    pub fn issue_token(&self, account_id: Uuid, email: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: account_id.to_string(),
            email: Some(email.to_string()),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Loads the account named by the token and its active role assignments.
    pub async fn resolve_principal(&self, claims: &Claims) -> Result<Principal, AuthError> {
        let account_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let db = &*self.db;

        let account = user::Entity::find_by_id(account_id)
            .one(db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::UserNotFound)?;

        if !account.is_active {
            warn!(account_id = %account_id, "Rejected token for inactive account");
            return Err(AuthError::AccountDisabled);
        }

        let role_names: Vec<String> = user_role::Entity::find()
            .filter(user_role::Column::UserId.eq(account_id))
            .filter(user_role::Column::IsActive.eq(true))
            .all(db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .into_iter()
            .map(|assignment| assignment.role_name)
            .collect();

        Ok(Principal {
            id: account.id,
            email: account.email,
            roles: RoleSet::from_names(role_names),
        })
    }

    /// Resolves the principal carried by the request headers, if any.
    pub async fn principal_from_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<Principal>, AuthError> {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };
        let value = value.to_str().map_err(|_| AuthError::InvalidToken)?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.validate_token(token)?;
        let principal = self.resolve_principal(&claims).await?;
        debug!(principal_id = %principal.id, roles = %principal.roles, "Authenticated request");
        Ok(Some(principal))
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING_TOKEN",
                "Authorization header must carry a Bearer token".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::UserNotFound => (
                StatusCode::UNAUTHORIZED,
                "AUTH_USER_NOT_FOUND",
                "Account not found".to_string(),
            ),
            Self::AccountDisabled => (
                StatusCode::UNAUTHORIZED,
                "AUTH_ACCOUNT_DISABLED",
                "Account is disabled".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "authentication failed");
        }

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            },
            "request_id": crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
        }));

        (status, body).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Resolves the caller (if any) and stores it in the request extensions.
/// Requests without an `Authorization` header continue anonymously.
pub async fn principal_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Some(principal) = auth_service
        .principal_from_headers(request.headers())
        .await?
    {
        request.extensions_mut().insert(principal);
    }

    Ok(next.run(request).await)
}

/// Rejects the request unless the principal holds one of `allowed`. An empty
/// list only requires authentication.
pub async fn role_middleware(
    State(allowed): State<Arc<[Role]>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .ok_or(AuthError::MissingAuth)?;

    if !allowed.is_empty() && !principal.roles.contains_any(&allowed) {
        warn!(
            principal_id = %principal.id,
            roles = %principal.roles,
            path = %request.uri().path(),
            "Role check failed"
        );
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to gate route groups. These only inspect the
/// [`Principal`] placed by [`principal_middleware`], which must wrap them.
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_any_role(self, roles: &[Role]) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.with_any_role(&[])
    }

    fn with_any_role(self, roles: &[Role]) -> Self {
        let allowed: Arc<[Role]> = Arc::from(roles);
        self.route_layer(axum::middleware::from_fn_with_state(
            allowed,
            role_middleware,
        ))
    }
}
