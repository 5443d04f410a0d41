//! Food Ordering API Library
//!
//! Catalog, order aggregates, customer records, navigation menus and
//! role-scoped dashboards for a single restaurant, served over JSON.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;
pub mod tracing;

use axum::{
    middleware,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{AuthConfig, AuthRouterExt, AuthService, Role};
use crate::db::DbPool;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: config::AppConfig) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config), db.clone()));
        let services = handlers::AppServices::new(db.clone(), &config);
        Self {
            db,
            config,
            auth,
            services,
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    pub limit: Option<u64>,
    pub search: Option<String>,
}

fn default_page() -> u64 {
    1
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// One page of results. Pages are 1-based.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResponse<U> {
        PaginatedResponse {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!response.success);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 21, 1, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 0, 1, 10).total_pages, 0);
    }

    #[test]
    fn map_keeps_paging_fields() {
        let page = PaginatedResponse::new(vec![1, 2], 12, 2, 5).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!((page.total, page.page, page.limit, page.total_pages), (12, 2, 5, 3));
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes served under `/api/v1`. Role gates run as route layers and expect
/// [`auth::principal_middleware`] to wrap the router.
pub fn api_v1_routes() -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/foods", get(handlers::foods::list_foods))
        .route("/foods/:id", get(handlers::foods::get_food));

    // Catalog maintenance
    let foods_admin = Router::new()
        .route("/foods", post(handlers::foods::create_food))
        .route(
            "/foods/:id",
            put(handlers::foods::update_food).delete(handlers::foods::delete_food),
        )
        .with_any_role(&[Role::Admin]);

    // Ownership is checked inside these handlers
    let orders_authenticated = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/mine", get(handlers::orders::list_my_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/lines", post(handlers::orders::add_line))
        .route("/order-lines/:id", delete(handlers::orders::remove_line))
        .with_auth();

    let orders_staff = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id/status", put(handlers::orders::update_status))
        .with_any_role(&[Role::Admin, Role::Manager, Role::Staff]);

    let orders_delete = Router::new()
        .route("/orders/:id", delete(handlers::orders::delete_order))
        .with_any_role(&[Role::Admin, Role::Manager]);

    let customers = Router::new()
        .route(
            "/customers",
            get(handlers::customers::list_customers).post(handlers::customers::create_customer),
        )
        .route(
            "/customers/:id",
            get(handlers::customers::get_customer)
                .put(handlers::customers::update_customer)
                .delete(handlers::customers::delete_customer),
        )
        .with_any_role(&[Role::Admin, Role::Manager]);

    let navigation = Router::new()
        .route("/menus/mine", get(handlers::menus::my_menus))
        .route("/menus/mine/tree", get(handlers::menus::my_menu_tree))
        .route("/dashboard", get(handlers::dashboard::dashboard))
        .with_auth();

    let menus_admin = Router::new()
        .route(
            "/menus",
            get(handlers::menus::list_menus).post(handlers::menus::create_menu),
        )
        .route(
            "/menus/:id",
            put(handlers::menus::update_menu).delete(handlers::menus::delete_menu),
        )
        .route("/menus/:id/grants", post(handlers::menus::grant_menu))
        .route(
            "/menus/:id/grants/:user_id",
            delete(handlers::menus::revoke_menu),
        )
        .with_any_role(&[Role::Admin]);

    let accounts_admin = Router::new()
        .route("/accounts", post(handlers::accounts::create_account))
        .route("/accounts/:id", get(handlers::accounts::get_account))
        .route("/accounts/:id/roles", post(handlers::accounts::assign_role))
        .route(
            "/accounts/:id/roles/:role",
            delete(handlers::accounts::revoke_role),
        )
        .route(
            "/accounts/:id/customer",
            put(handlers::accounts::link_customer),
        )
        .with_any_role(&[Role::Admin]);

    Router::new()
        .merge(public)
        .merge(foods_admin)
        .merge(orders_authenticated)
        .merge(orders_staff)
        .merge(orders_delete)
        .merge(customers)
        .merge(navigation)
        .merge(menus_admin)
        .merge(accounts_admin)
}

/// Full application router: `/api/v1` plus the request-scoped middleware
/// stack. CORS is left to the binary since it depends on the environment.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::principal_middleware,
        ))
        .layer(middleware::from_fn(
            middleware_helpers::error_logging_middleware,
        ))
        .layer(crate::tracing::configure_http_tracing())
        .layer(middleware::from_fn(middleware_helpers::request_id_middleware))
        .with_state(state)
}
