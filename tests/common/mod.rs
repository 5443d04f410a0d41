#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use food_ordering_api::{
    app_router,
    auth::{user, Role},
    config::AppConfig,
    db,
    entities::food,
    services::{accounts::NewAccount, catalog::FoodInput},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tower::ServiceExt;

const TEST_SECRET: &str = "k3P9zq71mWv0cXr5tYh2bN8sLd4fGj6e";

/// Application state and router over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller adjust the configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = app_router(state.clone());
        Self { router, state }
    }

    /// Provisions an account holding `roles`.
    pub async fn account(&self, email: &str, roles: &[Role]) -> user::Model {
        let accounts = &self.state.services.accounts;
        let account = accounts
            .create_account(NewAccount {
                email: email.to_string(),
                first_name: None,
                last_name: None,
                phone_number: None,
                address: None,
            })
            .await
            .expect("provision test account");
        for role in roles {
            accounts
                .assign_role(account.id, *role, Some("tests".to_string()))
                .await
                .expect("assign test role");
        }
        account
    }

    /// Provisions an account and returns it with a bearer token.
    pub async fn login(&self, email: &str, roles: &[Role]) -> (user::Model, String) {
        let account = self.account(email, roles).await;
        let token = self.token_for(&account);
        (account, token)
    }

    pub fn token_for(&self, account: &user::Model) -> String {
        self.state
            .auth
            .issue_token(account.id, &account.email)
            .expect("issue test token")
    }

    pub async fn food(&self, name: &str, price: &str) -> food::Model {
        self.state
            .services
            .catalog
            .create_food(FoodInput {
                name: name.to_string(),
                description: None,
                price: Decimal::from_str(price).expect("price literal"),
                category: None,
                image_url: None,
                is_available: true,
            })
            .await
            .expect("create test food")
    }

    /// Sends a request through the full middleware stack and returns the
    /// status with the parsed JSON body (`Null` when the body is empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");

        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse response body")
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, token).await
    }
}

/// Reads a decimal that serde rendered as a JSON string or number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}
