use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use std::time::Instant;

use crate::handlers::AppState;

/// Health report for the service and its database
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub database: DatabaseHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub status: &'static str,
    pub latency_ms: u64,
}

/// Readiness probe: pings the database. Answers 503 when the ping fails.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let started = Instant::now();
    let db_result = crate::db::check_connection(&state.db).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let (status_code, status, db_status) = match db_result {
        Ok(()) => (StatusCode::OK, "up", "up"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "down", "down"),
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: chrono::Utc::now().to_rfc3339(),
            database: DatabaseHealth {
                status: db_status,
                latency_ms,
            },
        }),
    )
}
