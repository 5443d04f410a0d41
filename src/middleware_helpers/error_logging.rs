//! Logs every request that ends in a server error with its method and path.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::error;

pub async fn error_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    if response.status().is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Unhandled error while processing request"
        );
    }

    response
}
