//! Request correlation for logs and error bodies.
//!
//! Every request runs inside a task-local scope holding its [`RequestId`], so
//! services and error conversions can echo it without threading it through
//! every call.

use axum::http::Request;
use std::{fmt, future::Future};
use tower_http::{
    classify::{SharedClassifier, StatusInRangeAsFailures},
    trace::{
        DefaultOnBodyChunk, DefaultOnEos, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse,
        MakeSpan, TraceLayer,
    },
};
use uuid::Uuid;

use crate::middleware_helpers::REQUEST_ID_HEADER;

/// Correlation id carried by the `x-request-id` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh random id for requests that arrive without one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

tokio::task_local! {
    static REQUEST_SCOPE: RequestId;
}

/// Runs `future` with `request_id` visible to [`current_request_id`].
pub async fn scope_request_id<Fut>(request_id: RequestId, future: Fut) -> Fut::Output
where
    Fut: Future,
{
    REQUEST_SCOPE.scope(request_id, future).await
}

/// The id of the request being served, or `None` outside a request scope.
pub fn current_request_id() -> Option<RequestId> {
    REQUEST_SCOPE.try_with(RequestId::clone).ok()
}

/// Names each request span `http.request` and tags it with the correlation id.
#[derive(Clone, Default)]
pub struct RequestSpanMaker;

impl<B> MakeSpan<B> for RequestSpanMaker {
    fn make_span(&mut self, request: &Request<B>) -> tracing::Span {
        let request_id = match request.extensions().get::<RequestId>() {
            Some(id) => id.clone(),
            None => request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(RequestId::new)
                .unwrap_or_else(RequestId::generate),
        };

        tracing::info_span!(
            "http.request",
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
        )
    }
}

pub type HttpTraceLayer = TraceLayer<
    SharedClassifier<StatusInRangeAsFailures>,
    RequestSpanMaker,
    DefaultOnRequest,
    DefaultOnResponse,
    DefaultOnBodyChunk,
    DefaultOnEos,
    DefaultOnFailure,
>;

/// tower-http trace layer that only counts 5xx responses as failures, so
/// rejected logins and validation errors stay at the response log level.
pub fn configure_http_tracing() -> HttpTraceLayer {
    TraceLayer::new(SharedClassifier::new(StatusInRangeAsFailures::new(
        500..=599,
    )))
    .make_span_with(RequestSpanMaker)
}
