use crate::tracing::{scope_request_id, RequestId};
use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_INBOUND_ID_LEN: usize = 128;

/// Keeps a caller-supplied id when it is printable and reasonably short.
fn inbound_request_id(request: &Request) -> Option<(RequestId, HeaderValue)> {
    let value = request.headers().get(REQUEST_ID_HEADER)?;
    let text = value.to_str().ok()?.trim();
    if text.is_empty() || text.len() > MAX_INBOUND_ID_LEN {
        return None;
    }
    Some((RequestId::new(text), value.clone()))
}

fn generated_request_id() -> (RequestId, HeaderValue) {
    let id = RequestId::generate();
    // UUIDs are plain ASCII.
    let header = HeaderValue::from_str(id.as_str())
        .unwrap_or_else(|_| HeaderValue::from_static("unavailable"));
    (id, header)
}

/// Tags the request and its response with an `x-request-id`, exposes the id
/// as an extension, and scopes it for [`crate::tracing::current_request_id`].
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let (request_id, header_value) =
        inbound_request_id(&request).unwrap_or_else(generated_request_id);
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    request
        .headers_mut()
        .insert(header_name.clone(), header_value.clone());
    request.extensions_mut().insert(request_id.clone());

    let mut response = scope_request_id(request_id, next.run(request)).await;
    response.headers_mut().insert(header_name, header_value);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        extract::Extension,
        http::{Request as HttpRequest, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn echo_request_id(Extension(request_id): Extension<RequestId>) -> (StatusCode, String) {
        (StatusCode::OK, format!("request-id:{request_id}"))
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(echo_request_id))
            .layer(axum::middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn missing_or_oversized_ids_are_replaced() {
        for inbound in [None, Some("x".repeat(200))] {
            let mut builder = HttpRequest::builder().uri("/");
            if let Some(value) = &inbound {
                builder = builder.header(REQUEST_ID_HEADER, value.as_str());
            }
            let response = app()
                .oneshot(builder.body(Body::empty()).unwrap())
                .await
                .unwrap();

            let echoed = response
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
                .unwrap();
            assert!(Uuid::parse_str(&echoed).is_ok(), "got {echoed}");

            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(body, format!("request-id:{echoed}").as_bytes());
        }
    }

    #[tokio::test]
    async fn inbound_request_id_is_preserved() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(REQUEST_ID_HEADER, "trace-me-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "trace-me-42"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"request-id:trace-me-42");
    }
}
