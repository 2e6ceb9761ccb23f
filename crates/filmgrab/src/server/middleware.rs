use crate::prelude::*;
use axum::body::Body;
use axum::http::header::{HeaderValue, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Allows any origin to call the API. Pre-flight requests are answered
/// right away without reaching the handlers.
pub(crate) async fn cors(request: Request<Body>, next: Next<Body>) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    insert_cors_headers(response.headers_mut());

    response
}

fn insert_cors_headers(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
}

pub(crate) async fn observe(request: Request<Body>, next: Next<Body>) -> Response {
    let span = info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
    );

    async {
        let (response, duration) = next.run(request).with_duration().await;
        let duration = tracing_duration(duration);

        info!(duration, status = %response.status(), "Handled HTTP request");

        response
    }
    .instrument(span)
    .await
}
