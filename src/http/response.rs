//! HTTP response building module
//!
//! Builders for the responses this server produces itself: errors, 304,
//! 405, 416, OPTIONS and JSON summaries.

use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::body::{self, Body};
use crate::error::HttpError;

const ALLOW: &str = "GET, HEAD, OPTIONS, POST";

/// Plain-text response for any status
pub fn build_text_response(status: StatusCode, text: impl Into<String>) -> Response<Body> {
    let text = text.into();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CONTENT_LENGTH, text.len())
        .body(body::full(text))
        .unwrap_or_else(|e| fallback(status, &e))
}

/// Render an error kind for the client
///
/// Server-side failures expose only the status text, never the cause.
pub fn build_error_response(error: &HttpError) -> Response<Body> {
    let status = error.status_code();
    let text = if status.is_server_error() {
        status.canonical_reason().unwrap_or("Internal Server Error").to_string()
    } else {
        error.to_string()
    };
    build_text_response(status, text)
}

/// JSON response from any serializable value
pub fn build_json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(json) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, json.len())
            .body(body::full(json))
            .unwrap_or_else(|e| fallback(status, &e)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize JSON response");
            build_text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Build 304 Not Modified from the headers of the full response
///
/// Content headers describing the omitted body are removed.
pub fn build_304_response(mut headers: HeaderMap) -> Response<Body> {
    strip_content_headers(&mut headers);
    let mut response = Response::new(body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    *response.headers_mut() = headers;
    response
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<Body> {
    let mut response = build_text_response(StatusCode::METHOD_NOT_ALLOWED, "405 Method Not Allowed");
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(ALLOW));
    response
}

/// Build 416 Range Not Satisfiable response
pub fn build_416_response(size: u64) -> Response<Body> {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CONTENT_RANGE, format!("bytes */{size}"))
        .body(body::full("Range Not Satisfiable"))
        .unwrap_or_else(|e| fallback(StatusCode::RANGE_NOT_SATISFIABLE, &e))
}

/// Build OPTIONS response
pub fn build_options_response() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::ALLOW, ALLOW)
        .body(body::empty())
        .unwrap_or_else(|e| fallback(StatusCode::NO_CONTENT, &e))
}

/// Remove headers that describe a body which is not sent
pub fn strip_content_headers(headers: &mut HeaderMap) {
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
}

fn fallback(status: StatusCode, error: &hyper::http::Error) -> Response<Body> {
    tracing::error!(status = status.as_u16(), error = %error, "Failed to build response");
    let mut response = Response::new(body::empty());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_text(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_304_strips_content_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/css"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        headers.insert(header::ETAG, HeaderValue::from_static("\"a\""));

        let response = build_304_response(headers);
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(response.headers()[header::ETAG], "\"a\"");
    }

    #[test]
    fn test_416_reports_size() {
        let response = build_416_response(1234);
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1234");
    }

    #[tokio::test]
    async fn test_error_response_hides_server_cause() {
        let response = build_error_response(&HttpError::internal("disk on fire"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Internal Server Error");

        let response = build_error_response(&HttpError::NotFound("/nope".to_string()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("/nope"));
    }

    #[tokio::test]
    async fn test_json_response() {
        let response = build_json_response(StatusCode::CREATED, &serde_json::json!({"ok": true}));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_text(response).await, r#"{"ok":true}"#);
    }
}
