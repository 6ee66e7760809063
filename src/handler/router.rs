//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method check, origin
//! resolution, dispatch to uploads or static files, error rendering and
//! access logging.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header;
use hyper::{Method, Request, Response};
use tracing::{debug, error, warn};

use super::upload::handle_upload;
use crate::config::AppState;
use crate::error::HttpError;
use crate::http::{self, Body, IncomingRequest};
use crate::logger::{self, AccessLogEntry};
use crate::multipart::RequestBody;
use crate::trust::{resolve_origin, Transport};

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    transport: Transport,
    state: Arc<AppState>,
) -> Result<Response<Body>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Display,
{
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    // 1. Check HTTP method
    if let Some(resp) = check_http_method(&parts.method) {
        return Ok(resp);
    }

    // 2. Resolve the client origin; a bad host aborts the request
    let origin = match resolve_origin(transport, &parts.headers, &state.trust) {
        Ok(origin) => origin,
        Err(e) => return Ok(http::build_error_response(&e)),
    };

    let request = IncomingRequest::new(parts.method, parts.uri, parts.headers, origin);

    // 3. Dispatch
    let response = match dispatch(&request, body, &state).await {
        Ok(response) => response,
        Err(e) => {
            log_failure(&request, &e);
            http::build_error_response(&e)
        }
    };

    if state.config.logging.access_log {
        logger::log_access(&access_entry(&request, &response, started));
    }
    Ok(response)
}

/// Answer OPTIONS and unsupported methods directly
fn check_http_method(method: &Method) -> Option<Response<Body>> {
    match *method {
        Method::GET | Method::HEAD | Method::POST => None,
        Method::OPTIONS => Some(http::build_options_response()),
        _ => {
            warn!(method = %method, "Method not allowed");
            Some(http::build_405_response())
        }
    }
}

async fn dispatch<B>(
    request: &IncomingRequest,
    body: B,
    state: &AppState,
) -> Result<Response<Body>, HttpError>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Display,
{
    if *request.method() == Method::POST && request.path() == state.config.uploads.path {
        let body = RequestBody::Streaming(body.into_data_stream());
        return handle_upload(request, body, &state.uploads).await;
    }

    state
        .static_files
        .handle(request, || async {
            Err(HttpError::NotFound(request.path().to_string()))
        })
        .await
}

fn log_failure(request: &IncomingRequest, err: &HttpError) {
    if err.is_client_error() {
        debug!(path = %request.path(), peer = %request.ip(), error = %err, "Request failed");
    } else {
        error!(path = %request.path(), peer = %request.ip(), error = ?err, "Request failed");
    }
}

fn access_entry(
    request: &IncomingRequest,
    response: &Response<Body>,
    started: Instant,
) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(request.origin(), request.method().as_str(), request.path());
    entry.query = request.query().map(ToString::to_string);
    entry.status = response.status().as_u16();
    entry.referer = request.header("referer").map(ToString::to_string);
    entry.user_agent = request
        .header(header::USER_AGENT.as_str())
        .map(ToString::to_string);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}
