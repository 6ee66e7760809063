//! Uploads endpoint
//!
//! Accepts `multipart/form-data` posts and answers with a JSON summary of
//! the fields and spooled files. Nothing downstream takes ownership of the
//! spooled files, so they are removed once the summary is built.

use std::fmt::Display;

use bytes::Bytes;
use futures_util::Stream;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use tracing::info;

use crate::error::HttpError;
use crate::http::{build_json_response, Body, IncomingRequest};
use crate::multipart::{MultipartIngestor, RequestBody, TempStore};

/// Run the ingestor over the request body
pub async fn handle_upload<T, S, E>(
    request: &IncomingRequest,
    body: RequestBody<S>,
    ingestor: &MultipartIngestor<T>,
) -> Result<Response<Body>, HttpError>
where
    T: TempStore,
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Display,
{
    if !request.is_multipart() {
        return Err(HttpError::BadRequest(
            "Expected a multipart/form-data body".to_string(),
        ));
    }
    let content_type = request
        .header(header::CONTENT_TYPE.as_str())
        .unwrap_or_default();

    check_declared_length(request, ingestor)?;

    let form = ingestor.parse(content_type, body).await?;

    let file_count: usize = form.files.values().map(Vec::len).sum();
    info!(
        peer = %request.ip(),
        fields = form.fields.len(),
        files = file_count,
        "Multipart upload stored"
    );

    let mut response = build_json_response(StatusCode::CREATED, &form);
    ingestor.release(&form).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

/// Refuse bodies whose declared length is already over the limit
fn check_declared_length<T: TempStore>(
    request: &IncomingRequest,
    ingestor: &MultipartIngestor<T>,
) -> Result<(), HttpError> {
    let Some(limit) = ingestor.limits().body_size else {
        return Ok(());
    };
    let declared = request
        .header(header::CONTENT_LENGTH.as_str())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match declared {
        Some(size) if size > limit => Err(HttpError::internal(format!(
            "Request body too large: {size} bytes (max: {limit})"
        ))),
        _ => Ok(()),
    }
}
