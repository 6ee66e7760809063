//! File streaming
//!
//! Turns a file on disk into a response: validators and content headers,
//! precondition and freshness short-circuits, single byte ranges, and a
//! streamed body whose outcome is reported through a [`Delivery`].

use std::io::{self, SeekFrom};
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use super::fs::FileProbe;
use crate::config::{DispositionType, FilesConfig};
use crate::error::HttpError;
use crate::http::body::{self, Body};
use crate::http::conditional::{self, file_etag, format_http_date};
use crate::http::{build_304_response, build_416_response, disposition, mime};
use crate::http::{IncomingRequest, RangeOutcome};

const CLIENT_ABORTED: &str = "client closed the connection before the file was delivered";

/// Header policy for streamed files
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// `Cache-Control: public, max-age=N`
    pub max_age: u32,
    pub disposition: DispositionType,
    /// Derive `ETag` from size and mtime
    pub etag: bool,
    /// Send `Last-Modified` from mtime
    pub last_modified: bool,
}

impl StreamOptions {
    pub const fn from_config(config: &FilesConfig) -> Self {
        Self {
            max_age: config.max_age,
            disposition: config.disposition,
            etag: true,
            last_modified: true,
        }
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_age: 3600,
            disposition: DispositionType::Inline,
            etag: true,
            last_modified: true,
        }
    }
}

/// File to stream
#[derive(Debug, Clone, Copy)]
pub struct FileTarget<'a> {
    /// File actually read, possibly a compressed variant
    pub path: &'a Path,
    /// Path the client asked for; drives `Content-Type` and the file name
    pub logical_path: &'a Path,
    /// Content coding of `path`
    pub encoding: Option<&'a str>,
}

/// Response ready to send plus the outcome of its body
pub struct FileDelivery {
    pub response: Response<Body>,
    pub completion: Delivery,
}

/// Resolves exactly once when the response body is finished
///
/// `Ok(())` when every byte was handed to the transport, `BadRequest` when
/// the body was dropped early (client went away), `InternalServerError`
/// when reading the file failed mid-stream.
#[derive(Debug)]
pub struct Delivery {
    receiver: Option<oneshot::Receiver<Result<(), HttpError>>>,
}

impl Delivery {
    /// Delivery of a response without a streamed body
    const fn complete() -> Self {
        Self { receiver: None }
    }

    pub async fn finished(self) -> Result<(), HttpError> {
        match self.receiver {
            None => Ok(()),
            Some(receiver) => receiver
                .await
                .unwrap_or_else(|_| Err(HttpError::BadRequest(CLIENT_ABORTED.to_string()))),
        }
    }
}

/// Build the response for `target`
///
/// Fails with `NotFound` when the path is missing or a directory and with
/// `PreconditionFailed` when `If-Match` / `If-Unmodified-Since` do not
/// hold. Unsatisfiable ranges produce a 416 response, not an error.
pub async fn stream_file<P: FileProbe>(
    probe: &P,
    request: &IncomingRequest,
    target: FileTarget<'_>,
    options: &StreamOptions,
) -> Result<FileDelivery, HttpError> {
    let stat = probe
        .stat(target.path)
        .await
        .map_err(|e| open_error(target.path, e))?;
    if stat.is_dir {
        return Err(HttpError::NotFound(target.logical_path.display().to_string()));
    }

    let etag = options.etag.then(|| file_etag(stat.size, stat.modified));
    let last_modified = stat.modified.filter(|_| options.last_modified);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(mime::content_type_for(target.logical_path)),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    insert(
        &mut headers,
        header::CACHE_CONTROL,
        format!("public, max-age={}", options.max_age),
    )?;
    if let Some(etag) = &etag {
        insert(&mut headers, header::ETAG, etag.clone())?;
    }
    if let Some(modified) = last_modified {
        insert(&mut headers, header::LAST_MODIFIED, format_http_date(modified))?;
    }
    if let Some(encoding) = target.encoding {
        insert(&mut headers, header::CONTENT_ENCODING, encoding.to_string())?;
        headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
    }
    insert(
        &mut headers,
        header::CONTENT_DISPOSITION,
        disposition::content_disposition(options.disposition, target.logical_path),
    )?;

    conditional::check_preconditions(request.headers(), etag.as_deref(), last_modified)?;

    if request.is_fresh(StatusCode::OK, &headers) {
        return Ok(FileDelivery {
            response: build_304_response(headers),
            completion: Delivery::complete(),
        });
    }

    let mut status = StatusCode::OK;
    let mut offset = 0;
    let mut length = stat.size;

    if conditional::is_range_fresh(request.headers(), etag.as_deref(), last_modified) {
        match request.range(stat.size, true) {
            RangeOutcome::Satisfiable(ranges) if ranges.len() == 1 => {
                let range = ranges[0];
                status = StatusCode::PARTIAL_CONTENT;
                offset = range.start;
                length = range.len();
                insert(&mut headers, header::CONTENT_RANGE, range.content_range(stat.size))?;
            }
            // several ranges are answered with the whole file
            RangeOutcome::Satisfiable(_) | RangeOutcome::None => {}
            RangeOutcome::NotSatisfiable | RangeOutcome::Malformed => {
                return Ok(FileDelivery {
                    response: build_416_response(stat.size),
                    completion: Delivery::complete(),
                });
            }
        }
    }

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    if request.is_head() || length == 0 {
        return Ok(FileDelivery {
            response: assemble(status, headers, body::empty()),
            completion: Delivery::complete(),
        });
    }

    let mut reader = probe
        .open(target.path)
        .await
        .map_err(|e| open_error(target.path, e))?;
    if offset > 0 {
        reader
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| HttpError::internal_io("Failed to seek file", e))?;
    }

    let (sender, receiver) = oneshot::channel();
    let stream = TrackedStream {
        inner: ReaderStream::new(reader.take(length)),
        outcome: Some(sender),
    };

    Ok(FileDelivery {
        response: assemble(status, headers, StreamBody::new(stream).boxed()),
        completion: Delivery {
            receiver: Some(receiver),
        },
    })
}

fn assemble(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: String) -> Result<(), HttpError> {
    let value = HeaderValue::try_from(value)
        .map_err(|e| HttpError::internal(format!("Invalid {name} header value: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

fn open_error(path: &Path, error: io::Error) -> HttpError {
    if error.kind() == io::ErrorKind::NotFound {
        HttpError::NotFound(path.display().to_string())
    } else {
        HttpError::internal_io(format!("Failed to open {}", path.display()), error)
    }
}

/// File body that reports how it ended
struct TrackedStream<R> {
    inner: ReaderStream<R>,
    outcome: Option<oneshot::Sender<Result<(), HttpError>>>,
}

impl<R> TrackedStream<R> {
    fn resolve(&mut self, result: Result<(), HttpError>) {
        if let Some(sender) = self.outcome.take() {
            // receiver may already be gone
            let _ = sender.send(result);
        }
    }
}

impl<R: AsyncRead + Unpin> Stream for TrackedStream<R> {
    type Item = Result<Frame<Bytes>, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(chunk)) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Some(Err(e)) => {
                let forwarded = io::Error::new(e.kind(), e.to_string());
                this.resolve(Err(HttpError::internal_io("Failed to read file", e)));
                Poll::Ready(Some(Err(forwarded)))
            }
            None => {
                this.resolve(Ok(()));
                Poll::Ready(None)
            }
        }
    }
}

impl<R> Drop for TrackedStream<R> {
    fn drop(&mut self) {
        self.resolve(Err(HttpError::BadRequest(CLIENT_ABORTED.to_string())));
    }
}
