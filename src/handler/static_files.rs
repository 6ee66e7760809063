//! Static file serving module
//!
//! Maps a request path under the configured root directory, picks a
//! pre-compressed variant and streams it. Anything that is not a servable
//! file is handed to the next handler.

use std::future::Future;
use std::path::{Path, PathBuf};

use hyper::{Method, Response};
use tracing::{debug, error, warn};

use super::fs::{FileProbe, TokioFs};
use super::stream::{stream_file, Delivery, FileTarget, StreamOptions};
use super::variant::select_variant;
use crate::config::{CompressionVariant, FilesConfig};
use crate::error::HttpError;
use crate::http::{Body, IncomingRequest};

/// Resolved location of a requested file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFileCandidate {
    pub absolute_path: PathBuf,
    pub root_dir: PathBuf,
    pub requested_path: String,
}

/// Static asset middleware
pub struct StaticFiles<P: FileProbe = TokioFs> {
    root: PathBuf,
    probe: P,
    compression: Vec<CompressionVariant>,
    options: StreamOptions,
}

impl StaticFiles<TokioFs> {
    pub fn from_config(config: &FilesConfig) -> Self {
        Self::new(
            config.root_dir.clone(),
            TokioFs,
            config.compression.clone(),
            StreamOptions::from_config(config),
        )
    }
}

impl<P: FileProbe> StaticFiles<P> {
    pub const fn new(
        root: PathBuf,
        probe: P,
        compression: Vec<CompressionVariant>,
        options: StreamOptions,
    ) -> Self {
        Self {
            root,
            probe,
            compression,
            options,
        }
    }

    /// Serve the requested file or delegate to `next`
    ///
    /// Traversal attempts, missing files, directories and filesystem errors
    /// while probing all delegate. Errors from streaming a found file
    /// (preconditions, I/O) are returned.
    pub async fn handle<F, Fut>(
        &self,
        request: &IncomingRequest,
        next: F,
    ) -> Result<Response<Body>, HttpError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Response<Body>, HttpError>>,
    {
        if !matches!(*request.method(), Method::GET | Method::HEAD) {
            return next().await;
        }

        let Some(candidate) = self.resolve(request).await else {
            return next().await;
        };

        let selected = select_variant(
            &self.probe,
            &candidate.absolute_path,
            &request.accepted_encodings(),
            &self.compression,
        )
        .await;

        match self.probe.stat(&selected.path).await {
            Ok(stat) if !stat.is_dir => {}
            Ok(_) => {
                debug!(path = %candidate.requested_path, "Directory requested, no static file");
                return next().await;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %candidate.requested_path, "No static file found");
                return next().await;
            }
            Err(e) => {
                error!(path = %selected.path.display(), error = %e, "Failed to probe static file");
                return next().await;
            }
        }

        // Symlinks must not lead out of the root either
        if !self.is_inside_root(&selected.path, &candidate.root_dir).await {
            warn!(path = %candidate.requested_path, "Static file resolves outside root, skipped");
            return next().await;
        }

        let target = FileTarget {
            path: &selected.path,
            logical_path: &candidate.absolute_path,
            encoding: selected.encoding.as_deref(),
        };

        match stream_file(&self.probe, request, target, &self.options).await {
            Ok(delivery) => {
                watch_delivery(candidate.requested_path, delivery.completion);
                Ok(delivery.response)
            }
            // removed between probe and open
            Err(HttpError::NotFound(_)) => next().await,
            Err(e) => Err(e),
        }
    }

    /// Map the request path onto the root directory
    ///
    /// Returns `None` for undecodable paths, NUL bytes, trailing slashes and
    /// any path whose normalised form leaves the root.
    pub async fn resolve(&self, request: &IncomingRequest) -> Option<StaticFileCandidate> {
        let requested_path = request.decoded_path()?;
        if requested_path.contains('\0') || requested_path.ends_with('/') {
            return None;
        }

        let root_dir = match self.probe.canonicalize(&self.root).await {
            Ok(root) => root,
            Err(e) => {
                error!(root = %self.root.display(), error = %e, "Static root is not accessible");
                return None;
            }
        };

        let Some(absolute_path) = join_within(&root_dir, &requested_path) else {
            warn!(path = %requested_path, peer = %request.ip(), "Path traversal attempt blocked");
            return None;
        };

        Some(StaticFileCandidate {
            absolute_path,
            root_dir,
            requested_path,
        })
    }

    async fn is_inside_root(&self, path: &Path, root: &Path) -> bool {
        match self.probe.canonicalize(path).await {
            Ok(canonical) => canonical.starts_with(root),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to canonicalize static file");
                false
            }
        }
    }
}

/// Lexically join `requested` onto `root`, rejecting escapes
fn join_within(root: &Path, requested: &str) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    for segment in requested.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if joined == root {
                    return None;
                }
                joined.pop();
            }
            name => joined.push(name),
        }
    }

    (joined != root && joined.starts_with(root)).then_some(joined)
}

/// Log how a streamed file ended once the transport is done with it
fn watch_delivery(path: String, delivery: Delivery) {
    tokio::spawn(async move {
        match delivery.finished().await {
            Ok(()) => debug!(path = %path, "Static file delivered"),
            Err(e) if e.is_client_error() => {
                debug!(path = %path, reason = %e, "Static file delivery aborted");
            }
            Err(e) => error!(path = %path, error = %e, "Static file delivery failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::fs::testing::MemoryFs;
    use crate::http::build_text_response;
    use crate::trust::{ResolvedOrigin, Scheme};
    use http_body_util::BodyExt;
    use hyper::header::{self, HeaderMap, HeaderValue};
    use hyper::StatusCode;

    const NEXT: StatusCode = StatusCode::IM_A_TEAPOT;

    fn middleware(fs: MemoryFs) -> StaticFiles<MemoryFs> {
        StaticFiles::new(
            PathBuf::from("/srv"),
            fs,
            vec![
                CompressionVariant::new(".br", "br"),
                CompressionVariant::new(".gz", "gzip"),
            ],
            StreamOptions::default(),
        )
    }

    fn tree() -> MemoryFs {
        MemoryFs::new()
            .dir("/srv")
            .file("/srv/index.html", b"<h1>hi</h1>")
            .file("/srv/app.js", b"console.log(1)")
            .file("/srv/app.js.gz", b"GZ")
            .dir("/srv/docs")
            .file("/secret", b"top secret")
    }

    fn request(method: Method, uri: &str, pairs: &[(&str, &str)]) -> IncomingRequest {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        let origin = ResolvedOrigin {
            ip: "127.0.0.1".parse().unwrap(),
            ips: Vec::new(),
            scheme: Scheme::Http,
            hostname: Some("localhost".to_string()),
        };
        IncomingRequest::new(method, uri.parse().unwrap(), headers, origin)
    }

    async fn next() -> Result<Response<Body>, HttpError> {
        Ok(build_text_response(NEXT, "next"))
    }

    async fn body(response: Response<Body>) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let statics = middleware(tree());
        let response = statics
            .handle(&request(Method::GET, "/index.html", &[]), next)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        assert_eq!(body(response).await, b"<h1>hi</h1>");
    }

    #[tokio::test]
    async fn test_gzip_variant_selected() {
        let statics = middleware(tree());
        let req = request(Method::GET, "/app.js", &[("accept-encoding", "br, gzip")]);
        let response = statics.handle(&req, next).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/javascript; charset=utf-8"
        );
        assert_eq!(body(response).await, b"GZ");
    }

    #[tokio::test]
    async fn test_not_modified_replay() {
        let statics = middleware(tree());
        let first = statics
            .handle(&request(Method::GET, "/index.html", &[]), next)
            .await
            .unwrap();
        let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

        let replay = request(Method::GET, "/index.html", &[("if-none-match", &etag)]);
        let second = statics.handle(&replay, next).await.unwrap();
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert!(body(second).await.is_empty());
    }

    #[tokio::test]
    async fn test_traversal_delegates() {
        let statics = middleware(tree());
        for uri in ["/../secret", "/docs/../../secret", "/%2e%2e/secret", "/docs/%2E%2E/..%2Fsecret"] {
            let response = statics
                .handle(&request(Method::GET, uri, &[]), next)
                .await
                .unwrap();
            assert_eq!(response.status(), NEXT, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_inner_dot_segments_allowed() {
        let statics = middleware(tree());
        let response = statics
            .handle(&request(Method::GET, "/docs/../index.html", &[]), next)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_directory_and_root_delegate() {
        let statics = middleware(tree());
        for uri in ["/missing.txt", "/docs", "/docs/", "/"] {
            let response = statics
                .handle(&request(Method::GET, uri, &[]), next)
                .await
                .unwrap();
            assert_eq!(response.status(), NEXT, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_probe_error_delegates() {
        let mut fs = tree();
        fs.fail_stat = true;
        let statics = middleware(fs);
        let response = statics
            .handle(&request(Method::GET, "/index.html", &[]), next)
            .await
            .unwrap();
        assert_eq!(response.status(), NEXT);
    }

    #[tokio::test]
    async fn test_other_methods_delegate() {
        let statics = middleware(tree());
        let response = statics
            .handle(&request(Method::POST, "/index.html", &[]), next)
            .await
            .unwrap();
        assert_eq!(response.status(), NEXT);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let statics = middleware(tree());
        let req = request(Method::GET, "/index.html", &[("range", "bytes=500-")]);
        let response = statics.handle(&req, next).await.unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */11");
    }

    #[test]
    fn test_join_within() {
        let root = Path::new("/srv");
        assert_eq!(join_within(root, "/a/b.txt"), Some(PathBuf::from("/srv/a/b.txt")));
        assert_eq!(join_within(root, "/a/./b/../c"), Some(PathBuf::from("/srv/a/c")));
        assert_eq!(join_within(root, "/../etc/passwd"), None);
        assert_eq!(join_within(root, "/a/../../x"), None);
        assert_eq!(join_within(root, "/"), None);
    }
}
