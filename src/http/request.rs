//! Inbound request model
//!
//! Method, target, headers and the resolved origin of one request, with the
//! header-derived helpers the handlers need.

use std::borrow::Cow;
use std::net::IpAddr;

use hyper::header::{self, HeaderMap, HeaderName};
use hyper::{Method, StatusCode, Uri};
use percent_encoding::percent_decode_str;

use super::conditional;
use super::negotiate;
use super::range::{self, RangeOutcome};
use crate::trust::{ResolvedOrigin, Scheme};

/// One inbound request after origin resolution
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    origin: ResolvedOrigin,
}

impl IncomingRequest {
    pub const fn new(method: Method, uri: Uri, headers: HeaderMap, origin: ResolvedOrigin) -> Self {
        Self {
            method,
            uri,
            headers,
            origin,
        }
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Raw (still percent-encoded) path
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Percent-decoded path, `None` when it is not valid UTF-8 once decoded
    pub fn decoded_path(&self) -> Option<String> {
        percent_decode_str(self.uri.path())
            .decode_utf8()
            .ok()
            .map(Cow::into_owned)
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive header lookup
    ///
    /// `Referer` and `Referrer` are interchangeable.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        let name = match name.as_str() {
            "referrer" => "referer",
            other => other,
        };
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub const fn origin(&self) -> &ResolvedOrigin {
        &self.origin
    }

    pub const fn ip(&self) -> IpAddr {
        self.origin.ip
    }

    pub fn ips(&self) -> &[IpAddr] {
        &self.origin.ips
    }

    pub const fn scheme(&self) -> Scheme {
        self.origin.scheme
    }

    pub fn is_secure(&self) -> bool {
        self.origin.is_secure()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.origin.hostname.as_deref()
    }

    /// Media type of the body without parameters, lowercased
    pub fn content_type(&self) -> Option<String> {
        let value = self.headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let media = value.split(';').next()?.trim();
        (!media.is_empty()).then(|| media.to_ascii_lowercase())
    }

    /// `charset` parameter of `Content-Type`, lowercased and unquoted
    pub fn charset(&self) -> Option<String> {
        let value = self.headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        value.split(';').skip(1).find_map(|param| {
            let (key, val) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| val.trim().trim_matches('"').to_ascii_lowercase())
        })
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type()
            .is_some_and(|t| t.starts_with("multipart/"))
    }

    pub fn is_method_safe(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        )
    }

    pub fn is_method_cacheable(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD)
    }

    /// Content codings from `Accept-Encoding`, most preferred first
    pub fn accepted_encodings(&self) -> negotiate::AcceptedEncodings {
        negotiate::accepted_encodings(self.header_value(&header::ACCEPT_ENCODING))
    }

    /// Parse `Range` for a representation of `size` bytes
    pub fn range(&self, size: u64, combine: bool) -> RangeOutcome {
        range::parse_range(self.header_value(&header::RANGE), size, combine)
    }

    /// Whether a response with `status` and `response_headers` is fresh for
    /// this request
    pub fn is_fresh(&self, status: StatusCode, response_headers: &HeaderMap) -> bool {
        conditional::is_request_fresh(&self.method, status, &self.headers, response_headers)
    }

    pub fn is_stale(&self, status: StatusCode, response_headers: &HeaderMap) -> bool {
        !self.is_fresh(status, response_headers)
    }

    fn header_value(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
