//! Conditional request handling
//!
//! Freshness (`If-None-Match` / `If-Modified-Since`), preconditions
//! (`If-Match` / `If-Unmodified-Since`) and `If-Range` evaluation.
//! Dates are compared at one-second granularity, the resolution of an
//! HTTP-date.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use hyper::header::{self, HeaderMap, HeaderName};
use hyper::{Method, StatusCode};

use crate::error::HttpError;

/// Validators sent by the client
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestValidators<'a> {
    pub if_none_match: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
    pub cache_control: Option<&'a str>,
}

impl<'a> RequestValidators<'a> {
    pub fn from_headers(headers: &'a HeaderMap) -> Self {
        Self {
            if_none_match: header_str(headers, &header::IF_NONE_MATCH),
            if_modified_since: header_str(headers, &header::IF_MODIFIED_SINCE),
            cache_control: header_str(headers, &header::CACHE_CONTROL),
        }
    }
}

/// Validators of the candidate response
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseValidators<'a> {
    pub etag: Option<&'a str>,
    pub last_modified: Option<&'a str>,
}

impl<'a> ResponseValidators<'a> {
    pub fn from_headers(headers: &'a HeaderMap) -> Self {
        Self {
            etag: header_str(headers, &header::ETAG),
            last_modified: header_str(headers, &header::LAST_MODIFIED),
        }
    }
}

/// Whether the client's cached representation is still current
///
/// `If-None-Match` takes precedence: when present, `If-Modified-Since` is
/// not consulted. A `no-cache` request directive always forces a full
/// response.
pub fn is_fresh(request: &RequestValidators<'_>, response: &ResponseValidators<'_>) -> bool {
    if request.if_none_match.is_none() && request.if_modified_since.is_none() {
        return false;
    }

    if request.cache_control.is_some_and(has_no_cache) {
        return false;
    }

    if let Some(if_none_match) = request.if_none_match {
        if if_none_match.trim() == "*" {
            return true;
        }
        return response
            .etag
            .is_some_and(|etag| etag_list_contains(if_none_match, etag, false));
    }

    let (Some(since), Some(last_modified)) = (
        request.if_modified_since.and_then(parse_http_date),
        response.last_modified.and_then(parse_http_date),
    ) else {
        return false;
    };

    last_modified.timestamp() <= since.timestamp()
}

/// Freshness of a response about to be sent for `method`
///
/// Only `GET`/`HEAD` with a 2xx or 304 status can be fresh.
pub fn is_request_fresh(
    method: &Method,
    status: StatusCode,
    request: &HeaderMap,
    response: &HeaderMap,
) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }
    if !status.is_success() && status != StatusCode::NOT_MODIFIED {
        return false;
    }

    is_fresh(
        &RequestValidators::from_headers(request),
        &ResponseValidators::from_headers(response),
    )
}

/// Evaluate `If-Match` and `If-Unmodified-Since`
///
/// `If-Match` uses strong comparison. `If-Unmodified-Since` is only
/// consulted when `If-Match` is absent; an unparseable date is ignored.
pub fn check_preconditions(
    request: &HeaderMap,
    etag: Option<&str>,
    last_modified: Option<SystemTime>,
) -> Result<(), HttpError> {
    if let Some(if_match) = header_str(request, &header::IF_MATCH) {
        let matched = etag.is_some_and(|etag| {
            if_match.trim() == "*" || etag_list_contains(if_match, etag, true)
        });
        return if matched {
            Ok(())
        } else {
            Err(HttpError::PreconditionFailed)
        };
    }

    if let Some(since) = header_str(request, &header::IF_UNMODIFIED_SINCE).and_then(parse_http_date)
    {
        if last_modified.is_some_and(|lm| unix_seconds(lm) > since.timestamp()) {
            return Err(HttpError::PreconditionFailed);
        }
    }

    Ok(())
}

/// Whether a `Range` header may be honoured given `If-Range`
///
/// An entity tag must match strongly; a date must not predate the last
/// modification.
pub fn is_range_fresh(
    request: &HeaderMap,
    etag: Option<&str>,
    last_modified: Option<SystemTime>,
) -> bool {
    let Some(if_range) = header_str(request, &header::IF_RANGE) else {
        return true;
    };
    let if_range = if_range.trim();

    if if_range.contains('"') {
        return etag.is_some_and(|etag| !is_weak(etag) && !is_weak(if_range) && if_range == etag);
    }

    match (parse_http_date(if_range), last_modified) {
        (Some(date), Some(lm)) => unix_seconds(lm) <= date.timestamp(),
        _ => false,
    }
}

/// Entity tag derived from file size and modification time
///
/// Both parts are written in hex (`"size-mtime_millis"`), so every process
/// and build agrees on the tag for the same file.
///
/// # Examples
/// ```
/// use std::time::{Duration, UNIX_EPOCH};
/// use quay::http::conditional::file_etag;
///
/// let mtime = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
/// assert_eq!(file_etag(42, Some(mtime)), "\"2a-18bcfe56800\"");
/// ```
pub fn file_etag(size: u64, modified: Option<SystemTime>) -> String {
    let millis = modified
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis());
    format!("\"{size:x}-{millis:x}\"")
}

/// Format a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`)
pub fn format_http_date(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP-date
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn unix_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn has_no_cache(cache_control: &str) -> bool {
    cache_control
        .split(',')
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-cache"))
}

fn is_weak(tag: &str) -> bool {
    tag.starts_with("W/")
}

fn etag_list_contains(list: &str, etag: &str, strong: bool) -> bool {
    if strong && is_weak(etag) {
        return false;
    }
    let opaque = etag.trim_start_matches("W/");
    list.split(',').map(str::trim).any(|candidate| {
        if strong {
            !is_weak(candidate) && candidate == etag
        } else {
            candidate.trim_start_matches("W/") == opaque
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use std::time::Duration;

    const LAST_MODIFIED: &str = "Tue, 14 Nov 2023 22:13:20 GMT";

    fn mtime() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn headers(pairs: &[(HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_http_date_round_trip() {
        assert_eq!(format_http_date(mtime()), LAST_MODIFIED);
        let parsed = parse_http_date(LAST_MODIFIED).unwrap();
        assert_eq!(parsed.timestamp(), 1_700_000_000);
        assert!(parse_http_date("yesterday").is_none());
    }

    #[test]
    fn test_no_validators_is_stale() {
        let res = ResponseValidators {
            etag: Some("\"a\""),
            last_modified: Some(LAST_MODIFIED),
        };
        assert!(!is_fresh(&RequestValidators::default(), &res));
    }

    #[test]
    fn test_etag_match() {
        let res = ResponseValidators {
            etag: Some("\"abc\""),
            last_modified: None,
        };
        let matching = RequestValidators {
            if_none_match: Some("\"xyz\", W/\"abc\""),
            ..Default::default()
        };
        let other = RequestValidators {
            if_none_match: Some("\"xyz\""),
            ..Default::default()
        };
        let star = RequestValidators {
            if_none_match: Some("*"),
            ..Default::default()
        };
        assert!(is_fresh(&matching, &res));
        assert!(!is_fresh(&other, &res));
        assert!(is_fresh(&star, &res));
    }

    #[test]
    fn test_etag_mismatch_ignores_modified_since() {
        let res = ResponseValidators {
            etag: Some("\"abc\""),
            last_modified: Some(LAST_MODIFIED),
        };
        let req = RequestValidators {
            if_none_match: Some("\"old\""),
            if_modified_since: Some(LAST_MODIFIED),
            cache_control: None,
        };
        assert!(!is_fresh(&req, &res));
    }

    #[test]
    fn test_modified_since() {
        let res = ResponseValidators {
            etag: None,
            last_modified: Some(LAST_MODIFIED),
        };
        let same = RequestValidators {
            if_modified_since: Some(LAST_MODIFIED),
            ..Default::default()
        };
        let older = RequestValidators {
            if_modified_since: Some("Mon, 13 Nov 2023 00:00:00 GMT"),
            ..Default::default()
        };
        assert!(is_fresh(&same, &res));
        assert!(!is_fresh(&older, &res));
    }

    #[test]
    fn test_no_cache_forces_stale() {
        let res = ResponseValidators {
            etag: Some("\"abc\""),
            last_modified: None,
        };
        let req = RequestValidators {
            if_none_match: Some("\"abc\""),
            if_modified_since: None,
            cache_control: Some("max-age=0, no-cache"),
        };
        assert!(!is_fresh(&req, &res));
    }

    #[test]
    fn test_request_fresh_only_for_safe_methods() {
        let request = headers(&[(header::IF_NONE_MATCH, "\"abc\"")]);
        let response = headers(&[(header::ETAG, "\"abc\"")]);
        assert!(is_request_fresh(&Method::GET, StatusCode::OK, &request, &response));
        assert!(is_request_fresh(&Method::HEAD, StatusCode::OK, &request, &response));
        assert!(!is_request_fresh(&Method::POST, StatusCode::OK, &request, &response));
        assert!(!is_request_fresh(
            &Method::GET,
            StatusCode::NOT_FOUND,
            &request,
            &response
        ));
    }

    #[test]
    fn test_if_match() {
        let etag = Some("\"abc\"");
        assert!(check_preconditions(&headers(&[(header::IF_MATCH, "\"abc\"")]), etag, None).is_ok());
        assert!(check_preconditions(&headers(&[(header::IF_MATCH, "*")]), etag, None).is_ok());
        assert!(matches!(
            check_preconditions(&headers(&[(header::IF_MATCH, "W/\"abc\"")]), etag, None),
            Err(HttpError::PreconditionFailed)
        ));
        assert!(matches!(
            check_preconditions(&headers(&[(header::IF_MATCH, "*")]), None, None),
            Err(HttpError::PreconditionFailed)
        ));
    }

    #[test]
    fn test_if_unmodified_since() {
        let before = headers(&[(header::IF_UNMODIFIED_SINCE, "Mon, 13 Nov 2023 00:00:00 GMT")]);
        let after = headers(&[(header::IF_UNMODIFIED_SINCE, LAST_MODIFIED)]);
        let garbage = headers(&[(header::IF_UNMODIFIED_SINCE, "soon")]);
        assert!(check_preconditions(&before, None, Some(mtime())).is_err());
        assert!(check_preconditions(&after, None, Some(mtime())).is_ok());
        assert!(check_preconditions(&garbage, None, Some(mtime())).is_ok());
    }

    #[test]
    fn test_if_range() {
        let etag = Some("\"abc\"");
        assert!(is_range_fresh(&HeaderMap::new(), etag, None));
        assert!(is_range_fresh(&headers(&[(header::IF_RANGE, "\"abc\"")]), etag, None));
        assert!(!is_range_fresh(&headers(&[(header::IF_RANGE, "\"old\"")]), etag, None));
        assert!(is_range_fresh(
            &headers(&[(header::IF_RANGE, LAST_MODIFIED)]),
            etag,
            Some(mtime())
        ));
        assert!(!is_range_fresh(
            &headers(&[(header::IF_RANGE, "Mon, 13 Nov 2023 00:00:00 GMT")]),
            etag,
            Some(mtime())
        ));
    }

    #[test]
    fn test_file_etag_changes_with_mtime() {
        let a = file_etag(10, Some(mtime()));
        let b = file_etag(10, Some(mtime() + Duration::from_secs(1)));
        assert_ne!(a, b);
        assert_eq!(a, "\"a-18bcfe56800\"");
        assert_eq!(b, "\"a-18bcfe56be8\"");
    }

    #[test]
    fn test_file_etag_without_mtime() {
        assert_eq!(file_etag(0, None), "\"0-0\"");
        assert_eq!(file_etag(255, None), file_etag(255, None));
    }
}
