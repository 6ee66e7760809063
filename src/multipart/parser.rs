//! Incremental `multipart/form-data` parser
//!
//! Bytes are pushed in arbitrary chunks; events are pulled until the parser
//! needs more input. Part bodies are emitted as soon as they cannot be the
//! start of a delimiter, so a file part never has to fit in memory.

use bytes::{Buf, Bytes, BytesMut};
use percent_encoding::percent_decode_str;
use thiserror::Error;

use crate::error::HttpError;

/// RFC 2046 limit
const MAX_BOUNDARY_LEN: usize = 70;
/// Upper bound for one part's header block
const MAX_HEADER_BLOCK: usize = 16 * 1024;

/// Malformed multipart input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("Content-Type is not multipart/form-data")]
    NotMultipart,
    #[error("missing multipart boundary")]
    MissingBoundary,
    #[error("invalid multipart boundary")]
    InvalidBoundary,
    #[error("part headers exceed {MAX_HEADER_BLOCK} bytes")]
    HeadersTooLarge,
    #[error("invalid part headers: {0}")]
    InvalidPartHeaders(String),
    #[error("malformed delimiter after part body")]
    InvalidDelimiter,
    #[error("unexpected end of multipart body")]
    UnexpectedEof,
}

impl From<MultipartError> for HttpError {
    fn from(error: MultipartError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

/// Extract the boundary from a `multipart/form-data` Content-Type value
///
/// # Examples
/// ```
/// use quay::multipart::parse_boundary;
///
/// assert_eq!(
///     parse_boundary("multipart/form-data; boundary=\"----abc\"").unwrap(),
///     "----abc"
/// );
/// assert!(parse_boundary("text/plain").is_err());
/// ```
pub fn parse_boundary(content_type: &str) -> Result<String, MultipartError> {
    let mut params = content_type.split(';');
    let media = params.next().unwrap_or_default().trim();
    if !media.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::NotMultipart);
    }

    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = value.trim().trim_matches('"');
            if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
                return Err(MultipartError::InvalidBoundary);
            }
            return Ok(boundary.to_string());
        }
    }

    Err(MultipartError::MissingBoundary)
}

/// Headers of one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeaders {
    pub name: String,
    /// Present for file parts, already reduced to a base name
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl PartHeaders {
    pub const fn is_file(&self) -> bool {
        self.filename.is_some()
    }
}

/// Parser output
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    PartStart(PartHeaders),
    Data(Bytes),
    PartEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Headers,
    Body,
    Done,
}

#[derive(Debug)]
pub struct MultipartParser {
    /// `--boundary`
    dash_boundary: Vec<u8>,
    /// `\r\n--boundary`
    delimiter: Vec<u8>,
    buffer: BytesMut,
    state: State,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        let dash_boundary = format!("--{boundary}").into_bytes();
        let mut delimiter = b"\r\n".to_vec();
        delimiter.extend_from_slice(&dash_boundary);
        Self {
            dash_boundary,
            delimiter,
            buffer: BytesMut::new(),
            state: State::Preamble,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.state != State::Done {
            self.buffer.extend_from_slice(chunk);
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Next event, or `Ok(None)` when more input is needed
    pub fn next_event(&mut self) -> Result<Option<Event>, MultipartError> {
        loop {
            match self.state {
                State::Preamble => {
                    if !self.skip_preamble()? {
                        return Ok(None);
                    }
                }
                State::Headers => return self.read_headers(),
                State::Body => return self.read_body(),
                State::Done => {
                    // epilogue is ignored
                    self.buffer.clear();
                    return Ok(None);
                }
            }
        }
    }

    /// Called once the input is exhausted
    pub fn finish(&self) -> Result<(), MultipartError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(MultipartError::UnexpectedEof)
        }
    }

    /// Consume everything up to and including the first boundary line
    fn skip_preamble(&mut self) -> Result<bool, MultipartError> {
        let Some(pos) = find(&self.buffer, &self.dash_boundary) else {
            let keep = self.dash_boundary.len();
            if self.buffer.len() > keep {
                self.buffer.advance(self.buffer.len() - keep);
            }
            return Ok(false);
        };

        let after = pos + self.dash_boundary.len();
        let Some((next, len)) = state_after_delimiter(&self.buffer[after..])? else {
            return Ok(false);
        };
        self.buffer.advance(after + len);
        self.state = next;
        Ok(true)
    }

    fn read_headers(&mut self) -> Result<Option<Event>, MultipartError> {
        let (block_len, skip) = if self.buffer.starts_with(b"\r\n") {
            (0, 2)
        } else if let Some(end) = find(&self.buffer, b"\r\n\r\n") {
            (end, end + 4)
        } else {
            if self.buffer.len() > MAX_HEADER_BLOCK {
                return Err(MultipartError::HeadersTooLarge);
            }
            return Ok(None);
        };

        if block_len > MAX_HEADER_BLOCK {
            return Err(MultipartError::HeadersTooLarge);
        }

        let headers = parse_part_headers(&self.buffer[..block_len])?;
        self.buffer.advance(skip);
        self.state = State::Body;
        Ok(Some(Event::PartStart(headers)))
    }

    fn read_body(&mut self) -> Result<Option<Event>, MultipartError> {
        match find(&self.buffer, &self.delimiter) {
            Some(0) => {
                let after = self.delimiter.len();
                let Some((next, len)) = state_after_delimiter(&self.buffer[after..])? else {
                    return Ok(None);
                };
                self.buffer.advance(after + len);
                self.state = next;
                Ok(Some(Event::PartEnd))
            }
            Some(pos) => Ok(Some(Event::Data(self.buffer.split_to(pos).freeze()))),
            None => {
                // the tail might be the beginning of a delimiter
                let safe = self
                    .buffer
                    .len()
                    .saturating_sub(self.delimiter.len() - 1);
                if safe == 0 {
                    Ok(None)
                } else {
                    Ok(Some(Event::Data(self.buffer.split_to(safe).freeze())))
                }
            }
        }
    }
}

/// Classify what follows a boundary
///
/// Transport padding (spaces and tabs) is skipped, then `\r\n` continues
/// with another part and `--` closes the body. Returns the state and the
/// number of bytes consumed, or `None` while the marker is incomplete.
fn state_after_delimiter(rest: &[u8]) -> Result<Option<(State, usize)>, MultipartError> {
    let padding = rest
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    let Some(marker) = rest.get(padding..padding + 2) else {
        return Ok(None);
    };

    let next = match marker {
        b"\r\n" => State::Headers,
        b"--" => State::Done,
        _ => return Err(MultipartError::InvalidDelimiter),
    };
    Ok(Some((next, padding + 2)))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_part_headers(block: &[u8]) -> Result<PartHeaders, MultipartError> {
    let text = String::from_utf8_lossy(block);
    let mut disposition = None;
    let mut content_type = None;

    for line in text.split("\r\n").filter(|l| !l.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            return Err(MultipartError::InvalidPartHeaders(format!(
                "header line without colon: {line}"
            )));
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => disposition = Some(value.to_string()),
            "content-type" => content_type = Some(value.to_string()),
            _ => {}
        }
    }

    let disposition = disposition.ok_or_else(|| {
        MultipartError::InvalidPartHeaders("missing Content-Disposition".to_string())
    })?;
    let (name, filename) = parse_content_disposition(&disposition)?;

    Ok(PartHeaders {
        name,
        filename,
        content_type,
    })
}

/// Parse `form-data; name="field"; filename="file.txt"`
///
/// `filename*` (RFC 5987) wins over `filename`. Only the base name of the
/// file name is kept.
fn parse_content_disposition(value: &str) -> Result<(String, Option<String>), MultipartError> {
    let mut params = split_params(value).into_iter();
    let kind = params.next().unwrap_or_default();
    if !kind.trim().eq_ignore_ascii_case("form-data") {
        return Err(MultipartError::InvalidPartHeaders(format!(
            "unsupported disposition: {kind}"
        )));
    }

    let mut name = None;
    let mut filename = None;
    let mut filename_ext = None;

    for param in params {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(unquote(raw)),
            "filename" => filename = Some(unquote(raw)),
            "filename*" => filename_ext = decode_ext_value(raw.trim()),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| {
        MultipartError::InvalidPartHeaders("missing name parameter".to_string())
    })?;

    Ok((name, filename_ext.or(filename).map(|f| base_name(&f))))
}

/// Split on `;` outside quoted strings
fn split_params(value: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;

    for c in value.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if quoted => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                quoted = !quoted;
            }
            ';' if !quoted => params.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    params.push(current);
    params
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return raw.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode `UTF-8''file%20name.txt`
fn decode_ext_value(raw: &str) -> Option<String> {
    let mut parts = raw.splitn(3, '\'');
    let charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Strip any client-side directory (`C:\Users\me\a.txt`, `../a.txt`)
fn base_name(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = b"preamble\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"username\"\r\n\
\r\n\
test\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"filename\"; filename=\"test.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
hello\r\nworld\r\n\
--XyZ--\r\nepilogue";

    fn drain(parser: &mut MultipartParser, events: &mut Vec<Event>) {
        while let Some(event) = parser.next_event().unwrap() {
            events.push(event);
        }
    }

    /// Merge adjacent data events so chunking does not matter
    fn normalise(events: Vec<Event>) -> Vec<Event> {
        let mut out: Vec<Event> = Vec::new();
        for event in events {
            match (out.last_mut(), event) {
                (Some(Event::Data(prev)), Event::Data(next)) => {
                    let mut joined = BytesMut::from(prev.as_ref());
                    joined.extend_from_slice(&next);
                    *prev = joined.freeze();
                }
                (_, event) => out.push(event),
            }
        }
        out
    }

    fn expected() -> Vec<Event> {
        vec![
            Event::PartStart(PartHeaders {
                name: "username".to_string(),
                filename: None,
                content_type: None,
            }),
            Event::Data(Bytes::from_static(b"test")),
            Event::PartEnd,
            Event::PartStart(PartHeaders {
                name: "filename".to_string(),
                filename: Some("test.txt".to_string()),
                content_type: Some("text/plain".to_string()),
            }),
            Event::Data(Bytes::from_static(b"hello\r\nworld")),
            Event::PartEnd,
        ]
    }

    #[test]
    fn test_whole_body() {
        let mut parser = MultipartParser::new("XyZ");
        parser.push(BODY);
        let mut events = Vec::new();
        drain(&mut parser, &mut events);
        assert!(parser.finish().is_ok());
        assert_eq!(normalise(events), expected());
    }

    #[test]
    fn test_any_chunking() {
        for size in [1, 2, 3, 7, 16] {
            let mut parser = MultipartParser::new("XyZ");
            let mut events = Vec::new();
            for chunk in BODY.chunks(size) {
                parser.push(chunk);
                drain(&mut parser, &mut events);
            }
            assert!(parser.finish().is_ok(), "chunk size {size}");
            assert_eq!(normalise(events), expected(), "chunk size {size}");
        }
    }

    #[test]
    fn test_truncated_body() {
        let mut parser = MultipartParser::new("XyZ");
        parser.push(&BODY[..BODY.len() / 2]);
        let mut events = Vec::new();
        drain(&mut parser, &mut events);
        assert_eq!(parser.finish(), Err(MultipartError::UnexpectedEof));
    }

    #[test]
    fn test_bad_delimiter() {
        let mut parser = MultipartParser::new("b");
        parser.push(b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--bXX");
        assert!(matches!(parser.next_event(), Ok(Some(Event::PartStart(_)))));
        assert!(matches!(parser.next_event(), Ok(Some(Event::Data(_)))));
        assert_eq!(parser.next_event(), Err(MultipartError::InvalidDelimiter));
    }

    #[test]
    fn test_padding_after_boundary() {
        let padded = b"--XyZ \t\r\n\
Content-Disposition: form-data; name=\"username\"\r\n\
\r\n\
test\r\n\
--XyZ  \r\n\
Content-Disposition: form-data; name=\"filename\"; filename=\"test.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
hello\r\nworld\r\n\
--XyZ\t--\r\n";
        for size in [1, 4, padded.len()] {
            let mut parser = MultipartParser::new("XyZ");
            let mut events = Vec::new();
            for chunk in padded.chunks(size) {
                parser.push(chunk);
                drain(&mut parser, &mut events);
            }
            assert!(parser.finish().is_ok(), "chunk size {size}");
            assert_eq!(normalise(events), expected(), "chunk size {size}");
        }
    }

    #[test]
    fn test_padding_then_garbage_is_invalid() {
        let mut parser = MultipartParser::new("b");
        parser.push(b"--b  x\r\n");
        assert_eq!(parser.next_event(), Err(MultipartError::InvalidDelimiter));
    }

    #[test]
    fn test_missing_disposition() {
        let mut parser = MultipartParser::new("b");
        parser.push(b"--b\r\nContent-Type: text/plain\r\n\r\n1\r\n--b--");
        assert!(matches!(
            parser.next_event(),
            Err(MultipartError::InvalidPartHeaders(_))
        ));
    }

    #[test]
    fn test_boundary() {
        assert_eq!(
            parse_boundary("multipart/form-data; boundary=abc").unwrap(),
            "abc"
        );
        assert_eq!(
            parse_boundary("multipart/form-data"),
            Err(MultipartError::MissingBoundary)
        );
        assert_eq!(
            parse_boundary("application/json; boundary=abc"),
            Err(MultipartError::NotMultipart)
        );
        assert_eq!(
            parse_boundary(&format!("multipart/form-data; boundary={}", "x".repeat(71))),
            Err(MultipartError::InvalidBoundary)
        );
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            parse_content_disposition("form-data; name=\"a;b\"; filename=\"C:\\\\tmp\\\\x.txt\"")
                .unwrap(),
            ("a;b".to_string(), Some("x.txt".to_string()))
        );
        assert_eq!(
            parse_content_disposition(
                "form-data; name=f; filename=\"fallback.txt\"; filename*=UTF-8''r%C3%A9sum%C3%A9.txt"
            )
            .unwrap(),
            ("f".to_string(), Some("résumé.txt".to_string()))
        );
        assert_eq!(
            parse_content_disposition("form-data; name=\"f\"; filename=\"../../etc/passwd\"")
                .unwrap()
                .1,
            Some("passwd".to_string())
        );
        assert!(parse_content_disposition("attachment; name=\"a\"").is_err());
        assert!(parse_content_disposition("form-data; filename=\"a\"").is_err());
    }
}
