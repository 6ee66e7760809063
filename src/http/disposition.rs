//! Content-Disposition header generation (RFC 6266)
//!
//! Non-ASCII file names get an ASCII `filename` fallback plus an RFC 5987
//! `filename*` parameter carrying the UTF-8 name.

use std::path::Path;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::config::DispositionType;

/// RFC 5987 `attr-char` complement
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Build a `Content-Disposition` value for `path`
///
/// Only the final path component is used as the file name.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use quay::config::DispositionType;
/// use quay::http::disposition::content_disposition;
///
/// assert_eq!(
///     content_disposition(DispositionType::Attachment, Path::new("/srv/report.pdf")),
///     "attachment; filename=\"report.pdf\""
/// );
/// ```
pub fn content_disposition(kind: DispositionType, path: &Path) -> String {
    let kind = match kind {
        DispositionType::Inline => "inline",
        DispositionType::Attachment => "attachment",
    };

    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return kind.to_string();
    };

    if name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return format!("{kind}; filename={}", quote(&name));
    }

    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect();

    format!(
        "{kind}; filename={}; filename*=UTF-8''{}",
        quote(&fallback),
        utf8_percent_encode(&name, ATTR_CHAR)
    )
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_ascii() {
        assert_eq!(
            content_disposition(DispositionType::Inline, Path::new("public/index.html")),
            "inline; filename=\"index.html\""
        );
    }

    #[test]
    fn test_quotes_escaped() {
        assert_eq!(
            content_disposition(DispositionType::Attachment, Path::new("say \"hi\".txt")),
            "attachment; filename=\"say \\\"hi\\\".txt\""
        );
    }

    #[test]
    fn test_unicode_name() {
        assert_eq!(
            content_disposition(DispositionType::Attachment, Path::new("résumé €.pdf")),
            "attachment; filename=\"r?sum? ?.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9%20%E2%82%AC.pdf"
        );
    }

    #[test]
    fn test_no_file_name() {
        assert_eq!(content_disposition(DispositionType::Inline, Path::new("/")), "inline");
    }
}
