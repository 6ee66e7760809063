//! Accept-Encoding negotiation

/// Content codings a client advertised
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptedEncodings {
    /// Acceptable tokens, most preferred first; may contain `*`
    pub preferred: Vec<String>,
    /// Tokens explicitly refused with `q=0`
    pub refused: Vec<String>,
}

impl AcceptedEncodings {
    /// Whether `encoding` may be sent
    ///
    /// An explicit `q=0` refusal wins over a `*` wildcard.
    pub fn accepts(&self, encoding: &str) -> bool {
        if self
            .refused
            .iter()
            .any(|token| token.eq_ignore_ascii_case(encoding))
        {
            return false;
        }
        self.preferred
            .iter()
            .any(|token| token == "*" || token.eq_ignore_ascii_case(encoding))
    }

    pub fn is_empty(&self) -> bool {
        self.preferred.is_empty()
    }
}

/// Parse `Accept-Encoding`
///
/// Acceptable entries are ordered by q-value, ties keep header order.
/// Entries with `q=0` go to `refused`; invalid entries are ignored. Tokens
/// are lowercased.
///
/// # Examples
/// ```
/// use quay::http::negotiate::accepted_encodings;
///
/// let accepted = accepted_encodings(Some("gzip;q=0.8, br, identity;q=0"));
/// assert_eq!(accepted.preferred, vec!["br".to_string(), "gzip".to_string()]);
/// assert_eq!(accepted.refused, vec!["identity".to_string()]);
/// assert!(accepted_encodings(None).is_empty());
/// ```
pub fn accepted_encodings(header: Option<&str>) -> AcceptedEncodings {
    let Some(header) = header else {
        return AcceptedEncodings::default();
    };

    let (mut weighted, refused): (Vec<(String, u16)>, Vec<_>) = header
        .split(',')
        .filter_map(parse_entry)
        .partition(|(_, q)| *q > 0);

    // stable: equal weights keep their header order
    weighted.sort_by(|a, b| b.1.cmp(&a.1));
    AcceptedEncodings {
        preferred: weighted.into_iter().map(|(token, _)| token).collect(),
        refused: refused.into_iter().map(|(token, _)| token).collect(),
    }
}

/// Parse `token;q=0.5` into the token and a weight in thousandths
fn parse_entry(entry: &str) -> Option<(String, u16)> {
    let mut params = entry.split(';');
    let token = params.next()?.trim();
    if token.is_empty() {
        return None;
    }

    let mut weight = 1000;
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("q") {
            weight = parse_qvalue(value.trim())?;
        }
    }

    Some((token.to_ascii_lowercase(), weight))
}

fn parse_qvalue(value: &str) -> Option<u16> {
    let q: f32 = value.parse().ok()?;
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((q * 1000.0).round() as u16)
}
