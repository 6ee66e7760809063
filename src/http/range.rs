//! HTTP Range request parsing module
//!
//! Range header parsing for resumable downloads, compliant with RFC 9110
//! section 14. Multiple ranges are parsed and optionally combined; the
//! caller decides how many it is willing to serve.

/// Inclusive byte interval within a representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[inline]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for this interval
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{size}", self.start, self.end)
    }
}

/// Range header parse result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No Range header, or a unit other than `bytes` (serve full content)
    None,
    /// At least one satisfiable interval
    Satisfiable(Vec<ByteRange>),
    /// Well-formed, but no interval overlaps the representation
    NotSatisfiable,
    /// Syntactically invalid `bytes` range set
    Malformed,
}

/// Parse an HTTP Range header against a representation of `size` bytes
///
/// Supported formats:
/// - `bytes=start-end` - Specific range
/// - `bytes=start-` - From start to end
/// - `bytes=-suffix` - Last suffix bytes
/// - any comma-separated list of the above
///
/// With `combine`, overlapping and adjacent intervals are merged.
///
/// # Examples
/// ```
/// use quay::http::range::{parse_range, ByteRange, RangeOutcome};
///
/// let result = parse_range(Some("bytes=0-99"), 1000, false);
/// assert_eq!(result, RangeOutcome::Satisfiable(vec![ByteRange { start: 0, end: 99 }]));
///
/// assert_eq!(parse_range(None, 1000, false), RangeOutcome::None);
/// assert_eq!(parse_range(Some("bytes=1000-"), 1000, false), RangeOutcome::NotSatisfiable);
/// ```
pub fn parse_range(header: Option<&str>, size: u64, combine: bool) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::None;
    };

    let Some((unit, set)) = header.split_once('=') else {
        return RangeOutcome::Malformed;
    };
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return RangeOutcome::None;
    }

    let mut ranges = Vec::new();
    for spec in set.split(',') {
        match parse_spec(spec.trim(), size) {
            Spec::Valid(range) => ranges.push(range),
            Spec::Unsatisfiable => {}
            Spec::Malformed => return RangeOutcome::Malformed,
        }
    }

    if ranges.is_empty() {
        return RangeOutcome::NotSatisfiable;
    }

    if combine {
        ranges = combine_ranges(ranges);
    }

    RangeOutcome::Satisfiable(ranges)
}

enum Spec {
    Valid(ByteRange),
    Unsatisfiable,
    Malformed,
}

fn parse_spec(spec: &str, size: u64) -> Spec {
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return Spec::Malformed;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    let last = size.checked_sub(1);

    // Suffix range: "-500" means last 500 bytes
    if start_str.is_empty() {
        let Ok(suffix) = end_str.parse::<u64>() else {
            return Spec::Malformed;
        };
        return match last {
            Some(last) if suffix > 0 => Spec::Valid(ByteRange {
                start: size.saturating_sub(suffix),
                end: last,
            }),
            _ => Spec::Unsatisfiable,
        };
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return Spec::Malformed;
    };
    let end = if end_str.is_empty() {
        None
    } else {
        match end_str.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return Spec::Malformed,
        }
    };

    if end.is_some_and(|end| end < start) {
        return Spec::Malformed;
    }

    match last {
        Some(last) if start <= last => Spec::Valid(ByteRange {
            start,
            end: end.map_or(last, |end| end.min(last)),
        }),
        _ => Spec::Unsatisfiable,
    }
}

/// Merge overlapping or adjacent ranges, keeping the order in which each
/// merged group was first requested
fn combine_ranges(ranges: Vec<ByteRange>) -> Vec<ByteRange> {
    let mut indexed: Vec<(usize, ByteRange)> = ranges.into_iter().enumerate().collect();
    indexed.sort_by_key(|(_, r)| r.start);

    let mut merged: Vec<(usize, ByteRange)> = Vec::with_capacity(indexed.len());
    for (index, range) in indexed {
        match merged.last_mut() {
            Some((first, current)) if range.start <= current.end.saturating_add(1) => {
                current.end = current.end.max(range.end);
                *first = (*first).min(index);
            }
            _ => merged.push((index, range)),
        }
    }

    merged.sort_by_key(|(index, _)| *index);
    merged.into_iter().map(|(_, range)| range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(start: u64, end: u64) -> RangeOutcome {
        RangeOutcome::Satisfiable(vec![ByteRange { start, end }])
    }

    #[test]
    fn test_no_range() {
        assert_eq!(parse_range(None, 100, false), RangeOutcome::None);
    }

    #[test]
    fn test_standard_range() {
        assert_eq!(parse_range(Some("bytes=0-9"), 100, false), single(0, 9));
        assert_eq!(ByteRange { start: 0, end: 9 }.len(), 10);
    }

    #[test]
    fn test_open_range() {
        assert_eq!(parse_range(Some("bytes=50-"), 100, false), single(50, 99));
    }

    #[test]
    fn test_end_clamped_to_size() {
        assert_eq!(parse_range(Some("bytes=90-500"), 100, false), single(90, 99));
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(parse_range(Some("bytes=-20"), 100, false), single(80, 99));
        assert_eq!(parse_range(Some("bytes=-500"), 100, false), single(0, 99));
    }

    #[test]
    fn test_not_satisfiable() {
        assert_eq!(
            parse_range(Some("bytes=200-"), 100, false),
            RangeOutcome::NotSatisfiable
        );
        assert_eq!(
            parse_range(Some("bytes=-0"), 100, false),
            RangeOutcome::NotSatisfiable
        );
        assert_eq!(
            parse_range(Some("bytes=0-"), 0, false),
            RangeOutcome::NotSatisfiable
        );
    }

    #[test]
    fn test_invalid_format() {
        assert_eq!(
            parse_range(Some("bytes=a-b"), 100, false),
            RangeOutcome::Malformed
        );
        assert_eq!(parse_range(Some("bytes 0-9"), 100, false), RangeOutcome::Malformed);
        assert_eq!(parse_range(Some("bytes=9-0"), 100, false), RangeOutcome::Malformed);
    }

    #[test]
    fn test_other_unit_ignored() {
        assert_eq!(parse_range(Some("items=0-9"), 100, false), RangeOutcome::None);
    }

    #[test]
    fn test_multiple_ranges() {
        assert_eq!(
            parse_range(Some("bytes=0-9, 20-29"), 100, false),
            RangeOutcome::Satisfiable(vec![
                ByteRange { start: 0, end: 9 },
                ByteRange { start: 20, end: 29 },
            ])
        );
        // unsatisfiable members are dropped
        assert_eq!(parse_range(Some("bytes=0-9,500-600"), 100, false), single(0, 9));
    }

    #[test]
    fn test_combine() {
        assert_eq!(
            parse_range(Some("bytes=0-4,5-9,3-6"), 100, true),
            single(0, 9)
        );
        assert_eq!(
            parse_range(Some("bytes=50-59,0-9,8-12"), 100, true),
            RangeOutcome::Satisfiable(vec![
                ByteRange { start: 50, end: 59 },
                ByteRange { start: 0, end: 12 },
            ])
        );
    }
}
