//! Pre-compressed variant selection
//!
//! Picks `file.ext.br`, `file.ext.gz`, ... over `file.ext` when the client
//! accepts the matching content coding.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::fs::FileProbe;
use crate::config::CompressionVariant;
use crate::http::negotiate::AcceptedEncodings;

/// File chosen to represent a requested path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedVariant {
    pub path: PathBuf,
    /// Content coding of `path`, `None` for the original file
    pub encoding: Option<String>,
}

/// Choose the best pre-compressed variant of `path`
///
/// Encodings are tried in the client's order of preference; for each, the
/// suffixes mapped to it are probed in configuration order. A `*` entry
/// stands for any configured encoding the client did not refuse. Falls back
/// to `path` itself.
pub async fn select_variant<P: FileProbe>(
    probe: &P,
    path: &Path,
    accepted: &AcceptedEncodings,
    variants: &[CompressionVariant],
) -> SelectedVariant {
    for encoding in &accepted.preferred {
        let candidates = variants.iter().filter(|v| {
            (encoding == "*" || v.encoding.eq_ignore_ascii_case(encoding))
                && accepted.accepts(&v.encoding)
        });

        for variant in candidates {
            let candidate = with_suffix(path, &variant.suffix);
            if probe.is_file(&candidate).await {
                return SelectedVariant {
                    path: candidate,
                    encoding: Some(variant.encoding.clone()),
                };
            }
        }
    }

    SelectedVariant {
        path: path.to_path_buf(),
        encoding: None,
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
