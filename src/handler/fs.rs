//! Filesystem collaborator
//!
//! The static file handlers only touch the disk through [`FileProbe`], so
//! tests can substitute an in-memory tree or a failing reader.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::io::{AsyncRead, AsyncSeek};

/// Metadata the file handlers need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

impl From<std::fs::Metadata> for FileStat {
    fn from(meta: std::fs::Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
        }
    }
}

/// Read-side filesystem operations
pub trait FileProbe: Send + Sync {
    type Reader: AsyncRead + AsyncSeek + Send + Sync + Unpin + 'static;

    fn stat(&self, path: &Path) -> impl Future<Output = io::Result<FileStat>> + Send;

    fn canonicalize(&self, path: &Path) -> impl Future<Output = io::Result<PathBuf>> + Send;

    fn open(&self, path: &Path) -> impl Future<Output = io::Result<Self::Reader>> + Send;

    /// Whether a regular file exists at `path`
    fn is_file(&self, path: &Path) -> impl Future<Output = bool> + Send {
        async move { self.stat(path).await.is_ok_and(|s| !s.is_dir) }
    }
}

/// [`FileProbe`] backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

impl FileProbe for TokioFs {
    type Reader = tokio::fs::File;

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        tokio::fs::metadata(path).await.map(FileStat::from)
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(path).await
    }

    async fn open(&self, path: &Path) -> io::Result<Self::Reader> {
        tokio::fs::File::open(path).await
    }
}
