//! Temporary storage for uploaded files
//!
//! Every file part gets its own `upload-<uuid>.tmp`, created with
//! `create_new` so concurrent uploads can never share a file.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::error::HttpError;

/// Write-side filesystem operations used while spooling uploads
pub trait TempStore: Send + Sync {
    type Writer: AsyncWrite + Send + Unpin;

    /// Create a new file, failing if it already exists
    fn create(&self, path: &Path) -> impl Future<Output = io::Result<Self::Writer>> + Send;

    fn remove(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;
}

/// [`TempStore`] on the local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskStore;

impl TempStore for DiskStore {
    type Writer = tokio::fs::File;

    async fn create(&self, path: &Path) -> io::Result<Self::Writer> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

pub fn temp_file_name() -> String {
    format!("upload-{}.tmp", Uuid::new_v4())
}

/// A file part being written to temporary storage
pub struct SpooledFile<W> {
    path: PathBuf,
    writer: W,
    size: u64,
    limit: Option<u64>,
    truncated: bool,
}

/// Result of a completed spool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spooled {
    pub path: PathBuf,
    pub size: u64,
    pub truncated: bool,
}

impl<W: AsyncWrite + Unpin> SpooledFile<W> {
    pub const fn new(path: PathBuf, writer: W, limit: Option<u64>) -> Self {
        Self {
            path,
            writer,
            size: 0,
            limit,
            truncated: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append part data
    ///
    /// Once the per-file limit is reached the rest of the part is dropped and
    /// the file is flagged as truncated.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), HttpError> {
        if self.truncated {
            return Ok(());
        }

        let mut accepted = data;
        if let Some(limit) = self.limit {
            let room = usize::try_from(limit.saturating_sub(self.size)).unwrap_or(usize::MAX);
            if data.len() > room {
                accepted = &data[..room];
                self.truncated = true;
            }
        }

        self.writer
            .write_all(accepted)
            .await
            .map_err(|source| HttpError::Filesystem {
                path: self.path.clone(),
                source,
            })?;
        self.size += u64::try_from(accepted.len()).unwrap_or(u64::MAX);
        Ok(())
    }

    /// Flush and close the file
    pub async fn finish(mut self) -> Result<Spooled, HttpError> {
        self.writer
            .shutdown()
            .await
            .map_err(|source| HttpError::Filesystem {
                path: self.path.clone(),
                source,
            })?;

        Ok(Spooled {
            path: self.path,
            size: self.size,
            truncated: self.truncated,
        })
    }
}
