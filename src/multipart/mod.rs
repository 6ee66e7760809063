//! Multipart ingestion
//!
//! Turns a `multipart/form-data` body into scalar fields and spooled file
//! parts. The body may already be collected (buffered mode) or still be
//! arriving from the connection (streaming mode); both produce the same
//! [`Multipart`] value.
//!
//! Temp files belong to the caller once a parse succeeds. On failure, or
//! when the parse future is dropped, every file it created is removed.

mod parser;
mod storage;

pub use parser::{parse_boundary, Event, MultipartError, MultipartParser, PartHeaders};
pub use storage::{temp_file_name, DiskStore, Spooled, SpooledFile, TempStore};

use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::HttpError;

/// Size limits applied while ingesting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Per file part; excess bytes are dropped and the file marked truncated
    pub file_size: Option<u64>,
    /// Whole body; exceeding it fails the parse
    pub body_size: Option<u64>,
}

/// A file part persisted to temporary storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub field_name: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size: u64,
    pub stored_path: PathBuf,
    pub truncated: bool,
}

/// Parsed form
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Multipart {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, Vec<UploadedFile>>,
}

/// How the request body reaches the ingestor
pub enum RequestBody<S> {
    /// Already collected by the transport
    Buffered(Bytes),
    /// Still arriving
    Streaming(S),
}

pub struct MultipartIngestor<S: TempStore = DiskStore> {
    temp_dir: PathBuf,
    limits: Limits,
    store: S,
}

impl MultipartIngestor<DiskStore> {
    pub const fn new(temp_dir: PathBuf, limits: Limits) -> Self {
        Self::with_store(temp_dir, limits, DiskStore)
    }
}

impl<S: TempStore> MultipartIngestor<S> {
    pub const fn with_store(temp_dir: PathBuf, limits: Limits, store: S) -> Self {
        Self {
            temp_dir,
            limits,
            store,
        }
    }

    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Parse a body in whichever mode the transport provides
    pub async fn parse<B, E>(
        &self,
        content_type: &str,
        body: RequestBody<B>,
    ) -> Result<Multipart, HttpError>
    where
        B: Stream<Item = Result<Bytes, E>> + Send,
        E: Display,
    {
        match body {
            RequestBody::Buffered(bytes) => self.parse_buffered(content_type, bytes).await,
            RequestBody::Streaming(stream) => self.parse_stream(content_type, stream).await,
        }
    }

    /// Parse a fully collected body
    pub async fn parse_buffered(
        &self,
        content_type: &str,
        body: Bytes,
    ) -> Result<Multipart, HttpError> {
        let boundary = parse_boundary(content_type)?;
        let mut ingestion = Ingestion::new(self, &boundary);

        let outcome = match ingestion.feed(&body).await {
            Ok(()) => ingestion.parser.finish().map_err(HttpError::from),
            Err(e) => Err(e),
        };
        ingestion.settle(outcome).await
    }

    /// Parse a body while it streams in, spooling file parts as they arrive
    pub async fn parse_stream<B, E>(
        &self,
        content_type: &str,
        body: B,
    ) -> Result<Multipart, HttpError>
    where
        B: Stream<Item = Result<Bytes, E>> + Send,
        E: Display,
    {
        let boundary = parse_boundary(content_type)?;
        let mut ingestion = Ingestion::new(self, &boundary);

        let outcome = ingestion.consume(body).await;
        ingestion.settle(outcome).await
    }

    /// Remove the temp files of a parsed form
    ///
    /// Failures are logged; a file already gone counts as removed.
    pub async fn release(&self, form: &Multipart) {
        for file in form.files.values().flatten() {
            match self.store.remove(&file.stored_path).await {
                Ok(()) => debug!(path = %file.stored_path.display(), "Removed upload"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %file.stored_path.display(), error = %e, "Failed to remove upload");
                }
            }
        }
    }
}

/// Part currently being received
enum Current<W> {
    Field { name: String, value: Vec<u8> },
    File {
        headers: PartHeaders,
        file: SpooledFile<W>,
    },
}

/// State of one parse
struct Ingestion<'a, S: TempStore> {
    ingestor: &'a MultipartIngestor<S>,
    parser: MultipartParser,
    form: Multipart,
    current: Option<Current<S::Writer>>,
    /// Temp files created by this parse and not yet handed over
    created: Vec<PathBuf>,
    received: u64,
}

impl<'a, S: TempStore> Ingestion<'a, S> {
    fn new(ingestor: &'a MultipartIngestor<S>, boundary: &str) -> Self {
        Self {
            ingestor,
            parser: MultipartParser::new(boundary),
            form: Multipart::default(),
            current: None,
            created: Vec::new(),
            received: 0,
        }
    }

    async fn consume<B, E>(&mut self, body: B) -> Result<(), HttpError>
    where
        B: Stream<Item = Result<Bytes, E>> + Send,
        E: Display,
    {
        let mut body = std::pin::pin!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| HttpError::internal(format!("Failed to read request body: {e}")))?;
            self.feed(&chunk).await?;
            if self.parser.is_done() {
                break;
            }
        }
        self.parser.finish()?;
        Ok(())
    }

    async fn feed(&mut self, chunk: &[u8]) -> Result<(), HttpError> {
        self.received += u64::try_from(chunk.len()).unwrap_or(u64::MAX);
        if let Some(limit) = self.ingestor.limits.body_size {
            if self.received > limit {
                return Err(HttpError::internal(format!(
                    "Multipart body exceeds limit of {limit} bytes"
                )));
            }
        }

        self.parser.push(chunk);
        while let Some(event) = self.parser.next_event()? {
            match event {
                Event::PartStart(headers) => self.start_part(headers).await?,
                Event::Data(data) => match &mut self.current {
                    Some(Current::Field { value, .. }) => value.extend_from_slice(&data),
                    Some(Current::File { file, .. }) => file.write(&data).await?,
                    None => {}
                },
                Event::PartEnd => self.end_part().await?,
            }
        }
        Ok(())
    }

    async fn start_part(&mut self, headers: PartHeaders) -> Result<(), HttpError> {
        if !headers.is_file() {
            self.current = Some(Current::Field {
                name: headers.name,
                value: Vec::new(),
            });
            return Ok(());
        }

        let path = self.ingestor.temp_dir.join(temp_file_name());
        let writer = self
            .ingestor
            .store
            .create(&path)
            .await
            .map_err(|source| HttpError::Filesystem {
                path: path.clone(),
                source,
            })?;
        self.created.push(path.clone());

        let file = SpooledFile::new(path, writer, self.ingestor.limits.file_size);
        self.current = Some(Current::File { headers, file });
        Ok(())
    }

    async fn end_part(&mut self) -> Result<(), HttpError> {
        match self.current.take() {
            Some(Current::Field { name, value }) => {
                let value = String::from_utf8_lossy(&value).into_owned();
                self.form.fields.insert(name, value);
            }
            Some(Current::File { headers, file }) => {
                let spooled = file.finish().await?;
                if spooled.truncated {
                    warn!(
                        field = %headers.name,
                        size = spooled.size,
                        "Uploaded file exceeded size limit, truncated"
                    );
                }
                let upload = UploadedFile {
                    original_filename: headers.filename.unwrap_or_default(),
                    mime_type: headers
                        .content_type
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    size: spooled.size,
                    stored_path: spooled.path,
                    truncated: spooled.truncated,
                    field_name: headers.name,
                };
                self.form
                    .files
                    .entry(upload.field_name.clone())
                    .or_default()
                    .push(upload);
            }
            None => {}
        }
        Ok(())
    }

    /// Hand the form over on success, remove every temp file on failure
    async fn settle(mut self, outcome: Result<(), HttpError>) -> Result<Multipart, HttpError> {
        match outcome {
            Ok(()) => {
                self.created.clear();
                Ok(std::mem::take(&mut self.form))
            }
            Err(e) => {
                self.discard().await;
                Err(e)
            }
        }
    }

    async fn discard(&mut self) {
        // close the open handle before unlinking
        self.current = None;
        for path in self.created.drain(..) {
            match self.ingestor.store.remove(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed partial upload"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial upload"),
            }
        }
    }
}

impl<S: TempStore> Drop for Ingestion<'_, S> {
    fn drop(&mut self) {
        // parse future dropped mid-way
        self.current = None;
        for path in self.created.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
                }
            }
        }
    }
}
