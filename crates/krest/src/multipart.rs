//! Streaming `multipart/form-data` encoder.
//!
//! A [`MultipartForm`] is an ordered set of named [`Part`]s. Encoding it
//! with [`MultipartStream`] spawns a producer task that writes each part
//! into a bounded relay while the consumer (normally the transport) reads
//! the encoded bytes back out in whatever chunk size it likes. Nothing is
//! buffered beyond the relay, so arbitrarily large file sources can be sent.
//!
//! Each part is written as
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="<name>"[; filename="<filename>"]\r\n
//! [Content-Type: <type>\r\n]
//! \r\n
//! <bytes>\r\n
//! ```
//!
//! followed by a final `--<boundary>--\r\n`. The `Content-Type` line only
//! appears for parts whose type was declared explicitly.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use krest_core::relay::{self, RelayReader, RelaySender};
use krest_transport::RequestReader;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

const RELAY_CAPACITY: usize = 16;
const SOURCE_READ_SIZE: usize = 8 * 1024;
const BOUNDARY_BYTES: usize = 30;

/// Generate a fresh boundary token: 30 random bytes, hex encoded.
pub fn random_boundary() -> String {
    let mut raw = [0u8; BOUNDARY_BYTES];
    rand::thread_rng().fill(&mut raw[..]);
    raw.iter().map(|b| format!("{b:02x}")).collect()
}

/// The request `Content-Type` for a given boundary.
pub fn content_type_for(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

enum PartSource {
    Bytes(Bytes),
    Reader(RequestReader),
}

/// One named section of a multipart body.
pub struct Part {
    filename: Option<String>,
    content_type: Option<String>,
    source: PartSource,
}

impl Part {
    /// A plain field with a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::bytes(value.into())
    }

    /// A plain field with in-memory bytes.
    pub fn bytes(value: impl Into<Bytes>) -> Self {
        Self {
            filename: None,
            content_type: None,
            source: PartSource::Bytes(value.into()),
        }
    }

    /// A plain field read from `reader`. The form becomes single-use.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self {
            filename: None,
            content_type: None,
            source: PartSource::Reader(Box::pin(reader)),
        }
    }

    /// A plain field read from `reader` with a declared content type.
    pub fn item<R>(reader: R, content_type: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self::reader(reader).content_type(content_type)
    }

    /// A file field read from `reader`.
    ///
    /// No content type is declared unless [`content_type`](Self::content_type)
    /// is also called.
    pub fn file<R>(reader: R, filename: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self::reader(reader).filename(filename)
    }

    /// Turn this part into a file field.
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Declare the part's content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Filename, for file fields.
    pub fn file_name(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Declared content type, if any.
    pub fn declared_content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Whether the part reads from a single-use source.
    pub fn is_stream(&self) -> bool {
        matches!(self.source, PartSource::Reader(_))
    }

    fn try_clone(&self) -> Option<Self> {
        match &self.source {
            PartSource::Bytes(bytes) => Some(Self {
                filename: self.filename.clone(),
                content_type: self.content_type.clone(),
                source: PartSource::Bytes(bytes.clone()),
            }),
            PartSource::Reader(_) => None,
        }
    }

    fn header(&self, boundary: &str, name: &str) -> String {
        let mut header = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
            escape_quotes(name)
        );
        if let Some(filename) = &self.filename {
            header.push_str(&format!("; filename=\"{}\"", escape_quotes(filename)));
        }
        header.push_str("\r\n");
        if let Some(content_type) = &self.content_type {
            header.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        header.push_str("\r\n");
        header
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("stream", &self.is_stream())
            .finish()
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Ordered collection of uniquely named parts.
///
/// ```rust
/// use krest::multipart::{MultipartForm, Part};
///
/// let form = MultipartForm::new()
///     .text("title", "report")
///     .part("data", Part::bytes("a,b\n1,2\n").filename("data.csv").content_type("text/csv"));
/// assert_eq!(form.names().collect::<Vec<_>>(), vec!["title", "data"]);
/// assert!(!form.is_single_use());
/// ```
#[derive(Debug, Default)]
pub struct MultipartForm {
    parts: Vec<(String, Part)>,
}

impl MultipartForm {
    /// Empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a part. A part already registered under `name` is replaced in
    /// place and returned.
    pub fn insert(&mut self, name: impl Into<String>, part: Part) -> Option<Part> {
        let name = name.into();
        match self.parts.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, part)),
            None => {
                self.parts.push((name, part));
                None
            }
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn part(mut self, name: impl Into<String>, part: Part) -> Self {
        self.insert(name, part);
        self
    }

    /// Add a text field.
    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.part(name, Part::text(value))
    }

    /// Add a streamed file field.
    pub fn file<R>(self, name: impl Into<String>, reader: R, filename: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        self.part(name, Part::file(reader, filename))
    }

    /// Look up a part by name.
    pub fn get(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|(n, _)| n == name).map(|(_, part)| part)
    }

    /// Field names in encoding order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(name, _)| name.as_str())
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the form has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Whether any part reads from a single-use source.
    pub fn is_single_use(&self) -> bool {
        self.parts.iter().any(|(_, part)| part.is_stream())
    }

    /// Copy the form if every part is held in memory.
    pub fn try_clone(&self) -> Option<Self> {
        self.parts
            .iter()
            .map(|(name, part)| part.try_clone().map(|part| (name.clone(), part)))
            .collect::<Option<Vec<_>>>()
            .map(|parts| Self { parts })
    }
}

impl<K: Into<String>> FromIterator<(K, Part)> for MultipartForm {
    fn from_iter<I: IntoIterator<Item = (K, Part)>>(iter: I) -> Self {
        let mut form = Self::new();
        for (name, part) in iter {
            form.insert(name, part);
        }
        form
    }
}

/// First source failure seen by a [`MultipartStream`] producer.
#[derive(Debug, Clone, Default)]
pub struct FailureHandle(Arc<OnceLock<String>>);

impl FailureHandle {
    fn record(&self, message: String) {
        let _ = self.0.set(message);
    }

    /// Failure description, once one has happened.
    pub fn message(&self) -> Option<&str> {
        self.0.get().map(String::as_str)
    }

    /// Whether a source failed.
    pub fn is_failed(&self) -> bool {
        self.0.get().is_some()
    }
}

/// Pull-based encoder for a [`MultipartForm`].
///
/// Must be created inside a Tokio runtime: the producer runs as a spawned
/// task and stops as soon as the stream is dropped.
pub struct MultipartStream {
    reader: RelayReader,
    boundary: String,
    failure: FailureHandle,
}

impl MultipartStream {
    /// Start encoding `form` with a fresh random boundary.
    pub fn new(form: MultipartForm) -> Self {
        Self::with_boundary(form, random_boundary())
    }

    /// Start encoding `form` with the given boundary.
    pub fn with_boundary(form: MultipartForm, boundary: impl Into<String>) -> Self {
        let boundary = boundary.into();
        let (tx, reader) = relay::channel(RELAY_CAPACITY);
        let failure = FailureHandle::default();

        tokio::spawn(produce(form.parts, boundary.clone(), tx, failure.clone()));

        Self {
            reader,
            boundary,
            failure,
        }
    }

    /// Boundary token separating the parts.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Request `Content-Type` header value.
    pub fn content_type(&self) -> String {
        content_type_for(&self.boundary)
    }

    /// Handle reporting a source failure, shared with the producer.
    pub fn failure(&self) -> FailureHandle {
        self.failure.clone()
    }
}

impl AsyncRead for MultipartStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl fmt::Debug for MultipartStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartStream")
            .field("boundary", &self.boundary)
            .finish_non_exhaustive()
    }
}

async fn produce(parts: Vec<(String, Part)>, boundary: String, tx: RelaySender, failure: FailureHandle) {
    for (name, part) in parts {
        if tx.send(Bytes::from(part.header(&boundary, &name))).await.is_err() {
            return;
        }

        match part.source {
            PartSource::Bytes(bytes) => {
                if tx.send(bytes).await.is_err() {
                    return;
                }
            }
            PartSource::Reader(mut reader) => loop {
                let mut chunk = BytesMut::with_capacity(SOURCE_READ_SIZE);
                match reader.read_buf(&mut chunk).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(chunk.freeze()).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let message = format!("reading field \"{name}\": {err}");
                        tracing::debug!(field = %name, error = %err, "multipart source failed");
                        failure.record(message.clone());
                        let _ = tx.fail(io::Error::new(err.kind(), message)).await;
                        return;
                    }
                }
            },
        }

        if tx.send(Bytes::from_static(b"\r\n")).await.is_err() {
            return;
        }
    }

    let _ = tx.send(Bytes::from(format!("--{boundary}--\r\n"))).await;
}
