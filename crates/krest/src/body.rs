//! Request bodies and their per-attempt normalisation.

use std::fmt;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use krest_transport::{RequestReader, TransportBody};
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::multipart::{FailureHandle, MultipartForm, MultipartStream, content_type_for, random_boundary};

/// Request body.
///
/// Everything except [`Body::Stream`] and forms with streamed parts can be
/// sent any number of times, which is what makes retries possible.
#[derive(Default)]
pub enum Body {
    /// No body.
    #[default]
    None,

    /// Raw bytes.
    Bytes(Bytes),

    /// UTF-8 text, sent as is.
    Text(String),

    /// Single-use reader.
    Stream(RequestReader),

    /// `multipart/form-data` fields.
    Multipart(MultipartForm),

    /// Any serialisable value, encoded as JSON when the request is executed.
    Json(Box<dyn erased_serde::Serialize + Send + Sync>),
}

impl Body {
    /// JSON-encode `value` at execution time.
    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Body::Json(Box::new(value))
    }

    /// Send whatever `reader` yields. The request cannot be retried.
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Body::Stream(Box::pin(reader))
    }

    /// Whether the body can be produced only once.
    pub fn is_single_use(&self) -> bool {
        match self {
            Body::Stream(_) => true,
            Body::Multipart(form) => form.is_single_use(),
            _ => false,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::None => f.write_str("None"),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
            Body::Multipart(form) => f.debug_tuple("Multipart").field(form).finish(),
            Body::Json(_) => f.write_str("Json(..)"),
        }
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::Text(value.to_string())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Bytes(value.into())
    }
}

impl From<&'static [u8]> for Body {
    fn from(value: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(value))
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Body::Bytes(value)
    }
}

impl From<MultipartForm> for Body {
    fn from(form: MultipartForm) -> Self {
        Body::Multipart(form)
    }
}

enum Source {
    Empty,
    Bytes(Bytes),
    Stream(Option<RequestReader>),
    Form {
        form: Option<MultipartForm>,
        reusable: bool,
        boundary: String,
    },
}

/// A body normalised for execution, able to hand out one transport body
/// per attempt.
///
/// In-memory bodies are cloned for every attempt. Forms keep the same
/// boundary across attempts so every attempt sends identical bytes.
pub(crate) struct BodyPlan {
    source: Source,
    content_type: Option<String>,
    failure: FailureHandle,
}

impl BodyPlan {
    /// Normalise `body`. JSON values are encoded here.
    pub(crate) fn new(body: Body) -> Result<Self, serde_json::Error> {
        let mut content_type = None;
        let source = match body {
            Body::None => Source::Empty,
            Body::Bytes(bytes) => Source::Bytes(bytes),
            Body::Text(text) => Source::Bytes(Bytes::from(text)),
            Body::Stream(reader) => Source::Stream(Some(reader)),
            Body::Multipart(form) => {
                let boundary = random_boundary();
                content_type = Some(content_type_for(&boundary));
                Source::Form {
                    reusable: !form.is_single_use(),
                    form: Some(form),
                    boundary,
                }
            }
            Body::Json(value) => {
                let encoded = serde_json::to_vec(&value)?;
                content_type = Some("application/json".to_string());
                Source::Bytes(Bytes::from(encoded))
            }
        };

        Ok(Self {
            source,
            content_type,
            failure: FailureHandle::default(),
        })
    }

    /// Content type implied by the body, if any.
    pub(crate) fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Set the implied content type on `headers`.
    ///
    /// Multipart bodies always overwrite it, since the boundary must match.
    /// Other bodies only fill it in when the caller did not set one.
    pub(crate) fn apply_content_type(&self, headers: &mut HeaderMap) {
        let Some(value) = self.content_type().and_then(|ct| HeaderValue::from_str(ct).ok()) else {
            return;
        };
        if matches!(self.source, Source::Form { .. }) {
            headers.insert(CONTENT_TYPE, value);
        } else {
            headers.entry(CONTENT_TYPE).or_insert(value);
        }
    }

    /// Whether only one attempt can ever receive the body.
    pub(crate) fn is_single_use(&self) -> bool {
        matches!(
            self.source,
            Source::Stream(_) | Source::Form { reusable: false, .. }
        )
    }

    /// Produce the body for the next attempt.
    ///
    /// Single-use bodies are handed out once; later calls yield an empty
    /// body.
    pub(crate) fn next_body(&mut self) -> TransportBody {
        match &mut self.source {
            Source::Empty => TransportBody::Empty,
            Source::Bytes(bytes) => TransportBody::Bytes(bytes.clone()),
            Source::Stream(reader) => reader.take().map_or(TransportBody::Empty, TransportBody::Reader),
            Source::Form {
                form,
                reusable,
                boundary,
            } => {
                let next = if *reusable {
                    form.as_ref().and_then(MultipartForm::try_clone)
                } else {
                    form.take()
                };
                match next {
                    Some(form) => {
                        let stream = MultipartStream::with_boundary(form, boundary.clone());
                        self.failure = stream.failure();
                        TransportBody::reader(stream)
                    }
                    None => TransportBody::Empty,
                }
            }
        }
    }

    /// Source failure reported by the most recent multipart encoder.
    pub(crate) fn failure(&self) -> FailureHandle {
        self.failure.clone()
    }
}
