//! Response type returned by every call.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use http::HeaderMap;
use krest_transport::ResponseReader;
use serde::de::DeserializeOwned;

/// Response of a call.
///
/// Always safe to inspect, even when the call also returned an error: on a
/// non-2xx status the body holds the server's payload, and on a transport
/// failure every field is zero-valued.
#[derive(Default)]
pub struct Response {
    /// HTTP status code, `0` when no response was received.
    pub status: u16,

    /// Response headers, lower-cased, first value only.
    pub headers: HashMap<String, String>,

    /// Buffered body. Empty for streaming responses.
    pub body: Bytes,

    stream: Option<ResponseReader>,
}

impl Response {
    /// An empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Set a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Set the buffered body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub(crate) fn buffered(status: u16, headers: &HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers: first_values(headers),
            body,
            stream: None,
        }
    }

    pub(crate) fn streaming(status: u16, headers: &HeaderMap, reader: ResponseReader) -> Self {
        Self {
            status,
            headers: first_values(headers),
            body: Bytes::new(),
            stream: Some(reader),
        }
    }

    /// Header value by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether the status is in 200-299.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body was left on the connection.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Buffered body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decode the buffered body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Take the streaming body, leaving the response without one.
    pub fn take_stream(&mut self) -> Option<ResponseReader> {
        self.stream.take()
    }

    /// Body as a reader: the live stream for streaming responses, the
    /// buffered bytes otherwise.
    pub fn into_reader(self) -> ResponseReader {
        match self.stream {
            Some(reader) => reader,
            None => Box::pin(std::io::Cursor::new(self.body)),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

fn first_values(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    out
}
