//! Timed HTTP executor with in-band transport errors
//!
//! Transport failures never surface as `Err`: the engine needs a
//! response-shaped value with timing and an error classification so one bad
//! request stays one bad result.

use std::time::{Duration, Instant};

use bytes::Bytes;
use indexmap::IndexMap;
use reqwest::{Client, Method};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::errors::{ApipulseError, Result};
use crate::models::result::ErrorKind;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum response body size kept in memory (10 MB); larger bodies are
/// truncated without failing the call
pub const MAX_RESPONSE_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Body handed to the client, already variable-resolved by the engine.
#[derive(Debug, Clone)]
pub enum SendBody {
    None,
    /// Sent as `application/json`
    Json(JsonValue),
    /// Sent url-encoded
    Form(IndexMap<String, String>),
    /// Sent as-is
    Raw(String),
}

impl SendBody {
    /// Wire-level text for result capture; `None` when there is no body.
    pub fn display_text(&self) -> Option<String> {
        match self {
            SendBody::None => None,
            SendBody::Json(value) => Some(value.to_string()),
            SendBody::Form(fields) => Some(
                fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("&"),
            ),
            SendBody::Raw(text) => Some(text.clone()),
        }
    }
}

/// Classified transport failure, carried inside [`HttpResponse`].
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Captured HTTP response with timing.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// 0 when the request never produced a response
    pub status_code: u16,
    pub headers: IndexMap<String, String>,
    /// Decoded text body (UTF-8, falling back to Latin-1)
    pub body: String,
    pub body_bytes: Bytes,
    /// Wall-clock time for the whole exchange, body included
    pub elapsed_ms: u64,
    pub size_bytes: usize,
    pub error: Option<TransportError>,
}

impl HttpResponse {
    /// Parse the body as JSON.
    pub fn json(&self) -> serde_json::Result<JsonValue> {
        serde_json::from_str(&self.body)
    }

    /// Whether the response declares a JSON content type.
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.to_lowercase().contains("application/json"))
            .unwrap_or(false)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn transport_failure(kind: ErrorKind, message: String, elapsed_ms: u64) -> Self {
        HttpResponse {
            elapsed_ms,
            error: Some(TransportError { kind, message }),
            ..Default::default()
        }
    }
}

/// Pooled HTTP client reused across every request in a run.
///
/// Dropping the client releases the connection pool; there is no explicit
/// close.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
    max_body_size: usize,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("apipulse/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(ApipulseError::Request)?;

        Ok(HttpClient {
            client,
            timeout,
            max_body_size: MAX_RESPONSE_BODY_SIZE,
        })
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Execute one request and capture the response with timing.
    ///
    /// Transport failures come back as a response with `error` set and
    /// status 0, never as `Err`.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &IndexMap<String, String>,
        params: &IndexMap<String, String>,
        body: SendBody,
        timeout: Option<Duration>,
    ) -> HttpResponse {
        let start = Instant::now();
        let effective_timeout = timeout.unwrap_or(self.timeout);

        let method = match Method::from_bytes(method.to_uppercase().as_bytes()) {
            Ok(m) => m,
            Err(e) => {
                return HttpResponse::transport_failure(
                    ErrorKind::Request,
                    format!("Request error: {}", e),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        debug!(method = %method, url = %url, "sending request");

        let mut builder = self.client.request(method, url);

        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        if !params.is_empty() {
            builder = builder.query(params);
        }

        builder = match body {
            SendBody::None => builder,
            SendBody::Json(value) => builder.json(&value),
            SendBody::Form(fields) => builder.form(&fields),
            SendBody::Raw(text) => builder.body(text),
        };

        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return self.classify(e, start, effective_timeout),
        };

        let status_code = response.status().as_u16();
        let headers = header_map(response.headers());

        let raw = match response.bytes().await {
            Ok(raw) => raw,
            Err(e) => return self.classify(e, start, effective_timeout),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let body_bytes = if raw.len() > self.max_body_size {
            raw.slice(..self.max_body_size)
        } else {
            raw
        };
        let body = decode_body(&body_bytes);

        HttpResponse {
            status_code,
            headers,
            body,
            size_bytes: body_bytes.len(),
            body_bytes,
            elapsed_ms,
            error: None,
        }
    }

    fn classify(&self, e: reqwest::Error, start: Instant, timeout: Duration) -> HttpResponse {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let (kind, message) = if e.is_timeout() {
            (
                ErrorKind::Timeout,
                format!("Request timed out after {:?}", timeout),
            )
        } else if e.is_connect() {
            (ErrorKind::Connection, format!("Connection failed: {}", e))
        } else {
            (ErrorKind::Request, format!("Request error: {}", e))
        };
        HttpResponse::transport_failure(kind, message, elapsed_ms)
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    for (name, value) in headers {
        map.insert(
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).to_string(),
        );
    }
    map
}

fn decode_body(raw: &Bytes) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => encoding_rs::mem::decode_latin1(raw).into_owned(),
    }
}
