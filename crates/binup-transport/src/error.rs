//! Error types for upload transport operations

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

/// Result type alias for transport construction
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while setting up a transport.
///
/// These describe a broken environment or configuration and are returned
/// directly to whoever builds the transport. They never reach `on_error`.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No async runtime is available to drive requests
    #[error("no Tokio runtime available: upload transport requires an async runtime")]
    RuntimeUnavailable,

    /// The HTTP client could not be built
    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Invalid base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A configured default header is not a legal HTTP header
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal failure of a single upload, handed once to `on_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UploadError {
    /// Human-readable message
    pub message: String,
    /// HTTP status, 0 when no response was received
    pub status: u16,
    /// HTTP method of the failed request
    pub method: Method,
    /// Target URL as supplied by the caller
    pub url: String,
}

impl UploadError {
    /// Classify a failed upload.
    ///
    /// The message is taken from the `error` field of a JSON body, then from
    /// the body text, and finally synthesized from method, URL and status.
    pub fn classify(method: &Method, url: &str, status: u16, body: &[u8]) -> Self {
        let message = message_from_json(body)
            .or_else(|| message_from_text(body))
            .unwrap_or_else(|| format!("fail to {} {} {}", method, url, status));

        Self {
            message,
            status,
            method: method.clone(),
            url: url.to_string(),
        }
    }

    /// Failure before any HTTP response arrived
    pub fn transport(method: &Method, url: &str, status: Option<u16>) -> Self {
        Self::classify(method, url, status.unwrap_or(0), &[])
    }

    /// Failure before any HTTP response arrived, with an explicit message
    pub fn with_message(method: &Method, url: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: 0,
            method: method.clone(),
            url: url.to_string(),
        }
    }

    /// True when the server never answered
    pub fn is_transport_failure(&self) -> bool {
        self.status == 0
    }
}

fn message_from_json(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn message_from_text(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(body).into_owned())
    }
}
