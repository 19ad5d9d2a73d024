//! Request-side types for the upload transport

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{Map, Value};

use crate::error::UploadError;

/// Multipart field name used for the file when none is given
pub const DEFAULT_FILE_FIELD: &str = "file";

/// The file being uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Filename sent in the part's `Content-Disposition`
    pub name: String,
    /// File contents
    pub data: Bytes,
    /// Optional MIME type for the part
    pub content_type: Option<String>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            content_type: None,
        }
    }

    /// Set the part's MIME type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a file from disk, naming it after the path's last component
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, data))
    }
}

/// Value of an extra multipart field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain text part
    Text(String),
    /// Binary part without a filename
    Blob(Bytes),
    /// Binary part carrying its own filename
    NamedBlob { data: Bytes, filename: String },
    /// Any other shape; left out of the body
    Unsupported(Value),
}

impl FieldValue {
    pub fn named_blob(data: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self::NamedBlob {
            data: data.into(),
            filename: filename.into(),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Bytes> for FieldValue {
    fn from(value: Bytes) -> Self {
        Self::Blob(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value.into())
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            other => Self::Unsupported(other),
        }
    }
}

/// Headers supplied with a request.
///
/// Either an already-typed header collection or a loose name/value mapping
/// whose `null` entries are skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestHeaders {
    Collection(HeaderMap),
    Mapping(Map<String, Value>),
}

impl RequestHeaders {
    /// Flatten into the ordered list of headers to set on the wire
    pub fn normalize(&self) -> Result<Vec<(HeaderName, HeaderValue)>, String> {
        match self {
            Self::Collection(map) => Ok(map
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()),
            Self::Mapping(map) => {
                let mut headers = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let text = match value {
                        Value::Null => continue,
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    let name = HeaderName::from_bytes(key.as_bytes())
                        .map_err(|e| format!("invalid header name `{}`: {}", key, e))?;
                    let value = HeaderValue::from_str(&text)
                        .map_err(|e| format!("invalid value for header `{}`: {}", key, e))?;
                    headers.push((name, value));
                }
                Ok(headers)
            }
        }
    }
}

impl From<HeaderMap> for RequestHeaders {
    fn from(map: HeaderMap) -> Self {
        Self::Collection(map)
    }
}

impl From<Map<String, Value>> for RequestHeaders {
    fn from(map: Map<String, Value>) -> Self {
        Self::Mapping(map)
    }
}

/// Description of one upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Target URL, absolute or relative to the configured base URL
    pub action: String,
    pub method: Method,
    /// Multipart field name the file is attached under
    pub file_field: String,
    pub file: UploadFile,
    /// Extra fields, appended in order before the file
    pub data: Vec<(String, FieldValue)>,
    pub headers: Option<RequestHeaders>,
    /// Attach the transport's cookies
    pub with_credentials: bool,
}

impl UploadRequest {
    pub fn new(action: impl Into<String>, file: UploadFile) -> Self {
        Self {
            action: action.into(),
            method: Method::POST,
            file_field: DEFAULT_FILE_FIELD.to_string(),
            file,
            data: Vec::new(),
            headers: None,
            with_credentials: false,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn file_field(mut self, name: impl Into<String>) -> Self {
        self.file_field = name.into();
        self
    }

    /// Append an extra multipart field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.data.push((name.into(), value.into()));
        self
    }

    pub fn headers(mut self, headers: impl Into<RequestHeaders>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    /// Add one header to a mapping, starting one if needed.
    ///
    /// Replaces any header collection set earlier.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = match self.headers.take() {
            Some(RequestHeaders::Mapping(map)) => map,
            _ => Map::new(),
        };
        map.insert(name.into(), value.into());
        self.headers = Some(RequestHeaders::Mapping(map));
        self
    }

    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = enabled;
        self
    }
}

/// Upload progress snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
    pub percent: f64,
}

pub type SuccessHandler = Box<dyn FnOnce(Bytes) + Send + 'static>;
pub type ErrorHandler = Box<dyn FnOnce(UploadError) + Send + 'static>;
pub type ProgressHandler = Box<dyn FnMut(UploadProgress) + Send + 'static>;

/// Completion callbacks for one upload.
///
/// Exactly one of `on_success` / `on_error` runs, once, after the request
/// settles. `on_progress` is accepted but progress is never reported.
pub struct UploadHandlers {
    pub on_progress: Option<ProgressHandler>,
    pub on_success: SuccessHandler,
    pub on_error: ErrorHandler,
}

impl UploadHandlers {
    pub fn new<S, E>(on_success: S, on_error: E) -> Self
    where
        S: FnOnce(Bytes) + Send + 'static,
        E: FnOnce(UploadError) + Send + 'static,
    {
        Self {
            on_progress: None,
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        }
    }

    pub fn on_progress<P>(mut self, on_progress: P) -> Self
    where
        P: FnMut(UploadProgress) + Send + 'static,
    {
        self.on_progress = Some(Box::new(on_progress));
        self
    }
}

impl fmt::Debug for UploadHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadHandlers")
            .field("on_progress", &self.on_progress.is_some())
            .finish_non_exhaustive()
    }
}
