//! Upload transport: sends a multipart request and hands back the raw body

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::error::{Result, TransportError, UploadError};
use crate::form::MultipartBody;
use crate::types::{UploadHandlers, UploadRequest};

/// Multipart upload transport whose responses are treated as opaque bytes.
///
/// Cheap to clone; clones share the connection pool and the cookie jar.
#[derive(Debug, Clone)]
pub struct UploadTransport {
    client: Client,
    credentialed: Client,
    cookies: Arc<Jar>,
    base_url: Option<Url>,
    runtime: Handle,
    config: TransportConfig,
}

impl UploadTransport {
    /// Create a transport on the current Tokio runtime.
    ///
    /// Fails with [`TransportError::RuntimeUnavailable`] when called outside
    /// of a runtime.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| TransportError::RuntimeUnavailable)?;
        Self::with_runtime(config, runtime)
    }

    /// Create a transport that spawns uploads on the given runtime
    pub fn with_runtime(config: TransportConfig, runtime: Handle) -> Result<Self> {
        let cookies = Arc::new(Jar::default());
        let client = Self::client_builder(&config)?.build()?;
        let credentialed = Self::client_builder(&config)?
            .cookie_provider(cookies.clone())
            .build()?;

        let base_url = config.base_url.as_deref().map(Url::parse).transpose()?;

        debug!(base_url = ?base_url, "upload transport created");

        Ok(Self {
            client,
            credentialed,
            cookies,
            base_url,
            runtime,
            config,
        })
    }

    fn client_builder(config: &TransportConfig) -> Result<reqwest::ClientBuilder> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidHeader(format!("{}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidHeader(format!("{}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers);

        if let Some(timeout) = config.timeouts.request() {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.timeouts.connect() {
            builder = builder.connect_timeout(timeout);
        }

        Ok(builder)
    }

    /// Get the configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Cookie jar consulted for uploads with `with_credentials` set
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.cookies
    }

    /// Resolve an action against the configured base URL.
    ///
    /// Absolute actions and actions without a configured base are returned
    /// unchanged; they fail later, at send time, if they are not valid URLs.
    pub fn resolve_action(&self, action: &str) -> String {
        match (&self.base_url, Url::parse(action)) {
            (_, Ok(url)) => url.into(),
            (Some(base), Err(url::ParseError::RelativeUrlWithoutBase)) => base
                .join(action)
                .map(String::from)
                .unwrap_or_else(|_| action.to_string()),
            _ => action.to_string(),
        }
    }

    /// Start an upload and return immediately.
    ///
    /// The request runs on the transport's runtime. Exactly one of
    /// `on_success` / `on_error` is called once it settles, never before this
    /// function returns. Aborting the returned handle may suppress both.
    pub fn execute(&self, request: UploadRequest, handlers: UploadHandlers) -> UploadHandle {
        let id = Uuid::new_v4();
        let span = tracing::info_span!(
            "upload",
            %id,
            method = %request.method,
            action = %request.action
        );

        if handlers.on_progress.is_some() {
            debug!(%id, "progress handler ignored, progress reporting is disabled");
        }

        let client = if request.with_credentials {
            self.credentialed.clone()
        } else {
            self.client.clone()
        };
        let url = self.resolve_action(&request.action);
        let (armed_tx, armed_rx) = oneshot::channel::<()>();

        let task = self.runtime.spawn(
            async move {
                let outcome = perform(&client, &url, &request).await;

                // Nothing is reported until `execute` has handed out the handle.
                let _ = armed_rx.await;

                match outcome {
                    Ok(body) => {
                        info!(bytes = body.len(), "upload succeeded");
                        (handlers.on_success)(body);
                    }
                    Err(err) => {
                        warn!(status = err.status, message = %err.message, "upload failed");
                        (handlers.on_error)(err);
                    }
                }
            }
            .instrument(span),
        );

        let handle = UploadHandle { id, task };
        let _ = armed_tx.send(());
        handle
    }

    /// Upload and wait for the outcome.
    ///
    /// Same contract as [`execute`](Self::execute), delivered as a future.
    /// Dropping the future aborts the upload.
    pub async fn upload(
        &self,
        request: UploadRequest,
    ) -> std::result::Result<Bytes, UploadError> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let err_slot = slot.clone();

        let method = request.method.clone();
        let action = request.action.clone();

        let handlers = UploadHandlers::new(
            move |body| complete(&slot, Ok(body)),
            move |err| complete(&err_slot, Err(err)),
        );

        let _guard = AbortOnDrop(self.execute(request, handlers));
        rx.await.unwrap_or_else(|_| {
            Err(UploadError::with_message(
                &method,
                &action,
                "upload aborted before completion",
            ))
        })
    }
}

type Outcome = std::result::Result<Bytes, UploadError>;

fn complete(slot: &Mutex<Option<oneshot::Sender<Outcome>>>, outcome: Outcome) {
    if let Some(tx) = slot.lock().take() {
        let _ = tx.send(outcome);
    }
}

struct AbortOnDrop(UploadHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.0.is_finished() {
            self.0.abort();
        }
    }
}

/// Send the request and classify the outcome
async fn perform(client: &Client, url: &str, request: &UploadRequest) -> Outcome {
    let method: &Method = &request.method;
    let action = request.action.as_str();

    let body = MultipartBody::from_request(request);
    debug!(
        parts = body.parts().len(),
        payload_bytes = body.payload_len(),
        "opening upload request"
    );

    let form = body.into_form().map_err(|e| {
        UploadError::with_message(method, action, format!("invalid multipart body: {}", e))
    })?;

    let mut builder = client.request(method.clone(), url).multipart(form);

    if let Some(headers) = &request.headers {
        let headers = headers
            .normalize()
            .map_err(|e| UploadError::with_message(method, action, e))?;
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
    }

    let response = builder.send().await.map_err(|e| {
        debug!(error = %e, "transport error before response");
        UploadError::transport(method, action, e.status().map(|s| s.as_u16()))
    })?;

    let status = response.status().as_u16();
    debug!(status, "response received");

    let bytes = response.bytes().await.map_err(|e| {
        debug!(error = %e, "response body interrupted");
        UploadError::transport(method, action, None)
    })?;

    if (200..300).contains(&status) {
        Ok(bytes)
    } else {
        Err(UploadError::classify(method, action, status, &bytes))
    }
}

/// Live handle to an in-flight upload
#[derive(Debug)]
pub struct UploadHandle {
    id: Uuid,
    task: JoinHandle<()>,
}

impl UploadHandle {
    /// Identifier used in this upload's log span
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel the upload. Callbacks that have not run yet will not run.
    pub fn abort(&self) {
        debug!(id = %self.id, "aborting upload");
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the upload is over.
    ///
    /// Returns `true` if a completion callback ran, `false` if the upload was
    /// aborted or a callback panicked.
    pub async fn settled(self) -> bool {
        self.task.await.is_ok()
    }
}
