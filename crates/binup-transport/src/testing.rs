//! Test utilities for binup-transport
//!
//! Provides a disposable local HTTP server for exercising the transport
//! end to end, plus a helper to read back multipart bodies on the server side.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::multipart::{Multipart, MultipartError};
use bytes::Bytes;
use tokio::net::TcpListener;

use crate::{Result, TransportConfig, UploadTransport};

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub transport: UploadTransport,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Start a server for an axum Router, with a transport whose base URL
    /// points at it
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{routing::post, Router};
    /// use binup_transport::testing::TestServer;
    /// use binup_transport::{UploadFile, UploadRequest};
    ///
    /// let router = Router::new().route("/detect", post(|| async { "ok" }));
    /// let server = TestServer::start(router).await?;
    ///
    /// let body = server
    ///     .transport
    ///     .upload(UploadRequest::new("/detect", UploadFile::new("a.jpg", vec![1, 2])))
    ///     .await?;
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        Self::start_with_config(router, TransportConfig::builder()).await
    }

    /// Start a server with a customised transport configuration.
    ///
    /// The builder's base URL is replaced by the server's address.
    pub async fn start_with_config<S>(
        router: axum::Router<S>,
        config: crate::TransportConfigBuilder,
    ) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router: axum::Router = router.into();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let transport = UploadTransport::new(config.base_url(format!("http://{}", addr)).build())?;

        Ok(Self {
            addr,
            transport,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for a path on the test server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Get a reference to the transport
    pub fn transport(&self) -> &UploadTransport {
        &self.transport
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// One multipart part as seen by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Drain a multipart request into its parts, in wire order
pub async fn read_parts(
    mut multipart: Multipart,
) -> std::result::Result<Vec<ReceivedPart>, MultipartError> {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(String::from);
        let content_type = field.content_type().map(String::from);
        let data = field.bytes().await?;
        parts.push(ReceivedPart {
            name,
            filename,
            content_type,
            data,
        });
    }
    Ok(parts)
}
