//! binup transport library
//!
//! A multipart upload transport for servers that answer with a processed
//! file (an annotated image, a rendered video) instead of JSON. The response
//! body is handed back as raw bytes, untouched.
//!
//! # Example
//!
//! ```rust,no_run
//! use binup_transport::{TransportConfig, UploadFile, UploadHandlers, UploadRequest, UploadTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = UploadTransport::new(
//!         TransportConfig::builder().base_url("http://localhost:8848").build(),
//!     )?;
//!
//!     let file = UploadFile::from_path("street.jpg").await?;
//!     let request = UploadRequest::new("/detect/pic", file)
//!         .field("model", "yolo")
//!         .header("X-Client", "binup");
//!
//!     // Callback style: returns at once with an abortable handle
//!     let handle = transport.execute(
//!         request.clone(),
//!         UploadHandlers::new(
//!             |image| println!("got {} bytes", image.len()),
//!             |err| eprintln!("upload failed ({}): {}", err.status, err),
//!         ),
//!     );
//!     handle.settled().await;
//!
//!     // Future style
//!     let image = transport.upload(request).await?;
//!     std::fs::write("street.annotated.jpg", &image)?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod form;
pub mod testing;
mod transport;
mod types;

pub use config::{ConfigError, TimeoutsConfig, TransportConfig, TransportConfigBuilder};
pub use error::{Result, TransportError, UploadError};
pub use form::{FormPart, MultipartBody};
pub use transport::{UploadHandle, UploadTransport};
pub use types::*;

// Re-export for callers building header collections and methods
pub use reqwest::header;
pub use reqwest::{Method, Url};
