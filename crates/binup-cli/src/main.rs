//! binup - upload a file and save the server's binary response
//!
//! Sends the file as `multipart/form-data` together with any extra fields and
//! writes whatever the server answers (an annotated image, a processed video)
//! to a file or to stdout, byte for byte.

mod args;
mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use binup_transport::{
    FieldValue, Method, UploadFile, UploadHandlers, UploadRequest, UploadTransport, Url,
};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{write_body, OutputContext};

#[derive(Parser)]
#[command(name = "binup")]
#[command(author, version, about = "Upload a file and save the server's binary response")]
struct Cli {
    /// Upload URL (absolute, or relative to the configured base URL)
    action: String,

    /// File to upload
    file: PathBuf,

    /// HTTP method [default: POST]
    #[arg(short = 'X', long)]
    method: Option<String>,

    /// Multipart field name for the file [default: file]
    #[arg(long)]
    file_field: Option<String>,

    /// Extra text field (repeatable)
    #[arg(short = 'F', long = "field", value_name = "NAME=VALUE", value_parser = args::parse_key_value)]
    fields: Vec<(String, String)>,

    /// Extra binary field read from a file, sent with its filename (repeatable)
    #[arg(long = "blob", value_name = "NAME=PATH", value_parser = args::parse_key_value)]
    blobs: Vec<(String, String)>,

    /// Request header (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", value_parser = args::parse_header)]
    headers: Vec<(String, String)>,

    /// Send cookies with the upload
    #[arg(long)]
    with_credentials: bool,

    /// Cookie to send when --with-credentials is set (repeatable)
    #[arg(long = "cookie", value_name = "NAME=VALUE", value_parser = args::parse_key_value)]
    cookies: Vec<(String, String)>,

    /// Request timeout in milliseconds (unbounded by default)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Configuration file path
    #[arg(short, long, env = "BINUP_CONFIG")]
    config: Option<PathBuf>,

    /// Write the response body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    let merged = config.merge_with_args(
        cli.method.as_deref(),
        cli.file_field.as_deref(),
        cli.timeout_ms,
    );
    debug!(?merged, "resolved configuration");
    let ctx = OutputContext::new(cli.no_color, cli.quiet);

    let transport =
        UploadTransport::new(merged.transport).context("Failed to create upload transport")?;
    let request = build_request(&cli, &merged.method, merged.file_field).await?;

    if !cli.cookies.is_empty() {
        let target = transport.resolve_action(&cli.action);
        let url: Url = target
            .parse()
            .with_context(|| format!("Cannot attach cookies to `{}`", target))?;
        for (name, value) in &cli.cookies {
            transport
                .cookie_jar()
                .add_cookie_str(&format!("{}={}", name, value), &url);
        }
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let err_tx = tx.clone();
    let handle = transport.execute(
        request,
        UploadHandlers::new(
            move |body| {
                let _ = tx.send(Ok(body));
            },
            move |err| {
                let _ = err_tx.send(Err(err));
            },
        ),
    );

    let pb = ctx.spinner(format!("Uploading {}...", cli.file.display()));
    let outcome = tokio::select! {
        outcome = rx.recv() => outcome,
        _ = tokio::signal::ctrl_c() => {
            handle.abort();
            pb.finish_and_clear();
            ctx.info("Upload cancelled");
            return Ok(ExitCode::from(130));
        }
    };
    pb.finish_and_clear();

    match outcome {
        Some(Ok(body)) => {
            write_body(cli.output.as_deref(), &body)?;
            match &cli.output {
                Some(path) => ctx.success(&format!(
                    "Received {} bytes, saved to {}",
                    body.len(),
                    path.display()
                )),
                None => ctx.success(&format!("Received {} bytes", body.len())),
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Err(err)) => {
            ctx.upload_error(&err);
            Ok(ExitCode::FAILURE)
        }
        None => anyhow::bail!("upload ended without a result"),
    }
}

/// Assemble the upload from command-line arguments
async fn build_request(cli: &Cli, method: &str, file_field: String) -> Result<UploadRequest> {
    let method = Method::from_bytes(method.as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;
    let file = UploadFile::from_path(&cli.file)
        .await
        .with_context(|| format!("Failed to read file: {}", cli.file.display()))?;

    let mut request = UploadRequest::new(cli.action.clone(), file)
        .method(method)
        .file_field(file_field)
        .with_credentials(cli.with_credentials);

    for (name, value) in &cli.fields {
        request = request.field(name.clone(), value.as_str());
    }

    for (name, path) in &cli.blobs {
        let blob = UploadFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read blob field `{}` from {}", name, path))?;
        request = request.field(name.clone(), FieldValue::named_blob(blob.data, blob.name));
    }

    for (name, value) in &cli.headers {
        request = request.header(name.clone(), value.clone());
    }

    Ok(request)
}
