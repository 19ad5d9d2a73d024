//! Output handling for binup
//!
//! Status messages go to stderr so that stdout can carry the binary body.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use binup_transport::UploadError;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Context for output rendering
pub struct OutputContext {
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg);
        }
    }

    /// Print an upload failure, always
    pub fn upload_error(&self, err: &UploadError) {
        eprintln!("{} {}", "Upload failed:".red().bold(), err.message);
        let status = if err.is_transport_failure() {
            "0 (no response)".to_string()
        } else {
            err.status.to_string()
        };
        eprintln!("  status: {}", status);
        eprintln!("  request: {} {}", err.method, err.url);
    }

    /// Spinner shown while waiting for the server
    pub fn spinner(&self, msg: String) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(msg);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

/// Write the response body to a file, or to stdout when no path is given
pub fn write_body(output: Option<&Path>, body: &[u8]) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, body)
            .with_context(|| format!("Failed to write output file: {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(body).context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")
        }
    }
}
