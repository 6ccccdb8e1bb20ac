//! Notifier contract - how the pipeline talks to the chat
//!
//! Two operations, both fallible. The pipeline decides what to do on
//! failure; implementations only report it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("notifier not configured: {0}")]
    NotConfigured(&'static str),
    #[error("image file not found: {}", .0.display())]
    MissingImage(PathBuf),
    #[error("failed to read image {}: {source}", .path.display())]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat API rejected request (status {status}): {description}")]
    Rejected { status: u16, description: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a plain text alert
    async fn send_error(&self, text: &str) -> Result<(), DeliveryError>;

    /// Send an image file with a caption
    async fn send_image(&self, path: &Path, caption: &str) -> Result<(), DeliveryError>;
}
