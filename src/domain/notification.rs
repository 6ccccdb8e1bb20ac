//! Notification events sent to the chat

use chrono::{DateTime, Local};
use std::path::PathBuf;

/// Human-readable timestamp used in captions and alerts
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What the pipeline tells the operator at the end of a run.
///
/// Constructed, sent and dropped; nothing is persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Error { message: String, at: DateTime<Local> },
    Image { path: PathBuf, caption: String },
}

impl NotificationEvent {
    pub fn error(message: impl Into<String>, at: DateTime<Local>) -> Self {
        NotificationEvent::Error { message: message.into(), at }
    }

    /// Image notification whose caption carries the capture time
    pub fn image(path: PathBuf, captured_at: DateTime<Local>) -> Self {
        NotificationEvent::Image { path, caption: Self::caption(&captured_at) }
    }

    /// Caption attached to a delivered image
    pub fn caption(captured_at: &DateTime<Local>) -> String {
        format!("Captured at {}", captured_at.format(DISPLAY_TIME_FORMAT))
    }

    /// Text body of an error alert
    pub fn error_text(message: &str, at: &DateTime<Local>) -> String {
        format!("⚠️ ERROR: {}\nTime: {}", message, at.format(DISPLAY_TIME_FORMAT))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::Error { .. } => "error",
            NotificationEvent::Image { .. } => "image",
        }
    }
}
