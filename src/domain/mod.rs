//! Domain models - capture configuration, results and notifications
//!
//! This module contains the canonical data types used throughout the system:
//! - `CaptureConfig` - immutable camera and retry settings for a run
//! - `CaptureResult` - outcome of a single capture attempt
//! - `CaptureFailure` - classification of a failed attempt
//! - `NotificationEvent` - what gets sent to the chat at the end of a run

pub mod notification;
pub mod types;

// Re-export commonly used types at module level
pub use notification::NotificationEvent;
pub use types::{
    CaptureConfig, CaptureFailure, CaptureResult, DeviceId, PixelFormat, Resolution,
};
