//! Shared types for the capture pipeline

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// strftime pattern used for stored image file names
pub const IMAGE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Extension of every stored image
pub const IMAGE_EXTENSION: &str = "jpg";

/// Camera device identifier.
///
/// A bare index (`"0"`) refers to `/dev/video<index>`, anything else is
/// treated as a device path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Device node path
    pub fn path(&self) -> PathBuf {
        match self.0.parse::<u32>() {
            Ok(index) => PathBuf::from(format!("/dev/video{}", index)),
            Err(_) => PathBuf::from(&self.0),
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

/// Four-character pixel format code (e.g. `MJPG`, `YUYV`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PixelFormat(pub [u8; 4]);

impl PixelFormat {
    pub const MJPG: PixelFormat = PixelFormat(*b"MJPG");
    pub const YUYV: PixelFormat = PixelFormat(*b"YUYV");

    /// Parse a FourCC tag. Shorter tags are space padded, as V4L2 does.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        if tag.is_empty() || tag.len() > 4 || !tag.is_ascii() {
            return None;
        }
        let mut code = [b' '; 4];
        for (slot, byte) in code.iter_mut().zip(tag.to_ascii_uppercase().bytes()) {
            *slot = byte;
        }
        Some(Self(code))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0).trim_end())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Everything one pipeline run needs to know about the camera.
///
/// Built once at startup from [`crate::infra::Config`] and never mutated.
/// Exposure, brightness and focus are optional: `None` leaves the device's
/// own setting untouched.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub device: DeviceId,
    pub resolution: Resolution,
    pub pixel_format: PixelFormat,
    pub exposure: Option<i64>,
    pub brightness: Option<i64>,
    pub focus: Option<i64>,
    pub warm_up: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub capture_timeout: Duration,
    pub image_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: DeviceId::new("0"),
            resolution: Resolution { width: 1920, height: 1080 },
            pixel_format: PixelFormat::MJPG,
            exposure: None,
            brightness: None,
            focus: None,
            warm_up: Duration::from_secs(2),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            capture_timeout: Duration::from_secs(30),
            image_dir: PathBuf::from("images"),
        }
    }
}

/// Why a single capture attempt failed.
///
/// The retry loop treats every variant the same; the distinction only shows
/// up in logs and in the final error notification.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureFailure {
    #[error("device open failed: {0}")]
    DeviceOpen(String),
    #[error("frame read failed: {0}")]
    FrameRead(String),
    #[error("image write failed: {0}")]
    Storage(String),
    #[error("capture timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("capture aborted: {0}")]
    Aborted(String),
}

impl CaptureFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureFailure::DeviceOpen(_) => "device_open",
            CaptureFailure::FrameRead(_) => "frame_read",
            CaptureFailure::Storage(_) => "storage",
            CaptureFailure::TimedOut(_) => "timeout",
            CaptureFailure::Aborted(_) => "aborted",
        }
    }
}

/// Outcome of one capture attempt
#[derive(Debug, Clone)]
pub enum CaptureResult {
    Success { path: PathBuf, timestamp: DateTime<Local> },
    Failure { reason: CaptureFailure, attempt: u32 },
}

impl CaptureResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CaptureResult::Success { .. })
    }
}

/// File name for an image captured at `timestamp` (`YYYYMMDD_HHMMSS.jpg`).
///
/// Two captures within the same second map to the same name; the later one
/// overwrites the earlier.
pub fn image_file_name(timestamp: &DateTime<Local>) -> String {
    format!("{}.{}", timestamp.format(IMAGE_TIMESTAMP_FORMAT), IMAGE_EXTENSION)
}

/// Full path of the image captured at `timestamp` inside `dir`
pub fn image_path(dir: &Path, timestamp: &DateTime<Local>) -> PathBuf {
    dir.join(image_file_name(timestamp))
}
