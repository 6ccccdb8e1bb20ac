//! Camera device abstraction
//!
//! A [`CameraSource`] opens a [`CameraHandle`]; the handle owns the device
//! until it is dropped. Dropping the handle releases the device, so release
//! happens exactly once on every exit path of an attempt.

use crate::domain::types::{DeviceId, PixelFormat, Resolution};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("cannot open {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: std::io::Error,
    },
    #[error("format {format} {resolution} rejected: {reason}")]
    Format { format: PixelFormat, resolution: Resolution, reason: String },
    #[error("control {control} rejected: {reason}")]
    Control { control: CameraControl, reason: String },
    #[error("stream error: {0}")]
    Stream(#[source] std::io::Error),
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),
}

/// Device controls the configurator touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraControl {
    FocusAuto,
    FocusAbsolute,
    ExposureAuto,
    ExposureAbsolute,
    Brightness,
}

impl CameraControl {
    /// Control name as current kernels report it (`v4l2-ctl --list-ctrls`).
    /// Pre-5.x uvcvideo calls these `focus_auto`, `exposure_auto` and
    /// `exposure_absolute`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CameraControl::FocusAuto => "focus_automatic_continuous",
            CameraControl::FocusAbsolute => "focus_absolute",
            CameraControl::ExposureAuto => "auto_exposure",
            CameraControl::ExposureAbsolute => "exposure_time_absolute",
            CameraControl::Brightness => "brightness",
        }
    }
}

impl std::fmt::Display for CameraControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single frame as delivered by the device
#[derive(Debug, Clone)]
pub struct Frame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Opens camera devices
pub trait CameraSource: Send + Sync {
    type Handle: CameraHandle;

    fn open(&self, device: &DeviceId) -> Result<Self::Handle, DeviceError>;
}

/// An open, exclusively owned camera device
pub trait CameraHandle: Send {
    /// Currently negotiated format and size
    fn format(&self) -> Result<(PixelFormat, Resolution), DeviceError>;

    /// Request a format and size; returns what the driver actually applied
    fn set_format(
        &mut self,
        format: PixelFormat,
        resolution: Resolution,
    ) -> Result<(PixelFormat, Resolution), DeviceError>;

    fn set_control(&mut self, control: CameraControl, value: i64) -> Result<(), DeviceError>;

    /// Let auto-gain and auto-exposure settle before the real read.
    /// Devices that stream can discard frames here instead of idling.
    fn warm_up(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    /// Read exactly one frame
    fn read_frame(&mut self) -> Result<Frame, DeviceError>;
}
