//! V4L2 camera backend
//!
//! Opens `/dev/video*` nodes through the `v4l` crate, negotiates the format,
//! sets controls via VIDIOC_S_CTRL and reads frames from a memory-mapped
//! stream.

use crate::domain::types::{DeviceId, PixelFormat, Resolution};
use crate::io::camera::{CameraControl, CameraHandle, CameraSource, DeviceError, Frame};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_USER: u32 = 0x00980000;
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;

const V4L2_CID_BASE: u32 = V4L2_CTRL_CLASS_USER | 0x900;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

// ===== V4L2 Control IDs =====
const V4L2_CID_BRIGHTNESS: u32 = V4L2_CID_BASE;
/// Exposure mode menu: Auto, Manual, Shutter Priority, Aperture Priority
const V4L2_CID_EXPOSURE_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 1;
/// Absolute exposure time in 100µs units
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 2;
const V4L2_CID_FOCUS_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 10;
const V4L2_CID_FOCUS_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 12;

/// Buffers in the mmap ring; each one can hold a stale frame
const STREAM_BUFFERS: u32 = 2;

fn control_id(control: CameraControl) -> u32 {
    match control {
        CameraControl::FocusAuto => V4L2_CID_FOCUS_AUTO,
        CameraControl::FocusAbsolute => V4L2_CID_FOCUS_ABSOLUTE,
        CameraControl::ExposureAuto => V4L2_CID_EXPOSURE_AUTO,
        CameraControl::ExposureAbsolute => V4L2_CID_EXPOSURE_ABSOLUTE,
        CameraControl::Brightness => V4L2_CID_BRIGHTNESS,
    }
}

fn control_value(control: CameraControl, value: i64) -> Value {
    match control {
        CameraControl::FocusAuto => Value::Boolean(value != 0),
        _ => Value::Integer(value),
    }
}

/// Opens V4L2 devices
#[derive(Debug, Default, Clone)]
pub struct V4l2Source;

impl CameraSource for V4l2Source {
    type Handle = V4l2Handle;

    fn open(&self, device: &DeviceId) -> Result<V4l2Handle, DeviceError> {
        let path = device.path();
        let dev = Device::with_path(&path)
            .map_err(|source| DeviceError::Open { device: device.to_string(), source })?;
        debug!(device = %device, "v4l2_device_opened");
        Ok(V4l2Handle { stream: None, device: dev, label: device.to_string() })
    }
}

/// Open V4L2 device.
///
/// Field order matters: the stream is dropped (streaming off, buffers
/// unmapped) before the device file descriptor is closed.
pub struct V4l2Handle {
    stream: Option<Stream<'static>>,
    device: Device,
    label: String,
}

impl V4l2Handle {
    fn stream(&mut self) -> Result<&mut Stream<'static>, DeviceError> {
        if self.stream.is_none() {
            let stream = Stream::with_buffers(&self.device, Type::VideoCapture, STREAM_BUFFERS)
                .map_err(DeviceError::Stream)?;
            self.stream = Some(stream);
        }
        self.stream.as_mut().ok_or_else(|| {
            DeviceError::Stream(std::io::Error::new(std::io::ErrorKind::Other, "stream not started"))
        })
    }
}

impl CameraHandle for V4l2Handle {
    fn format(&self) -> Result<(PixelFormat, Resolution), DeviceError> {
        let format = self.device.format().map_err(DeviceError::Stream)?;
        Ok((
            PixelFormat(format.fourcc.repr),
            Resolution { width: format.width, height: format.height },
        ))
    }

    fn set_format(
        &mut self,
        format: PixelFormat,
        resolution: Resolution,
    ) -> Result<(PixelFormat, Resolution), DeviceError> {
        let requested = Format::new(resolution.width, resolution.height, FourCC::new(format.as_bytes()));
        let applied = self.device.set_format(&requested).map_err(|e| DeviceError::Format {
            format,
            resolution,
            reason: e.to_string(),
        })?;
        Ok((
            PixelFormat(applied.fourcc.repr),
            Resolution { width: applied.width, height: applied.height },
        ))
    }

    fn set_control(&mut self, control: CameraControl, value: i64) -> Result<(), DeviceError> {
        let ctrl = Control { id: control_id(control), value: control_value(control, value) };
        self.device
            .set_control(ctrl)
            .map_err(|e| DeviceError::Control { control, reason: e.to_string() })
    }

    /// Start streaming and throw frames away until `duration` has passed
    fn warm_up(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut discarded = 0u32;
        let stream = match self.stream() {
            Ok(stream) => stream,
            Err(e) => {
                // read_frame will hit the same error and report it
                debug!(error = %e, "v4l2_warm_up_stream_failed");
                return;
            }
        };
        while Instant::now() < deadline {
            match stream.next() {
                Ok(_) => discarded += 1,
                Err(e) => {
                    debug!(error = %e, "v4l2_warm_up_read_failed");
                    break;
                }
            }
        }
        if let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            std::thread::sleep(remaining);
        }
        debug!(discarded = %discarded, "v4l2_warm_up_done");
    }

    fn read_frame(&mut self) -> Result<Frame, DeviceError> {
        let (format, resolution) = self.format()?;
        let stream = self.stream()?;
        let (buf, meta) = stream.next().map_err(DeviceError::Stream)?;

        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        if used == 0 {
            return Err(DeviceError::UnsupportedFrame("empty buffer".to_string()));
        }

        Ok(Frame {
            format,
            width: resolution.width,
            height: resolution.height,
            data: buf[..used].to_vec(),
        })
    }
}

impl Drop for V4l2Handle {
    fn drop(&mut self) {
        // Stream must be torn down before the device fd closes
        self.stream.take();
        info!(device = %self.label, "camera_released");
    }
}
