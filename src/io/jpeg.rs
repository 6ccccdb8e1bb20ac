//! Turn raw device frames into JPEG bytes
//!
//! MJPG frames are already JPEG and pass through untouched. YUYV (4:2:2)
//! frames are converted to RGB and encoded.

use crate::domain::types::PixelFormat;
use crate::io::camera::{DeviceError, Frame};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};

/// JPEG start-of-image marker
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

const JPEG_QUALITY: u8 = 92;

/// Encode `frame` as JPEG
pub fn to_jpeg(frame: Frame) -> Result<Vec<u8>, DeviceError> {
    match frame.format {
        PixelFormat::MJPG => {
            if !frame.data.starts_with(&JPEG_SOI) {
                return Err(DeviceError::UnsupportedFrame(
                    "MJPG frame without JPEG start marker".to_string(),
                ));
            }
            Ok(frame.data)
        }
        PixelFormat::YUYV => encode_yuyv(&frame),
        other => Err(DeviceError::UnsupportedFrame(format!("pixel format {} not supported", other))),
    }
}

fn encode_yuyv(frame: &Frame) -> Result<Vec<u8>, DeviceError> {
    let expected = frame.width as usize * frame.height as usize * 2;
    if frame.data.len() < expected {
        return Err(DeviceError::UnsupportedFrame(format!(
            "YUYV frame too short: {} bytes, expected {}",
            frame.data.len(),
            expected
        )));
    }

    let mut rgb = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
    for chunk in frame.data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }

    let image: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(frame.width, frame.height, rgb).ok_or_else(|| {
            DeviceError::UnsupportedFrame("YUYV frame dimensions mismatch".to_string())
        })?;

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(&image)
        .map_err(|e| DeviceError::UnsupportedFrame(format!("JPEG encode failed: {}", e)))?;
    Ok(buffer)
}

/// BT.601 limited range to RGB
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [clamp(c + 409 * e), clamp(c - 100 * d - 208 * e), clamp(c + 516 * d)]
}
