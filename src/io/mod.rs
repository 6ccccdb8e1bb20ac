//! IO modules - external system interfaces
//!
//! - `camera` - camera device traits and device errors
//! - `v4l2` - Video4Linux2 camera backend
//! - `v4l2_ctl` - exposure fallback via the `v4l2-ctl` tool
//! - `jpeg` - frame to JPEG conversion
//! - `image_store` - image files on disk
//! - `notifier` - notifier contract
//! - `telegram` - Telegram Bot API notifier

pub mod camera;
pub mod image_store;
pub mod jpeg;
pub mod notifier;
pub mod telegram;
pub mod v4l2;
pub mod v4l2_ctl;

// Re-export commonly used types
pub use camera::{CameraControl, CameraHandle, CameraSource, DeviceError, Frame};
pub use image_store::ImageStore;
pub use notifier::{DeliveryError, Notifier};
pub use telegram::TelegramNotifier;
pub use v4l2::V4l2Source;
pub use v4l2_ctl::{CommandOutcome, ExposureCommand, V4l2Ctl};
