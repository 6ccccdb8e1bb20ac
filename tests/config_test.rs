//! Integration tests for configuration loading

use camera_courier::domain::types::PixelFormat;
use camera_courier::infra::Config;
use chrono::NaiveTime;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[camera]
device = "/dev/v4l/by-id/usb-webcam"
width = 1280
height = 720
pixel_format = "yuyv"
exposure = 156
focus = 0
warm_up_ms = 500
exposure_command = ""

[retry]
max_retries = 4
delay_secs = 2

[storage]
image_dir = "/var/lib/camera/images"

[schedule]
capture_times = "18:00, 09:15"
run_at_startup = false

[telegram]
bot_token = "123:abc"
chat_id = "-100200"
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.camera_device(), "/dev/v4l/by-id/usb-webcam");
    assert_eq!(config.pixel_format(), PixelFormat::YUYV);
    assert_eq!(config.exposure(), Some(156));
    assert_eq!(config.focus(), Some(0));
    assert_eq!(config.brightness(), None);
    assert_eq!(config.exposure_command(), None);
    assert_eq!(config.max_retries(), 4);
    assert_eq!(config.image_dir(), "/var/lib/camera/images");
    assert_eq!(config.capture_times(), &[hm(9, 15), hm(18, 0)]);
    assert!(!config.run_at_startup());
    assert_eq!(config.telegram_chat_id(), "-100200");
    // Unset field keeps its default
    assert_eq!(config.telegram_api_url(), "https://api.telegram.org");

    let capture = config.capture_config();
    assert_eq!(capture.resolution.to_string(), "1280x720");
    assert_eq!(capture.warm_up, Duration::from_millis(500));
    assert_eq!(capture.retry_delay, Duration::from_secs(2));
}

#[test]
fn test_capture_times_as_array() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[schedule]\ncapture_times = [\"14:00\", \"10:00\", \"14:00\"]\n")
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.capture_times(), &[hm(10, 0), hm(14, 0)]);
}

#[test]
fn test_zero_retries_in_file_raised_to_one() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[retry]\nmax_retries = 0\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.max_retries(), 1);
}

#[test]
fn test_invalid_file_is_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[camera\nwidth = ").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.camera_device(), "0");
    assert_eq!(config.max_retries(), 3);
    assert_eq!(config.retry_delay_secs(), 5);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_shipped_dev_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml");
    let config = Config::from_file(path).unwrap();
    assert_eq!(config.camera_device(), "0");
    assert_eq!(config.capture_times(), &[hm(10, 0), hm(14, 0), hm(18, 0)]);
    assert_eq!(config.exposure(), None);
}
