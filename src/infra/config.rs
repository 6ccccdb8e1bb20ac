//! Configuration loading from TOML files and environment variables
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Environment variables (CAMERA_DEVICE, IMAGE_DIR, MAX_RETRIES, ...) are
//! applied on top of whatever the file provided. A `.env` file in the working
//! directory supplies variables the process environment does not set.

use crate::domain::types::{CaptureConfig, DeviceId, PixelFormat, Resolution};
use anyhow::Context;
use chrono::NaiveTime;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/dev.toml";
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Read `KEY=value` pairs from a dotenv file. A missing file is empty; a
/// malformed one is used up to the first bad line.
pub fn read_env_file<P: AsRef<Path>>(path: P) -> HashMap<String, String> {
    let path = path.as_ref();
    let mut vars = HashMap::new();
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return vars,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "env_file_unreadable");
            return vars;
        }
    };
    for item in iter {
        match item {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "env_file_invalid");
                break;
            }
        }
    }
    info!(path = %path.display(), vars = %vars.len(), "env_file_loaded");
    vars
}

/// Variable lookup that prefers `primary` and falls back to `file`
fn layered<'a, P>(primary: P, file: &'a HashMap<String, String>) -> impl Fn(&str) -> Option<String> + 'a
where
    P: Fn(&str) -> Option<String> + 'a,
{
    move |key| primary(key).or_else(|| file.get(key).cloned())
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraSection {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    #[serde(default)]
    pub exposure: Option<i64>,
    #[serde(default)]
    pub brightness: Option<i64>,
    #[serde(default)]
    pub focus: Option<i64>,
    #[serde(default = "default_warm_up_ms")]
    pub warm_up_ms: u64,
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,
    /// External control tool used when the driver rejects exposure ioctls.
    /// Empty string disables the fallback.
    #[serde(default = "default_exposure_command")]
    pub exposure_command: String,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            device: default_device(),
            width: default_width(),
            height: default_height(),
            pixel_format: default_pixel_format(),
            exposure: None,
            brightness: None,
            focus: None,
            warm_up_ms: default_warm_up_ms(),
            capture_timeout_secs: default_capture_timeout_secs(),
            exposure_command: default_exposure_command(),
        }
    }
}

fn default_device() -> String {
    "0".to_string()
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_pixel_format() -> String {
    "MJPG".to_string()
}

fn default_warm_up_ms() -> u64 {
    2000
}

fn default_capture_timeout_secs() -> u64 {
    30
}

fn default_exposure_command() -> String {
    "v4l2-ctl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self { max_retries: default_max_retries(), delay_secs: default_retry_delay_secs() }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self { image_dir: default_image_dir() }
    }
}

fn default_image_dir() -> String {
    "images".to_string()
}

/// Capture times either as a TOML array or as one comma separated string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CaptureTimes {
    List(Vec<String>),
    Csv(String),
}

impl CaptureTimes {
    fn entries(&self) -> Vec<String> {
        match self {
            CaptureTimes::List(list) => list.clone(),
            CaptureTimes::Csv(csv) => csv.split(',').map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    #[serde(default = "default_capture_times")]
    pub capture_times: CaptureTimes,
    #[serde(default = "default_run_at_startup")]
    pub run_at_startup: bool,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self { capture_times: default_capture_times(), run_at_startup: default_run_at_startup() }
    }
}

fn default_capture_times() -> CaptureTimes {
    CaptureTimes::Csv(DEFAULT_CAPTURE_TIMES.to_string())
}

fn default_run_at_startup() -> bool {
    true
}

const DEFAULT_CAPTURE_TIMES: &str = "10:00,14:00,18:00";

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_telegram_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_url: default_api_url(),
            timeout_secs: default_telegram_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_telegram_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub telegram: TelegramSection,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    camera_device: String,
    camera_width: u32,
    camera_height: u32,
    pixel_format: PixelFormat,
    exposure: Option<i64>,
    brightness: Option<i64>,
    focus: Option<i64>,
    warm_up_ms: u64,
    capture_timeout_secs: u64,
    exposure_command: Option<String>,
    max_retries: u32,
    retry_delay_secs: u64,
    image_dir: String,
    capture_times: Vec<NaiveTime>,
    run_at_startup: bool,
    telegram_bot_token: String,
    telegram_chat_id: String,
    telegram_api_url: String,
    telegram_timeout_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path<F>(cli_path: Option<&str>, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Some(path) = lookup("CONFIG_FILE") {
            return path;
        }

        DEFAULT_CONFIG_PATH.to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let camera = toml_config.camera;

        let pixel_format = PixelFormat::parse(&camera.pixel_format).unwrap_or_else(|| {
            warn!(value = %camera.pixel_format, "config_invalid_pixel_format");
            PixelFormat::MJPG
        });

        let exposure_command = Some(camera.exposure_command.trim().to_string())
            .filter(|command| !command.is_empty());

        Self {
            camera_device: camera.device,
            camera_width: camera.width,
            camera_height: camera.height,
            pixel_format,
            exposure: camera.exposure,
            brightness: camera.brightness,
            focus: camera.focus,
            warm_up_ms: camera.warm_up_ms,
            capture_timeout_secs: camera.capture_timeout_secs,
            exposure_command,
            max_retries: clamp_retries(toml_config.retry.max_retries),
            retry_delay_secs: toml_config.retry.delay_secs,
            image_dir: toml_config.storage.image_dir,
            capture_times: parse_capture_times(&toml_config.schedule.capture_times.entries()),
            run_at_startup: toml_config.schedule.run_at_startup,
            telegram_bot_token: toml_config.telegram.bot_token,
            telegram_chat_id: toml_config.telegram.chat_id,
            telegram_api_url: toml_config.telegram.api_url,
            telegram_timeout_secs: toml_config.telegram.timeout_secs,
            config_file,
        }
    }

    /// Load configuration from a path, falling back to defaults if the file
    /// is missing or invalid
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_file_unavailable_using_defaults");
                Self::default()
            }
        }
    }

    /// Full load: file (or defaults), then environment overrides from the
    /// process and `.env`
    pub fn load(cli_path: Option<&str>) -> Self {
        let env_file = read_env_file(DEFAULT_ENV_FILE);
        let lookup = layered(|key: &str| env::var(key).ok(), &env_file);

        let config_path = Self::resolve_config_path(cli_path, &lookup);
        let mut config = Self::load_from_path(&config_path);
        config.apply_env_overrides(&lookup);
        config
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CAMERA_DEVICE") {
            self.camera_device = value.trim().to_string();
        }
        if let Some(value) = parse_env(&lookup, "CAMERA_WIDTH") {
            self.camera_width = value;
        }
        if let Some(value) = parse_env(&lookup, "CAMERA_HEIGHT") {
            self.camera_height = value;
        }
        if let Some(value) = lookup("CAMERA_PIXEL_FORMAT") {
            match PixelFormat::parse(&value) {
                Some(format) => self.pixel_format = format,
                None => warn!(key = "CAMERA_PIXEL_FORMAT", value = %value, "config_env_invalid"),
            }
        }
        if let Some(value) = parse_env(&lookup, "CAMERA_EXPOSURE") {
            self.exposure = Some(value);
        }
        if let Some(value) = parse_env(&lookup, "CAMERA_BRIGHTNESS") {
            self.brightness = Some(value);
        }
        if let Some(value) = parse_env(&lookup, "CAMERA_FOCUS") {
            self.focus = Some(value);
        }
        if let Some(value) = lookup("IMAGE_DIR") {
            self.image_dir = value;
        }
        if let Some(value) = parse_env(&lookup, "MAX_RETRIES") {
            self.max_retries = clamp_retries(value);
        }
        if let Some(value) = parse_env(&lookup, "RETRY_DELAY") {
            self.retry_delay_secs = value;
        }
        if let Some(value) = lookup("CAPTURE_TIMES") {
            let entries: Vec<String> = value.split(',').map(str::to_string).collect();
            self.capture_times = parse_capture_times(&entries);
        }
        if let Some(value) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = value;
        }
        if let Some(value) = lookup("TELEGRAM_CHAT_ID") {
            self.telegram_chat_id = value;
        }
    }

    /// Immutable capture settings handed to the pipeline
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: DeviceId::new(self.camera_device.clone()),
            resolution: Resolution { width: self.camera_width, height: self.camera_height },
            pixel_format: self.pixel_format,
            exposure: self.exposure,
            brightness: self.brightness,
            focus: self.focus,
            warm_up: Duration::from_millis(self.warm_up_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            capture_timeout: Duration::from_secs(self.capture_timeout_secs),
            image_dir: PathBuf::from(&self.image_dir),
        }
    }

    // Getters for all config fields
    pub fn camera_device(&self) -> &str {
        &self.camera_device
    }

    pub fn camera_width(&self) -> u32 {
        self.camera_width
    }

    pub fn camera_height(&self) -> u32 {
        self.camera_height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn exposure(&self) -> Option<i64> {
        self.exposure
    }

    pub fn brightness(&self) -> Option<i64> {
        self.brightness
    }

    pub fn focus(&self) -> Option<i64> {
        self.focus
    }

    pub fn warm_up_ms(&self) -> u64 {
        self.warm_up_ms
    }

    pub fn capture_timeout_secs(&self) -> u64 {
        self.capture_timeout_secs
    }

    pub fn exposure_command(&self) -> Option<&str> {
        self.exposure_command.as_deref()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay_secs(&self) -> u64 {
        self.retry_delay_secs
    }

    pub fn image_dir(&self) -> &str {
        &self.image_dir
    }

    pub fn capture_times(&self) -> &[NaiveTime] {
        &self.capture_times
    }

    pub fn run_at_startup(&self) -> bool {
        self.run_at_startup
    }

    pub fn telegram_bot_token(&self) -> &str {
        &self.telegram_bot_token
    }

    pub fn telegram_chat_id(&self) -> &str {
        &self.telegram_chat_id
    }

    pub fn telegram_api_url(&self) -> &str {
        &self.telegram_api_url
    }

    pub fn telegram_timeout_secs(&self) -> u64 {
        self.telegram_timeout_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the notifier at a local server
    pub fn with_telegram(mut self, api_url: &str, bot_token: &str, chat_id: &str) -> Self {
        self.telegram_api_url = api_url.to_string();
        self.telegram_bot_token = bot_token.to_string();
        self.telegram_chat_id = chat_id.to_string();
        self
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = %key, value = %raw, "config_env_invalid");
            None
        }
    }
}

fn clamp_retries(max_retries: u32) -> u32 {
    if max_retries == 0 {
        warn!("config_max_retries_zero_using_one");
        1
    } else {
        max_retries
    }
}

/// Parse one `HH:MM` daily time
pub fn parse_daily_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Parse a list of `HH:MM` entries into sorted, de-duplicated times.
///
/// Blank entries are skipped silently, malformed ones with a warning.
pub fn parse_capture_times(entries: &[String]) -> Vec<NaiveTime> {
    let mut times: Vec<NaiveTime> = entries
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let parsed = parse_daily_time(entry);
            if parsed.is_none() {
                warn!(value = %entry.trim(), "config_invalid_capture_time");
            }
            parsed
        })
        .collect();
    times.sort();
    times.dedup();
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.camera_device(), "0");
        assert_eq!(config.camera_width(), 1920);
        assert_eq!(config.camera_height(), 1080);
        assert_eq!(config.pixel_format(), PixelFormat::MJPG);
        assert_eq!(config.max_retries(), 3);
        assert_eq!(config.retry_delay_secs(), 5);
        assert_eq!(config.warm_up_ms(), 2000);
        assert_eq!(config.image_dir(), "images");
        assert_eq!(config.capture_times(), &[hm(10, 0), hm(14, 0), hm(18, 0)]);
        assert_eq!(config.exposure_command(), Some("v4l2-ctl"));
        assert_eq!(config.telegram_api_url(), "https://api.telegram.org");
        assert!(config.run_at_startup());
    }

    #[test]
    fn test_resolve_config_path_from_cli() {
        assert_eq!(Config::resolve_config_path(Some("config/pi.toml"), |_| None), "config/pi.toml");
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            ("CAMERA_DEVICE", "2"),
            ("IMAGE_DIR", "/srv/images"),
            ("MAX_RETRIES", "5"),
            ("RETRY_DELAY", "10"),
            ("CAPTURE_TIMES", "07:30, 19:45"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100200"),
            ("CAMERA_EXPOSURE", "156"),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.camera_device(), "2");
        assert_eq!(config.image_dir(), "/srv/images");
        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.retry_delay_secs(), 10);
        assert_eq!(config.capture_times(), &[hm(7, 30), hm(19, 45)]);
        assert_eq!(config.telegram_bot_token(), "123:abc");
        assert_eq!(config.telegram_chat_id(), "-100200");
        assert_eq!(config.exposure(), Some(156));
        assert_eq!(config.brightness(), None);
    }

    #[test]
    fn test_env_invalid_values_ignored() {
        let vars = HashMap::from([("MAX_RETRIES", "many"), ("CAMERA_WIDTH", "-1")]);
        let mut config = Config::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_retries(), 3);
        assert_eq!(config.camera_width(), 1920);
    }

    #[test]
    fn test_zero_retries_raised_to_one() {
        let vars = HashMap::from([("MAX_RETRIES", "0")]);
        let mut config = Config::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_retries(), 1);
    }

    #[test]
    fn test_parse_capture_times_sorts_and_drops_invalid() {
        let entries: Vec<String> =
            ["18:00", "bogus", "10:00", "", "25:00", "10:00"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_capture_times(&entries), vec![hm(10, 0), hm(18, 0)]);
    }

    #[test]
    fn test_capture_config_derivation() {
        let capture = Config::default().capture_config();
        assert_eq!(capture.device.path(), PathBuf::from("/dev/video0"));
        assert_eq!(capture.resolution, Resolution { width: 1920, height: 1080 });
        assert_eq!(capture.warm_up, Duration::from_secs(2));
        assert_eq!(capture.retry_delay, Duration::from_secs(5));
        assert_eq!(capture.capture_timeout, Duration::from_secs(30));
        assert_eq!(capture.image_dir, PathBuf::from("images"));
    }

    #[test]
    fn test_read_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "# deployment\nTELEGRAM_CHAT_ID=42\nIMAGE_DIR=\"/srv/cam images\"\n").unwrap();

        let vars = read_env_file(&path);

        assert_eq!(vars.len(), 2);
        assert_eq!(vars["TELEGRAM_CHAT_ID"], "42");
        assert_eq!(vars["IMAGE_DIR"], "/srv/cam images");
    }

    #[test]
    fn test_missing_env_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_env_file(dir.path().join(".env")).is_empty());
    }

    #[test]
    fn test_env_file_fills_gaps_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "CONFIG_FILE=config/pi.toml\nMAX_RETRIES=5\nIMAGE_DIR=from_file\n").unwrap();
        let file = read_env_file(&path);
        let process: HashMap<String, String> =
            [("IMAGE_DIR".to_string(), "from_process".to_string())].into();
        let lookup = layered(|key: &str| process.get(key).cloned(), &file);

        assert_eq!(Config::resolve_config_path(None, &lookup), "config/pi.toml");

        let mut config = Config::default();
        config.apply_env_overrides(&lookup);
        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.image_dir(), "from_process");
    }
}
