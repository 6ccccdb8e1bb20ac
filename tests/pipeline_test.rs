//! End-to-end pipeline tests: real attempt, configurator and image store
//! against a fake camera and a recording notifier

use async_trait::async_trait;
use camera_courier::domain::types::{CaptureConfig, DeviceId, PixelFormat, Resolution};
use camera_courier::infra::{DeviceLocks, Metrics};
use camera_courier::io::{
    CameraControl, CameraHandle, CameraSource, DeliveryError, DeviceError, Frame, Notifier,
};
use camera_courier::services::{
    CaptureAttempt, CapturePipeline, DeviceCapture, DeviceConfigurator, RunOutcome,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const JPEG: [u8; 6] = [0xFF, 0xD8, 0xFF, 0xE0, 0xFF, 0xD9];

#[derive(Default)]
struct CameraState {
    opens: AtomicU32,
    releases: AtomicU32,
    open_now: AtomicU32,
    max_open: AtomicU32,
}

struct FakeCamera {
    state: Arc<CameraState>,
    fail_open: bool,
    read_delay: Duration,
    /// Extra delay on the first opened handle only
    first_read_delay: Duration,
}

struct FakeHandle {
    state: Arc<CameraState>,
    resolution: Resolution,
    read_delay: Duration,
}

impl CameraSource for FakeCamera {
    type Handle = FakeHandle;

    fn open(&self, device: &DeviceId) -> Result<FakeHandle, DeviceError> {
        if self.fail_open {
            return Err(DeviceError::Open {
                device: device.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        let first = self.state.opens.fetch_add(1, Ordering::SeqCst) == 0;
        let now = self.state.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_open.fetch_max(now, Ordering::SeqCst);
        Ok(FakeHandle {
            state: Arc::clone(&self.state),
            resolution: Resolution { width: 640, height: 480 },
            read_delay: if first { self.read_delay + self.first_read_delay } else { self.read_delay },
        })
    }
}

impl CameraHandle for FakeHandle {
    fn format(&self) -> Result<(PixelFormat, Resolution), DeviceError> {
        Ok((PixelFormat::MJPG, self.resolution))
    }

    fn set_format(
        &mut self,
        format: PixelFormat,
        resolution: Resolution,
    ) -> Result<(PixelFormat, Resolution), DeviceError> {
        self.resolution = resolution;
        Ok((format, resolution))
    }

    fn set_control(&mut self, control: CameraControl, _value: i64) -> Result<(), DeviceError> {
        Err(DeviceError::Control { control, reason: "not supported".into() })
    }

    fn read_frame(&mut self) -> Result<Frame, DeviceError> {
        std::thread::sleep(self.read_delay);
        Ok(Frame {
            format: PixelFormat::MJPG,
            width: self.resolution.width,
            height: self.resolution.height,
            data: JPEG.to_vec(),
        })
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.state.open_now.fetch_sub(1, Ordering::SeqCst);
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    images: Mutex<Vec<(PathBuf, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_error(&self, text: &str) -> Result<(), DeliveryError> {
        self.errors.lock().push(text.to_string());
        Ok(())
    }

    async fn send_image(&self, path: &Path, caption: &str) -> Result<(), DeliveryError> {
        self.images.lock().push((path.to_path_buf(), caption.to_string()));
        Ok(())
    }
}

/// Shares one recording notifier between the pipeline and the test
struct SharedNotifier(Arc<RecordingNotifier>);

#[async_trait]
impl Notifier for SharedNotifier {
    async fn send_error(&self, text: &str) -> Result<(), DeliveryError> {
        self.0.send_error(text).await
    }

    async fn send_image(&self, path: &Path, caption: &str) -> Result<(), DeliveryError> {
        self.0.send_image(path, caption).await
    }
}

type Built = (
    Arc<CapturePipeline<DeviceCapture<FakeCamera>, SharedNotifier>>,
    Arc<CameraState>,
    Arc<RecordingNotifier>,
);

fn build(dir: &Path, fail_open: bool, read_delay: Duration) -> Built {
    build_with(dir, fail_open, read_delay, Duration::ZERO, Duration::from_secs(5), Duration::from_millis(10))
}

fn build_with(
    dir: &Path,
    fail_open: bool,
    read_delay: Duration,
    first_read_delay: Duration,
    timeout: Duration,
    retry_delay: Duration,
) -> Built {
    let config = CaptureConfig {
        exposure: Some(156),
        warm_up: Duration::ZERO,
        max_retries: 3,
        retry_delay,
        image_dir: dir.to_path_buf(),
        ..CaptureConfig::default()
    };
    let state = Arc::new(CameraState::default());
    let camera = FakeCamera { state: Arc::clone(&state), fail_open, read_delay, first_read_delay };
    let attempt = CaptureAttempt::new(camera, DeviceConfigurator::new(None), config.clone());
    let capture = DeviceCapture::new(attempt, timeout);

    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = Arc::new(CapturePipeline::new(
        &config,
        capture,
        SharedNotifier(Arc::clone(&notifier)),
        Arc::new(DeviceLocks::new()),
        Arc::new(Metrics::new()),
    ));
    (pipeline, state, notifier)
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir).unwrap().map(|entry| entry.unwrap().path()).collect()
}

#[tokio::test]
async fn test_first_attempt_success_end_to_end() {
    let dir = tempdir().unwrap();
    let images = dir.path().join("images");
    let (pipeline, state, notifier) = build(&images, false, Duration::ZERO);

    let outcome = pipeline.run_once().await;

    assert!(matches!(outcome, RunOutcome::Delivered { attempts: 1, .. }));
    // Directory created on demand
    let files = files_in(&images);
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), JPEG);

    let stem = files[0].file_stem().unwrap().to_string_lossy().to_string();
    assert_eq!(stem.len(), "YYYYMMDD_HHMMSS".len());
    assert_eq!(files[0].extension().unwrap(), "jpg");

    let sent = notifier.images.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, files[0]);
    assert!(sent[0].1.starts_with("Captured at "));
    assert!(notifier.errors.lock().is_empty());

    // Rejected controls are warnings, never failures
    assert_eq!(state.opens.load(Ordering::SeqCst), 1);
    assert_eq!(state.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_open_always_fails_end_to_end() {
    let dir = tempdir().unwrap();
    let (pipeline, state, notifier) = build(dir.path(), true, Duration::ZERO);

    let outcome = pipeline.run_once().await;

    assert_eq!(outcome, RunOutcome::Exhausted { attempts: 3 });
    assert_eq!(state.releases.load(Ordering::SeqCst), 0);
    assert!(files_in(dir.path()).is_empty());
    assert!(notifier.images.lock().is_empty());

    let errors = notifier.errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("after 3 attempts"));
    assert_eq!(pipeline.metrics().attempts_total(), 3);
}

#[tokio::test]
async fn test_overlapping_runs_are_serialized() {
    let dir = tempdir().unwrap();
    let (pipeline, state, notifier) = build(dir.path(), false, Duration::from_millis(50));

    let first = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run_once().await })
    };
    let second = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run_once().await })
    };
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(state.opens.load(Ordering::SeqCst), 2);
    assert_eq!(state.max_open.load(Ordering::SeqCst), 1);
    assert_eq!(state.releases.load(Ordering::SeqCst), 2);
    assert_eq!(notifier.images.lock().len(), 2);
    assert_eq!(pipeline.metrics().runs_total(), 2);
}

#[tokio::test]
async fn test_hung_first_read_then_retry_stores_one_image() {
    let dir = tempdir().unwrap();
    let (pipeline, state, notifier) = build_with(
        dir.path(),
        false,
        Duration::ZERO,
        Duration::from_millis(500),
        Duration::from_millis(300),
        // Keeps a late write from attempt 1 in a different second than attempt 2
        Duration::from_millis(1500),
    );

    let outcome = pipeline.run_once().await;

    assert!(matches!(outcome, RunOutcome::Delivered { attempts: 2, .. }));
    // The late frame from attempt 1 is discarded, never written
    assert_eq!(files_in(dir.path()).len(), 1);
    assert_eq!(state.opens.load(Ordering::SeqCst), 2);
    assert_eq!(state.max_open.load(Ordering::SeqCst), 1);
    assert_eq!(state.releases.load(Ordering::SeqCst), 2);
    assert_eq!(notifier.images.lock().len(), 1);
    assert!(notifier.errors.lock().is_empty());
}
