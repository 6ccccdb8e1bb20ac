//! Capture attempt - one open, configure, warm-up, read, release cycle
//!
//! [`CaptureAttempt`] is the blocking cycle against a [`CameraSource`].
//! [`DeviceCapture`] runs it on tokio's blocking pool under a timeout and is
//! what the pipeline drives through the [`CaptureSource`] trait.
//!
//! A blocking thread cannot be killed, so a timed-out attempt keeps running
//! until the driver returns. Its [`AttemptGate`] is cancelled so it never
//! writes an image, and the device is not opened again until it has finished.

use crate::domain::types::{CaptureConfig, CaptureFailure, CaptureResult, DeviceId};
use crate::io::camera::{CameraHandle, CameraSource};
use crate::io::image_store::ImageStore;
use crate::io::jpeg::to_jpeg;
use crate::services::configurator::DeviceConfigurator;
use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Async capture contract used by the pipeline
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Perform attempt number `attempt` (1-based)
    async fn capture(&self, attempt: u32) -> CaptureResult;

    /// Wait for work still touching the device after the last attempt.
    /// Called before the run releases its device lock.
    async fn settle(&self) {}
}

const GATE_RUNNING: u8 = 0;
const GATE_COMMITTED: u8 = 1;
const GATE_CANCELLED: u8 = 2;

/// Decides between an attempt storing its image and its timeout firing.
/// Exactly one of [`commit`](Self::commit) and [`cancel`](Self::cancel) wins.
#[derive(Debug, Default)]
pub struct AttemptGate(AtomicU8);

impl AttemptGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to store the image; false once cancelled
    pub fn commit(&self) -> bool {
        self.0
            .compare_exchange(GATE_RUNNING, GATE_COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stop the attempt from storing anything; false if it already committed
    pub fn cancel(&self) -> bool {
        self.0
            .compare_exchange(GATE_RUNNING, GATE_CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire) == GATE_CANCELLED
    }
}

/// Blocking capture cycle against one camera device
pub struct CaptureAttempt<S: CameraSource> {
    source: S,
    configurator: DeviceConfigurator,
    store: ImageStore,
    config: CaptureConfig,
}

impl<S: CameraSource> CaptureAttempt<S> {
    pub fn new(source: S, configurator: DeviceConfigurator, config: CaptureConfig) -> Self {
        let store = ImageStore::new(&config.image_dir);
        Self { source, configurator, store, config }
    }

    pub fn device(&self) -> &DeviceId {
        &self.config.device
    }

    /// Run one attempt. The device handle is dropped before the image is
    /// encoded and written, so release happens exactly once on every path.
    /// Nothing is written once `gate` has been cancelled.
    pub fn run(&self, attempt: u32, gate: &AttemptGate) -> CaptureResult {
        let start = Instant::now();
        let device = &self.config.device;

        let mut handle = match self.source.open(device) {
            Ok(handle) => handle,
            Err(e) => {
                return CaptureResult::Failure {
                    reason: CaptureFailure::DeviceOpen(e.to_string()),
                    attempt,
                };
            }
        };
        debug!(device = %device, attempt = %attempt, "camera_opened");

        let report = self.configurator.apply(&mut handle, &self.config);
        if !report.is_clean() {
            info!(device = %device, warnings = %report.warnings.len(), "camera_partially_configured");
        }

        handle.warm_up(self.config.warm_up);
        let frame = handle.read_frame();
        drop(handle);

        if gate.is_cancelled() {
            return cancelled(device, attempt);
        }

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                return CaptureResult::Failure {
                    reason: CaptureFailure::FrameRead(e.to_string()),
                    attempt,
                };
            }
        };
        let timestamp = Local::now();

        let jpeg = match to_jpeg(frame) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                return CaptureResult::Failure {
                    reason: CaptureFailure::FrameRead(e.to_string()),
                    attempt,
                };
            }
        };

        if !gate.commit() {
            return cancelled(device, attempt);
        }

        match self.store.write(&timestamp, &jpeg) {
            Ok(path) => {
                info!(
                    device = %device,
                    attempt = %attempt,
                    path = %path.display(),
                    bytes = %jpeg.len(),
                    elapsed_ms = %start.elapsed().as_millis(),
                    "image_captured"
                );
                CaptureResult::Success { path, timestamp }
            }
            Err(e) => CaptureResult::Failure { reason: CaptureFailure::Storage(e.to_string()), attempt },
        }
    }
}

#[cold]
fn cancelled(device: &DeviceId, attempt: u32) -> CaptureResult {
    info!(device = %device, attempt = %attempt, "late_frame_discarded");
    CaptureResult::Failure {
        reason: CaptureFailure::Aborted("cancelled after timeout".into()),
        attempt,
    }
}

/// Runs [`CaptureAttempt`] on the blocking pool with a timeout
pub struct DeviceCapture<S: CameraSource + 'static> {
    attempt: Arc<CaptureAttempt<S>>,
    timeout: Duration,
    /// Timed-out attempt whose thread may still hold the device
    stale: Mutex<Option<JoinHandle<CaptureResult>>>,
}

impl<S: CameraSource + 'static> DeviceCapture<S> {
    pub fn new(attempt: CaptureAttempt<S>, timeout: Duration) -> Self {
        Self { attempt: Arc::new(attempt), timeout, stale: Mutex::new(None) }
    }

    /// Wait up to `limit` for a timed-out attempt to finish.
    /// Returns false if it is still running.
    async fn reap_stale(&self, limit: Duration) -> bool {
        let stale = self.stale.lock().take();
        let Some(mut task) = stale else {
            return true;
        };
        info!(device = %self.attempt.device(), "capture_waiting_for_stale_attempt");
        match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    warn!(device = %self.attempt.device(), error = %e, "stale_attempt_aborted");
                }
                debug!(device = %self.attempt.device(), "stale_attempt_finished");
                true
            }
            Err(_) => {
                *self.stale.lock() = Some(task);
                false
            }
        }
    }
}

fn joined(result: Result<CaptureResult, JoinError>, attempt: u32) -> CaptureResult {
    match result {
        Ok(result) => result,
        Err(e) => CaptureResult::Failure { reason: CaptureFailure::Aborted(e.to_string()), attempt },
    }
}

#[async_trait]
impl<S: CameraSource + 'static> CaptureSource for DeviceCapture<S> {
    async fn capture(&self, attempt: u32) -> CaptureResult {
        // Never open the device while an earlier thread may still hold it
        if !self.reap_stale(self.timeout).await {
            warn!(device = %self.attempt.device(), attempt = %attempt, "device_held_by_stale_attempt");
            return CaptureResult::Failure {
                reason: CaptureFailure::DeviceOpen("device still held by a timed-out attempt".into()),
                attempt,
            };
        }

        let gate = Arc::new(AttemptGate::new());
        let cycle = Arc::clone(&self.attempt);
        let cycle_gate = Arc::clone(&gate);
        let mut task = tokio::task::spawn_blocking(move || cycle.run(attempt, &cycle_gate));

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(result) => joined(result, attempt),
            Err(_) if gate.cancel() => {
                warn!(
                    device = %self.attempt.device(),
                    attempt = %attempt,
                    timeout_secs = %self.timeout.as_secs(),
                    "capture_attempt_timed_out"
                );
                *self.stale.lock() = Some(task);
                CaptureResult::Failure { reason: CaptureFailure::TimedOut(self.timeout), attempt }
            }
            // Already storing its image; let it finish
            Err(_) => joined(task.await, attempt),
        }
    }

    async fn settle(&self) {
        if !self.reap_stale(self.timeout).await {
            warn!(device = %self.attempt.device(), "stale_attempt_still_running");
        }
    }
}
