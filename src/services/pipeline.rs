//! Retrying capture pipeline - one run from trigger to notification
//!
//! State machine per run:
//!   Attempting(1) -> ... -> Attempting(max)   retry_delay between failures
//!   Attempting(n) -> Succeeded                 first success stops the loop
//!   Attempting(max) -> Exhausted               no trailing sleep
//!
//! Every run ends in exactly one terminal notification: the image on
//! success, one error otherwise. A failed image send adds one error alert.
//! The capture phase runs in its own task, so a panic or an unexpected
//! error inside it still produces a notification.

use crate::domain::notification::NotificationEvent;
use crate::domain::types::{CaptureConfig, CaptureFailure, CaptureResult, DeviceId};
use crate::infra::locks::DeviceLocks;
use crate::infra::metrics::Metrics;
use crate::io::image_store::ImageStore;
use crate::io::notifier::{DeliveryError, Notifier};
use crate::services::attempt::CaptureSource;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Image captured and delivered
    Delivered { path: PathBuf, attempts: u32 },
    /// Image captured but the send failed; the file stays on disk
    DeliveryFailed { path: PathBuf, attempts: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32 },
    /// Unexpected fault outside the capture and send contracts
    Faulted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Delivered { .. } => "delivered",
            RunOutcome::DeliveryFailed { .. } => "delivery_failed",
            RunOutcome::Exhausted { .. } => "exhausted",
            RunOutcome::Faulted => "faulted",
        }
    }
}

/// Terminal state of the capture phase
#[derive(Debug)]
enum CapturePhase {
    Succeeded { path: PathBuf, timestamp: DateTime<Local>, attempts: u32 },
    Exhausted { attempts: u32, last: CaptureFailure },
}

/// Log a failed attempt (cold path)
#[cold]
fn log_attempt_failed(attempt: u32, max_attempts: u32, reason: &CaptureFailure) {
    warn!(
        attempt = %attempt,
        max_attempts = %max_attempts,
        kind = %reason.kind(),
        error = %reason,
        "capture_attempt_failed"
    );
}

pub struct CapturePipeline<C, N> {
    capture: C,
    notifier: N,
    store: ImageStore,
    device: DeviceId,
    max_attempts: u32,
    retry_delay: Duration,
    locks: Arc<DeviceLocks>,
    metrics: Arc<Metrics>,
}

impl<C, N> CapturePipeline<C, N>
where
    C: CaptureSource + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        config: &CaptureConfig,
        capture: C,
        notifier: N,
        locks: Arc<DeviceLocks>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            capture,
            notifier,
            store: ImageStore::new(&config.image_dir),
            device: config.device.clone(),
            max_attempts: config.max_retries.max(1),
            retry_delay: config.retry_delay,
            locks,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run the pipeline once: capture with retries, then notify
    pub async fn run_once(self: &Arc<Self>) -> RunOutcome {
        let run_id = Uuid::now_v7();
        let span = info_span!("capture_run", run_id = %run_id, device = %self.device);
        self.run_locked().instrument(span).await
    }

    async fn run_locked(self: &Arc<Self>) -> RunOutcome {
        let _guard = self.locks.acquire(&self.device).await;
        let start = Instant::now();
        self.metrics.record_run_started();
        info!(max_attempts = %self.max_attempts, "capture_run_started");

        let pipeline = Arc::clone(self);
        let phase = tokio::spawn(async move { pipeline.capture_phase().await }.in_current_span())
            .await;

        let outcome = match phase {
            Ok(Ok(CapturePhase::Succeeded { path, timestamp, attempts })) => {
                self.metrics.record_run_succeeded();
                self.deliver_image(path, timestamp, attempts).await
            }
            Ok(Ok(CapturePhase::Exhausted { attempts, last })) => {
                self.metrics.record_run_exhausted();
                error!(attempts = %attempts, error = %last, "capture_run_exhausted");
                let message = format!(
                    "Failed to capture and save image after {} attempts (last error: {})",
                    attempts, last
                );
                self.notify_error(&message).await;
                RunOutcome::Exhausted { attempts }
            }
            Ok(Err(e)) => self.fault(format!("{:#}", e)).await,
            Err(e) if e.is_panic() => self.fault(panic_message(e.into_panic())).await,
            Err(e) => self.fault(e.to_string()).await,
        };

        // A timed-out attempt may still hold the device
        self.capture.settle().await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_run_duration(elapsed_ms);
        info!(outcome = %outcome.as_str(), elapsed_ms = %elapsed_ms, "capture_run_finished");
        self.metrics.report().log();
        outcome
    }

    /// Directory bootstrap and the retry loop
    async fn capture_phase(&self) -> anyhow::Result<CapturePhase> {
        self.store.ensure_dir()?;

        let mut attempt = 1;
        loop {
            info!(attempt = %attempt, max_attempts = %self.max_attempts, "capture_attempt_started");
            let result = self.capture.capture(attempt).await;
            self.metrics.record_attempt(result.is_success());

            match result {
                CaptureResult::Success { path, timestamp } => {
                    return Ok(CapturePhase::Succeeded { path, timestamp, attempts: attempt });
                }
                CaptureResult::Failure { reason, .. } => {
                    log_attempt_failed(attempt, self.max_attempts, &reason);
                    if attempt >= self.max_attempts {
                        return Ok(CapturePhase::Exhausted { attempts: attempt, last: reason });
                    }
                }
            }

            tokio::time::sleep(self.retry_delay).await;
            attempt += 1;
        }
    }

    async fn deliver_image(
        &self,
        path: PathBuf,
        timestamp: DateTime<Local>,
        attempts: u32,
    ) -> RunOutcome {
        let event = NotificationEvent::image(path.clone(), timestamp);
        match self.send(&event).await {
            Ok(()) => RunOutcome::Delivered { path, attempts },
            Err(e) => {
                self.notify_error(&format!("Error sending image: {}", e)).await;
                RunOutcome::DeliveryFailed { path, attempts }
            }
        }
    }

    async fn fault(&self, reason: String) -> RunOutcome {
        self.metrics.record_run_faulted();
        error!(error = %reason, "capture_run_faulted");
        self.notify_error(&format!("Unexpected error in capture process: {}", reason)).await;
        RunOutcome::Faulted
    }

    /// Send one error alert; a failure here is logged only
    async fn notify_error(&self, message: &str) {
        let _ = self.send(&NotificationEvent::error(message, Local::now())).await;
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), DeliveryError> {
        let sent = match event {
            NotificationEvent::Error { message, at } => {
                self.notifier.send_error(&NotificationEvent::error_text(message, at)).await
            }
            NotificationEvent::Image { path, caption } => {
                self.notifier.send_image(path, caption).await
            }
        };
        self.metrics.record_notification(sent.is_ok());
        match &sent {
            Ok(()) => info!(kind = %event.as_str(), "notification_sent"),
            Err(e) => error!(kind = %event.as_str(), error = %e, "notification_failed"),
        }
        sent
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic in capture task".to_string()
    }
}
