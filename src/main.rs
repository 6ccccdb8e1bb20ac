//! Camera courier - scheduled webcam capture with chat delivery
//!
//! Captures a still image from a V4L2 camera at fixed times of day, stores
//! it on disk and sends it to a Telegram chat. Failed captures are retried;
//! every run ends in exactly one chat notification.
//!
//! Module structure:
//! - `domain/` - Capture config, results, notification events
//! - `io/` - Camera backend, image store, Telegram notifier
//! - `services/` - Configurator, capture attempt, pipeline, scheduler
//! - `infra/` - Config, metrics, run locks

use camera_courier::infra::{Config, DeviceLocks, Metrics};
use camera_courier::io::{ExposureCommand, TelegramNotifier, V4l2Ctl, V4l2Source};
use camera_courier::services::{
    CaptureAttempt, CapturePipeline, DeviceCapture, DeviceConfigurator, RunOutcome, Scheduler,
};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Camera courier - scheduled webcam capture with chat delivery
#[derive(Parser, Debug)]
#[command(name = "camera-courier", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Capture and send a single image, then exit
    #[arg(long)]
    once: bool,

    /// Do not run a capture at startup; wait for the first scheduled time
    #[arg(long)]
    skip_startup_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured logging, level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "camera-courier starting");

    let args = Args::parse();
    let config = Config::load(args.config.as_deref());
    let capture_config = config.capture_config();

    let schedule: Vec<String> =
        config.capture_times().iter().map(|t| t.format("%H:%M").to_string()).collect();
    info!(
        config_file = %config.config_file(),
        device = %capture_config.device,
        resolution = %capture_config.resolution,
        pixel_format = %capture_config.pixel_format,
        exposure = ?capture_config.exposure,
        brightness = ?capture_config.brightness,
        focus = ?capture_config.focus,
        max_retries = %capture_config.max_retries,
        retry_delay_secs = %capture_config.retry_delay.as_secs(),
        image_dir = %capture_config.image_dir.display(),
        capture_times = ?schedule,
        "config_loaded"
    );

    let exposure_command = config
        .exposure_command()
        .map(|program| Arc::new(V4l2Ctl::new(program)) as Arc<dyn ExposureCommand>);
    let attempt = CaptureAttempt::new(
        V4l2Source,
        DeviceConfigurator::new(exposure_command),
        capture_config.clone(),
    );
    let capture = DeviceCapture::new(attempt, capture_config.capture_timeout);

    let notifier = TelegramNotifier::new(&config)?;
    if !notifier.is_configured() {
        warn!("telegram_not_configured");
    }

    let pipeline = Arc::new(CapturePipeline::new(
        &capture_config,
        capture,
        notifier,
        Arc::new(DeviceLocks::new()),
        Arc::new(Metrics::new()),
    ));

    if args.once {
        let outcome = pipeline.run_once().await;
        info!(outcome = %outcome.as_str(), "camera-courier single run complete");
        return match outcome {
            RunOutcome::Delivered { .. } => Ok(()),
            other => Err(format!("capture run ended: {}", other.as_str()).into()),
        };
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let scheduler = Scheduler::new(
        config.capture_times().to_vec(),
        config.run_at_startup() && !args.skip_startup_run,
    );
    scheduler
        .run(
            move || {
                let pipeline = Arc::clone(&pipeline);
                async move {
                    pipeline.run_once().await;
                }
            },
            shutdown_rx,
        )
        .await;

    info!("camera-courier shutdown complete");
    Ok(())
}
