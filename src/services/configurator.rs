//! Device configurator - applies a CaptureConfig to an open camera
//!
//! Order matters on real UVC hardware; later settings are silently ignored
//! when an earlier one has not taken effect:
//! 1. pixel format and resolution (one negotiation, format first)
//! 2. autofocus off, and only then manual focus
//! 3. exposure mode to manual, then absolute exposure
//! 4. brightness
//!
//! Every step is best-effort. A rejected setting becomes a warning in the
//! returned [`ConfigReport`]; it never fails the attempt.

use crate::domain::types::{CaptureConfig, DeviceId};
use crate::io::camera::{CameraControl, CameraHandle};
use crate::io::v4l2_ctl::{CommandOutcome, ExposureCommand, EXPOSURE_MODE_MANUAL};
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened while configuring one device handle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigReport {
    /// Settings the device rejected or did not honour
    pub warnings: Vec<String>,
    /// Set when the external exposure command was needed
    pub exposure_fallback: Option<CommandOutcome>,
}

impl ConfigReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, device: &DeviceId, setting: &str, reason: String) {
        warn!(device = %device, setting = %setting, reason = %reason, "camera_setting_rejected");
        self.warnings.push(format!("{}: {}", setting, reason));
    }
}

pub struct DeviceConfigurator {
    exposure_command: Option<Arc<dyn ExposureCommand>>,
}

impl DeviceConfigurator {
    pub fn new(exposure_command: Option<Arc<dyn ExposureCommand>>) -> Self {
        Self { exposure_command }
    }

    /// Apply `config` to `handle`, collecting warnings instead of failing
    pub fn apply<H: CameraHandle + ?Sized>(
        &self,
        handle: &mut H,
        config: &CaptureConfig,
    ) -> ConfigReport {
        let mut report = ConfigReport::default();
        let device = &config.device;

        match handle.set_format(config.pixel_format, config.resolution) {
            Ok((format, resolution)) => {
                if format != config.pixel_format {
                    report.warn(
                        device,
                        "pixel_format",
                        format!("requested {}, device chose {}", config.pixel_format, format),
                    );
                }
                if resolution != config.resolution {
                    report.warn(
                        device,
                        "resolution",
                        format!("requested {}, device chose {}", config.resolution, resolution),
                    );
                }
            }
            Err(e) => report.warn(device, "format", e.to_string()),
        }

        if let Some(focus) = config.focus {
            match handle.set_control(CameraControl::FocusAuto, 0) {
                Ok(()) => {
                    if let Err(e) = handle.set_control(CameraControl::FocusAbsolute, focus) {
                        report.warn(device, CameraControl::FocusAbsolute.as_str(), e.to_string());
                    }
                }
                // Manual focus is meaningless while autofocus is still on
                Err(e) => report.warn(device, CameraControl::FocusAuto.as_str(), e.to_string()),
            }
        }

        if let Some(exposure) = config.exposure {
            self.apply_exposure(handle, device, exposure, &mut report);
        }

        if let Some(brightness) = config.brightness {
            if let Err(e) = handle.set_control(CameraControl::Brightness, brightness) {
                report.warn(device, CameraControl::Brightness.as_str(), e.to_string());
            }
        }

        debug!(device = %device, warnings = %report.warnings.len(), "camera_configured");
        report
    }

    /// Two-step exposure switch; falls back to the external command when
    /// the driver rejects either step
    fn apply_exposure<H: CameraHandle + ?Sized>(
        &self,
        handle: &mut H,
        device: &DeviceId,
        exposure: i64,
        report: &mut ConfigReport,
    ) {
        let result = handle
            .set_control(CameraControl::ExposureAuto, EXPOSURE_MODE_MANUAL)
            .and_then(|()| handle.set_control(CameraControl::ExposureAbsolute, exposure));

        let Err(e) = result else {
            return;
        };
        report.warn(device, "exposure", e.to_string());

        if let Some(command) = &self.exposure_command {
            let outcome = command.set_manual_exposure(device, exposure);
            debug!(device = %device, outcome = ?outcome, "exposure_fallback_dispatched");
            report.exposure_fallback = Some(outcome);
        }
    }
}
