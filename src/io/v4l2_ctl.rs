//! Exposure fallback through the external `v4l2-ctl` tool
//!
//! Some UVC drivers ignore or reject VIDIOC_S_CTRL for exposure while the
//! same request issued by `v4l2-ctl` takes effect. The tool's exit status is
//! not a reliable signal on that hardware either, so the outcome is only
//! ever "dispatched, unverified".
//!
//! The exposure controls were renamed in newer kernels, and `v4l2-ctl`
//! rejects the whole request on an unknown name, so the device's control
//! list is read first to pick the spelling it understands.

use crate::domain::types::DeviceId;
use crate::io::camera::CameraControl;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Menu value for manual exposure (V4L2_EXPOSURE_MANUAL)
pub const EXPOSURE_MODE_MANUAL: i64 = 1;

/// `v4l2-ctl` names for the exposure mode and exposure time controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureControlNames {
    pub mode: &'static str,
    pub absolute: &'static str,
}

impl ExposureControlNames {
    pub const CURRENT: Self = Self {
        mode: CameraControl::ExposureAuto.as_str(),
        absolute: CameraControl::ExposureAbsolute.as_str(),
    };
    pub const LEGACY: Self = Self { mode: "exposure_auto", absolute: "exposure_absolute" };

    /// Pick the spelling advertised in `v4l2-ctl --list-ctrls` output.
    /// Falls back to the current names when the listing says nothing.
    pub fn from_listing(listing: &str) -> Self {
        let advertises =
            |name: &str| listing.lines().any(|line| line.split_whitespace().next() == Some(name));
        if !advertises(Self::CURRENT.mode) && advertises(Self::LEGACY.mode) {
            Self::LEGACY
        } else {
            Self::CURRENT
        }
    }
}

/// Result of a best-effort external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command ran; whether the device honoured it is unknown
    Unverified,
    /// The command could not be started at all
    NotDispatched(String),
}

/// Best-effort exposure control outside the driver API
pub trait ExposureCommand: Send + Sync {
    fn set_manual_exposure(&self, device: &DeviceId, exposure: i64) -> CommandOutcome;
}

/// Runs `v4l2-ctl -d <device> --set-ctrl=...`
#[derive(Debug, Clone)]
pub struct V4l2Ctl {
    program: String,
}

impl V4l2Ctl {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn args(device: &DeviceId, names: ExposureControlNames, exposure: i64) -> Vec<String> {
        vec![
            "-d".to_string(),
            device.path().display().to_string(),
            format!("--set-ctrl={}={}", names.mode, EXPOSURE_MODE_MANUAL),
            format!("--set-ctrl={}={}", names.absolute, exposure),
        ]
    }

    /// Ask the device which exposure control names it uses
    fn control_names(&self, device: &DeviceId) -> std::io::Result<ExposureControlNames> {
        let output = Command::new(&self.program)
            .arg("-d")
            .arg(device.path())
            .arg("--list-ctrls")
            .stdin(Stdio::null())
            .output()?;
        let names = ExposureControlNames::from_listing(&String::from_utf8_lossy(&output.stdout));
        debug!(device = %device, mode = %names.mode, absolute = %names.absolute, "exposure_control_names");
        Ok(names)
    }
}

impl ExposureCommand for V4l2Ctl {
    fn set_manual_exposure(&self, device: &DeviceId, exposure: i64) -> CommandOutcome {
        let names = match self.control_names(device) {
            Ok(names) => names,
            Err(e) => {
                warn!(program = %self.program, error = %e, "exposure_command_not_dispatched");
                return CommandOutcome::NotDispatched(e.to_string());
            }
        };

        let status = Command::new(&self.program)
            .args(Self::args(device, names, exposure))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) => {
                debug!(
                    program = %self.program,
                    device = %device,
                    exit_code = ?status.code(),
                    "exposure_command_dispatched"
                );
                CommandOutcome::Unverified
            }
            Err(e) => {
                warn!(program = %self.program, error = %e, "exposure_command_not_dispatched");
                CommandOutcome::NotDispatched(e.to_string())
            }
        }
    }
}
