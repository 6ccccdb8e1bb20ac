//! Per-device run locks
//!
//! Camera hardware does not support concurrent access, so every pipeline run
//! holds the lock for its device until the run (notification included) is
//! finished. A run that finds the device busy waits.

use crate::domain::types::DeviceId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;

/// Guard held for the duration of one run
pub type DeviceGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct DeviceLocks {
    locks: Mutex<HashMap<DeviceId, Arc<AsyncMutex<()>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, device: &DeviceId) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(device.clone()).or_default().clone()
    }

    /// Acquire the run lock for `device`, waiting if another run holds it
    pub async fn acquire(&self, device: &DeviceId) -> DeviceGuard {
        let lock = self.lock_for(device);
        match lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                info!(device = %device, "capture_run_waiting_for_device");
                lock.lock_owned().await
            }
        }
    }
}
