//! Infrastructure - configuration, metrics, and run locks
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, env overrides, defaults)
//! - `metrics` - Lock-free run metrics
//! - `locks` - Per-device run serialization

pub mod config;
pub mod locks;
pub mod metrics;

// Re-export commonly used types
pub use config::Config;
pub use locks::{DeviceGuard, DeviceLocks};
pub use metrics::Metrics;
